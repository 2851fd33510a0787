//! registrate - course-registration portal checker
//!
//! Logs in to the portal, checks every tracked course for open exam sign-ups
//! and sends the result by mail or Telegram.

// Use the library crate for all modules
use registrate::cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install Rustls crypto provider for HTTPS support
    // This is required for Rustls 0.23+
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        anyhow::bail!("Failed to install Rustls crypto provider");
    }

    // Initialize logging (registrate=info by default, RUST_LOG overrides)
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("registrate=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Run CLI
    cli::run().await
}
