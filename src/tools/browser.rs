//! Browser automation capability
//!
//! The probe loop talks to the portal through [`PageDriver`] only. Two backends
//! implement it:
//! - Chrome/Chromium over the Chrome DevTools Protocol ([`crate::tools::cdp`])
//! - Firefox through geckodriver and the W3C WebDriver protocol
//!   ([`crate::tools::webdriver`])
//!
//! [`launch`] is the only place that looks at which backend is configured.
//!
//! # Resource handling
//!
//! Browser and driver processes are spawned with `kill_on_drop`, so dropping
//! a driver without calling [`PageDriver::close`] still terminates them.
//! `close` is idempotent.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;
use tracing::info;

use crate::config::{BrowserConfig, BrowserKind};

/// Single-tab browser handle used by the probe loop.
///
/// Selectors are CSS selectors. Every method operates on the one tab the
/// driver owns; callers must not share a driver between concurrent tasks.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Backend name for logs
    fn backend(&self) -> &'static str;

    /// Load a URL and wait for the document to finish loading
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Whether an element matching the selector is currently in the DOM
    async fn element_present(&self, selector: &str) -> Result<bool>;

    /// Focus the element and type text into it as user input
    async fn type_text(&self, selector: &str, text: &str) -> Result<()>;

    async fn click(&self, selector: &str) -> Result<()>;

    /// Current `document.body.innerHTML`
    async fn page_html(&self) -> Result<String>;

    /// Reload the current page and wait for it to load
    async fn refresh(&self) -> Result<()>;

    /// Terminate the browser. Safe to call more than once.
    async fn close(&self) -> Result<()>;
}

/// Start the configured browser backend
pub async fn launch(config: &BrowserConfig) -> Result<Box<dyn PageDriver>> {
    info!(browser = %config.kind, headless = config.headless, "Launching browser");
    match config.kind {
        BrowserKind::Chrome => Ok(Box::new(crate::tools::cdp::CdpPage::launch(config).await?)),
        BrowserKind::Firefox => Ok(Box::new(
            crate::tools::webdriver::WebDriverPage::launch(config).await?,
        )),
    }
}

/// Find an available port for a debugging/driver endpoint
pub(crate) async fn find_available_port() -> Result<u16> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    drop(listener);
    Ok(port)
}

/// Look up an executable: explicit path first, then fixed locations, then `which`
pub(crate) fn find_executable(
    custom_path: &Option<String>,
    candidates: &[&str],
    names: &[&str],
) -> Option<String> {
    if let Some(path) = custom_path {
        if std::path::Path::new(path).exists() {
            return Some(path.clone());
        }
    }

    for path in candidates {
        if std::path::Path::new(path).exists() {
            return Some(path.to_string());
        }
    }

    for name in names {
        if let Ok(output) = std::process::Command::new("which").arg(name).output() {
            if output.status.success() {
                let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !path.is_empty() {
                    return Some(path);
                }
            }
        }
    }

    None
}

/// Poll an HTTP endpoint until `ready` extracts a value or the timeout passes
pub(crate) async fn wait_for_endpoint<T, F>(url: &str, timeout: Duration, ready: F) -> Result<T>
where
    F: Fn(&serde_json::Value) -> Option<T>,
{
    let start = Instant::now();

    loop {
        if start.elapsed() > timeout {
            bail!("Timeout waiting for browser endpoint {}", url);
        }

        if let Ok(response) = reqwest::get(url).await {
            if response.status().is_success() {
                if let Ok(data) = response.json::<serde_json::Value>().await {
                    if let Some(value) = ready(&data) {
                        return Ok(value);
                    }
                }
            }
        }

        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

/// Validate CSS selector
pub(crate) fn validate_selector(selector: &str) -> Result<()> {
    if selector.is_empty() {
        bail!("Selector cannot be empty");
    }

    // Basic validation - check for obvious injection attempts
    let forbidden = ["{", "}", ";", "/*", "*/", "<script"];
    for pattern in forbidden {
        if selector.contains(pattern) {
            bail!("Selector contains forbidden characters");
        }
    }

    Ok(())
}

/// Escape string for JavaScript
pub(crate) fn escape_js_string(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('\'', "\\'")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('\t', "\\t")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_validation() {
        assert!(validate_selector("#submit_button").is_ok());
        assert!(validate_selector("input.searchbar-input").is_ok());
        assert!(validate_selector("ion-list ion-item").is_ok());
        assert!(validate_selector("div[data-attr='value']").is_ok());

        assert!(validate_selector("").is_err());
        assert!(validate_selector("script{}").is_err());
        assert!(validate_selector("a; alert(1)").is_err());
    }

    #[test]
    fn test_js_escape() {
        assert_eq!(escape_js_string("test"), "test");
        assert_eq!(escape_js_string("it's"), "it\\'s");
        assert_eq!(escape_js_string("a\"b"), "a\\\"b");
        assert_eq!(escape_js_string("a\\b\n"), "a\\\\b\\n");
    }

    #[test]
    fn test_find_executable_prefers_custom_path() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path().to_string_lossy().to_string();

        let found = find_executable(&Some(path.clone()), &["/definitely/not/here"], &[]);
        assert_eq!(found, Some(path));

        let missing = find_executable(&None, &["/definitely/not/here"], &[]);
        assert_eq!(missing, None);
    }

    #[tokio::test]
    async fn test_find_available_port() {
        let port = find_available_port().await.unwrap();
        assert!(port > 0);
    }
}
