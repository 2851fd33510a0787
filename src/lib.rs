//! registrate - course-registration portal checker
//!
//! Automates checking a university course-registration portal for newly
//! opened exam sign-ups:
//! - Browser automation over Chrome DevTools or W3C WebDriver
//! - Per-course probe loop that classifies pages by marker phrase
//! - Mail and Telegram notifications
//! - CSV course list and JSON credential store
//!
//! # Example
//!
//! ```ignore
//! use registrate::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let summary = registrate::run::run(&config).await?;
//!     println!("{}", summary.probes.summary());
//!     Ok(())
//! }
//! ```

// Core modules
pub mod error;
pub mod types;
pub mod config;
pub mod security;
pub mod storage;
pub mod cli;

// Feature modules
pub mod tools;
pub mod probe;
pub mod messaging;
pub mod run;

// Re-export commonly used types for convenience
pub use config::Config;

pub use error::RegistrateError;

pub use types::{
    AvailableCourses,
    Course,
    CourseSet,
    ProbeOutcome,
};

pub use probe::{
    Marker,
    PageClassifier,
    Poller,
    ProbeReport,
    Prober,
    SessionController,
};

pub use tools::PageDriver;

pub use messaging::{
    dispatch,
    Notifier,
};
