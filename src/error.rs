//! Error taxonomy for a registration check run
//!
//! Browser backends and CLI glue work with `anyhow`; everything the probe loop
//! can fail with is named here so callers can tell a login timeout from a
//! search timeout from a broken configuration.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistrateError {
    /// The login form or the course search behind it never rendered. The
    /// browser has already been closed.
    #[error("login did not complete within {0:?}")]
    AuthTimeout(Duration),

    /// Neither the "no results" marker nor a result row appeared for a course.
    #[error("search for course '{code}' showed no result within {timeout:?}")]
    SearchTimeout { code: String, timeout: Duration },

    #[error("element '{selector}' not found within {timeout:?}")]
    ElementNotFound { selector: String, timeout: Duration },

    #[error("{channel} notification failed: {message}")]
    NotifyChannel { channel: &'static str, message: String },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid course: {0}")]
    InvalidCourse(String),

    #[error("course storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Driver(#[from] anyhow::Error),
}

impl RegistrateError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Whether the run has to stop. Only notification failures are survivable.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::NotifyChannel { .. })
    }
}

pub type Result<T> = std::result::Result<T, RegistrateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatality() {
        assert!(RegistrateError::AuthTimeout(Duration::from_secs(30)).is_fatal());
        assert!(RegistrateError::SearchTimeout {
            code: "CS101".into(),
            timeout: Duration::from_secs(10),
        }
        .is_fatal());
        assert!(!RegistrateError::NotifyChannel {
            channel: "mail",
            message: "auth failed".into(),
        }
        .is_fatal());
    }

    #[test]
    fn test_auth_timeout_message_covers_both_login_steps() {
        let message = RegistrateError::AuthTimeout(Duration::from_secs(30)).to_string();
        assert_eq!(message, "login did not complete within 30s");
    }

    #[test]
    fn test_messages_name_the_course() {
        let err = RegistrateError::SearchTimeout {
            code: "CSE1100".into(),
            timeout: Duration::from_secs(10),
        };
        assert!(err.to_string().contains("CSE1100"));
    }
}
