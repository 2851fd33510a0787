//! Notification channels
//!
//! Supported channels:
//! - Mail: SMTP with application credentials
//! - Telegram: Bot API message to a registered chat
//!
//! Every configured channel is tried on its own; a failing channel is logged
//! and never keeps the others from sending.

pub mod mail;
pub mod registration;
pub mod telegram;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{error, info};

use crate::config::{Channel, Config};
use crate::error::RegistrateError;
use crate::security::Credentials;
use crate::types::Course;

pub use mail::MailNotifier;
pub use registration::ChatRegistration;
pub use telegram::{TelegramClient, TelegramConfig, TelegramNotifier};

/// Subject line used when courses are open
pub const SUBJECT_AVAILABLE: &str = "Open courses available!";
/// Subject line used when nothing is open
pub const SUBJECT_ALL_CLEAR: &str = "No open sign ups found!";
/// Body used when nothing is open
pub const ALL_CLEAR_BODY: &str = "No open sign ups were found, you don't have to do anything.";
/// Signature appended to course listings
pub const SIGNATURE: &str = "--RegistrateTUD";

/// Subject line for a list of open courses
pub fn subject_for(available: &[Course]) -> &'static str {
    if available.is_empty() {
        SUBJECT_ALL_CLEAR
    } else {
        SUBJECT_AVAILABLE
    }
}

/// Common trait for notification channels
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send the run result. An empty list sends the all-clear message.
    async fn notify(&self, available: &[Course]) -> Result<()>;

    /// Get channel name
    fn name(&self) -> &'static str;
}

/// Outcome of sending through every channel
#[derive(Debug, Default)]
pub struct DispatchReport {
    pub delivered: Vec<&'static str>,
    pub failures: Vec<RegistrateError>,
}

impl DispatchReport {
    pub fn all_delivered(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Build one notifier per requested channel, in order, skipping repeats
pub fn build_notifiers(
    config: &Config,
    credentials: &Credentials,
    channels: &[Channel],
) -> std::result::Result<Vec<Box<dyn Notifier>>, RegistrateError> {
    let mut seen = Vec::new();
    let mut notifiers: Vec<Box<dyn Notifier>> = Vec::new();

    for channel in channels {
        if seen.contains(channel) {
            continue;
        }
        seen.push(*channel);

        match channel {
            Channel::Mail => {
                let account = credentials.mail_account()?;
                notifiers.push(Box::new(MailNotifier::new(&config.mail, account)));
            }
            Channel::Telegram => {
                let (token, chat_id) = credentials.telegram_target()?;
                let client = TelegramClient::new(TelegramConfig::new(token, &config.telegram))?;
                notifiers.push(Box::new(TelegramNotifier::new(
                    client,
                    chat_id,
                    &config.portal.signup_url,
                )));
            }
        }
    }

    Ok(notifiers)
}

/// Send `available` through every notifier, collecting failures instead of stopping
pub async fn dispatch(notifiers: &[Box<dyn Notifier>], available: &[Course]) -> DispatchReport {
    let mut report = DispatchReport::default();

    for notifier in notifiers {
        match notifier.notify(available).await {
            Ok(()) => {
                info!(channel = notifier.name(), courses = available.len(), "Notification sent");
                report.delivered.push(notifier.name());
            }
            Err(e) => {
                let failure = RegistrateError::NotifyChannel {
                    channel: notifier.name(),
                    message: format!("{:#}", e),
                };
                error!("{}", failure);
                report.failures.push(failure);
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::EncodedSecret;

    fn course(code: &str) -> Course {
        Course::new(code, "", false).unwrap()
    }

    fn mock(name: &'static str, fails: bool) -> MockNotifier {
        let mut notifier = MockNotifier::new();
        notifier.expect_name().return_const(name);
        notifier.expect_notify().times(1).returning(move |_| {
            if fails {
                Err(anyhow::anyhow!("535 authentication failed"))
            } else {
                Ok(())
            }
        });
        notifier
    }

    #[tokio::test]
    async fn test_failure_does_not_block_other_channel() {
        let notifiers: Vec<Box<dyn Notifier>> =
            vec![Box::new(mock("mail", true)), Box::new(mock("telegram", false))];

        let report = dispatch(&notifiers, &[course("CS101")]).await;

        assert_eq!(report.delivered, vec!["telegram"]);
        assert_eq!(report.failures.len(), 1);
        assert!(!report.all_delivered());
        match &report.failures[0] {
            RegistrateError::NotifyChannel { channel, message } => {
                assert_eq!(*channel, "mail");
                assert!(message.contains("535"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!report.failures[0].is_fatal());
    }

    #[tokio::test]
    async fn test_empty_list_is_still_sent() {
        let mut notifier = MockNotifier::new();
        notifier.expect_name().return_const("mail");
        notifier
            .expect_notify()
            .withf(|available| available.is_empty())
            .times(1)
            .returning(|_| Ok(()));
        let notifiers: Vec<Box<dyn Notifier>> = vec![Box::new(notifier)];

        let report = dispatch(&notifiers, &[]).await;
        assert!(report.all_delivered());
    }

    #[test]
    fn test_subjects() {
        assert_eq!(subject_for(&[]), SUBJECT_ALL_CLEAR);
        assert_eq!(subject_for(&[course("CS101")]), SUBJECT_AVAILABLE);
    }

    #[test]
    fn test_build_notifiers_checks_credentials() {
        let config = Config::default();
        let mut creds = Credentials {
            net_id: "jdoe".to_string(),
            net_password: EncodedSecret::encode("pw"),
            sender_mail: Some("bot@example.com".to_string()),
            receiver_mail: Some("me@example.com".to_string()),
            mail_password: Some(EncodedSecret::encode("app")),
            ..Credentials::default()
        };

        let built = build_notifiers(&config, &creds, &[Channel::Mail, Channel::Mail]).unwrap();
        assert_eq!(built.len(), 1);
        assert_eq!(built[0].name(), "mail");

        assert!(matches!(
            build_notifiers(&config, &creds, &[Channel::Telegram]),
            Err(RegistrateError::Configuration(_))
        ));

        creds.telegram_token = Some("123456:abc".to_string());
        creds.telegram_chat_id = Some("42".to_string());
        let built = build_notifiers(&config, &creds, &[Channel::Telegram, Channel::Mail]).unwrap();
        let names: Vec<&str> = built.iter().map(|n| n.name()).collect();
        assert_eq!(names, vec!["telegram", "mail"]);
    }
}
