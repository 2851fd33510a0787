//! Mail notifications over SMTP
//!
//! Port 465 uses implicit TLS (SMTPS); any other port upgrades with STARTTLS.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Local;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::debug;

use crate::config::MailConfig;
use crate::messaging::{subject_for, Notifier, ALL_CLEAR_BODY, SIGNATURE};
use crate::security::MailAccount;
use crate::types::Course;

pub struct MailNotifier {
    host: String,
    port: u16,
    account: MailAccount,
}

impl MailNotifier {
    pub fn new(config: &MailConfig, account: MailAccount) -> Self {
        Self {
            host: config.smtp_host.clone(),
            port: config.smtp_port,
            account,
        }
    }

    /// Build the message without sending it
    pub fn compose(&self, available: &[Course]) -> Result<Message> {
        Message::builder()
            .from(self.account.sender.parse().context("Invalid sender address")?)
            .to(self.account.receiver.parse().context("Invalid receiver address")?)
            .subject(subject_for(available))
            .header(ContentType::TEXT_PLAIN)
            .body(mail_body(available))
            .context("Failed to build mail message")
    }

    fn transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
        let creds = Credentials::new(self.account.sender.clone(), self.account.password.clone());

        let builder = if self.port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&self.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.host)
        }
        .with_context(|| format!("Failed to create SMTP transport for {}", self.host))?;

        Ok(builder.port(self.port).credentials(creds).build())
    }
}

#[async_trait]
impl Notifier for MailNotifier {
    async fn notify(&self, available: &[Course]) -> Result<()> {
        let message = self.compose(available)?;
        debug!(host = %self.host, port = self.port, "Sending mail to {}", self.account.receiver);

        self.transport()?
            .send(message)
            .await
            .with_context(|| format!("SMTP delivery via {} failed", self.host))?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "mail"
    }
}

/// Plain-text body: one `CODE: Name` line per open course, or the all-clear text
pub fn mail_body(available: &[Course]) -> String {
    if available.is_empty() {
        return ALL_CLEAR_BODY.to_string();
    }

    let lines: Vec<String> = available.iter().map(Course::to_string).collect();
    format!(
        "The following courses are available for sign up:\n{}\n\nChecked on {}\n\n{}",
        lines.join("\n"),
        Local::now().format("%Y-%m-%d %H:%M"),
        SIGNATURE
    )
}
