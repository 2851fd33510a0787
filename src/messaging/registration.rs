//! One-time chat registration
//!
//! Listens for a `/start` message to the bot, stores the sender's chat id in
//! the credential store and stops. Runs outside the normal check flow.

use anyhow::{bail, Result};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::messaging::telegram::{TelegramClient, TelegramUpdate};
use crate::security::CredentialStore;

/// Reply sent once the chat id is stored
pub const REGISTERED_REPLY: &str = "Your chat ID has been successfully recorded!";

/// Upper bound for one getUpdates long poll
const LONG_POLL_SECS: u64 = 25;

pub struct ChatRegistration {
    client: TelegramClient,
    store: CredentialStore,
    timeout: Duration,
}

impl ChatRegistration {
    pub fn new(client: TelegramClient, store: CredentialStore, timeout: Duration) -> Self {
        Self {
            client,
            store,
            timeout,
        }
    }

    /// Wait for `/start`, persist the chat id and return it
    pub async fn run(&self) -> Result<String> {
        let bot = self.client.get_me().await?;
        info!(
            "Waiting up to {:?} for /start sent to @{}",
            self.timeout,
            bot.username.as_deref().unwrap_or(&bot.first_name)
        );

        let deadline = Instant::now() + self.timeout;
        let mut offset = None;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                bail!("No /start message received within {:?}", self.timeout);
            }
            let poll_secs = remaining.as_secs().clamp(1, LONG_POLL_SECS);

            let updates = self.client.get_updates(offset, poll_secs).await?;
            for update in &updates {
                offset = Some(update.update_id + 1);

                let Some(chat_id) = start_command_chat(update) else {
                    continue;
                };

                info!("Received start command from chat {}", chat_id);
                self.store.update(|creds| creds.telegram_chat_id = Some(chat_id.clone()))?;

                if let Err(e) = self.client.send_message(&chat_id, REGISTERED_REPLY, None).await {
                    warn!("Chat id stored but the confirmation failed: {:#}", e);
                }
                // Acknowledge so the command is not delivered again
                if let Err(e) = self.client.get_updates(offset, 0).await {
                    warn!("Failed to acknowledge updates: {:#}", e);
                }
                return Ok(chat_id);
            }
        }
    }
}

/// Chat id of an update carrying a `/start` command
pub fn start_command_chat(update: &TelegramUpdate) -> Option<String> {
    let message = update.message.as_ref()?;
    let command = message.text.as_deref()?.split_whitespace().next()?;
    let is_start = command == "/start" || command.starts_with("/start@");
    is_start.then(|| message.chat.id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(text: Option<&str>, chat_id: i64) -> TelegramUpdate {
        let text = match text {
            Some(t) => format!(r#","text":{}"#, serde_json::to_string(t).unwrap()),
            None => String::new(),
        };
        serde_json::from_str(&format!(
            r#"{{"update_id":1,"message":{{"message_id":5,"chat":{{"id":{}}}{}}}}}"#,
            chat_id, text
        ))
        .unwrap()
    }

    #[test]
    fn test_start_command_detection() {
        assert_eq!(start_command_chat(&update(Some("/start"), 42)), Some("42".to_string()));
        assert_eq!(
            start_command_chat(&update(Some("/start@registrate_bot"), -1001)),
            Some("-1001".to_string())
        );
        assert_eq!(start_command_chat(&update(Some("/start deep-link"), 7)), Some("7".to_string()));

        assert_eq!(start_command_chat(&update(Some("/stop"), 42)), None);
        assert_eq!(start_command_chat(&update(Some("/started"), 42)), None);
        assert_eq!(start_command_chat(&update(Some("hello"), 42)), None);
        assert_eq!(start_command_chat(&update(None, 42)), None);
    }
}
