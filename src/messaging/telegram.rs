//! Telegram messaging integration
//!
//! Uses the Telegram Bot API over HTTPS. Notifications are sent as MarkdownV2,
//! so every reserved character in course names has to be escaped.
//!
//! # Setup
//!
//! 1. Create a bot via @BotFather on Telegram
//! 2. Store the token with `registrate credentials set`
//! 3. Run `registrate telegram register` and send `/start` to the bot

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

use crate::config::TelegramSettings;
use crate::messaging::{Notifier, ALL_CLEAR_BODY, SIGNATURE};
use crate::types::Course;

/// Characters MarkdownV2 treats as markup
static MARKDOWN_V2_RESERVED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([_*\[\]()~`>#+\-=|{}.!\\])").unwrap());

/// Telegram client configuration
#[derive(Clone)]
pub struct TelegramConfig {
    /// Bot token from @BotFather (format: 123456:ABC-DEF1234ghIkl-zyx57W2v1u123ew11)
    pub bot_token: String,
    /// API base URL (for self-hosted bot API servers)
    pub api_base: String,
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

impl TelegramConfig {
    pub fn new(bot_token: impl Into<String>, settings: &TelegramSettings) -> Self {
        Self {
            bot_token: bot_token.into(),
            api_base: settings.api_base.trim_end_matches('/').to_string(),
        }
    }

    /// Check if the token looks like a bot token
    pub fn is_configured(&self) -> bool {
        !self.bot_token.is_empty() && self.bot_token.contains(':')
    }

    /// Get API URL for a method
    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.bot_token, method)
    }
}

/// Telegram API response envelope
#[derive(Debug, Deserialize)]
struct TelegramResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<i32>,
}

impl<T> TelegramResponse<T> {
    fn into_result(self) -> Result<T> {
        if self.ok {
            return self.result.context("No result in response");
        }
        let error_msg = self.description.unwrap_or_else(|| "Unknown error".to_string());
        error!("Telegram API error: {} (code: {:?})", error_msg, self.error_code);
        bail!("Telegram API error: {}", error_msg)
    }
}

/// Telegram message info
#[derive(Debug, Deserialize)]
pub struct TelegramMessage {
    pub message_id: i64,
    pub text: Option<String>,
    pub chat: TelegramChat,
}

/// Telegram chat info
#[derive(Debug, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
}

/// Telegram user info
#[derive(Debug, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    pub is_bot: bool,
    pub first_name: String,
    pub username: Option<String>,
}

/// Telegram update (incoming message/event)
#[derive(Debug, Deserialize)]
pub struct TelegramUpdate {
    pub update_id: i64,
    pub message: Option<TelegramMessage>,
}

/// Send message request
#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct GetUpdatesRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<i64>,
    timeout: u64,
    allowed_updates: [&'static str; 1],
}

/// Telegram client for sending and receiving messages
#[derive(Debug, Clone)]
pub struct TelegramClient {
    config: TelegramConfig,
    http_client: reqwest::Client,
}

impl TelegramClient {
    pub fn new(config: TelegramConfig) -> Result<Self> {
        if !config.is_configured() {
            bail!("Telegram token is malformed, expected '<bot id>:<secret>'");
        }

        // Long enough to outlive a long-poll getUpdates call
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { config, http_client })
    }

    /// Test the bot token and get bot info
    pub async fn get_me(&self) -> Result<TelegramUser> {
        let response: TelegramResponse<TelegramUser> = self
            .http_client
            .get(self.config.api_url("getMe"))
            .send()
            .await
            .context("Failed to connect to Telegram API")?
            .json()
            .await
            .context("Failed to parse Telegram response")?;

        response.into_result()
    }

    /// Send a text message; `parse_mode` None sends plain text
    pub async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        parse_mode: Option<&str>,
    ) -> Result<TelegramMessage> {
        let request = SendMessageRequest {
            chat_id,
            text,
            parse_mode,
        };

        debug!("Sending Telegram message to {}", chat_id);

        let response: TelegramResponse<TelegramMessage> = self
            .http_client
            .post(self.config.api_url("sendMessage"))
            .json(&request)
            .send()
            .await
            .context("Failed to send Telegram message")?
            .json()
            .await
            .context("Failed to parse Telegram response")?;

        response.into_result()
    }

    /// Long-poll for new messages. Passing `offset` acknowledges earlier updates.
    pub async fn get_updates(&self, offset: Option<i64>, timeout_secs: u64) -> Result<Vec<TelegramUpdate>> {
        let request = GetUpdatesRequest {
            offset,
            timeout: timeout_secs,
            allowed_updates: ["message"],
        };

        let response: TelegramResponse<Vec<TelegramUpdate>> = self
            .http_client
            .post(self.config.api_url("getUpdates"))
            .json(&request)
            .send()
            .await
            .context("Failed to get Telegram updates")?
            .json()
            .await
            .context("Failed to parse Telegram response")?;

        response.into_result()
    }
}

/// Escape text for MarkdownV2
pub fn escape_markdown_v2(text: &str) -> String {
    MARKDOWN_V2_RESERVED.replace_all(text, r"\$1").into_owned()
}

/// Escape the URL part of an inline link
fn escape_link_url(url: &str) -> String {
    url.replace('\\', "\\\\").replace(')', "\\)")
}

/// Sends the run result to one chat
pub struct TelegramNotifier {
    client: TelegramClient,
    chat_id: String,
    signup_url: String,
}

impl TelegramNotifier {
    pub fn new(client: TelegramClient, chat_id: impl Into<String>, signup_url: &str) -> Self {
        Self {
            client,
            chat_id: chat_id.into(),
            signup_url: signup_url.to_string(),
        }
    }

    /// MarkdownV2 message text
    pub fn message_text(&self, available: &[Course]) -> String {
        if available.is_empty() {
            return escape_markdown_v2(ALL_CLEAR_BODY);
        }

        let lines: Vec<String> = available
            .iter()
            .map(|course| escape_markdown_v2(&course.to_string()))
            .collect();

        format!(
            "The following courses are available for sign up:\n\n{}\n\n\
             Press [here]({}) to go to the sign up page\n\n{}",
            lines.join("\n"),
            escape_link_url(&self.signup_url),
            escape_markdown_v2(SIGNATURE)
        )
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, available: &[Course]) -> Result<()> {
        let text = self.message_text(available);
        self.client
            .send_message(&self.chat_id, &text, Some("MarkdownV2"))
            .await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "telegram"
    }
}
