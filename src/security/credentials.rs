//! Credential store
//!
//! Login and notification secrets live in a JSON file next to the config.
//! Passwords are base64-encoded so they are not readable at a glance; this is
//! obfuscation, not encryption. They are decoded only where they are used.

use anyhow::{Context, Result};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::config::Channel;
use crate::error::RegistrateError;

/// A reversibly encoded secret. `Debug` never shows the value.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncodedSecret(String);

impl EncodedSecret {
    pub fn encode(plain: &str) -> Self {
        Self(base64::engine::general_purpose::STANDARD.encode(plain.as_bytes()))
    }

    pub fn decode(&self) -> std::result::Result<String, RegistrateError> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(self.0.trim())
            .map_err(|e| RegistrateError::config(format!("stored secret is not valid base64: {}", e)))?;
        String::from_utf8(bytes)
            .map_err(|_| RegistrateError::config("stored secret is not valid UTF-8"))
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Debug for EncodedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncodedSecret(<redacted>)")
    }
}

/// Everything the tool needs to log in and notify
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub net_id: String,
    #[serde(default)]
    pub net_password: EncodedSecret,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_mail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_mail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mail_password: Option<EncodedSecret>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telegram_token: Option<String>,
    #[serde(default, alias = "telegram_id", skip_serializing_if = "Option::is_none")]
    pub telegram_chat_id: Option<String>,
}

/// Decoded portal login
#[derive(Clone)]
pub struct PortalLogin {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for PortalLogin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortalLogin")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Decoded mail account
#[derive(Clone)]
pub struct MailAccount {
    pub sender: String,
    pub receiver: String,
    pub password: String,
}

impl std::fmt::Debug for MailAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailAccount")
            .field("sender", &self.sender)
            .field("receiver", &self.receiver)
            .finish_non_exhaustive()
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl Credentials {
    pub fn portal_login(&self) -> std::result::Result<PortalLogin, RegistrateError> {
        if self.net_id.trim().is_empty() || self.net_password.is_empty() {
            return Err(RegistrateError::config(
                "portal login is not set. Run 'registrate credentials set' first.",
            ));
        }
        Ok(PortalLogin {
            username: self.net_id.trim().to_string(),
            password: self.net_password.decode()?,
        })
    }

    pub fn mail_account(&self) -> std::result::Result<MailAccount, RegistrateError> {
        let sender = present(&self.sender_mail)
            .ok_or_else(|| RegistrateError::config("sender mail address is not set"))?;
        let receiver = present(&self.receiver_mail)
            .ok_or_else(|| RegistrateError::config("receiver mail address is not set"))?;
        let password = self
            .mail_password
            .as_ref()
            .filter(|secret| !secret.is_empty())
            .ok_or_else(|| RegistrateError::config("mail password is not set"))?
            .decode()?;

        Ok(MailAccount {
            sender: sender.to_string(),
            receiver: receiver.to_string(),
            password,
        })
    }

    /// Bot token and chat id
    pub fn telegram_target(&self) -> std::result::Result<(String, String), RegistrateError> {
        let token = present(&self.telegram_token)
            .ok_or_else(|| RegistrateError::config("telegram token is not set"))?;
        let chat_id = present(&self.telegram_chat_id).ok_or_else(|| {
            RegistrateError::config("telegram chat id is not set. Run 'registrate telegram register' first.")
        })?;
        Ok((token.to_string(), chat_id.to_string()))
    }

    /// Check the portal login and every credential the given channels need
    pub fn validate_for(&self, channels: &[Channel]) -> std::result::Result<(), RegistrateError> {
        self.portal_login()?;
        for channel in channels {
            match channel {
                Channel::Mail => {
                    self.mail_account()?;
                }
                Channel::Telegram => {
                    self.telegram_target()?;
                }
            }
        }
        Ok(())
    }
}

/// JSON file holding the credentials
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load credentials; a missing file yields empty credentials.
    pub fn load(&self) -> Result<Credentials> {
        if !self.path.exists() {
            warn!("No credentials file at {}", self.path.display());
            return Ok(Credentials::default());
        }
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read credentials from {}", self.path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse credentials in {}", self.path.display()))
    }

    pub fn save(&self, credentials: &Credentials) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).context("Failed to create credentials directory")?;
            }
        }

        let contents = serde_json::to_string_pretty(credentials)
            .context("Failed to serialize credentials")?;
        fs::write(&self.path, contents).context("Failed to write credentials file")?;

        // Set restrictive permissions on Unix
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))
                .context("Failed to set file permissions")?;
        }

        Ok(())
    }

    /// Load, modify and save in one step
    pub fn update<F>(&self, apply: F) -> Result<Credentials>
    where
        F: FnOnce(&mut Credentials),
    {
        let mut credentials = self.load()?;
        apply(&mut credentials);
        self.save(&credentials)?;
        Ok(credentials)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full() -> Credentials {
        Credentials {
            net_id: "jdoe".to_string(),
            net_password: EncodedSecret::encode("hunter2"),
            sender_mail: Some("bot@example.com".to_string()),
            receiver_mail: Some("me@example.com".to_string()),
            mail_password: Some(EncodedSecret::encode("app-password")),
            telegram_token: Some("123456:abc".to_string()),
            telegram_chat_id: Some("42".to_string()),
        }
    }

    #[test]
    fn test_secret_encoding() {
        let secret = EncodedSecret::encode("p@ss wörd");
        assert_ne!(secret.0, "p@ss wörd");
        assert_eq!(secret.decode().unwrap(), "p@ss wörd");
        assert!(!format!("{:?}", secret).contains(&secret.0));

        assert!(EncodedSecret("not base64!".to_string()).decode().is_err());
    }

    #[test]
    fn test_validate_for_channels() {
        let creds = full();
        assert!(creds.validate_for(&[Channel::Mail, Channel::Telegram]).is_ok());

        let mut no_chat = full();
        no_chat.telegram_chat_id = None;
        assert!(no_chat.validate_for(&[Channel::Mail]).is_ok());
        assert!(no_chat.validate_for(&[Channel::Telegram]).is_err());

        let mut no_login = full();
        no_login.net_password = EncodedSecret::default();
        assert!(matches!(no_login.validate_for(&[]), Err(RegistrateError::Configuration(_))));
    }

    #[test]
    fn test_decoded_views() {
        let creds = full();
        let login = creds.portal_login().unwrap();
        assert_eq!(login.username, "jdoe");
        assert_eq!(login.password, "hunter2");
        assert!(!format!("{:?}", login).contains("hunter2"));

        let mail = creds.mail_account().unwrap();
        assert_eq!(mail.password, "app-password");
    }

    #[test]
    fn test_store_round_trip_and_legacy_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("creds.json"));

        assert_eq!(store.load().unwrap(), Credentials::default());

        store.save(&full()).unwrap();
        assert_eq!(store.load().unwrap(), full());

        fs::write(
            store.path(),
            r#"{"net_id": "jdoe", "net_password": "aHVudGVyMg==", "telegram_id": "7"}"#,
        )
        .unwrap();
        let legacy = store.load().unwrap();
        assert_eq!(legacy.telegram_chat_id.as_deref(), Some("7"));
        assert_eq!(legacy.portal_login().unwrap().password, "hunter2");
    }

    #[test]
    fn test_update_persists() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("creds.json"));

        store.update(|c| c.telegram_chat_id = Some("99".to_string())).unwrap();
        assert_eq!(store.load().unwrap().telegram_chat_id.as_deref(), Some("99"));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(store.path()).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }
}
