//! Configuration management
//!
//! Portal URL and selectors, marker phrases, probe timing, browser choice and
//! notification channels. Stored as TOML in the platform config directory.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::RegistrateError;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub portal: PortalConfig,
    /// Marker phrases that classify a rendered page
    #[serde(default)]
    pub markers: MarkerConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub mail: MailConfig,
    #[serde(default)]
    pub telegram: TelegramSettings,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalConfig {
    /// Page that shows the login form and, once logged in, the course search
    #[serde(default = "default_signup_url")]
    pub signup_url: String,
    #[serde(default)]
    pub selectors: SelectorConfig,
}

fn default_signup_url() -> String {
    "https://my.tudelft.nl/#/inschrijven/cursus/:id".to_string()
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            signup_url: default_signup_url(),
            selectors: SelectorConfig::default(),
        }
    }
}

/// CSS selectors for the elements the probe interacts with
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorConfig {
    #[serde(default = "default_username_selector")]
    pub username: String,
    #[serde(default = "default_password_selector")]
    pub password: String,
    #[serde(default = "default_submit_selector")]
    pub submit: String,
    #[serde(default = "default_search_box_selector")]
    pub search_box: String,
    /// First row of the live-filtered result list
    #[serde(default = "default_first_result_selector")]
    pub first_result: String,
}

fn default_username_selector() -> String {
    "#username".to_string()
}

fn default_password_selector() -> String {
    "#password".to_string()
}

fn default_submit_selector() -> String {
    "#submit_button".to_string()
}

fn default_search_box_selector() -> String {
    "input.searchbar-input".to_string()
}

fn default_first_result_selector() -> String {
    "ion-list ion-item".to_string()
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            username: default_username_selector(),
            password: default_password_selector(),
            submit: default_submit_selector(),
            search_box: default_search_box_selector(),
            first_result: default_first_result_selector(),
        }
    }
}

impl SelectorConfig {
    fn all(&self) -> [(&'static str, &str); 5] {
        [
            ("username", self.username.as_str()),
            ("password", self.password.as_str()),
            ("submit", self.submit.as_str()),
            ("search_box", self.search_box.as_str()),
            ("first_result", self.first_result.as_str()),
        ]
    }
}

/// Literal phrases searched for in the rendered page (portal UI is Dutch)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkerConfig {
    #[serde(default = "default_no_results_marker")]
    pub no_results: String,
    #[serde(default = "default_signup_closed_marker")]
    pub signup_closed: String,
    #[serde(default = "default_unable_marker")]
    pub unable: String,
    #[serde(default = "default_available_marker")]
    pub available: String,
    #[serde(default = "default_not_in_program_marker")]
    pub not_in_program: String,
}

fn default_no_results_marker() -> String {
    "Geen zoekresultaten".to_string()
}

fn default_signup_closed_marker() -> String {
    "Inschrijving gesloten".to_string()
}

fn default_unable_marker() -> String {
    "Helaas".to_string()
}

fn default_available_marker() -> String {
    "Selecteer een toetsgelegenheid".to_string()
}

fn default_not_in_program_marker() -> String {
    "maakt geen deel uit van je programma".to_string()
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            no_results: default_no_results_marker(),
            signup_closed: default_signup_closed_marker(),
            unable: default_unable_marker(),
            available: default_available_marker(),
            not_in_program: default_not_in_program_marker(),
        }
    }
}

/// Timing of the polling loops
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_login_timeout")]
    pub login_timeout_secs: u64,
    #[serde(default = "default_search_timeout")]
    pub search_timeout_secs: u64,
    /// Bound on the wait for the exam-slot view after clicking a result
    #[serde(default = "default_slot_timeout")]
    pub slot_timeout_secs: u64,
    /// Pause after typing a code so the live filter can catch up
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_login_timeout() -> u64 {
    30
}

fn default_search_timeout() -> u64 {
    10
}

fn default_slot_timeout() -> u64 {
    30
}

fn default_settle_delay_ms() -> u64 {
    500
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            login_timeout_secs: default_login_timeout(),
            search_timeout_secs: default_search_timeout(),
            slot_timeout_secs: default_slot_timeout(),
            settle_delay_ms: default_settle_delay_ms(),
        }
    }
}

impl ProbeConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn login_timeout(&self) -> Duration {
        Duration::from_secs(self.login_timeout_secs)
    }

    pub fn search_timeout(&self) -> Duration {
        Duration::from_secs(self.search_timeout_secs)
    }

    pub fn slot_timeout(&self) -> Duration {
        Duration::from_secs(self.slot_timeout_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

/// Browser backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BrowserKind {
    /// Chrome/Chromium over the DevTools protocol
    Chrome,
    /// Firefox through geckodriver (W3C WebDriver)
    Firefox,
}

impl std::fmt::Display for BrowserKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BrowserKind::Chrome => write!(f, "chrome"),
            BrowserKind::Firefox => write!(f, "firefox"),
        }
    }
}

/// Browser automation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    #[serde(default = "default_browser_kind")]
    pub kind: BrowserKind,
    /// Browser executable (auto-detect if None)
    #[serde(default)]
    pub binary_path: Option<String>,
    /// geckodriver executable for Firefox (PATH lookup if None)
    #[serde(default)]
    pub driver_path: Option<String>,
    #[serde(default)]
    pub headless: bool,
    #[serde(default = "default_window_width")]
    pub window_width: u32,
    #[serde(default = "default_window_height")]
    pub window_height: u32,
    /// Upper bound on waiting for a navigation or reload to settle
    #[serde(default = "default_load_timeout")]
    pub load_timeout_secs: u64,
}

fn default_browser_kind() -> BrowserKind {
    BrowserKind::Chrome
}

fn default_window_width() -> u32 {
    1280
}

fn default_window_height() -> u32 {
    900
}

fn default_load_timeout() -> u64 {
    10
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            kind: default_browser_kind(),
            binary_path: None,
            driver_path: None,
            headless: false,
            window_width: default_window_width(),
            window_height: default_window_height(),
            load_timeout_secs: default_load_timeout(),
        }
    }
}

/// Notification channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Mail,
    Telegram,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Mail => write!(f, "mail"),
            Channel::Telegram => write!(f, "telegram"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    #[serde(default = "default_channels")]
    pub channels: Vec<Channel>,
}

fn default_channels() -> Vec<Channel> {
    vec![Channel::Mail]
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            channels: default_channels(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,
    /// 465 uses implicit TLS, anything else STARTTLS
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
}

fn default_smtp_host() -> String {
    "smtp.gmail.com".to_string()
}

fn default_smtp_port() -> u16 {
    465
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            smtp_host: default_smtp_host(),
            smtp_port: default_smtp_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramSettings {
    /// API base URL (for self-hosted bot API servers)
    #[serde(default = "default_telegram_api_base")]
    pub api_base: String,
}

fn default_telegram_api_base() -> String {
    "https://api.telegram.org".to_string()
}

impl Default for TelegramSettings {
    fn default() -> Self {
        Self {
            api_base: default_telegram_api_base(),
        }
    }
}

/// Where courses and credentials live (None = platform data/config dir)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub courses_path: Option<PathBuf>,
    #[serde(default)]
    pub credentials_path: Option<PathBuf>,
}

impl StorageConfig {
    pub fn courses_path(&self) -> Result<PathBuf> {
        match &self.courses_path {
            Some(path) => Ok(path.clone()),
            None => Ok(data_dir()?.join("courses.csv")),
        }
    }

    pub fn credentials_path(&self) -> Result<PathBuf> {
        match &self.credentials_path {
            Some(path) => Ok(path.clone()),
            None => Ok(config_dir()?.join("credentials.json")),
        }
    }
}

impl Config {
    /// Load configuration from the default location, writing defaults on first use
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path()?)
    }

    /// Load configuration from a specific file, writing defaults if it is missing
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            let config: Config = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            tracing::info!("Wrote default configuration to {}", path.display());
            Ok(config)
        }
    }

    /// Save configuration to a file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .context("Failed to create config directory")?;
            }
        }

        let contents = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;

        std::fs::write(path, contents)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Check everything a run depends on before a browser is started
    pub fn validate(&self) -> std::result::Result<(), RegistrateError> {
        let url = url::Url::parse(&self.portal.signup_url).map_err(|e| {
            RegistrateError::config(format!("invalid portal.signup_url '{}': {}", self.portal.signup_url, e))
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(RegistrateError::config("portal.signup_url must be http or https"));
        }

        for (name, selector) in self.portal.selectors.all() {
            if selector.trim().is_empty() {
                return Err(RegistrateError::config(format!("portal.selectors.{} is empty", name)));
            }
        }

        for (name, marker) in [
            ("no_results", &self.markers.no_results),
            ("signup_closed", &self.markers.signup_closed),
            ("unable", &self.markers.unable),
            ("available", &self.markers.available),
            ("not_in_program", &self.markers.not_in_program),
        ] {
            if marker.trim().is_empty() {
                return Err(RegistrateError::config(format!("markers.{} is empty", name)));
            }
        }

        let probe = &self.probe;
        if probe.poll_interval_ms == 0
            || probe.login_timeout_secs == 0
            || probe.search_timeout_secs == 0
            || probe.slot_timeout_secs == 0
        {
            return Err(RegistrateError::config("probe interval and timeouts must be greater than 0"));
        }

        if self.browser.window_width == 0 || self.browser.window_height == 0 {
            return Err(RegistrateError::config("browser window dimensions must be greater than 0"));
        }
        if self.browser.load_timeout_secs == 0 {
            return Err(RegistrateError::config("browser.load_timeout_secs must be greater than 0"));
        }

        if self.notify.channels.contains(&Channel::Mail) && self.mail.smtp_host.trim().is_empty() {
            return Err(RegistrateError::config("mail.smtp_host is empty"));
        }

        Ok(())
    }
}

fn project_dirs() -> Result<directories::ProjectDirs> {
    directories::ProjectDirs::from("nl", "registrate", "registrate")
        .context("Failed to get project directories")
}

/// Get the configuration directory path
pub fn config_dir() -> Result<PathBuf> {
    Ok(project_dirs()?.config_dir().to_path_buf())
}

/// Get the configuration file path
pub fn config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Get the data directory path
pub fn data_dir() -> Result<PathBuf> {
    Ok(project_dirs()?.data_dir().to_path_buf())
}

/// Print the effective configuration
pub fn show_config(config: &Config) -> Result<()> {
    let contents = toml::to_string_pretty(config)
        .context("Failed to serialize config")?;
    println!("{}", contents);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.probe.poll_interval(), Duration::from_millis(500));
        assert_eq!(config.probe.search_timeout(), Duration::from_secs(10));
        assert_eq!(config.browser.kind, BrowserKind::Chrome);
        assert_eq!(config.notify.channels, vec![Channel::Mail]);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = Config::default();
        config.portal.signup_url = "ftp://portal.example".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.markers.available = "  ".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.portal.selectors.search_box = String::new();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.probe.search_timeout_secs = 0;
        assert!(matches!(config.validate(), Err(RegistrateError::Configuration(_))));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [browser]
            kind = "firefox"
            headless = true

            [notify]
            channels = ["mail", "telegram"]

            [markers]
            available = "Select an exam opportunity"
            "#,
        )
        .unwrap();

        assert_eq!(config.browser.kind, BrowserKind::Firefox);
        assert!(config.browser.headless);
        assert_eq!(config.notify.channels, vec![Channel::Mail, Channel::Telegram]);
        assert_eq!(config.markers.available, "Select an exam opportunity");
        assert_eq!(config.markers.unable, "Helaas");
        assert_eq!(config.probe.login_timeout_secs, 30);
    }

    #[test]
    fn test_load_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.mail.smtp_port, 465);

        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded.portal.signup_url, config.portal.signup_url);
    }
}
