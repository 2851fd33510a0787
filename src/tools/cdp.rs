//! Chrome/Chromium backend over the Chrome DevTools Protocol
//!
//! Launches the browser with a throwaway profile and remote debugging on a
//! free port, opens one tab and drives it through a flat CDP session.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::BrowserConfig;
use crate::tools::browser::{
    escape_js_string, find_available_port, find_executable, validate_selector,
    wait_for_endpoint, PageDriver,
};

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Chrome tab driven over CDP
pub struct CdpPage {
    client: Mutex<Option<CdpClient>>,
}

impl CdpPage {
    pub async fn launch(config: &BrowserConfig) -> Result<Self> {
        let client = CdpClient::new(config).await?;
        Ok(Self {
            client: Mutex::new(Some(client)),
        })
    }
}

#[async_trait]
impl PageDriver for CdpPage {
    fn backend(&self) -> &'static str {
        "chrome"
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        debug!("Navigating to {}", url);
        let mut guard = self.client.lock().await;
        let client = guard.as_mut().context("Browser is closed")?;
        client.mark_stale().await?;
        client.call_in_session("Page.navigate", json!({ "url": url })).await?;
        client.wait_until_loaded().await
    }

    async fn element_present(&self, selector: &str) -> Result<bool> {
        validate_selector(selector)?;
        let mut guard = self.client.lock().await;
        let client = guard.as_mut().context("Browser is closed")?;
        let value = client
            .evaluate(&format!(
                "document.querySelector('{}') !== null",
                escape_js_string(selector)
            ))
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn type_text(&self, selector: &str, text: &str) -> Result<()> {
        validate_selector(selector)?;
        let mut guard = self.client.lock().await;
        let client = guard.as_mut().context("Browser is closed")?;

        let focused = client
            .evaluate(&format!(
                "(() => {{
                    const el = document.querySelector('{}');
                    if (!el) return false;
                    el.focus();
                    if ('value' in el) el.value = '';
                    return true;
                }})()",
                escape_js_string(selector)
            ))
            .await?;
        if !focused.as_bool().unwrap_or(false) {
            bail!("Element not found: {}", selector);
        }

        // Goes through the input pipeline so framework listeners fire
        client
            .call_in_session("Input.insertText", json!({ "text": text }))
            .await?;
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<()> {
        validate_selector(selector)?;
        let mut guard = self.client.lock().await;
        let client = guard.as_mut().context("Browser is closed")?;

        let result = client
            .evaluate(&format!(
                "(() => {{
                    const el = document.querySelector('{}');
                    if (!el) return {{ error: 'Element not found' }};
                    el.click();
                    return {{ success: true }};
                }})()",
                escape_js_string(selector)
            ))
            .await?;

        if let Some(error) = result.get("error") {
            bail!("Click on '{}' failed: {}", selector, error.as_str().unwrap_or("Unknown error"));
        }
        Ok(())
    }

    async fn page_html(&self) -> Result<String> {
        let mut guard = self.client.lock().await;
        let client = guard.as_mut().context("Browser is closed")?;
        let value = client
            .evaluate("document.body ? document.body.innerHTML : ''")
            .await?;
        Ok(value.as_str().unwrap_or("").to_string())
    }

    async fn refresh(&self) -> Result<()> {
        let mut guard = self.client.lock().await;
        let client = guard.as_mut().context("Browser is closed")?;
        client.mark_stale().await?;
        client.call_in_session("Page.reload", json!({})).await?;
        client.wait_until_loaded().await
    }

    async fn close(&self) -> Result<()> {
        if let Some(mut client) = self.client.lock().await.take() {
            client.close().await;
        }
        Ok(())
    }
}

/// Chrome DevTools Protocol client
struct CdpClient {
    chrome_process: tokio::process::Child,
    ws_stream: WsStream,
    message_id: u64,
    target_id: String,
    session_id: String,
    profile_dir: PathBuf,
    load_timeout: Duration,
}

impl CdpClient {
    /// Launch Chrome and attach to a fresh tab
    async fn new(config: &BrowserConfig) -> Result<Self> {
        let chrome_path = find_chrome(&config.binary_path)?;
        info!("Using Chrome: {}", chrome_path);

        let port = find_available_port().await?;
        let profile_dir = std::env::temp_dir().join(format!("registrate-chrome-{}", Uuid::new_v4()));

        let mut cmd = tokio::process::Command::new(&chrome_path);
        cmd.arg(format!("--remote-debugging-port={}", port))
            .arg(format!("--window-size={},{}", config.window_width, config.window_height))
            .arg(format!("--user-data-dir={}", profile_dir.display()))
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-default-apps")
            .arg("--disable-popup-blocking")
            .arg("--disable-background-timer-throttling")
            .arg("--disable-renderer-backgrounding")
            .arg("--disable-backgrounding-occluded-windows")
            .arg("--disable-blink-features=AutomationControlled");

        if config.headless {
            cmd.arg("--headless=new");
        }

        cmd.stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true);

        let chrome_process = cmd
            .spawn()
            .with_context(|| format!("Failed to launch Chrome: {}", chrome_path))?;

        let ws_url = wait_for_endpoint(
            &format!("http://127.0.0.1:{}/json/version", port),
            Duration::from_secs(10),
            |data| data["webSocketDebuggerUrl"].as_str().map(str::to_string),
        )
        .await
        .with_context(|| format!("Chrome did not expose DevTools on port {}", port))?;
        debug!("Connecting to Chrome at: {}", ws_url);

        let (ws_stream, _) = tokio_tungstenite::connect_async(&ws_url)
            .await
            .context("Failed to connect to Chrome DevTools")?;

        let mut client = Self {
            chrome_process,
            ws_stream,
            message_id: 0,
            target_id: String::new(),
            session_id: String::new(),
            profile_dir,
            load_timeout: Duration::from_secs(config.load_timeout_secs),
        };

        client.create_target().await?;
        Ok(client)
    }

    async fn create_target(&mut self) -> Result<()> {
        let result = self
            .call("Target.createTarget", json!({ "url": "about:blank" }))
            .await?;
        self.target_id = result["targetId"]
            .as_str()
            .context("Failed to get target ID")?
            .to_string();

        let attach = self
            .call(
                "Target.attachToTarget",
                json!({ "targetId": self.target_id, "flatten": true }),
            )
            .await?;
        self.session_id = attach["sessionId"]
            .as_str()
            .context("Failed to get session ID")?
            .to_string();

        self.call_in_session("Page.enable", json!({})).await?;
        self.call_in_session("Runtime.enable", json!({})).await?;
        Ok(())
    }

    /// Browser-level command
    async fn call(&mut self, method: &str, params: Value) -> Result<Value> {
        self.message_id += 1;
        let id = self.message_id;
        let message = json!({ "id": id, "method": method, "params": params });
        self.roundtrip(id, method, message).await
    }

    /// Command to the attached tab (flat protocol, sessionId inline)
    async fn call_in_session(&mut self, method: &str, params: Value) -> Result<Value> {
        self.message_id += 1;
        let id = self.message_id;
        let message = json!({
            "id": id,
            "method": method,
            "params": params,
            "sessionId": self.session_id,
        });
        self.roundtrip(id, method, message).await
    }

    async fn roundtrip(&mut self, id: u64, method: &str, message: Value) -> Result<Value> {
        // Params may carry typed secrets, so only the method is logged
        debug!(id, "CDP command: {}", method);

        self.ws_stream
            .send(Message::Text(message.to_string().into()))
            .await
            .with_context(|| format!("Failed to send CDP command {}", method))?;

        loop {
            let msg = self
                .ws_stream
                .next()
                .await
                .context("DevTools connection closed unexpectedly")??;

            match msg {
                Message::Text(text) => {
                    let response: Value = serde_json::from_str(&text)?;
                    if response.get("id").and_then(Value::as_u64) == Some(id) {
                        if let Some(error) = response.get("error") {
                            bail!("CDP error in {}: {}", method, error);
                        }
                        return Ok(response.get("result").cloned().unwrap_or(Value::Null));
                    }
                    // Events and replies to other commands
                }
                Message::Close(_) => bail!("DevTools connection closed by browser"),
                _ => {}
            }
        }
    }

    /// Evaluate an expression in the tab and return its value
    async fn evaluate(&mut self, expression: &str) -> Result<Value> {
        let result = self
            .call_in_session(
                "Runtime.evaluate",
                json!({ "expression": expression, "returnByValue": true }),
            )
            .await?;

        if let Some(details) = result.get("exceptionDetails") {
            bail!(
                "Script error: {}",
                details["exception"]["description"]
                    .as_str()
                    .or_else(|| details["text"].as_str())
                    .unwrap_or("unknown")
            );
        }

        Ok(result
            .get("result")
            .and_then(|r| r.get("value"))
            .cloned()
            .unwrap_or(Value::Null))
    }

    /// Flag the current document so a finished load can be told apart from it.
    /// Page.navigate and Page.reload reply before the old document is gone.
    async fn mark_stale(&mut self) -> Result<()> {
        self.evaluate(&format!("window.{} = true", STALE_FLAG)).await?;
        Ok(())
    }

    /// Poll until a new document has replaced the flagged one and finished loading
    async fn wait_until_loaded(&mut self) -> Result<()> {
        let deadline = Instant::now() + self.load_timeout;
        loop {
            if let Ok(state) = self.evaluate(&load_state_expression()).await {
                if is_fresh_load(&state) {
                    return Ok(());
                }
            }
            if Instant::now() > deadline {
                // The probe loop does its own element waits
                warn!("Page did not finish loading within {:?}", self.load_timeout);
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    async fn close(&mut self) {
        let target_id = self.target_id.clone();
        let _ = self
            .call("Target.closeTarget", json!({ "targetId": target_id }))
            .await;
        let _ = self.chrome_process.kill().await;

        if let Err(e) = std::fs::remove_dir_all(&self.profile_dir) {
            debug!("Could not remove {}: {}", self.profile_dir.display(), e);
        }
        info!("Chrome closed");
    }
}

/// Window property set on a document that is about to be replaced
const STALE_FLAG: &str = "__registrateStale";

fn load_state_expression() -> String {
    format!(
        "({{ stale: window.{} === true, readyState: document.readyState }})",
        STALE_FLAG
    )
}

/// Whether a load-state probe came from a new, fully loaded document
fn is_fresh_load(state: &Value) -> bool {
    state["stale"].as_bool() == Some(false) && state["readyState"].as_str() == Some("complete")
}

/// Find Chrome/Chromium executable
fn find_chrome(custom_path: &Option<String>) -> Result<String> {
    let candidates = [
        // Linux
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/snap/bin/chromium",
        // macOS
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
        // Windows
        "C:\\Program Files\\Google\\Chrome\\Application\\chrome.exe",
        "C:\\Program Files (x86)\\Google\\Chrome\\Application\\chrome.exe",
    ];
    let names = ["google-chrome", "google-chrome-stable", "chromium", "chromium-browser"];

    find_executable(custom_path, &candidates, &names).context(
        "Chrome or Chromium is required for the chrome backend.\n\
        Install it, set browser.binary_path, or use `--browser firefox`.",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flagged_document_is_not_a_fresh_load() {
        // The old page still reports "complete" right after Page.reload returns
        assert!(!is_fresh_load(&json!({ "stale": true, "readyState": "complete" })));
        assert!(!is_fresh_load(&json!({ "stale": false, "readyState": "interactive" })));
        assert!(!is_fresh_load(&json!({ "stale": false, "readyState": "loading" })));
        assert!(!is_fresh_load(&Value::Null));

        assert!(is_fresh_load(&json!({ "stale": false, "readyState": "complete" })));
    }

    #[test]
    fn test_load_state_expression_reads_flag() {
        let expression = load_state_expression();
        assert!(expression.contains(&format!("window.{} === true", STALE_FLAG)));
        assert!(expression.contains("document.readyState"));
    }
}
