//! Firefox backend over the W3C WebDriver protocol
//!
//! Spawns geckodriver on a free port and speaks plain JSON over HTTP to it.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::BrowserConfig;
use crate::tools::browser::{
    find_available_port, find_executable, validate_selector, wait_for_endpoint, PageDriver,
};

/// Key under which WebDriver returns element references
const ELEMENT_KEY: &str = "element-6066-11e4-a6ae-4f4e4f4e4f4e";

/// Error body returned by a WebDriver endpoint
#[derive(Debug, Deserialize, thiserror::Error)]
#[error("WebDriver error '{error}': {message}")]
struct WebDriverError {
    error: String,
    #[serde(default)]
    message: String,
}

struct GeckoSession {
    driver_process: tokio::process::Child,
    /// `http://127.0.0.1:<port>/session/<id>`
    session_url: String,
}

/// Firefox tab driven through geckodriver
pub struct WebDriverPage {
    http: reqwest::Client,
    session: Mutex<Option<GeckoSession>>,
}

impl WebDriverPage {
    pub async fn launch(config: &BrowserConfig) -> Result<Self> {
        let driver_path = find_executable(&config.driver_path, &[], &["geckodriver"]).context(
            "geckodriver is required for the firefox backend.\n\
            Install it, set browser.driver_path, or use `--browser chrome`.",
        )?;
        info!("Using geckodriver: {}", driver_path);

        let port = find_available_port().await?;
        let mut cmd = tokio::process::Command::new(&driver_path);
        cmd.arg("--port")
            .arg(port.to_string())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true);
        let driver_process = cmd
            .spawn()
            .with_context(|| format!("Failed to launch geckodriver: {}", driver_path))?;

        let base_url = format!("http://127.0.0.1:{}", port);
        wait_for_endpoint(&format!("{}/status", base_url), Duration::from_secs(10), |data| {
            data["value"]["ready"].as_bool().filter(|ready| *ready)
        })
        .await
        .context("geckodriver did not become ready")?;

        let http = reqwest::Client::new();
        let response = http
            .post(format!("{}/session", base_url))
            .json(&new_session_body(config))
            .send()
            .await
            .context("Failed to request a Firefox session")?;
        let value = unwrap_response(response).await?;
        let session_id = value["sessionId"]
            .as_str()
            .context("geckodriver returned no session id")?;
        debug!("WebDriver session {}", session_id);

        Ok(Self {
            http,
            session: Mutex::new(Some(GeckoSession {
                driver_process,
                session_url: format!("{}/session/{}", base_url, session_id),
            })),
        })
    }

    /// Send a command relative to the session URL and return its `value`
    async fn command(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
        let url = {
            let guard = self.session.lock().await;
            let session = guard.as_ref().context("Browser is closed")?;
            format!("{}{}", session.session_url, path)
        };
        debug!("WebDriver {} {}", method, path);

        let mut request = self.http.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request
            .send()
            .await
            .with_context(|| format!("WebDriver request {} failed", path))?;
        unwrap_response(response).await
    }

    /// Element reference for the first match, None when nothing matches
    async fn find(&self, selector: &str) -> Result<Option<String>> {
        validate_selector(selector)?;
        let result = self
            .command(
                Method::POST,
                "/element",
                Some(json!({ "using": "css selector", "value": selector })),
            )
            .await;

        match result {
            Ok(value) => Ok(Some(web_element_id(&value)?)),
            Err(e) if is_no_such_element(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn require(&self, selector: &str) -> Result<String> {
        match self.find(selector).await? {
            Some(id) => Ok(id),
            None => bail!("Element not found: {}", selector),
        }
    }
}

#[async_trait]
impl PageDriver for WebDriverPage {
    fn backend(&self) -> &'static str {
        "firefox"
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        debug!("Navigating to {}", url);
        self.command(Method::POST, "/url", Some(json!({ "url": url })))
            .await?;
        Ok(())
    }

    async fn element_present(&self, selector: &str) -> Result<bool> {
        Ok(self.find(selector).await?.is_some())
    }

    async fn type_text(&self, selector: &str, text: &str) -> Result<()> {
        let id = self.require(selector).await?;
        self.command(Method::POST, &format!("/element/{}/clear", id), Some(json!({})))
            .await?;
        self.command(
            Method::POST,
            &format!("/element/{}/value", id),
            Some(json!({ "text": text })),
        )
        .await?;
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<()> {
        let id = self.require(selector).await?;
        self.command(Method::POST, &format!("/element/{}/click", id), Some(json!({})))
            .await?;
        Ok(())
    }

    async fn page_html(&self) -> Result<String> {
        let value = self
            .command(
                Method::POST,
                "/execute/sync",
                Some(json!({
                    "script": "return document.body ? document.body.innerHTML : '';",
                    "args": []
                })),
            )
            .await?;
        Ok(value.as_str().unwrap_or("").to_string())
    }

    async fn refresh(&self) -> Result<()> {
        self.command(Method::POST, "/refresh", Some(json!({}))).await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let Some(mut session) = self.session.lock().await.take() else {
            return Ok(());
        };

        // Ends Firefox; geckodriver itself is killed below
        if let Err(e) = self.http.delete(&session.session_url).send().await {
            debug!("Failed to end WebDriver session: {}", e);
        }
        let _ = session.driver_process.kill().await;
        info!("Firefox closed");
        Ok(())
    }
}

fn new_session_body(config: &BrowserConfig) -> Value {
    let mut args = vec![
        format!("--width={}", config.window_width),
        format!("--height={}", config.window_height),
    ];
    if config.headless {
        args.push("-headless".to_string());
    }

    let mut firefox_options = json!({ "args": args });
    if let Some(binary) = &config.binary_path {
        firefox_options["binary"] = json!(binary);
    }

    json!({
        "capabilities": {
            "alwaysMatch": {
                "browserName": "firefox",
                "pageLoadStrategy": "normal",
                "timeouts": { "pageLoad": config.load_timeout_secs * 1000 },
                "moz:firefoxOptions": firefox_options
            }
        }
    })
}

/// Return the `value` of a successful response or turn the error body into an error
async fn unwrap_response(response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    let body: Value = response
        .json()
        .await
        .context("WebDriver returned a non-JSON body")?;
    let value = body.get("value").cloned().unwrap_or(Value::Null);

    if status.is_success() {
        return Ok(value);
    }

    match serde_json::from_value::<WebDriverError>(value) {
        Ok(err) => Err(err.into()),
        Err(_) => bail!("WebDriver request failed with status {}", status),
    }
}

fn is_no_such_element(err: &anyhow::Error) -> bool {
    err.downcast_ref::<WebDriverError>()
        .is_some_and(|e| e.error == "no such element")
}

/// Extract the element reference from a find-element result
fn web_element_id(value: &Value) -> Result<String> {
    value
        .get(ELEMENT_KEY)
        .and_then(Value::as_str)
        .map(str::to_string)
        .context("WebDriver returned no element reference")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_web_element_id() {
        let value = json!({ ELEMENT_KEY: "7e1f-42" });
        assert_eq!(web_element_id(&value).unwrap(), "7e1f-42");
        assert!(web_element_id(&json!({ "ELEMENT": "x" })).is_err());
    }

    #[test]
    fn test_new_session_body() {
        let config = BrowserConfig {
            headless: true,
            binary_path: Some("/opt/firefox/firefox".to_string()),
            ..BrowserConfig::default()
        };
        let body = new_session_body(&config);
        let always = &body["capabilities"]["alwaysMatch"];

        assert_eq!(always["browserName"], "firefox");
        assert_eq!(always["timeouts"]["pageLoad"], 10_000);
        assert_eq!(always["moz:firefoxOptions"]["binary"], "/opt/firefox/firefox");
        let args = always["moz:firefoxOptions"]["args"].as_array().unwrap();
        assert!(args.iter().any(|a| a == "-headless"));
        assert!(args.iter().any(|a| a == "--width=1280"));
    }

    fn webdriver_error(body: Value) -> anyhow::Error {
        serde_json::from_value::<WebDriverError>(body).unwrap().into()
    }

    #[test]
    fn test_no_such_element_detection() {
        let err = webdriver_error(json!({
            "error": "no such element",
            "message": "Unable to locate element: #submit_button"
        }));
        assert!(is_no_such_element(&err));
        assert!(is_no_such_element(&err.context("finding #submit_button")));

        let stale = webdriver_error(json!({ "error": "stale element reference", "message": "x" }));
        assert!(!is_no_such_element(&stale));

        // Matching is on the error code, not on message text
        let text_only = anyhow::anyhow!("WebDriver error 'no such element': Unable to locate element");
        assert!(!is_no_such_element(&text_only));
        let in_message = webdriver_error(json!({
            "error": "javascript error",
            "message": "no such element"
        }));
        assert!(!is_no_such_element(&in_message));
    }
}
