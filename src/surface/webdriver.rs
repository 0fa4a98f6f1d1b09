//! W3C WebDriver implementation of [`Surface`].
//!
//! Talks plain JSON-over-HTTP to a driver endpoint (chromedriver,
//! geckodriver) so the courier can steer a real browser tab showing the
//! chat interface. Only the handful of endpoints the protocol needs are
//! implemented.

use super::{Probe, Surface};
use crate::{CourierError, Result};
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};

/// W3C element identifier key in WebDriver payloads
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// WebDriver keycode for Enter
const ENTER_KEY: &str = "\u{E007}";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A live WebDriver session over a browser tab.
pub struct WebDriverSurface {
    client: Client,
    base_url: String,
    session_id: String,
}

impl WebDriverSurface {
    /// Create a fresh session against `base_url` and navigate it to
    /// `page_url`.
    pub async fn connect(base_url: &str, page_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| CourierError::Surface(e.to_string()))?;

        let base_url = base_url.trim_end_matches('/').to_string();
        let body = json!({
            "capabilities": { "alwaysMatch": { "browserName": "chrome" } }
        });
        let value = Self::call(&client, &format!("{base_url}/session"), Some(&body)).await?;

        let session_id = value
            .get("sessionId")
            .and_then(|s| s.as_str())
            .ok_or_else(|| CourierError::Surface("no sessionId in response".to_string()))?
            .to_string();
        info!("WebDriver session {session_id} created");

        let surface = Self {
            client,
            base_url,
            session_id,
        };
        surface
            .session_call("url", Some(&json!({ "url": page_url })))
            .await?;
        Ok(surface)
    }

    /// Attach to an already-running session (e.g. a tab the user logged
    /// into by hand).
    pub fn attach(base_url: &str, session_id: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| CourierError::Surface(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            session_id: session_id.to_string(),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// POST (with body) or GET (without) a WebDriver endpoint, unwrapping
    /// the `value` envelope and surfacing driver errors.
    async fn call(client: &Client, url: &str, body: Option<&Value>) -> Result<Value> {
        let request = match body {
            Some(b) => client.post(url).json(b),
            None => client.get(url),
        };
        let response = request
            .send()
            .await
            .map_err(|e| CourierError::Surface(format!("webdriver request: {e}")))?;

        let status = response.status();
        let payload: Value = response
            .json()
            .await
            .map_err(|e| CourierError::Surface(format!("webdriver response: {e}")))?;
        let value = payload.get("value").cloned().unwrap_or(Value::Null);

        if !status.is_success() {
            let message = value
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown webdriver error");
            return Err(CourierError::Surface(format!("{status}: {message}")));
        }

        // Session creation nests sessionId inside value
        Ok(value)
    }

    async fn session_call(&self, path: &str, body: Option<&Value>) -> Result<Value> {
        let url = format!("{}/session/{}/{}", self.base_url, self.session_id, path);
        Self::call(&self.client, &url, body).await
    }

    async fn element_call(&self, element: &str, path: &str, body: Option<&Value>) -> Result<Value> {
        self.session_call(&format!("element/{element}/{path}"), body)
            .await
    }

    /// Run a script in the page with an element argument.
    async fn execute(&self, script: &str, args: Vec<Value>) -> Result<Value> {
        self.session_call("execute/sync", Some(&json!({ "script": script, "args": args })))
            .await
    }

    fn element_arg(element: &str) -> Value {
        json!({ ELEMENT_KEY: element })
    }
}

impl Surface for WebDriverSurface {
    type Handle = String;

    async fn locate(&mut self, probe: &Probe) -> Result<Option<Self::Handle>> {
        Ok(self.locate_all(probe).await?.into_iter().next())
    }

    async fn locate_all(&mut self, probe: &Probe) -> Result<Vec<Self::Handle>> {
        let body = json!({ "using": "css selector", "value": probe.selector });
        let value = self.session_call("elements", Some(&body)).await?;

        let handles = value
            .as_array()
            .map(|elements| {
                elements
                    .iter()
                    .filter_map(|e| e.get(ELEMENT_KEY))
                    .filter_map(|id| id.as_str())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();
        Ok(handles)
    }

    async fn fill(&mut self, handle: &Self::Handle, text: &str) -> Result<()> {
        // Set the content directly and dispatch the input event the host
        // listens on; send-keys is far too slow for chunk-sized payloads and
        // does not work on contenteditable hosts.
        let script = "\
            const el = arguments[0]; const text = arguments[1];\
            el.focus();\
            if (el.tagName === 'TEXTAREA' || el.tagName === 'INPUT') { el.value = text; }\
            else { el.innerText = text; }\
            el.dispatchEvent(new Event('input', { bubbles: true }));";
        self.execute(script, vec![Self::element_arg(handle), json!(text)])
            .await?;
        debug!("Filled element {handle} with {} chars", text.chars().count());
        Ok(())
    }

    async fn click(&mut self, handle: &Self::Handle) -> Result<()> {
        self.element_call(handle, "click", Some(&json!({}))).await?;
        Ok(())
    }

    async fn submit_key(&mut self, handle: &Self::Handle) -> Result<()> {
        self.element_call(handle, "value", Some(&json!({ "text": ENTER_KEY })))
            .await?;
        Ok(())
    }

    async fn is_enabled(&mut self, handle: &Self::Handle) -> Result<bool> {
        let value = self.element_call(handle, "enabled", None).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn text_of(&mut self, handle: &Self::Handle) -> Result<String> {
        let value = self.element_call(handle, "text", None).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn input_value(&mut self, handle: &Self::Handle) -> Result<String> {
        // `value` only exists on form controls; contenteditable hosts keep
        // the pending text in innerText.
        let script = "\
            const el = arguments[0];\
            return el.value !== undefined && el.value !== null ? el.value : el.innerText;";
        let value = self.execute(script, vec![Self::element_arg(handle)]).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }
}
