//! W3C WebDriver automation surface.
//!
//! Talks to a driver process (chromedriver, geckodriver) over its HTTP API.
//! One [`WebDriverSurface`] owns exactly one browser session.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::WebDriverConfig;

use super::types::{css_literal, AutomationSurface, ElementHandle, Locator, SurfaceError, SurfaceFactory};

/// Key under which W3C drivers return element references.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// WebDriver key code for Enter.
const ENTER_KEY: &str = "\u{E007}";

/// Script used when a native click is intercepted by an overlay.
const SCRIPT_CLICK: &str = "arguments[0].click();";

/// Automation surface backed by a WebDriver session.
pub struct WebDriverSurface {
    client: Client,
    base_url: String,
    session_id: String,
    poll_interval: Duration,
}

impl WebDriverSurface {
    /// Start a new browser session.
    pub async fn connect(config: &WebDriverConfig) -> Result<Self, SurfaceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs as u64))
            .build()
            .map_err(|e| SurfaceError::Transport(e.to_string()))?;

        let base_url = config.url.trim_end_matches('/').to_string();
        let body = json!({ "capabilities": build_capabilities(config) });

        let value = send(client.post(format!("{}/session", base_url)).json(&body)).await?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| SurfaceError::Session("driver did not return a sessionId".to_string()))?
            .to_string();

        debug!("WebDriver session {} created at {}", session_id, base_url);

        let surface = Self {
            client,
            base_url,
            session_id,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        };

        if config.maximize {
            if let Err(e) = surface.post("/window/maximize", json!({})).await {
                warn!("Failed to maximize browser window: {}", e);
            }
        }

        Ok(surface)
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    fn session_url(&self, path: &str) -> String {
        format!("{}/session/{}{}", self.base_url, self.session_id, path)
    }

    async fn get(&self, path: &str) -> Result<Value, SurfaceError> {
        send(self.client.get(self.session_url(path))).await
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, SurfaceError> {
        send(self.client.post(self.session_url(path)).json(&body)).await
    }

    async fn find(&self, locator: &Locator) -> Result<ElementHandle, SurfaceError> {
        let value = self.post("/element", locator_body(locator)).await?;
        element_from_value(&value)
    }

    async fn is_clickable(&self, element: &ElementHandle) -> Result<bool, SurfaceError> {
        let displayed = self
            .get(&format!("/element/{}/displayed", element.id()))
            .await?
            .as_bool()
            .unwrap_or(false);
        if !displayed {
            return Ok(false);
        }
        Ok(self
            .get(&format!("/element/{}/enabled", element.id()))
            .await?
            .as_bool()
            .unwrap_or(false))
    }

    async fn script_click(&self, element: &ElementHandle) -> Result<(), SurfaceError> {
        self.post(
            "/execute/sync",
            json!({
                "script": SCRIPT_CLICK,
                "args": [{ ELEMENT_KEY: element.id() }],
            }),
        )
        .await
        .map(|_| ())
    }

    /// Poll `find` (and optionally interactability) until the deadline.
    async fn wait_for(
        &self,
        locator: &Locator,
        timeout: Duration,
        require_clickable: bool,
    ) -> Result<ElementHandle, SurfaceError> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.find(locator).await {
                Ok(element) => {
                    if !require_clickable {
                        return Ok(element);
                    }
                    match self.is_clickable(&element).await {
                        Ok(true) => return Ok(element),
                        Ok(false) => {}
                        Err(e) if e.is_stale() || e.is_missing() => {}
                        Err(e) => return Err(e),
                    }
                }
                Err(e) if e.is_missing() || e.is_stale() => {}
                Err(e) => return Err(e),
            }

            if Instant::now() + self.poll_interval > deadline {
                return Err(SurfaceError::Timeout {
                    locator: locator.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[async_trait]
impl AutomationSurface for WebDriverSurface {
    fn name(&self) -> &str {
        "webdriver"
    }

    async fn wait_clickable(
        &self,
        locator: &Locator,
        timeout: Duration,
    ) -> Result<ElementHandle, SurfaceError> {
        self.wait_for(locator, timeout, true).await
    }

    async fn wait_present(
        &self,
        locator: &Locator,
        timeout: Duration,
    ) -> Result<ElementHandle, SurfaceError> {
        self.wait_for(locator, timeout, false).await
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), SurfaceError> {
        match self
            .post(&format!("/element/{}/click", element.id()), json!({}))
            .await
        {
            Ok(_) => Ok(()),
            Err(SurfaceError::NotInteractable(reason)) => {
                debug!("Native click refused ({}), dispatching script click", reason);
                self.script_click(element).await
            }
            Err(e) => Err(e),
        }
    }

    async fn type_text(&self, element: &ElementHandle, text: &str) -> Result<(), SurfaceError> {
        self.post(
            &format!("/element/{}/value", element.id()),
            json!({ "text": text }),
        )
        .await
        .map(|_| ())
    }

    async fn submit(&self, element: &ElementHandle) -> Result<(), SurfaceError> {
        self.type_text(element, ENTER_KEY).await
    }

    async fn navigate(&self, url: &str) -> Result<(), SurfaceError> {
        self.post("/url", json!({ "url": url })).await.map(|_| ())
    }

    async fn refresh(&self) -> Result<(), SurfaceError> {
        self.post("/refresh", json!({})).await.map(|_| ())
    }

    async fn current_location(&self) -> Result<String, SurfaceError> {
        let value = self.get("/url").await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| SurfaceError::Protocol {
                code: "invalid response".to_string(),
                message: "current url was not a string".to_string(),
            })
    }

    async fn query_all(&self, locator: &Locator) -> Result<Vec<ElementHandle>, SurfaceError> {
        let value = self.post("/elements", locator_body(locator)).await?;
        match value.as_array() {
            Some(items) => items.iter().map(element_from_value).collect(),
            None => Ok(Vec::new()),
        }
    }

    async fn text(&self, element: &ElementHandle) -> Result<String, SurfaceError> {
        let value = self.get(&format!("/element/{}/text", element.id())).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn close(&self) -> Result<(), SurfaceError> {
        send(self.client.delete(self.session_url(""))).await.map(|_| ())
    }
}

/// Opens a fresh WebDriver session for every purchase run.
pub struct WebDriverSurfaceFactory {
    config: WebDriverConfig,
}

impl WebDriverSurfaceFactory {
    pub fn new(config: WebDriverConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SurfaceFactory for WebDriverSurfaceFactory {
    async fn create(&self) -> Result<Box<dyn AutomationSurface>, SurfaceError> {
        let surface = WebDriverSurface::connect(&self.config).await?;
        Ok(Box::new(surface))
    }
}

/// Send a request and unwrap the W3C `{"value": ...}` envelope.
async fn send(request: RequestBuilder) -> Result<Value, SurfaceError> {
    let response = request.send().await.map_err(|e| {
        if e.is_timeout() {
            SurfaceError::Transport("request timed out".to_string())
        } else if e.is_connect() {
            SurfaceError::Transport(format!("cannot reach driver: {}", e))
        } else {
            SurfaceError::Transport(e.to_string())
        }
    })?;

    let status = response.status();
    let body: Value = response
        .json()
        .await
        .map_err(|e| SurfaceError::Transport(format!("invalid driver response: {}", e)))?;
    let value = body.get("value").cloned().unwrap_or(Value::Null);

    if status.is_success() {
        Ok(value)
    } else {
        Err(map_driver_error(&value))
    }
}

/// Map a W3C error payload onto [`SurfaceError`].
fn map_driver_error(value: &Value) -> SurfaceError {
    let code = value
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("unknown error")
        .to_string();
    let message = value
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    match code.as_str() {
        "no such element" => SurfaceError::NotFound(message),
        "stale element reference" => SurfaceError::StaleElement(message),
        "element not interactable" | "element click intercepted" => {
            SurfaceError::NotInteractable(message)
        }
        "invalid session id" | "session not created" => SurfaceError::Session(message),
        _ => SurfaceError::Protocol { code, message },
    }
}

fn locator_body(locator: &Locator) -> Value {
    let (using, value) = match locator {
        Locator::Id(id) => ("css selector", format!("[id={}]", css_literal(id))),
        Locator::Css(css) => ("css selector", css.clone()),
        Locator::Xpath(xpath) => ("xpath", xpath.clone()),
    };
    json!({ "using": using, "value": value })
}

fn element_from_value(value: &Value) -> Result<ElementHandle, SurfaceError> {
    value
        .get(ELEMENT_KEY)
        .and_then(Value::as_str)
        .map(ElementHandle::new)
        .ok_or_else(|| SurfaceError::Protocol {
            code: "invalid response".to_string(),
            message: format!("missing element reference in {}", value),
        })
}

fn build_capabilities(config: &WebDriverConfig) -> Value {
    let mut args = config.args.clone();
    let browser = config.browser.to_lowercase();

    match browser.as_str() {
        "firefox" => {
            if config.headless {
                args.push("-headless".to_string());
            }
            if config.incognito {
                args.push("-private".to_string());
            }
            json!({ "alwaysMatch": { "browserName": "firefox", "moz:firefoxOptions": { "args": args } } })
        }
        _ => {
            if config.headless {
                args.push("--headless=new".to_string());
            }
            if config.incognito {
                args.push("--incognito".to_string());
            }
            json!({ "alwaysMatch": { "browserName": "chrome", "goog:chromeOptions": { "args": args } } })
        }
    }
}
