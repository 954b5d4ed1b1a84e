//! Chromedriver-backed implementation of the browser seams.
//!
//! Fingerprint overrides go through chromedriver's CDP passthrough
//! (`goog/cdp/execute`), which applies them to the current window's target.
//! Each attempt gets its own CDP browser context (separate cookies, storage
//! and cache) holding one tab; the context is disposed when the attempt
//! ends. If the browser refuses to create a context, the attempt falls back
//! to a tab in the shared profile and wipes the target origin's storage
//! before navigating. The session itself stays up between scrapes.

use std::time::Duration;

use async_trait::async_trait;
use common::Error;
use fantoccini::error::CmdError;
use fantoccini::wd::{WebDriverCompatibleCommand, WindowHandle};
use fantoccini::{Client, ClientBuilder, Locator};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::driver::{BrowserDriver, BrowserSession, PageContext};
use crate::profile::BrowserProfile;
use crate::stealth::stealth_script;

const READY_POLL: Duration = Duration::from_millis(250);
const HANDLE_POLL: Duration = Duration::from_millis(100);
const HANDLE_POLL_ATTEMPTS: usize = 20;

fn browser_err(e: CmdError) -> Error {
    Error::Browser(e.to_string())
}

/// Chrome capabilities that strip the obvious automation switches.
pub fn chrome_capabilities(headless: bool) -> Map<String, Value> {
    let mut args = vec![
        "--disable-blink-features=AutomationControlled",
        "--no-sandbox",
        "--disable-dev-shm-usage",
        "--disable-infobars",
    ];
    if headless {
        args.push("--headless=new");
    }

    let mut caps = Map::new();
    caps.insert("browserName".into(), json!("chrome"));
    caps.insert(
        "goog:chromeOptions".into(),
        json!({
            "args": args,
            "excludeSwitches": ["enable-automation"],
            "useAutomationExtension": false,
        }),
    );
    caps
}

/// Raw CDP call routed through chromedriver.
#[derive(Debug, Clone)]
struct CdpCommand {
    cmd: &'static str,
    params: Value,
}

impl CdpCommand {
    fn new(cmd: &'static str, params: Value) -> Self {
        Self { cmd, params }
    }
}

impl WebDriverCompatibleCommand for CdpCommand {
    fn endpoint(&self, base_url: &url::Url, session_id: Option<&str>) -> Result<url::Url, url::ParseError> {
        let session = session_id.unwrap_or_default();
        base_url.join(&format!("session/{session}/goog/cdp/execute"))
    }

    fn method_and_body(&self, _request_url: &url::Url) -> (http::Method, Option<String>) {
        let body = json!({ "cmd": self.cmd, "params": self.params });
        (http::Method::POST, Some(body.to_string()))
    }
}

async fn cdp(client: &Client, cmd: &'static str, params: Value) -> Result<Value, Error> {
    client
        .issue_cmd(CdpCommand::new(cmd, params))
        .await
        .map_err(|e| Error::Browser(format!("{cmd}: {e}")))
}

fn string_field(response: &Value, key: &str) -> Result<String, Error> {
    response
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| Error::Browser(format!("CDP response without {key}: {response}")))
}

/// `scheme://host[:port]` of a navigation target, as CDP storage calls expect.
fn origin_of(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let origin = parsed.origin();
    origin.is_tuple().then(|| origin.ascii_serialization())
}

/// Launches chromedriver sessions.
#[derive(Debug, Clone)]
pub struct WebDriverBrowser {
    webdriver_url: String,
    headless: bool,
}

impl WebDriverBrowser {
    pub fn new(webdriver_url: impl Into<String>, headless: bool) -> Self {
        Self {
            webdriver_url: webdriver_url.into(),
            headless,
        }
    }
}

#[async_trait]
impl BrowserDriver for WebDriverBrowser {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>, Error> {
        let client = ClientBuilder::native()
            .capabilities(chrome_capabilities(self.headless))
            .connect(&self.webdriver_url)
            .await
            .map_err(|e| Error::Browser(format!("WebDriver connect to {}: {}", self.webdriver_url, e)))?;

        let home = client.window().await.map_err(browser_err)?;
        debug!("WebDriver session started at {}", self.webdriver_url);
        Ok(Box::new(WebDriverSession { client, home }))
    }
}

struct WebDriverSession {
    client: Client,
    /// Initial window; kept open so the session survives closing a tab.
    home: WindowHandle,
}

#[async_trait]
impl BrowserSession for WebDriverSession {
    async fn is_alive(&self) -> bool {
        self.client.windows().await.is_ok()
    }

    async fn open_context(&self, profile: &BrowserProfile) -> Result<Box<dyn PageContext>, Error> {
        let client = &self.client;
        let isolation = match self.open_isolated_tab().await {
            Ok(context_id) => Isolation::Context(context_id),
            Err(e) => {
                warn!("Browser context unavailable, using shared profile: {}", e);
                let tab = client.new_window(true).await.map_err(browser_err)?;
                client.switch_to_window(tab.handle).await.map_err(browser_err)?;
                client.delete_all_cookies().await.map_err(browser_err)?;
                Isolation::SharedProfile
            }
        };

        if let Err(e) = apply_profile(client, profile).await {
            match &isolation {
                Isolation::Context(context_id) => dispose_context(client, context_id).await,
                Isolation::SharedProfile => {
                    if let Err(close) = client.close_window().await {
                        debug!("Closing tab after failed context setup: {}", close);
                    }
                }
            }
            if let Err(switch) = client.switch_to_window(self.home.clone()).await {
                debug!("Switching back after failed context setup: {}", switch);
            }
            return Err(e);
        }

        let (width, height) = profile.viewport;
        Ok(Box::new(WebDriverPage {
            client: client.clone(),
            home: self.home.clone(),
            pointer: (width as f64 / 2.0, height as f64 / 2.0),
            isolation,
        }))
    }

    async fn close(&self) -> Result<(), Error> {
        self.client.clone().close().await.map_err(browser_err)
    }
}

impl WebDriverSession {
    /// Create a fresh browser context with one blank tab and switch to it.
    /// Returns the context id.
    async fn open_isolated_tab(&self) -> Result<String, Error> {
        let client = &self.client;
        let created = cdp(
            client,
            "Target.createBrowserContext",
            json!({ "disposeOnDetach": false }),
        )
        .await?;
        let context_id = string_field(&created, "browserContextId")?;

        match self.open_target(&context_id).await {
            Ok(()) => Ok(context_id),
            Err(e) => {
                dispose_context(client, &context_id).await;
                Err(e)
            }
        }
    }

    async fn open_target(&self, context_id: &str) -> Result<(), Error> {
        let client = &self.client;
        let target = cdp(
            client,
            "Target.createTarget",
            json!({ "url": "about:blank", "browserContextId": context_id }),
        )
        .await?;
        // Chromedriver window handles are DevTools target ids.
        let handle = WindowHandle::try_from(string_field(&target, "targetId")?)
            .map_err(|e| Error::Browser(format!("target handle: {e}")))?;

        for _ in 0..HANDLE_POLL_ATTEMPTS {
            let windows = client.windows().await.map_err(browser_err)?;
            if windows.contains(&handle) {
                return client.switch_to_window(handle).await.map_err(browser_err);
            }
            tokio::time::sleep(HANDLE_POLL).await;
        }
        Err(Error::Browser(format!("target in context {context_id} never appeared as a window")))
    }
}

async fn dispose_context(client: &Client, context_id: &str) {
    if let Err(e) = cdp(
        client,
        "Target.disposeBrowserContext",
        json!({ "browserContextId": context_id }),
    )
    .await
    {
        warn!("Disposing browser context {} failed: {}", context_id, e);
    }
}

/// Apply the fingerprint to the current target before its first navigation.
async fn apply_profile(client: &Client, profile: &BrowserProfile) -> Result<(), Error> {
    let (width, height) = profile.viewport;
    cdp(
        client,
        "Emulation.setDeviceMetricsOverride",
        json!({ "width": width, "height": height, "deviceScaleFactor": 1, "mobile": false }),
    )
    .await?;
    cdp(
        client,
        "Emulation.setUserAgentOverride",
        json!({
            "userAgent": profile.user_agent,
            "acceptLanguage": profile.languages().join(","),
            "platform": profile.platform(),
        }),
    )
    .await?;
    cdp(client, "Emulation.setLocaleOverride", json!({ "locale": profile.locale })).await?;
    cdp(
        client,
        "Emulation.setTimezoneOverride",
        json!({ "timezoneId": profile.timezone }),
    )
    .await?;
    if let Err(e) = cdp(client, "Browser.grantPermissions", json!({ "permissions": ["geolocation"] })).await {
        debug!("Geolocation grant rejected: {}", e);
    }
    cdp(
        client,
        "Emulation.setGeolocationOverride",
        json!({ "latitude": profile.latitude, "longitude": profile.longitude, "accuracy": 50 }),
    )
    .await?;
    cdp(
        client,
        "Page.addScriptToEvaluateOnNewDocument",
        json!({ "source": stealth_script(profile) }),
    )
    .await?;
    Ok(())
}

/// How an attempt's tab is separated from earlier attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Isolation {
    /// Dedicated CDP browser context, disposed on close.
    Context(String),
    /// Tab in the session's default profile; origin storage is wiped
    /// before each navigation.
    SharedProfile,
}

struct WebDriverPage {
    client: Client,
    home: WindowHandle,
    pointer: (f64, f64),
    isolation: Isolation,
}

#[async_trait]
impl PageContext for WebDriverPage {
    async fn goto(&mut self, url: &str) -> Result<(), Error> {
        if self.isolation == Isolation::SharedProfile {
            if let Some(origin) = origin_of(url) {
                cdp(
                    &self.client,
                    "Storage.clearDataForOrigin",
                    json!({ "origin": origin, "storageTypes": "all" }),
                )
                .await?;
            }
        }
        self.client.goto(url).await.map_err(browser_err)
    }

    async fn wait_until_loaded(&mut self) -> Result<(), Error> {
        loop {
            let state = self
                .client
                .execute("return document.readyState", vec![])
                .await
                .map_err(browser_err)?;
            if state.as_str() == Some("complete") {
                return Ok(());
            }
            tokio::time::sleep(READY_POLL).await;
        }
    }

    async fn text(&mut self) -> Result<String, Error> {
        let value = self
            .client
            .execute("return document.body ? document.body.innerText : ''", vec![])
            .await
            .map_err(browser_err)?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn query_texts(&mut self, selector: &str) -> Result<Vec<String>, Error> {
        let elements = self
            .client
            .find_all(Locator::Css(selector))
            .await
            .map_err(browser_err)?;
        let mut out = Vec::with_capacity(elements.len());
        for el in elements {
            match el.text().await {
                Ok(t) if !t.trim().is_empty() => out.push(t),
                Ok(_) => {}
                Err(e) => debug!("Element text for {} failed: {}", selector, e),
            }
        }
        Ok(out)
    }

    async fn move_pointer(&mut self, x: f64, y: f64) -> Result<(), Error> {
        cdp(
            &self.client,
            "Input.dispatchMouseEvent",
            json!({ "type": "mouseMoved", "x": x, "y": y }),
        )
        .await?;
        self.pointer = (x, y);
        Ok(())
    }

    async fn scroll_by(&mut self, delta_y: f64) -> Result<(), Error> {
        let (x, y) = self.pointer;
        cdp(
            &self.client,
            "Input.dispatchMouseEvent",
            json!({ "type": "mouseWheel", "x": x, "y": y, "deltaX": 0, "deltaY": delta_y }),
        )
        .await?;
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), Error> {
        match &self.isolation {
            Isolation::Context(context_id) => dispose_context(&self.client, context_id).await,
            Isolation::SharedProfile => {
                if let Err(e) = self.client.close_window().await {
                    warn!("Closing scrape tab failed: {}", e);
                }
            }
        }
        self.client
            .switch_to_window(self.home.clone())
            .await
            .map_err(browser_err)
    }
}
