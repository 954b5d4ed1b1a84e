//! Browser automation seams.
//!
//! The pipeline only talks to these traits; [`crate::webdriver`] implements
//! them over chromedriver, tests implement them with scripted pages.

use async_trait::async_trait;
use common::Error;

use crate::profile::BrowserProfile;

/// Starts browser sessions.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>, Error>;
}

/// A running browser, reused across scrape calls while alive.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Cheap liveness check; false means the session must be relaunched.
    async fn is_alive(&self) -> bool;

    /// Open an isolated context with the given fingerprint applied. The
    /// stealth script must be registered before the first navigation.
    async fn open_context(&self, profile: &BrowserProfile) -> Result<Box<dyn PageContext>, Error>;

    async fn close(&self) -> Result<(), Error>;
}

/// One page inside an isolated context.
#[async_trait]
pub trait PageContext: Send {
    async fn goto(&mut self, url: &str) -> Result<(), Error>;

    /// Resolve once the document and its subresources have loaded.
    /// Unbounded; callers wrap it in a timeout.
    async fn wait_until_loaded(&mut self) -> Result<(), Error>;

    /// Visible text of the page body.
    async fn text(&mut self) -> Result<String, Error>;

    /// Text of every element matching a CSS selector.
    async fn query_texts(&mut self, selector: &str) -> Result<Vec<String>, Error>;

    async fn move_pointer(&mut self, x: f64, y: f64) -> Result<(), Error>;

    async fn scroll_by(&mut self, delta_y: f64) -> Result<(), Error>;

    async fn close(self: Box<Self>) -> Result<(), Error>;
}
