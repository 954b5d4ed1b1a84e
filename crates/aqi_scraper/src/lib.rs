//! Best-effort scraper for a bot-protected AQI dashboard.
//!
//! Drives Chrome over WebDriver with a randomized fingerprint per attempt,
//! waits out challenge interstitials, and extracts readings from page text.
//! Every failure resolves to "no data"; callers own the fallback chain.

pub mod driver;
pub mod extract;
pub mod pipeline;
pub mod profile;
pub mod retry;
pub mod stealth;
pub mod webdriver;

pub use driver::{BrowserDriver, BrowserSession, PageContext};
pub use extract::{extract_snapshot, is_challenge_page, PageContent};
pub use pipeline::{ScrapeSettings, Scraper};
pub use profile::BrowserProfile;
pub use retry::RetryPolicy;
pub use webdriver::WebDriverBrowser;
