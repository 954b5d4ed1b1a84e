//! Scrape orchestration: cache, session reuse, challenge wait, retries.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use common::config::ScraperConfig;
use common::{Error, ScrapedSnapshot};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::driver::{BrowserDriver, BrowserSession, PageContext};
use crate::extract::{extract_snapshot, is_challenge_page, PageContent, AQI_SELECTORS, CITY_SELECTORS};
use crate::profile::BrowserProfile;
use crate::retry::RetryPolicy;

/// Tunables for one [`Scraper`].
#[derive(Debug, Clone)]
pub struct ScrapeSettings {
    pub target_url: String,
    /// Cached snapshots younger than this are served without a scrape.
    pub freshness: Duration,
    pub navigation_timeout: Duration,
    /// Wall-clock bound on waiting out challenge interstitials.
    pub challenge_timeout: Duration,
    /// Randomized sleep between challenge re-checks.
    pub challenge_poll_min: Duration,
    pub challenge_poll_max: Duration,
    pub retry: RetryPolicy,
}

impl ScrapeSettings {
    pub fn from_config(cfg: &ScraperConfig) -> Self {
        Self {
            target_url: cfg.target_url.clone(),
            freshness: Duration::from_secs(cfg.freshness_secs),
            navigation_timeout: Duration::from_secs(cfg.navigation_timeout_secs),
            challenge_timeout: Duration::from_secs(cfg.challenge_timeout_secs),
            challenge_poll_min: Duration::from_millis(1_000),
            challenge_poll_max: Duration::from_millis(2_500),
            retry: RetryPolicy::new(
                cfg.max_attempts,
                Duration::from_millis(cfg.backoff_min_ms),
                Duration::from_millis(cfg.backoff_max_ms),
            ),
        }
    }
}

#[derive(Debug, Clone)]
struct CachedSnapshot {
    snapshot: ScrapedSnapshot,
    fetched_at: Instant,
}

struct ScraperState {
    session: Option<Box<dyn BrowserSession>>,
    cache: Option<CachedSnapshot>,
    rng: StdRng,
}

/// Owns the browser session and the single-slot snapshot cache.
///
/// All access goes through one async mutex, so concurrent callers never
/// launch duplicate browsers; a caller that waited on an in-flight scrape
/// is served from the cache that scrape filled.
pub struct Scraper {
    driver: Arc<dyn BrowserDriver>,
    settings: ScrapeSettings,
    state: Mutex<ScraperState>,
}

impl Scraper {
    pub fn new(driver: Arc<dyn BrowserDriver>, settings: ScrapeSettings) -> Self {
        Self {
            driver,
            settings,
            state: Mutex::new(ScraperState {
                session: None,
                cache: None,
                rng: StdRng::from_entropy(),
            }),
        }
    }

    /// Current reading, from cache if fresh, else scraped.
    ///
    /// Returns `None` when every attempt failed. The cache is only written
    /// on success; an older snapshot survives a failed refresh.
    pub async fn current(&self) -> Option<ScrapedSnapshot> {
        let mut state = self.state.lock().await;

        if let Some(cached) = &state.cache {
            if cached.fetched_at.elapsed() < self.settings.freshness {
                debug!(
                    "Serving cached scrape ({}s old)",
                    cached.fetched_at.elapsed().as_secs()
                );
                return Some(cached.snapshot.clone());
            }
        }

        let snapshot = self.scrape_with_retries(&mut state).await;
        if let Some(snap) = &snapshot {
            state.cache = Some(CachedSnapshot {
                snapshot: snap.clone(),
                fetched_at: Instant::now(),
            });
        }
        snapshot
    }

    /// Last successful snapshot regardless of age.
    pub async fn last_snapshot(&self) -> Option<ScrapedSnapshot> {
        self.state
            .lock()
            .await
            .cache
            .as_ref()
            .map(|c| c.snapshot.clone())
    }

    /// Close the browser session. The next scrape relaunches it.
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        if let Some(session) = state.session.take() {
            info!("Closing scraper browser session");
            if let Err(e) = session.close().await {
                warn!("Browser close failed: {}", e);
            }
        }
    }

    async fn scrape_with_retries(&self, state: &mut ScraperState) -> Option<ScrapedSnapshot> {
        let policy = self.settings.retry;

        for attempt in 1..=policy.max_attempts {
            match self.attempt(state).await {
                Ok(Some(snapshot)) => {
                    info!(
                        "Scrape succeeded on attempt {}/{}: AQI={}",
                        attempt, policy.max_attempts, snapshot.aqi
                    );
                    return Some(snapshot);
                }
                Ok(None) => {
                    warn!(
                        "Scrape attempt {}/{} extracted no AQI",
                        attempt, policy.max_attempts
                    );
                }
                Err(e) => {
                    warn!("Scrape attempt {}/{} failed: {}", attempt, policy.max_attempts, e);
                }
            }

            if attempt < policy.max_attempts {
                let wait = policy.backoff(&mut state.rng);
                debug!("Backing off {:?} before next scrape attempt", wait);
                sleep(wait).await;
            }
        }

        warn!(
            "Scrape gave up after {} attempts; callers fall back",
            policy.max_attempts
        );
        None
    }

    /// One full attempt in a fresh context. `Ok(None)` means the page
    /// loaded but no plausible AQI was found.
    async fn attempt(&self, state: &mut ScraperState) -> Result<Option<ScrapedSnapshot>, Error> {
        self.ensure_session(state).await?;
        let Some(session) = state.session.as_ref() else {
            return Err(Error::Scraper("no browser session after launch".into()));
        };

        let profile = BrowserProfile::random(&mut state.rng);
        debug!(
            "Opening context: viewport={:?} locale={} ua={}",
            profile.viewport, profile.locale, profile.user_agent
        );
        let mut page = session.open_context(&profile).await?;

        let result = self.drive(page.as_mut(), &profile, &mut state.rng).await;
        if let Err(e) = page.close().await {
            debug!("Context close failed: {}", e);
        }
        result
    }

    async fn ensure_session(&self, state: &mut ScraperState) -> Result<(), Error> {
        if let Some(session) = &state.session {
            if session.is_alive().await {
                return Ok(());
            }
            warn!("Browser session disconnected; relaunching");
            if let Some(dead) = state.session.take() {
                if let Err(e) = dead.close().await {
                    debug!("Closing dead session failed: {}", e);
                }
            }
        }

        info!("Launching browser session");
        state.session = Some(self.driver.launch().await?);
        Ok(())
    }

    async fn drive(
        &self,
        page: &mut dyn PageContext,
        profile: &BrowserProfile,
        rng: &mut StdRng,
    ) -> Result<Option<ScrapedSnapshot>, Error> {
        let nav = timeout(self.settings.navigation_timeout, async {
            page.goto(&self.settings.target_url).await?;
            page.wait_until_loaded().await
        })
        .await;
        match nav {
            Ok(result) => result?,
            Err(_) => {
                return Err(Error::Timeout {
                    operation: format!("navigation to {}", self.settings.target_url),
                    timeout_ms: self.settings.navigation_timeout.as_millis() as u64,
                })
            }
        }

        let text = match timeout(
            self.settings.challenge_timeout,
            self.wait_out_challenge(page, profile, rng),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(Error::Timeout {
                    operation: "bot challenge".into(),
                    timeout_ms: self.settings.challenge_timeout.as_millis() as u64,
                })
            }
        };

        let content = PageContent {
            text,
            aqi_elements: collect_texts(page, AQI_SELECTORS).await,
            city_rows: collect_texts(page, CITY_SELECTORS).await,
        };

        let snapshot = extract_snapshot(&content, Utc::now());
        if snapshot.aqi <= 0.0 {
            return Ok(None);
        }
        Ok(Some(snapshot))
    }

    /// Poll until no challenge marker is visible; returns the cleared text.
    async fn wait_out_challenge(
        &self,
        page: &mut dyn PageContext,
        profile: &BrowserProfile,
        rng: &mut StdRng,
    ) -> Result<String, Error> {
        loop {
            let text = page.text().await?;
            if !is_challenge_page(&text) {
                return Ok(text);
            }

            debug!("Challenge page detected; simulating interaction");
            let (w, h) = profile.viewport;
            for _ in 0..rng.gen_range(2..=4) {
                let x = rng.gen_range(0.0..w as f64);
                let y = rng.gen_range(0.0..h as f64);
                page.move_pointer(x, y).await?;
            }
            page.scroll_by(rng.gen_range(80.0..400.0)).await?;

            sleep(self.poll_interval(rng)).await;
        }
    }

    fn poll_interval(&self, rng: &mut StdRng) -> Duration {
        let lo = self.settings.challenge_poll_min.as_millis() as u64;
        let hi = self.settings.challenge_poll_max.as_millis() as u64;
        if hi <= lo {
            return Duration::from_millis(lo);
        }
        Duration::from_millis(rng.gen_range(lo..=hi))
    }
}

async fn collect_texts(page: &mut dyn PageContext, selectors: &[&str]) -> Vec<String> {
    let mut out = Vec::new();
    for selector in selectors {
        match page.query_texts(selector).await {
            Ok(texts) => out.extend(texts),
            Err(e) => debug!("Selector {} failed: {}", selector, e),
        }
    }
    out
}
