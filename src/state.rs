//! Shared application state and its construction from configuration.

use std::sync::Arc;
use std::time::Duration;

use aqi_scraper::{ScrapeSettings, Scraper, WebDriverBrowser};
use common::{AppConfig, Error};
use store::{
    DualStoreSync, DurableStore, FirestoreStore, LiveStore, MemoryDurableStore, MemoryLiveStore,
    RealtimeDbStore, SyncSettings,
};
use tracing::{info, warn};
use weather_client::{AccuWeatherClient, RateLimiter, WaqiClient};

use crate::fallback::Conditions;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub sync: DualStoreSync,
    pub conditions: Arc<Conditions>,
    /// Held for shutdown; reads go through `conditions`.
    pub scraper: Option<Arc<Scraper>>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        sync: DualStoreSync,
        conditions: Conditions,
        scraper: Option<Arc<Scraper>>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            sync,
            conditions: Arc::new(conditions),
            scraper,
        }
    }

    /// Wire stores, upstream clients, and the scraper from configuration.
    /// Missing credentials degrade to in-memory stores and skipped tiers.
    pub fn from_config(config: AppConfig) -> Result<Self, Error> {
        let durable: Arc<dyn DurableStore> = if config.firebase.has_firestore() {
            info!("Durable store: Firestore project {}", config.firebase.project_id);
            Arc::new(FirestoreStore::new(&config.firebase)?)
        } else {
            warn!("FIREBASE_PROJECT_ID not set; history is kept in memory only");
            Arc::new(MemoryDurableStore::new())
        };
        let live: Arc<dyn LiveStore> = if config.firebase.has_realtime_db() {
            info!("Live store: Realtime Database {}", config.firebase.database_url);
            Arc::new(RealtimeDbStore::new(&config.firebase)?)
        } else {
            warn!("FIREBASE_DATABASE_URL not set; live mirror is in memory only");
            Arc::new(MemoryLiveStore::new())
        };
        let sync = DualStoreSync::new(durable, live, SyncSettings::from_config(&config.sync));

        let weather_cfg = &config.weather;
        let mut conditions = Conditions::new(
            config.defaults.clone(),
            Duration::from_secs(weather_cfg.cache_secs),
        );

        if weather_cfg.accuweather_api_key.is_empty() {
            info!("ACCUWEATHER_API_KEY not set; AccuWeather tier skipped");
        } else {
            let client = AccuWeatherClient::new(
                weather_cfg.accuweather_api_key.clone(),
                weather_cfg.accuweather_location_key.clone(),
                RateLimiter::per_minute(weather_cfg.requests_per_minute),
            )?;
            conditions = conditions.with_weather_tier(Arc::new(client));
        }

        if weather_cfg.waqi_token.is_empty() {
            info!("WAQI_TOKEN not set; WAQI tier skipped");
        } else {
            let waqi = Arc::new(WaqiClient::new(
                weather_cfg.waqi_token.clone(),
                weather_cfg.waqi_city.clone(),
                RateLimiter::per_minute(weather_cfg.requests_per_minute),
            )?);
            conditions = conditions
                .with_weather_tier(waqi.clone())
                .with_aqi_tier(waqi);
        }

        let scraper = if config.scraper.enabled {
            info!(
                "Scraper enabled: {} via {}",
                config.scraper.target_url, config.scraper.webdriver_url
            );
            let driver = WebDriverBrowser::new(config.scraper.webdriver_url.clone(), config.scraper.headless);
            let scraper = Arc::new(Scraper::new(
                Arc::new(driver),
                ScrapeSettings::from_config(&config.scraper),
            ));
            conditions = conditions.with_scraper(scraper.clone());
            Some(scraper)
        } else {
            None
        };

        Ok(Self::new(config, sync, conditions, scraper))
    }

    pub async fn shutdown(&self) {
        if let Some(scraper) = &self.scraper {
            scraper.shutdown().await;
        }
    }
}
