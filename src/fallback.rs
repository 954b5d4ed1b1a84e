//! Tiered fallback for current weather and AQI.
//!
//! Weather: AccuWeather, then WAQI-derived, then scraper-derived, then
//! configured defaults. AQI: scraper, then WAQI, then the default. Every
//! response carries the tier that produced it.

use std::sync::Arc;
use std::time::Duration;

use aqi_scraper::Scraper;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::config::DefaultsConfig;
use common::{CurrentAqi, DataSource, ScrapedSnapshot, WeatherReport};
use tracing::{debug, info, warn};
use weather_client::waqi::condition_for_aqi;
use weather_client::{AqiProvider, WeatherProvider};

use crate::cache::TtlCache;

const CACHE_KEY: &str = "current";

/// Best-effort scraped reading.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn snapshot(&self) -> Option<ScrapedSnapshot>;
}

#[async_trait]
impl SnapshotSource for Scraper {
    async fn snapshot(&self) -> Option<ScrapedSnapshot> {
        self.current().await
    }
}

pub struct Conditions {
    weather_tiers: Vec<Arc<dyn WeatherProvider>>,
    aqi_tiers: Vec<Arc<dyn AqiProvider>>,
    scraper: Option<Arc<dyn SnapshotSource>>,
    defaults: DefaultsConfig,
    weather_cache: TtlCache<WeatherReport>,
    aqi_cache: TtlCache<CurrentAqi>,
}

impl Conditions {
    pub fn new(defaults: DefaultsConfig, cache_ttl: Duration) -> Self {
        Self {
            weather_tiers: Vec::new(),
            aqi_tiers: Vec::new(),
            scraper: None,
            defaults,
            weather_cache: TtlCache::new(cache_ttl),
            aqi_cache: TtlCache::new(cache_ttl),
        }
    }

    /// Append a weather tier; tiers are tried in insertion order.
    pub fn with_weather_tier(mut self, tier: Arc<dyn WeatherProvider>) -> Self {
        self.weather_tiers.push(tier);
        self
    }

    pub fn with_aqi_tier(mut self, tier: Arc<dyn AqiProvider>) -> Self {
        self.aqi_tiers.push(tier);
        self
    }

    pub fn with_scraper(mut self, scraper: Arc<dyn SnapshotSource>) -> Self {
        self.scraper = Some(scraper);
        self
    }

    /// Current weather from the first tier that answers.
    pub async fn weather(&self, now: DateTime<Utc>) -> WeatherReport {
        if let Some(cached) = self.weather_cache.get(CACHE_KEY) {
            debug!("Serving cached weather from {}", cached.source.as_str());
            return cached;
        }

        for tier in &self.weather_tiers {
            match tier.current_weather().await {
                Ok(report) => {
                    info!("Weather served by {}", tier.source().as_str());
                    self.weather_cache.insert(CACHE_KEY, report.clone());
                    return report;
                }
                Err(e) => warn!("Weather tier {} failed: {}", tier.source().as_str(), e),
            }
        }

        if let Some(report) = self.scraped_weather().await {
            info!("Weather derived from scraped dashboard");
            self.weather_cache.insert(CACHE_KEY, report.clone());
            return report;
        }

        warn!("All weather tiers failed; serving defaults");
        WeatherReport {
            temperature: self.defaults.temperature,
            humidity: self.defaults.humidity,
            wind_speed: self.defaults.wind_speed,
            condition: self.defaults.condition.clone(),
            source: DataSource::Default,
            observed_at: now,
        }
    }

    async fn scraped_weather(&self) -> Option<WeatherReport> {
        let snap = self.scraper.as_ref()?.snapshot().await?;
        let (Some(temperature), Some(humidity)) = (snap.temperature, snap.humidity) else {
            debug!("Scraped snapshot carries no temperature/humidity");
            return None;
        };
        Some(WeatherReport {
            temperature,
            humidity,
            wind_speed: snap.wind_speed.unwrap_or(self.defaults.wind_speed),
            condition: condition_for_aqi(Some(snap.aqi)),
            source: DataSource::Scraper,
            observed_at: snap.captured_at,
        })
    }

    /// Current AQI from the first tier that answers.
    pub async fn aqi(&self, now: DateTime<Utc>) -> CurrentAqi {
        if let Some(cached) = self.aqi_cache.get(CACHE_KEY) {
            debug!("Serving cached AQI from {}", cached.source.as_str());
            return cached;
        }

        if let Some(scraper) = &self.scraper {
            match scraper.snapshot().await {
                Some(snap) if snap.aqi > 0.0 => {
                    let current = CurrentAqi {
                        aqi: snap.aqi,
                        pollutants: snap.pollutants,
                        cities: snap.cities,
                        source: DataSource::Scraper,
                        observed_at: snap.captured_at,
                    };
                    self.aqi_cache.insert(CACHE_KEY, current.clone());
                    return current;
                }
                _ => warn!("Scraper produced no AQI; falling back"),
            }
        }

        for tier in &self.aqi_tiers {
            match tier.current_aqi().await {
                Ok(current) => {
                    info!("AQI served by {}", tier.source().as_str());
                    self.aqi_cache.insert(CACHE_KEY, current.clone());
                    return current;
                }
                Err(e) => warn!("AQI tier {} failed: {}", tier.source().as_str(), e),
            }
        }

        warn!("All AQI tiers failed; serving default");
        CurrentAqi {
            aqi: self.defaults.aqi,
            pollutants: Default::default(),
            cities: Vec::new(),
            source: DataSource::Default,
            observed_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Error;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedWeather {
        source: DataSource,
        result: Option<f64>,
        calls: AtomicUsize,
    }

    impl FixedWeather {
        fn new(source: DataSource, temperature: Option<f64>) -> Arc<Self> {
            Arc::new(Self {
                source,
                result: temperature,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl WeatherProvider for FixedWeather {
        fn source(&self) -> DataSource {
            self.source
        }

        async fn current_weather(&self) -> Result<WeatherReport, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let temperature = self.result.ok_or_else(|| Error::Http("upstream down".into()))?;
            Ok(WeatherReport {
                temperature,
                humidity: 40.0,
                wind_speed: 5.0,
                condition: "Clear".into(),
                source: self.source,
                observed_at: ts(),
            })
        }
    }

    struct FixedScrape(Option<ScrapedSnapshot>);

    #[async_trait]
    impl SnapshotSource for FixedScrape {
        async fn snapshot(&self) -> Option<ScrapedSnapshot> {
            self.0.clone()
        }
    }

    fn ts() -> DateTime<Utc> {
        DateTime::from_timestamp(1_762_070_000, 0).expect("valid ts")
    }

    fn snapshot(aqi: f64, temperature: Option<f64>) -> ScrapedSnapshot {
        ScrapedSnapshot {
            aqi,
            pollutants: BTreeMap::from([("pm25".to_string(), 196.0)]),
            captured_at: ts(),
            cities: Vec::new(),
            temperature,
            humidity: temperature.map(|_| 55.0),
            wind_speed: None,
        }
    }

    fn conditions() -> Conditions {
        Conditions::new(DefaultsConfig::default(), Duration::from_secs(600))
    }

    #[tokio::test]
    async fn test_weather_falls_through_to_second_tier() {
        let accu = FixedWeather::new(DataSource::AccuWeather, None);
        let waqi = FixedWeather::new(DataSource::Waqi, Some(21.0));
        let c = conditions().with_weather_tier(accu.clone()).with_weather_tier(waqi.clone());

        let report = c.weather(ts()).await;
        assert_eq!(report.source, DataSource::Waqi);
        assert_eq!(report.temperature, 21.0);

        c.weather(ts()).await;
        assert_eq!(accu.calls.load(Ordering::SeqCst), 1);
        assert_eq!(waqi.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_weather_uses_scraper_then_defaults() {
        let accu = FixedWeather::new(DataSource::AccuWeather, None);
        let scraped = conditions()
            .with_weather_tier(accu.clone())
            .with_scraper(Arc::new(FixedScrape(Some(snapshot(287.0, Some(29.0))))));
        let report = scraped.weather(ts()).await;
        assert_eq!(report.source, DataSource::Scraper);
        assert_eq!(report.temperature, 29.0);
        assert_eq!(report.condition, "Smog");

        let bare = conditions()
            .with_weather_tier(accu)
            .with_scraper(Arc::new(FixedScrape(Some(snapshot(287.0, None)))));
        let report = bare.weather(ts()).await;
        assert_eq!(report.source, DataSource::Default);
        assert_eq!(report.temperature, DefaultsConfig::default().temperature);
    }

    #[tokio::test]
    async fn test_aqi_prefers_scraper_and_defaults_last() {
        let c = conditions().with_scraper(Arc::new(FixedScrape(Some(snapshot(287.0, None)))));
        let current = c.aqi(ts()).await;
        assert_eq!(current.source, DataSource::Scraper);
        assert_eq!(current.aqi, 287.0);

        let none = conditions().with_scraper(Arc::new(FixedScrape(None)));
        let current = none.aqi(ts()).await;
        assert_eq!(current.source, DataSource::Default);
        assert_eq!(current.aqi, DefaultsConfig::default().aqi);
        assert_eq!(current.observed_at, ts());
    }
}
