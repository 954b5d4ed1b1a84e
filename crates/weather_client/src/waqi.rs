//! World Air Quality Index (WAQI) city feed client.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CurrentAqi, DataSource, Error, WeatherReport};
use serde_json::Value;
use tracing::debug;

use crate::provider::{AqiProvider, WeatherProvider};
use crate::rate_limit::RateLimiter;

const BASE_URL: &str = "https://api.waqi.info";
const POLLUTANT_KEYS: [&str; 6] = ["pm25", "pm10", "no2", "so2", "co", "o3"];

#[derive(Debug, Clone)]
pub struct WaqiClient {
    client: reqwest::Client,
    token: String,
    city: String,
    base_url: String,
    limiter: RateLimiter,
}

/// Parsed `feed/{city}` payload.
#[derive(Debug, Clone, PartialEq)]
pub struct WaqiFeed {
    /// `None` when the station reports `"-"`.
    pub aqi: Option<f64>,
    pub pollutants: BTreeMap<String, f64>,
    /// Degrees Celsius.
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    /// Converted from m/s to km/h.
    pub wind_speed: Option<f64>,
    pub observed_at: Option<DateTime<Utc>>,
}

impl WaqiFeed {
    /// Parse the full response envelope (`{"status": ..., "data": ...}`).
    pub fn from_response(body: &Value) -> Result<Self, Error> {
        let status = body.get("status").and_then(Value::as_str).unwrap_or("missing");
        let data = body.get("data").unwrap_or(&Value::Null);
        if status != "ok" {
            let reason = data.as_str().unwrap_or("unknown error");
            return Err(Error::Waqi(format!("feed status {status}: {reason}")));
        }

        let iaqi = |key: &str| {
            data.get("iaqi")
                .and_then(|i| i.get(key))
                .and_then(|v| v.get("v"))
                .and_then(Value::as_f64)
                .filter(|v| v.is_finite())
        };

        let pollutants = POLLUTANT_KEYS
            .iter()
            .filter_map(|k| iaqi(k).map(|v| ((*k).to_string(), v)))
            .collect();

        let observed_at = data
            .get("time")
            .and_then(|t| t.get("iso"))
            .and_then(Value::as_str)
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|dt| dt.with_timezone(&Utc));

        Ok(Self {
            aqi: data.get("aqi").and_then(Value::as_f64).filter(|v| *v > 0.0),
            pollutants,
            temperature: iaqi("t"),
            humidity: iaqi("h"),
            wind_speed: iaqi("w").map(|ms| ms * 3.6),
            observed_at,
        })
    }

    pub fn to_current_aqi(&self, now: DateTime<Utc>) -> Result<CurrentAqi, Error> {
        let aqi = self
            .aqi
            .ok_or_else(|| Error::Waqi("station reported no AQI".into()))?;
        Ok(CurrentAqi {
            aqi,
            pollutants: self.pollutants.clone(),
            cities: Vec::new(),
            source: DataSource::Waqi,
            observed_at: self.observed_at.unwrap_or(now),
        })
    }

    /// Weather derived from the feed's `t`/`h`/`w` sub-indices.
    pub fn to_weather(&self, now: DateTime<Utc>) -> Result<WeatherReport, Error> {
        let (Some(temperature), Some(humidity)) = (self.temperature, self.humidity) else {
            return Err(Error::Waqi("feed carries no temperature/humidity".into()));
        };
        Ok(WeatherReport {
            temperature,
            humidity,
            wind_speed: self.wind_speed.unwrap_or(0.0),
            condition: condition_for_aqi(self.aqi),
            source: DataSource::Waqi,
            observed_at: self.observed_at.unwrap_or(now),
        })
    }
}

/// Sky description inferred from particulate load; the feed has no
/// condition text.
pub fn condition_for_aqi(aqi: Option<f64>) -> String {
    match aqi {
        Some(a) if a > 200.0 => "Smog",
        Some(a) if a > 100.0 => "Hazy",
        Some(_) => "Clear",
        None => "Unknown",
    }
    .to_string()
}

impl WaqiClient {
    pub fn new(token: String, city: String, limiter: RateLimiter) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(4)
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Waqi(format!("client build failed: {e}")))?;

        Ok(Self {
            client,
            token,
            city,
            base_url: BASE_URL.to_string(),
            limiter,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub async fn fetch_feed(&self) -> Result<WaqiFeed, Error> {
        self.limiter.wait().await;

        let url = format!("{}/feed/{}/", self.base_url, self.city);
        debug!("Fetching WAQI feed for {}", self.city);

        let resp = self
            .client
            .get(&url)
            .query(&[("token", self.token.as_str())])
            .send()
            .await
            .map_err(|e| Error::Waqi(format!("HTTP error for {}: {e}", self.city)))?;

        let status = resp.status().as_u16();
        if status != 200 {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Waqi(format!(
                "WAQI returned {} for {}: {}",
                status,
                self.city,
                body.chars().take(300).collect::<String>()
            )));
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| Error::Waqi(format!("JSON parse error for {}: {e}", self.city)))?;
        WaqiFeed::from_response(&body)
    }
}

#[async_trait]
impl WeatherProvider for WaqiClient {
    fn source(&self) -> DataSource {
        DataSource::Waqi
    }

    async fn current_weather(&self) -> Result<WeatherReport, Error> {
        self.fetch_feed().await?.to_weather(Utc::now())
    }
}

#[async_trait]
impl AqiProvider for WaqiClient {
    fn source(&self) -> DataSource {
        DataSource::Waqi
    }

    async fn current_aqi(&self) -> Result<CurrentAqi, Error> {
        self.fetch_feed().await?.to_current_aqi(Utc::now())
    }
}
