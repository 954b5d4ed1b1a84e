//! AccuWeather current-conditions client.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{DataSource, Error, WeatherReport};
use serde::Deserialize;
use tracing::debug;

use crate::provider::WeatherProvider;
use crate::rate_limit::RateLimiter;

const BASE_URL: &str = "https://dataservice.accuweather.com";

#[derive(Debug, Clone)]
pub struct AccuWeatherClient {
    client: reqwest::Client,
    api_key: String,
    location_key: String,
    base_url: String,
    limiter: RateLimiter,
}

/// One element of the `currentconditions/v1/{locationKey}` array.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CurrentConditions {
    #[serde(default)]
    pub local_observation_date_time: Option<String>,
    #[serde(default)]
    pub weather_text: Option<String>,
    #[serde(default)]
    pub temperature: Option<UnitPair>,
    #[serde(default)]
    pub relative_humidity: Option<f64>,
    #[serde(default)]
    pub wind: Option<Wind>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UnitPair {
    #[serde(default)]
    pub metric: Option<Measurement>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Measurement {
    pub value: f64,
    #[serde(default)]
    pub unit: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Wind {
    #[serde(default)]
    pub speed: Option<UnitPair>,
}

impl AccuWeatherClient {
    pub fn new(api_key: String, location_key: String, limiter: RateLimiter) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(4)
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| Error::AccuWeather(format!("client build failed: {e}")))?;

        Ok(Self {
            client,
            api_key,
            location_key,
            base_url: BASE_URL.to_string(),
            limiter,
        })
    }

    /// Point at a different host, e.g. a local stub.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub async fn fetch_current(&self) -> Result<Vec<CurrentConditions>, Error> {
        self.limiter.wait().await;

        let url = format!("{}/currentconditions/v1/{}", self.base_url, self.location_key);
        debug!("Fetching AccuWeather conditions for location {}", self.location_key);

        let resp = self
            .client
            .get(&url)
            .query(&[("apikey", self.api_key.as_str()), ("details", "true")])
            .send()
            .await
            .map_err(|e| Error::AccuWeather(format!("HTTP error: {e}")))?;

        let status = resp.status().as_u16();
        if status != 200 {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::AccuWeather(format!(
                "AccuWeather returned {}: {}",
                status,
                body.chars().take(300).collect::<String>()
            )));
        }

        resp.json()
            .await
            .map_err(|e| Error::AccuWeather(format!("JSON parse error: {e}")))
    }
}

fn metric(pair: Option<&UnitPair>) -> Option<f64> {
    pair?.metric.as_ref().map(|m| m.value).filter(|v| v.is_finite())
}

/// Map the first observation to a report.
pub fn to_report(conditions: &[CurrentConditions], now: DateTime<Utc>) -> Result<WeatherReport, Error> {
    let obs = conditions
        .first()
        .ok_or_else(|| Error::AccuWeather("empty current-conditions response".into()))?;

    let temperature = metric(obs.temperature.as_ref())
        .ok_or_else(|| Error::AccuWeather("observation without metric temperature".into()))?;
    let humidity = obs
        .relative_humidity
        .ok_or_else(|| Error::AccuWeather("observation without humidity".into()))?;
    let wind_speed = metric(obs.wind.as_ref().and_then(|w| w.speed.as_ref())).unwrap_or(0.0);

    let observed_at = obs
        .local_observation_date_time
        .as_deref()
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(now);

    Ok(WeatherReport {
        temperature,
        humidity,
        wind_speed,
        condition: obs.weather_text.clone().unwrap_or_else(|| "Unknown".into()),
        source: DataSource::AccuWeather,
        observed_at,
    })
}

#[async_trait]
impl WeatherProvider for AccuWeatherClient {
    fn source(&self) -> DataSource {
        DataSource::AccuWeather
    }

    async fn current_weather(&self) -> Result<WeatherReport, Error> {
        let conditions = self.fetch_current().await?;
        to_report(&conditions, Utc::now())
    }
}
