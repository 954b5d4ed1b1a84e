//! Domain types shared across the dashboard.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Upper bound of the AQI scale accepted on input.
pub const AQI_MAX: f64 = 500.0;

// ── Readings ──────────────────────────────────────────────────────────

/// Where a reading came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadingSource {
    #[default]
    Manual,
    Sensor,
    Api,
}

impl ReadingSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Sensor => "sensor",
            Self::Api => "api",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "manual" => Some(Self::Manual),
            "sensor" => Some(Self::Sensor),
            "api" => Some(Self::Api),
            _ => None,
        }
    }
}

/// Pollutant concentrations. PM2.5 and PM10 are mandatory on every reading.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Pollutants {
    pub pm25: f64,
    pub pm10: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no2: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub so2: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub co: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub o3: Option<f64>,
}

impl Pollutants {
    pub fn new(pm25: f64, pm10: f64) -> Self {
        Self {
            pm25,
            pm10,
            ..Default::default()
        }
    }

    /// Optional pollutants that carry a value, in a fixed order.
    pub fn optional_fields(&self) -> impl Iterator<Item = (&'static str, f64)> {
        [
            ("no2", self.no2),
            ("so2", self.so2),
            ("co", self.co),
            ("o3", self.o3),
        ]
        .into_iter()
        .filter_map(|(name, v)| v.map(|v| (name, v)))
    }
}

/// A single station reading as submitted by an operator, sensor, or API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    pub station_id: String,
    pub aqi: f64,
    pub pollutants: Pollutants,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub source: ReadingSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

impl Reading {
    pub fn new(station_id: impl Into<String>, aqi: f64, pollutants: Pollutants) -> Self {
        Self {
            station_id: station_id.into(),
            aqi,
            pollutants,
            timestamp: Utc::now(),
            source: ReadingSource::Manual,
            metadata: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// A durable reading read back from history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub id: String,
    #[serde(flatten)]
    pub reading: Reading,
}

/// Latest-state snapshot kept in the live mirror at `stations/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveStation {
    pub aqi: f64,
    pub pm25: f64,
    pub pm10: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no2: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub so2: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub co: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub o3: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<ReadingSource>,
    /// Milliseconds since the Unix epoch.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_updated: DateTime<Utc>,
}

impl LiveStation {
    /// Mirror payload for a reading, stamped with `now`.
    pub fn from_reading(reading: &Reading, now: DateTime<Utc>) -> Self {
        let p = &reading.pollutants;
        Self {
            aqi: reading.aqi,
            pm25: p.pm25,
            pm10: p.pm10,
            no2: p.no2,
            so2: p.so2,
            co: p.co,
            o3: p.o3,
            source: Some(reading.source),
            last_updated: now,
        }
    }
}

/// Whole `stations` collection in the live mirror.
pub type LiveStations = BTreeMap<String, LiveStation>;

// ── History queries ───────────────────────────────────────────────────

/// Filter for a durable history lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryQuery {
    pub station_id: String,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: usize,
}

impl HistoryQuery {
    pub fn new(station_id: impl Into<String>, limit: usize) -> Self {
        Self {
            station_id: station_id.into(),
            start: None,
            end: None,
            limit,
        }
    }

    pub fn between(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self.end = Some(end);
        self
    }

    pub fn since(mut self, start: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self
    }

    /// True if `ts` falls inside the optional bounds (both inclusive).
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start.map_or(true, |s| ts >= s) && self.end.map_or(true, |e| ts <= e)
    }
}

/// Aggregate AQI figures over a lookback window.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AqiStats {
    pub average: f64,
    pub min: f64,
    pub max: f64,
    pub count: usize,
}

impl AqiStats {
    pub fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let average = values.iter().sum::<f64>() / values.len() as f64;
        Self {
            average,
            min,
            max,
            count: values.len(),
        }
    }
}

// ── Stations ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

/// Operator-maintained description of a monitoring station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationMetadata {
    pub id: String,
    pub name: String,
    pub location: String,
    pub coordinates: Coordinates,
    pub category: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Operator input for a station upsert; timestamps are assigned on write.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationUpsert {
    pub name: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub coordinates: Coordinates,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_category() -> String {
    "urban".into()
}

fn default_active() -> bool {
    true
}

// ── Scraper output ────────────────────────────────────────────────────

/// AQI reported for one city on the scraped dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityValue {
    pub name: String,
    pub value: f64,
}

/// Best-effort reading extracted from the third-party dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapedSnapshot {
    pub aqi: f64,
    pub pollutants: BTreeMap<String, f64>,
    pub captured_at: DateTime<Utc>,
    #[serde(default)]
    pub cities: Vec<CityValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wind_speed: Option<f64>,
}

// ── Weather / current conditions ──────────────────────────────────────

/// Fallback tier that produced a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    AccuWeather,
    Waqi,
    Scraper,
    Default,
}

impl DataSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AccuWeather => "accuweather",
            Self::Waqi => "waqi",
            Self::Scraper => "scraper",
            Self::Default => "default",
        }
    }
}

/// Current weather conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherReport {
    /// Degrees Celsius.
    pub temperature: f64,
    /// Relative humidity, percent.
    pub humidity: f64,
    /// Kilometres per hour.
    pub wind_speed: f64,
    pub condition: String,
    pub source: DataSource,
    pub observed_at: DateTime<Utc>,
}

/// Current AQI for the dashboard headline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentAqi {
    pub aqi: f64,
    pub pollutants: BTreeMap<String, f64>,
    #[serde(default)]
    pub cities: Vec<CityValue>,
    pub source: DataSource,
    pub observed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_live_station_omits_unset_pollutants() {
        let now = DateTime::from_timestamp_millis(1_700_000_000_000).expect("valid ts");
        let reading = Reading::new("s1", 287.0, Pollutants::new(196.0, 315.0));
        let live = LiveStation::from_reading(&reading, now);

        let json = serde_json::to_value(&live).expect("serializes");
        assert_eq!(json["aqi"], 287.0);
        assert_eq!(json["pm25"], 196.0);
        assert_eq!(json["pm10"], 315.0);
        assert_eq!(json["lastUpdated"], 1_700_000_000_000i64);
        assert!(json.get("no2").is_none());
        assert!(json.get("o3").is_none());
    }

    #[test]
    fn test_history_query_bounds_are_inclusive() {
        let start = DateTime::from_timestamp(1_000, 0).expect("valid ts");
        let end = DateTime::from_timestamp(2_000, 0).expect("valid ts");
        let q = HistoryQuery::new("s1", 10).between(start, end);

        assert!(q.contains(start));
        assert!(q.contains(end));
        assert!(!q.contains(DateTime::from_timestamp(2_001, 0).expect("valid ts")));
        assert!(HistoryQuery::new("s1", 10).contains(end));
    }

    #[test]
    fn test_stats_zeroed_when_empty() {
        assert_eq!(AqiStats::from_values(&[]), AqiStats::default());

        let stats = AqiStats::from_values(&[100.0, 200.0, 300.0]);
        assert_eq!(stats.count, 3);
        assert!((stats.average - 200.0).abs() < f64::EPSILON);
        assert_eq!(stats.min, 100.0);
        assert_eq!(stats.max, 300.0);
    }

    #[test]
    fn test_reading_source_parse() {
        assert_eq!(ReadingSource::parse(" Sensor "), Some(ReadingSource::Sensor));
        assert_eq!(ReadingSource::parse("satellite"), None);
        assert_eq!(
            serde_json::to_value(ReadingSource::Api).expect("serializes"),
            "api"
        );
    }
}
