//! Dashboard configuration types.

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Weather and AQI API credentials.
    #[serde(default)]
    pub weather: WeatherConfig,

    /// Firebase project (durable + live stores).
    #[serde(default)]
    pub firebase: FirebaseConfig,

    /// Headless scraper settings.
    #[serde(default)]
    pub scraper: ScraperConfig,

    /// Dual-store write and history limits.
    #[serde(default)]
    pub sync: SyncConfig,

    /// Stations the history endpoint will answer for.
    #[serde(default = "default_stations")]
    pub stations: Vec<StationConfig>,

    /// Values served when every upstream tier fails.
    #[serde(default)]
    pub defaults: DefaultsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address to bind, e.g. "0.0.0.0:8080".
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Allow cross-origin requests from any origin.
    #[serde(default = "default_true")]
    pub permissive_cors: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    /// AccuWeather API key; the AccuWeather tier is skipped when empty.
    #[serde(default)]
    pub accuweather_api_key: String,

    /// AccuWeather location key for the dashboard city.
    #[serde(default = "default_accuweather_location")]
    pub accuweather_location_key: String,

    /// WAQI token; the WAQI tier is skipped when empty.
    #[serde(default)]
    pub waqi_token: String,

    /// WAQI feed name (city slug or `@station`).
    #[serde(default = "default_waqi_city")]
    pub waqi_city: String,

    /// How long a successful upstream response is reused.
    #[serde(default = "default_weather_cache")]
    pub cache_secs: u64,

    /// Outbound request budget per provider.
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirebaseConfig {
    /// Firestore project id; in-memory durable store when empty.
    #[serde(default)]
    pub project_id: String,

    /// Realtime Database URL, e.g. `https://<db>.firebaseio.com`;
    /// in-memory live store when empty.
    #[serde(default)]
    pub database_url: String,

    /// OAuth access token or database secret used for REST calls.
    #[serde(default)]
    pub auth_token: String,

    /// Firestore collection holding durable readings.
    #[serde(default = "default_readings_collection")]
    pub readings_collection: String,

    /// Firestore collection holding station metadata.
    #[serde(default = "default_stations_collection")]
    pub stations_collection: String,
}

impl FirebaseConfig {
    pub fn has_firestore(&self) -> bool {
        !self.project_id.trim().is_empty()
    }

    pub fn has_realtime_db(&self) -> bool {
        !self.database_url.trim().is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    #[serde(default)]
    pub enabled: bool,

    /// WebDriver endpoint (chromedriver).
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,

    /// Dashboard page to scrape.
    #[serde(default = "default_target_url")]
    pub target_url: String,

    /// Run Chrome without a visible window.
    #[serde(default = "default_true")]
    pub headless: bool,

    /// Reuse a successful scrape for this long.
    #[serde(default = "default_freshness")]
    pub freshness_secs: u64,

    /// Bound on page load before giving up an attempt.
    #[serde(default = "default_navigation_timeout")]
    pub navigation_timeout_secs: u64,

    /// Bound on waiting out bot challenges.
    #[serde(default = "default_challenge_timeout")]
    pub challenge_timeout_secs: u64,

    /// Full attempts (fresh context each) before returning no data.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Randomized backoff range between attempts.
    #[serde(default = "default_backoff_min")]
    pub backoff_min_ms: u64,
    #[serde(default = "default_backoff_max")]
    pub backoff_max_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_write_timeout")]
    pub durable_timeout_secs: u64,

    #[serde(default = "default_write_timeout")]
    pub mirror_timeout_secs: u64,

    /// Rows returned when a history query names no limit.
    #[serde(default = "default_history_limit")]
    pub history_default_limit: usize,

    /// Hard cap on rows per history query.
    #[serde(default = "default_history_max")]
    pub history_max_limit: usize,

    /// Longest span accepted for a custom history range.
    #[serde(default = "default_max_range_days")]
    pub max_custom_range_days: i64,
}

/// A station on the history allow-list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationConfig {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    #[serde(default = "default_aqi")]
    pub aqi: f64,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_humidity")]
    pub humidity: f64,
    #[serde(default = "default_wind")]
    pub wind_speed: f64,
    #[serde(default = "default_condition")]
    pub condition: String,
}

// ── Defaults ──────────────────────────────────────────────────────────

fn default_true() -> bool {
    true
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".into()
}

fn default_accuweather_location() -> String {
    // New Delhi
    "202396".into()
}
fn default_waqi_city() -> String {
    "delhi".into()
}
fn default_weather_cache() -> u64 {
    600
}
fn default_requests_per_minute() -> u32 {
    30
}

fn default_readings_collection() -> String {
    "aqi_readings".into()
}
fn default_stations_collection() -> String {
    "stations".into()
}

fn default_webdriver_url() -> String {
    "http://localhost:9515".into()
}
fn default_target_url() -> String {
    "https://www.aqi.in/dashboard/india/delhi/new-delhi".into()
}
fn default_freshness() -> u64 {
    300
}
fn default_navigation_timeout() -> u64 {
    45
}
fn default_challenge_timeout() -> u64 {
    30
}
fn default_max_attempts() -> u32 {
    3
}
fn default_backoff_min() -> u64 {
    2_000
}
fn default_backoff_max() -> u64 {
    5_000
}

fn default_write_timeout() -> u64 {
    10
}
fn default_history_limit() -> usize {
    100
}
fn default_history_max() -> usize {
    1_000
}
fn default_max_range_days() -> i64 {
    90
}

fn default_aqi() -> f64 {
    150.0
}
fn default_temperature() -> f64 {
    25.0
}
fn default_humidity() -> f64 {
    60.0
}
fn default_wind() -> f64 {
    10.0
}
fn default_condition() -> String {
    "Hazy".into()
}

fn default_stations() -> Vec<StationConfig> {
    [
        ("anand-vihar", "Anand Vihar"),
        ("ito", "ITO"),
        ("rk-puram", "R.K. Puram"),
        ("punjabi-bagh", "Punjabi Bagh"),
        ("dwarka-sector-8", "Dwarka Sector 8"),
        ("jahangirpuri", "Jahangirpuri"),
        ("rohini", "Rohini"),
        ("okhla-phase-2", "Okhla Phase 2"),
    ]
    .into_iter()
    .map(|(id, name)| StationConfig {
        id: id.into(),
        name: name.into(),
    })
    .collect()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            permissive_cors: true,
        }
    }
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            accuweather_api_key: String::new(),
            accuweather_location_key: default_accuweather_location(),
            waqi_token: String::new(),
            waqi_city: default_waqi_city(),
            cache_secs: default_weather_cache(),
            requests_per_minute: default_requests_per_minute(),
        }
    }
}

impl Default for FirebaseConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            database_url: String::new(),
            auth_token: String::new(),
            readings_collection: default_readings_collection(),
            stations_collection: default_stations_collection(),
        }
    }
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            webdriver_url: default_webdriver_url(),
            target_url: default_target_url(),
            headless: true,
            freshness_secs: default_freshness(),
            navigation_timeout_secs: default_navigation_timeout(),
            challenge_timeout_secs: default_challenge_timeout(),
            max_attempts: default_max_attempts(),
            backoff_min_ms: default_backoff_min(),
            backoff_max_ms: default_backoff_max(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            durable_timeout_secs: default_write_timeout(),
            mirror_timeout_secs: default_write_timeout(),
            history_default_limit: default_history_limit(),
            history_max_limit: default_history_max(),
            max_custom_range_days: default_max_range_days(),
        }
    }
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            aqi: default_aqi(),
            temperature: default_temperature(),
            humidity: default_humidity(),
            wind_speed: default_wind(),
            condition: default_condition(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            weather: WeatherConfig::default(),
            firebase: FirebaseConfig::default(),
            scraper: ScraperConfig::default(),
            sync: SyncConfig::default(),
            stations: default_stations(),
            defaults: DefaultsConfig::default(),
        }
    }
}

impl AppConfig {
    /// True if `id` is on the station allow-list.
    pub fn is_known_station(&self, id: &str) -> bool {
        self.stations.iter().any(|s| s.id == id)
    }
}
