//! Configuration loader: `.env`, then `config.toml`, then environment.

use std::path::Path;

use common::config::AppConfig;
use common::Error;

fn parse_bool(raw: &str) -> bool {
    let lowered = raw.trim().to_ascii_lowercase();
    lowered != "0" && lowered != "false" && lowered != "no" && lowered != "off"
}

fn set_from_env(target: &mut String, name: &str) {
    if let Ok(value) = std::env::var(name) {
        *target = value.trim().to_string();
    }
}

/// Check cross-field constraints, reporting every problem at once.
pub fn validate_config(config: &AppConfig) -> Result<(), Error> {
    let mut issues: Vec<String> = Vec::new();

    if config.server.bind_addr.parse::<std::net::SocketAddr>().is_err() {
        issues.push(format!(
            "server.bind_addr '{}' is not a socket address",
            config.server.bind_addr
        ));
    }
    if config.stations.is_empty() {
        issues.push("stations must contain at least one station".into());
    }
    if config.stations.iter().any(|s| s.id.trim().is_empty()) {
        issues.push("stations entries need a non-empty id".into());
    }

    if config.weather.cache_secs == 0 {
        issues.push("weather.cache_secs must be > 0".into());
    }
    if config.weather.requests_per_minute == 0 {
        issues.push("weather.requests_per_minute must be > 0".into());
    }

    if config.scraper.enabled {
        if config.scraper.target_url.trim().is_empty() {
            issues.push("scraper.target_url is required when the scraper is enabled".into());
        }
        if config.scraper.webdriver_url.trim().is_empty() {
            issues.push("scraper.webdriver_url is required when the scraper is enabled".into());
        }
    }
    if config.scraper.max_attempts == 0 {
        issues.push("scraper.max_attempts must be > 0".into());
    }
    if config.scraper.challenge_timeout_secs == 0 {
        issues.push("scraper.challenge_timeout_secs must be > 0".into());
    }
    if config.scraper.navigation_timeout_secs == 0 {
        issues.push("scraper.navigation_timeout_secs must be > 0".into());
    }
    if config.scraper.backoff_min_ms > config.scraper.backoff_max_ms {
        issues.push("scraper.backoff_min_ms must be <= scraper.backoff_max_ms".into());
    }

    if config.sync.durable_timeout_secs == 0 {
        issues.push("sync.durable_timeout_secs must be > 0".into());
    }
    if config.sync.mirror_timeout_secs == 0 {
        issues.push("sync.mirror_timeout_secs must be > 0".into());
    }
    if config.sync.history_default_limit == 0 {
        issues.push("sync.history_default_limit must be > 0".into());
    }
    if config.sync.history_max_limit < config.sync.history_default_limit {
        issues.push("sync.history_max_limit must be >= sync.history_default_limit".into());
    }
    if config.sync.max_custom_range_days <= 0 {
        issues.push("sync.max_custom_range_days must be > 0".into());
    }

    if !(0.0..=common::AQI_MAX).contains(&config.defaults.aqi) {
        issues.push("defaults.aqi must be in [0,500]".into());
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "Invalid config:\n - {}",
            issues.join("\n - ")
        )))
    }
}

/// Apply environment overrides on top of file/default values.
pub fn apply_env_overrides(config: &mut AppConfig) {
    set_from_env(&mut config.server.bind_addr, "BIND_ADDR");
    set_from_env(&mut config.weather.accuweather_api_key, "ACCUWEATHER_API_KEY");
    set_from_env(&mut config.weather.accuweather_location_key, "ACCUWEATHER_LOCATION_KEY");
    set_from_env(&mut config.weather.waqi_token, "WAQI_TOKEN");
    set_from_env(&mut config.weather.waqi_city, "WAQI_CITY");
    set_from_env(&mut config.firebase.project_id, "FIREBASE_PROJECT_ID");
    set_from_env(&mut config.firebase.database_url, "FIREBASE_DATABASE_URL");
    set_from_env(&mut config.firebase.auth_token, "FIREBASE_AUTH_TOKEN");
    set_from_env(&mut config.scraper.webdriver_url, "SCRAPER_WEBDRIVER_URL");
    set_from_env(&mut config.scraper.target_url, "SCRAPER_TARGET_URL");
    if let Ok(raw) = std::env::var("SCRAPER_ENABLED") {
        config.scraper.enabled = parse_bool(&raw);
    }
}

/// Parse a TOML document into a config; absent sections keep defaults.
pub fn parse_config(contents: &str) -> Result<AppConfig, Error> {
    toml::from_str(contents).map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
}

/// Load configuration from `.env`, an optional TOML file, and environment.
///
/// Missing credentials are not errors; the corresponding tiers and stores
/// degrade. Only an unreadable or unparsable file, or values that fail
/// validation, are fatal.
pub fn load_config(path: &Path) -> Result<AppConfig, Error> {
    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!("No .env file loaded: {}", e);
    }

    let mut config = AppConfig::default();

    if path.exists() {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        config = parse_config(&contents)?;
    } else {
        tracing::debug!("{} not found; using defaults", path.display());
    }

    apply_env_overrides(&mut config);
    validate_config(&config)?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(validate_config(&AppConfig::default()).is_ok());
    }

    #[test]
    fn test_toml_sections_override_defaults() {
        let cfg = parse_config(
            r#"
            [server]
            bind_addr = "127.0.0.1:9000"

            [scraper]
            enabled = true
            max_attempts = 5

            [[stations]]
            id = "ito"
            name = "ITO"
            "#,
        )
        .expect("parses");

        assert_eq!(cfg.server.bind_addr, "127.0.0.1:9000");
        assert!(cfg.scraper.enabled);
        assert_eq!(cfg.scraper.max_attempts, 5);
        assert_eq!(cfg.scraper.freshness_secs, 300);
        assert_eq!(cfg.sync.durable_timeout_secs, 10);
        assert_eq!(cfg.stations.len(), 1);
        assert!(cfg.is_known_station("ito"));
        assert!(!cfg.is_known_station("rohini"));
    }

    #[test]
    fn test_validation_collects_all_issues() {
        let mut cfg = AppConfig::default();
        cfg.server.bind_addr = "not-an-addr".into();
        cfg.sync.history_default_limit = 2000;
        cfg.scraper.backoff_min_ms = 9_000;

        let msg = validate_config(&cfg).unwrap_err().to_string();
        assert!(msg.contains("server.bind_addr"));
        assert!(msg.contains("sync.history_max_limit"));
        assert!(msg.contains("scraper.backoff_min_ms"));
    }

    #[test]
    fn test_unparsable_file_is_config_error() {
        let err = parse_config("[server\nbind_addr = 1").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
