//! Field extraction from rendered page content.
//!
//! Pure functions over captured text so the heuristics can be exercised
//! against fixed fixtures without a browser.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use common::{CityValue, ScrapedSnapshot};
use regex::Regex;

/// Plausible AQI bounds for a scraped value; anything else is page noise.
const AQI_PLAUSIBLE: std::ops::RangeInclusive<f64> = 1.0..=999.0;

/// CSS selectors whose text usually holds the headline AQI.
pub const AQI_SELECTORS: &[&str] = &[
    "[class*='aqi-value']",
    "[class*='aqiValue']",
    "[class*='aqi_value']",
    "[class*='aqi-number']",
    "[class*='AqiValue']",
];

/// CSS selectors for per-city ranking rows.
pub const CITY_SELECTORS: &[&str] = &["[class*='city-ranking'] li", "[class*='cityRow']"];

/// Text fragments shown by common bot-challenge interstitials.
const CHALLENGE_MARKERS: &[&str] = &[
    "just a moment",
    "checking your browser",
    "verify you are human",
    "attention required",
    "cf-challenge",
    "ddos protection by",
    "enable javascript and cookies to continue",
    "please wait while we verify",
];

static AQI_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\b(?:US\s+)?AQI\b[^0-9\n]{0,24}(\d{1,3})\b",
        r"(?i)\b(\d{1,3})\s*(?:US\s+)?AQI\b",
        r"(?i)air\s+quality\s+index[^0-9\n]{0,24}(\d{1,3})\b",
    ]
    .into_iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

static POLLUTANT_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        ("pm25", r"(?i)\bPM\s*2(?:\.|,)?5\b[^0-9\n]{0,16}((?:\d{1,3}(?:,\d{3})+|\d+)(?:\.\d+)?)"),
        ("pm10", r"(?i)\bPM\s*10\b[^0-9\n]{0,16}((?:\d{1,3}(?:,\d{3})+|\d+)(?:\.\d+)?)"),
        ("no2", r"(?i)\bNO(?:2|₂)[^0-9\n]{0,16}((?:\d{1,3}(?:,\d{3})+|\d+)(?:\.\d+)?)"),
        ("so2", r"(?i)\bSO(?:2|₂)[^0-9\n]{0,16}((?:\d{1,3}(?:,\d{3})+|\d+)(?:\.\d+)?)"),
        ("co", r"(?i)\bCO\b[^0-9\n]{0,16}((?:\d{1,3}(?:,\d{3})+|\d+)(?:\.\d+)?)"),
        ("o3", r"(?i)\bO(?:3|₃)[^0-9\n]{0,16}((?:\d{1,3}(?:,\d{3})+|\d+)(?:\.\d+)?)"),
    ]
    .into_iter()
    .filter_map(|(name, p)| Regex::new(p).ok().map(|re| (name, re)))
    .collect()
});

static TEMPERATURE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(-?\d{1,2}(?:\.\d+)?)\s*°\s*C\b").ok());
static HUMIDITY: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)humidity[^0-9\n]{0,16}(\d{1,3}(?:\.\d+)?)\s*%").ok());
static WIND: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)wind(?:\s+speed)?[^0-9\n]{0,16}(\d{1,3}(?:\.\d+)?)\s*km/?h").ok()
});
static CITY_ROW: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:\d+\.?\s+)?([A-Za-z][A-Za-z .'\-]{1,48}?)\s+(\d{1,3})(?:\s*(?:US\s+)?AQI)?\s*$").ok()
});

/// Everything captured from a page once challenges have cleared.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageContent {
    /// Visible text (`document.body.innerText`).
    pub text: String,
    /// Texts of elements matching [`AQI_SELECTORS`].
    pub aqi_elements: Vec<String>,
    /// Texts of elements matching [`CITY_SELECTORS`].
    pub city_rows: Vec<String>,
}

/// True if the page text looks like an anti-bot interstitial.
pub fn is_challenge_page(text: &str) -> bool {
    let lowered = text.to_lowercase();
    CHALLENGE_MARKERS.iter().any(|m| lowered.contains(m))
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().replace(',', "").parse::<f64>().ok().filter(|v| v.is_finite())
}

fn first_capture(re: &Regex, text: &str) -> Option<f64> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| parse_number(m.as_str()))
}

/// Largest plausible AQI in the text and the AQI-classed elements.
/// Returns 0.0 when nothing plausible is found.
pub fn extract_aqi(content: &PageContent) -> f64 {
    let from_text = AQI_PATTERNS
        .iter()
        .flat_map(|re| re.captures_iter(&content.text))
        .filter_map(|c| c.get(1).and_then(|m| parse_number(m.as_str())));

    let from_dom = content.aqi_elements.iter().filter_map(|raw| {
        let digits: String = raw
            .trim()
            .chars()
            .take_while(|c| c.is_ascii_digit() || *c == '.')
            .collect();
        parse_number(&digits)
    });

    from_text
        .chain(from_dom)
        .filter(|v| AQI_PLAUSIBLE.contains(v))
        .fold(0.0, f64::max)
}

/// Pollutant concentrations keyed by `pm25`, `pm10`, `no2`, `so2`, `co`, `o3`.
pub fn extract_pollutants(text: &str) -> BTreeMap<String, f64> {
    POLLUTANT_PATTERNS
        .iter()
        .filter_map(|(name, re)| first_capture(re, text).map(|v| ((*name).to_string(), v)))
        .filter(|(_, v)| *v >= 0.0)
        .collect()
}

fn extract_cities(rows: &[String]) -> Vec<CityValue> {
    let Some(re) = CITY_ROW.as_ref() else {
        return Vec::new();
    };
    rows.iter()
        .flat_map(|row| row.lines())
        .filter_map(|line| {
            let caps = re.captures(line)?;
            let name = caps.get(1)?.as_str().trim().to_string();
            let value = parse_number(caps.get(2)?.as_str())?;
            AQI_PLAUSIBLE
                .contains(&value)
                .then_some(CityValue { name, value })
        })
        .collect()
}

/// Build a snapshot from captured content.
///
/// The snapshot's `aqi` is 0.0 when no plausible index was found; callers
/// treat that as a failed attempt.
pub fn extract_snapshot(content: &PageContent, captured_at: DateTime<Utc>) -> ScrapedSnapshot {
    let text = &content.text;
    ScrapedSnapshot {
        aqi: extract_aqi(content),
        pollutants: extract_pollutants(text),
        captured_at,
        cities: extract_cities(&content.city_rows),
        temperature: TEMPERATURE.as_ref().and_then(|re| first_capture(re, text)),
        humidity: HUMIDITY
            .as_ref()
            .and_then(|re| first_capture(re, text))
            .filter(|h| (0.0..=100.0).contains(h)),
        wind_speed: WIND.as_ref().and_then(|re| first_capture(re, text)),
    }
}
