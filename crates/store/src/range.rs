//! History time-range resolution.
//!
//! Ranges are resolved and checked up front so a bad request never reaches
//! the store.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use common::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RangeKind {
    #[default]
    Last24h,
    Last7d,
    Last30d,
    Custom,
}

impl RangeKind {
    pub fn parse(raw: &str) -> Result<Self, Error> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "24h" => Ok(Self::Last24h),
            "7d" => Ok(Self::Last7d),
            "30d" => Ok(Self::Last30d),
            "custom" => Ok(Self::Custom),
            other => Err(Error::invalid(
                "range",
                format!("unknown range '{other}'; expected 24h, 7d, 30d or custom"),
            )),
        }
    }

    fn lookback(self) -> Option<Duration> {
        match self {
            Self::Last24h => Some(Duration::hours(24)),
            Self::Last7d => Some(Duration::days(7)),
            Self::Last30d => Some(Duration::days(30)),
            Self::Custom => None,
        }
    }
}

/// A resolved, validated `[start, end]` window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl HistoryRange {
    /// Resolve a range relative to `now`.
    ///
    /// Custom ranges need both bounds, `start <= end`, and a span of at
    /// most `max_days`. Preset ranges ignore the explicit bounds.
    pub fn resolve(
        kind: RangeKind,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        max_days: i64,
    ) -> Result<Self, Error> {
        if let Some(lookback) = kind.lookback() {
            return Ok(Self {
                start: now - lookback,
                end: now,
            });
        }

        let (Some(start), Some(end)) = (start, end) else {
            return Err(Error::invalid(
                "range",
                "custom range requires both start and end",
            ));
        };
        if start > end {
            return Err(Error::invalid("start", "start must not be after end"));
        }
        if end - start > Duration::days(max_days) {
            return Err(Error::invalid(
                "range",
                format!("custom range may span at most {max_days} days"),
            ));
        }
        Ok(Self { start, end })
    }
}

/// Parse a query-string bound: RFC 3339, `YYYY-MM-DD` (midnight UTC), or
/// epoch milliseconds.
pub fn parse_bound(field: &str, raw: &str) -> Result<DateTime<Utc>, Error> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc());
        }
    }
    if let Some(dt) = raw.parse::<i64>().ok().and_then(DateTime::from_timestamp_millis) {
        return Ok(dt);
    }
    Err(Error::invalid(
        field,
        "expected an RFC 3339 timestamp, a YYYY-MM-DD date, or epoch milliseconds",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_760_000_000, 0).expect("valid ts")
    }

    #[test]
    fn test_presets_resolve_relative_to_now() {
        let r = HistoryRange::resolve(RangeKind::Last7d, None, None, now(), 90).expect("preset");
        assert_eq!(r.end, now());
        assert_eq!(r.end - r.start, Duration::days(7));
        assert_eq!(RangeKind::parse("24H").expect("parses"), RangeKind::Last24h);
        assert!(RangeKind::parse("1y").is_err());
    }

    #[test]
    fn test_custom_range_checks() {
        let start = now() - Duration::days(10);
        assert!(HistoryRange::resolve(RangeKind::Custom, Some(start), Some(now()), now(), 90).is_ok());

        let missing = HistoryRange::resolve(RangeKind::Custom, Some(start), None, now(), 90);
        assert!(missing.unwrap_err().is_validation());

        let inverted = HistoryRange::resolve(RangeKind::Custom, Some(now()), Some(start), now(), 90);
        assert!(inverted.unwrap_err().is_validation());

        let too_wide = now() - Duration::days(91);
        let wide = HistoryRange::resolve(RangeKind::Custom, Some(too_wide), Some(now()), now(), 90);
        assert!(wide.unwrap_err().is_validation());

        let exact = now() - Duration::days(90);
        assert!(HistoryRange::resolve(RangeKind::Custom, Some(exact), Some(now()), now(), 90).is_ok());
    }

    #[test]
    fn test_parse_bound_formats() {
        let expected = DateTime::from_timestamp(1_761_955_200, 0).expect("valid ts");
        assert_eq!(parse_bound("start", "2025-11-01").expect("date"), expected);
        assert_eq!(parse_bound("start", "2025-11-01T00:00:00Z").expect("rfc3339"), expected);
        assert_eq!(parse_bound("start", "1761955200000").expect("millis"), expected);
        assert!(parse_bound("start", "yesterday").is_err());
    }
}
