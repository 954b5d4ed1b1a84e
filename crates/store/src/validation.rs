//! Input validation for station readings.
//!
//! Raw JSON from the admin form is checked field by field so the caller
//! gets every problem at once. Nothing is written when validation fails.

use chrono::{DateTime, Utc};
use common::{Error, FieldIssue, Pollutants, Reading, ReadingSource, AQI_MAX};
use serde_json::{Map, Value};

const OPTIONAL_POLLUTANTS: [&str; 4] = ["no2", "so2", "co", "o3"];
const MAX_STATION_ID_LEN: usize = 128;

/// Station ids become Firestore document ids and Realtime Database keys,
/// so only `[A-Za-z0-9_-]` is accepted.
pub fn check_station_id(field: &str, id: &str, issues: &mut Vec<FieldIssue>) {
    if id.trim().is_empty() {
        issues.push(FieldIssue::new(field, "must be a non-empty string"));
    } else if id.len() > MAX_STATION_ID_LEN {
        issues.push(FieldIssue::new(
            field,
            format!("must be at most {MAX_STATION_ID_LEN} characters"),
        ));
    } else if !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        issues.push(FieldIssue::new(
            field,
            "may only contain letters, digits, '-' and '_'",
        ));
    }
}

/// Validate an already-typed reading.
pub fn validate_reading(reading: &Reading) -> Result<(), Error> {
    let mut issues = Vec::new();

    check_station_id("stationId", &reading.station_id, &mut issues);
    check_aqi(reading.aqi, &mut issues);
    check_concentration("pollutants.pm25", reading.pollutants.pm25, &mut issues);
    check_concentration("pollutants.pm10", reading.pollutants.pm10, &mut issues);
    for (name, value) in reading.pollutants.optional_fields() {
        check_concentration(&format!("pollutants.{name}"), value, &mut issues);
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(Error::Validation(issues))
    }
}

/// Validate a raw JSON reading and convert it.
///
/// `timestamp` defaults to `now` when absent; `source` defaults to manual.
pub fn validate_value(raw: &Value, now: DateTime<Utc>) -> Result<Reading, Error> {
    let Some(obj) = raw.as_object() else {
        return Err(Error::invalid("body", "expected a JSON object"));
    };
    let mut issues = Vec::new();

    let station_id = match obj.get("stationId") {
        Some(Value::String(s)) if !s.trim().is_empty() => {
            let id = s.trim().to_string();
            check_station_id("stationId", &id, &mut issues);
            id
        }
        _ => {
            issues.push(FieldIssue::new("stationId", "must be a non-empty string"));
            String::new()
        }
    };

    let aqi = match obj.get("aqi").and_then(Value::as_f64) {
        Some(v) => {
            check_aqi(v, &mut issues);
            v
        }
        None => {
            issues.push(FieldIssue::new("aqi", "must be a number"));
            0.0
        }
    };

    let pollutants = match obj.get("pollutants") {
        Some(Value::Object(p)) => parse_pollutants(p, &mut issues),
        _ => {
            issues.push(FieldIssue::new("pollutants", "must be an object with pm25 and pm10"));
            Pollutants::default()
        }
    };

    let timestamp = match obj.get("timestamp") {
        None | Some(Value::Null) => now,
        Some(v) => parse_timestamp(v).unwrap_or_else(|| {
            issues.push(FieldIssue::new(
                "timestamp",
                "must be an RFC 3339 string or epoch milliseconds",
            ));
            now
        }),
    };

    let source = match obj.get("source") {
        None | Some(Value::Null) => ReadingSource::Manual,
        Some(Value::String(s)) => ReadingSource::parse(s).unwrap_or_else(|| {
            issues.push(FieldIssue::new("source", "must be one of manual, sensor, api"));
            ReadingSource::Manual
        }),
        Some(_) => {
            issues.push(FieldIssue::new("source", "must be one of manual, sensor, api"));
            ReadingSource::Manual
        }
    };

    let metadata = match obj.get("metadata") {
        None | Some(Value::Null) => None,
        Some(Value::Object(m)) => Some(m.clone()),
        Some(_) => {
            issues.push(FieldIssue::new("metadata", "must be an object"));
            None
        }
    };

    if !issues.is_empty() {
        return Err(Error::Validation(issues));
    }

    Ok(Reading {
        station_id,
        aqi,
        pollutants,
        timestamp,
        source,
        metadata,
    })
}

fn parse_pollutants(p: &Map<String, Value>, issues: &mut Vec<FieldIssue>) -> Pollutants {
    let mut required = |name: &str| match p.get(name).and_then(Value::as_f64) {
        Some(v) => {
            check_concentration(&format!("pollutants.{name}"), v, issues);
            v
        }
        None => {
            issues.push(FieldIssue::new(format!("pollutants.{name}"), "is required and must be a number"));
            0.0
        }
    };
    let pm25 = required("pm25");
    let pm10 = required("pm10");

    let mut out = Pollutants::new(pm25, pm10);
    for name in OPTIONAL_POLLUTANTS {
        let value = match p.get(name) {
            None | Some(Value::Null) => None,
            Some(v) => match v.as_f64() {
                Some(n) => {
                    check_concentration(&format!("pollutants.{name}"), n, issues);
                    Some(n)
                }
                None => {
                    issues.push(FieldIssue::new(format!("pollutants.{name}"), "must be a number"));
                    None
                }
            },
        };
        match name {
            "no2" => out.no2 = value,
            "so2" => out.so2 = value,
            "co" => out.co = value,
            _ => out.o3 = value,
        }
    }
    out
}

fn parse_timestamp(v: &Value) -> Option<DateTime<Utc>> {
    match v {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    }
}

fn check_aqi(aqi: f64, issues: &mut Vec<FieldIssue>) {
    if !aqi.is_finite() || !(0.0..=AQI_MAX).contains(&aqi) {
        issues.push(FieldIssue::new("aqi", format!("must be between 0 and {AQI_MAX}")));
    }
}

fn check_concentration(field: &str, value: f64, issues: &mut Vec<FieldIssue>) {
    if !value.is_finite() || value < 0.0 {
        issues.push(FieldIssue::new(field, "must be a non-negative number"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_760_000_000, 0).expect("valid ts")
    }

    fn fields(err: Error) -> Vec<String> {
        match err {
            Error::Validation(issues) => issues.into_iter().map(|i| i.field).collect(),
            other => panic!("expected validation error, got {other}"),
        }
    }

    #[test]
    fn test_minimal_reading_accepted() {
        let raw = json!({ "stationId": "s1", "aqi": 287, "pollutants": { "pm25": 196, "pm10": 315 } });
        let reading = validate_value(&raw, now()).expect("valid");

        assert_eq!(reading.station_id, "s1");
        assert_eq!(reading.aqi, 287.0);
        assert_eq!(reading.pollutants, Pollutants::new(196.0, 315.0));
        assert_eq!(reading.timestamp, now());
        assert_eq!(reading.source, ReadingSource::Manual);
        assert!(reading.metadata.is_none());
    }

    #[test]
    fn test_aqi_bounds_inclusive() {
        for aqi in [0.0, 500.0] {
            let raw = json!({ "stationId": "s1", "aqi": aqi, "pollutants": { "pm25": 1, "pm10": 1 } });
            assert!(validate_value(&raw, now()).is_ok(), "aqi {aqi} should pass");
        }
        for aqi in [-1.0, 500.5] {
            let raw = json!({ "stationId": "s1", "aqi": aqi, "pollutants": { "pm25": 1, "pm10": 1 } });
            assert_eq!(fields(validate_value(&raw, now()).unwrap_err()), vec!["aqi"]);
        }
    }

    #[test]
    fn test_every_failing_field_reported() {
        let raw = json!({
            "stationId": "  ",
            "aqi": "high",
            "pollutants": { "pm25": -3, "no2": "lots" },
            "source": "satellite",
        });
        let got = fields(validate_value(&raw, now()).unwrap_err());
        assert_eq!(
            got,
            vec![
                "stationId",
                "aqi",
                "pollutants.pm25",
                "pollutants.pm10",
                "pollutants.no2",
                "source",
            ]
        );
    }

    #[test]
    fn test_path_like_station_ids_rejected() {
        for id in ["s1/../admin", "a.b", "x#y", "$root", "a[0]", "ünïcode"] {
            let raw = json!({ "stationId": id, "aqi": 50, "pollutants": { "pm25": 1, "pm10": 1 } });
            assert_eq!(
                fields(validate_value(&raw, now()).unwrap_err()),
                vec!["stationId"],
                "id {id} should be rejected"
            );
        }
        let raw = json!({ "stationId": "dwarka-sector_8", "aqi": 50, "pollutants": { "pm25": 1, "pm10": 1 } });
        assert!(validate_value(&raw, now()).is_ok());

        let typed = Reading::new("s1/../admin", 50.0, Pollutants::new(1.0, 1.0));
        assert_eq!(fields(validate_reading(&typed).unwrap_err()), vec!["stationId"]);
    }

    #[test]
    fn test_missing_pollutants_object() {
        let raw = json!({ "stationId": "s1", "aqi": 10 });
        assert_eq!(fields(validate_value(&raw, now()).unwrap_err()), vec!["pollutants"]);
        assert_eq!(fields(validate_value(&json!([1, 2]), now()).unwrap_err()), vec!["body"]);
    }

    #[test]
    fn test_optional_fields_parsed() {
        let raw = json!({
            "stationId": "ito",
            "aqi": 120.5,
            "pollutants": { "pm25": 60, "pm10": 110, "o3": 22.5 },
            "timestamp": "2025-11-02T06:30:00Z",
            "source": "sensor",
            "metadata": { "operator": "night shift" },
        });
        let reading = validate_value(&raw, now()).expect("valid");
        assert_eq!(reading.pollutants.o3, Some(22.5));
        assert_eq!(reading.pollutants.no2, None);
        assert_eq!(reading.source, ReadingSource::Sensor);
        assert_eq!(reading.timestamp.to_rfc3339(), "2025-11-02T06:30:00+00:00");
        assert_eq!(reading.metadata.expect("metadata")["operator"], "night shift");
    }

    #[test]
    fn test_typed_reading_rejects_nan() {
        let mut reading = Reading::new("s1", f64::NAN, Pollutants::new(1.0, f64::INFINITY));
        reading.pollutants.co = Some(-0.5);
        let got = fields(validate_reading(&reading).unwrap_err());
        assert_eq!(got, vec!["aqi", "pollutants.pm10", "pollutants.co"]);

        assert!(validate_reading(&Reading::new("s1", 42.0, Pollutants::new(1.0, 2.0))).is_ok());
    }
}
