//! Document building and Firestore typed-value encoding.

use common::{Error, HistoryPoint, Reading, StationMetadata};
use serde_json::{json, Map, Value};

/// Keys stored as Firestore `timestampValue` rather than strings.
const TIMESTAMP_KEYS: &[&str] = &["timestamp", "createdAt", "updatedAt"];

/// Plain JSON document for a reading. Unset optionals are omitted.
pub fn reading_document(reading: &Reading) -> Result<Map<String, Value>, Error> {
    match serde_json::to_value(reading)? {
        Value::Object(map) => Ok(map),
        _ => Err(Error::Durable("reading did not serialize to an object".into())),
    }
}

pub fn station_document(station: &StationMetadata) -> Result<Map<String, Value>, Error> {
    match serde_json::to_value(station)? {
        Value::Object(map) => Ok(map),
        _ => Err(Error::Durable("station did not serialize to an object".into())),
    }
}

/// Encode a plain JSON object as a Firestore `{"fields": ...}` body.
pub fn encode_document(doc: &Map<String, Value>) -> Value {
    json!({ "fields": encode_fields(doc, true) })
}

/// Timestamp keys are only recognized at the document's top level.
fn encode_fields(doc: &Map<String, Value>, top_level: bool) -> Value {
    let fields: Map<String, Value> = doc
        .iter()
        .map(|(k, v)| {
            let as_timestamp = top_level && TIMESTAMP_KEYS.contains(&k.as_str());
            (k.clone(), encode_value(as_timestamp, v))
        })
        .collect();
    Value::Object(fields)
}

fn encode_value(as_timestamp: bool, v: &Value) -> Value {
    match v {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => match n.as_i64() {
            Some(i) if !n.is_f64() => json!({ "integerValue": i.to_string() }),
            _ => json!({ "doubleValue": n.as_f64().unwrap_or_default() }),
        },
        Value::String(s) if as_timestamp => json!({ "timestampValue": s }),
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => {
            let values: Vec<Value> = items.iter().map(|i| encode_value(false, i)).collect();
            json!({ "arrayValue": { "values": values } })
        }
        Value::Object(map) => json!({ "mapValue": { "fields": encode_fields(map, false) } }),
    }
}

/// Decode a Firestore typed value back to plain JSON.
pub fn decode_value(v: &Value) -> Value {
    let Some(obj) = v.as_object() else {
        return Value::Null;
    };
    let Some((kind, inner)) = obj.iter().next() else {
        return Value::Null;
    };
    match kind.as_str() {
        "stringValue" | "timestampValue" | "booleanValue" | "doubleValue" => inner.clone(),
        "integerValue" => inner
            .as_str()
            .and_then(|s| s.parse::<i64>().ok())
            .map(Value::from)
            .unwrap_or_else(|| inner.clone()),
        "arrayValue" => Value::Array(
            inner
                .get("values")
                .and_then(Value::as_array)
                .map(|vals| vals.iter().map(decode_value).collect())
                .unwrap_or_default(),
        ),
        "mapValue" => decode_fields(inner.get("fields")),
        _ => Value::Null,
    }
}

fn decode_fields(fields: Option<&Value>) -> Value {
    let map: Map<String, Value> = fields
        .and_then(Value::as_object)
        .map(|f| f.iter().map(|(k, v)| (k.clone(), decode_value(v))).collect())
        .unwrap_or_default();
    Value::Object(map)
}

/// Document id from a resource name like `projects/p/databases/(default)/documents/coll/ID`.
pub fn document_id(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

/// Decode a Firestore document resource into `(id, plain fields)`.
pub fn decode_document(doc: &Value) -> Option<(String, Value)> {
    let name = doc.get("name")?.as_str()?;
    Some((document_id(name).to_string(), decode_fields(doc.get("fields"))))
}

/// Decode a Firestore reading document into a history point.
pub fn decode_history_point(doc: &Value) -> Result<HistoryPoint, Error> {
    let (id, fields) =
        decode_document(doc).ok_or_else(|| Error::Durable("document without a name".into()))?;
    let reading: Reading = serde_json::from_value(fields)?;
    Ok(HistoryPoint { id, reading })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use common::Pollutants;

    fn reading() -> Reading {
        Reading::new("s1", 287.0, Pollutants::new(196.0, 315.0))
            .with_timestamp(DateTime::from_timestamp(1_760_000_000, 0).expect("valid ts"))
    }

    #[test]
    fn test_reading_document_omits_unset_optionals() {
        let doc = reading_document(&reading()).expect("document");
        assert_eq!(doc["stationId"], "s1");
        assert_eq!(doc["aqi"], 287.0);
        assert_eq!(doc["pollutants"], json!({ "pm25": 196.0, "pm10": 315.0 }));
        assert_eq!(doc["source"], "manual");
        assert!(!doc.contains_key("metadata"));
    }

    #[test]
    fn test_firestore_encoding_types() {
        let doc = reading_document(&reading()).expect("document");
        let encoded = encode_document(&doc);
        let fields = &encoded["fields"];

        assert_eq!(fields["stationId"], json!({ "stringValue": "s1" }));
        assert_eq!(fields["aqi"], json!({ "doubleValue": 287.0 }));
        assert_eq!(
            fields["timestamp"]["timestampValue"],
            "2025-10-09T08:53:20Z"
        );
        assert_eq!(
            fields["pollutants"]["mapValue"]["fields"]["pm25"],
            json!({ "doubleValue": 196.0 })
        );
    }

    #[test]
    fn test_metadata_timestamp_keys_stay_strings() {
        let mut r = reading();
        let mut meta = Map::new();
        meta.insert("timestamp".into(), json!("night shift start"));
        meta.insert("createdAt".into(), json!("yesterday"));
        r.metadata = Some(meta);

        let encoded = encode_document(&reading_document(&r).expect("document"));
        let meta_fields = &encoded["fields"]["metadata"]["mapValue"]["fields"];
        assert_eq!(meta_fields["timestamp"], json!({ "stringValue": "night shift start" }));
        assert_eq!(meta_fields["createdAt"], json!({ "stringValue": "yesterday" }));
        assert!(encoded["fields"]["timestamp"].get("timestampValue").is_some());
    }

    #[test]
    fn test_decode_history_point_from_firestore() {
        let doc = json!({
            "name": "projects/p/databases/(default)/documents/aqi_readings/abc123",
            "fields": {
                "stationId": { "stringValue": "ito" },
                "aqi": { "integerValue": "212" },
                "pollutants": { "mapValue": { "fields": {
                    "pm25": { "doubleValue": 88.5 },
                    "pm10": { "integerValue": "140" }
                } } },
                "timestamp": { "timestampValue": "2025-11-02T06:30:00.123456Z" },
                "source": { "stringValue": "sensor" }
            }
        });

        let point = decode_history_point(&doc).expect("decodes");
        assert_eq!(point.id, "abc123");
        assert_eq!(point.reading.station_id, "ito");
        assert_eq!(point.reading.aqi, 212.0);
        assert_eq!(point.reading.pollutants.pm10, 140.0);
        assert_eq!(point.reading.source, common::ReadingSource::Sensor);
    }
}
