//! Firestore REST durable store.

use async_trait::async_trait;
use common::config::FirebaseConfig;
use common::{Error, HistoryPoint, HistoryQuery, Reading, StationMetadata};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::backend::DurableStore;
use crate::document::{
    decode_document, decode_history_point, document_id, encode_document, reading_document,
    station_document,
};

const API_ROOT: &str = "https://firestore.googleapis.com/v1";

/// Durable store over the Firestore v1 REST API.
#[derive(Debug, Clone)]
pub struct FirestoreStore {
    client: reqwest::Client,
    /// `.../projects/{p}/databases/(default)/documents`
    documents_url: String,
    auth_token: String,
    readings_collection: String,
    stations_collection: String,
}

impl FirestoreStore {
    pub fn new(cfg: &FirebaseConfig) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(4)
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;

        Ok(Self {
            client,
            documents_url: format!(
                "{API_ROOT}/projects/{}/databases/(default)/documents",
                cfg.project_id
            ),
            auth_token: cfg.auth_token.clone(),
            readings_collection: cfg.readings_collection.clone(),
            stations_collection: cfg.stations_collection.clone(),
        })
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.auth_token.is_empty() {
            req
        } else {
            req.bearer_auth(&self.auth_token)
        }
    }

    async fn send(&self, req: reqwest::RequestBuilder, what: &str) -> Result<Option<Value>, Error> {
        let resp = self
            .authed(req)
            .send()
            .await
            .map_err(|e| Error::Durable(format!("{what}: {e}")))?;

        let status = resp.status().as_u16();
        if status == 404 {
            return Ok(None);
        }
        if !(200..300).contains(&status) {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Durable(format!(
                "{what} returned {status}: {}",
                body.chars().take(500).collect::<String>()
            )));
        }
        let body: Value = resp
            .json()
            .await
            .map_err(|e| Error::Durable(format!("{what}: invalid JSON: {e}")))?;
        Ok(Some(body))
    }
}

/// `structuredQuery` for a station history lookup.
pub fn history_query_body(collection: &str, query: &HistoryQuery) -> Value {
    let mut filters = vec![json!({
        "fieldFilter": {
            "field": { "fieldPath": "stationId" },
            "op": "EQUAL",
            "value": { "stringValue": query.station_id },
        }
    })];
    if let Some(start) = query.start {
        filters.push(json!({
            "fieldFilter": {
                "field": { "fieldPath": "timestamp" },
                "op": "GREATER_THAN_OR_EQUAL",
                "value": { "timestampValue": start.to_rfc3339() },
            }
        }));
    }
    if let Some(end) = query.end {
        filters.push(json!({
            "fieldFilter": {
                "field": { "fieldPath": "timestamp" },
                "op": "LESS_THAN_OR_EQUAL",
                "value": { "timestampValue": end.to_rfc3339() },
            }
        }));
    }

    json!({
        "structuredQuery": {
            "from": [{ "collectionId": collection }],
            "where": { "compositeFilter": { "op": "AND", "filters": filters } },
            "orderBy": [{ "field": { "fieldPath": "timestamp" }, "direction": "DESCENDING" }],
            "limit": query.limit,
        }
    })
}

/// Rows of a `runQuery` response. Rows without a document (the trailing
/// read-time marker) and undecodable documents are skipped.
pub fn parse_run_query(body: &Value) -> Vec<HistoryPoint> {
    body.as_array()
        .map(|rows| {
            rows.iter()
                .filter_map(|row| row.get("document"))
                .filter_map(|doc| match decode_history_point(doc) {
                    Ok(point) => Some(point),
                    Err(e) => {
                        warn!("Skipping undecodable reading document: {}", e);
                        None
                    }
                })
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl DurableStore for FirestoreStore {
    async fn append_reading(&self, reading: &Reading) -> Result<String, Error> {
        let body = encode_document(&reading_document(reading)?);
        let url = format!("{}/{}", self.documents_url, self.readings_collection);
        let created = self
            .send(self.client.post(&url).json(&body), "Firestore create")
            .await?
            .ok_or_else(|| Error::Durable(format!("collection {} not found", self.readings_collection)))?;

        let name = created
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Durable("create response without document name".into()))?;
        let id = document_id(name).to_string();
        debug!("Stored reading {} for {}", id, reading.station_id);
        Ok(id)
    }

    async fn query_readings(&self, query: &HistoryQuery) -> Result<Vec<HistoryPoint>, Error> {
        let body = history_query_body(&self.readings_collection, query);
        let url = format!("{}:runQuery", self.documents_url);
        let rows = self
            .send(self.client.post(&url).json(&body), "Firestore runQuery")
            .await?
            .unwrap_or(Value::Array(Vec::new()));
        Ok(parse_run_query(&rows))
    }

    async fn get_station(&self, id: &str) -> Result<Option<StationMetadata>, Error> {
        let url = format!("{}/{}/{}", self.documents_url, self.stations_collection, id);
        let Some(doc) = self.send(self.client.get(&url), "Firestore get").await? else {
            return Ok(None);
        };
        let Some((_, fields)) = decode_document(&doc) else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_value(fields)?))
    }

    async fn put_station(&self, station: &StationMetadata) -> Result<(), Error> {
        let body = encode_document(&station_document(station)?);
        let url = format!("{}/{}/{}", self.documents_url, self.stations_collection, station.id);
        self.send(self.client.patch(&url).json(&body), "Firestore patch")
            .await?;
        Ok(())
    }
}
