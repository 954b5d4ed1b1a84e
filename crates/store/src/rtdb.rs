//! Firebase Realtime Database REST live store.
//!
//! Writes are plain `PUT /stations/{id}.json`. Watching opens one shared
//! streaming request (`Accept: text/event-stream`) and folds `put`/`patch`
//! events into a local copy of the `stations` tree.

use std::time::Duration;

use async_trait::async_trait;
use common::config::FirebaseConfig;
use common::{Error, LiveStation, LiveStations};
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::backend::LiveStore;
use crate::sse::SseParser;

const STATIONS_PATH: &str = "stations";
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub struct RealtimeDbStore {
    client: reqwest::Client,
    stream_client: reqwest::Client,
    database_url: String,
    auth_token: String,
    watcher: Mutex<Option<watch::Sender<LiveStations>>>,
}

impl RealtimeDbStore {
    pub fn new(cfg: &FirebaseConfig) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(4)
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        // No overall timeout: the event stream stays open indefinitely.
        let stream_client = reqwest::Client::builder()
            .tcp_keepalive(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;

        Ok(Self {
            client,
            stream_client,
            database_url: cfg.database_url.trim_end_matches('/').to_string(),
            auth_token: cfg.auth_token.clone(),
            watcher: Mutex::new(None),
        })
    }

    fn url(&self, path: &str) -> String {
        let mut url = format!("{}/{}.json", self.database_url, path);
        if !self.auth_token.is_empty() {
            url.push_str("?auth=");
            url.push_str(&self.auth_token);
        }
        url
    }

    fn start_stream(&self, tx: watch::Sender<LiveStations>) {
        let client = self.stream_client.clone();
        let url = self.url(STATIONS_PATH);
        tokio::spawn(async move {
            loop {
                if tx.is_closed() {
                    debug!("No live subscribers left; stopping stream");
                    return;
                }
                match stream_once(&client, &url, &tx).await {
                    Ok(()) => info!("Realtime Database stream ended; reconnecting"),
                    Err(e) => warn!("Realtime Database stream failed: {}", e),
                }
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        });
    }
}

#[derive(Debug, Deserialize)]
struct StreamPayload {
    path: String,
    data: Value,
}

async fn stream_once(
    client: &reqwest::Client,
    url: &str,
    tx: &watch::Sender<LiveStations>,
) -> Result<(), Error> {
    let resp = client
        .get(url)
        .header(reqwest::header::ACCEPT, "text/event-stream")
        .send()
        .await
        .map_err(|e| Error::Live(e.to_string()))?;
    if !resp.status().is_success() {
        return Err(Error::Live(format!("stream returned {}", resp.status())));
    }

    let mut tree = Value::Null;
    let mut parser = SseParser::new();
    let mut body = resp.bytes_stream();

    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| Error::Live(e.to_string()))?;
        for event in parser.push(&chunk) {
            match event.event.as_str() {
                "put" | "patch" => {
                    let payload: StreamPayload = serde_json::from_str(&event.data)?;
                    apply_event(&mut tree, &event.event, &payload.path, payload.data);
                    tx.send_replace(stations_from_tree(&tree));
                }
                "keep-alive" => {}
                "cancel" | "auth_revoked" => {
                    return Err(Error::Live(format!("stream closed by server: {}", event.event)));
                }
                other => debug!("Ignoring stream event {}", other),
            }
        }
        if tx.is_closed() {
            return Ok(());
        }
    }
    Ok(())
}

/// Apply a streaming `put` (replace at path) or `patch` (merge children at
/// path) to the local tree.
pub fn apply_event(tree: &mut Value, kind: &str, path: &str, data: Value) {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let mut node = tree;
    for seg in &segments {
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        let Some(map) = node.as_object_mut() else { return };
        node = map.entry(seg.to_string()).or_insert(Value::Null);
    }

    match (kind, data) {
        ("patch", Value::Object(children)) => {
            if !node.is_object() {
                *node = Value::Object(Map::new());
            }
            if let Value::Object(map) = node {
                for (k, v) in children {
                    if v.is_null() {
                        map.remove(&k);
                    } else {
                        map.insert(k, v);
                    }
                }
            }
        }
        (_, data) => *node = data,
    }
}

/// Typed view of the `stations` tree. Malformed entries are skipped.
pub fn stations_from_tree(tree: &Value) -> LiveStations {
    let Some(map) = tree.as_object() else {
        return LiveStations::new();
    };
    map.iter()
        .filter_map(|(id, v)| match serde_json::from_value::<LiveStation>(v.clone()) {
            Ok(s) => Some((id.clone(), s)),
            Err(e) => {
                debug!("Skipping malformed live station {}: {}", id, e);
                None
            }
        })
        .collect()
}

#[async_trait]
impl LiveStore for RealtimeDbStore {
    async fn set_station(&self, id: &str, station: &LiveStation) -> Result<(), Error> {
        let url = self.url(&format!("{STATIONS_PATH}/{id}"));
        let resp = self
            .client
            .put(&url)
            .json(station)
            .send()
            .await
            .map_err(|e| Error::Live(e.to_string()))?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Live(format!(
                "PUT {STATIONS_PATH}/{id} returned {status}: {}",
                body.chars().take(500).collect::<String>()
            )));
        }
        Ok(())
    }

    async fn stations(&self) -> Result<LiveStations, Error> {
        let resp = self
            .client
            .get(self.url(STATIONS_PATH))
            .send()
            .await
            .map_err(|e| Error::Live(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(Error::Live(format!("GET {STATIONS_PATH} returned {}", resp.status())));
        }
        let tree: Value = resp.json().await.map_err(|e| Error::Live(e.to_string()))?;
        Ok(stations_from_tree(&tree))
    }

    async fn watch(&self) -> Result<watch::Receiver<LiveStations>, Error> {
        let mut watcher = self.watcher.lock().await;
        if let Some(tx) = watcher.as_ref() {
            if !tx.is_closed() {
                return Ok(tx.subscribe());
            }
        }

        let initial = self.stations().await.unwrap_or_else(|e| {
            warn!("Initial live snapshot failed: {}", e);
            LiveStations::new()
        });
        let (tx, rx) = watch::channel(initial);
        self.start_stream(tx.clone());
        *watcher = Some(tx);
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_put_then_patch_events() {
        let mut tree = Value::Null;
        apply_event(
            &mut tree,
            "put",
            "/",
            json!({ "s1": { "aqi": 287.0, "pm25": 196.0, "pm10": 315.0, "lastUpdated": 1_700_000_000_000i64 } }),
        );
        apply_event(
            &mut tree,
            "put",
            "/s2",
            json!({ "aqi": 90.0, "pm25": 30.0, "pm10": 60.0, "lastUpdated": 1_700_000_100_000i64 }),
        );
        apply_event(&mut tree, "patch", "/s1", json!({ "aqi": 301.0 }));

        let stations = stations_from_tree(&tree);
        assert_eq!(stations.len(), 2);
        assert_eq!(stations["s1"].aqi, 301.0);
        assert_eq!(stations["s1"].pm10, 315.0);
        assert_eq!(stations["s2"].pm25, 30.0);
    }

    #[test]
    fn test_null_put_removes_and_malformed_skipped() {
        let mut tree = json!({
            "s1": { "aqi": 1.0, "pm25": 1.0, "pm10": 1.0, "lastUpdated": 0 },
            "junk": { "aqi": "n/a" }
        });
        assert_eq!(stations_from_tree(&tree).len(), 1);

        apply_event(&mut tree, "put", "/s1", Value::Null);
        apply_event(&mut tree, "patch", "/", json!({ "junk": null }));
        assert!(stations_from_tree(&tree).is_empty());
        assert_eq!(tree, json!({ "s1": null }));
    }
}
