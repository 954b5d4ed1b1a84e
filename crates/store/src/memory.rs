//! In-process stores.
//!
//! Used when Firebase is not configured and in tests, where the failure
//! and latency knobs stand in for an unreachable backend.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use common::{Error, HistoryPoint, HistoryQuery, LiveStation, LiveStations, Reading, StationMetadata};
use tokio::sync::watch;
use uuid::Uuid;

use crate::backend::{DurableStore, LiveStore};

fn lock_err<T>(_: T) -> Error {
    Error::Other("memory store lock poisoned".into())
}

#[derive(Debug, Default)]
struct Faults {
    failing: AtomicBool,
    delay: Mutex<Duration>,
}

impl Faults {
    async fn apply(&self, err: impl FnOnce() -> Error) -> Result<(), Error> {
        let delay = self.delay.lock().map(|d| *d).unwrap_or_default();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(err());
        }
        Ok(())
    }
}

/// Durable store backed by a vector.
#[derive(Debug, Default)]
pub struct MemoryDurableStore {
    readings: Mutex<Vec<HistoryPoint>>,
    stations: Mutex<HashMap<String, StationMetadata>>,
    faults: Faults,
    queries: AtomicUsize,
}

impl MemoryDurableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail.
    pub fn set_failing(&self, failing: bool) {
        self.faults.failing.store(failing, Ordering::SeqCst);
    }

    /// Add latency before every operation.
    pub fn set_delay(&self, delay: Duration) {
        if let Ok(mut d) = self.faults.delay.lock() {
            *d = delay;
        }
    }

    /// Number of history queries served.
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn readings(&self) -> Vec<HistoryPoint> {
        self.readings.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl DurableStore for MemoryDurableStore {
    async fn append_reading(&self, reading: &Reading) -> Result<String, Error> {
        self.faults
            .apply(|| Error::Durable("injected write failure".into()))
            .await?;
        let id = Uuid::new_v4().simple().to_string();
        self.readings.lock().map_err(lock_err)?.push(HistoryPoint {
            id: id.clone(),
            reading: reading.clone(),
        });
        Ok(id)
    }

    async fn query_readings(&self, query: &HistoryQuery) -> Result<Vec<HistoryPoint>, Error> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.faults
            .apply(|| Error::Durable("injected query failure".into()))
            .await?;
        let mut hits: Vec<HistoryPoint> = self
            .readings
            .lock()
            .map_err(lock_err)?
            .iter()
            .filter(|p| p.reading.station_id == query.station_id && query.contains(p.reading.timestamp))
            .cloned()
            .collect();
        hits.sort_by(|a, b| b.reading.timestamp.cmp(&a.reading.timestamp));
        hits.truncate(query.limit);
        Ok(hits)
    }

    async fn get_station(&self, id: &str) -> Result<Option<StationMetadata>, Error> {
        self.faults
            .apply(|| Error::Durable("injected read failure".into()))
            .await?;
        Ok(self.stations.lock().map_err(lock_err)?.get(id).cloned())
    }

    async fn put_station(&self, station: &StationMetadata) -> Result<(), Error> {
        self.faults
            .apply(|| Error::Durable("injected write failure".into()))
            .await?;
        self.stations
            .lock()
            .map_err(lock_err)?
            .insert(station.id.clone(), station.clone());
        Ok(())
    }
}

/// Live mirror backed by a watch channel.
#[derive(Debug)]
pub struct MemoryLiveStore {
    tx: watch::Sender<LiveStations>,
    faults: Faults,
    failing_ids: Mutex<HashSet<String>>,
}

impl Default for MemoryLiveStore {
    fn default() -> Self {
        Self {
            tx: watch::Sender::new(LiveStations::new()),
            faults: Faults::default(),
            failing_ids: Mutex::default(),
        }
    }
}

impl MemoryLiveStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write fail.
    pub fn set_failing(&self, failing: bool) {
        self.faults.failing.store(failing, Ordering::SeqCst);
    }

    /// Make writes for one station fail.
    pub fn fail_station(&self, id: &str) {
        if let Ok(mut ids) = self.failing_ids.lock() {
            ids.insert(id.to_string());
        }
    }

    pub fn set_delay(&self, delay: Duration) {
        if let Ok(mut d) = self.faults.delay.lock() {
            *d = delay;
        }
    }

    pub fn snapshot(&self) -> LiveStations {
        self.tx.borrow().clone()
    }
}

#[async_trait]
impl LiveStore for MemoryLiveStore {
    async fn set_station(&self, id: &str, station: &LiveStation) -> Result<(), Error> {
        self.faults
            .apply(|| Error::Live("injected mirror failure".into()))
            .await?;
        let blocked = self.failing_ids.lock().map_err(lock_err)?.contains(id);
        if blocked {
            return Err(Error::Live(format!("injected mirror failure for {id}")));
        }
        let station = station.clone();
        self.tx.send_modify(|map| {
            map.insert(id.to_string(), station);
        });
        Ok(())
    }

    async fn stations(&self) -> Result<LiveStations, Error> {
        Ok(self.snapshot())
    }

    async fn watch(&self) -> Result<watch::Receiver<LiveStations>, Error> {
        Ok(self.tx.subscribe())
    }
}
