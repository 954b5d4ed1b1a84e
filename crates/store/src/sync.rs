//! Read-after-write orchestration across the durable and live stores.
//!
//! The durable write decides success. The mirror write runs only after it,
//! under its own timeout, and its failure is logged and swallowed: the live
//! view may lag history but never leads it.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::config::SyncConfig;
use common::{
    AqiStats, Error, HistoryPoint, HistoryQuery, LiveStation, LiveStations, Reading,
    StationMetadata, StationUpsert,
};
use futures_util::future::join_all;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::backend::{DurableStore, LiveStore};
use crate::range::{HistoryRange, RangeKind};
use crate::subscription::Subscription;
use crate::validation::{check_station_id, validate_reading, validate_value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    pub durable_timeout: Duration,
    pub mirror_timeout: Duration,
    pub history_default_limit: usize,
    pub history_max_limit: usize,
    pub max_custom_range_days: i64,
}

impl SyncSettings {
    pub fn from_config(cfg: &SyncConfig) -> Self {
        Self {
            durable_timeout: Duration::from_secs(cfg.durable_timeout_secs),
            mirror_timeout: Duration::from_secs(cfg.mirror_timeout_secs),
            history_default_limit: cfg.history_default_limit.max(1),
            history_max_limit: cfg.history_max_limit.max(1),
            max_custom_range_days: cfg.max_custom_range_days,
        }
    }

    /// Requested limit, defaulted and capped.
    pub fn clamp_limit(&self, requested: Option<usize>) -> usize {
        match requested {
            Some(0) | None => self.history_default_limit.min(self.history_max_limit),
            Some(n) => n.min(self.history_max_limit),
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}

/// Result of a successful submit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOutcome {
    /// Id assigned by the durable store.
    pub document_id: String,
    /// False when the mirror write failed or timed out.
    pub mirrored: bool,
}

/// Per-station result of a batch mirror update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorOutcome {
    pub station_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MirrorOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

async fn bounded<T, F>(operation: &str, limit: Duration, fut: F) -> Result<T, Error>
where
    F: Future<Output = Result<T, Error>>,
{
    match timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout {
            operation: operation.to_string(),
            timeout_ms: limit.as_millis() as u64,
        }),
    }
}

/// Dual-store write path and history reads.
#[derive(Clone)]
pub struct DualStoreSync {
    durable: Arc<dyn DurableStore>,
    live: Arc<dyn LiveStore>,
    settings: SyncSettings,
}

impl DualStoreSync {
    pub fn new(durable: Arc<dyn DurableStore>, live: Arc<dyn LiveStore>, settings: SyncSettings) -> Self {
        Self {
            durable,
            live,
            settings,
        }
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Validate raw JSON, then [`Self::submit`].
    pub async fn submit_value(&self, raw: &Value) -> Result<SyncOutcome, Error> {
        let reading = validate_value(raw, Utc::now())?;
        self.submit(&reading).await
    }

    /// Validate, append to history, then mirror the latest state.
    ///
    /// Fails only on validation or on a durable error or timeout. No
    /// automatic retry happens on either write.
    pub async fn submit(&self, reading: &Reading) -> Result<SyncOutcome, Error> {
        validate_reading(reading)?;

        let document_id = bounded(
            "durable write",
            self.settings.durable_timeout,
            self.durable.append_reading(reading),
        )
        .await
        .inspect_err(|e| warn!("Durable write for {} failed: {}", reading.station_id, e))?;

        let live = LiveStation::from_reading(reading, Utc::now());
        let mirrored = match self.mirror(&reading.station_id, &live).await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    "Mirror write for {} failed, live view will lag: {}",
                    reading.station_id, e
                );
                false
            }
        };

        info!(
            "Stored reading {} for {} (AQI={}, source={}, mirrored={})",
            document_id,
            reading.station_id,
            reading.aqi,
            reading.source.as_str(),
            mirrored
        );
        Ok(SyncOutcome {
            document_id,
            mirrored,
        })
    }

    /// Single mirror write under the mirror timeout.
    pub async fn mirror(&self, station_id: &str, station: &LiveStation) -> Result<(), Error> {
        let mut issues = Vec::new();
        check_station_id("stationId", station_id, &mut issues);
        if !issues.is_empty() {
            return Err(Error::Validation(issues));
        }
        bounded(
            "mirror write",
            self.settings.mirror_timeout,
            self.live.set_station(station_id, station),
        )
        .await
    }

    /// Mirror many stations concurrently. Every item runs to completion or
    /// its own timeout; one failure does not cancel the rest.
    pub async fn mirror_batch(&self, updates: &[(String, LiveStation)]) -> Vec<MirrorOutcome> {
        let writes = updates.iter().map(|(id, station)| async move {
            let result = self.mirror(id, station).await;
            if let Err(e) = &result {
                warn!("Batch mirror write for {} failed: {}", id, e);
            }
            MirrorOutcome {
                station_id: id.clone(),
                error: result.err().map(|e| e.to_string()),
            }
        });
        let outcomes = join_all(writes).await;
        let failed = outcomes.iter().filter(|o| !o.is_ok()).count();
        debug!("Batch mirror: {} ok, {} failed", outcomes.len() - failed, failed);
        outcomes
    }

    /// Newest-first history for a station within optional bounds.
    pub async fn history(
        &self,
        station_id: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        limit: Option<usize>,
    ) -> Result<Vec<HistoryPoint>, Error> {
        let query = HistoryQuery {
            station_id: station_id.to_string(),
            start,
            end,
            limit: self.settings.clamp_limit(limit),
        };
        bounded(
            "history query",
            self.settings.durable_timeout,
            self.durable.query_readings(&query),
        )
        .await
    }

    /// History over a named or custom range. The range is checked before
    /// the store is touched.
    pub async fn history_range(
        &self,
        station_id: &str,
        kind: RangeKind,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        limit: Option<usize>,
        now: DateTime<Utc>,
    ) -> Result<Vec<HistoryPoint>, Error> {
        let range = HistoryRange::resolve(kind, start, end, now, self.settings.max_custom_range_days)?;
        self.history(station_id, Some(range.start), Some(range.end), limit)
            .await
    }

    /// Aggregate AQI over the last `days` days, zeroed when empty.
    pub async fn stats(&self, station_id: &str, days: u32, now: DateTime<Utc>) -> Result<AqiStats, Error> {
        let start = now
            .checked_sub_signed(chrono::Duration::days(i64::from(days.max(1))))
            .ok_or_else(|| Error::invalid("days", format!("lookback of {days} days is out of range")))?;
        let points = self
            .history(station_id, Some(start), Some(now), Some(self.settings.history_max_limit))
            .await?;
        let values: Vec<f64> = points.iter().map(|p| p.reading.aqi).collect();
        Ok(AqiStats::from_values(&values))
    }

    /// Create or update station metadata, keeping the original `created_at`.
    pub async fn upsert_station(
        &self,
        id: &str,
        input: StationUpsert,
        now: DateTime<Utc>,
    ) -> Result<StationMetadata, Error> {
        let mut issues = Vec::new();
        check_station_id("id", id, &mut issues);
        if input.name.trim().is_empty() {
            issues.push(common::FieldIssue::new("name", "must be a non-empty string"));
        }
        if !issues.is_empty() {
            return Err(Error::Validation(issues));
        }

        let existing = bounded(
            "station read",
            self.settings.durable_timeout,
            self.durable.get_station(id),
        )
        .await?;
        let created_at = existing.as_ref().map_or(now, |s| s.created_at);

        let station = StationMetadata {
            id: id.to_string(),
            name: input.name.trim().to_string(),
            location: input.location,
            coordinates: input.coordinates,
            category: input.category,
            active: input.active,
            created_at,
            updated_at: now,
        };
        bounded(
            "station write",
            self.settings.durable_timeout,
            self.durable.put_station(&station),
        )
        .await?;

        info!(
            "{} station {}",
            if existing.is_some() { "Updated" } else { "Created" },
            id
        );
        Ok(station)
    }

    pub async fn station(&self, id: &str) -> Result<Option<StationMetadata>, Error> {
        let mut issues = Vec::new();
        check_station_id("id", id, &mut issues);
        if !issues.is_empty() {
            return Ok(None);
        }
        bounded(
            "station read",
            self.settings.durable_timeout,
            self.durable.get_station(id),
        )
        .await
    }

    pub async fn live_stations(&self) -> Result<LiveStations, Error> {
        bounded("live read", self.settings.mirror_timeout, self.live.stations()).await
    }

    pub async fn watch(&self) -> Result<watch::Receiver<LiveStations>, Error> {
        self.live.watch().await
    }

    /// Invoke `callback` on every change of the live `stations` map.
    pub async fn subscribe<F>(&self, callback: F) -> Result<Subscription, Error>
    where
        F: Fn(&LiveStations) + Send + 'static,
    {
        let rx = self.live.watch().await?;
        Ok(Subscription::spawn(rx, callback))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryDurableStore, MemoryLiveStore};
    use chrono::Duration as ChronoDuration;
    use common::{Coordinates, Pollutants};
    use serde_json::json;
    use std::sync::Mutex;

    struct Harness {
        durable: Arc<MemoryDurableStore>,
        live: Arc<MemoryLiveStore>,
        sync: DualStoreSync,
    }

    fn harness() -> Harness {
        let durable = Arc::new(MemoryDurableStore::new());
        let live = Arc::new(MemoryLiveStore::new());
        let settings = SyncSettings {
            durable_timeout: Duration::from_millis(100),
            mirror_timeout: Duration::from_millis(100),
            ..SyncSettings::default()
        };
        let sync = DualStoreSync::new(durable.clone(), live.clone(), settings);
        Harness { durable, live, sync }
    }

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_760_000_000, 0).expect("valid ts")
    }

    fn live(aqi: f64) -> LiveStation {
        LiveStation::from_reading(&Reading::new("x", aqi, Pollutants::new(1.0, 1.0)), now())
    }

    #[tokio::test]
    async fn test_submit_writes_history_and_mirror() {
        let h = harness();
        let raw = json!({ "stationId": "s1", "aqi": 287, "pollutants": { "pm25": 196, "pm10": 315 } });

        let before = Utc::now();
        let outcome = h.sync.submit_value(&raw).await.expect("submit");
        assert!(outcome.mirrored);
        assert!(!outcome.document_id.is_empty());

        let stored = h.durable.readings();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, outcome.document_id);
        assert_eq!(stored[0].reading.aqi, 287.0);
        assert!(stored[0].reading.metadata.is_none());

        let mirror = h.live.snapshot();
        let s1 = &mirror["s1"];
        assert_eq!((s1.aqi, s1.pm25, s1.pm10), (287.0, 196.0, 315.0));
        assert!(s1.last_updated >= before - ChronoDuration::seconds(1));
        assert!(s1.no2.is_none());
    }

    #[tokio::test]
    async fn test_mirror_failure_still_succeeds() {
        let h = harness();
        h.live.set_failing(true);

        let outcome = h
            .sync
            .submit(&Reading::new("s1", 120.0, Pollutants::new(50.0, 90.0)))
            .await
            .expect("durable success is overall success");
        assert!(!outcome.mirrored);
        assert_eq!(h.durable.readings().len(), 1);
        assert!(h.live.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_mirror_timeout_is_swallowed() {
        let h = harness();
        h.live.set_delay(Duration::from_millis(300));

        let outcome = h
            .sync
            .submit(&Reading::new("s1", 120.0, Pollutants::new(50.0, 90.0)))
            .await
            .expect("submit");
        assert!(!outcome.mirrored);
    }

    #[tokio::test]
    async fn test_durable_failure_surfaces_and_skips_mirror() {
        let h = harness();
        h.durable.set_failing(true);

        let err = h
            .sync
            .submit(&Reading::new("s1", 120.0, Pollutants::new(50.0, 90.0)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Durable(_)));
        assert!(h.live.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_durable_timeout_surfaces() {
        let h = harness();
        h.durable.set_delay(Duration::from_millis(300));

        let err = h
            .sync
            .submit(&Reading::new("s1", 120.0, Pollutants::new(50.0, 90.0)))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_invalid_reading_writes_nothing() {
        let h = harness();
        let err = h
            .sync
            .submit_value(&json!({ "stationId": "s1", "aqi": 900, "pollutants": { "pm25": 1, "pm10": 1 } }))
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert!(h.durable.readings().is_empty());
        assert!(h.live.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_batch_mirror_isolates_failures() {
        let h = harness();
        h.live.fail_station("s3");
        let updates: Vec<(String, LiveStation)> = (1..=5)
            .map(|i| (format!("s{i}"), live(i as f64 * 10.0)))
            .collect();

        let outcomes = h.sync.mirror_batch(&updates).await;
        assert_eq!(outcomes.len(), 5);
        let failed: Vec<&str> = outcomes
            .iter()
            .filter(|o| !o.is_ok())
            .map(|o| o.station_id.as_str())
            .collect();
        assert_eq!(failed, vec!["s3"]);
        assert_eq!(h.live.snapshot().len(), 4);
    }

    #[tokio::test]
    async fn test_bad_range_rejected_before_store_access() {
        let h = harness();
        let start = now();
        let end = now() - ChronoDuration::days(1);

        let inverted = h
            .sync
            .history_range("s1", RangeKind::Custom, Some(start), Some(end), None, now())
            .await;
        assert!(inverted.unwrap_err().is_validation());

        let wide = h
            .sync
            .history_range(
                "s1",
                RangeKind::Custom,
                Some(now() - ChronoDuration::days(120)),
                Some(now()),
                None,
                now(),
            )
            .await;
        assert!(wide.unwrap_err().is_validation());
        assert_eq!(h.durable.query_count(), 0);
    }

    #[tokio::test]
    async fn test_history_limit_clamped() {
        let h = harness();
        for i in 0..5 {
            let r = Reading::new("s1", 100.0 + i as f64, Pollutants::new(1.0, 1.0))
                .with_timestamp(now() - ChronoDuration::minutes(i));
            h.sync.submit(&r).await.expect("submit");
        }

        let two = h.sync.history("s1", None, None, Some(2)).await.expect("history");
        assert_eq!(two.iter().map(|p| p.reading.aqi).collect::<Vec<_>>(), vec![100.0, 101.0]);

        let settings = h.sync.settings();
        assert_eq!(settings.clamp_limit(None), 100);
        assert_eq!(settings.clamp_limit(Some(0)), 100);
        assert_eq!(settings.clamp_limit(Some(50_000)), 1000);
    }

    #[tokio::test]
    async fn test_stats_over_window() {
        let h = harness();
        assert_eq!(h.sync.stats("s1", 7, now()).await.expect("stats"), AqiStats::default());

        for (aqi, days_ago) in [(100.0, 1), (200.0, 2), (400.0, 10)] {
            let r = Reading::new("s1", aqi, Pollutants::new(1.0, 1.0))
                .with_timestamp(now() - ChronoDuration::days(days_ago));
            h.sync.submit(&r).await.expect("submit");
        }
        let stats = h.sync.stats("s1", 7, now()).await.expect("stats");
        assert_eq!(stats.count, 2);
        assert_eq!(stats.average, 150.0);
        assert_eq!((stats.min, stats.max), (100.0, 200.0));
    }

    #[tokio::test]
    async fn test_stats_rejects_unrepresentable_window() {
        let h = harness();
        let err = h.sync.stats("s1", u32::MAX, now()).await.unwrap_err();
        assert!(err.is_validation());
        assert_eq!(h.durable.query_count(), 0);
    }

    #[tokio::test]
    async fn test_path_like_station_ids_never_reach_stores() {
        let h = harness();
        let err = h
            .sync
            .submit_value(&json!({ "stationId": "s1/../admin", "aqi": 50, "pollutants": { "pm25": 1, "pm10": 1 } }))
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert!(h.durable.readings().is_empty());

        let err = h.sync.mirror("a.b", &live(10.0)).await.unwrap_err();
        assert!(err.is_validation());
        assert!(h.live.snapshot().is_empty());

        let upsert = StationUpsert {
            name: "Admin".into(),
            location: String::new(),
            coordinates: Coordinates::default(),
            category: "urban".into(),
            active: true,
        };
        let err = h.sync.upsert_station("x#y", upsert, now()).await.unwrap_err();
        assert!(err.is_validation());
        assert!(h.sync.station("x#y").await.expect("read").is_none());
    }

    #[tokio::test]
    async fn test_upsert_preserves_created_at() {
        let h = harness();
        let input = |name: &str| StationUpsert {
            name: name.into(),
            location: "Delhi".into(),
            coordinates: Coordinates { lat: 28.65, lng: 77.31 },
            category: "urban".into(),
            active: true,
        };

        let created = h
            .sync
            .upsert_station("anand-vihar", input("Anand Vihar"), now())
            .await
            .expect("create");
        assert_eq!(created.created_at, now());

        let later = now() + ChronoDuration::hours(3);
        let updated = h
            .sync
            .upsert_station("anand-vihar", input("Anand Vihar ISBT"), later)
            .await
            .expect("update");
        assert_eq!(updated.created_at, now());
        assert_eq!(updated.updated_at, later);
        assert_eq!(
            h.sync.station("anand-vihar").await.expect("read").expect("exists").name,
            "Anand Vihar ISBT"
        );

        let err = h.sync.upsert_station("x", input(" "), now()).await.unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_subscribe_receives_mirror_updates() {
        let h = harness();
        let seen: Arc<Mutex<Vec<LiveStations>>> = Arc::default();
        let sink = seen.clone();
        let sub = h
            .sync
            .subscribe(move |map| sink.lock().unwrap().push(map.clone()))
            .await
            .expect("subscribe");

        h.sync
            .submit(&Reading::new("s1", 287.0, Pollutants::new(196.0, 315.0)))
            .await
            .expect("submit");
        tokio::time::sleep(Duration::from_millis(20)).await;
        sub.unsubscribe();

        let seen = seen.lock().unwrap();
        let last = seen.last().expect("at least one delivery");
        assert_eq!(last["s1"].aqi, 287.0);
    }
}
