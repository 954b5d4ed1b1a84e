//! Storage seams for the two persistence tiers.

use async_trait::async_trait;
use common::{Error, HistoryPoint, HistoryQuery, LiveStation, LiveStations, Reading, StationMetadata};
use tokio::sync::watch;

/// Append-only document store holding the authoritative reading history.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Append a reading under a store-generated id and return that id.
    async fn append_reading(&self, reading: &Reading) -> Result<String, Error>;

    /// Readings matching the query, newest first, at most `query.limit`.
    async fn query_readings(&self, query: &HistoryQuery) -> Result<Vec<HistoryPoint>, Error>;

    async fn get_station(&self, id: &str) -> Result<Option<StationMetadata>, Error>;

    /// Create or fully replace the station document.
    async fn put_station(&self, station: &StationMetadata) -> Result<(), Error>;
}

/// Low-latency mirror holding the latest reading per station.
#[async_trait]
pub trait LiveStore: Send + Sync {
    /// Last-write-wins update of `stations/{id}`.
    async fn set_station(&self, id: &str, station: &LiveStation) -> Result<(), Error>;

    async fn stations(&self) -> Result<LiveStations, Error>;

    /// Receiver that always holds the latest full `stations` map.
    async fn watch(&self) -> Result<watch::Receiver<LiveStations>, Error>;
}
