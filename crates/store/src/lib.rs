//! Durable history + live mirror persistence for station readings.
//!
//! Readings are validated, appended to the durable document store, then
//! mirrored best-effort into the live key-value store. Firebase REST
//! backends and in-memory stand-ins implement the same traits.

pub mod backend;
pub mod document;
pub mod firestore;
pub mod memory;
pub mod range;
pub mod rtdb;
pub mod sse;
pub mod subscription;
pub mod sync;
pub mod validation;

pub use backend::{DurableStore, LiveStore};
pub use firestore::FirestoreStore;
pub use memory::{MemoryDurableStore, MemoryLiveStore};
pub use range::{HistoryRange, RangeKind};
pub use rtdb::RealtimeDbStore;
pub use subscription::Subscription;
pub use sync::{DualStoreSync, MirrorOutcome, SyncOutcome, SyncSettings};
pub use validation::{validate_reading, validate_value};
