//! Concurrent TTL cache for upstream responses.
//!
//! Reads vastly outnumber refreshes, so entries live in a `DashMap` and
//! staleness is checked at read time.

use std::time::{Duration, Instant};

use dashmap::DashMap;

#[derive(Debug, Clone)]
struct Entry<T> {
    value: T,
    stored_at: Instant,
}

#[derive(Debug)]
pub struct TtlCache<T> {
    entries: DashMap<String, Entry<T>>,
    ttl: Duration,
}

impl<T: Clone> TtlCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Value for `key` if stored less than `ttl` ago.
    pub fn get(&self, key: &str) -> Option<T> {
        let entry = self.entries.get(key)?;
        (entry.stored_at.elapsed() < self.ttl).then(|| entry.value.clone())
    }

    pub fn insert(&self, key: impl Into<String>, value: T) {
        self.entries.insert(
            key.into(),
            Entry {
                value,
                stored_at: Instant::now(),
            },
        );
    }
}
