// Copyright 2025-Present BeaconKit authors
// SPDX-License-Identifier: Apache-2.0

use crate::config::RetentionPolicy;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

/// One buffered telemetry record: the encoded event data plus the capture
/// timestamp the eviction loop judges its age by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRecord {
    pub timestamp: i64,
    pub data: String,
}

impl CacheRecord {
    fn size_bytes(&self) -> u64 {
        self.data.len() as u64
    }
}

#[derive(Debug, Default)]
struct CacheState {
    records: HashMap<i32, Vec<CacheRecord>>,
    total_bytes: u64,
}

/// Session-keyed store for beacon records awaiting transmission.
///
/// Owns the retention-policy parameters; the periodic eviction loop itself
/// runs outside this crate and calls [`BeaconCache::evict_expired`].
#[derive(Debug)]
pub struct BeaconCache {
    retention: RetentionPolicy,
    state: Mutex<CacheState>,
}

impl BeaconCache {
    pub fn new(retention: RetentionPolicy) -> Self {
        BeaconCache {
            retention,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn retention(&self) -> &RetentionPolicy {
        &self.retention
    }

    #[allow(clippy::expect_used)]
    pub fn add_record(&self, session_number: i32, record: CacheRecord) {
        let mut state = self.state.lock().expect("lock poisoned");
        state.total_bytes += record.size_bytes();
        state.records.entry(session_number).or_default().push(record);
    }

    /// Removes and returns every buffered record for the session, oldest
    /// first.
    #[allow(clippy::expect_used)]
    pub fn take_records(&self, session_number: i32) -> Vec<CacheRecord> {
        let mut state = self.state.lock().expect("lock poisoned");
        let records = state.records.remove(&session_number).unwrap_or_default();
        let removed: u64 = records.iter().map(CacheRecord::size_bytes).sum();
        state.total_bytes -= removed;
        records
    }

    /// Discards all buffered records for the session.
    #[allow(clippy::expect_used)]
    pub fn delete_entry(&self, session_number: i32) {
        let mut state = self.state.lock().expect("lock poisoned");
        if let Some(records) = state.records.remove(&session_number) {
            let removed: u64 = records.iter().map(CacheRecord::size_bytes).sum();
            state.total_bytes -= removed;
            debug!(
                session = session_number,
                records = records.len(),
                "discarded cached beacon data"
            );
        }
    }

    #[allow(clippy::expect_used)]
    pub fn total_size_bytes(&self) -> u64 {
        self.state.lock().expect("lock poisoned").total_bytes
    }

    #[allow(clippy::expect_used)]
    pub fn record_count(&self) -> usize {
        self.state
            .lock()
            .expect("lock poisoned")
            .records
            .values()
            .map(Vec::len)
            .sum()
    }

    /// Drops records older than the retention max age, regardless of memory
    /// pressure. Returns how many were evicted.
    #[allow(clippy::expect_used)]
    pub fn evict_expired(&self, now_millis: i64) -> usize {
        let max_age_millis = self.retention.max_record_age().as_millis() as i64;
        let mut state = self.state.lock().expect("lock poisoned");

        let mut evicted = 0;
        let mut freed = 0u64;
        state.records.retain(|_, records| {
            records.retain(|record| {
                let expired = now_millis - record.timestamp > max_age_millis;
                if expired {
                    evicted += 1;
                    freed += record.size_bytes();
                }
                !expired
            });
            !records.is_empty()
        });
        state.total_bytes -= freed;

        if evicted > 0 {
            debug!(evicted, freed, "evicted expired beacon records");
        }
        evicted
    }
}
