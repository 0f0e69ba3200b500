// Copyright 2025-Present BeaconKit authors
// SPDX-License-Identifier: Apache-2.0

use crate::action::Action;
use crate::cache::{BeaconCache, CacheRecord};
use crate::config::Configuration;
use crate::error::Error;
use crate::http::{HttpClient, StatusResponse};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use tracing::debug;

const PROTOCOL_VERSION: i32 = 3;

/// Per-session buffer and encoder for telemetry events destined for the
/// monitoring collector.
///
/// Events are appended to the shared [`BeaconCache`] under this session's
/// number and drained by [`Beacon::send`] in chunks bounded by the
/// configuration's max beacon size. Nothing is captured while the
/// configuration has capturing disabled.
#[derive(Debug)]
pub struct Beacon {
    session_number: i32,
    session_start_time: i64,
    config: Arc<Configuration>,
    cache: Arc<BeaconCache>,
    next_id: AtomicI32,
    next_sequence_number: AtomicI32,
}

impl Beacon {
    pub fn new(config: Arc<Configuration>, cache: Arc<BeaconCache>) -> Self {
        Beacon {
            session_number: config.next_session_number(),
            session_start_time: Configuration::now_millis(),
            config,
            cache,
            next_id: AtomicI32::new(0),
            next_sequence_number: AtomicI32::new(0),
        }
    }

    pub fn session_number(&self) -> i32 {
        self.session_number
    }

    pub fn session_start_time(&self) -> i64 {
        self.session_start_time
    }

    pub fn current_timestamp(&self) -> i64 {
        Configuration::now_millis()
    }

    pub fn next_id(&self) -> i32 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn next_sequence_number(&self) -> i32 {
        self.next_sequence_number.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn time_offset(&self, timestamp: i64) -> i64 {
        timestamp - self.session_start_time
    }

    fn push(&self, timestamp: i64, data: String) {
        if !self.config.capture() {
            return;
        }
        self.cache
            .add_record(self.session_number, CacheRecord { timestamp, data });
    }

    pub fn start_session(&self) {
        let sequence = self.next_sequence_number();
        self.push(
            self.session_start_time,
            format!("et=sstart&s0={sequence}&t0=0"),
        );
    }

    pub fn end_session(&self, end_time: i64) {
        let sequence = self.next_sequence_number();
        self.push(
            end_time,
            format!("et=send&s0={sequence}&t0={}", self.time_offset(end_time)),
        );
    }

    pub fn identify_user(&self, tag: &str) {
        let timestamp = self.current_timestamp();
        let sequence = self.next_sequence_number();
        self.push(
            timestamp,
            format!(
                "et=iden&na={tag}&s0={sequence}&t0={}",
                self.time_offset(timestamp)
            ),
        );
    }

    /// Records a closed action as immutable history.
    pub fn add_action(&self, action: &Action) {
        self.push(
            action.start_time(),
            format!(
                "et=axn&na={}&ca={}&s0={}&t0={}&s1={}&t1={}",
                action.name(),
                action.id(),
                action.start_sequence_number(),
                self.time_offset(action.start_time()),
                action.end_sequence_number(),
                self.time_offset(action.end_time()),
            ),
        );
    }

    pub fn clear_captured_data(&self) {
        self.cache.delete_entry(self.session_number);
    }

    /// Drains this session's cached records and ships them in chunks no
    /// larger than the configured max beacon size (a single oversized record
    /// still ships alone; records are never split).
    ///
    /// Returns the collector's last reply, `Ok(None)` when there was nothing
    /// to send. On transport failure the unsent records go back into the
    /// cache and the error propagates to the caller, which owns retry
    /// policy.
    pub async fn send(&self, client: &HttpClient) -> Result<Option<StatusResponse>, Error> {
        let records = self.cache.take_records(self.session_number);
        if records.is_empty() {
            return Ok(None);
        }

        let prefix = self.payload_prefix();
        let chunks = chunk_records(&prefix, records, self.config.max_beacon_size());
        debug!(
            session = self.session_number,
            chunks = chunks.len(),
            "sending beacon"
        );

        let mut last_response = None;
        let mut pending = chunks.into_iter();
        while let Some((body, sent_records)) = pending.next() {
            match client.send_beacon_data(self.session_number, body).await {
                Ok(response) => last_response = Some(response),
                Err(e) => {
                    // Requeue everything not acknowledged so a later send
                    // cycle can retry it.
                    for record in sent_records
                        .into_iter()
                        .chain(pending.flat_map(|(_, records)| records))
                    {
                        self.cache.add_record(self.session_number, record);
                    }
                    return Err(e);
                }
            }
        }
        Ok(last_response)
    }

    fn payload_prefix(&self) -> String {
        let device = self.config.device();
        format!(
            "vv={PROTOCOL_VERSION}&an={}&ap={}&vn={}&di={}&sn={}&os={}&mf={}&md={}",
            self.config.application_name(),
            self.config.application_id(),
            self.config.application_version(),
            self.config.device_id(),
            self.session_number,
            device.operating_system,
            device.manufacturer,
            device.model_id,
        )
    }
}

/// Splits records into `(body, records)` chunks whose encoded body stays
/// within `max_size` where possible.
fn chunk_records(
    prefix: &str,
    records: Vec<CacheRecord>,
    max_size: usize,
) -> Vec<(String, Vec<CacheRecord>)> {
    let mut chunks = Vec::new();
    let mut body = prefix.to_string();
    let mut chunk = Vec::new();

    for record in records {
        if !chunk.is_empty() && body.len() + record.data.len() + 1 > max_size {
            chunks.push((
                std::mem::replace(&mut body, prefix.to_string()),
                std::mem::take(&mut chunk),
            ));
        }
        body.push('\n');
        body.push_str(&record.data);
        chunk.push(record);
    }
    chunks.push((body, chunk));
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigurationOptions, RetentionPolicy};
    use crate::http::SENTINEL;

    fn test_beacon() -> Beacon {
        let config = Arc::new(Configuration::new(ConfigurationOptions {
            endpoint_url: "https://collector.example.com".to_string(),
            application_name: "shop".to_string(),
            application_id: "app-1".to_string(),
            application_version: "1.0.0".to_string(),
            device_id: 42,
            operating_system: "linux".to_string(),
            manufacturer: "acme".to_string(),
            model_id: "vm".to_string(),
            proxy_address: None,
            verify_certificates: true,
        }));
        let cache = Arc::new(BeaconCache::new(RetentionPolicy::default()));
        Beacon::new(config, cache)
    }

    #[test]
    fn test_session_number_is_31_bit_positive() {
        let beacon = test_beacon();
        assert!(beacon.session_number() >= 0);
    }

    #[test]
    fn test_start_session_buffers_one_record() {
        let beacon = test_beacon();
        beacon.start_session();
        assert_eq!(beacon.cache.record_count(), 1);
    }

    #[test]
    fn test_capture_disabled_suppresses_records() {
        let beacon = test_beacon();
        beacon.config.reconcile(&StatusResponse {
            capture: false,
            server_id: SENTINEL,
            send_interval_ms: SENTINEL,
            max_beacon_size: SENTINEL,
            multiplicity: SENTINEL,
        });

        beacon.start_session();
        beacon.identify_user("user-1");
        assert_eq!(beacon.cache.record_count(), 0);
    }

    #[test]
    fn test_identify_user_encodes_tag() {
        let beacon = test_beacon();
        beacon.identify_user("user-1");
        let records = beacon.cache.take_records(beacon.session_number());
        assert_eq!(records.len(), 1);
        assert!(records[0].data.contains("et=iden"));
        assert!(records[0].data.contains("na=user-1"));
    }

    #[test]
    fn test_chunking_respects_max_size() {
        let records: Vec<CacheRecord> = (0..10)
            .map(|i| CacheRecord {
                timestamp: i,
                data: "x".repeat(20),
            })
            .collect();
        let chunks = chunk_records("prefix", records, 60);

        assert!(chunks.len() > 1);
        for (body, chunk) in &chunks {
            assert!(body.starts_with("prefix"));
            assert!(!chunk.is_empty());
            // Only a chunk holding a single record may exceed the bound.
            if chunk.len() > 1 {
                assert!(body.len() <= 60);
            }
        }
        let total: usize = chunks.iter().map(|(_, chunk)| chunk.len()).sum();
        assert_eq!(total, 10);
    }

    #[test]
    fn test_sequence_numbers_are_monotonic() {
        let beacon = test_beacon();
        let first = beacon.next_sequence_number();
        let second = beacon.next_sequence_number();
        assert_eq!(second, first + 1);
    }
}
