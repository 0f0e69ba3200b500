// Copyright 2025-Present BeaconKit authors
// SPDX-License-Identifier: Apache-2.0

mod device;
mod retention;
mod sampling;
mod transport;

pub use device::Device;
pub use retention::{
    RetentionPolicy, DEFAULT_LOWER_SIZE_BOUND, DEFAULT_MAX_RECORD_AGE, DEFAULT_UPPER_SIZE_BOUND,
};
pub use sampling::{CrashReportingLevel, DataCollectionLevel, SamplingConfig};
pub use transport::TransportConfig;

use crate::http::{StatusResponse, SENTINEL};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Default interval between send cycles: 2 minutes.
pub const DEFAULT_SEND_INTERVAL: Duration = Duration::from_secs(120);
/// Default maximum beacon payload size: 30 KiB.
pub const DEFAULT_MAX_BEACON_SIZE: usize = 30 * 1024;
/// Transport identifier used until the collector assigns one.
pub const DEFAULT_SERVER_ID: i32 = 1;
/// Sampling multiplicity used until the collector assigns one.
pub const DEFAULT_MULTIPLICITY: i32 = 1;

/// Session identifiers are drawn from [0, 2^31 - 1).
const SESSION_NUMBER_BOUND: i32 = i32::MAX;

/// Construction-time options for [`Configuration`]. Each field is stored
/// verbatim; no validation beyond type constraints.
#[derive(Debug, Clone)]
pub struct ConfigurationOptions {
    pub endpoint_url: String,
    pub application_name: String,
    pub application_id: String,
    pub application_version: String,
    pub device_id: i64,
    pub operating_system: String,
    pub manufacturer: String,
    pub model_id: String,
    pub proxy_address: Option<String>,
    pub verify_certificates: bool,
}

/// The fields the collector can change at runtime, guarded as one record so
/// a concurrent reader never observes a torn update.
#[derive(Debug)]
struct MutableState {
    capture: bool,
    capture_errors: bool,
    capture_crashes: bool,
    send_interval: Duration,
    max_beacon_size: usize,
    transport: Arc<TransportConfig>,
    server_configuration_received: bool,
}

/// The single authority for what the instrumentation library should
/// currently be doing: whether capturing is enabled, how often to send, how
/// large a beacon payload may grow, and which sub-configuration snapshots
/// are active.
///
/// Created once at startup with hard-coded defaults and mutated only by
/// [`Configuration::reconcile`] for the process lifetime. Sub-configurations
/// are immutable values swapped wholesale, never field-mutated.
#[derive(Debug)]
pub struct Configuration {
    endpoint_url: String,
    application_name: String,
    application_id: String,
    application_version: String,
    device_id: i64,
    device: Device,
    default_sampling: Arc<SamplingConfig>,
    retention: RetentionPolicy,
    state: RwLock<MutableState>,
    session_rng: Mutex<SmallRng>,
}

impl Configuration {
    /// Builds a configuration from the given options plus library defaults:
    /// capture on, 2 minute send interval, 30 KiB beacons, transport id 1,
    /// multiplicity 1, default retention bounds.
    pub fn new(options: ConfigurationOptions) -> Self {
        Self::with_rng(options, SmallRng::from_entropy())
    }

    /// Like [`Configuration::new`] but with an injected session-number
    /// source, so callers (and tests) control seeding.
    pub fn with_rng(options: ConfigurationOptions, rng: SmallRng) -> Self {
        let transport = Arc::new(TransportConfig {
            base_url: options.endpoint_url.clone(),
            application_id: options.application_id.clone(),
            server_id: DEFAULT_SERVER_ID,
            proxy_address: options.proxy_address,
            verify_certificates: options.verify_certificates,
        });

        let default_sampling = Arc::new(SamplingConfig {
            multiplicity: DEFAULT_MULTIPLICITY,
            data_collection_level: DataCollectionLevel::UserBehavior,
            crash_reporting_level: CrashReportingLevel::OptIn,
            device_id: options.device_id,
        });

        Configuration {
            endpoint_url: options.endpoint_url,
            application_name: options.application_name,
            application_id: options.application_id,
            application_version: options.application_version,
            device_id: options.device_id,
            device: Device {
                operating_system: options.operating_system,
                manufacturer: options.manufacturer,
                model_id: options.model_id,
            },
            default_sampling,
            retention: RetentionPolicy::default(),
            state: RwLock::new(MutableState {
                capture: true,
                capture_errors: true,
                capture_crashes: true,
                send_interval: DEFAULT_SEND_INTERVAL,
                max_beacon_size: DEFAULT_MAX_BEACON_SIZE,
                transport,
                server_configuration_received: false,
            }),
            session_rng: Mutex::new(rng),
        }
    }

    /// Merges a collector status response into the live settings.
    ///
    /// Each field is resolved independently: a `-1` sentinel means "no
    /// opinion, use the library default". A field is only overwritten when
    /// the resolved value differs from the current one; in particular the
    /// active [`TransportConfig`] is replaced only when the resolved server
    /// id changes, and the replacement carries all locally-set transport
    /// fields with only the id overridden.
    #[allow(clippy::expect_used)]
    pub fn reconcile(&self, response: &StatusResponse) {
        debug!(?response, "reconciling collector configuration");
        let mut state = self.state.write().expect("lock poisoned");

        // The collector always states an opinion on capture.
        state.capture = response.capture;

        let new_server_id = match response.server_id {
            SENTINEL => DEFAULT_SERVER_ID,
            id => id as i32,
        };
        if state.transport.server_id != new_server_id {
            state.transport = Arc::new(state.transport.with_server_id(new_server_id));
        }

        let new_send_interval = match response.send_interval_ms {
            SENTINEL => DEFAULT_SEND_INTERVAL,
            ms => Duration::from_millis(ms as u64),
        };
        if state.send_interval != new_send_interval {
            state.send_interval = new_send_interval;
        }

        let new_max_beacon_size = match response.max_beacon_size {
            SENTINEL => DEFAULT_MAX_BEACON_SIZE,
            size => size as usize,
        };
        if state.max_beacon_size != new_max_beacon_size {
            state.max_beacon_size = new_max_beacon_size;
        }

        state.server_configuration_received = true;
    }

    /// Returns a fresh session number, uniform in [0, 2^31 - 1). The source
    /// is seeded per process, not per call; this is not a security boundary.
    #[allow(clippy::expect_used)]
    pub fn next_session_number(&self) -> i32 {
        self.session_rng
            .lock()
            .expect("lock poisoned")
            .gen_range(0..SESSION_NUMBER_BOUND)
    }

    /// Current wall-clock time as epoch milliseconds. The single notion of
    /// "now" shared by session timestamps and beacon records.
    pub fn now_millis() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as i64)
            .unwrap_or(0)
    }

    /// Whether any reconciliation with the collector has happened yet.
    #[allow(clippy::expect_used)]
    pub fn is_server_configuration_received(&self) -> bool {
        self.state
            .read()
            .expect("lock poisoned")
            .server_configuration_received
    }

    #[allow(clippy::expect_used)]
    pub fn capture(&self) -> bool {
        self.state.read().expect("lock poisoned").capture
    }

    #[allow(clippy::expect_used)]
    pub fn capture_errors(&self) -> bool {
        self.state.read().expect("lock poisoned").capture_errors
    }

    #[allow(clippy::expect_used)]
    pub fn capture_crashes(&self) -> bool {
        self.state.read().expect("lock poisoned").capture_crashes
    }

    #[allow(clippy::expect_used)]
    pub fn send_interval(&self) -> Duration {
        self.state.read().expect("lock poisoned").send_interval
    }

    #[allow(clippy::expect_used)]
    pub fn max_beacon_size(&self) -> usize {
        self.state.read().expect("lock poisoned").max_beacon_size
    }

    /// The active transport snapshot. Callers hold the returned `Arc`; a
    /// server-driven replacement never mutates it under them.
    #[allow(clippy::expect_used)]
    pub fn transport(&self) -> Arc<TransportConfig> {
        Arc::clone(&self.state.read().expect("lock poisoned").transport)
    }

    /// Sampling settings a session starts with before the collector has
    /// assigned any.
    pub fn default_sampling(&self) -> Arc<SamplingConfig> {
        Arc::clone(&self.default_sampling)
    }

    pub fn retention(&self) -> &RetentionPolicy {
        &self.retention
    }

    pub fn endpoint_url(&self) -> &str {
        &self.endpoint_url
    }

    pub fn application_name(&self) -> &str {
        &self.application_name
    }

    pub fn application_id(&self) -> &str {
        &self.application_id
    }

    pub fn application_version(&self) -> &str {
        &self.application_version
    }

    pub fn device_id(&self) -> i64 {
        self.device_id
    }

    pub fn device(&self) -> &Device {
        &self.device
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_options() -> ConfigurationOptions {
        ConfigurationOptions {
            endpoint_url: "https://collector.example.com/mbeacon".to_string(),
            application_name: "shop".to_string(),
            application_id: "app-1".to_string(),
            application_version: "1.2.3".to_string(),
            device_id: 42,
            operating_system: "linux".to_string(),
            manufacturer: "acme".to_string(),
            model_id: "vm-large".to_string(),
            proxy_address: None,
            verify_certificates: true,
        }
    }

    fn response(
        capture: bool,
        server_id: i64,
        send_interval_ms: i64,
        max_beacon_size: i64,
    ) -> StatusResponse {
        StatusResponse {
            capture,
            server_id,
            send_interval_ms,
            max_beacon_size,
            multiplicity: SENTINEL,
        }
    }

    #[test]
    fn test_defaults() {
        let config = Configuration::new(test_options());
        assert!(config.capture());
        assert!(config.capture_errors());
        assert!(config.capture_crashes());
        assert_eq!(config.send_interval(), Duration::from_secs(120));
        assert_eq!(config.max_beacon_size(), 30720);
        assert_eq!(config.transport().server_id, 1);
        assert_eq!(config.default_sampling().multiplicity, 1);
        assert!(!config.is_server_configuration_received());
    }

    #[test]
    fn test_reconcile_sentinels_resolve_to_defaults() {
        let config = Configuration::new(test_options());
        config.reconcile(&response(true, SENTINEL, SENTINEL, SENTINEL));

        assert_eq!(config.transport().server_id, 1);
        assert_eq!(config.send_interval(), Duration::from_secs(120));
        assert_eq!(config.max_beacon_size(), 30720);
        assert!(config.is_server_configuration_received());
    }

    #[test]
    fn test_reconcile_mixed_overrides() {
        // capture off, server id 7, interval left at default, size 5000
        let config = Configuration::new(test_options());
        let before = config.transport();
        config.reconcile(&response(false, 7, SENTINEL, 5000));

        assert!(!config.capture());
        let transport = config.transport();
        assert_eq!(transport.server_id, 7);
        assert!(!Arc::ptr_eq(&before, &transport));
        assert_eq!(config.send_interval(), Duration::from_secs(120));
        assert_eq!(config.max_beacon_size(), 5000);
    }

    #[test]
    fn test_reconcile_unchanged_server_id_keeps_transport_reference() {
        let config = Configuration::new(test_options());
        config.reconcile(&response(true, 7, SENTINEL, SENTINEL));
        let first = config.transport();

        config.reconcile(&response(true, 7, 30_000, SENTINEL));
        let second = config.transport();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(config.send_interval(), Duration::from_millis(30_000));
    }

    #[test]
    fn test_transport_replacement_preserves_proxy_and_tls_settings() {
        let mut options = test_options();
        options.proxy_address = Some("http://proxy:3128".to_string());
        options.verify_certificates = false;
        let config = Configuration::new(options);

        config.reconcile(&response(true, 9, SENTINEL, SENTINEL));

        let transport = config.transport();
        assert_eq!(transport.server_id, 9);
        assert_eq!(transport.proxy_address.as_deref(), Some("http://proxy:3128"));
        assert!(!transport.verify_certificates);
    }

    #[test]
    fn test_session_numbers_in_range_and_spread() {
        let config = Configuration::with_rng(test_options(), SmallRng::seed_from_u64(7));

        let mut buckets = [0u32; 16];
        for _ in 0..10_000 {
            let number = config.next_session_number();
            assert!(number >= 0);
            assert!(number < i32::MAX);
            buckets[(number as usize) >> 27] += 1;
        }
        // Basic distribution sanity: every 1/16th of the range gets hits.
        for count in buckets {
            assert!(count > 0, "session numbers clustered away from a bucket");
        }
    }

    #[test]
    fn test_now_millis_is_recent() {
        // Anything after 2020-01-01 and not in the far future.
        let now = Configuration::now_millis();
        assert!(now > 1_577_836_800_000);
        assert!(now < 4_102_444_800_000);
    }
}
