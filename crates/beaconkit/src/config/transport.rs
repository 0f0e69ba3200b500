// Copyright 2025-Present BeaconKit authors
// SPDX-License-Identifier: Apache-2.0

/// Settings for talking to the monitoring collector.
///
/// Immutable once constructed; when the collector reassigns the server id,
/// the whole value is replaced rather than mutated in place, so a sender
/// holding an old reference never observes a half-updated transport state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Collector base URL, e.g. `https://collector.example.com/mbeacon`.
    pub base_url: String,
    /// Application id the collector uses to route beacons.
    pub application_id: String,
    /// Server-assigned transport identifier. Defaults to 1 until the
    /// collector states an opinion.
    pub server_id: i32,
    /// Optional HTTP(S) proxy address.
    pub proxy_address: Option<String>,
    /// Whether to verify the collector's TLS certificate.
    pub verify_certificates: bool,
}

impl TransportConfig {
    /// Returns a copy carrying `server_id` with every locally-set field
    /// (proxy, certificate verification) preserved.
    pub(crate) fn with_server_id(&self, server_id: i32) -> Self {
        TransportConfig {
            server_id,
            ..self.clone()
        }
    }
}
