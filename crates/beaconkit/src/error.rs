// Copyright 2025-Present BeaconKit authors
// SPDX-License-Identifier: Apache-2.0

/// Errors surfaced by the instrumentation client.
///
/// The taxonomy is deliberately narrow: sentinel values in a collector
/// response and policy-suppressed sends are not errors. Only malformed
/// input and transport failures reach this type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Malformed status response: {0}")]
    StatusResponse(String),
}
