// Copyright 2025-Present BeaconKit authors
// SPDX-License-Identifier: Apache-2.0

/// Immutable facts about the host the instrumented application runs on.
///
/// Captured once at startup and serialized into every beacon payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub operating_system: String,
    pub manufacturer: String,
    pub model_id: String,
}
