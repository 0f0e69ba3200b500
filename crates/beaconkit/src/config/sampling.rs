// Copyright 2025-Present BeaconKit authors
// SPDX-License-Identifier: Apache-2.0

/// How much user-level detail the beacon is allowed to capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataCollectionLevel {
    Off = 0,
    Performance = 1,
    UserBehavior = 2,
}

/// How much crash detail the beacon is allowed to report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrashReportingLevel {
    Off = 0,
    OptOut = 1,
    OptIn = 2,
}

/// Server-assigned sampling settings for one session.
///
/// Immutable value; a session replaces its active config wholesale when the
/// collector assigns a new one. A multiplicity of 0 means the session is
/// sampled out and must not transmit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplingConfig {
    pub multiplicity: i32,
    pub data_collection_level: DataCollectionLevel,
    pub crash_reporting_level: CrashReportingLevel,
    pub device_id: i64,
}

impl SamplingConfig {
    pub fn is_sampled_out(&self) -> bool {
        self.multiplicity <= 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sampled_out() {
        let config = SamplingConfig {
            multiplicity: 0,
            data_collection_level: DataCollectionLevel::UserBehavior,
            crash_reporting_level: CrashReportingLevel::OptIn,
            device_id: 42,
        };
        assert!(config.is_sampled_out());

        let config = SamplingConfig {
            multiplicity: 3,
            ..config
        };
        assert!(!config.is_sampled_out());
    }
}
