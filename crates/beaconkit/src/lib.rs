// Copyright 2025-Present BeaconKit authors
// SPDX-License-Identifier: Apache-2.0

//! Client-side control plane of an APM instrumentation library.
//!
//! beaconkit tracks logical user sessions and the actions nested inside
//! them, buffers telemetry events ("beacons") in a shared cache, and
//! transmits them to a monitoring collector under sampling and transmission
//! rules the collector can change at runtime.
//!
//! The pieces fit together like this: application code creates a
//! [`session::Session`] (which registers itself with the
//! [`sender::BeaconSender`] and opens its [`beacon::Beacon`]), enters and
//! leaves [`action::Action`]s under it, and eventually ends it. The sender
//! task periodically asks the collector for the current settings,
//! [`config::Configuration::reconcile`]s them into the live configuration,
//! and ships finished sessions that are allowed to send.

pub mod action;
pub mod beacon;
pub mod cache;
pub mod config;
pub mod error;
pub mod http;
pub mod sender;
pub mod session;

pub use action::Action;
pub use beacon::Beacon;
pub use cache::{BeaconCache, CacheRecord};
pub use config::{
    Configuration, ConfigurationOptions, CrashReportingLevel, DataCollectionLevel, Device,
    RetentionPolicy, SamplingConfig, TransportConfig,
};
pub use error::Error;
pub use http::{HttpClient, StatusResponse};
pub use sender::BeaconSender;
pub use session::{Session, SessionListener};
