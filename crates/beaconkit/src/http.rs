// Copyright 2025-Present BeaconKit authors
// SPDX-License-Identifier: Apache-2.0

use crate::config::TransportConfig;
use crate::error::Error;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Wire value meaning "not specified, use the library default".
pub const SENTINEL: i64 = -1;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// The collector's parsed reply to a status request or a beacon post.
///
/// Absent fields deserialize to the `-1` sentinel; `capture` carries no
/// sentinel because the collector always states an opinion on it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub capture: bool,
    #[serde(default = "sentinel")]
    pub server_id: i64,
    #[serde(default = "sentinel")]
    pub send_interval_ms: i64,
    #[serde(default = "sentinel")]
    pub max_beacon_size: i64,
    #[serde(default = "sentinel")]
    pub multiplicity: i64,
}

fn sentinel() -> i64 {
    SENTINEL
}

/// Transport handle to the monitoring collector, built from one
/// [`TransportConfig`] snapshot. Rebuilt when reconciliation swaps the
/// snapshot.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    base_url: String,
    application_id: String,
    server_id: i32,
}

impl HttpClient {
    pub fn new(transport: &TransportConfig) -> Result<Self, Error> {
        let mut builder = reqwest::Client::builder().timeout(REQUEST_TIMEOUT);
        if let Some(proxy) = &transport.proxy_address {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }
        if !transport.verify_certificates {
            builder = builder.danger_accept_invalid_certs(true);
        }

        Ok(HttpClient {
            client: builder.build()?,
            base_url: transport.base_url.clone(),
            application_id: transport.application_id.clone(),
            server_id: transport.server_id,
        })
    }

    pub fn server_id(&self) -> i32 {
        self.server_id
    }

    /// Asks the collector for the current transmission settings.
    pub async fn send_status_request(&self) -> Result<StatusResponse, Error> {
        let url = format!(
            "{}/status?type=m&srvid={}&app={}",
            self.base_url, self.server_id, self.application_id
        );
        debug!(%url, "requesting collector status");
        let response = self.client.get(&url).send().await?;
        Self::parse_status(response).await
    }

    /// Posts one encoded beacon chunk for the given session and returns the
    /// collector's reply.
    pub async fn send_beacon_data(
        &self,
        session_number: i32,
        body: String,
    ) -> Result<StatusResponse, Error> {
        let url = format!(
            "{}/beacon?srvid={}&app={}&session={}",
            self.base_url, self.server_id, self.application_id, session_number
        );
        debug!(%url, bytes = body.len(), "sending beacon chunk");
        let response = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .body(body)
            .send()
            .await?;
        Self::parse_status(response).await
    }

    async fn parse_status(response: reqwest::Response) -> Result<StatusResponse, Error> {
        let status = response.status();
        if !status.is_success() {
            return Err(Error::StatusResponse(format!(
                "collector returned {status}"
            )));
        }
        response
            .json::<StatusResponse>()
            .await
            .map_err(|e| Error::StatusResponse(e.to_string()))
    }
}
