// Copyright 2025-Present BeaconKit authors
// SPDX-License-Identifier: Apache-2.0

use crate::config::{Configuration, SamplingConfig, DEFAULT_MULTIPLICITY};
use crate::http::{HttpClient, StatusResponse, SENTINEL};
use crate::session::{Session, SessionListener};
use std::sync::{Arc, Mutex};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

#[derive(Default)]
struct SessionRegistry {
    open: Vec<Arc<Session>>,
    finished: Vec<Arc<Session>>,
}

/// Orchestrates periodic transmission across all live sessions.
///
/// One sender task runs per process: each cycle it asks the collector for
/// the current status, reconciles the configuration against the reply,
/// pushes sampling settings into sessions that are still waiting for one
/// (spending their request budget), and ships or discards finished
/// sessions' data.
pub struct BeaconSender {
    config: Arc<Configuration>,
    registry: Mutex<SessionRegistry>,
}

impl SessionListener for BeaconSender {
    #[allow(clippy::expect_used)]
    fn start_session(&self, session: &Arc<Session>) {
        let mut registry = self.registry.lock().expect("lock poisoned");
        registry.open.push(Arc::clone(session));
    }

    #[allow(clippy::expect_used)]
    fn finish_session(&self, session: &Arc<Session>) {
        let mut registry = self.registry.lock().expect("lock poisoned");
        registry.open.retain(|open| open.id() != session.id());
        if !registry.finished.iter().any(|f| f.id() == session.id()) {
            registry.finished.push(Arc::clone(session));
        }
    }
}

impl BeaconSender {
    pub fn new(config: Arc<Configuration>) -> Arc<Self> {
        Arc::new(BeaconSender {
            config,
            registry: Mutex::new(SessionRegistry::default()),
        })
    }

    /// Runs the periodic send loop until the token is cancelled, then makes
    /// a final drain pass so finished sessions are not lost on shutdown.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let mut transport = self.config.transport();
        let mut client = match HttpClient::new(&transport) {
            Ok(client) => client,
            Err(e) => {
                error!("failed to build collector client: {e}");
                return;
            }
        };

        info!("beacon sender started");
        loop {
            tokio::select! {
                _ = sleep(self.config.send_interval()) => {}
                _ = shutdown.cancelled() => break,
            }

            match client.send_status_request().await {
                Ok(response) => {
                    self.config.reconcile(&response);
                    self.assign_sampling_configs(&response);
                }
                Err(e) => debug!("status request failed: {e}"),
            }

            // Reconciliation may have swapped the transport snapshot; the
            // client follows the new server id on the next cycle.
            let current = self.config.transport();
            if !Arc::ptr_eq(&current, &transport) {
                match HttpClient::new(&current) {
                    Ok(rebuilt) => {
                        debug!(server_id = current.server_id, "transport replaced");
                        transport = current;
                        client = rebuilt;
                    }
                    Err(e) => error!("failed to rebuild collector client: {e}"),
                }
            }

            self.send_finished_sessions(&client).await;
        }

        self.send_finished_sessions(&client).await;
        info!("beacon sender stopped");
    }

    /// Pushes collector-assigned sampling settings into every session that
    /// has not received one yet. A session whose request budget ran out is
    /// sampled out so its data gets discarded instead of lingering.
    fn assign_sampling_configs(&self, response: &StatusResponse) {
        let waiting: Vec<Arc<Session>> = {
            #[allow(clippy::expect_used)]
            let registry = self.registry.lock().expect("lock poisoned");
            registry
                .open
                .iter()
                .chain(registry.finished.iter())
                .filter(|session| !session.is_sampling_config_set())
                .cloned()
                .collect()
        };

        for session in waiting {
            if session.can_request_new_session() {
                session.decrease_new_session_requests();
                session.update_sampling_config(self.sampling_from_response(response));
            } else {
                debug!(
                    session = session.id(),
                    "session configuration request budget exhausted, sampling out"
                );
                session.update_sampling_config(self.sampled_out_config());
            }
        }
    }

    fn sampling_from_response(&self, response: &StatusResponse) -> Arc<SamplingConfig> {
        let defaults = self.config.default_sampling();
        let multiplicity = match response.multiplicity {
            SENTINEL => DEFAULT_MULTIPLICITY,
            value => value as i32,
        };
        Arc::new(SamplingConfig {
            multiplicity,
            ..(*defaults).clone()
        })
    }

    fn sampled_out_config(&self) -> Arc<SamplingConfig> {
        let defaults = self.config.default_sampling();
        Arc::new(SamplingConfig {
            multiplicity: 0,
            ..(*defaults).clone()
        })
    }

    /// Ships every finished session that is allowed to send; discards the
    /// data of sessions that are not. A transport failure puts the session
    /// back for the next cycle.
    async fn send_finished_sessions(&self, client: &HttpClient) {
        let finished = {
            #[allow(clippy::expect_used)]
            let mut registry = self.registry.lock().expect("lock poisoned");
            std::mem::take(&mut registry.finished)
        };

        for session in finished {
            if session.is_data_sending_allowed() {
                match session.send_beacon(client).await {
                    Ok(Some(response)) => self.config.reconcile(&response),
                    Ok(None) => {}
                    Err(e) => {
                        error!(session = session.id(), "failed to send beacon: {e}");
                        #[allow(clippy::expect_used)]
                        self.registry
                            .lock()
                            .expect("lock poisoned")
                            .finished
                            .push(session);
                    }
                }
            } else {
                session.clear_captured_data();
            }
        }
    }

    #[allow(clippy::expect_used)]
    pub fn open_session_count(&self) -> usize {
        self.registry.lock().expect("lock poisoned").open.len()
    }

    #[allow(clippy::expect_used)]
    pub fn finished_session_count(&self) -> usize {
        self.registry.lock().expect("lock poisoned").finished.len()
    }
}
