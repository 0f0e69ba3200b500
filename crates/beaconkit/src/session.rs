// Copyright 2025-Present BeaconKit authors
// SPDX-License-Identifier: Apache-2.0

use crate::action::Action;
use crate::beacon::Beacon;
use crate::cache::BeaconCache;
use crate::config::{Configuration, SamplingConfig};
use crate::error::Error;
use crate::http::{HttpClient, StatusResponse};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tracing::debug;

/// How many times a session may ask the collector for a fresh session
/// configuration before giving up.
pub const MAX_NEW_SESSION_REQUESTS: i32 = 4;

/// Open actions keyed by action id. Mutated from entering threads and the
/// ending thread, so always accessed under the mutex.
pub(crate) type OpenActions = Mutex<HashMap<i32, Arc<Action>>>;

/// Registration seam between a session and whatever orchestrates sending
/// (normally the [`crate::sender::BeaconSender`]). Injected so the session
/// stays testable without a live sender.
pub trait SessionListener: Send + Sync {
    fn start_session(&self, session: &Arc<Session>);
    fn finish_session(&self, session: &Arc<Session>);
}

/// A logical user session: accumulates nested actions, owns exactly one
/// [`Beacon`], and gates transmission on the collector-assigned sampling
/// config.
///
/// Lifecycle: Created -> Active (actions open and close) -> Ending
/// ([`Session::end`] force-closes every open action) -> Finished (terminal).
/// Ending twice is an idempotent no-op; entering an action after teardown
/// has begun is accepted and the entry is closed by a later drain pass.
pub struct Session {
    id: i32,
    beacon: Arc<Beacon>,
    listener: Arc<dyn SessionListener>,
    open_actions: Arc<OpenActions>,
    end_time: AtomicI64,
    ended: AtomicBool,
    finished: AtomicBool,
    sampling: RwLock<Arc<SamplingConfig>>,
    sampling_config_set: AtomicBool,
    new_session_requests_left: AtomicI32,
}

impl Session {
    /// Creates the session, its beacon, and registers it with the listener
    /// and the beacon.
    pub fn new(
        config: &Arc<Configuration>,
        cache: &Arc<BeaconCache>,
        listener: Arc<dyn SessionListener>,
    ) -> Arc<Self> {
        let beacon = Arc::new(Beacon::new(Arc::clone(config), Arc::clone(cache)));
        let session = Arc::new(Session {
            id: beacon.session_number(),
            beacon,
            listener,
            open_actions: Arc::new(Mutex::new(HashMap::new())),
            end_time: AtomicI64::new(0),
            ended: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            sampling: RwLock::new(config.default_sampling()),
            sampling_config_set: AtomicBool::new(false),
            new_session_requests_left: AtomicI32::new(MAX_NEW_SESSION_REQUESTS),
        });

        session.listener.start_session(&session);
        session.beacon.start_session();
        debug!(session = session.id, "session started");
        session
    }

    /// Random 31-bit positive session identity.
    pub fn id(&self) -> i32 {
        self.id
    }

    /// Opens a new action under this session and returns it for later
    /// closing.
    #[allow(clippy::expect_used)]
    pub fn enter_action(&self, name: &str) -> Arc<Action> {
        debug!(session = self.id, action = name, "enter_action");
        let action = Arc::new(Action::new(
            name,
            Arc::clone(&self.beacon),
            Arc::downgrade(&self.open_actions),
        ));
        self.open_actions
            .lock()
            .expect("lock poisoned")
            .insert(action.id(), Arc::clone(&action));
        action
    }

    /// Forwards a user-identifying tag to the beacon. No state transition.
    pub fn identify_user(&self, tag: &str) {
        self.beacon.identify_user(tag);
    }

    /// Ends the session at the beacon's current time.
    pub fn end(self: &Arc<Self>) {
        self.end_at(self.beacon.current_timestamp());
    }

    /// Ends the session at an explicit timestamp: force-closes every open
    /// action, then notifies the beacon and the listener exactly once.
    ///
    /// The open-action collection is drained until empty, so actions entered
    /// racily during teardown are closed by a later pass. A second call is
    /// an idempotent no-op.
    #[allow(clippy::expect_used)]
    pub fn end_at(self: &Arc<Self>, end_time: i64) {
        if self.ended.swap(true, Ordering::SeqCst) {
            debug!(session = self.id, "end called on an already-ended session");
            return;
        }
        debug!(session = self.id, "ending session");
        self.end_time.store(end_time, Ordering::SeqCst);

        loop {
            let next = {
                let open_actions = self.open_actions.lock().expect("lock poisoned");
                open_actions.values().next().cloned()
            };
            match next {
                Some(action) => {
                    action.leave();
                    // Leaving removes its own entry; removing again here
                    // keeps the drain terminating even for an entry that was
                    // somehow already left.
                    self.open_actions
                        .lock()
                        .expect("lock poisoned")
                        .remove(&action.id());
                }
                None => break,
            }
        }

        self.beacon.end_session(end_time);
        self.listener.finish_session(self);
        self.finished.store(true, Ordering::SeqCst);
    }

    /// Epoch ms the session ended at; 0 until ended.
    pub fn end_time(&self) -> i64 {
        self.end_time.load(Ordering::SeqCst)
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    /// Whether the new-session-request budget still allows asking the
    /// collector for a fresh session configuration. Purely observational;
    /// the sender spends the budget.
    pub fn can_request_new_session(&self) -> bool {
        self.new_session_requests_left.load(Ordering::SeqCst) > 0
    }

    pub fn decrease_new_session_requests(&self) {
        self.new_session_requests_left.fetch_sub(1, Ordering::SeqCst);
    }

    /// One-way latch: whether the collector has assigned sampling settings.
    pub fn is_sampling_config_set(&self) -> bool {
        self.sampling_config_set.load(Ordering::SeqCst)
    }

    /// Replaces the active sampling config wholesale and latches the
    /// set-flag. There is no way to unset it.
    #[allow(clippy::expect_used)]
    pub fn update_sampling_config(&self, config: Arc<SamplingConfig>) {
        *self.sampling.write().expect("lock poisoned") = config;
        self.sampling_config_set.store(true, Ordering::SeqCst);
    }

    #[allow(clippy::expect_used)]
    pub fn sampling_config(&self) -> Arc<SamplingConfig> {
        Arc::clone(&self.sampling.read().expect("lock poisoned"))
    }

    /// The single gate consulted before any transmission attempt: true only
    /// once sampling settings arrived and their multiplicity is positive.
    /// "Haven't heard from the collector" and "collector said don't send"
    /// both suppress transmission.
    pub fn is_data_sending_allowed(&self) -> bool {
        self.is_sampling_config_set() && !self.sampling_config().is_sampled_out()
    }

    /// Discards all buffered records for this session's identity.
    pub fn clear_captured_data(&self) {
        self.beacon.clear_captured_data();
    }

    /// Encodes and ships this session's buffered records. Transport failure
    /// propagates; `Ok(None)` means there was nothing to send.
    pub async fn send_beacon(&self, client: &HttpClient) -> Result<Option<StatusResponse>, Error> {
        self.beacon.send(client).await
    }

    #[cfg(test)]
    pub(crate) fn open_action_count(&self) -> usize {
        self.open_actions.lock().expect("lock poisoned").len()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("finished", &self.is_finished())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigurationOptions, CrashReportingLevel, DataCollectionLevel, RetentionPolicy};
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CountingListener {
        started: AtomicUsize,
        finished: AtomicUsize,
    }

    impl SessionListener for CountingListener {
        fn start_session(&self, _session: &Arc<Session>) {
            self.started.fetch_add(1, Ordering::SeqCst);
        }

        fn finish_session(&self, _session: &Arc<Session>) {
            self.finished.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn test_setup() -> (Arc<Session>, Arc<CountingListener>, Arc<BeaconCache>) {
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
        let listener = Arc::new(CountingListener::default());
        let session = Session::new(
            &config,
            &cache,
            Arc::clone(&listener) as Arc<dyn SessionListener>,
        );
        (session, listener, cache)
    }

    fn sampling(multiplicity: i32) -> Arc<SamplingConfig> {
        Arc::new(SamplingConfig {
            multiplicity,
            data_collection_level: DataCollectionLevel::UserBehavior,
            crash_reporting_level: CrashReportingLevel::OptIn,
            device_id: 42,
        })
    }

    #[test]
    fn test_new_session_registers_with_listener() {
        let (session, listener, _cache) = test_setup();
        assert_eq!(listener.started.load(Ordering::SeqCst), 1);
        assert!(!session.is_finished());
        assert!(session.id() >= 0);
    }

    #[test]
    fn test_end_closes_all_open_actions() {
        let (session, listener, _cache) = test_setup();
        let a = session.enter_action("a");
        let b = session.enter_action("b");
        let c = session.enter_action("c");
        assert_eq!(session.open_action_count(), 3);

        session.end();

        assert!(a.is_left());
        assert!(b.is_left());
        assert!(c.is_left());
        assert_eq!(session.open_action_count(), 0);
        assert!(session.is_finished());
        assert!(session.end_time() > 0);
        assert_eq!(listener.finished.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_end_twice_notifies_listener_once() {
        let (session, listener, _cache) = test_setup();
        session.enter_action("a");

        session.end();
        let first_end_time = session.end_time();
        session.end_at(first_end_time + 1000);

        assert_eq!(session.end_time(), first_end_time);
        assert_eq!(listener.finished.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_end_at_records_explicit_timestamp() {
        let (session, _listener, _cache) = test_setup();
        session.end_at(123_456);
        assert_eq!(session.end_time(), 123_456);
        assert!(session.is_finished());
    }

    #[test]
    fn test_already_left_action_does_not_block_end() {
        let (session, listener, _cache) = test_setup();
        let action = session.enter_action("a");
        action.leave();
        assert_eq!(session.open_action_count(), 0);

        session.end();
        assert!(session.is_finished());
        assert_eq!(listener.finished.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_enter_action_after_end_does_not_corrupt_state() {
        let (session, _listener, _cache) = test_setup();
        session.end();

        // Accepted per the documented "still active" policy; the session
        // stays finished and the entry just sits in the collection.
        let late = session.enter_action("late");
        assert!(session.is_finished());
        assert_eq!(session.open_action_count(), 1);
        late.leave();
        assert_eq!(session.open_action_count(), 0);
    }

    #[test]
    fn test_data_sending_gate() {
        let (session, _listener, _cache) = test_setup();
        assert!(!session.is_data_sending_allowed());

        session.update_sampling_config(sampling(0));
        assert!(session.is_sampling_config_set());
        assert!(!session.is_data_sending_allowed());

        session.update_sampling_config(sampling(2));
        assert!(session.is_data_sending_allowed());
    }

    #[test]
    fn test_new_session_request_budget() {
        let (session, _listener, _cache) = test_setup();
        for _ in 0..MAX_NEW_SESSION_REQUESTS {
            assert!(session.can_request_new_session());
            session.decrease_new_session_requests();
        }
        assert!(!session.can_request_new_session());
    }

    #[test]
    fn test_clear_captured_data_empties_cache() {
        let (session, _listener, cache) = test_setup();
        session.identify_user("user-1");
        assert!(cache.record_count() > 0);

        session.clear_captured_data();
        assert_eq!(cache.record_count(), 0);
    }

    #[test]
    fn test_concurrent_enter_and_end() {
        let (session, listener, _cache) = test_setup();

        let entering = {
            let session = Arc::clone(&session);
            std::thread::spawn(move || {
                for i in 0..50 {
                    session.enter_action(&format!("action-{i}"));
                }
            })
        };
        let ending = {
            let session = Arc::clone(&session);
            std::thread::spawn(move || session.end())
        };

        entering.join().unwrap();
        ending.join().unwrap();

        // Late arrivals may remain open (entered after the drain finished),
        // but the drain itself must have completed and notified once.
        assert!(session.is_finished());
        assert_eq!(listener.finished.load(Ordering::SeqCst), 1);
    }
}
