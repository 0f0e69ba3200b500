// Copyright 2025-Present BeaconKit authors
// SPDX-License-Identifier: Apache-2.0

use crate::beacon::Beacon;
use crate::session::OpenActions;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicI64, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

/// A timed span nested inside a session.
///
/// Owned by the session's open-action collection until [`Action::leave`]
/// runs; leaving reports the span to the beacon and removes the entry, after
/// which the action is immutable history.
#[derive(Debug)]
pub struct Action {
    id: i32,
    name: String,
    start_time: i64,
    start_sequence_number: i32,
    end_time: AtomicI64,
    end_sequence_number: AtomicI32,
    left: AtomicBool,
    beacon: Arc<Beacon>,
    open_actions: Weak<OpenActions>,
}

impl Action {
    pub(crate) fn new(name: &str, beacon: Arc<Beacon>, open_actions: Weak<OpenActions>) -> Self {
        Action {
            id: beacon.next_id(),
            name: name.to_string(),
            start_time: beacon.current_timestamp(),
            start_sequence_number: beacon.next_sequence_number(),
            end_time: AtomicI64::new(0),
            end_sequence_number: AtomicI32::new(0),
            left: AtomicBool::new(false),
            beacon,
            open_actions,
        }
    }

    /// Closes the span: records the end timestamp and sequence number,
    /// reports the action to the beacon, and removes this action from its
    /// session's open-action collection. Idempotent; only the first call has
    /// an effect.
    ///
    /// Removing its own entry is what guarantees the session end loop's
    /// termination, so it must happen on every effective leave.
    #[allow(clippy::expect_used)]
    pub fn leave(&self) {
        if self.left.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(action = self.id, name = %self.name, "leave_action");

        self.end_time
            .store(self.beacon.current_timestamp(), Ordering::SeqCst);
        self.end_sequence_number
            .store(self.beacon.next_sequence_number(), Ordering::SeqCst);
        self.beacon.add_action(self);

        if let Some(open_actions) = self.open_actions.upgrade() {
            open_actions.lock().expect("lock poisoned").remove(&self.id);
        }
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn start_time(&self) -> i64 {
        self.start_time
    }

    pub fn start_sequence_number(&self) -> i32 {
        self.start_sequence_number
    }

    /// 0 until the action has left.
    pub fn end_time(&self) -> i64 {
        self.end_time.load(Ordering::SeqCst)
    }

    pub fn end_sequence_number(&self) -> i32 {
        self.end_sequence_number.load(Ordering::SeqCst)
    }

    pub fn is_left(&self) -> bool {
        self.left.load(Ordering::SeqCst)
    }
}
