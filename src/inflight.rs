// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The in-flight table (C2): a bounded map from request-id to pending
//! request, correlating published requests with their eventual reply or
//! timeout.
//!
//! Per SPEC_FULL.md §4.2/§9, this replaces the source's fixed-capacity
//! linear-scan array with a `HashMap` keyed directly on the request-id,
//! retaining `MAX_IN_FLIGHT_MESSAGE` as an admission-control cap on
//! `map.len()`. Entries are removed from the map while the mutex is held,
//! then their callback is invoked after the guard drops — the redesigned
//! callback-after-release pattern from §9, which still holds the
//! exactly-once property because `HashMap::remove` is atomic under the lock:
//! a second caller racing for the same id simply finds nothing.
//!
//! Per §4.2, matching is case-insensitive: every request-id is lowercased
//! before it becomes (or is looked up as) a map key, so `"Abc-123"` and
//! `"abc-123"` name the same slot.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::ack::{Ack, Action};

/// A callback invoked exactly once with the final [`Ack`] for a request.
pub type Callback = Arc<dyn Fn(Ack) + Send + Sync>;

struct Entry {
    action: Action,
    callback: Callback,
    created_at: Instant,
    timeout: Duration,
}

/// Outcome of [`InFlightTable::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The entry was inserted.
    Ok,
    /// The table is at capacity; no insertion was performed.
    Full,
}

/// Outcome of [`InFlightTable::complete`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompleteOutcome {
    /// A matching entry was found, removed, and its callback invoked.
    Ok,
    /// No occupied entry matched the given request-id.
    NoMatch,
}

/// Bounded map from request-id to pending request.
pub struct InFlightTable {
    capacity: usize,
    entries: Mutex<HashMap<String, Entry>>,
}

impl InFlightTable {
    /// Creates an empty table admitting at most `capacity` concurrent entries.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Number of entries currently occupied.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True if no entries are occupied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Inserts a new pending request. Duplicate request-ids are a programming
    /// error (invariant 1: UUID v4 makes collisions statistically impossible)
    /// and panic rather than silently clobber a live entry's callback.
    pub fn insert(
        &self,
        request_id: String,
        action: Action,
        callback: Callback,
        timeout: Duration,
    ) -> InsertOutcome {
        let key = request_id.to_ascii_lowercase();
        let mut entries = self.entries.lock();
        if entries.len() >= self.capacity {
            return InsertOutcome::Full;
        }
        let previous = entries.insert(
            key,
            Entry {
                action,
                callback,
                created_at: Instant::now(),
                timeout,
            },
        );
        assert!(
            previous.is_none(),
            "duplicate in-flight request-id {request_id}: caller violated UUID v4 uniqueness"
        );
        InsertOutcome::Ok
    }

    /// Resolves a correlated reply: removes the matching entry and invokes
    /// its callback with `ack` after releasing the lock.
    ///
    /// Matching is case-insensitive and bounded to 64-char ids by the caller
    /// (the dispatcher, per §4.6 step 4); a missing id is reported as
    /// [`CompleteOutcome::NoMatch`] — a warning to the caller's log, never an
    /// error raised to the protocol's user.
    pub fn complete(&self, request_id: &str, ack: Ack) -> CompleteOutcome {
        let key = request_id.to_ascii_lowercase();
        let entry = {
            let mut entries = self.entries.lock();
            entries.remove(&key)
        };

        match entry {
            Some(entry) => {
                (entry.callback)(ack);
                CompleteOutcome::Ok
            }
            None => CompleteOutcome::NoMatch,
        }
    }

    /// The action recorded for an occupied entry, if any — used by the
    /// dispatcher to validate that a reply's topic-implied action matches
    /// the action the request was originally published under.
    #[must_use]
    pub fn action_of(&self, request_id: &str) -> Option<Action> {
        let key = request_id.to_ascii_lowercase();
        self.entries.lock().get(&key).map(|e| e.action)
    }

    /// Expires every entry whose deadline has passed as of `now`, invoking
    /// each with [`Ack::Timeout`] after releasing the lock. Returns the
    /// number of entries reaped.
    pub fn reap(&self, now: Instant) -> usize {
        let expired: Vec<Callback> = {
            let mut entries = self.entries.lock();
            let expired_ids: Vec<String> = entries
                .iter()
                .filter(|(_, entry)| now.duration_since(entry.created_at) > entry.timeout)
                .map(|(id, _)| id.clone())
                .collect();

            expired_ids
                .into_iter()
                .filter_map(|id| entries.remove(&id))
                .map(|entry| entry.callback)
                .collect()
        };

        let count = expired.len();
        for callback in expired {
            callback(Ack::Timeout);
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    fn counting_callback() -> (Callback, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let counted = count.clone();
        let cb: Callback = Arc::new(move |_ack| {
            counted.fetch_add(1, Ordering::SeqCst);
        });
        (cb, count)
    }

    #[test]
    fn insert_then_complete_invokes_callback_once() {
        let table = InFlightTable::new(4);
        let (cb, count) = counting_callback();

        assert_eq!(
            table.insert("r1".into(), Action::Update, cb, Duration::from_secs(5)),
            InsertOutcome::Ok
        );
        assert_eq!(table.len(), 1);

        let outcome = table.complete("r1", Ack::accepted(serde_json::json!({})));
        assert_eq!(outcome, CompleteOutcome::Ok);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn complete_matches_request_id_case_insensitively() {
        let table = InFlightTable::new(4);
        let (cb, count) = counting_callback();
        table.insert("AbC-123".into(), Action::Update, cb, Duration::from_secs(5));

        assert_eq!(table.action_of("abc-123"), Some(Action::Update));

        let outcome = table.complete("ABC-123", Ack::accepted(serde_json::json!({})));
        assert_eq!(outcome, CompleteOutcome::Ok);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn complete_unknown_id_is_no_match() {
        let table = InFlightTable::new(4);
        let outcome = table.complete("missing", Ack::Timeout);
        assert_eq!(outcome, CompleteOutcome::NoMatch);
    }

    #[test]
    fn complete_is_idempotent_under_race() {
        // Simulates reply and timeout racing for the same slot: only the
        // first remove wins the callback, proving exactly-once.
        let table = InFlightTable::new(4);
        let (cb, count) = counting_callback();
        table.insert("r1".into(), Action::Get, cb, Duration::from_secs(5));

        let first = table.complete("r1", Ack::accepted(serde_json::json!({})));
        let second = table.complete("r1", Ack::Timeout);

        assert_eq!(first, CompleteOutcome::Ok);
        assert_eq!(second, CompleteOutcome::NoMatch);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn insert_past_capacity_returns_full() {
        let table = InFlightTable::new(1);
        let (cb1, _c1) = counting_callback();
        let (cb2, _c2) = counting_callback();

        assert_eq!(
            table.insert("r1".into(), Action::Update, cb1, Duration::from_secs(5)),
            InsertOutcome::Ok
        );
        assert_eq!(
            table.insert("r2".into(), Action::Update, cb2, Duration::from_secs(5)),
            InsertOutcome::Full
        );
        assert_eq!(table.len(), 1);
    }

    #[test]
    #[should_panic(expected = "duplicate in-flight request-id")]
    fn duplicate_insert_panics() {
        let table = InFlightTable::new(4);
        let (cb1, _c1) = counting_callback();
        let (cb2, _c2) = counting_callback();
        table.insert("dup".into(), Action::Get, cb1, Duration::from_secs(5));
        table.insert("dup".into(), Action::Get, cb2, Duration::from_secs(5));
    }

    #[test]
    fn reap_expires_only_overdue_entries() {
        let table = InFlightTable::new(4);
        let (cb_old, count_old) = counting_callback();
        let (cb_new, count_new) = counting_callback();

        let start = Instant::now();
        table.insert("old".into(), Action::Update, cb_old, Duration::from_secs(1));
        table.insert("new".into(), Action::Update, cb_new, Duration::from_secs(60));

        let later = start + Duration::from_secs(2);
        let reaped = table.reap(later);

        assert_eq!(reaped, 1);
        assert_eq!(count_old.load(Ordering::SeqCst), 1);
        assert_eq!(count_new.load(Ordering::SeqCst), 0);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn action_of_reports_recorded_action() {
        let table = InFlightTable::new(4);
        let (cb, _count) = counting_callback();
        table.insert("r1".into(), Action::Delete, cb, Duration::from_secs(5));
        assert_eq!(table.action_of("r1"), Some(Action::Delete));
        assert_eq!(table.action_of("missing"), None);
    }

    #[test]
    fn concurrent_complete_calls_do_not_double_invoke() {
        let table = Arc::new(InFlightTable::new(4));
        let (cb, count) = counting_callback();
        table.insert("r1".into(), Action::Update, cb, Duration::from_secs(5));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let table = table.clone();
                thread::spawn(move || table.complete("r1", Ack::Timeout))
            })
            .collect();

        let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let oks = outcomes.iter().filter(|o| **o == CompleteOutcome::Ok).count();

        assert_eq!(oks, 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
