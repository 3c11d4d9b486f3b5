// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The delta handler registry (C3): an append-only list of
//! `(property-key, callback)` entries, dispatched in registration order
//! whenever the cloud pushes a `delta` message.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use crate::ack::DeltaError;

/// A delta handler: receives the whole `desired` object (`key: None` at
/// registration) or just the sub-object at a registered key.
pub type DeltaCallback = Arc<dyn Fn(Option<&str>, &Value) -> Option<DeltaError> + Send + Sync>;

/// Identifies a registered delta handler (registry entries are never
/// removed per invariant 4, so this exists for diagnostics, not unregistration).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeltaHandlerId(u64);

struct Entry {
    key: Option<String>,
    callback: DeltaCallback,
}

/// Outcome of [`DeltaRegistry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// The handler was appended, with its assigned id.
    Ok(DeltaHandlerId),
    /// The registry is at `MAX_SHADOW_PROPERTY_HANDLER` capacity.
    Full,
}

/// Append-only, capacity-bounded registry of delta handlers.
pub struct DeltaRegistry {
    capacity: usize,
    entries: Mutex<Vec<Entry>>,
    next_id: AtomicU64,
}

impl DeltaRegistry {
    /// Creates an empty registry admitting at most `capacity` handlers.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True if no handlers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends a handler for `key` (`None` for the whole `desired` object).
    pub fn register(&self, key: Option<String>, callback: DeltaCallback) -> RegisterOutcome {
        let mut entries = self.entries.lock();
        if entries.len() >= self.capacity {
            return RegisterOutcome::Full;
        }
        let id = DeltaHandlerId(self.next_id.fetch_add(1, Ordering::SeqCst));
        entries.push(Entry { key, callback });
        RegisterOutcome::Ok(id)
    }

    /// Dispatches `desired` to every registered handler in registration
    /// order. Snapshots the handler list under the lock, then releases it
    /// before invoking any handler — user code must be free to call
    /// `register` (or anything else) from within a handler without
    /// self-deadlocking on this registry's mutex.
    ///
    /// Stops at the first handler that returns a user error and returns
    /// that error to the caller (the inbound dispatcher), which propagates
    /// it to the cloud on `delta/rejected`.
    pub fn dispatch(&self, desired: &Value) -> Option<DeltaError> {
        let snapshot: Vec<(Option<String>, DeltaCallback)> = {
            let entries = self.entries.lock();
            entries
                .iter()
                .map(|e| (e.key.clone(), e.callback.clone()))
                .collect()
        };

        for (key, callback) in snapshot {
            let result = match &key {
                None => (callback)(None, desired),
                Some(key) => match desired.get(key) {
                    Some(sub_object) => (callback)(Some(key.as_str()), sub_object),
                    None => continue,
                },
            };
            if let Some(err) = result {
                return Some(err);
            }
        }
        None
    }
}
