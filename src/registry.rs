// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The client registry (C7): a process-wide, non-owning set of live
//! clients, used by the timeout reaper (C4) as its enumeration root.
//!
//! Grounded on `protocol/broker_pool.rs`'s `Weak`-keyed connection pool:
//! entries are `Weak<dyn Reapable>`, so the registry never extends a
//! client's lifetime, and liveness is determined the same way
//! `BrokerPool`'s event loop decides when to exit — by checking whether the
//! `Weak` can still be upgraded.
//!
//! The registry is generic over neither the client type nor its transport:
//! `ShadowClient<T>` is generic in `T: Transport` (so it can run against
//! `FakeTransport` in tests), but one process-wide registry must hold
//! clients of every `T` at once. [`Reapable`] is the minimal, object-safe
//! seam the reaper actually needs — `ClientInner<T>` implements it for
//! every `T`, so the registry itself never has to name `T`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use parking_lot::RwLock;

/// The seam between a client and the process-wide reaper: expire overdue
/// in-flight entries and report how many were reaped. Implemented by
/// `ClientInner<T>` for every transport `T` by delegating to its
/// [`crate::inflight::InFlightTable::reap`].
pub trait Reapable: Send + Sync {
    /// Expires overdue in-flight entries as of `now`, invoking their
    /// callbacks with `Ack::Timeout`. Returns the number reaped.
    fn reap(&self, now: Instant) -> usize;
}

/// Identifies one registered client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(u64);

/// Outcome of [`ClientRegistry::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// The client was registered under the returned id.
    Ok(ClientId),
    /// The registry is at `MAX_CLIENT` live entries.
    Full,
}

/// Process-wide registry of live clients.
pub struct ClientRegistry {
    capacity: usize,
    next_id: AtomicU64,
    clients: RwLock<HashMap<ClientId, Weak<dyn Reapable>>>,
}

impl ClientRegistry {
    /// Creates an empty registry admitting at most `capacity` live clients.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            next_id: AtomicU64::new(0),
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a non-owning reference to `client`.
    ///
    /// Before counting towards `MAX_CLIENT`, already-dropped entries are
    /// pruned, so the bound tracks live clients rather than historical
    /// registrations.
    pub fn add(&self, client: &Arc<dyn Reapable>) -> AddOutcome {
        let mut clients = self.clients.write();
        clients.retain(|_, weak| weak.strong_count() > 0);

        if clients.len() >= self.capacity {
            return AddOutcome::Full;
        }

        let id = ClientId(self.next_id.fetch_add(1, Ordering::SeqCst));
        clients.insert(id, Arc::downgrade(client));
        AddOutcome::Ok(id)
    }

    /// Removes a client from the registry by id (used by `destroy`).
    pub fn remove(&self, id: ClientId) {
        self.clients.write().remove(&id);
    }

    /// Number of entries whose referent is still alive.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.clients
            .read()
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    /// Snapshots every currently-live client. Holds the read lock only long
    /// enough to upgrade each `Weak`, mirroring SPEC_FULL.md §4.4's
    /// "acquire the client-registry mutex long enough to snapshot live
    /// clients, release it" — the reaper then calls `reap` on each snapshot
    /// entry without the registry lock held.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<dyn Reapable>> {
        self.clients
            .read()
            .values()
            .filter_map(Weak::upgrade)
            .collect()
    }
}
