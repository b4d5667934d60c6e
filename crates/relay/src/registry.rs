// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory table of currently open connections.
//!
//! The registry is the only structure mutated from multiple connection tasks
//! concurrently. All operations take a short, await-free critical section
//! under a read/write lock; callers get snapshots and never hold the lock
//! across a socket write.

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::RelayError;
use crate::events::UserInfo;

struct Entry {
    id: u64,
    /// Identity claimed on join; `None` for pairwise peers and room peers
    /// that have not joined yet.
    identity: Option<UserInfo>,
    /// Claim order, for `/list`. Meaningful only when `identity` is set.
    joined_seq: u64,
    outbound: mpsc::UnboundedSender<Bytes>,
    cancel: CancellationToken,
}

/// Snapshot handle for one recipient: its outbound queue and cancel token.
#[derive(Clone)]
pub struct Recipient {
    pub id: u64,
    outbound: mpsc::UnboundedSender<Bytes>,
    cancel: CancellationToken,
}

impl Recipient {
    /// Best-effort frame delivery.
    ///
    /// A dead writer means the connection is already on its way out; trigger
    /// its teardown so the owning task performs the removal, and report the
    /// failure so the caller keeps going with the remaining recipients.
    pub fn deliver(&self, frame: Bytes) -> bool {
        if self.outbound.send(frame).is_err() {
            self.cancel.cancel();
            return false;
        }
        true
    }
}

/// Registry of open connections. A connection appears here iff it is OPEN:
/// inserted once the handshake succeeds, removed exactly once on close.
pub struct Registry {
    entries: RwLock<Vec<Entry>>,
    next_id: AtomicU64,
    next_join_seq: AtomicU64,
}

/// What a successful `remove` took out of the table.
pub struct Removed {
    pub identity: Option<UserInfo>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            next_join_seq: AtomicU64::new(1),
        }
    }

    /// Allocate a process-unique connection id.
    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn insert(
        &self,
        id: u64,
        outbound: mpsc::UnboundedSender<Bytes>,
        cancel: CancellationToken,
    ) {
        self.entries.write().push(Entry {
            id,
            identity: None,
            joined_seq: 0,
            outbound,
            cancel,
        });
    }

    /// Remove a connection. Idempotent: removing a non-member is a no-op and
    /// returns `None`, so a leave notification can never double-fire.
    pub fn remove(&self, id: u64) -> Option<Removed> {
        let mut entries = self.entries.write();
        let idx = entries.iter().position(|e| e.id == id)?;
        let entry = entries.swap_remove(idx);
        Some(Removed { identity: entry.identity })
    }

    pub fn get(&self, id: u64) -> Option<Recipient> {
        self.entries
            .read()
            .iter()
            .find(|e| e.id == id)
            .map(|e| Recipient { id: e.id, outbound: e.outbound.clone(), cancel: e.cancel.clone() })
    }

    /// The identity a connection has claimed, if any.
    pub fn identity(&self, id: u64) -> Option<UserInfo> {
        self.entries.read().iter().find(|e| e.id == id).and_then(|e| e.identity.clone())
    }

    /// Claim an identity for `id`. The duplicate-username check and the
    /// identity write happen under one exclusive lock, so two concurrent
    /// joins with the same name cannot both succeed.
    pub fn claim_identity(&self, id: u64, identity: UserInfo) -> Result<(), RelayError> {
        let mut entries = self.entries.write();
        if entries
            .iter()
            .any(|e| e.identity.as_ref().is_some_and(|u| u.username == identity.username))
        {
            return Err(RelayError::state(format!(
                "username '{}' is already taken",
                identity.username
            )));
        }
        let entry = entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| RelayError::state("connection is not registered"))?;
        entry.identity = Some(identity);
        entry.joined_seq = self.next_join_seq.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Snapshot of claimed identities, in join order.
    pub fn list(&self) -> Vec<UserInfo> {
        let entries = self.entries.read();
        let mut joined: Vec<(u64, UserInfo)> = entries
            .iter()
            .filter_map(|e| e.identity.clone().map(|u| (e.joined_seq, u)))
            .collect();
        joined.sort_by_key(|(seq, _)| *seq);
        joined.into_iter().map(|(_, u)| u).collect()
    }

    /// Snapshot of every recipient except `id`.
    pub fn recipients_except(&self, id: u64) -> Vec<Recipient> {
        self.entries
            .read()
            .iter()
            .filter(|e| e.id != id)
            .map(|e| Recipient { id: e.id, outbound: e.outbound.clone(), cancel: e.cancel.clone() })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
