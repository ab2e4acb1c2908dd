//! Session state: credential, identity and busy flags for one client.
//!
//! SYSTEM CONTEXT
//! ==============
//! Read by the request pipeline (bearer injection) and the route guard;
//! mutated only by login, renewal, identity fetch and reset. Nothing here
//! performs I/O.
//!
//! DESIGN
//! ======
//! The state lives in a `tokio::sync::watch` channel so observers can
//! `subscribe()` and re-render on every change. `Session` is a cheap handle;
//! clones share the same state, separate `Session::new()` calls do not.
//!
//! Every `reset()` advances an epoch. Writers that started before a reset
//! pass the epoch they observed to the `*_since` mutators, and those writes
//! are discarded once the epoch has moved on: an explicit reset always wins.

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;

use std::sync::Arc;

use tokio::sync::watch;

use crate::types::{Credential, Identity};

/// Point-in-time copy of the session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub credential: Option<Credential>,
    pub identity: Option<Identity>,
    pub(crate) auth_ops: u32,
    pub(crate) page_ops: u32,
    pub(crate) epoch: u64,
}

impl SessionSnapshot {
    /// Login, refresh or identity mutation in progress.
    #[must_use]
    pub fn auth_busy(&self) -> bool {
        self.auth_ops > 0
    }

    /// Page data fetch in progress.
    #[must_use]
    pub fn page_busy(&self) -> bool {
        self.page_ops > 0
    }

    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BusyKind {
    Auth,
    Page,
}

/// Shared handle to one client's session state.
#[derive(Debug, Clone)]
pub struct Session {
    tx: Arc<watch::Sender<SessionSnapshot>>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SessionSnapshot::default());
        Self { tx: Arc::new(tx) }
    }

    /// Receiver notified after every mutation.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.tx.subscribe()
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.tx.borrow().clone()
    }

    #[must_use]
    pub fn credential(&self) -> Option<Credential> {
        self.tx.borrow().credential.clone()
    }

    #[must_use]
    pub fn identity(&self) -> Option<Identity> {
        self.tx.borrow().identity.clone()
    }

    #[must_use]
    pub fn auth_busy(&self) -> bool {
        self.tx.borrow().auth_busy()
    }

    #[must_use]
    pub fn page_busy(&self) -> bool {
        self.tx.borrow().page_busy()
    }

    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.tx.borrow().epoch
    }

    // =========================================================================
    // MUTATORS
    // =========================================================================

    pub fn set_credential(&self, credential: Credential) {
        self.tx.send_modify(|s| s.credential = Some(credential));
    }

    /// Store `credential` unless the session was reset after `epoch`.
    ///
    /// Returns whether the write was applied.
    pub fn set_credential_since(&self, epoch: u64, credential: Credential) -> bool {
        self.tx.send_if_modified(|s| {
            if s.epoch != epoch {
                return false;
            }
            s.credential = Some(credential);
            true
        })
    }

    pub fn replace_identity(&self, identity: Option<Identity>) {
        self.tx.send_modify(|s| s.identity = identity);
    }

    /// Replace the identity unless the session was reset after `epoch`.
    pub fn replace_identity_since(&self, epoch: u64, identity: Option<Identity>) -> bool {
        self.tx.send_if_modified(|s| {
            if s.epoch != epoch {
                return false;
            }
            s.identity = identity;
            true
        })
    }

    /// Drop credential and identity after a failed identity fetch.
    ///
    /// Busy flags and the epoch are left alone; this is not a full reset.
    pub fn revoke_since(&self, epoch: u64) -> bool {
        self.tx.send_if_modified(|s| {
            if s.epoch != epoch || (s.credential.is_none() && s.identity.is_none()) {
                return false;
            }
            s.credential = None;
            s.identity = None;
            true
        })
    }

    /// Clear credential, identity and both busy flags. Idempotent.
    pub fn reset(&self) {
        self.tx.send_modify(|s| {
            let epoch = s.epoch.wrapping_add(1);
            *s = SessionSnapshot { epoch, ..SessionSnapshot::default() };
        });
        tracing::info!("session reset");
    }

    /// Reset on behalf of work that began at `epoch`.
    ///
    /// A no-op if the session was already reset since; returns whether the
    /// reset happened.
    pub fn reset_since(&self, epoch: u64) -> bool {
        let applied = self.tx.send_if_modified(|s| {
            if s.epoch != epoch {
                return false;
            }
            *s = SessionSnapshot { epoch: epoch.wrapping_add(1), ..SessionSnapshot::default() };
            true
        });
        if applied {
            tracing::info!("session reset");
        } else {
            tracing::debug!(epoch, "stale reset discarded");
        }
        applied
    }

    // =========================================================================
    // BUSY FLAGS
    // =========================================================================

    /// Raise `auth_busy` until the returned guard is dropped.
    #[must_use = "the flag is lowered as soon as the guard is dropped"]
    pub fn begin_auth(&self) -> BusyGuard {
        self.begin(BusyKind::Auth)
    }

    /// Raise `page_busy` until the returned guard is dropped.
    #[must_use = "the flag is lowered as soon as the guard is dropped"]
    pub fn begin_page(&self) -> BusyGuard {
        self.begin(BusyKind::Page)
    }

    fn begin(&self, kind: BusyKind) -> BusyGuard {
        let mut epoch = 0;
        self.tx.send_modify(|s| {
            epoch = s.epoch;
            match kind {
                BusyKind::Auth => s.auth_ops += 1,
                BusyKind::Page => s.page_ops += 1,
            }
        });
        BusyGuard { session: self.clone(), kind, epoch }
    }
}

/// Holds one busy flag raised. Dropping after a reset is a no-op.
#[derive(Debug)]
pub struct BusyGuard {
    session: Session,
    kind: BusyKind,
    epoch: u64,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        let (kind, epoch) = (self.kind, self.epoch);
        self.session.tx.send_if_modified(|s| {
            if s.epoch != epoch {
                return false;
            }
            let ops = match kind {
                BusyKind::Auth => &mut s.auth_ops,
                BusyKind::Page => &mut s.page_ops,
            };
            *ops = ops.saturating_sub(1);
            true
        });
    }
}
