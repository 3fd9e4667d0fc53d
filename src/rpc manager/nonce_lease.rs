//! Per-account nonce lease
//!
//! A lease holds the account's nonce cursor exclusively from allocation
//! until the transaction is broadcast, so at most one transaction per
//! account is in flight.
//!
//! # Lifecycle
//!
//! - Acquired: `ChainClient::lease_nonce` locks the cursor and picks
//!   `max(cursor, pending count)`
//! - Committed: after a successful broadcast, the cursor advances past the nonce
//! - Dropped without commit: the cursor is left untouched, the nonce is reused
//! - Invalidated: the node rejected the nonce, next lease resyncs from chain

use crate::metrics::metrics;
use std::time::Instant;
use tokio::sync::OwnedMutexGuard;
use tracing::debug;

/// Next nonce this process will use, if known
#[derive(Debug, Default)]
pub struct NonceCursor {
    next: Option<u64>,
}

impl NonceCursor {
    /// Choose the nonce for the next transaction given the chain's pending count
    pub(crate) fn resolve(&self, pending: u64) -> u64 {
        match self.next {
            Some(next) => next.max(pending),
            None => pending,
        }
    }

    pub fn next(&self) -> Option<u64> {
        self.next
    }
}

/// Exclusive hold on the account's next nonce
#[derive(Debug)]
pub struct NonceLease {
    guard: OwnedMutexGuard<NonceCursor>,
    nonce: u64,
    acquired_at: Instant,
    settled: bool,
}

impl NonceLease {
    pub(crate) fn new(guard: OwnedMutexGuard<NonceCursor>, nonce: u64) -> Self {
        metrics().nonce_active_leases.inc();
        Self {
            guard,
            nonce,
            acquired_at: Instant::now(),
            settled: false,
        }
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    /// The transaction carrying this nonce was accepted by the node
    pub fn commit(mut self) {
        self.guard.next = Some(self.nonce + 1);
        self.settled = true;
        debug!(nonce = self.nonce, "Nonce committed");
    }

    /// The node rejected this nonce; forget the cursor
    pub fn invalidate(mut self) {
        self.guard.next = None;
        self.settled = true;
        metrics().nonce_invalidations.inc();
        debug!(nonce = self.nonce, "Nonce cursor invalidated");
    }
}

impl Drop for NonceLease {
    fn drop(&mut self) {
        let m = metrics();
        m.nonce_active_leases.dec();
        m.nonce_lease_lifetime
            .observe(self.acquired_at.elapsed().as_secs_f64());

        if !self.settled {
            m.nonce_leases_released.inc();
            debug!(nonce = self.nonce, "Nonce lease released without broadcast");
        }
    }
}
