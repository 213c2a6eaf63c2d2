//! Round gate: the single authority on "which round are we in"
//!
//! The round counter and every store mutation sit behind one lock, so an
//! inbound contribution is either checked against the old round and
//! rejected, or checked against the new round and stored into the freshly
//! cleared store. Nothing can land in between.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, info};

use crate::types::{Contribution, PeerAddress, PendingContribution, RoundNumber};

use super::ContributionStore;

/// Outcome of offering a contribution to the gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptResult {
    /// Stored for the current round
    Accepted,

    /// Tagged with a different round; dropped without side effects
    IgnoredWrongRound { current_round: RoundNumber },
}

/// Minimum distinct peer contributions (excluding self) needed to aggregate
pub fn quorum_threshold(other_peers: usize) -> usize {
    std::cmp::max(1, other_peers / 2)
}

/// Tracks the current round and admits contributions for it
pub struct RoundGate {
    round: Mutex<RoundNumber>,
    store: ContributionStore,
    quorum: AtomicUsize,
    changed: Notify,
}

impl RoundGate {
    /// Create a gate positioned at `initial_round` for a federation with
    /// `other_peers` peers besides this node
    pub fn new(initial_round: RoundNumber, other_peers: usize) -> Self {
        Self {
            round: Mutex::new(initial_round),
            store: ContributionStore::new(),
            quorum: AtomicUsize::new(quorum_threshold(other_peers)),
            changed: Notify::new(),
        }
    }

    pub fn current_round(&self) -> RoundNumber {
        *self.round.lock()
    }

    pub fn quorum_threshold(&self) -> usize {
        self.quorum.load(Ordering::SeqCst)
    }

    /// Recompute the quorum after the peer list changed
    pub fn set_peer_count(&self, other_peers: usize) {
        let threshold = quorum_threshold(other_peers);
        self.quorum.store(threshold, Ordering::SeqCst);
        debug!(other_peers, threshold, "Quorum threshold updated");
        self.changed.notify_waiters();
    }

    /// Distinct peers that contributed to the current round
    pub fn accepted_count(&self) -> usize {
        self.store.count()
    }

    pub fn has_quorum(&self) -> bool {
        self.accepted_count() >= self.quorum_threshold()
    }

    /// Offer a peer contribution tagged with `round`.
    ///
    /// Stored (overwriting any earlier entry from the same peer) only if
    /// `round` is the current round.
    pub fn accept(
        &self,
        round: RoundNumber,
        sender: PeerAddress,
        contribution: Arc<Contribution>,
    ) -> AcceptResult {
        let current = self.round.lock();
        if round != *current {
            debug!(
                peer = %sender.name,
                sent_round = round,
                current_round = *current,
                "Ignoring contribution for wrong round"
            );
            return AcceptResult::IgnoredWrongRound {
                current_round: *current,
            };
        }

        let peer = sender.name.clone();
        let replaced = self.store.put(PendingContribution::new(round, sender, contribution));
        let accepted = self.store.count();
        drop(current);

        info!(
            round,
            peer = %peer,
            replaced,
            accepted,
            required = self.quorum_threshold(),
            "Accepted peer contribution"
        );
        self.changed.notify_waiters();
        AcceptResult::Accepted
    }

    /// Move to the next round and empty the store. Returns the new round.
    ///
    /// Only the round coordinator calls this, once per completed round.
    pub fn advance(&self) -> RoundNumber {
        let mut round = self.round.lock();
        *round += 1;
        let cleared = self.store.clear();
        let next = *round;
        drop(round);

        debug!(round = next, cleared, "Advanced to next round");
        self.changed.notify_waiters();
        next
    }

    /// Round number and contributions, read under the round lock
    pub fn snapshot(&self) -> (RoundNumber, Vec<PendingContribution>) {
        let round = self.round.lock();
        (*round, self.store.snapshot())
    }

    /// Wait until quorum is met or `timeout` elapses. Returns whether quorum
    /// was reached.
    pub async fn wait_for_quorum(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            // Register before checking so an accept between the check and the
            // await still wakes us.
            notified.as_mut().enable();

            if self.has_quorum() {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.has_quorum();
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
