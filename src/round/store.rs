//! Contribution store: peer contributions received for the active round
//!
//! Keyed by peer name, so a peer that re-sends overwrites its own entry and
//! is still counted once toward quorum. Every mutation is issued by
//! [`RoundGate`](super::RoundGate) while it holds the round lock; the
//! store's own lock only makes concurrent reads safe.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::types::PendingContribution;

/// Concurrent-safe bag of pending contributions for one round
#[derive(Default)]
pub struct ContributionStore {
    entries: RwLock<HashMap<String, PendingContribution>>,
}

impl ContributionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the entry for the sending peer.
    ///
    /// Returns true if an earlier entry from the same peer was replaced.
    pub fn put(&self, pending: PendingContribution) -> bool {
        self.entries
            .write()
            .insert(pending.sender.name.clone(), pending)
            .is_some()
    }

    /// Number of distinct peers represented
    pub fn count(&self) -> usize {
        self.entries.read().len()
    }

    pub fn contains(&self, peer_name: &str) -> bool {
        self.entries.read().contains_key(peer_name)
    }

    /// Consistent copy of the current entries, ordered by peer name
    pub fn snapshot(&self) -> Vec<PendingContribution> {
        let mut entries: Vec<PendingContribution> = self.entries.read().values().cloned().collect();
        entries.sort_by(|a, b| a.sender.name.cmp(&b.sender.name));
        entries
    }

    /// Drop everything, returning how many entries were removed
    pub(crate) fn clear(&self) -> usize {
        let mut entries = self.entries.write();
        let removed = entries.len();
        entries.clear();
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::types::{Contribution, PeerAddress, Tensor};

    fn pending(peer: &str, value: f32) -> PendingContribution {
        let contribution = Contribution::new().with_param("w", Tensor::from_slice(&[value]));
        PendingContribution::new(1, PeerAddress::new(peer, "127.0.0.1", 50051), Arc::new(contribution))
    }

    #[test]
    fn test_put_is_idempotent_per_peer() {
        let store = ContributionStore::new();
        assert!(!store.put(pending("node-b", 1.0)));
        assert!(store.put(pending("node-b", 2.0)));
        assert_eq!(store.count(), 1);

        let snapshot = store.snapshot();
        assert_eq!(snapshot[0].contribution.get("w").unwrap().data, vec![2.0]);
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let store = ContributionStore::new();
        store.put(pending("node-c", 1.0));
        store.put(pending("node-b", 1.0));

        let snapshot = store.snapshot();
        store.put(pending("node-d", 1.0));

        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].sender.name, "node-b");
        assert_eq!(store.count(), 3);
    }

    #[test]
    fn test_clear() {
        let store = ContributionStore::new();
        store.put(pending("node-b", 1.0));
        store.put(pending("node-c", 1.0));

        assert_eq!(store.clear(), 2);
        assert_eq!(store.count(), 0);
        assert!(!store.contains("node-b"));
    }
}
