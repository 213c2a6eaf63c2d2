//! Round observers
//!
//! Side-channel hooks invoked by the coordinator at fixed points of a round.
//! Observers never influence the round: they return nothing and must swallow
//! their own failures.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::types::{Contribution, PeerAddress, RoundNumber};

/// Hooks called by [`RoundCoordinator`](super::RoundCoordinator)
pub trait RoundObserver: Send + Sync {
    /// Local training produced `contribution`
    fn on_local_trained(&self, _round: RoundNumber, _contribution: &Contribution) {}

    /// Sending to `peer` finished
    fn on_peer_send(
        &self,
        _round: RoundNumber,
        _peer: &PeerAddress,
        _delivered: bool,
        _contribution: &Contribution,
    ) {
    }

    /// A new global contribution was computed
    fn on_aggregated(&self, _round: RoundNumber, _contribution: &Contribution) {}
}

// ─────────────────────────────────────────────────────────────────
// Checksum Observer
// ─────────────────────────────────────────────────────────────────

/// Logs a SHA-256 of every contribution that passes through a round
#[derive(Debug, Default, Clone, Copy)]
pub struct ChecksumObserver;

impl RoundObserver for ChecksumObserver {
    fn on_local_trained(&self, round: RoundNumber, contribution: &Contribution) {
        info!(
            round,
            checksum = %contribution.checksum(),
            params = contribution.len(),
            elements = contribution.num_elements(),
            "Local contribution trained"
        );
    }

    fn on_peer_send(
        &self,
        round: RoundNumber,
        peer: &PeerAddress,
        delivered: bool,
        contribution: &Contribution,
    ) {
        debug!(
            round,
            peer = %peer.name,
            delivered,
            checksum = %contribution.checksum(),
            "Contribution send finished"
        );
    }

    fn on_aggregated(&self, round: RoundNumber, contribution: &Contribution) {
        info!(
            round,
            checksum = %contribution.checksum(),
            params = contribution.len(),
            "Global contribution aggregated"
        );
    }
}

// ─────────────────────────────────────────────────────────────────
// Snapshot Observer
// ─────────────────────────────────────────────────────────────────

/// Writes local and global contributions as JSON under `<data_dir>/snapshots`
#[derive(Debug, Clone)]
pub struct SnapshotObserver {
    dir: PathBuf,
}

impl SnapshotObserver {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            dir: data_dir.as_ref().join("snapshots"),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the snapshot for `round` at `stage`
    pub fn snapshot_path(&self, round: RoundNumber, stage: &str) -> PathBuf {
        self.dir.join(format!("round{}_{}.json", round, stage))
    }

    /// Write one snapshot file, returning its path
    pub fn write_snapshot(
        &self,
        round: RoundNumber,
        stage: &str,
        contribution: &Contribution,
    ) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir).map_err(|e| Error::IoWrite {
            path: self.dir.clone(),
            source: e,
        })?;

        let path = self.snapshot_path(round, stage);
        let json = serde_json::to_vec_pretty(contribution)?;
        fs::write(&path, json).map_err(|e| Error::IoWrite {
            path: path.clone(),
            source: e,
        })?;

        debug!(round, stage, path = %path.display(), "Snapshot written");
        Ok(path)
    }

    fn write_or_warn(&self, round: RoundNumber, stage: &str, contribution: &Contribution) {
        if let Err(e) = self.write_snapshot(round, stage, contribution) {
            warn!(round, stage, error = %e, "Failed to write snapshot");
        }
    }
}

impl RoundObserver for SnapshotObserver {
    fn on_local_trained(&self, round: RoundNumber, contribution: &Contribution) {
        self.write_or_warn(round, "local", contribution);
    }

    fn on_aggregated(&self, round: RoundNumber, contribution: &Contribution) {
        self.write_or_warn(round, "global", contribution);
    }
}
