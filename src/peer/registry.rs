//! Peer registry: the static federation membership
//!
//! Built once from configuration. The entry describing this node is
//! filtered out, so everything here is a remote peer. Liveness from health
//! probes is tracked alongside but never changes membership.

use std::collections::BTreeMap;
use std::time::Instant;

use chrono::Utc;
use futures_util::future::join_all;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::config::NodeConfig;
use crate::error::Result;
use crate::round::quorum_threshold;
use crate::types::PeerAddress;

use super::{PeerTransport, SERVING};

// ─────────────────────────────────────────────────────────────────
// Peer Info
// ─────────────────────────────────────────────────────────────────

/// A configured remote peer and what we last heard from it
#[derive(Debug, Clone)]
pub struct PeerInfo {
    pub address: PeerAddress,

    /// Last successful health probe
    pub last_seen: Option<Instant>,

    /// Round-trip time of that probe (ms)
    pub latency_ms: Option<u32>,
}

// ─────────────────────────────────────────────────────────────────
// Peer Registry
// ─────────────────────────────────────────────────────────────────

/// Thread-safe registry of the other federation members
pub struct PeerRegistry {
    local: PeerAddress,
    peers: RwLock<BTreeMap<String, PeerInfo>>,
}

impl PeerRegistry {
    /// Build from a configured peer list. Entries naming this node, or
    /// pointing at `advertise_addr`, are skipped.
    pub fn new(
        local: PeerAddress,
        configured: impl IntoIterator<Item = PeerAddress>,
        advertise_addr: Option<&str>,
    ) -> Self {
        let mut peers = BTreeMap::new();
        for address in configured {
            if is_self(&local, advertise_addr, &address) {
                debug!(peer = %address, "Skipping own entry in peer list");
                continue;
            }
            peers.insert(
                address.name.clone(),
                PeerInfo {
                    address,
                    last_seen: None,
                    latency_ms: None,
                },
            );
        }

        Self {
            local,
            peers: RwLock::new(peers),
        }
    }

    pub fn from_config(config: &NodeConfig) -> Result<Self> {
        let local = config.local_address()?;
        let registry = Self::new(
            local,
            config.peers.iter().cloned(),
            config.node.advertise_addr.as_deref(),
        );
        info!(
            node = %registry.local.name,
            peers = registry.peer_count(),
            quorum = registry.quorum_threshold(),
            "Peer registry loaded"
        );
        Ok(registry)
    }

    /// This node
    pub fn local(&self) -> &PeerAddress {
        &self.local
    }

    /// Every other peer, ordered by name
    pub fn others(&self) -> Vec<PeerAddress> {
        self.peers.read().values().map(|p| p.address.clone()).collect()
    }

    pub fn get(&self, name: &str) -> Option<PeerInfo> {
        self.peers.read().get(name).cloned()
    }

    pub fn peer_count(&self) -> usize {
        self.peers.read().len()
    }

    /// Peer contributions required before aggregating
    pub fn quorum_threshold(&self) -> usize {
        quorum_threshold(self.peer_count())
    }

    /// Record a successful probe
    pub fn mark_seen(&self, name: &str, latency_ms: u32) {
        if let Some(peer) = self.peers.write().get_mut(name) {
            peer.last_seen = Some(Instant::now());
            peer.latency_ms = Some(latency_ms);
        }
    }

    /// Peers that answered at least one probe
    pub fn seen_count(&self) -> usize {
        self.peers
            .read()
            .values()
            .filter(|p| p.last_seen.is_some())
            .count()
    }

    /// Health-check every peer once, concurrently. Returns the names of
    /// peers that answered SERVING.
    pub async fn probe(&self, transport: &dyn PeerTransport) -> Vec<String> {
        let timestamp = Utc::now().to_rfc3339();
        let local_name = self.local.name.as_str();
        let peers = self.others();

        let probes = peers.iter().map(|peer| {
            let timestamp = timestamp.as_str();
            async move {
                let started = Instant::now();
                match transport.health_check(peer, local_name, timestamp).await {
                    Ok(status) if status.status == SERVING => {
                        Some((peer.name.clone(), started.elapsed().as_millis() as u32))
                    }
                    Ok(status) => {
                        warn!(peer = %peer.name, status = %status.status, "Peer is not serving");
                        None
                    }
                    Err(e) => {
                        debug!(peer = %peer.name, error = %e, "Peer unreachable");
                        None
                    }
                }
            }
        });

        let mut serving = Vec::new();
        for (name, latency_ms) in join_all(probes).await.into_iter().flatten() {
            self.mark_seen(&name, latency_ms);
            serving.push(name);
        }
        serving
    }
}

/// Whether a configured entry describes the local node
pub fn is_self(local: &PeerAddress, advertise_addr: Option<&str>, peer: &PeerAddress) -> bool {
    peer.name == local.name || advertise_addr.is_some_and(|addr| addr == peer.endpoint())
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
