//! Transport abstraction between peers
//!
//! The round machinery only ever talks to peers through [`PeerTransport`].
//! [`TcpTransport`](super::TcpTransport) is the production implementation;
//! [`InMemoryTransport`] routes requests straight into local
//! [`PeerService`]s and is what scenario tests run against.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::{Error, Result};
use crate::protocol::{AckStatus, HealthCheckRequest, HealthCheckResponse, ModelAck};
use crate::types::{Contribution, PeerAddress, RoundNumber};

use super::PeerService;

/// Liveness reply from a peer
pub type HealthStatus = HealthCheckResponse;

/// What a peer said about a delivered contribution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendModelReply {
    /// Stored for the peer's current round
    Accepted,

    /// The peer is in a different round and dropped the contribution
    IgnoredWrongRound { current_round: RoundNumber },

    /// The peer could not process the request
    Error { message: String },
}

impl From<ModelAck> for SendModelReply {
    fn from(ack: ModelAck) -> Self {
        match ack.status {
            AckStatus::Accepted => SendModelReply::Accepted,
            AckStatus::IgnoredWrongRound => SendModelReply::IgnoredWrongRound {
                current_round: ack.current_round,
            },
            AckStatus::Error => SendModelReply::Error {
                message: ack.message,
            },
        }
    }
}

/// Request/response channel to a remote peer
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Deliver `contribution`, trained by `sender` for `round`, to `peer`
    async fn send_model(
        &self,
        peer: &PeerAddress,
        round: RoundNumber,
        sender: &PeerAddress,
        contribution: Arc<Contribution>,
    ) -> Result<SendModelReply>;

    /// Ask `peer` whether it is serving
    async fn health_check(
        &self,
        peer: &PeerAddress,
        peer_id: &str,
        timestamp: &str,
    ) -> Result<HealthStatus>;
}

// ─────────────────────────────────────────────────────────────────
// In-Memory Transport
// ─────────────────────────────────────────────────────────────────

/// Routes requests to in-process services keyed by peer name.
///
/// Peers can be marked down to simulate partitions; requests to a down or
/// unknown peer fail with a retryable connection error.
#[derive(Default)]
pub struct InMemoryTransport {
    services: RwLock<HashMap<String, Arc<PeerService>>>,
    down: RwLock<HashSet<String>>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `service` reachable as `name`
    pub fn register(&self, name: impl Into<String>, service: Arc<PeerService>) {
        self.services.write().insert(name.into(), service);
    }

    /// Mark a peer unreachable (`true`) or reachable again (`false`)
    pub fn set_down(&self, name: &str, down: bool) {
        let mut set = self.down.write();
        if down {
            set.insert(name.to_string());
        } else {
            set.remove(name);
        }
    }

    fn route(&self, peer: &PeerAddress) -> Result<Arc<PeerService>> {
        if self.down.read().contains(&peer.name) {
            return Err(Error::connection_failed(peer.endpoint(), "peer is down"));
        }
        self.services
            .read()
            .get(&peer.name)
            .cloned()
            .ok_or_else(|| Error::connection_failed(peer.endpoint(), "no such peer"))
    }
}

#[async_trait]
impl PeerTransport for InMemoryTransport {
    async fn send_model(
        &self,
        peer: &PeerAddress,
        round: RoundNumber,
        sender: &PeerAddress,
        contribution: Arc<Contribution>,
    ) -> Result<SendModelReply> {
        let service = self.route(peer)?;
        Ok(service.accept(round, sender.clone(), contribution).into())
    }

    async fn health_check(
        &self,
        peer: &PeerAddress,
        peer_id: &str,
        timestamp: &str,
    ) -> Result<HealthStatus> {
        let service = self.route(peer)?;
        Ok(service.health_check(&HealthCheckRequest {
            peer_id: peer_id.to_string(),
            timestamp: timestamp.to_string(),
        }))
    }
}
