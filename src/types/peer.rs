//! Peer identities and round-tagged contributions

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::Contribution;

/// Identifies one federation round. Starts at [`FIRST_ROUND`] and only grows.
pub type RoundNumber = u64;

/// Round every node starts in after process start
pub const FIRST_ROUND: RoundNumber = 1;

/// Network endpoint of a peer plus its display name.
///
/// Loaded once from configuration; never changes for the process lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerAddress {
    /// Human-readable name, unique within the federation
    pub name: String,

    /// Hostname or IP address
    pub host: String,

    /// TCP port of the peer's listener
    pub port: u16,
}

impl PeerAddress {
    pub fn new(name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
        }
    }

    /// `host:port` form used for connecting
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}:{})", self.name, self.host, self.port)
    }
}

/// A contribution received from a peer, tagged with the round it was sent for
#[derive(Debug, Clone)]
pub struct PendingContribution {
    /// Round the sender claimed
    pub round: RoundNumber,

    /// Who sent it
    pub sender: PeerAddress,

    /// The parameters themselves
    pub contribution: Arc<Contribution>,
}

impl PendingContribution {
    pub fn new(round: RoundNumber, sender: PeerAddress, contribution: Arc<Contribution>) -> Self {
        Self {
            round,
            sender,
            contribution,
        }
    }
}
