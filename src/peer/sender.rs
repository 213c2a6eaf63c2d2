//! Outbound contribution delivery with bounded retry
//!
//! All retry and timeout policy for pushing a contribution to peers lives
//! here. Each attempt is bounded by `attempt_timeout`; between attempts the
//! sender waits according to the configured backoff. A "wrong round" reply
//! from a peer that is already past our round ends delivery to it
//! immediately. A peer still behind us is retried like a transient failure,
//! since it will enter our round once it finishes its own.

use std::sync::Arc;
use std::time::{Duration, Instant};

use backoff::backoff::{Backoff, Constant};
use backoff::ExponentialBackoff;
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::types::{Contribution, PeerAddress, RoundNumber};

use super::{PeerTransport, SendModelReply};

// ─────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────

/// Delay growth between attempts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    /// Same delay every time
    #[default]
    Fixed,

    /// Delay doubles each attempt, capped at `max_retry_delay`
    Exponential,
}

impl BackoffKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackoffKind::Fixed => "fixed",
            BackoffKind::Exponential => "exponential",
        }
    }
}

impl std::str::FromStr for BackoffKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fixed" => Ok(BackoffKind::Fixed),
            "exponential" => Ok(BackoffKind::Exponential),
            other => Err(format!("unknown backoff '{}'", other)),
        }
    }
}

/// Sender retry settings
#[derive(Debug, Clone)]
pub struct SenderConfig {
    /// Total attempts per peer (at least 1)
    pub max_retries: u32,

    /// Delay before the second attempt
    pub retry_delay: Duration,

    /// Upper bound on a single attempt
    pub attempt_timeout: Duration,

    pub backoff: BackoffKind,

    /// Cap for exponential backoff
    pub max_retry_delay: Duration,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(2),
            attempt_timeout: Duration::from_secs(10),
            backoff: BackoffKind::Fixed,
            max_retry_delay: Duration::from_secs(30),
        }
    }
}

impl SenderConfig {
    fn policy(&self) -> Box<dyn Backoff + Send> {
        match self.backoff {
            BackoffKind::Fixed => Box::new(Constant::new(self.retry_delay)),
            BackoffKind::Exponential => Box::new(ExponentialBackoff {
                current_interval: self.retry_delay,
                initial_interval: self.retry_delay,
                randomization_factor: 0.0,
                multiplier: 2.0,
                max_interval: self.max_retry_delay,
                max_elapsed_time: None,
                ..ExponentialBackoff::default()
            }),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Outcomes
// ─────────────────────────────────────────────────────────────────

/// Final result of delivering to one peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Peer accepted the contribution
    Delivered { attempts: u32 },

    /// Peer is past our round, or never caught up within the retry budget
    WrongRound { current_round: RoundNumber },

    /// Every attempt failed, or a non-retryable error stopped delivery
    Failed { attempts: u32, error: String },
}

impl SendOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, SendOutcome::Delivered { .. })
    }
}

/// Per-peer outcomes of one broadcast
#[derive(Debug, Clone, Default)]
pub struct SendSummary {
    pub outcomes: Vec<(PeerAddress, SendOutcome)>,
}

impl SendSummary {
    /// Names of peers that accepted
    pub fn delivered(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .filter(|(_, o)| o.is_delivered())
            .map(|(p, _)| p.name.clone())
            .collect()
    }

    /// Names of peers that did not accept
    pub fn failed(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .filter(|(_, o)| !o.is_delivered())
            .map(|(p, _)| p.name.clone())
            .collect()
    }
}

// ─────────────────────────────────────────────────────────────────
// Sender
// ─────────────────────────────────────────────────────────────────

/// Pushes this node's contribution to peers. Holds no round state.
pub struct Sender {
    transport: Arc<dyn PeerTransport>,
    config: SenderConfig,
    local: PeerAddress,
}

impl Sender {
    pub fn new(transport: Arc<dyn PeerTransport>, config: SenderConfig, local: PeerAddress) -> Self {
        Self {
            transport,
            config,
            local,
        }
    }

    /// Deliver `contribution` to `peer`; true iff the peer accepted it
    pub async fn send(
        &self,
        contribution: &Arc<Contribution>,
        peer: &PeerAddress,
        round: RoundNumber,
    ) -> bool {
        self.deliver(contribution, peer, round).await.is_delivered()
    }

    /// Deliver `contribution` to `peer`, reporting how it went
    pub async fn deliver(
        &self,
        contribution: &Arc<Contribution>,
        peer: &PeerAddress,
        round: RoundNumber,
    ) -> SendOutcome {
        let started = Instant::now();
        let mut policy = self.config.policy();
        let max_attempts = self.config.max_retries.max(1);
        let mut attempts = 0;
        let mut last_error = String::new();
        let mut behind = None;

        while attempts < max_attempts {
            attempts += 1;

            let attempt = tokio::time::timeout(
                self.config.attempt_timeout,
                self.transport
                    .send_model(peer, round, &self.local, Arc::clone(contribution)),
            )
            .await;

            let error = match attempt {
                Ok(Ok(SendModelReply::Accepted)) => {
                    info!(
                        round,
                        peer = %peer.name,
                        attempts,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Contribution delivered"
                    );
                    return SendOutcome::Delivered { attempts };
                }
                Ok(Ok(SendModelReply::IgnoredWrongRound { current_round }))
                    if current_round > round =>
                {
                    warn!(
                        round,
                        peer = %peer.name,
                        peer_round = current_round,
                        "Peer ignored contribution: already past this round"
                    );
                    return SendOutcome::WrongRound { current_round };
                }
                Ok(Ok(SendModelReply::IgnoredWrongRound { current_round })) => {
                    debug!(
                        round,
                        peer = %peer.name,
                        peer_round = current_round,
                        attempt = attempts,
                        "Peer has not reached this round yet"
                    );
                    behind = Some(current_round);
                    if attempts < max_attempts {
                        let delay = policy.next_backoff().unwrap_or(self.config.retry_delay);
                        tokio::time::sleep(delay).await;
                    }
                    continue;
                }
                Ok(Ok(SendModelReply::Error { message })) => Error::PeerRejected {
                    peer: peer.name.clone(),
                    message,
                },
                Ok(Err(e)) => e,
                Err(_) => Error::connection_timeout(
                    peer.endpoint(),
                    self.config.attempt_timeout.as_millis() as u64,
                ),
            };
            behind = None;

            warn!(
                round,
                peer = %peer.name,
                attempt = attempts,
                max_attempts,
                error = %error,
                "Send attempt failed"
            );
            last_error = error.to_string();

            if !error.is_retryable() {
                debug!(round, peer = %peer.name, code = %error.code(), "Error is not retryable");
                break;
            }

            if attempts < max_attempts {
                let delay = policy.next_backoff().unwrap_or(self.config.retry_delay);
                tokio::time::sleep(delay).await;
            }
        }

        if let Some(current_round) = behind {
            warn!(
                round,
                peer = %peer.name,
                peer_round = current_round,
                attempts,
                "Peer never reached this round"
            );
            return SendOutcome::WrongRound { current_round };
        }

        warn!(round, peer = %peer.name, attempts, "Giving up on peer");
        SendOutcome::Failed {
            attempts,
            error: last_error,
        }
    }

    /// Deliver to every peer concurrently
    pub async fn send_all(
        &self,
        contribution: &Arc<Contribution>,
        peers: &[PeerAddress],
        round: RoundNumber,
    ) -> SendSummary {
        let sends = peers.iter().map(|peer| async move {
            let outcome = self.deliver(contribution, peer, round).await;
            (peer.clone(), outcome)
        });
        let outcomes = join_all(sends).await;

        let summary = SendSummary { outcomes };
        info!(
            round,
            peers = peers.len(),
            delivered = summary.delivered().len(),
            "Broadcast finished"
        );
        summary
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
