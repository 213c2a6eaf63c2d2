//! Round coordinator
//!
//! Drives one node through the federation rounds:
//!
//! ```text
//!   Training → Sending → AwaitingQuorum → Aggregating → RoundComplete
//!                            ↑      │                        │
//!                            └──────┘ (timeout, retry)       └→ Training
//!
//!   any state ──(fatal error / abort policy / cancel)──→ Aborted
//! ```
//!
//! The coordinator is the only caller of [`RoundGate::advance`]. Inbound
//! contributions reach the gate concurrently through the peer service.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::peer::{SendSummary, Sender};
use crate::training::Trainer;
use crate::types::{Contribution, PeerAddress, RoundNumber};

use super::{Aggregator, FedAvg, RoundGate, RoundObserver};

// ─────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────

/// What to do when quorum is not reached within `round_timeout`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutPolicy {
    /// Cool down, re-send to undelivered peers, wait again in the same round
    #[default]
    RetrySameRound,

    /// Aggregate whatever has been accepted (possibly only the local model)
    AdvanceAnyway,

    /// Stop with an insufficient-quorum error
    Abort,
}

impl TimeoutPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeoutPolicy::RetrySameRound => "retry_same_round",
            TimeoutPolicy::AdvanceAnyway => "advance_anyway",
            TimeoutPolicy::Abort => "abort",
        }
    }
}

impl std::fmt::Display for TimeoutPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TimeoutPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "retry_same_round" => Ok(TimeoutPolicy::RetrySameRound),
            "advance_anyway" => Ok(TimeoutPolicy::AdvanceAnyway),
            "abort" => Ok(TimeoutPolicy::Abort),
            other => Err(format!("unknown timeout policy '{}'", other)),
        }
    }
}

/// Round loop settings
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Rounds to complete before halting
    pub rounds: u64,

    /// How long to wait for quorum per attempt
    pub round_timeout: Duration,

    /// Pause before waiting again under `RetrySameRound`
    pub cooldown: Duration,

    pub timeout_policy: TimeoutPolicy,

    /// Quorum waits allowed per round under `RetrySameRound` (0 = unlimited)
    pub max_quorum_attempts: u32,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            rounds: 1,
            round_timeout: Duration::from_secs(60),
            cooldown: Duration::from_secs(5),
            timeout_policy: TimeoutPolicy::RetrySameRound,
            max_quorum_attempts: 0,
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// State & Reports
// ─────────────────────────────────────────────────────────────────

/// Where the coordinator is within a round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundState {
    Training,
    Sending,
    AwaitingQuorum,
    Aggregating,
    RoundComplete,
    Aborted,
}

impl RoundState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoundState::Training => "training",
            RoundState::Sending => "sending",
            RoundState::AwaitingQuorum => "awaiting_quorum",
            RoundState::Aggregating => "aggregating",
            RoundState::RoundComplete => "round_complete",
            RoundState::Aborted => "aborted",
        }
    }
}

impl std::fmt::Display for RoundState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened in one completed round
#[derive(Debug, Clone)]
pub struct RoundReport {
    pub round: RoundNumber,

    /// Peers whose contributions went into the aggregate
    pub contributors: Vec<String>,

    /// Peers that accepted our contribution
    pub delivered: Vec<String>,

    /// Peers we never managed to deliver to
    pub undelivered: Vec<String>,

    /// Quorum waits used (1 when quorum came in the first window)
    pub quorum_attempts: u32,

    /// Whether quorum was met, as opposed to advancing without it
    pub quorum_met: bool,

    /// Checksum of the new global contribution
    pub checksum: String,
}

/// Result of a completed run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub reports: Vec<RoundReport>,

    /// Round the gate sits at after the last advance
    pub next_round: RoundNumber,

    pub global: Option<Arc<Contribution>>,
}

impl RunSummary {
    pub fn rounds_completed(&self) -> usize {
        self.reports.len()
    }
}

// ─────────────────────────────────────────────────────────────────
// Coordinator
// ─────────────────────────────────────────────────────────────────

/// Top-level round state machine for one node
pub struct RoundCoordinator {
    gate: Arc<RoundGate>,
    sender: Sender,
    peers: Vec<PeerAddress>,
    trainer: Arc<dyn Trainer>,
    aggregator: Arc<dyn Aggregator>,
    observers: Vec<Arc<dyn RoundObserver>>,
    config: CoordinatorConfig,
    state: watch::Sender<RoundState>,
    global: Option<Arc<Contribution>>,
}

impl RoundCoordinator {
    /// `peers` must not include this node
    pub fn new(
        gate: Arc<RoundGate>,
        sender: Sender,
        peers: Vec<PeerAddress>,
        trainer: Arc<dyn Trainer>,
        config: CoordinatorConfig,
    ) -> Self {
        let (state, _) = watch::channel(RoundState::Training);
        Self {
            gate,
            sender,
            peers,
            trainer,
            aggregator: Arc::new(FedAvg),
            observers: Vec::new(),
            config,
            state,
            global: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn RoundObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn state(&self) -> RoundState {
        *self.state.borrow()
    }

    /// Follow state transitions from another task
    pub fn subscribe(&self) -> watch::Receiver<RoundState> {
        self.state.subscribe()
    }

    pub fn gate(&self) -> &Arc<RoundGate> {
        &self.gate
    }

    /// Latest aggregate
    pub fn global(&self) -> Option<&Arc<Contribution>> {
        self.global.as_ref()
    }

    /// Run `config.rounds` rounds, or until an error or cancellation.
    ///
    /// On error the coordinator is left in [`RoundState::Aborted`] and the
    /// global contribution is whatever the last completed round produced.
    pub async fn run(&mut self, mut cancel: watch::Receiver<bool>) -> Result<RunSummary> {
        info!(
            rounds = self.config.rounds,
            start_round = self.gate.current_round(),
            peers = self.peers.len(),
            quorum = self.gate.quorum_threshold(),
            policy = %self.config.timeout_policy,
            "Starting round loop"
        );

        let mut reports = Vec::new();
        for _ in 0..self.config.rounds {
            match self.run_round(&mut cancel).await {
                Ok(report) => reports.push(report),
                Err(e) => {
                    let round = self.gate.current_round();
                    self.transition(round, RoundState::Aborted);
                    error!(round, code = %e.code(), error = %e, "Round loop aborted");
                    return Err(e);
                }
            }
        }

        let next_round = self.gate.current_round();
        info!(completed = reports.len(), next_round, "Round loop finished");
        Ok(RunSummary {
            reports,
            next_round,
            global: self.global.clone(),
        })
    }

    /// Drive the current round from training to advance
    async fn run_round(&mut self, cancel: &mut watch::Receiver<bool>) -> Result<RoundReport> {
        let round = self.gate.current_round();

        // ─── Training ───────────────────────────────────────────
        self.transition(round, RoundState::Training);
        let trained = guarded(
            cancel,
            round,
            self.trainer.train_local(round, self.global.as_deref()),
        )
        .await?;
        let local = Arc::new(trained.map_err(|source| Error::TrainingFailed { round, source })?);
        for observer in &self.observers {
            observer.on_local_trained(round, &local);
        }

        // ─── Sending ────────────────────────────────────────────
        self.transition(round, RoundState::Sending);
        let summary = guarded(cancel, round, self.sender.send_all(&local, &self.peers, round)).await?;
        let mut delivered: HashSet<String> = HashSet::new();
        self.record_sends(round, &local, &summary, &mut delivered);

        // ─── AwaitingQuorum ─────────────────────────────────────
        let mut attempts = 0u32;
        let quorum_met = loop {
            attempts += 1;
            self.transition(round, RoundState::AwaitingQuorum);

            let reached = guarded(
                cancel,
                round,
                self.gate.wait_for_quorum(self.config.round_timeout),
            )
            .await?;
            if reached {
                break true;
            }

            let accepted = self.gate.accepted_count();
            let required = self.gate.quorum_threshold();
            warn!(
                round,
                accepted,
                required,
                attempt = attempts,
                policy = %self.config.timeout_policy,
                "Quorum not reached before timeout"
            );

            match self.config.timeout_policy {
                TimeoutPolicy::Abort => {
                    return Err(Error::InsufficientQuorum {
                        round,
                        accepted,
                        required,
                    });
                }
                TimeoutPolicy::AdvanceAnyway => break false,
                TimeoutPolicy::RetrySameRound => {
                    let limit = self.config.max_quorum_attempts;
                    if limit != 0 && attempts >= limit {
                        return Err(Error::InsufficientQuorum {
                            round,
                            accepted,
                            required,
                        });
                    }

                    guarded(cancel, round, tokio::time::sleep(self.config.cooldown)).await?;

                    let pending: Vec<PeerAddress> = self
                        .peers
                        .iter()
                        .filter(|p| !delivered.contains(&p.name))
                        .cloned()
                        .collect();
                    if !pending.is_empty() {
                        debug!(round, pending = pending.len(), "Re-sending to undelivered peers");
                        let retry =
                            guarded(cancel, round, self.sender.send_all(&local, &pending, round))
                                .await?;
                        self.record_sends(round, &local, &retry, &mut delivered);
                    }
                }
            }
        };

        // ─── Aggregating ────────────────────────────────────────
        self.transition(round, RoundState::Aggregating);
        let (gate_round, accepted) = self.gate.snapshot();
        if gate_round != round {
            return Err(Error::Internal(format!(
                "round moved from {} to {} while aggregating",
                round, gate_round
            )));
        }

        let contributors: Vec<String> = accepted.iter().map(|p| p.sender.name.clone()).collect();
        let mut inputs = Vec::with_capacity(accepted.len() + 1);
        inputs.push(Arc::clone(&local));
        inputs.extend(accepted.into_iter().map(|p| p.contribution));

        let global = Arc::new(self.aggregator.aggregate(&inputs)?);

        // Never publish an aggregate once cancellation was requested
        if *cancel.borrow() {
            return Err(Error::Cancelled { round });
        }

        // ─── RoundComplete ──────────────────────────────────────
        for observer in &self.observers {
            observer.on_aggregated(round, &global);
        }
        let checksum = global.checksum();
        self.global = Some(global);
        self.transition(round, RoundState::RoundComplete);
        let next_round = self.gate.advance();

        let undelivered: Vec<String> = self
            .peers
            .iter()
            .filter(|p| !delivered.contains(&p.name))
            .map(|p| p.name.clone())
            .collect();
        let mut delivered: Vec<String> = delivered.into_iter().collect();
        delivered.sort();

        info!(
            round,
            next_round,
            aggregator = self.aggregator.name(),
            contributors = contributors.len() + 1,
            quorum_met,
            quorum_attempts = attempts,
            "Round complete"
        );

        Ok(RoundReport {
            round,
            contributors,
            delivered,
            undelivered,
            quorum_attempts: attempts,
            quorum_met,
            checksum,
        })
    }

    fn record_sends(
        &self,
        round: RoundNumber,
        local: &Contribution,
        summary: &SendSummary,
        delivered: &mut HashSet<String>,
    ) {
        for (peer, outcome) in &summary.outcomes {
            let ok = outcome.is_delivered();
            if ok {
                delivered.insert(peer.name.clone());
            }
            for observer in &self.observers {
                observer.on_peer_send(round, peer, ok, local);
            }
        }
    }

    fn transition(&self, round: RoundNumber, next: RoundState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(round, from = %previous, to = %next, "State transition");
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Cancellation
// ─────────────────────────────────────────────────────────────────

/// Run `fut` unless cancellation is (or becomes) requested first
async fn guarded<F: Future>(
    cancel: &mut watch::Receiver<bool>,
    round: RoundNumber,
    fut: F,
) -> Result<F::Output> {
    if *cancel.borrow_and_update() {
        return Err(Error::Cancelled { round });
    }
    tokio::select! {
        biased;
        _ = cancelled(cancel) => Err(Error::Cancelled { round }),
        out = fut => Ok(out),
    }
}

/// Resolves once the flag is set. A dropped sender means no cancel will
/// ever come, so that case never resolves.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
        if *cancel.borrow_and_update() {
            return;
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
