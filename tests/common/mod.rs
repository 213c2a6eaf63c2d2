//! Common test utilities and fixtures
//!
//! Fixture paths plus small building blocks for in-process federations.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use fedround::peer::{PeerTransport, Sender, SenderConfig};
use fedround::round::{CoordinatorConfig, TimeoutPolicy};
use fedround::training::Trainer;
use fedround::types::{Contribution, PeerAddress, RoundNumber, Tensor};

/// Get the path to the test fixtures directory
pub fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
}

/// Get a path to a specific fixture file
pub fn fixture_path(name: &str) -> PathBuf {
    fixtures_dir().join(name)
}

pub fn valid_config_fixture() -> PathBuf {
    fixture_path("valid_config.toml")
}

pub fn invalid_config_fixture() -> PathBuf {
    fixture_path("invalid_config.toml")
}

// ─────────────────────────────────────────────────────────────────
// Federation helpers
// ─────────────────────────────────────────────────────────────────

pub const PARAM: &str = "w";

/// Produces `[value, value]` under [`PARAM`] every round
pub struct ConstantTrainer(pub f32);

#[async_trait]
impl Trainer for ConstantTrainer {
    async fn train_local(
        &self,
        _round: RoundNumber,
        _initial: Option<&Contribution>,
    ) -> anyhow::Result<Contribution> {
        Ok(constant(self.0))
    }
}

pub fn constant(value: f32) -> Contribution {
    Contribution::new().with_param(PARAM, Tensor::from_slice(&[value, value]))
}

pub fn addr(name: &str, port: u16) -> PeerAddress {
    PeerAddress::new(name, "127.0.0.1", port)
}

pub fn quick_sender(transport: Arc<dyn PeerTransport>, local: PeerAddress) -> Sender {
    Sender::new(
        transport,
        SenderConfig {
            max_retries: 3,
            retry_delay: Duration::from_millis(10),
            attempt_timeout: Duration::from_millis(500),
            ..SenderConfig::default()
        },
        local,
    )
}

pub fn one_round(policy: TimeoutPolicy) -> CoordinatorConfig {
    CoordinatorConfig {
        rounds: 1,
        round_timeout: Duration::from_secs(2),
        cooldown: Duration::from_millis(10),
        timeout_policy: policy,
        max_quorum_attempts: 2,
    }
}

/// Cancellation that is never requested
pub fn no_cancel() -> watch::Receiver<bool> {
    watch::channel(false).1
}

/// First element of [`PARAM`] in `contribution`
pub fn value_of(contribution: &Contribution) -> f32 {
    contribution.get(PARAM).expect("missing param").data[0]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixtures_exist() {
        assert!(fixtures_dir().exists(), "Fixtures directory should exist");
        assert!(valid_config_fixture().exists());
        assert!(invalid_config_fixture().exists());
    }
}
