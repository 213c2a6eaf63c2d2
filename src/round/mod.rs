//! Round coordination
//!
//! Everything that carries per-round state lives here:
//! - [`ContributionStore`] holds peer contributions for the current round
//! - [`RoundGate`] owns the round number and admits contributions by round
//! - [`Aggregator`] combines contributions (federated averaging)
//! - [`RoundCoordinator`] drives train → send → quorum → aggregate → advance
//! - [`RoundObserver`] hooks for checksums and snapshots

mod aggregator;
mod coordinator;
mod gate;
mod observer;
mod store;

pub use aggregator::*;
pub use coordinator::*;
pub use gate::*;
pub use observer::*;
pub use store::*;
