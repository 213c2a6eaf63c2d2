//! Type definitions for the FedRound node
//!
//! Model contributions exchanged between peers, peer identities, and the
//! round number that ties them together.

mod contribution;
mod peer;

pub use contribution::*;
pub use peer::*;
