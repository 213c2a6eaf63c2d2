//! fedround: peer-to-peer federated learning rounds
//!
//! Each node trains locally, sends its contribution to every other peer,
//! waits until a quorum of peer contributions for the current round has
//! arrived, and replaces its model with the FedAvg of what it holds.
//!
//! - [`round`]: round gate, contribution store, aggregation, coordinator
//! - [`peer`]: peer registry, inbound service, retrying sender, TCP transport
//! - [`protocol`]: wire messages and framing
//! - [`training`]: the local training seam

pub mod config;
pub mod error;
pub mod logging;
pub mod peer;
pub mod protocol;
pub mod round;
pub mod training;
pub mod types;
pub mod version;

pub use error::{Error, ErrorCode, Result};
