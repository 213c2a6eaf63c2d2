//! Peer-to-peer protocol
//!
//! Defines the message types exchanged between federation peers and the
//! length-prefixed JSON framing used to put them on a TCP stream.

mod framing;
mod messages;
mod version;

pub use framing::*;
pub use messages::*;
pub use version::*;
