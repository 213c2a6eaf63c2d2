//! Peer-to-peer communication
//!
//! Everything that crosses the network between federation members:
//! - Inbound request handling ([`PeerService`])
//! - The transport seam ([`PeerTransport`]) and its TCP implementation
//! - Outbound delivery with bounded retry ([`Sender`])
//! - The static membership list ([`PeerRegistry`])

mod registry;
mod sender;
mod service;
mod tcp;
mod transport;

pub use registry::*;
pub use sender::*;
pub use service::*;
pub use tcp::*;
pub use transport::*;
