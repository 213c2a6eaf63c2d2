//! Protocol versioning
//!
//! Every envelope carries the sender's protocol version. Peers refuse
//! requests from a different major version instead of guessing at the
//! payload layout.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Current protocol version
pub const PROTOCOL_VERSION: ProtocolVersion = ProtocolVersion {
    major: 1,
    minor: 0,
    patch: 0,
};

/// Protocol version identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl ProtocolVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self { major, minor, patch }
    }

    /// Whether a peer speaking `other` can be served by this version.
    ///
    /// Major versions must match; minor and patch may differ since every
    /// 1.x message shape is additive.
    pub fn is_compatible_with(&self, other: &ProtocolVersion) -> bool {
        self.major == other.major
    }

    /// Error unless `other` is compatible
    pub fn ensure_compatible(&self, other: &ProtocolVersion) -> Result<()> {
        if self.is_compatible_with(other) {
            Ok(())
        } else {
            Err(Error::ProtocolVersion {
                expected: self.to_string(),
                actual: other.to_string(),
            })
        }
    }
}

impl std::fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        PROTOCOL_VERSION
    }
}
