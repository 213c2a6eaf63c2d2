//! Protocol message definitions
//!
//! All messages exchanged between peers. Messages are serialized as JSON
//! with a `type` discriminator and wrapped in a [`MessageEnvelope`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{Contribution, PeerAddress, RoundNumber};

use super::ProtocolVersion;

// ─────────────────────────────────────────────────────────────────
// Message Envelope
// ─────────────────────────────────────────────────────────────────

/// Wrapper for all protocol messages with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEnvelope {
    /// Unique message ID
    pub id: Uuid,

    /// Message timestamp
    pub timestamp: DateTime<Utc>,

    /// Protocol version
    pub version: ProtocolVersion,

    /// The actual message payload
    #[serde(flatten)]
    pub payload: Message,
}

impl MessageEnvelope {
    /// Create a new message envelope
    pub fn new(payload: Message) -> Self {
        Self::with_version(payload, ProtocolVersion::default())
    }

    /// Create envelope with specific version
    pub fn with_version(payload: Message, version: ProtocolVersion) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            version,
            payload,
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Message Types (Discriminated Union)
// ─────────────────────────────────────────────────────────────────

/// All peer protocol messages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    // ─── Requests ───────────────────────────────────────────────
    /// Deliver a contribution for a round
    SendModel(SendModelRequest),

    /// Liveness probe
    HealthCheck(HealthCheckRequest),

    // ─── Replies ────────────────────────────────────────────────
    /// Answer to SendModel
    ModelAck(ModelAck),

    /// Answer to HealthCheck
    HealthCheckReply(HealthCheckResponse),

    /// Request could not be handled at all
    Error(ErrorMessage),
}

impl Message {
    /// Get the message type name for logging
    pub fn type_name(&self) -> &'static str {
        match self {
            Message::SendModel(_) => "SEND_MODEL",
            Message::HealthCheck(_) => "HEALTH_CHECK",
            Message::ModelAck(_) => "MODEL_ACK",
            Message::HealthCheckReply(_) => "HEALTH_CHECK_REPLY",
            Message::Error(_) => "ERROR",
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Requests
// ─────────────────────────────────────────────────────────────────

/// A peer's contribution for one round
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendModelRequest {
    /// Round the contribution was trained for
    pub round: RoundNumber,

    /// Sending peer
    pub sender: PeerAddress,

    /// Model parameters
    pub contribution: Contribution,
}

/// Liveness probe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckRequest {
    /// Identity of the prober
    pub peer_id: String,

    /// Prober's clock, ISO-8601
    #[serde(rename = "probe_timestamp")]
    pub timestamp: String,
}

// ─────────────────────────────────────────────────────────────────
// Replies
// ─────────────────────────────────────────────────────────────────

/// Result of a SendModel request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AckStatus {
    Accepted,
    IgnoredWrongRound,
    Error,
}

/// Reply to SendModel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelAck {
    pub status: AckStatus,

    /// Receiver's current round
    pub current_round: RoundNumber,

    /// Human-readable detail
    pub message: String,
}

/// Reply to HealthCheck
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckResponse {
    /// "SERVING" when the node is up
    pub status: String,

    /// Identity of the responder
    pub peer_id: String,

    /// Responder's clock, ISO-8601
    #[serde(rename = "probe_timestamp")]
    pub timestamp: String,
}

/// Generic failure reply
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorMessage {
    /// Error code, e.g. "E401"
    pub code: String,

    pub message: String,
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Tensor;

    #[test]
    fn test_send_model_serialize() {
        let msg = Message::SendModel(SendModelRequest {
            round: 7,
            sender: PeerAddress::new("node-a", "10.0.0.1", 50051),
            contribution: Contribution::new().with_param("w", Tensor::from_slice(&[1.0])),
        });
        let envelope = MessageEnvelope::new(msg);

        let json = serde_json::to_string(&envelope).unwrap();
        assert!(json.contains("\"type\":\"SEND_MODEL\""));
        assert!(json.contains("\"round\":7"));
        assert!(json.contains("node-a"));

        let parsed: MessageEnvelope = serde_json::from_str(&json).unwrap();
        match parsed.payload {
            Message::SendModel(req) => {
                assert_eq!(req.round, 7);
                assert_eq!(req.contribution.get("w").unwrap().data, vec![1.0]);
            }
            other => panic!("Expected SendModel, got {}", other.type_name()),
        }
        assert_eq!(parsed.id, envelope.id);
    }

    #[test]
    fn test_ack_status_wire_names() {
        let ack = Message::ModelAck(ModelAck {
            status: AckStatus::IgnoredWrongRound,
            current_round: 3,
            message: "ignored: wrong round".into(),
        });
        let json = serde_json::to_string(&ack).unwrap();
        assert!(json.contains("\"type\":\"MODEL_ACK\""));
        assert!(json.contains("\"status\":\"IGNORED_WRONG_ROUND\""));
    }

    #[test]
    fn test_health_check_does_not_clash_with_envelope() {
        let probe = MessageEnvelope::new(Message::HealthCheck(HealthCheckRequest {
            peer_id: "tester".into(),
            timestamp: "2025-01-01T00:00:00".into(),
        }));
        let json = serde_json::to_string(&probe).unwrap();
        assert!(json.contains("\"probe_timestamp\":\"2025-01-01T00:00:00\""));

        let parsed: MessageEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.timestamp, probe.timestamp);
        match parsed.payload {
            Message::HealthCheck(req) => {
                assert_eq!(req.peer_id, "tester");
                assert_eq!(req.timestamp, "2025-01-01T00:00:00");
            }
            other => panic!("Expected HealthCheck, got {}", other.type_name()),
        }
    }
}
