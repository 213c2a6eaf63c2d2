//! Inbound request handling
//!
//! Maps protocol requests onto the local [`RoundGate`]. Handlers are
//! synchronous: the gate never blocks on I/O, so a request is answered as
//! soon as it is parsed.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use crate::error::ErrorCode;
use crate::protocol::{
    AckStatus, ErrorMessage, HealthCheckRequest, HealthCheckResponse, Message, MessageEnvelope,
    ModelAck, SendModelRequest, PROTOCOL_VERSION,
};
use crate::round::{AcceptResult, RoundGate};
use crate::types::{Contribution, PeerAddress, RoundNumber};

/// Status reported by a live node
pub const SERVING: &str = "SERVING";

/// Serves SendModel and HealthCheck for one node
pub struct PeerService {
    local_name: String,
    gate: Arc<RoundGate>,
}

impl PeerService {
    pub fn new(local_name: impl Into<String>, gate: Arc<RoundGate>) -> Self {
        Self {
            local_name: local_name.into(),
            gate,
        }
    }

    pub fn gate(&self) -> &Arc<RoundGate> {
        &self.gate
    }

    /// Offer a contribution to the gate and build the acknowledgement.
    ///
    /// Tensors whose data does not fill their shape never reach the store.
    pub fn accept(
        &self,
        round: RoundNumber,
        sender: PeerAddress,
        contribution: Arc<Contribution>,
    ) -> ModelAck {
        if let Some(param) = contribution.inconsistent_param() {
            warn!(
                round,
                from = %sender.name,
                param,
                "Rejecting contribution with malformed tensor"
            );
            return ModelAck {
                status: AckStatus::Error,
                current_round: self.gate.current_round(),
                message: format!("malformed tensor '{}': data does not match shape", param),
            };
        }

        match self.gate.accept(round, sender, contribution) {
            AcceptResult::Accepted => ModelAck {
                status: AckStatus::Accepted,
                current_round: round,
                message: "accepted".to_string(),
            },
            AcceptResult::IgnoredWrongRound { current_round } => ModelAck {
                status: AckStatus::IgnoredWrongRound,
                current_round,
                message: "ignored: wrong round".to_string(),
            },
        }
    }

    pub fn send_model(&self, request: SendModelRequest) -> ModelAck {
        self.accept(request.round, request.sender, Arc::new(request.contribution))
    }

    /// Independent of round state
    pub fn health_check(&self, request: &HealthCheckRequest) -> HealthCheckResponse {
        debug!(from = %request.peer_id, "Health check");
        HealthCheckResponse {
            status: SERVING.to_string(),
            peer_id: self.local_name.clone(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    /// Dispatch one request envelope and produce the reply payload
    pub fn handle(&self, envelope: MessageEnvelope) -> Message {
        if let Err(e) = PROTOCOL_VERSION.ensure_compatible(&envelope.version) {
            warn!(
                message_id = %envelope.id,
                version = %envelope.version,
                "Rejecting request from incompatible protocol version"
            );
            return error_reply(e.code(), e.to_string());
        }

        match envelope.payload {
            Message::SendModel(request) => Message::ModelAck(self.send_model(request)),
            Message::HealthCheck(request) => Message::HealthCheckReply(self.health_check(&request)),
            other => {
                warn!(msg_type = %other.type_name(), "Unexpected message on inbound connection");
                error_reply(
                    ErrorCode::ProtocolUnexpected,
                    format!("{} is not a request", other.type_name()),
                )
            }
        }
    }
}

fn error_reply(code: ErrorCode, message: String) -> Message {
    Message::Error(ErrorMessage {
        code: code.as_str(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ProtocolVersion;
    use crate::types::Tensor;

    fn service(round: RoundNumber) -> PeerService {
        PeerService::new("node-a", Arc::new(RoundGate::new(round, 2)))
    }

    fn send_model(round: RoundNumber) -> Message {
        Message::SendModel(SendModelRequest {
            round,
            sender: PeerAddress::new("node-b", "10.0.0.2", 50051),
            contribution: Contribution::new().with_param("w", Tensor::from_slice(&[1.0])),
        })
    }

    #[test]
    fn test_send_model_accepted() {
        let svc = service(3);
        match svc.handle(MessageEnvelope::new(send_model(3))) {
            Message::ModelAck(ack) => {
                assert_eq!(ack.status, AckStatus::Accepted);
                assert_eq!(ack.current_round, 3);
            }
            other => panic!("Expected ModelAck, got {}", other.type_name()),
        }
        assert_eq!(svc.gate().accepted_count(), 1);
    }

    #[test]
    fn test_malformed_tensor_is_rejected() {
        let svc = service(2);
        let request = Message::SendModel(SendModelRequest {
            round: 2,
            sender: PeerAddress::new("node-b", "10.0.0.2", 50051),
            contribution: Contribution::new().with_param(
                "w",
                Tensor {
                    shape: vec![usize::MAX, 2],
                    data: vec![1.0, 2.0],
                },
            ),
        });

        match svc.handle(MessageEnvelope::new(request)) {
            Message::ModelAck(ack) => {
                assert_eq!(ack.status, AckStatus::Error);
                assert_eq!(ack.current_round, 2);
                assert!(ack.message.contains("'w'"), "{}", ack.message);
            }
            other => panic!("Expected ModelAck, got {}", other.type_name()),
        }
        assert_eq!(svc.gate().accepted_count(), 0);
    }

    #[test]
    fn test_send_model_wrong_round() {
        let svc = service(3);
        match svc.handle(MessageEnvelope::new(send_model(2))) {
            Message::ModelAck(ack) => {
                assert_eq!(ack.status, AckStatus::IgnoredWrongRound);
                assert_eq!(ack.current_round, 3);
                assert_eq!(ack.message, "ignored: wrong round");
            }
            other => panic!("Expected ModelAck, got {}", other.type_name()),
        }
        assert_eq!(svc.gate().accepted_count(), 0);
    }

    #[test]
    fn test_health_check_serving() {
        let svc = service(1);
        let reply = svc.handle(MessageEnvelope::new(Message::HealthCheck(HealthCheckRequest {
            peer_id: "node-b".into(),
            timestamp: Utc::now().to_rfc3339(),
        })));
        match reply {
            Message::HealthCheckReply(status) => {
                assert_eq!(status.status, SERVING);
                assert_eq!(status.peer_id, "node-a");
            }
            other => panic!("Expected HealthCheckReply, got {}", other.type_name()),
        }
    }

    #[test]
    fn test_incompatible_version_rejected() {
        let svc = service(1);
        let envelope = MessageEnvelope::with_version(send_model(1), ProtocolVersion::new(2, 0, 0));
        match svc.handle(envelope) {
            Message::Error(err) => assert_eq!(err.code, "E400"),
            other => panic!("Expected Error, got {}", other.type_name()),
        }
        assert_eq!(svc.gate().accepted_count(), 0);
    }

    #[test]
    fn test_reply_as_request_rejected() {
        let svc = service(1);
        let envelope = MessageEnvelope::new(Message::ModelAck(ModelAck {
            status: AckStatus::Accepted,
            current_round: 1,
            message: String::new(),
        }));
        assert!(matches!(svc.handle(envelope), Message::Error(_)));
    }
}
