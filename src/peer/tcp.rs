//! TCP transport between federation peers
//!
//! One request and one reply per connection, both length-prefixed JSON
//! envelopes (see [`crate::protocol::read_frame`]).
//!
//! A request that cannot be decoded is answered with an `ERROR` carrying the
//! decode error's code. Clients treat any `E4xx` reply as final.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::protocol::{
    read_frame, write_frame, ErrorMessage, HealthCheckRequest, Message, MessageEnvelope,
    SendModelRequest, PROTOCOL_VERSION,
};
use crate::types::{Contribution, PeerAddress, RoundNumber};

use super::{HealthStatus, PeerService, PeerTransport, SendModelReply};

// ─────────────────────────────────────────────────────────────────
// Server
// ─────────────────────────────────────────────────────────────────

/// How long an inbound connection may take to deliver its request
pub const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Accepts inbound peer connections and hands each to a [`PeerService`]
pub struct PeerServer {
    local_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PeerServer {
    /// Bind `listen_addr` and start the accept loop
    pub async fn start(listen_addr: &str, service: Arc<PeerService>) -> Result<Self> {
        Self::start_with_read_timeout(listen_addr, service, REQUEST_READ_TIMEOUT).await
    }

    /// Like [`PeerServer::start`], dropping connections that have not sent a
    /// complete request within `read_timeout`
    pub async fn start_with_read_timeout(
        listen_addr: &str,
        service: Arc<PeerService>,
        read_timeout: Duration,
    ) -> Result<Self> {
        let listener = TcpListener::bind(listen_addr)
            .await
            .map_err(|e| Error::connection_failed(listen_addr, format!("bind failed: {}", e)))?;
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, "Peer server listening");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(accept_loop(listener, service, read_timeout, shutdown_rx));

        Ok(Self {
            local_addr,
            shutdown_tx,
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting connections and wait for the accept loop to exit.
    /// Connections already being served run to completion.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            debug!(error = %e, "Accept loop ended abnormally");
        }
        info!(addr = %self.local_addr, "Peer server stopped");
    }
}

async fn accept_loop(
    listener: TcpListener,
    service: Arc<PeerService>,
    read_timeout: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer_addr)) => {
                    debug!(peer_addr = %peer_addr, "Incoming peer connection");
                    let service = Arc::clone(&service);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, peer_addr, &service, read_timeout).await {
                            debug!(peer_addr = %peer_addr, error = %e, "Inbound connection failed");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "Accept failed");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }
}

/// Read one request, answer it, close
async fn handle_connection(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    service: &PeerService,
    read_timeout: Duration,
) -> Result<()> {
    let request = match tokio::time::timeout(read_timeout, read_frame(&mut stream)).await {
        Ok(Ok(request)) => request,
        Ok(Err(e @ (Error::ProtocolMalformed { .. } | Error::MessageTooLarge { .. }))) => {
            warn!(peer_addr = %peer_addr, error = %e, "Rejecting undecodable request");
            let reply = Message::Error(ErrorMessage {
                code: e.code().as_str(),
                message: format!("Error receiving model: {}", e),
            });
            return write_frame(&mut stream, &MessageEnvelope::new(reply)).await;
        }
        Ok(Err(e)) => return Err(e),
        Err(_) => {
            return Err(Error::connection_timeout(
                peer_addr.to_string(),
                read_timeout.as_millis() as u64,
            ))
        }
    };
    let request_type = request.payload.type_name();
    let reply = service.handle(request);
    debug!(request = request_type, reply = reply.type_name(), "Answering peer");
    write_frame(&mut stream, &MessageEnvelope::new(reply)).await
}

// ─────────────────────────────────────────────────────────────────
// Client
// ─────────────────────────────────────────────────────────────────

/// [`PeerTransport`] over plain TCP
#[derive(Debug, Clone)]
pub struct TcpTransport {
    connect_timeout: Duration,
}

impl TcpTransport {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    /// Connect, send `request`, return the reply payload
    async fn exchange(&self, peer: &PeerAddress, request: Message) -> Result<Message> {
        let endpoint = peer.endpoint();

        let mut stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(&endpoint))
            .await
            .map_err(|_| {
                Error::connection_timeout(&endpoint, self.connect_timeout.as_millis() as u64)
            })?
            .map_err(|e| Error::connection_failed(&endpoint, e.to_string()))?;

        write_frame(&mut stream, &MessageEnvelope::new(request))
            .await
            .map_err(|e| lost(&endpoint, e))?;
        let reply = read_frame(&mut stream).await.map_err(|e| lost(&endpoint, e))?;

        if let Err(e) = PROTOCOL_VERSION.ensure_compatible(&reply.version) {
            warn!(peer = %peer.name, version = %reply.version, "Peer speaks incompatible protocol");
            return Err(e);
        }

        Ok(reply.payload)
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

/// Stream I/O failures after connecting mean the peer went away
fn lost(endpoint: &str, e: Error) -> Error {
    match e {
        Error::Io(io) => Error::ConnectionLost {
            endpoint: endpoint.to_string(),
            message: io.to_string(),
        },
        other => other,
    }
}

/// `E4xx` replies mean the peer could not make sense of the request
fn is_protocol_reply(err: &ErrorMessage) -> bool {
    err.code.starts_with("E4")
}

fn protocol_rejection(peer: &PeerAddress, err: ErrorMessage) -> Error {
    Error::PeerProtocol {
        peer: peer.name.clone(),
        code: err.code,
        message: err.message,
    }
}

fn unexpected(expected: &str, actual: &Message) -> Error {
    Error::ProtocolUnexpected {
        expected: expected.to_string(),
        actual: actual.type_name().to_string(),
    }
}

#[async_trait]
impl PeerTransport for TcpTransport {
    async fn send_model(
        &self,
        peer: &PeerAddress,
        round: RoundNumber,
        sender: &PeerAddress,
        contribution: Arc<Contribution>,
    ) -> Result<SendModelReply> {
        let request = Message::SendModel(SendModelRequest {
            round,
            sender: sender.clone(),
            contribution: (*contribution).clone(),
        });

        match self.exchange(peer, request).await? {
            Message::ModelAck(ack) => Ok(ack.into()),
            Message::Error(err) if is_protocol_reply(&err) => Err(protocol_rejection(peer, err)),
            Message::Error(err) => Ok(SendModelReply::Error {
                message: format!("{}: {}", err.code, err.message),
            }),
            other => Err(unexpected("MODEL_ACK", &other)),
        }
    }

    async fn health_check(
        &self,
        peer: &PeerAddress,
        peer_id: &str,
        timestamp: &str,
    ) -> Result<HealthStatus> {
        let request = Message::HealthCheck(HealthCheckRequest {
            peer_id: peer_id.to_string(),
            timestamp: timestamp.to_string(),
        });

        match self.exchange(peer, request).await? {
            Message::HealthCheckReply(status) => Ok(status),
            Message::Error(err) if is_protocol_reply(&err) => Err(protocol_rejection(peer, err)),
            Message::Error(err) => Err(Error::PeerRejected {
                peer: peer.name.clone(),
                message: format!("{}: {}", err.code, err.message),
            }),
            other => Err(unexpected("HEALTH_CHECK_REPLY", &other)),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use crate::peer::{SendOutcome, Sender, SenderConfig};
    use crate::round::RoundGate;
    use crate::types::Tensor;

    async fn serve(round: RoundNumber) -> (PeerServer, Arc<RoundGate>, PeerAddress) {
        let gate = Arc::new(RoundGate::new(round, 1));
        let service = Arc::new(PeerService::new("node-b", Arc::clone(&gate)));
        let server = PeerServer::start("127.0.0.1:0", service).await.unwrap();
        let addr = PeerAddress::new("node-b", "127.0.0.1", server.local_addr().port());
        (server, gate, addr)
    }

    fn contribution() -> Arc<Contribution> {
        Arc::new(
            Contribution::new()
                .with_param("output_layer.weight", Tensor::new(vec![1, 3], vec![0.1, 0.2, 0.3]).unwrap())
                .with_param("output_layer.bias", Tensor::from_slice(&[0.5])),
        )
    }

    #[tokio::test]
    async fn test_send_model_over_tcp() {
        let (server, gate, addr) = serve(1).await;
        let transport = TcpTransport::default();
        let me = PeerAddress::new("node-a", "127.0.0.1", 1);

        let reply = transport.send_model(&addr, 1, &me, contribution()).await.unwrap();
        assert_eq!(reply, SendModelReply::Accepted);

        let (_, stored) = gate.snapshot();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].sender.name, "node-a");
        assert_eq!(*stored[0].contribution, *contribution());

        let reply = transport.send_model(&addr, 7, &me, contribution()).await.unwrap();
        assert_eq!(reply, SendModelReply::IgnoredWrongRound { current_round: 1 });

        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_health_check_over_tcp() {
        let (server, _gate, addr) = serve(1).await;
        let transport = TcpTransport::default();

        let status = transport.health_check(&addr, "node-a", "now").await.unwrap();
        assert_eq!(status.status, "SERVING");
        assert_eq!(status.peer_id, "node-b");

        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_unreachable_peer_is_retryable() {
        // Bind then drop to get a port nothing listens on
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let addr = PeerAddress::new("ghost", "127.0.0.1", port);
        let transport = TcpTransport::new(Duration::from_millis(500));

        let err = transport
            .send_model(&addr, 1, &addr, contribution())
            .await
            .unwrap_err();
        assert!(err.is_retryable(), "{:?}", err);
    }

    #[tokio::test]
    async fn test_shutdown_stops_accepting() {
        let (server, _gate, addr) = serve(1).await;
        server.shutdown().await;

        let transport = TcpTransport::new(Duration::from_millis(500));
        assert!(transport.health_check(&addr, "node-a", "now").await.is_err());
    }

    #[tokio::test]
    async fn test_undecodable_request_gets_error_reply() {
        let (server, gate, addr) = serve(1).await;

        let mut stream = TcpStream::connect(addr.endpoint()).await.unwrap();
        stream.write_u32(5).await.unwrap();
        stream.write_all(b"nope!").await.unwrap();

        let reply = read_frame(&mut stream).await.unwrap();
        match reply.payload {
            Message::Error(err) => {
                assert_eq!(err.code, "E401");
                assert!(err.message.starts_with("Error receiving model"), "{}", err.message);
            }
            other => panic!("Expected Error, got {}", other.type_name()),
        }
        assert_eq!(gate.accepted_count(), 0);

        // Still serving afterwards
        let transport = TcpTransport::default();
        assert!(transport.health_check(&addr, "node-a", "now").await.is_ok());

        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_stalled_client_is_dropped() {
        let gate = Arc::new(RoundGate::new(1, 1));
        let service = Arc::new(PeerService::new("node-b", gate));
        let server = PeerServer::start_with_read_timeout(
            "127.0.0.1:0",
            service,
            Duration::from_millis(100),
        )
        .await
        .unwrap();

        // Announce a frame but never send its body
        let mut stream = TcpStream::connect(server.local_addr()).await.unwrap();
        stream.write_u32(64).await.unwrap();

        let mut buf = [0u8; 16];
        let read = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut buf))
            .await
            .expect("server should close the connection");
        assert!(matches!(read, Ok(0) | Err(_)), "{:?}", read);

        server.shutdown().await;
    }

    /// Answers every request with the given error code, counting connections
    async fn refusing_peer(code: &'static str) -> (PeerAddress, Arc<AtomicU32>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let connections = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&connections);

        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                let _ = read_frame(&mut stream).await;
                let reply = Message::Error(ErrorMessage {
                    code: code.to_string(),
                    message: "Protocol version mismatch".to_string(),
                });
                let _ = write_frame(&mut stream, &MessageEnvelope::new(reply)).await;
            }
        });

        (PeerAddress::new("node-old", "127.0.0.1", port), connections)
    }

    #[tokio::test]
    async fn test_protocol_error_reply_is_not_retried() {
        let (addr, connections) = refusing_peer("E400").await;
        let transport: Arc<dyn PeerTransport> = Arc::new(TcpTransport::new(Duration::from_secs(2)));

        let err = transport
            .health_check(&addr, "node-a", "now")
            .await
            .unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::PeerProtocol);
        assert!(!err.is_retryable());

        let sender = Sender::new(
            Arc::clone(&transport),
            SenderConfig {
                max_retries: 3,
                retry_delay: Duration::from_millis(10),
                attempt_timeout: Duration::from_secs(2),
                ..SenderConfig::default()
            },
            PeerAddress::new("node-a", "127.0.0.1", 1),
        );
        match sender.deliver(&contribution(), &addr, 1).await {
            SendOutcome::Failed { attempts, error } => {
                assert_eq!(attempts, 1);
                assert!(error.contains("E400"), "{}", error);
            }
            other => panic!("expected Failed, got {:?}", other),
        }
        assert_eq!(connections.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_other_error_reply_stays_retryable() {
        let (addr, _connections) = refusing_peer("E900").await;
        let transport = TcpTransport::new(Duration::from_secs(2));
        let me = PeerAddress::new("node-a", "127.0.0.1", 1);

        let reply = transport.send_model(&addr, 1, &me, contribution()).await.unwrap();
        assert!(matches!(reply, SendModelReply::Error { ref message } if message.starts_with("E900")));
    }
}
