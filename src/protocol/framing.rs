//! Wire protocol: length-prefixed JSON framing
//!
//! Wire format:  [4-byte big-endian length][JSON envelope]
//!
//! One request and one reply per connection; the caller owns the stream.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};

use super::MessageEnvelope;

/// Largest accepted frame (room for sizeable tensor payloads)
pub const MAX_MESSAGE_SIZE: u32 = 64 * 1024 * 1024;

/// Read one length-prefixed envelope from a stream
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<MessageEnvelope> {
    let len = reader.read_u32().await?;
    if len > MAX_MESSAGE_SIZE {
        return Err(Error::MessageTooLarge {
            size: u64::from(len),
            max: u64::from(MAX_MESSAGE_SIZE),
        });
    }

    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf).await?;

    serde_json::from_slice(&buf).map_err(|e| Error::protocol_malformed(e.to_string()))
}

/// Write one length-prefixed envelope to a stream
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    envelope: &MessageEnvelope,
) -> Result<()> {
    let json = serde_json::to_vec(envelope)?;
    if json.len() > MAX_MESSAGE_SIZE as usize {
        return Err(Error::MessageTooLarge {
            size: json.len() as u64,
            max: u64::from(MAX_MESSAGE_SIZE),
        });
    }

    writer.write_u32(json.len() as u32).await?;
    writer.write_all(&json).await?;
    writer.flush().await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{HealthCheckRequest, Message};

    fn probe() -> MessageEnvelope {
        MessageEnvelope::new(Message::HealthCheck(HealthCheckRequest {
            peer_id: "node-a".into(),
            timestamp: "2025-01-01T00:00:00".into(),
        }))
    }

    #[tokio::test]
    async fn test_frame_written_then_read() {
        let envelope = probe();
        let mut wire: Vec<u8> = Vec::new();
        write_frame(&mut wire, &envelope).await.unwrap();

        let declared = u32::from_be_bytes([wire[0], wire[1], wire[2], wire[3]]) as usize;
        assert_eq!(declared, wire.len() - 4);

        let mut reader: &[u8] = &wire;
        let parsed = read_frame(&mut reader).await.unwrap();
        assert_eq!(parsed.id, envelope.id);
        assert_eq!(parsed.payload.type_name(), "HEALTH_CHECK");
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected_before_reading_body() {
        let mut stream = tokio_test::io::Builder::new()
            .read(&(MAX_MESSAGE_SIZE + 1).to_be_bytes())
            .build();

        match read_frame(&mut stream).await {
            Err(Error::MessageTooLarge { size, .. }) => {
                assert_eq!(size, u64::from(MAX_MESSAGE_SIZE) + 1)
            }
            other => panic!("expected MessageTooLarge, got {:?}", other.map(|e| e.id)),
        }
    }

    #[tokio::test]
    async fn test_truncated_frame_is_io_error() {
        let mut stream = tokio_test::io::Builder::new()
            .read(&10u32.to_be_bytes())
            .read(b"{\"ty")
            .build();

        assert!(matches!(read_frame(&mut stream).await, Err(Error::Io(_))));
    }

    #[tokio::test]
    async fn test_garbage_body_is_malformed() {
        let body = b"not json";
        let mut stream = tokio_test::io::Builder::new()
            .read(&(body.len() as u32).to_be_bytes())
            .read(body)
            .build();

        assert!(matches!(
            read_frame(&mut stream).await,
            Err(Error::ProtocolMalformed { .. })
        ));
    }
}
