//! RTMP connection orchestration
//!
//! A [`Connection`] owns the transport byte stream exclusively and composes
//! the handshake engine, the chunk codec, and message parsing into a
//! stateful session:
//! 1. Handshake (exactly once)
//! 2. Read/write message loop
//! 3. Close
//!
//! The transport is any `AsyncRead + AsyncWrite` stream, typically a
//! `TcpStream`. One connection belongs to one execution context; chunk
//! stream interleaving is a wire-format concept, not a concurrency one.

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, FramingError, HandshakeError, Result};
use crate::protocol::chunk::{ChunkDecoder, ChunkEncoder, RtmpChunk};
use crate::protocol::handshake::{Handshake, HandshakeRole};
use crate::protocol::message::RtmpMessage;

/// Handshake completion state: terminal once complete or failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandshakeStatus {
    NotStarted,
    Complete,
    Failed,
}

/// A single RTMP session over an owned transport
pub struct Connection<T> {
    transport: T,
    role: HandshakeRole,
    status: HandshakeStatus,

    /// Buffered incoming bytes not yet consumed by the chunk decoder
    read_buf: BytesMut,
    /// Staging buffer for outgoing chunks
    write_buf: BytesMut,

    chunk_decoder: ChunkDecoder,
    chunk_encoder: ChunkEncoder,

    /// Peer's window acknowledgement size, once announced
    window_ack_size: Option<u32>,
    /// Transport bytes received since the session started
    bytes_received: u64,
    /// Received-byte count at the last acknowledgement we sent
    last_ack: u64,

    closed: bool,
}

impl<T: AsyncRead + AsyncWrite + Unpin> Connection<T> {
    /// Create a connection in the initiator (client) role
    pub fn client(transport: T) -> Self {
        Self::new(transport, HandshakeRole::Client)
    }

    /// Create a connection in the responder (server) role
    pub fn server(transport: T) -> Self {
        Self::new(transport, HandshakeRole::Server)
    }

    fn new(transport: T, role: HandshakeRole) -> Self {
        Self {
            transport,
            role,
            status: HandshakeStatus::NotStarted,
            read_buf: BytesMut::with_capacity(8 * 1024),
            write_buf: BytesMut::with_capacity(8 * 1024),
            chunk_decoder: ChunkDecoder::new(),
            chunk_encoder: ChunkEncoder::new(),
            window_ack_size: None,
            bytes_received: 0,
            last_ack: 0,
            closed: false,
        }
    }

    /// Perform the RTMP handshake.
    ///
    /// Runs the exchange at most once: calling again after completion is a
    /// no-op, and calling again after a failure returns an error without
    /// touching the transport. A failed handshake leaves the connection
    /// unusable; callers must discard it.
    pub async fn handshake(&mut self) -> Result<()> {
        if self.closed {
            return Err(Error::ConnectionClosed);
        }
        match self.status {
            HandshakeStatus::Complete => return Ok(()),
            HandshakeStatus::Failed => return Err(HandshakeError::InvalidState.into()),
            HandshakeStatus::NotStarted => {}
        }

        match self.run_handshake().await {
            Ok(()) => {
                self.status = HandshakeStatus::Complete;
                tracing::debug!(role = ?self.role, "handshake complete");
                Ok(())
            }
            Err(e) => {
                self.status = HandshakeStatus::Failed;
                tracing::debug!(error = %e, "handshake failed");
                Err(e)
            }
        }
    }

    async fn run_handshake(&mut self) -> Result<()> {
        let mut engine = Handshake::new(self.role);

        if let Some(out) = engine.generate_initial() {
            self.transport.write_all(&out).await?;
            self.transport.flush().await?;
        }

        let mut pending = BytesMut::new();
        while !engine.is_done() {
            let needed = engine.bytes_needed();
            while pending.len() < needed {
                let n = self.transport.read_buf(&mut pending).await?;
                if n == 0 {
                    return Err(Error::ConnectionClosed);
                }
            }

            let mut data = pending.split().freeze();
            let response = engine.process(&mut data)?;
            if let Some(out) = response {
                self.transport.write_all(&out).await?;
                self.transport.flush().await?;
            }
            pending = BytesMut::from(&data[..]);
        }

        // Bytes past the handshake already belong to the chunk stream
        if !pending.is_empty() {
            self.bytes_received += pending.len() as u64;
            self.read_buf.extend_from_slice(&pending);
        }
        Ok(())
    }

    /// Read the next complete logical message.
    ///
    /// Blocks until one message is fully reassembled from its chunks.
    /// Incoming `SetChunkSize` and `Abort` messages are applied to the
    /// decoder before being returned. Transport EOF yields
    /// [`Error::ConnectionClosed`].
    pub async fn read_message(&mut self) -> Result<RtmpMessage> {
        self.ensure_ready()?;

        loop {
            if let Some(chunk) = self.chunk_decoder.decode(&mut self.read_buf)? {
                let message = RtmpMessage::from_chunk(&chunk)?;
                self.apply_incoming(&message);
                self.maybe_acknowledge().await?;
                return Ok(message);
            }

            let n = self.transport.read_buf(&mut self.read_buf).await?;
            if n == 0 {
                return Err(Error::ConnectionClosed);
            }
            self.bytes_received += n as u64;
        }
    }

    /// Chunk and write one logical message.
    ///
    /// Fully synchronous with respect to wire order: messages appear on
    /// the wire in call order. An outgoing `SetChunkSize` takes effect
    /// from the next message, never refragmenting already-written bytes.
    pub async fn write_message(&mut self, message: &RtmpMessage) -> Result<()> {
        self.ensure_ready()?;

        if let RtmpMessage::SetChunkSize(size) = message {
            if *size == 0 {
                return Err(FramingError::InvalidChunkSize(0).into());
            }
        }

        let (message_type, payload) = message.encode()?;
        let chunk = RtmpChunk {
            csid: message.default_csid(),
            timestamp: message.timestamp(),
            message_type,
            stream_id: message.stream_id(),
            payload,
        };

        self.write_buf.clear();
        self.chunk_encoder.encode(&chunk, &mut self.write_buf)?;
        self.transport.write_all(&self.write_buf).await?;
        self.transport.flush().await?;

        if let RtmpMessage::SetChunkSize(size) = message {
            self.chunk_encoder.set_chunk_size(*size);
            tracing::debug!(size = *size, "outgoing chunk size updated");
        }

        Ok(())
    }

    /// Release the transport. Idempotent.
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        tracing::debug!(role = ?self.role, "closing connection");
        self.transport.shutdown().await?;
        Ok(())
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.closed {
            return Err(Error::ConnectionClosed);
        }
        match self.status {
            HandshakeStatus::Complete => Ok(()),
            _ => Err(HandshakeError::InvalidState.into()),
        }
    }

    /// Apply protocol-control effects of an incoming message
    fn apply_incoming(&mut self, message: &RtmpMessage) {
        match message {
            RtmpMessage::SetChunkSize(size) => {
                self.chunk_decoder.set_chunk_size(*size);
                tracing::debug!(size = *size, "incoming chunk size updated");
            }
            RtmpMessage::Abort { csid } => {
                self.chunk_decoder.abort(*csid);
                tracing::debug!(csid = *csid, "chunk stream aborted");
            }
            RtmpMessage::WindowAckSize(size) => {
                self.window_ack_size = Some(*size);
            }
            _ => {}
        }
    }

    /// Send an acknowledgement when the peer's window has filled
    async fn maybe_acknowledge(&mut self) -> Result<()> {
        let window = match self.window_ack_size {
            Some(w) if w > 0 => w as u64,
            _ => return Ok(()),
        };
        if self.bytes_received - self.last_ack < window {
            return Ok(());
        }
        self.last_ack = self.bytes_received;

        let ack = RtmpMessage::Acknowledgement {
            sequence: self.bytes_received as u32,
        };
        let (message_type, payload) = ack.encode()?;
        let chunk = RtmpChunk {
            csid: ack.default_csid(),
            timestamp: 0,
            message_type,
            stream_id: 0,
            payload,
        };
        self.write_buf.clear();
        self.chunk_encoder.encode(&chunk, &mut self.write_buf)?;
        self.transport.write_all(&self.write_buf).await?;
        self.transport.flush().await?;
        tracing::trace!(sequence = self.bytes_received, "acknowledgement sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amf::AmfValue;
    use crate::protocol::constants::{HANDSHAKE_SIZE, RTMP_VERSION};
    use crate::protocol::message::Command;
    use bytes::Bytes;
    use tokio::io::DuplexStream;

    fn pair() -> (Connection<DuplexStream>, Connection<DuplexStream>) {
        let (a, b) = tokio::io::duplex(256 * 1024);
        (Connection::client(a), Connection::server(b))
    }

    async fn handshaken() -> (Connection<DuplexStream>, Connection<DuplexStream>) {
        let (mut client, mut server) = pair();
        let (c, s) = tokio::join!(client.handshake(), server.handshake());
        c.unwrap();
        s.unwrap();
        (client, server)
    }

    #[tokio::test]
    async fn test_handshake_completes_both_sides() {
        let (mut client, mut server) = handshaken().await;

        // A second call is a no-op
        client.handshake().await.unwrap();
        server.handshake().await.unwrap();
    }

    #[tokio::test]
    async fn test_read_before_handshake_fails() {
        let (mut client, _server) = pair();
        let err = client.read_message().await.unwrap_err();
        assert!(matches!(
            err,
            Error::Handshake(HandshakeError::InvalidState)
        ));
    }

    #[tokio::test]
    async fn test_command_roundtrip() {
        let (mut client, mut server) = handshaken().await;

        let mut cmd = Command::new("connect", 1.0);
        cmd.arguments.push(AmfValue::String("app".into()));

        let msg = RtmpMessage::Command(cmd);
        let write = client.write_message(&msg);
        let read = server.read_message();
        let (w, r) = tokio::join!(write, read);
        w.unwrap();

        match r.unwrap() {
            RtmpMessage::Command(parsed) => {
                assert_eq!(parsed.name, "connect");
                assert_eq!(parsed.transaction_id, 1.0);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_chunk_size_renegotiation() {
        let (mut client, mut server) = handshaken().await;

        let media = vec![0x55u8; 5000];
        let audio = RtmpMessage::Audio {
            timestamp: 160,
            stream_id: 1,
            data: Bytes::from(media.clone()),
        };

        client
            .write_message(&RtmpMessage::SetChunkSize(2048))
            .await
            .unwrap();
        client.write_message(&audio).await.unwrap();

        // The chunk-size message is applied to the server's decoder before
        // the audio message is reassembled
        match server.read_message().await.unwrap() {
            RtmpMessage::SetChunkSize(2048) => {}
            other => panic!("unexpected message: {:?}", other),
        }
        match server.read_message().await.unwrap() {
            RtmpMessage::Audio {
                timestamp, data, ..
            } => {
                assert_eq!(timestamp, 160);
                assert_eq!(data.len(), 5000);
                assert_eq!(&data[..], &media[..]);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_write_chunk_size_zero_fails() {
        let (mut client, _server) = handshaken().await;
        let err = client
            .write_message(&RtmpMessage::SetChunkSize(0))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Framing(FramingError::InvalidChunkSize(0))
        ));
    }

    #[tokio::test]
    async fn test_corrupted_echo_fails_handshake_terminally() {
        let (transport, mut peer) = tokio::io::duplex(64 * 1024);
        let mut client = Connection::client(transport);

        // A responder that echoes a corrupted C1 payload in S2
        let responder = async move {
            let mut c0c1 = vec![0u8; 1 + HANDSHAKE_SIZE];
            peer.read_exact(&mut c0c1).await.unwrap();

            let mut s2 = c0c1[1..].to_vec();
            s2[100] ^= 0xFF; // corrupt the random payload

            let mut response = Vec::with_capacity(1 + HANDSHAKE_SIZE * 2);
            response.push(RTMP_VERSION);
            response.extend_from_slice(&[7u8; HANDSHAKE_SIZE]); // S1
            response.extend_from_slice(&s2);
            peer.write_all(&response).await.unwrap();
            peer
        };

        let (result, _peer) = tokio::join!(client.handshake(), responder);
        assert!(matches!(
            result.unwrap_err(),
            Error::Handshake(HandshakeError::EchoMismatch)
        ));

        // The connection is unusable from here on
        let err = client.handshake().await.unwrap_err();
        assert!(matches!(
            err,
            Error::Handshake(HandshakeError::InvalidState)
        ));
        let err = client.read_message().await.unwrap_err();
        assert!(matches!(
            err,
            Error::Handshake(HandshakeError::InvalidState)
        ));
    }

    #[tokio::test]
    async fn test_peer_close_unblocks_read() {
        let (mut client, mut server) = handshaken().await;

        let reader = tokio::spawn(async move { server.read_message().await });
        client.close().await.unwrap();

        let err = reader.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (mut client, _server) = handshaken().await;
        client.close().await.unwrap();
        client.close().await.unwrap();

        let err = client.read_message().await.unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_window_acknowledgement() {
        let (mut client, mut server) = handshaken().await;

        // Announce a small window, then push enough media past it
        client
            .write_message(&RtmpMessage::WindowAckSize(1000))
            .await
            .unwrap();
        let audio = RtmpMessage::Audio {
            timestamp: 0,
            stream_id: 1,
            data: Bytes::from(vec![1u8; 1500]),
        };
        client.write_message(&audio).await.unwrap();

        // Server reads both; the second read crosses the window and sends
        // an acknowledgement back
        match server.read_message().await.unwrap() {
            RtmpMessage::WindowAckSize(1000) => {}
            other => panic!("unexpected message: {:?}", other),
        }
        match server.read_message().await.unwrap() {
            RtmpMessage::Audio { .. } => {}
            other => panic!("unexpected message: {:?}", other),
        }

        match client.read_message().await.unwrap() {
            RtmpMessage::Acknowledgement { sequence } => {
                assert!(sequence as usize >= 1500);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_wire_order_preserved() {
        let (mut client, mut server) = handshaken().await;

        for i in 0..20u32 {
            let audio = RtmpMessage::Audio {
                timestamp: i * 20,
                stream_id: 1,
                data: Bytes::from(vec![i as u8; 64]),
            };
            client.write_message(&audio).await.unwrap();
        }

        for i in 0..20u32 {
            match server.read_message().await.unwrap() {
                RtmpMessage::Audio {
                    timestamp, data, ..
                } => {
                    assert_eq!(timestamp, i * 20);
                    assert_eq!(data[0], i as u8);
                }
                other => panic!("unexpected message: {:?}", other),
            }
        }
    }
}
