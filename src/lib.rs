//! rtmp-core: RTMP wire protocol core
//!
//! This library implements the transport core of RTMP:
//! - The C0C1C2/S0S1S2 handshake state machine
//! - Chunk stream multiplexing: many logical message streams over one
//!   byte connection, with stateful header compaction
//! - Message parsing for protocol control, command, data, shared object,
//!   and media messages
//! - AMF0 and AMF3 value codecs for command and data payloads
//!
//! Listener/accept loops, media payload interpretation, and application
//! command handling live outside this crate and consume it through
//! [`Connection`].
//!
//! # Example
//!
//! ```no_run
//! use rtmp_core::{Connection, RtmpMessage};
//! use tokio::net::TcpStream;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let socket = TcpStream::connect("127.0.0.1:1935").await?;
//!     let mut conn = Connection::client(socket);
//!
//!     conn.handshake().await?;
//!     conn.write_message(&RtmpMessage::SetChunkSize(4096)).await?;
//!
//!     loop {
//!         match conn.read_message().await? {
//!             RtmpMessage::Command(cmd) => println!("command: {}", cmd.name),
//!             RtmpMessage::Audio { data, .. } => println!("audio: {} bytes", data.len()),
//!             _ => {}
//!         }
//!     }
//! }
//! ```

pub mod amf;
pub mod connection;
pub mod error;
pub mod protocol;

// Re-export main types for convenience
pub use amf::AmfValue;
pub use connection::Connection;
pub use error::{DecodeError, EncodeError, Error, FramingError, HandshakeError, Result};
pub use protocol::message::{Command, DataMessage, LimitType, RtmpMessage, SharedObjectMessage, UserControlEvent};
