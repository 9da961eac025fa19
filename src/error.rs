//! Unified error types for rtmp-core

use std::fmt;
use std::io;

/// Result type alias using the library's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for all RTMP operations
#[derive(Debug)]
pub enum Error {
    /// I/O error during transport operations
    Io(io::Error),
    /// Chunk framing violation (fatal to the connection)
    Framing(FramingError),
    /// Payload decoding error
    Decode(DecodeError),
    /// Payload encoding error
    Encode(EncodeError),
    /// Handshake failure (fatal to the connection)
    Handshake(HandshakeError),
    /// Connection was closed
    ConnectionClosed,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Framing(e) => write!(f, "Framing error: {}", e),
            Error::Decode(e) => write!(f, "Decode error: {}", e),
            Error::Encode(e) => write!(f, "Encode error: {}", e),
            Error::Handshake(e) => write!(f, "Handshake error: {}", e),
            Error::ConnectionClosed => write!(f, "Connection closed"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl Error {
    /// Whether this error leaves the connection in an unusable state.
    ///
    /// Framing and handshake errors invalidate chunk-offset or exchange
    /// state; decode errors are scoped to one message payload.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Io(_) | Error::Framing(_) | Error::Handshake(_) | Error::ConnectionClosed
        )
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<FramingError> for Error {
    fn from(err: FramingError) -> Self {
        Error::Framing(err)
    }
}

impl From<DecodeError> for Error {
    fn from(err: DecodeError) -> Self {
        Error::Decode(err)
    }
}

impl From<EncodeError> for Error {
    fn from(err: EncodeError) -> Self {
        Error::Encode(err)
    }
}

impl From<HandshakeError> for Error {
    fn from(err: HandshakeError) -> Self {
        Error::Handshake(err)
    }
}

/// Chunk-layer framing errors
///
/// All of these are fatal: once a chunk boundary is lost the byte offsets
/// of everything that follows are undeterminable.
#[derive(Debug)]
pub enum FramingError {
    /// Compacted header (fmt 1-3) on a chunk stream with no prior full header
    ContinuationWithoutHeader { csid: u32, format: u8 },
    /// New message header arrived while a message was still accumulating
    HeaderMidMessage { csid: u32, format: u8 },
    /// Declared message length exceeds the sanity limit
    MessageTooLarge { size: u32, max: u32 },
    /// Peer announced an unusable chunk size
    InvalidChunkSize(u32),
}

impl fmt::Display for FramingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FramingError::ContinuationWithoutHeader { csid, format } => {
                write!(f, "fmt {} chunk on csid {} with no prior header", format, csid)
            }
            FramingError::HeaderMidMessage { csid, format } => {
                write!(f, "fmt {} header on csid {} mid-message", format, csid)
            }
            FramingError::MessageTooLarge { size, max } => {
                write!(f, "Message too large: {} bytes (max {})", size, max)
            }
            FramingError::InvalidChunkSize(size) => {
                write!(f, "Invalid chunk size: {}", size)
            }
        }
    }
}

impl std::error::Error for FramingError {}

/// Payload decoding errors (AMF values and fixed-layout control messages)
#[derive(Debug)]
pub enum DecodeError {
    /// Marker byte outside the known set
    UnknownMarker(u8),
    /// Marker is defined by the format but not representable here
    /// (AMF3 vectors/dictionary, AMF0 reserved markers)
    UnsupportedMarker(u8),
    /// Input ended before the value did
    UnexpectedEof,
    /// String bytes are not valid UTF-8
    InvalidUtf8,
    /// Back-reference index beyond the reference table
    InvalidReference(u32),
    /// Trait reference index beyond the trait table
    InvalidTraitReference(u32),
    /// Externalizable trait: member layout is class-defined, undecodable
    Externalizable,
    /// Object/array nesting beyond the depth limit
    NestingTooDeep,
    /// AMF0 object terminated without the end marker
    InvalidObjectEnd,
    /// Message type id outside the known set
    UnknownMessageType(u8),
    /// Peer bandwidth limit type outside {hard, soft, dynamic}
    InvalidLimitType(u8),
    /// Fixed-layout control message shorter than its declared layout
    TruncatedControl { message_type: u8, len: usize },
    /// Command payload did not start with a name value
    InvalidCommand(&'static str),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::UnknownMarker(m) => write!(f, "Unknown AMF marker: 0x{:02x}", m),
            DecodeError::UnsupportedMarker(m) => write!(f, "Unsupported AMF marker: 0x{:02x}", m),
            DecodeError::UnexpectedEof => write!(f, "Unexpected end of input"),
            DecodeError::InvalidUtf8 => write!(f, "Invalid UTF-8 in AMF string"),
            DecodeError::InvalidReference(idx) => write!(f, "Invalid AMF reference: {}", idx),
            DecodeError::InvalidTraitReference(idx) => {
                write!(f, "Invalid AMF trait reference: {}", idx)
            }
            DecodeError::Externalizable => write!(f, "Externalizable AMF object"),
            DecodeError::NestingTooDeep => write!(f, "AMF nesting too deep"),
            DecodeError::InvalidObjectEnd => write!(f, "Invalid object end marker"),
            DecodeError::UnknownMessageType(t) => write!(f, "Unknown message type: {}", t),
            DecodeError::InvalidLimitType(t) => write!(f, "Invalid bandwidth limit type: {}", t),
            DecodeError::TruncatedControl { message_type, len } => {
                write!(f, "Truncated control message: type {} with {} bytes", message_type, len)
            }
            DecodeError::InvalidCommand(what) => write!(f, "Invalid command: {}", what),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Payload encoding errors
#[derive(Debug)]
pub enum EncodeError {
    /// Value above the 29-bit range
    U29OutOfRange(u32),
    /// Host value the target format cannot represent
    UnsupportedValue(&'static str),
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodeError::U29OutOfRange(v) => {
                write!(f, "Value 0x{:x} exceeds the 29-bit integer range", v)
            }
            EncodeError::UnsupportedValue(kind) => {
                write!(f, "Value kind {} is not representable in this format", kind)
            }
        }
    }
}

impl std::error::Error for EncodeError {}

/// Handshake-specific errors
#[derive(Debug)]
pub enum HandshakeError {
    /// Version byte outside the supported set
    InvalidVersion(u8),
    /// Echoed payload does not match what was sent
    EchoMismatch,
    /// Operation attempted in the wrong handshake state
    InvalidState,
}

impl fmt::Display for HandshakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandshakeError::InvalidVersion(v) => write!(f, "Invalid RTMP version: {}", v),
            HandshakeError::EchoMismatch => write!(f, "Handshake echo mismatch"),
            HandshakeError::InvalidState => write!(f, "Invalid handshake state"),
        }
    }
}

impl std::error::Error for HandshakeError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as StdError;
    use std::io;

    #[test]
    fn test_error_display() {
        let io_err = io::Error::new(io::ErrorKind::ConnectionReset, "connection reset");
        let err = Error::Io(io_err);
        assert!(err.to_string().contains("I/O error"));

        let err = Error::Framing(FramingError::ContinuationWithoutHeader { csid: 5, format: 3 });
        assert!(err.to_string().contains("Framing error"));
        assert!(err.to_string().contains("csid 5"));

        let err = Error::Decode(DecodeError::UnknownMarker(0xFF));
        assert!(err.to_string().contains("Decode error"));
        assert!(err.to_string().contains("0xff"));

        let err = Error::Encode(EncodeError::U29OutOfRange(0x4000_0000));
        assert!(err.to_string().contains("29-bit"));

        let err = Error::Handshake(HandshakeError::InvalidVersion(5));
        assert!(err.to_string().contains("Handshake error"));
        assert!(err.to_string().contains("5"));

        let err = Error::ConnectionClosed;
        assert!(err.to_string().contains("closed"));
    }

    #[test]
    fn test_error_source() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "gone");
        let err = Error::Io(io_err);
        assert!(StdError::source(&err).is_some());

        let err = Error::Decode(DecodeError::UnexpectedEof);
        assert!(StdError::source(&err).is_none());
    }

    #[test]
    fn test_from_conversions() {
        let err: Error = io::Error::new(io::ErrorKind::TimedOut, "timeout").into();
        assert!(matches!(err, Error::Io(_)));

        let err: Error = FramingError::MessageTooLarge { size: 100, max: 50 }.into();
        assert!(matches!(err, Error::Framing(_)));

        let err: Error = DecodeError::UnexpectedEof.into();
        assert!(matches!(err, Error::Decode(_)));

        let err: Error = EncodeError::UnsupportedValue("ByteArray").into();
        assert!(matches!(err, Error::Encode(_)));

        let err: Error = HandshakeError::EchoMismatch.into();
        assert!(matches!(err, Error::Handshake(_)));
    }

    #[test]
    fn test_fatality() {
        assert!(Error::Framing(FramingError::InvalidChunkSize(0)).is_fatal());
        assert!(Error::Handshake(HandshakeError::EchoMismatch).is_fatal());
        assert!(Error::ConnectionClosed.is_fatal());
        assert!(!Error::Decode(DecodeError::UnknownMarker(0x55)).is_fatal());
        assert!(!Error::Encode(EncodeError::U29OutOfRange(0)).is_fatal());
    }
}
