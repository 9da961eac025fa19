//! RTMP protocol constants
//!
//! Reference: Adobe RTMP Specification (December 2012)
//! Reference: RFC 7425 - Adobe's RTMP (Informational)

/// RTMP version number (always 3 for standard RTMP)
pub const RTMP_VERSION: u8 = 3;

/// Default RTMP port
pub const RTMP_PORT: u16 = 1935;

/// Handshake packet sizes
pub const HANDSHAKE_SIZE: usize = 1536;

/// Default chunk size (per RTMP spec)
pub const DEFAULT_CHUNK_SIZE: u32 = 128;

/// Maximum chunk size allowed
pub const MAX_CHUNK_SIZE: u32 = 0xFFFFFF; // 16MB

/// Maximum message size (sanity limit)
pub const MAX_MESSAGE_SIZE: u32 = 16 * 1024 * 1024; // 16MB

/// Extended timestamp threshold
/// Timestamps >= this value require extended timestamp field
pub const EXTENDED_TIMESTAMP_THRESHOLD: u32 = 0xFFFFFF;

// ============================================================================
// Chunk Stream IDs (CSID)
// RTMP spec section 5.3.1.1
// ============================================================================

/// Protocol control messages (Set Chunk Size, Abort, etc.)
pub const CSID_PROTOCOL_CONTROL: u32 = 2;

/// Command messages (connect, createStream, etc.)
pub const CSID_COMMAND: u32 = 3;

/// Audio data
pub const CSID_AUDIO: u32 = 4;

/// Video data
pub const CSID_VIDEO: u32 = 6;

// ============================================================================
// Message Type IDs
// RTMP spec section 5.4
// ============================================================================

/// Set Chunk Size (1) - protocol control
pub const MSG_SET_CHUNK_SIZE: u8 = 1;

/// Abort Message (2) - protocol control
pub const MSG_ABORT: u8 = 2;

/// Acknowledgement (3) - protocol control
pub const MSG_ACKNOWLEDGEMENT: u8 = 3;

/// User Control Message (4) - protocol control
pub const MSG_USER_CONTROL: u8 = 4;

/// Window Acknowledgement Size (5) - protocol control
pub const MSG_WINDOW_ACK_SIZE: u8 = 5;

/// Set Peer Bandwidth (6) - protocol control
pub const MSG_SET_PEER_BANDWIDTH: u8 = 6;

/// Audio Message (8)
pub const MSG_AUDIO: u8 = 8;

/// Video Message (9)
pub const MSG_VIDEO: u8 = 9;

/// AMF3 Data Message (15)
pub const MSG_DATA_AMF3: u8 = 15;

/// AMF3 Shared Object (16)
pub const MSG_SHARED_OBJECT_AMF3: u8 = 16;

/// AMF3 Command Message (17)
pub const MSG_COMMAND_AMF3: u8 = 17;

/// AMF0 Data Message (18) - @setDataFrame, onMetaData
pub const MSG_DATA_AMF0: u8 = 18;

/// AMF0 Shared Object (19)
pub const MSG_SHARED_OBJECT_AMF0: u8 = 19;

/// AMF0 Command Message (20) - connect, play, publish, etc.
pub const MSG_COMMAND_AMF0: u8 = 20;

/// Aggregate Message (22)
pub const MSG_AGGREGATE: u8 = 22;

// ============================================================================
// User Control Event Types
// RTMP spec section 5.4.1
// ============================================================================

/// Stream Begin - server sends when stream becomes functional
pub const UC_STREAM_BEGIN: u16 = 0;

/// Stream EOF - server sends when playback ends
pub const UC_STREAM_EOF: u16 = 1;

/// Stream Dry - no more data available
pub const UC_STREAM_DRY: u16 = 2;

/// Set Buffer Length - client tells server buffer size
pub const UC_SET_BUFFER_LENGTH: u16 = 3;

/// Stream Is Recorded - stream is recorded
pub const UC_STREAM_IS_RECORDED: u16 = 4;

/// Ping Request - server pings client
pub const UC_PING_REQUEST: u16 = 6;

/// Ping Response - client responds to ping
pub const UC_PING_RESPONSE: u16 = 7;

// ============================================================================
// Chunk Header Format Types (fmt field)
// RTMP spec section 5.3.1.2
// ============================================================================

/// Type 0: Full header (11 bytes) - timestamp, length, type, stream ID
pub const CHUNK_FMT_0: u8 = 0;

/// Type 1: No stream ID (7 bytes) - timestamp delta, length, type
pub const CHUNK_FMT_1: u8 = 1;

/// Type 2: No stream ID, length, type (3 bytes) - timestamp delta only
pub const CHUNK_FMT_2: u8 = 2;

/// Type 3: No header (0 bytes) - use previous chunk's values
pub const CHUNK_FMT_3: u8 = 3;
