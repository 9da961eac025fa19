//! RTMP chunk stream codec
//!
//! RTMP messages are split into chunks for multiplexing. Each chunk has a
//! header that identifies the chunk stream and message being sent.
//!
//! ```text
//! Chunk Format:
//! +-------------+-----------------+-------------------+
//! | Basic Header| Message Header  | Chunk Data        |
//! | (1-3 bytes) | (0,3,7,11 bytes)| (variable)        |
//! +-------------+-----------------+-------------------+
//!
//! Basic Header formats:
//! - 1 byte:  fmt(2) + csid(6)        for csid 2-63
//! - 2 bytes: fmt(2) + 0 + csid(8)    for csid 64-319
//! - 3 bytes: fmt(2) + 1 + csid(16)   for csid 64-65599
//!
//! Message Header formats (based on fmt):
//! - Type 0 (11 bytes): timestamp(3) + length(3) + type(1) + stream_id(4, LE)
//! - Type 1 (7 bytes):  timestamp_delta(3) + length(3) + type(1)
//! - Type 2 (3 bytes):  timestamp_delta(3)
//! - Type 3 (0 bytes):  (use previous chunk's values)
//!
//! Extended timestamp (4 bytes) is appended when the 24-bit field reads
//! 0xFFFFFF, on first and continuation chunks alike.
//! ```
//!
//! Reference: RTMP Specification Section 5.3

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::collections::HashMap;

use crate::error::{FramingError, Result};
use crate::protocol::constants::*;

/// A complete RTMP message (reassembled from chunks)
#[derive(Debug, Clone)]
pub struct RtmpChunk {
    /// Chunk stream ID (for multiplexing)
    pub csid: u32,
    /// Message timestamp (milliseconds)
    pub timestamp: u32,
    /// Message type ID
    pub message_type: u8,
    /// Message stream ID
    pub stream_id: u32,
    /// Message payload
    pub payload: Bytes,
}

/// Per-chunk-stream state
///
/// Created on the first chunk referencing a csid, mutated on every chunk,
/// never destroyed. At most one message accumulates per csid at a time.
#[derive(Debug, Clone, Default)]
struct ChunkStreamState {
    /// Last absolute timestamp
    timestamp: u32,
    /// Last timestamp delta
    timestamp_delta: u32,
    /// Last message length
    message_length: u32,
    /// Last message type
    message_type: u8,
    /// Last message stream ID
    stream_id: u32,
    /// Whether the last header carried an extended timestamp
    has_extended_timestamp: bool,
    /// Buffer for partial message reassembly
    partial_message: BytesMut,
    /// Expected total length of current message
    expected_length: u32,
}

/// Chunk stream decoder
///
/// Handles chunk demultiplexing and message reassembly. Chunks for
/// different csids may interleave arbitrarily; state is keyed purely
/// by csid.
pub struct ChunkDecoder {
    /// Maximum incoming chunk size
    chunk_size: u32,
    /// Per-chunk-stream state
    streams: HashMap<u32, ChunkStreamState>,
    /// Maximum message size (sanity limit)
    max_message_size: u32,
}

impl ChunkDecoder {
    /// Create a new decoder with default chunk size
    pub fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            streams: HashMap::new(),
            max_message_size: MAX_MESSAGE_SIZE,
        }
    }

    /// Set the chunk size (called when receiving SetChunkSize message).
    /// Takes effect at the next chunk boundary, never retroactively.
    pub fn set_chunk_size(&mut self, size: u32) {
        self.chunk_size = size.min(MAX_CHUNK_SIZE);
    }

    /// Get current chunk size
    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// Try to decode a complete message from the buffer
    ///
    /// Returns Ok(Some(chunk)) if a complete message was reassembled,
    /// Ok(None) if more data is needed, or Err on a framing violation.
    /// The buffer is only consumed when an entire chunk (headers and
    /// payload slice) is present, so partial input never corrupts state.
    pub fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<RtmpChunk>> {
        let (fmt, csid, basic_len) = match parse_basic_header(buf) {
            Some(v) => v,
            None => return Ok(None),
        };

        // Copy out the previous header for this csid; compacted formats
        // are meaningless without one.
        let (prev, already) = match self.streams.get(&csid) {
            Some(s) => (Some((s.timestamp, s.timestamp_delta, s.message_length, s.message_type, s.stream_id, s.has_extended_timestamp)), s.partial_message.len() as u32),
            None => (None, 0),
        };

        if prev.is_none() && fmt != CHUNK_FMT_0 {
            return Err(FramingError::ContinuationWithoutHeader { csid, format: fmt }.into());
        }
        let continuation = already > 0;
        if continuation && fmt != CHUNK_FMT_3 {
            return Err(FramingError::HeaderMidMessage { csid, format: fmt }.into());
        }

        let (prev_ts, prev_delta, prev_len, prev_type, prev_sid, prev_ext) =
            prev.unwrap_or((0, 0, 0, 0, 0, false));

        let msg_header_len = match fmt {
            CHUNK_FMT_0 => 11,
            CHUNK_FMT_1 => 7,
            CHUNK_FMT_2 => 3,
            _ => 0,
        };
        if buf.len() < basic_len + msg_header_len {
            return Ok(None);
        }

        let hdr = &buf[basic_len..basic_len + msg_header_len];
        let (ts_field, message_length, message_type, stream_id) = match fmt {
            CHUNK_FMT_0 => (
                read_u24(&hdr[0..3]),
                read_u24(&hdr[3..6]),
                hdr[6],
                u32::from_le_bytes([hdr[7], hdr[8], hdr[9], hdr[10]]),
            ),
            CHUNK_FMT_1 => (read_u24(&hdr[0..3]), read_u24(&hdr[3..6]), hdr[6], prev_sid),
            CHUNK_FMT_2 => (read_u24(&hdr[0..3]), prev_len, prev_type, prev_sid),
            _ => (prev_delta, prev_len, prev_type, prev_sid),
        };

        // Extended timestamp: present when the 24-bit field is saturated;
        // fmt 3 chunks carry it whenever the message's header did.
        let has_extended = if fmt == CHUNK_FMT_3 {
            prev_ext
        } else {
            ts_field >= EXTENDED_TIMESTAMP_THRESHOLD
        };
        let ext_len = if has_extended { 4 } else { 0 };
        if buf.len() < basic_len + msg_header_len + ext_len {
            return Ok(None);
        }

        let ts_value = if has_extended {
            let e = &buf[basic_len + msg_header_len..basic_len + msg_header_len + 4];
            u32::from_be_bytes([e[0], e[1], e[2], e[3]])
        } else {
            ts_field
        };

        if message_length > self.max_message_size {
            return Err(FramingError::MessageTooLarge {
                size: message_length,
                max: self.max_message_size,
            }
            .into());
        }

        let remaining = message_length - already;
        let chunk_data_len = remaining.min(self.chunk_size) as usize;

        let total = basic_len + msg_header_len + ext_len + chunk_data_len;
        if buf.len() < total {
            return Ok(None);
        }

        // The whole chunk is present: consume and commit.
        buf.advance(basic_len + msg_header_len + ext_len);

        let state = self.streams.entry(csid).or_default();

        if !continuation {
            // Starting a new message: fmt 1/2 apply the delta, a fmt 3
            // start re-applies the stored delta.
            let absolute = if fmt == CHUNK_FMT_0 {
                ts_value
            } else {
                prev_ts.wrapping_add(ts_value)
            };
            state.timestamp = absolute;
            // After a fmt 0 chunk the stored delta is its absolute
            // timestamp (RTMP spec 5.3.1.2.4)
            if fmt != CHUNK_FMT_3 {
                state.timestamp_delta = ts_value;
                state.has_extended_timestamp = has_extended;
            }
            state.message_length = message_length;
            state.message_type = message_type;
            state.stream_id = stream_id;
            state.expected_length = message_length;
            state.partial_message.reserve(message_length as usize);
        }

        state.partial_message.put_slice(&buf[..chunk_data_len]);
        buf.advance(chunk_data_len);

        if state.partial_message.len() as u32 >= state.expected_length {
            let payload = state.partial_message.split().freeze();
            state.expected_length = 0;

            Ok(Some(RtmpChunk {
                csid,
                timestamp: state.timestamp,
                message_type: state.message_type,
                stream_id: state.stream_id,
                payload,
            }))
        } else {
            Ok(None) // message not yet complete
        }
    }

    /// Abort a message on a chunk stream (when receiving Abort message)
    pub fn abort(&mut self, csid: u32) {
        if let Some(state) = self.streams.get_mut(&csid) {
            state.partial_message.clear();
            state.expected_length = 0;
        }
    }
}

impl Default for ChunkDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Chunk stream encoder
///
/// Encodes messages into chunks for transmission, compacting headers
/// against each csid's stored previous header.
pub struct ChunkEncoder {
    /// Outgoing chunk size
    chunk_size: u32,
    /// Per-chunk-stream state for header compaction
    streams: HashMap<u32, ChunkStreamState>,
}

impl ChunkEncoder {
    /// Create a new encoder with default chunk size
    pub fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            streams: HashMap::new(),
        }
    }

    /// Set the outgoing chunk size. Takes effect with the next message;
    /// already-emitted bytes are never refragmented.
    pub fn set_chunk_size(&mut self, size: u32) {
        self.chunk_size = size.min(MAX_CHUNK_SIZE);
    }

    /// Get current chunk size
    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// Encode a message into chunks, appending to `buf`
    pub fn encode(&mut self, chunk: &RtmpChunk, buf: &mut BytesMut) -> Result<()> {
        let csid = chunk.csid;
        let payload_len = chunk.payload.len() as u32;

        // The length field is 24 bits
        if payload_len > EXTENDED_TIMESTAMP_THRESHOLD {
            return Err(FramingError::MessageTooLarge {
                size: payload_len,
                max: EXTENDED_TIMESTAMP_THRESHOLD,
            }
            .into());
        }

        let fmt = match self.streams.get(&csid) {
            None => CHUNK_FMT_0,
            Some(state) => select_format(chunk, payload_len, state),
        };

        let prev = self.streams.get(&csid);
        let prev_ts = prev.map(|s| s.timestamp).unwrap_or(0);
        let prev_ext = prev.map(|s| s.has_extended_timestamp).unwrap_or(false);

        let delta = chunk.timestamp.wrapping_sub(prev_ts);
        // Field value: absolute for fmt 0, delta otherwise
        let ts_value = if fmt == CHUNK_FMT_0 { chunk.timestamp } else { delta };
        let needs_extended = if fmt == CHUNK_FMT_3 {
            prev_ext
        } else {
            ts_value >= EXTENDED_TIMESTAMP_THRESHOLD
        };
        let ts_field = if needs_extended {
            EXTENDED_TIMESTAMP_THRESHOLD
        } else {
            ts_value
        };

        // Update state before emitting
        let state = self.streams.entry(csid).or_default();
        state.timestamp = chunk.timestamp;
        if fmt != CHUNK_FMT_3 {
            // After fmt 0 the stored delta is the absolute timestamp,
            // mirroring the decoder
            state.timestamp_delta = ts_value;
            state.has_extended_timestamp = needs_extended;
        }
        state.message_length = payload_len;
        state.message_type = chunk.message_type;
        state.stream_id = chunk.stream_id;

        let chunk_size = self.chunk_size as usize;
        let payload = &chunk.payload;
        let mut offset = 0;
        let mut first_chunk = true;

        loop {
            let chunk_data_len = (payload.len() - offset).min(chunk_size);

            write_basic_header(csid, if first_chunk { fmt } else { CHUNK_FMT_3 }, buf);

            if first_chunk {
                match fmt {
                    CHUNK_FMT_0 => {
                        write_u24(ts_field, buf);
                        write_u24(payload_len, buf);
                        buf.put_u8(chunk.message_type);
                        buf.put_u32_le(chunk.stream_id);
                    }
                    CHUNK_FMT_1 => {
                        write_u24(ts_field, buf);
                        write_u24(payload_len, buf);
                        buf.put_u8(chunk.message_type);
                    }
                    CHUNK_FMT_2 => {
                        write_u24(ts_field, buf);
                    }
                    _ => {}
                }
            }

            if needs_extended {
                buf.put_u32(ts_value);
            }

            buf.put_slice(&payload[offset..offset + chunk_data_len]);
            offset += chunk_data_len;
            first_chunk = false;

            if offset >= payload.len() {
                break;
            }
        }

        Ok(())
    }
}

impl Default for ChunkEncoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Select the smallest header format valid against the stored state
fn select_format(chunk: &RtmpChunk, payload_len: u32, state: &ChunkStreamState) -> u8 {
    // A different message stream needs a full header
    if chunk.stream_id != state.stream_id {
        return CHUNK_FMT_0;
    }

    // Timestamp going backwards cannot be expressed as a delta
    if chunk.timestamp < state.timestamp {
        return CHUNK_FMT_0;
    }

    if chunk.message_type != state.message_type || payload_len != state.message_length {
        return CHUNK_FMT_1;
    }

    // Identical delta: everything comes from the stored header
    let delta = chunk.timestamp.wrapping_sub(state.timestamp);
    if delta == state.timestamp_delta {
        return CHUNK_FMT_3;
    }

    CHUNK_FMT_2
}

/// Parse basic header, returning (fmt, csid, header_length).
/// Returns None when the buffer does not yet hold the full header.
fn parse_basic_header(buf: &[u8]) -> Option<(u8, u32, usize)> {
    if buf.is_empty() {
        return None;
    }

    let first = buf[0];
    let fmt = (first >> 6) & 0x03;
    let csid_low = first & 0x3F;

    match csid_low {
        0 => {
            // 2-byte header: csid = 64 + second byte
            if buf.len() < 2 {
                return None;
            }
            Some((fmt, 64 + buf[1] as u32, 2))
        }
        1 => {
            // 3-byte header: csid = 64 + second + third*256
            if buf.len() < 3 {
                return None;
            }
            Some((fmt, 64 + buf[1] as u32 + (buf[2] as u32) * 256, 3))
        }
        _ => Some((fmt, csid_low as u32, 1)),
    }
}

/// Write basic header, picking the smallest encoding for the csid
fn write_basic_header(csid: u32, fmt: u8, buf: &mut BytesMut) {
    if csid >= 64 + 256 {
        // 3-byte header
        buf.put_u8((fmt << 6) | 1);
        let csid_offset = csid - 64;
        buf.put_u8((csid_offset & 0xFF) as u8);
        buf.put_u8(((csid_offset >> 8) & 0xFF) as u8);
    } else if csid >= 64 {
        // 2-byte header
        buf.put_u8(fmt << 6);
        buf.put_u8((csid - 64) as u8);
    } else {
        // 1-byte header
        buf.put_u8((fmt << 6) | (csid as u8));
    }
}

/// Read 24-bit big-endian value
fn read_u24(bytes: &[u8]) -> u32 {
    ((bytes[0] as u32) << 16) | ((bytes[1] as u32) << 8) | (bytes[2] as u32)
}

/// Write 24-bit big-endian value
fn write_u24(value: u32, buf: &mut BytesMut) {
    buf.put_u8(((value >> 16) & 0xFF) as u8);
    buf.put_u8(((value >> 8) & 0xFF) as u8);
    buf.put_u8((value & 0xFF) as u8);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn chunk(csid: u32, timestamp: u32, message_type: u8, stream_id: u32, payload: &[u8]) -> RtmpChunk {
        RtmpChunk {
            csid,
            timestamp,
            message_type,
            stream_id,
            payload: Bytes::copy_from_slice(payload),
        }
    }

    #[test]
    fn test_basic_header_parsing() {
        // 1-byte header (csid 2-63)
        assert_eq!(parse_basic_header(&[0x03]), Some((0, 3, 1)));

        // 2-byte header (csid 64-319)
        assert_eq!(parse_basic_header(&[0x00, 0x00]), Some((0, 64, 2)));
        assert_eq!(parse_basic_header(&[0x00, 0xFF]), Some((0, 319, 2)));

        // 3-byte header (csid 320-65855)
        assert_eq!(parse_basic_header(&[0x01, 0x00, 0x01]), Some((0, 320, 3)));

        // fmt bits
        assert_eq!(parse_basic_header(&[0xC3]), Some((3, 3, 1)));

        // Incomplete multi-byte headers
        assert_eq!(parse_basic_header(&[0x00]), None);
        assert_eq!(parse_basic_header(&[0x01, 0x00]), None);
    }

    #[test]
    fn test_basic_header_roundtrip() {
        for &csid in &[2, 3, 63, 64, 319, 320, 65855] {
            let mut buf = BytesMut::new();
            write_basic_header(csid, 0, &mut buf);
            let (_, parsed, len) = parse_basic_header(&buf).unwrap();
            assert_eq!(parsed, csid);
            assert_eq!(len, buf.len());
        }
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let original = chunk(CSID_COMMAND, 1000, MSG_COMMAND_AMF0, 0, b"test payload data");

        let mut encoder = ChunkEncoder::new();
        let mut decoder = ChunkDecoder::new();

        let mut encoded = BytesMut::new();
        encoder.encode(&original, &mut encoded).unwrap();

        let decoded = decoder.decode(&mut encoded).unwrap().unwrap();

        assert_eq!(decoded.csid, original.csid);
        assert_eq!(decoded.timestamp, original.timestamp);
        assert_eq!(decoded.message_type, original.message_type);
        assert_eq!(decoded.stream_id, original.stream_id);
        assert_eq!(decoded.payload, original.payload);
        assert!(encoded.is_empty());
    }

    #[test]
    fn test_large_message_chunking() {
        let large_payload = vec![0xABu8; 500]; // larger than default chunk size

        let original = chunk(CSID_VIDEO, 0, MSG_VIDEO, 1, &large_payload);

        let mut encoder = ChunkEncoder::new();
        let mut decoder = ChunkDecoder::new();

        let mut encoded = BytesMut::new();
        encoder.encode(&original, &mut encoded).unwrap();

        // ceil(500/128) = 4 chunks: one 12-byte full header, three 1-byte
        // continuation headers
        assert_eq!(encoded.len(), 500 + 12 + 3);

        let decoded = decoder.decode(&mut encoded).unwrap().unwrap();
        assert_eq!(decoded.payload.len(), 500);
        assert_eq!(&decoded.payload[..], &large_payload[..]);
    }

    #[test]
    fn test_zero_length_message() {
        let original = chunk(CSID_COMMAND, 5, MSG_COMMAND_AMF0, 0, b"");

        let mut encoder = ChunkEncoder::new();
        let mut decoder = ChunkDecoder::new();

        let mut encoded = BytesMut::new();
        encoder.encode(&original, &mut encoded).unwrap();
        assert_eq!(encoded.len(), 12); // header-only chunk

        let decoded = decoder.decode(&mut encoded).unwrap().unwrap();
        assert!(decoded.payload.is_empty());
        assert_eq!(decoded.timestamp, 5);
    }

    #[test]
    fn test_incremental_decode() {
        let original = chunk(CSID_AUDIO, 77, MSG_AUDIO, 1, &vec![0x11u8; 300]);

        let mut encoder = ChunkEncoder::new();
        let mut encoded = BytesMut::new();
        encoder.encode(&original, &mut encoded).unwrap();

        // Feed the stream one byte at a time; only the final byte may
        // complete the message
        let mut decoder = ChunkDecoder::new();
        let mut buf = BytesMut::new();
        let mut result = None;
        let total = encoded.len();
        for (i, byte) in encoded.iter().enumerate() {
            buf.put_u8(*byte);
            if let Some(msg) = decoder.decode(&mut buf).unwrap() {
                assert_eq!(i, total - 1);
                result = Some(msg);
            }
        }

        let msg = result.expect("message should complete on the last byte");
        assert_eq!(msg.payload.len(), 300);
        assert_eq!(msg.timestamp, 77);
    }

    #[test]
    fn test_interleaved_chunk_streams() {
        // Two 200-byte messages on different csids, chunks interleaved
        let a = chunk(3, 10, MSG_COMMAND_AMF0, 0, &vec![0xAAu8; 200]);
        let b = chunk(4, 20, MSG_AUDIO, 1, &vec![0xBBu8; 200]);

        let mut encoder = ChunkEncoder::new();
        let mut enc_a = BytesMut::new();
        encoder.encode(&a, &mut enc_a).unwrap();
        let mut enc_b = BytesMut::new();
        encoder.encode(&b, &mut enc_b).unwrap();

        // Chunk boundaries: 12-byte header + 128 payload, then 1 + 72
        let a1 = enc_a.split_to(12 + 128);
        let b1 = enc_b.split_to(12 + 128);

        let mut wire = BytesMut::new();
        wire.extend_from_slice(&a1);
        wire.extend_from_slice(&b1);
        wire.extend_from_slice(&enc_a);
        wire.extend_from_slice(&enc_b);

        let mut decoder = ChunkDecoder::new();
        let mut out = Vec::new();
        while let Some(msg) = decoder.decode(&mut wire).unwrap() {
            out.push(msg);
        }

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].csid, 3);
        assert_eq!(out[0].payload, a.payload);
        assert_eq!(out[1].csid, 4);
        assert_eq!(out[1].payload, b.payload);
    }

    #[test]
    fn test_continuation_without_header_fails() {
        let mut decoder = ChunkDecoder::new();
        // fmt 3, csid 5, but csid 5 has never seen a full header
        let mut buf = BytesMut::from(&[0xC5u8][..]);
        let err = decoder.decode(&mut buf).unwrap_err();
        assert!(matches!(
            err,
            Error::Framing(FramingError::ContinuationWithoutHeader { csid: 5, format: 3 })
        ));
    }

    #[test]
    fn test_header_mid_message_fails() {
        let original = chunk(3, 0, MSG_VIDEO, 1, &vec![0u8; 200]);

        let mut encoder = ChunkEncoder::new();
        let mut encoded = BytesMut::new();
        encoder.encode(&original, &mut encoded).unwrap();

        let mut decoder = ChunkDecoder::new();
        // Feed only the first chunk, leaving the message mid-accumulation
        let mut first = encoded.split_to(12 + 128);
        assert!(decoder.decode(&mut first).unwrap().is_none());

        // A fresh fmt 0 header on the same csid now violates framing
        let mut rogue = BytesMut::new();
        encoder.encode(&chunk(3, 1, MSG_VIDEO, 1, b"xx"), &mut rogue).unwrap();
        // Rewrite first byte to fmt 0 to force a header
        rogue[0] = 0x03;
        let err = decoder.decode(&mut rogue).unwrap_err();
        assert!(matches!(
            err,
            Error::Framing(FramingError::HeaderMidMessage { csid: 3, format: 0 })
        ));
    }

    #[test]
    fn test_extended_timestamp_roundtrip() {
        let original = chunk(3, 0x0100_0000, MSG_VIDEO, 1, &vec![7u8; 200]);

        let mut encoder = ChunkEncoder::new();
        let mut decoder = ChunkDecoder::new();

        let mut encoded = BytesMut::new();
        encoder.encode(&original, &mut encoded).unwrap();

        // Extended field present on the first chunk and the continuation
        assert_eq!(encoded.len(), (12 + 4 + 128) + (1 + 4 + 72));

        let decoded = decoder.decode(&mut encoded).unwrap().unwrap();
        assert_eq!(decoded.timestamp, 0x0100_0000);
        assert_eq!(decoded.payload.len(), 200);
    }

    #[test]
    fn test_header_compaction_repeated_messages() {
        let mut encoder = ChunkEncoder::new();
        let mut decoder = ChunkDecoder::new();

        // Same csid, type, length, stream id, and delta: the second
        // message compacts to a type 3 header
        let first = chunk(4, 0, MSG_AUDIO, 1, &[1u8; 10]);
        let second = chunk(4, 0, MSG_AUDIO, 1, &[2u8; 10]);

        let mut buf1 = BytesMut::new();
        encoder.encode(&first, &mut buf1).unwrap();
        assert_eq!(buf1.len(), 12 + 10);

        let mut buf2 = BytesMut::new();
        encoder.encode(&second, &mut buf2).unwrap();
        assert_eq!(buf2.len(), 1 + 10);

        let d1 = decoder.decode(&mut buf1).unwrap().unwrap();
        let d2 = decoder.decode(&mut buf2).unwrap().unwrap();
        assert_eq!(d1.timestamp, 0);
        assert_eq!(d2.timestamp, 0);
        assert_eq!(d2.payload[0], 2);
    }

    #[test]
    fn test_format_selection_on_length_change() {
        let mut encoder = ChunkEncoder::new();
        let mut decoder = ChunkDecoder::new();

        let first = chunk(4, 100, MSG_AUDIO, 1, &[0u8; 20]);
        let second = chunk(4, 150, MSG_AUDIO, 1, &[0u8; 30]);

        let mut buf = BytesMut::new();
        encoder.encode(&first, &mut buf).unwrap();
        encoder.encode(&second, &mut buf).unwrap();

        // Second message: type 1 header (7 bytes) + basic (1)
        assert_eq!(buf.len(), (12 + 20) + (8 + 30));

        let d1 = decoder.decode(&mut buf).unwrap().unwrap();
        let d2 = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(d1.timestamp, 100);
        assert_eq!(d2.timestamp, 150);
        assert_eq!(d2.payload.len(), 30);
    }

    #[test]
    fn test_negotiated_chunk_size() {
        let mut encoder = ChunkEncoder::new();
        let mut decoder = ChunkDecoder::new();
        encoder.set_chunk_size(4096);
        decoder.set_chunk_size(4096);

        let original = chunk(6, 0, MSG_VIDEO, 1, &vec![9u8; 3000]);
        let mut encoded = BytesMut::new();
        encoder.encode(&original, &mut encoded).unwrap();

        // Fits in a single chunk at the larger size
        assert_eq!(encoded.len(), 12 + 3000);

        let decoded = decoder.decode(&mut encoded).unwrap().unwrap();
        assert_eq!(decoded.payload.len(), 3000);
    }

    #[test]
    fn test_abort_clears_partial_message() {
        let original = chunk(3, 0, MSG_VIDEO, 1, &vec![0u8; 200]);

        let mut encoder = ChunkEncoder::new();
        let mut encoded = BytesMut::new();
        encoder.encode(&original, &mut encoded).unwrap();

        let mut decoder = ChunkDecoder::new();
        let mut first = encoded.split_to(12 + 128);
        assert!(decoder.decode(&mut first).unwrap().is_none());

        decoder.abort(3);

        // A new message on the csid decodes cleanly after the abort
        let fresh = chunk(3, 10, MSG_VIDEO, 1, b"clean");
        let mut encoder2 = ChunkEncoder::new();
        let mut buf = BytesMut::new();
        encoder2.encode(&fresh, &mut buf).unwrap();
        let decoded = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&decoded.payload[..], b"clean");
    }

    #[test]
    fn test_oversized_message_rejected() {
        let mut encoder = ChunkEncoder::new();
        let huge = RtmpChunk {
            csid: 3,
            timestamp: 0,
            message_type: MSG_VIDEO,
            stream_id: 1,
            payload: Bytes::from(vec![0u8; 0x100_0000]),
        };
        let mut buf = BytesMut::new();
        let err = encoder.encode(&huge, &mut buf).unwrap_err();
        assert!(matches!(
            err,
            Error::Framing(FramingError::MessageTooLarge { .. })
        ));
    }
}
