//! RTMP message types and parsing
//!
//! RTMP messages are classified into:
//! - Protocol Control Messages (types 1-6): Chunk/flow control
//! - Command Messages (types 17, 20): AMF-encoded commands
//! - Data Messages (types 15, 18): Metadata
//! - Shared Object Messages (types 16, 19): AMF-encoded state
//! - Audio/Video Messages (types 8, 9): Media data, passed through opaque
//! - Aggregate Messages (type 22): Batched sub-messages, passed through
//!
//! Parsing is a pure function from (type id, payload, stream id) to a
//! closed message variant; an unrecognized type id is an error, not a
//! catch-all variant.
//!
//! Reference: RTMP Specification Section 5.4

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::amf::{amf0, amf3, AmfValue};
use crate::error::{DecodeError, FramingError, Result};
use crate::protocol::chunk::RtmpChunk;
use crate::protocol::constants::*;

/// Parsed RTMP message
#[derive(Debug, Clone)]
pub enum RtmpMessage {
    /// Set Chunk Size (type 1)
    SetChunkSize(u32),

    /// Abort Message (type 2)
    Abort { csid: u32 },

    /// Acknowledgement (type 3)
    Acknowledgement { sequence: u32 },

    /// User Control Message (type 4)
    UserControl(UserControlEvent),

    /// Window Acknowledgement Size (type 5)
    WindowAckSize(u32),

    /// Set Peer Bandwidth (type 6)
    SetPeerBandwidth { size: u32, limit: LimitType },

    /// Audio data (type 8), opaque to this layer
    Audio {
        timestamp: u32,
        stream_id: u32,
        data: Bytes,
    },

    /// Video data (type 9), opaque to this layer
    Video {
        timestamp: u32,
        stream_id: u32,
        data: Bytes,
    },

    /// AMF0 Command (type 20)
    Command(Command),

    /// AMF3 Command (type 17)
    CommandAmf3(Command),

    /// AMF0 Data message (type 18) - metadata, etc.
    Data(DataMessage),

    /// AMF3 Data message (type 15)
    DataAmf3(DataMessage),

    /// AMF0 Shared Object (type 19)
    SharedObject(SharedObjectMessage),

    /// AMF3 Shared Object (type 16)
    SharedObjectAmf3(SharedObjectMessage),

    /// Aggregate message (type 22), opaque to this layer
    Aggregate {
        timestamp: u32,
        stream_id: u32,
        data: Bytes,
    },
}

/// Peer bandwidth limit type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitType {
    /// Peer should limit output to the given bandwidth
    Hard,
    /// Peer may exceed the limit if it has excess bandwidth
    Soft,
    /// Hard or soft depending on prior state
    Dynamic,
}

impl LimitType {
    fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(LimitType::Hard),
            1 => Ok(LimitType::Soft),
            2 => Ok(LimitType::Dynamic),
            _ => Err(DecodeError::InvalidLimitType(value).into()),
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            LimitType::Hard => 0,
            LimitType::Soft => 1,
            LimitType::Dynamic => 2,
        }
    }
}

/// User Control Event
#[derive(Debug, Clone)]
pub enum UserControlEvent {
    StreamBegin(u32),
    StreamEof(u32),
    StreamDry(u32),
    SetBufferLength { stream_id: u32, buffer_ms: u32 },
    StreamIsRecorded(u32),
    PingRequest(u32),
    PingResponse(u32),
    /// The event-type space is open; unrecognized events pass through
    Unknown { event_type: u16, data: Bytes },
}

/// RTMP command (connect, publish, play, etc.)
#[derive(Debug, Clone)]
pub struct Command {
    /// Command name
    pub name: String,
    /// Transaction ID
    pub transaction_id: f64,
    /// Command object (often null for responses)
    pub command_object: AmfValue,
    /// Additional arguments
    pub arguments: Vec<AmfValue>,
    /// Message stream ID
    pub stream_id: u32,
}

/// Data message (@setDataFrame, onMetaData, etc.)
#[derive(Debug, Clone)]
pub struct DataMessage {
    /// Handler name (e.g., "@setDataFrame", "onMetaData")
    pub name: String,
    /// Data values
    pub values: Vec<AmfValue>,
    /// Message stream ID
    pub stream_id: u32,
}

/// Shared object message: the value sequence is handed to the application
#[derive(Debug, Clone)]
pub struct SharedObjectMessage {
    /// Decoded values
    pub values: Vec<AmfValue>,
    /// Message stream ID
    pub stream_id: u32,
}

impl RtmpMessage {
    /// Parse a message from a reassembled chunk
    pub fn from_chunk(chunk: &RtmpChunk) -> Result<Self> {
        let mut payload = chunk.payload.clone();
        let len = payload.len();
        let truncated = |message_type| DecodeError::TruncatedControl { message_type, len };

        match chunk.message_type {
            MSG_SET_CHUNK_SIZE => {
                if len < 4 {
                    return Err(truncated(MSG_SET_CHUNK_SIZE).into());
                }
                // The most significant bit must be ignored
                let size = payload.get_u32() & 0x7FFF_FFFF;
                if size == 0 {
                    return Err(FramingError::InvalidChunkSize(size).into());
                }
                Ok(RtmpMessage::SetChunkSize(size))
            }

            MSG_ABORT => {
                if len < 4 {
                    return Err(truncated(MSG_ABORT).into());
                }
                Ok(RtmpMessage::Abort {
                    csid: payload.get_u32(),
                })
            }

            MSG_ACKNOWLEDGEMENT => {
                if len < 4 {
                    return Err(truncated(MSG_ACKNOWLEDGEMENT).into());
                }
                Ok(RtmpMessage::Acknowledgement {
                    sequence: payload.get_u32(),
                })
            }

            MSG_USER_CONTROL => Self::parse_user_control(&mut payload),

            MSG_WINDOW_ACK_SIZE => {
                if len < 4 {
                    return Err(truncated(MSG_WINDOW_ACK_SIZE).into());
                }
                Ok(RtmpMessage::WindowAckSize(payload.get_u32()))
            }

            MSG_SET_PEER_BANDWIDTH => {
                if len < 5 {
                    return Err(truncated(MSG_SET_PEER_BANDWIDTH).into());
                }
                let size = payload.get_u32();
                let limit = LimitType::from_u8(payload.get_u8())?;
                Ok(RtmpMessage::SetPeerBandwidth { size, limit })
            }

            MSG_AUDIO => Ok(RtmpMessage::Audio {
                timestamp: chunk.timestamp,
                stream_id: chunk.stream_id,
                data: payload,
            }),

            MSG_VIDEO => Ok(RtmpMessage::Video {
                timestamp: chunk.timestamp,
                stream_id: chunk.stream_id,
                data: payload,
            }),

            MSG_COMMAND_AMF0 => {
                let values = amf0::Amf0Decoder::new().decode_all(&mut payload)?;
                Ok(RtmpMessage::Command(command_from_values(
                    values,
                    chunk.stream_id,
                )?))
            }

            MSG_COMMAND_AMF3 => {
                let values = amf3::Amf3Decoder::new().decode_all(&mut payload)?;
                Ok(RtmpMessage::CommandAmf3(command_from_values(
                    values,
                    chunk.stream_id,
                )?))
            }

            MSG_DATA_AMF0 => {
                let values = amf0::Amf0Decoder::new().decode_all(&mut payload)?;
                Ok(RtmpMessage::Data(data_from_values(values, chunk.stream_id)?))
            }

            MSG_DATA_AMF3 => {
                let values = amf3::Amf3Decoder::new().decode_all(&mut payload)?;
                Ok(RtmpMessage::DataAmf3(data_from_values(
                    values,
                    chunk.stream_id,
                )?))
            }

            MSG_SHARED_OBJECT_AMF0 => {
                let values = amf0::Amf0Decoder::new().decode_all(&mut payload)?;
                Ok(RtmpMessage::SharedObject(SharedObjectMessage {
                    values,
                    stream_id: chunk.stream_id,
                }))
            }

            MSG_SHARED_OBJECT_AMF3 => {
                let values = amf3::Amf3Decoder::new().decode_all(&mut payload)?;
                Ok(RtmpMessage::SharedObjectAmf3(SharedObjectMessage {
                    values,
                    stream_id: chunk.stream_id,
                }))
            }

            MSG_AGGREGATE => Ok(RtmpMessage::Aggregate {
                timestamp: chunk.timestamp,
                stream_id: chunk.stream_id,
                data: payload,
            }),

            other => Err(DecodeError::UnknownMessageType(other).into()),
        }
    }

    /// Parse User Control message
    fn parse_user_control(payload: &mut Bytes) -> Result<Self> {
        if payload.len() < 6 {
            return Err(DecodeError::TruncatedControl {
                message_type: MSG_USER_CONTROL,
                len: payload.len(),
            }
            .into());
        }

        let event_type = payload.get_u16();
        let event = match event_type {
            UC_STREAM_BEGIN => UserControlEvent::StreamBegin(payload.get_u32()),
            UC_STREAM_EOF => UserControlEvent::StreamEof(payload.get_u32()),
            UC_STREAM_DRY => UserControlEvent::StreamDry(payload.get_u32()),
            UC_SET_BUFFER_LENGTH => {
                if payload.len() < 8 {
                    return Err(DecodeError::TruncatedControl {
                        message_type: MSG_USER_CONTROL,
                        len: payload.len() + 2,
                    }
                    .into());
                }
                let stream_id = payload.get_u32();
                let buffer_ms = payload.get_u32();
                UserControlEvent::SetBufferLength {
                    stream_id,
                    buffer_ms,
                }
            }
            UC_STREAM_IS_RECORDED => UserControlEvent::StreamIsRecorded(payload.get_u32()),
            UC_PING_REQUEST => UserControlEvent::PingRequest(payload.get_u32()),
            UC_PING_RESPONSE => UserControlEvent::PingResponse(payload.get_u32()),
            _ => UserControlEvent::Unknown {
                event_type,
                data: payload.clone(),
            },
        };

        Ok(RtmpMessage::UserControl(event))
    }

    /// Encode message to (type id, payload bytes)
    pub fn encode(&self) -> Result<(u8, Bytes)> {
        match self {
            RtmpMessage::SetChunkSize(size) => {
                let mut buf = BytesMut::with_capacity(4);
                buf.put_u32(*size);
                Ok((MSG_SET_CHUNK_SIZE, buf.freeze()))
            }

            RtmpMessage::Abort { csid } => {
                let mut buf = BytesMut::with_capacity(4);
                buf.put_u32(*csid);
                Ok((MSG_ABORT, buf.freeze()))
            }

            RtmpMessage::Acknowledgement { sequence } => {
                let mut buf = BytesMut::with_capacity(4);
                buf.put_u32(*sequence);
                Ok((MSG_ACKNOWLEDGEMENT, buf.freeze()))
            }

            RtmpMessage::WindowAckSize(size) => {
                let mut buf = BytesMut::with_capacity(4);
                buf.put_u32(*size);
                Ok((MSG_WINDOW_ACK_SIZE, buf.freeze()))
            }

            RtmpMessage::SetPeerBandwidth { size, limit } => {
                let mut buf = BytesMut::with_capacity(5);
                buf.put_u32(*size);
                buf.put_u8(limit.as_u8());
                Ok((MSG_SET_PEER_BANDWIDTH, buf.freeze()))
            }

            RtmpMessage::UserControl(event) => {
                let mut buf = BytesMut::with_capacity(10);
                match event {
                    UserControlEvent::StreamBegin(id) => {
                        buf.put_u16(UC_STREAM_BEGIN);
                        buf.put_u32(*id);
                    }
                    UserControlEvent::StreamEof(id) => {
                        buf.put_u16(UC_STREAM_EOF);
                        buf.put_u32(*id);
                    }
                    UserControlEvent::StreamDry(id) => {
                        buf.put_u16(UC_STREAM_DRY);
                        buf.put_u32(*id);
                    }
                    UserControlEvent::SetBufferLength {
                        stream_id,
                        buffer_ms,
                    } => {
                        buf.put_u16(UC_SET_BUFFER_LENGTH);
                        buf.put_u32(*stream_id);
                        buf.put_u32(*buffer_ms);
                    }
                    UserControlEvent::StreamIsRecorded(id) => {
                        buf.put_u16(UC_STREAM_IS_RECORDED);
                        buf.put_u32(*id);
                    }
                    UserControlEvent::PingRequest(ts) => {
                        buf.put_u16(UC_PING_REQUEST);
                        buf.put_u32(*ts);
                    }
                    UserControlEvent::PingResponse(ts) => {
                        buf.put_u16(UC_PING_RESPONSE);
                        buf.put_u32(*ts);
                    }
                    UserControlEvent::Unknown { event_type, data } => {
                        buf.put_u16(*event_type);
                        buf.put_slice(data);
                    }
                }
                Ok((MSG_USER_CONTROL, buf.freeze()))
            }

            RtmpMessage::Audio { data, .. } => Ok((MSG_AUDIO, data.clone())),

            RtmpMessage::Video { data, .. } => Ok((MSG_VIDEO, data.clone())),

            RtmpMessage::Command(cmd) => {
                let mut encoder = amf0::Amf0Encoder::new();
                encoder.encode_all(&cmd.to_values())?;
                Ok((MSG_COMMAND_AMF0, encoder.finish()))
            }

            RtmpMessage::CommandAmf3(cmd) => {
                let mut encoder = amf3::Amf3Encoder::new();
                encoder.encode_all(&cmd.to_values())?;
                Ok((MSG_COMMAND_AMF3, encoder.finish()))
            }

            RtmpMessage::Data(data) => {
                let mut encoder = amf0::Amf0Encoder::new();
                encoder.encode(&AmfValue::String(data.name.clone()))?;
                encoder.encode_all(&data.values)?;
                Ok((MSG_DATA_AMF0, encoder.finish()))
            }

            RtmpMessage::DataAmf3(data) => {
                let mut encoder = amf3::Amf3Encoder::new();
                encoder.encode(&AmfValue::String(data.name.clone()))?;
                encoder.encode_all(&data.values)?;
                Ok((MSG_DATA_AMF3, encoder.finish()))
            }

            RtmpMessage::SharedObject(so) => {
                let mut encoder = amf0::Amf0Encoder::new();
                encoder.encode_all(&so.values)?;
                Ok((MSG_SHARED_OBJECT_AMF0, encoder.finish()))
            }

            RtmpMessage::SharedObjectAmf3(so) => {
                let mut encoder = amf3::Amf3Encoder::new();
                encoder.encode_all(&so.values)?;
                Ok((MSG_SHARED_OBJECT_AMF3, encoder.finish()))
            }

            RtmpMessage::Aggregate { data, .. } => Ok((MSG_AGGREGATE, data.clone())),
        }
    }

    /// The conventional chunk stream id for this message type
    pub fn default_csid(&self) -> u32 {
        match self {
            RtmpMessage::SetChunkSize(_)
            | RtmpMessage::Abort { .. }
            | RtmpMessage::Acknowledgement { .. }
            | RtmpMessage::UserControl(_)
            | RtmpMessage::WindowAckSize(_)
            | RtmpMessage::SetPeerBandwidth { .. } => CSID_PROTOCOL_CONTROL,
            RtmpMessage::Audio { .. } => CSID_AUDIO,
            RtmpMessage::Video { .. } => CSID_VIDEO,
            _ => CSID_COMMAND,
        }
    }

    /// The message timestamp (zero for everything but media)
    pub fn timestamp(&self) -> u32 {
        match self {
            RtmpMessage::Audio { timestamp, .. }
            | RtmpMessage::Video { timestamp, .. }
            | RtmpMessage::Aggregate { timestamp, .. } => *timestamp,
            _ => 0,
        }
    }

    /// The message stream id this message addresses
    pub fn stream_id(&self) -> u32 {
        match self {
            RtmpMessage::Audio { stream_id, .. }
            | RtmpMessage::Video { stream_id, .. }
            | RtmpMessage::Aggregate { stream_id, .. } => *stream_id,
            RtmpMessage::Command(c) | RtmpMessage::CommandAmf3(c) => c.stream_id,
            RtmpMessage::Data(d) | RtmpMessage::DataAmf3(d) => d.stream_id,
            RtmpMessage::SharedObject(so) | RtmpMessage::SharedObjectAmf3(so) => so.stream_id,
            _ => 0,
        }
    }
}

/// Structure a decoded value sequence as a command:
/// name, transaction id, optional command object, arguments
fn command_from_values(values: Vec<AmfValue>, stream_id: u32) -> Result<Command> {
    let mut iter = values.into_iter();

    let name = match iter.next() {
        Some(AmfValue::String(s)) => s,
        Some(_) => return Err(DecodeError::InvalidCommand("name is not a string").into()),
        None => return Err(DecodeError::InvalidCommand("missing name").into()),
    };

    let transaction_id = match iter.next() {
        Some(AmfValue::Number(n)) => n,
        Some(AmfValue::Integer(i)) => i as f64,
        Some(_) => return Err(DecodeError::InvalidCommand("transaction id is not numeric").into()),
        None => 0.0,
    };

    let command_object = iter.next().unwrap_or(AmfValue::Null);
    let arguments = iter.collect();

    Ok(Command {
        name,
        transaction_id,
        command_object,
        arguments,
        stream_id,
    })
}

/// Structure a decoded value sequence as a data message: name, values
fn data_from_values(values: Vec<AmfValue>, stream_id: u32) -> Result<DataMessage> {
    let mut iter = values.into_iter();

    let name = match iter.next() {
        Some(AmfValue::String(s)) => s,
        Some(_) => return Err(DecodeError::InvalidCommand("data handler name is not a string").into()),
        None => String::new(),
    };

    Ok(DataMessage {
        name,
        values: iter.collect(),
        stream_id,
    })
}

/// Build common response messages
impl Command {
    /// The command's wire form: name, transaction id, command object,
    /// then arguments
    fn to_values(&self) -> Vec<AmfValue> {
        let mut values = Vec::with_capacity(3 + self.arguments.len());
        values.push(AmfValue::String(self.name.clone()));
        values.push(AmfValue::Number(self.transaction_id));
        values.push(self.command_object.clone());
        values.extend(self.arguments.iter().cloned());
        values
    }

    /// Create a new command
    pub fn new(name: impl Into<String>, transaction_id: f64) -> Self {
        Command {
            name: name.into(),
            transaction_id,
            command_object: AmfValue::Null,
            arguments: Vec::new(),
            stream_id: 0,
        }
    }

    /// Create a _result response
    pub fn result(transaction_id: f64, properties: AmfValue, info: AmfValue) -> Self {
        Command {
            name: "_result".to_string(),
            transaction_id,
            command_object: properties,
            arguments: vec![info],
            stream_id: 0,
        }
    }

    /// Create an _error response
    pub fn error(transaction_id: f64, properties: AmfValue, info: AmfValue) -> Self {
        Command {
            name: "_error".to_string(),
            transaction_id,
            command_object: properties,
            arguments: vec![info],
            stream_id: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn chunk_of(message_type: u8, stream_id: u32, payload: Bytes) -> RtmpChunk {
        RtmpChunk {
            csid: CSID_COMMAND,
            timestamp: 0,
            message_type,
            stream_id,
            payload,
        }
    }

    fn roundtrip(msg: &RtmpMessage) -> RtmpMessage {
        let (message_type, payload) = msg.encode().unwrap();
        RtmpMessage::from_chunk(&chunk_of(message_type, msg.stream_id(), payload)).unwrap()
    }

    #[test]
    fn test_set_chunk_size_roundtrip() {
        let decoded = roundtrip(&RtmpMessage::SetChunkSize(4096));
        assert!(matches!(decoded, RtmpMessage::SetChunkSize(4096)));
    }

    #[test]
    fn test_chunk_size_zero_rejected() {
        let chunk = chunk_of(MSG_SET_CHUNK_SIZE, 0, Bytes::from_static(&[0, 0, 0, 0]));
        let err = RtmpMessage::from_chunk(&chunk).unwrap_err();
        assert!(matches!(
            err,
            Error::Framing(FramingError::InvalidChunkSize(0))
        ));
    }

    #[test]
    fn test_chunk_size_ignores_msb() {
        let chunk = chunk_of(
            MSG_SET_CHUNK_SIZE,
            0,
            Bytes::from_static(&[0x80, 0x00, 0x10, 0x00]),
        );
        let msg = RtmpMessage::from_chunk(&chunk).unwrap();
        assert!(matches!(msg, RtmpMessage::SetChunkSize(0x1000)));
    }

    #[test]
    fn test_control_messages_roundtrip() {
        let decoded = roundtrip(&RtmpMessage::Abort { csid: 7 });
        assert!(matches!(decoded, RtmpMessage::Abort { csid: 7 }));

        let decoded = roundtrip(&RtmpMessage::Acknowledgement { sequence: 123456 });
        assert!(matches!(
            decoded,
            RtmpMessage::Acknowledgement { sequence: 123456 }
        ));

        let decoded = roundtrip(&RtmpMessage::WindowAckSize(2_500_000));
        assert!(matches!(decoded, RtmpMessage::WindowAckSize(2_500_000)));

        let decoded = roundtrip(&RtmpMessage::SetPeerBandwidth {
            size: 2_500_000,
            limit: LimitType::Dynamic,
        });
        assert!(matches!(
            decoded,
            RtmpMessage::SetPeerBandwidth {
                size: 2_500_000,
                limit: LimitType::Dynamic,
            }
        ));
    }

    #[test]
    fn test_truncated_control_fails() {
        for &(message_type, short_len) in &[
            (MSG_SET_CHUNK_SIZE, 3usize),
            (MSG_ABORT, 2),
            (MSG_ACKNOWLEDGEMENT, 0),
            (MSG_WINDOW_ACK_SIZE, 3),
            (MSG_SET_PEER_BANDWIDTH, 4),
            (MSG_USER_CONTROL, 5),
        ] {
            let chunk = chunk_of(message_type, 0, Bytes::from(vec![0u8; short_len]));
            let err = RtmpMessage::from_chunk(&chunk).unwrap_err();
            assert!(
                matches!(err, Error::Decode(DecodeError::TruncatedControl { .. })),
                "type {} with {} bytes",
                message_type,
                short_len
            );
        }
    }

    #[test]
    fn test_invalid_limit_type_fails() {
        let chunk = chunk_of(
            MSG_SET_PEER_BANDWIDTH,
            0,
            Bytes::from_static(&[0, 0, 0, 1, 3]),
        );
        let err = RtmpMessage::from_chunk(&chunk).unwrap_err();
        assert!(matches!(err, Error::Decode(DecodeError::InvalidLimitType(3))));
    }

    #[test]
    fn test_user_control_roundtrip() {
        let decoded = roundtrip(&RtmpMessage::UserControl(UserControlEvent::StreamBegin(1)));
        assert!(matches!(
            decoded,
            RtmpMessage::UserControl(UserControlEvent::StreamBegin(1))
        ));

        let decoded = roundtrip(&RtmpMessage::UserControl(
            UserControlEvent::SetBufferLength {
                stream_id: 1,
                buffer_ms: 3000,
            },
        ));
        assert!(matches!(
            decoded,
            RtmpMessage::UserControl(UserControlEvent::SetBufferLength {
                stream_id: 1,
                buffer_ms: 3000,
            })
        ));
    }

    #[test]
    fn test_unknown_user_control_event_passes_through() {
        let chunk = chunk_of(
            MSG_USER_CONTROL,
            0,
            Bytes::from_static(&[0x00, 0x63, 1, 2, 3, 4]),
        );
        let msg = RtmpMessage::from_chunk(&chunk).unwrap();
        assert!(matches!(
            msg,
            RtmpMessage::UserControl(UserControlEvent::Unknown { event_type: 0x63, .. })
        ));
    }

    #[test]
    fn test_unknown_message_type_fails() {
        let chunk = chunk_of(99, 0, Bytes::from_static(b"junk"));
        let err = RtmpMessage::from_chunk(&chunk).unwrap_err();
        assert!(matches!(
            err,
            Error::Decode(DecodeError::UnknownMessageType(99))
        ));
    }

    #[test]
    fn test_amf0_command_roundtrip() {
        let mut cmd = Command::new("connect", 1.0);
        cmd.arguments.push(AmfValue::String("extra".into()));

        let decoded = roundtrip(&RtmpMessage::Command(cmd));
        if let RtmpMessage::Command(parsed) = decoded {
            assert_eq!(parsed.name, "connect");
            assert_eq!(parsed.transaction_id, 1.0);
            assert_eq!(parsed.command_object, AmfValue::Null);
            assert_eq!(parsed.arguments, vec![AmfValue::String("extra".into())]);
        } else {
            panic!("Expected Command message");
        }
    }

    #[test]
    fn test_amf3_command_roundtrip() {
        let cmd = Command::new("createStream", 2.0);
        let decoded = roundtrip(&RtmpMessage::CommandAmf3(cmd));
        if let RtmpMessage::CommandAmf3(parsed) = decoded {
            assert_eq!(parsed.name, "createStream");
            assert_eq!(parsed.transaction_id, 2.0);
        } else {
            panic!("Expected CommandAmf3 message");
        }
    }

    #[test]
    fn test_command_without_name_fails() {
        // Payload holding a lone number: not a valid command
        let payload = amf0::encode(&AmfValue::Number(5.0)).unwrap();
        let chunk = chunk_of(MSG_COMMAND_AMF0, 0, payload);
        let err = RtmpMessage::from_chunk(&chunk).unwrap_err();
        assert!(matches!(
            err,
            Error::Decode(DecodeError::InvalidCommand(_))
        ));
    }

    #[test]
    fn test_command_bad_marker_fails() {
        let chunk = chunk_of(MSG_COMMAND_AMF0, 0, Bytes::from_static(&[0x42]));
        let err = RtmpMessage::from_chunk(&chunk).unwrap_err();
        assert!(matches!(err, Error::Decode(DecodeError::UnknownMarker(0x42))));
    }

    #[test]
    fn test_data_message_roundtrip() {
        let data = DataMessage {
            name: "onMetaData".into(),
            values: vec![AmfValue::Number(29.97)],
            stream_id: 1,
        };
        let decoded = roundtrip(&RtmpMessage::Data(data));
        if let RtmpMessage::Data(parsed) = decoded {
            assert_eq!(parsed.name, "onMetaData");
            assert_eq!(parsed.values, vec![AmfValue::Number(29.97)]);
        } else {
            panic!("Expected Data message");
        }
    }

    #[test]
    fn test_shared_object_roundtrip() {
        let so = SharedObjectMessage {
            values: vec![AmfValue::String("room".into()), AmfValue::Integer(3)],
            stream_id: 0,
        };
        let decoded = roundtrip(&RtmpMessage::SharedObjectAmf3(so));
        if let RtmpMessage::SharedObjectAmf3(parsed) = decoded {
            assert_eq!(
                parsed.values,
                vec![AmfValue::String("room".into()), AmfValue::Integer(3)]
            );
        } else {
            panic!("Expected SharedObjectAmf3 message");
        }
    }

    #[test]
    fn test_media_passthrough() {
        let audio = RtmpMessage::Audio {
            timestamp: 40,
            stream_id: 1,
            data: Bytes::from_static(&[0xAF, 0x01, 0x21]),
        };
        let (message_type, payload) = audio.encode().unwrap();
        assert_eq!(message_type, MSG_AUDIO);
        assert_eq!(&payload[..], &[0xAF, 0x01, 0x21]);

        let decoded = RtmpMessage::from_chunk(&RtmpChunk {
            csid: CSID_AUDIO,
            timestamp: 40,
            message_type,
            stream_id: 1,
            payload,
        })
        .unwrap();
        if let RtmpMessage::Audio {
            timestamp,
            stream_id,
            data,
        } = decoded
        {
            assert_eq!(timestamp, 40);
            assert_eq!(stream_id, 1);
            assert_eq!(&data[..], &[0xAF, 0x01, 0x21]);
        } else {
            panic!("Expected Audio message");
        }
    }

    #[test]
    fn test_default_csid_assignment() {
        assert_eq!(
            RtmpMessage::SetChunkSize(4096).default_csid(),
            CSID_PROTOCOL_CONTROL
        );
        assert_eq!(
            RtmpMessage::Command(Command::new("connect", 1.0)).default_csid(),
            CSID_COMMAND
        );
        let audio = RtmpMessage::Audio {
            timestamp: 0,
            stream_id: 1,
            data: Bytes::new(),
        };
        assert_eq!(audio.default_csid(), CSID_AUDIO);
    }
}
