//! AMF (Action Message Format) implementation
//!
//! AMF is Adobe's binary serialization format used in RTMP for encoding
//! command parameters and metadata. This module implements both AMF0
//! (original format) and AMF3 (ActionScript 3.0 format).
//!
//! Both codecs expose the same encode/decode contract so message parsing
//! can select the sub-variant by message type id alone. AMF3 adds U29
//! variable-length integers and per-value-stream reference tables.

pub mod amf0;
pub mod amf3;
pub mod value;

pub use amf0::{Amf0Decoder, Amf0Encoder};
pub use amf3::{Amf3Decoder, Amf3Encoder};
pub use value::AmfValue;
