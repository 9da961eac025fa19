//! AMF0 encoder and decoder
//!
//! AMF0 is the original Action Message Format used in Flash/RTMP.
//! Reference: AMF0 File Format Specification (amf0-file-format-specification.pdf)
//!
//! Type Markers:
//! ```text
//! 0x00 - Number (IEEE 754 double)
//! 0x01 - Boolean
//! 0x02 - String (UTF-8, 16-bit length prefix)
//! 0x03 - Object (key-value pairs until 0x000009)
//! 0x04 - MovieClip (reserved, not supported)
//! 0x05 - Null
//! 0x06 - Undefined
//! 0x07 - Reference (16-bit index)
//! 0x08 - ECMA Array (associative array)
//! 0x09 - Object End (0x000009 sequence)
//! 0x0A - Strict Array (dense array)
//! 0x0B - Date (double + timezone)
//! 0x0C - Long String (UTF-8, 32-bit length prefix)
//! 0x0D - Unsupported
//! 0x0E - RecordSet (reserved, not supported)
//! 0x0F - XML Document
//! 0x10 - Typed Object (class name + properties)
//! 0x11 - AVM+ (switch to AMF3)
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::collections::HashMap;

use super::value::AmfValue;
use crate::error::{DecodeError, EncodeError};

// AMF0 type markers
const MARKER_NUMBER: u8 = 0x00;
const MARKER_BOOLEAN: u8 = 0x01;
const MARKER_STRING: u8 = 0x02;
const MARKER_OBJECT: u8 = 0x03;
const MARKER_MOVIECLIP: u8 = 0x04;
const MARKER_NULL: u8 = 0x05;
const MARKER_UNDEFINED: u8 = 0x06;
const MARKER_REFERENCE: u8 = 0x07;
const MARKER_ECMA_ARRAY: u8 = 0x08;
const MARKER_OBJECT_END: u8 = 0x09;
const MARKER_STRICT_ARRAY: u8 = 0x0A;
const MARKER_DATE: u8 = 0x0B;
const MARKER_LONG_STRING: u8 = 0x0C;
const MARKER_UNSUPPORTED: u8 = 0x0D;
const MARKER_RECORDSET: u8 = 0x0E;
const MARKER_XML_DOCUMENT: u8 = 0x0F;
const MARKER_TYPED_OBJECT: u8 = 0x10;
const MARKER_AVMPLUS: u8 = 0x11;

/// Maximum nesting depth for objects/arrays (prevent stack overflow)
const MAX_NESTING_DEPTH: usize = 64;

/// AMF0 decoder
///
/// Decoder state (the object/array reference table) is scoped to one
/// value stream: create one decoder per message payload, or call
/// [`reset`](Amf0Decoder::reset) between payloads.
pub struct Amf0Decoder {
    /// Reference table for object references, encounter order
    references: Vec<AmfValue>,
    /// Current nesting depth
    depth: usize,
}

impl Amf0Decoder {
    /// Create a new decoder
    pub fn new() -> Self {
        Self {
            references: Vec::new(),
            depth: 0,
        }
    }

    /// Reset decoder state (call between messages)
    pub fn reset(&mut self) {
        self.references.clear();
        self.depth = 0;
    }

    /// Decode a single AMF0 value from the buffer
    pub fn decode(&mut self, buf: &mut Bytes) -> Result<AmfValue, DecodeError> {
        if buf.is_empty() {
            return Err(DecodeError::UnexpectedEof);
        }

        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            return Err(DecodeError::NestingTooDeep);
        }

        let marker = buf.get_u8();
        let result = self.decode_value(marker, buf);
        self.depth -= 1;
        result
    }

    /// Decode all values from buffer until exhausted
    pub fn decode_all(&mut self, buf: &mut Bytes) -> Result<Vec<AmfValue>, DecodeError> {
        let mut values = Vec::new();
        while buf.has_remaining() {
            values.push(self.decode(buf)?);
        }
        Ok(values)
    }

    fn decode_value(&mut self, marker: u8, buf: &mut Bytes) -> Result<AmfValue, DecodeError> {
        match marker {
            MARKER_NUMBER => self.decode_number(buf),
            MARKER_BOOLEAN => self.decode_boolean(buf),
            MARKER_STRING => self.decode_string(buf),
            MARKER_OBJECT => self.decode_object(buf),
            MARKER_NULL => Ok(AmfValue::Null),
            MARKER_UNDEFINED => Ok(AmfValue::Undefined),
            MARKER_REFERENCE => self.decode_reference(buf),
            MARKER_ECMA_ARRAY => self.decode_ecma_array(buf),
            MARKER_STRICT_ARRAY => self.decode_strict_array(buf),
            MARKER_DATE => self.decode_date(buf),
            MARKER_LONG_STRING => self.decode_long_string(buf),
            MARKER_XML_DOCUMENT => self.decode_xml(buf),
            MARKER_TYPED_OBJECT => self.decode_typed_object(buf),
            MARKER_MOVIECLIP | MARKER_UNSUPPORTED | MARKER_RECORDSET | MARKER_AVMPLUS => {
                Err(DecodeError::UnsupportedMarker(marker))
            }
            _ => Err(DecodeError::UnknownMarker(marker)),
        }
    }

    fn decode_number(&mut self, buf: &mut Bytes) -> Result<AmfValue, DecodeError> {
        if buf.remaining() < 8 {
            return Err(DecodeError::UnexpectedEof);
        }
        Ok(AmfValue::Number(buf.get_f64()))
    }

    fn decode_boolean(&mut self, buf: &mut Bytes) -> Result<AmfValue, DecodeError> {
        if buf.is_empty() {
            return Err(DecodeError::UnexpectedEof);
        }
        Ok(AmfValue::Boolean(buf.get_u8() != 0))
    }

    fn decode_string(&mut self, buf: &mut Bytes) -> Result<AmfValue, DecodeError> {
        let s = self.read_utf8(buf)?;
        Ok(AmfValue::String(s))
    }

    fn decode_long_string(&mut self, buf: &mut Bytes) -> Result<AmfValue, DecodeError> {
        let s = self.read_utf8_long(buf)?;
        Ok(AmfValue::String(s))
    }

    fn decode_object(&mut self, buf: &mut Bytes) -> Result<AmfValue, DecodeError> {
        let obj_index = self.references.len();
        self.references.push(AmfValue::Null); // placeholder until complete

        let properties = self.decode_property_map(buf)?;

        let obj = AmfValue::Object(properties);
        self.references[obj_index] = obj.clone();
        Ok(obj)
    }

    fn decode_ecma_array(&mut self, buf: &mut Bytes) -> Result<AmfValue, DecodeError> {
        if buf.remaining() < 4 {
            return Err(DecodeError::UnexpectedEof);
        }

        // Count is a hint only; the real terminator is the end marker
        let _count = buf.get_u32();

        let arr_index = self.references.len();
        self.references.push(AmfValue::Null);

        let properties = self.decode_property_map(buf)?;

        let arr = AmfValue::EcmaArray(properties);
        self.references[arr_index] = arr.clone();
        Ok(arr)
    }

    fn decode_strict_array(&mut self, buf: &mut Bytes) -> Result<AmfValue, DecodeError> {
        if buf.remaining() < 4 {
            return Err(DecodeError::UnexpectedEof);
        }

        let count = buf.get_u32() as usize;

        let arr_index = self.references.len();
        self.references.push(AmfValue::Null);

        let mut elements = Vec::with_capacity(count.min(1024)); // cap initial allocation
        for _ in 0..count {
            elements.push(self.decode(buf)?);
        }

        let arr = AmfValue::Array(elements);
        self.references[arr_index] = arr.clone();
        Ok(arr)
    }

    fn decode_date(&mut self, buf: &mut Bytes) -> Result<AmfValue, DecodeError> {
        if buf.remaining() < 10 {
            return Err(DecodeError::UnexpectedEof);
        }

        let timestamp = buf.get_f64();
        let _timezone = buf.get_i16(); // deprecated, usually 0

        Ok(AmfValue::Date(timestamp))
    }

    fn decode_reference(&mut self, buf: &mut Bytes) -> Result<AmfValue, DecodeError> {
        if buf.remaining() < 2 {
            return Err(DecodeError::UnexpectedEof);
        }

        let index = buf.get_u16() as usize;
        if index >= self.references.len() {
            return Err(DecodeError::InvalidReference(index as u32));
        }

        Ok(self.references[index].clone())
    }

    fn decode_xml(&mut self, buf: &mut Bytes) -> Result<AmfValue, DecodeError> {
        let s = self.read_utf8_long(buf)?;
        Ok(AmfValue::Xml(s))
    }

    fn decode_typed_object(&mut self, buf: &mut Bytes) -> Result<AmfValue, DecodeError> {
        let class_name = self.read_utf8(buf)?;

        let obj_index = self.references.len();
        self.references.push(AmfValue::Null);

        let properties = self.decode_property_map(buf)?;

        let obj = AmfValue::TypedObject {
            class_name,
            properties,
        };
        self.references[obj_index] = obj.clone();
        Ok(obj)
    }

    /// Read name/value pairs until the empty-name + object-end sentinel
    fn decode_property_map(
        &mut self,
        buf: &mut Bytes,
    ) -> Result<HashMap<String, AmfValue>, DecodeError> {
        let mut properties = HashMap::new();

        loop {
            let key = self.read_utf8(buf)?;

            if key.is_empty() {
                if buf.is_empty() {
                    return Err(DecodeError::UnexpectedEof);
                }
                let end_marker = buf.get_u8();
                if end_marker == MARKER_OBJECT_END {
                    break;
                }
                return Err(DecodeError::InvalidObjectEnd);
            }

            let value = self.decode(buf)?;
            properties.insert(key, value);
        }

        Ok(properties)
    }

    /// Read UTF-8 string with 16-bit length prefix
    fn read_utf8(&mut self, buf: &mut Bytes) -> Result<String, DecodeError> {
        if buf.remaining() < 2 {
            return Err(DecodeError::UnexpectedEof);
        }

        let len = buf.get_u16() as usize;
        if buf.remaining() < len {
            return Err(DecodeError::UnexpectedEof);
        }

        let bytes = buf.copy_to_bytes(len);
        String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::InvalidUtf8)
    }

    /// Read UTF-8 string with 32-bit length prefix
    fn read_utf8_long(&mut self, buf: &mut Bytes) -> Result<String, DecodeError> {
        if buf.remaining() < 4 {
            return Err(DecodeError::UnexpectedEof);
        }

        let len = buf.get_u32() as usize;
        if buf.remaining() < len {
            return Err(DecodeError::UnexpectedEof);
        }

        let bytes = buf.copy_to_bytes(len);
        String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::InvalidUtf8)
    }
}

impl Default for Amf0Decoder {
    fn default() -> Self {
        Self::new()
    }
}

/// AMF0 encoder
///
/// Values AMF0 cannot represent (ByteArray) fail with an explicit error
/// rather than being substituted with Null.
pub struct Amf0Encoder {
    buf: BytesMut,
}

impl Amf0Encoder {
    /// Create a new encoder
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(256),
        }
    }

    /// Create encoder with specific capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    /// Get the encoded bytes and reset encoder
    pub fn finish(&mut self) -> Bytes {
        self.buf.split().freeze()
    }

    /// Get current encoded length
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Check if encoder is empty
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Encode a single AMF0 value, returning the number of bytes written
    pub fn encode(&mut self, value: &AmfValue) -> Result<usize, EncodeError> {
        let start = self.buf.len();
        self.encode_value(value)?;
        Ok(self.buf.len() - start)
    }

    /// Encode multiple values, returning the total bytes written
    pub fn encode_all(&mut self, values: &[AmfValue]) -> Result<usize, EncodeError> {
        let start = self.buf.len();
        for value in values {
            self.encode_value(value)?;
        }
        Ok(self.buf.len() - start)
    }

    fn encode_value(&mut self, value: &AmfValue) -> Result<(), EncodeError> {
        match value {
            AmfValue::Null => {
                self.buf.put_u8(MARKER_NULL);
            }
            AmfValue::Undefined => {
                self.buf.put_u8(MARKER_UNDEFINED);
            }
            AmfValue::Boolean(b) => {
                self.buf.put_u8(MARKER_BOOLEAN);
                self.buf.put_u8(if *b { 1 } else { 0 });
            }
            AmfValue::Number(n) => {
                self.buf.put_u8(MARKER_NUMBER);
                self.buf.put_f64(*n);
            }
            AmfValue::Integer(i) => {
                // AMF0 has a single numeric type
                self.buf.put_u8(MARKER_NUMBER);
                self.buf.put_f64(*i as f64);
            }
            AmfValue::String(s) => {
                if s.len() > 0xFFFF {
                    self.buf.put_u8(MARKER_LONG_STRING);
                    self.buf.put_u32(s.len() as u32);
                } else {
                    self.buf.put_u8(MARKER_STRING);
                    self.buf.put_u16(s.len() as u16);
                }
                self.buf.put_slice(s.as_bytes());
            }
            AmfValue::Object(props) => {
                self.buf.put_u8(MARKER_OBJECT);
                self.encode_property_map(props)?;
            }
            AmfValue::EcmaArray(props) => {
                self.buf.put_u8(MARKER_ECMA_ARRAY);
                self.buf.put_u32(props.len() as u32);
                self.encode_property_map(props)?;
            }
            AmfValue::Array(elements) => {
                self.buf.put_u8(MARKER_STRICT_ARRAY);
                self.buf.put_u32(elements.len() as u32);
                for elem in elements {
                    self.encode_value(elem)?;
                }
            }
            AmfValue::Date(timestamp) => {
                self.buf.put_u8(MARKER_DATE);
                self.buf.put_f64(*timestamp);
                self.buf.put_i16(0); // timezone, deprecated
            }
            AmfValue::Xml(s) => {
                self.buf.put_u8(MARKER_XML_DOCUMENT);
                self.buf.put_u32(s.len() as u32);
                self.buf.put_slice(s.as_bytes());
            }
            AmfValue::TypedObject {
                class_name,
                properties,
            } => {
                self.buf.put_u8(MARKER_TYPED_OBJECT);
                self.write_utf8(class_name);
                self.encode_property_map(properties)?;
            }
            AmfValue::ByteArray(_) => {
                return Err(EncodeError::UnsupportedValue("ByteArray"));
            }
        }
        Ok(())
    }

    fn encode_property_map(
        &mut self,
        props: &HashMap<String, AmfValue>,
    ) -> Result<(), EncodeError> {
        for (key, val) in props {
            self.write_utf8(key);
            self.encode_value(val)?;
        }
        // Object end: empty key + end marker
        self.buf.put_u16(0);
        self.buf.put_u8(MARKER_OBJECT_END);
        Ok(())
    }

    /// Write UTF-8 string with 16-bit length prefix (no type marker)
    fn write_utf8(&mut self, s: &str) {
        let len = s.len().min(0xFFFF);
        self.buf.put_u16(len as u16);
        self.buf.put_slice(&s.as_bytes()[..len]);
    }
}

impl Default for Amf0Encoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience function to encode a single value
pub fn encode(value: &AmfValue) -> Result<Bytes, EncodeError> {
    let mut encoder = Amf0Encoder::new();
    encoder.encode(value)?;
    Ok(encoder.finish())
}

/// Convenience function to encode multiple values
pub fn encode_all(values: &[AmfValue]) -> Result<Bytes, EncodeError> {
    let mut encoder = Amf0Encoder::new();
    encoder.encode_all(values)?;
    Ok(encoder.finish())
}

/// Convenience function to decode a single value
pub fn decode(data: &[u8]) -> Result<AmfValue, DecodeError> {
    let mut decoder = Amf0Decoder::new();
    let mut buf = Bytes::copy_from_slice(data);
    decoder.decode(&mut buf)
}

/// Convenience function to decode all values
pub fn decode_all(data: &[u8]) -> Result<Vec<AmfValue>, DecodeError> {
    let mut decoder = Amf0Decoder::new();
    let mut buf = Bytes::copy_from_slice(data);
    decoder.decode_all(&mut buf)
}
