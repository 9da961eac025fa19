//! AMF3 encoder and decoder
//!
//! AMF3 is the ActionScript 3.0 serialization format. Compared to AMF0 it
//! adds a variable-length 29-bit integer encoding (U29) and reference
//! tables that deduplicate repeated strings, complex objects, and object
//! traits within one value stream.
//! Reference: AMF3 File Format Specification (amf-file-format-spec.pdf)
//!
//! Type Markers:
//! ```text
//! 0x00 - Undefined
//! 0x01 - Null
//! 0x02 - False
//! 0x03 - True
//! 0x04 - Integer (U29, 29-bit signed)
//! 0x05 - Double (IEEE 754)
//! 0x06 - String
//! 0x07 - XML Document (legacy)
//! 0x08 - Date
//! 0x09 - Array
//! 0x0A - Object
//! 0x0B - XML
//! 0x0C - ByteArray
//! 0x0D - Vector<int>      (not supported)
//! 0x0E - Vector<uint>     (not supported)
//! 0x0F - Vector<double>   (not supported)
//! 0x10 - Vector<object>   (not supported)
//! 0x11 - Dictionary       (not supported)
//! ```
//!
//! Reference tables are scoped to one value stream: create one
//! encoder/decoder per message payload, or call `reset` between payloads.
//! Encode-side and decode-side tables stay index-synchronized because both
//! append in encounter order.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::collections::HashMap;

use super::value::AmfValue;
use crate::error::{DecodeError, EncodeError};

// AMF3 type markers
const MARKER_UNDEFINED: u8 = 0x00;
const MARKER_NULL: u8 = 0x01;
const MARKER_FALSE: u8 = 0x02;
const MARKER_TRUE: u8 = 0x03;
const MARKER_INTEGER: u8 = 0x04;
const MARKER_DOUBLE: u8 = 0x05;
const MARKER_STRING: u8 = 0x06;
const MARKER_XML_DOC: u8 = 0x07;
const MARKER_DATE: u8 = 0x08;
const MARKER_ARRAY: u8 = 0x09;
const MARKER_OBJECT: u8 = 0x0A;
const MARKER_XML: u8 = 0x0B;
const MARKER_BYTE_ARRAY: u8 = 0x0C;
const MARKER_VECTOR_INT: u8 = 0x0D;
const MARKER_DICTIONARY: u8 = 0x11;

/// Largest value representable as a U29
pub const U29_MAX: u32 = 0x1FFF_FFFF;

/// Smallest value of the 29-bit signed integer range
pub const INTEGER_MIN: i32 = -0x1000_0000;

/// Largest value of the 29-bit signed integer range
pub const INTEGER_MAX: i32 = 0x0FFF_FFFF;

/// Maximum nesting depth for objects/arrays (prevent stack overflow)
const MAX_NESTING_DEPTH: usize = 64;

/// Write a U29 variable-length integer, returning the bytes written (1-4).
///
/// Each byte carries 7 payload bits with the high bit as a continuation
/// marker, most significant group first. The fourth byte carries a full
/// 8 bits: 3x7 + 8 = 29. Values above [`U29_MAX`] are not representable.
pub fn write_u29(buf: &mut BytesMut, value: u32) -> Result<usize, EncodeError> {
    match value {
        0..=0x7F => {
            buf.put_u8(value as u8);
            Ok(1)
        }
        0x80..=0x3FFF => {
            buf.put_u8(0x80 | (value >> 7) as u8);
            buf.put_u8((value & 0x7F) as u8);
            Ok(2)
        }
        0x4000..=0x1F_FFFF => {
            buf.put_u8(0x80 | (value >> 14) as u8);
            buf.put_u8(0x80 | ((value >> 7) & 0x7F) as u8);
            buf.put_u8((value & 0x7F) as u8);
            Ok(3)
        }
        0x20_0000..=U29_MAX => {
            buf.put_u8(0x80 | (value >> 22) as u8);
            buf.put_u8(0x80 | ((value >> 15) & 0x7F) as u8);
            buf.put_u8(0x80 | ((value >> 8) & 0x7F) as u8);
            buf.put_u8((value & 0xFF) as u8);
            Ok(4)
        }
        _ => Err(EncodeError::U29OutOfRange(value)),
    }
}

/// Read a U29 variable-length integer.
///
/// Accumulates 7 bits per byte while the continuation bit is set,
/// switching to a full 8-bit group on the fourth byte.
pub fn read_u29(buf: &mut Bytes) -> Result<u32, DecodeError> {
    let mut value: u32 = 0;

    for i in 0..4 {
        if buf.is_empty() {
            return Err(DecodeError::UnexpectedEof);
        }
        let byte = buf.get_u8();

        if i == 3 {
            // Fourth byte: all 8 bits are payload
            return Ok((value << 8) | byte as u32);
        }

        value = (value << 7) | (byte & 0x7F) as u32;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }

    unreachable!()
}

/// Object trait descriptor: class name, dynamic flag, sealed member names
#[derive(Debug, Clone)]
struct Traits {
    class_name: String,
    dynamic: bool,
    sealed: Vec<String>,
}

/// AMF3 encoder
///
/// Holds the string, complex-object, and trait reference tables for one
/// value stream. Repeated non-empty strings and repeated complex values
/// are emitted as back-references into those tables.
pub struct Amf3Encoder {
    buf: BytesMut,
    /// String reference table, encounter order
    strings: Vec<String>,
    string_index: HashMap<String, u32>,
    /// Complex-object reference table (Object/Array/Date/ByteArray/XML)
    complexes: Vec<AmfValue>,
    /// Trait reference table, keyed by class name
    traits: Vec<String>,
}

impl Amf3Encoder {
    /// Create a new encoder
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(256),
            strings: Vec::new(),
            string_index: HashMap::new(),
            complexes: Vec::new(),
            traits: Vec::new(),
        }
    }

    /// Reset encoder state, including all reference tables
    pub fn reset(&mut self) {
        self.buf.clear();
        self.strings.clear();
        self.string_index.clear();
        self.complexes.clear();
        self.traits.clear();
    }

    /// Get the encoded bytes and reset the buffer (tables are kept; call
    /// [`reset`](Amf3Encoder::reset) to start an independent value stream)
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

    /// Encode a single AMF3 value, returning the number of bytes written
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
            AmfValue::Undefined => {
                self.buf.put_u8(MARKER_UNDEFINED);
            }
            AmfValue::Null => {
                self.buf.put_u8(MARKER_NULL);
            }
            AmfValue::Boolean(false) => {
                self.buf.put_u8(MARKER_FALSE);
            }
            AmfValue::Boolean(true) => {
                self.buf.put_u8(MARKER_TRUE);
            }
            AmfValue::Integer(i) => {
                if (INTEGER_MIN..=INTEGER_MAX).contains(i) {
                    self.buf.put_u8(MARKER_INTEGER);
                    write_u29(&mut self.buf, (*i as u32) & U29_MAX)?;
                } else {
                    // Out of the 29-bit signed range: the format promotes
                    // to double
                    self.buf.put_u8(MARKER_DOUBLE);
                    self.buf.put_f64(*i as f64);
                }
            }
            AmfValue::Number(n) => {
                self.buf.put_u8(MARKER_DOUBLE);
                self.buf.put_f64(*n);
            }
            AmfValue::String(s) => {
                self.buf.put_u8(MARKER_STRING);
                self.write_string_ref(s)?;
            }
            AmfValue::Xml(s) => {
                self.buf.put_u8(MARKER_XML);
                if self.try_write_complex_ref(value)? {
                    return Ok(());
                }
                write_u29(&mut self.buf, ((s.len() as u32) << 1) | 1)?;
                self.buf.put_slice(s.as_bytes());
                self.complexes.push(value.clone());
            }
            AmfValue::Date(ms) => {
                self.buf.put_u8(MARKER_DATE);
                if self.try_write_complex_ref(value)? {
                    return Ok(());
                }
                write_u29(&mut self.buf, 1)?;
                self.buf.put_f64(*ms);
                self.complexes.push(value.clone());
            }
            AmfValue::Array(elements) => {
                self.buf.put_u8(MARKER_ARRAY);
                if self.try_write_complex_ref(value)? {
                    return Ok(());
                }
                self.complexes.push(value.clone());
                write_u29(&mut self.buf, ((elements.len() as u32) << 1) | 1)?;
                // No associative part: empty-string sentinel straight away
                write_u29(&mut self.buf, 1)?;
                for elem in elements {
                    self.encode_value(elem)?;
                }
            }
            AmfValue::EcmaArray(props) => {
                self.buf.put_u8(MARKER_ARRAY);
                if self.try_write_complex_ref(value)? {
                    return Ok(());
                }
                self.complexes.push(value.clone());
                // Zero dense elements, associative part only
                write_u29(&mut self.buf, 1)?;
                for (key, val) in props {
                    self.write_string_ref(key)?;
                    self.encode_value(val)?;
                }
                write_u29(&mut self.buf, 1)?;
            }
            AmfValue::Object(props) => {
                self.buf.put_u8(MARKER_OBJECT);
                if self.try_write_complex_ref(value)? {
                    return Ok(());
                }
                self.complexes.push(value.clone());
                self.write_traits("")?;
                for (key, val) in props {
                    self.write_string_ref(key)?;
                    self.encode_value(val)?;
                }
                write_u29(&mut self.buf, 1)?;
            }
            AmfValue::TypedObject {
                class_name,
                properties,
            } => {
                self.buf.put_u8(MARKER_OBJECT);
                if self.try_write_complex_ref(value)? {
                    return Ok(());
                }
                self.complexes.push(value.clone());
                self.write_traits(class_name)?;
                for (key, val) in properties {
                    self.write_string_ref(key)?;
                    self.encode_value(val)?;
                }
                write_u29(&mut self.buf, 1)?;
            }
            AmfValue::ByteArray(data) => {
                self.buf.put_u8(MARKER_BYTE_ARRAY);
                if self.try_write_complex_ref(value)? {
                    return Ok(());
                }
                write_u29(&mut self.buf, ((data.len() as u32) << 1) | 1)?;
                self.buf.put_slice(data);
                self.complexes.push(value.clone());
            }
        }
        Ok(())
    }

    /// Write a string as a back-reference or an inline literal.
    ///
    /// The low bit distinguishes literal (1, remaining bits = byte length)
    /// from reference (0, remaining bits = table index). Empty strings are
    /// always literal and never enter the table.
    fn write_string_ref(&mut self, s: &str) -> Result<(), EncodeError> {
        if s.is_empty() {
            write_u29(&mut self.buf, 1)?;
            return Ok(());
        }

        if let Some(&index) = self.string_index.get(s) {
            write_u29(&mut self.buf, index << 1)?;
            return Ok(());
        }

        write_u29(&mut self.buf, ((s.len() as u32) << 1) | 1)?;
        self.buf.put_slice(s.as_bytes());
        self.string_index.insert(s.to_string(), self.strings.len() as u32);
        self.strings.push(s.to_string());
        Ok(())
    }

    /// Emit a back-reference if this complex value was already written.
    /// Returns true when a reference was emitted.
    fn try_write_complex_ref(&mut self, value: &AmfValue) -> Result<bool, EncodeError> {
        if let Some(index) = self.complexes.iter().position(|v| v == value) {
            write_u29(&mut self.buf, (index as u32) << 1)?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Write a trait descriptor: a trait reference when the class was seen
    /// before, otherwise inline (dynamic, no sealed members).
    fn write_traits(&mut self, class_name: &str) -> Result<(), EncodeError> {
        if let Some(index) = self.traits.iter().position(|c| c == class_name) {
            // Inline object (bit 0) + trait reference (bit 1 clear)
            write_u29(&mut self.buf, ((index as u32) << 2) | 0x01)?;
            return Ok(());
        }

        // Inline object + inline traits + dynamic, zero sealed members
        write_u29(&mut self.buf, 0x0B)?;
        self.write_string_ref(class_name)?;
        self.traits.push(class_name.to_string());
        Ok(())
    }
}

impl Default for Amf3Encoder {
    fn default() -> Self {
        Self::new()
    }
}

/// AMF3 decoder
///
/// Mirrors the encoder's reference tables so back-reference indices
/// resolve to the same values the peer wrote.
pub struct Amf3Decoder {
    strings: Vec<String>,
    complexes: Vec<AmfValue>,
    traits: Vec<Traits>,
    depth: usize,
}

impl Amf3Decoder {
    /// Create a new decoder
    pub fn new() -> Self {
        Self {
            strings: Vec::new(),
            complexes: Vec::new(),
            traits: Vec::new(),
            depth: 0,
        }
    }

    /// Reset decoder state, including all reference tables
    pub fn reset(&mut self) {
        self.strings.clear();
        self.complexes.clear();
        self.traits.clear();
        self.depth = 0;
    }

    /// Decode a single AMF3 value from the buffer
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
            MARKER_UNDEFINED => Ok(AmfValue::Undefined),
            MARKER_NULL => Ok(AmfValue::Null),
            MARKER_FALSE => Ok(AmfValue::Boolean(false)),
            MARKER_TRUE => Ok(AmfValue::Boolean(true)),
            MARKER_INTEGER => self.decode_integer(buf),
            MARKER_DOUBLE => self.decode_double(buf),
            MARKER_STRING => Ok(AmfValue::String(self.read_string_ref(buf)?)),
            MARKER_XML_DOC | MARKER_XML => self.decode_xml(buf),
            MARKER_DATE => self.decode_date(buf),
            MARKER_ARRAY => self.decode_array(buf),
            MARKER_OBJECT => self.decode_object(buf),
            MARKER_BYTE_ARRAY => self.decode_byte_array(buf),
            MARKER_VECTOR_INT..=MARKER_DICTIONARY => Err(DecodeError::UnsupportedMarker(marker)),
            _ => Err(DecodeError::UnknownMarker(marker)),
        }
    }

    fn decode_integer(&mut self, buf: &mut Bytes) -> Result<AmfValue, DecodeError> {
        let raw = read_u29(buf)?;
        // Bit 28 set means negative: sign-extend from 29 bits
        let value = if raw & 0x1000_0000 != 0 {
            raw as i32 - 0x2000_0000
        } else {
            raw as i32
        };
        Ok(AmfValue::Integer(value))
    }

    fn decode_double(&mut self, buf: &mut Bytes) -> Result<AmfValue, DecodeError> {
        if buf.remaining() < 8 {
            return Err(DecodeError::UnexpectedEof);
        }
        Ok(AmfValue::Number(buf.get_f64()))
    }

    fn decode_xml(&mut self, buf: &mut Bytes) -> Result<AmfValue, DecodeError> {
        let header = read_u29(buf)?;
        if header & 1 == 0 {
            return self.complex_ref(header >> 1);
        }

        let len = (header >> 1) as usize;
        if buf.remaining() < len {
            return Err(DecodeError::UnexpectedEof);
        }
        let bytes = buf.copy_to_bytes(len);
        let s = String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::InvalidUtf8)?;

        let value = AmfValue::Xml(s);
        self.complexes.push(value.clone());
        Ok(value)
    }

    fn decode_date(&mut self, buf: &mut Bytes) -> Result<AmfValue, DecodeError> {
        let header = read_u29(buf)?;
        if header & 1 == 0 {
            return self.complex_ref(header >> 1);
        }

        if buf.remaining() < 8 {
            return Err(DecodeError::UnexpectedEof);
        }
        let value = AmfValue::Date(buf.get_f64());
        self.complexes.push(value.clone());
        Ok(value)
    }

    fn decode_array(&mut self, buf: &mut Bytes) -> Result<AmfValue, DecodeError> {
        let header = read_u29(buf)?;
        if header & 1 == 0 {
            return self.complex_ref(header >> 1);
        }

        let dense_count = (header >> 1) as usize;

        // Reference index is assigned before contents are read
        let slot = self.complexes.len();
        self.complexes.push(AmfValue::Null);

        let mut associative = HashMap::new();
        loop {
            let key = self.read_string_ref(buf)?;
            if key.is_empty() {
                break;
            }
            let value = self.decode(buf)?;
            associative.insert(key, value);
        }

        let mut dense = Vec::with_capacity(dense_count.min(1024));
        for _ in 0..dense_count {
            dense.push(self.decode(buf)?);
        }

        let value = if associative.is_empty() {
            AmfValue::Array(dense)
        } else {
            // Mixed arrays fold the dense part in under index keys
            for (i, elem) in dense.into_iter().enumerate() {
                associative.insert(i.to_string(), elem);
            }
            AmfValue::EcmaArray(associative)
        };

        self.complexes[slot] = value.clone();
        Ok(value)
    }

    fn decode_object(&mut self, buf: &mut Bytes) -> Result<AmfValue, DecodeError> {
        let header = read_u29(buf)?;
        if header & 1 == 0 {
            return self.complex_ref(header >> 1);
        }

        let traits = if header & 2 == 0 {
            // Trait reference
            let index = (header >> 2) as usize;
            self.traits
                .get(index)
                .cloned()
                .ok_or(DecodeError::InvalidTraitReference(index as u32))?
        } else {
            if header & 4 != 0 {
                // Externalizable: member layout is defined by class code we
                // do not have
                return Err(DecodeError::Externalizable);
            }
            let dynamic = header & 8 != 0;
            let sealed_count = (header >> 4) as usize;
            let class_name = self.read_string_ref(buf)?;

            let mut sealed = Vec::with_capacity(sealed_count.min(256));
            for _ in 0..sealed_count {
                sealed.push(self.read_string_ref(buf)?);
            }

            let traits = Traits {
                class_name,
                dynamic,
                sealed,
            };
            self.traits.push(traits.clone());
            traits
        };

        let slot = self.complexes.len();
        self.complexes.push(AmfValue::Null);

        let mut properties = HashMap::new();

        for name in &traits.sealed {
            let value = self.decode(buf)?;
            properties.insert(name.clone(), value);
        }

        if traits.dynamic {
            loop {
                let key = self.read_string_ref(buf)?;
                if key.is_empty() {
                    break;
                }
                let value = self.decode(buf)?;
                properties.insert(key, value);
            }
        }

        let value = if traits.class_name.is_empty() {
            AmfValue::Object(properties)
        } else {
            AmfValue::TypedObject {
                class_name: traits.class_name,
                properties,
            }
        };

        self.complexes[slot] = value.clone();
        Ok(value)
    }

    fn decode_byte_array(&mut self, buf: &mut Bytes) -> Result<AmfValue, DecodeError> {
        let header = read_u29(buf)?;
        if header & 1 == 0 {
            return self.complex_ref(header >> 1);
        }

        let len = (header >> 1) as usize;
        if buf.remaining() < len {
            return Err(DecodeError::UnexpectedEof);
        }

        let value = AmfValue::ByteArray(buf.copy_to_bytes(len).to_vec());
        self.complexes.push(value.clone());
        Ok(value)
    }

    fn complex_ref(&self, index: u32) -> Result<AmfValue, DecodeError> {
        self.complexes
            .get(index as usize)
            .cloned()
            .ok_or(DecodeError::InvalidReference(index))
    }

    /// Read a string header: back-reference or inline literal.
    /// Non-empty literals are appended to the string table.
    fn read_string_ref(&mut self, buf: &mut Bytes) -> Result<String, DecodeError> {
        let header = read_u29(buf)?;

        if header & 1 == 0 {
            let index = (header >> 1) as usize;
            return self
                .strings
                .get(index)
                .cloned()
                .ok_or(DecodeError::InvalidReference(index as u32));
        }

        let len = (header >> 1) as usize;
        if len == 0 {
            return Ok(String::new());
        }
        if buf.remaining() < len {
            return Err(DecodeError::UnexpectedEof);
        }

        let bytes = buf.copy_to_bytes(len);
        let s = String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::InvalidUtf8)?;
        self.strings.push(s.clone());
        Ok(s)
    }
}

impl Default for Amf3Decoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience function to encode a single value
pub fn encode(value: &AmfValue) -> Result<Bytes, EncodeError> {
    let mut encoder = Amf3Encoder::new();
    encoder.encode(value)?;
    Ok(encoder.finish())
}

/// Convenience function to encode multiple values
pub fn encode_all(values: &[AmfValue]) -> Result<Bytes, EncodeError> {
    let mut encoder = Amf3Encoder::new();
    encoder.encode_all(values)?;
    Ok(encoder.finish())
}

/// Convenience function to decode a single value
pub fn decode(data: &[u8]) -> Result<AmfValue, DecodeError> {
    let mut decoder = Amf3Decoder::new();
    let mut buf = Bytes::copy_from_slice(data);
    decoder.decode(&mut buf)
}

/// Convenience function to decode all values
pub fn decode_all(data: &[u8]) -> Result<Vec<AmfValue>, DecodeError> {
    let mut decoder = Amf3Decoder::new();
    let mut buf = Bytes::copy_from_slice(data);
    decoder.decode_all(&mut buf)
}
