//! AMF0 decoding for FLV script-data tags.

use crate::cursor::ByteCursor;
use crate::error::{DecodeError, Result};
use serde::Serialize;

/// AMF0 marker types (amf0_spec_121207 section 2.1).
///
/// Markers from 0x0d on (unsupported, recordset, xml document, typed object,
/// AVM+) are rejected by the decoder as [`DecodeError::UnknownMarker`].
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[repr(u8)]
pub enum Amf0Marker {
    Number = 0x00,
    Boolean = 0x01,
    String = 0x02,
    Object = 0x03,
    /// reserved, carries no payload
    MovieClip = 0x04,
    Null = 0x05,
    Undefined = 0x06,
    Reference = 0x07,
    EcmaArray = 0x08,
    ObjectEnd = 0x09,
    StrictArray = 0x0a,
    Date = 0x0b,
    LongString = 0x0c,
}

impl TryFrom<u8> for Amf0Marker {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, u8> {
        match value {
            0x00 => Ok(Self::Number),
            0x01 => Ok(Self::Boolean),
            0x02 => Ok(Self::String),
            0x03 => Ok(Self::Object),
            0x04 => Ok(Self::MovieClip),
            0x05 => Ok(Self::Null),
            0x06 => Ok(Self::Undefined),
            0x07 => Ok(Self::Reference),
            0x08 => Ok(Self::EcmaArray),
            0x09 => Ok(Self::ObjectEnd),
            0x0a => Ok(Self::StrictArray),
            0x0b => Ok(Self::Date),
            0x0c => Ok(Self::LongString),
            other => Err(other),
        }
    }
}

/// The 3-byte sequence closing an object: an empty name then the
/// object-end marker.
pub const OBJECT_END: [u8; 3] = [0x00, 0x00, 0x09];

/// A decoded AMF0 value. Each decode call owns the tree it returns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Amf0Value {
    Number(f64),
    Boolean(bool),
    String(String),
    /// Properties in encounter order.
    Object(Vec<(String, Amf0Value)>),
    MovieClip,
    Null,
    Undefined,
    /// Index into the caller's object table; never resolved here.
    Reference(u16),
    EcmaArray(Vec<(String, Amf0Value)>),
    ObjectEndMarker,
    StrictArray(Vec<Amf0Value>),
    Date {
        /// Milliseconds since the Unix epoch.
        epoch_ms: f64,
        tz_offset_minutes: i16,
    },
    LongString(String),
}

impl Amf0Value {
    pub fn marker(&self) -> Amf0Marker {
        match self {
            Self::Number(_) => Amf0Marker::Number,
            Self::Boolean(_) => Amf0Marker::Boolean,
            Self::String(_) => Amf0Marker::String,
            Self::Object(_) => Amf0Marker::Object,
            Self::MovieClip => Amf0Marker::MovieClip,
            Self::Null => Amf0Marker::Null,
            Self::Undefined => Amf0Marker::Undefined,
            Self::Reference(_) => Amf0Marker::Reference,
            Self::EcmaArray(_) => Amf0Marker::EcmaArray,
            Self::ObjectEndMarker => Amf0Marker::ObjectEnd,
            Self::StrictArray(_) => Amf0Marker::StrictArray,
            Self::Date { .. } => Amf0Marker::Date,
            Self::LongString(_) => Amf0Marker::LongString,
        }
    }

    #[inline]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) | Self::LongString(s) => Some(s),
            _ => None,
        }
    }

    /// Properties of an `Object` or `EcmaArray`.
    #[inline]
    pub fn as_properties(&self) -> Option<&[(String, Amf0Value)]> {
        match self {
            Self::Object(p) | Self::EcmaArray(p) => Some(p),
            _ => None,
        }
    }

    /// Look up a property by name in an `Object` or `EcmaArray`.
    pub fn get(&self, name: &str) -> Option<&Amf0Value> {
        self.as_properties()?
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }
}

pub const DEFAULT_MAX_DEPTH: usize = 64;

/// An AMF0 decoder over a byte slice.
///
/// Nesting of objects and arrays is limited to `max_depth` levels; deeper
/// input fails with [`DecodeError::NestingTooDeep`].
#[derive(Debug, Clone)]
pub struct Amf0Decoder<'a> {
    cur: ByteCursor<'a>,
    pos: usize,
    depth: usize,
    max_depth: usize,
}

impl<'a> Amf0Decoder<'a> {
    pub const fn new(data: &'a [u8]) -> Self {
        Self {
            cur: ByteCursor::new(data),
            pos: 0,
            depth: 0,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub const fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Start decoding at `offset` instead of the beginning of the buffer.
    pub const fn at(mut self, offset: usize) -> Self {
        self.pos = offset;
        self
    }

    pub const fn position(&self) -> usize {
        self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.cur.len()
    }

    fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let bytes = self.cur.read_bytes(self.pos, len)?;
        self.pos += len;
        Ok(bytes)
    }

    fn read_u8(&mut self) -> Result<u8> {
        let v = self.cur.read_u8(self.pos)?;
        self.pos += 1;
        Ok(v)
    }

    fn read_u16(&mut self) -> Result<u16> {
        let v = self.cur.read_u16(self.pos)?;
        self.pos += 2;
        Ok(v)
    }

    fn read_u32(&mut self) -> Result<u32> {
        let v = self.cur.read_u32(self.pos)?;
        self.pos += 4;
        Ok(v)
    }

    fn read_f64(&mut self) -> Result<f64> {
        let v = self.cur.read_f64(self.pos)?;
        self.pos += 8;
        Ok(v)
    }

    fn read_i16(&mut self) -> Result<i16> {
        let v = self.cur.read_i16(self.pos)?;
        self.pos += 2;
        Ok(v)
    }

    /// Read the next value.
    pub fn decode(&mut self) -> Result<Amf0Value> {
        let marker = Amf0Marker::try_from(self.read_u8()?).map_err(DecodeError::UnknownMarker)?;

        match marker {
            Amf0Marker::Number => Ok(Amf0Value::Number(self.read_f64()?)),
            Amf0Marker::Boolean => Ok(Amf0Value::Boolean(self.read_u8()? != 0)),
            Amf0Marker::String => Ok(Amf0Value::String(self.read_string()?)),
            Amf0Marker::Object => self.nested(|d| d.read_object().map(Amf0Value::Object)),
            Amf0Marker::MovieClip => Ok(Amf0Value::MovieClip),
            Amf0Marker::Null => Ok(Amf0Value::Null),
            Amf0Marker::Undefined => Ok(Amf0Value::Undefined),
            Amf0Marker::Reference => Ok(Amf0Value::Reference(self.read_u16()?)),
            Amf0Marker::EcmaArray => {
                self.nested(|d| d.read_ecma_array().map(Amf0Value::EcmaArray))
            }
            Amf0Marker::ObjectEnd => Ok(Amf0Value::ObjectEndMarker),
            Amf0Marker::StrictArray => {
                self.nested(|d| d.read_strict_array().map(Amf0Value::StrictArray))
            }
            Amf0Marker::Date => Ok(Amf0Value::Date {
                epoch_ms: self.read_f64()?,
                tz_offset_minutes: self.read_i16()?,
            }),
            Amf0Marker::LongString => Ok(Amf0Value::LongString(self.read_long_string()?)),
        }
    }

    /// Read values until the buffer is exhausted.
    pub fn decode_all(&mut self) -> Result<Vec<Amf0Value>> {
        let mut values = Vec::new();
        while !self.is_empty() {
            values.push(self.decode()?);
        }
        Ok(values)
    }

    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.depth >= self.max_depth {
            return Err(DecodeError::NestingTooDeep {
                max_depth: self.max_depth,
            });
        }
        self.depth += 1;
        let out = f(self);
        self.depth -= 1;
        out
    }

    fn read_string(&mut self) -> Result<String> {
        let len = self.read_u16()? as usize;
        let bytes = self.read_bytes(len)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    fn read_long_string(&mut self) -> Result<String> {
        let len = self.read_u32()? as usize;
        let bytes = self.read_bytes(len)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    /// Consume the object end sequence if it is next.
    fn at_object_end(&mut self) -> bool {
        let end = self
            .cur
            .read_bytes(self.pos, OBJECT_END.len())
            .is_ok_and(|b| b == OBJECT_END);
        if end {
            self.pos += OBJECT_END.len();
        }
        end
    }

    fn read_object(&mut self) -> Result<Vec<(String, Amf0Value)>> {
        let mut properties = Vec::new();
        while !self.at_object_end() {
            let key = self.read_string()?;
            let val = self.decode()?;
            properties.push((key, val));
        }
        Ok(properties)
    }

    // Bounded by the declared count only. A trailing end sequence is left for
    // the caller.
    fn read_ecma_array(&mut self) -> Result<Vec<(String, Amf0Value)>> {
        let count = self.read_u32()?;
        let mut properties = Vec::new();
        for _ in 0..count {
            let key = self.read_string()?;
            let val = self.decode()?;
            properties.push((key, val));
        }
        Ok(properties)
    }

    fn read_strict_array(&mut self) -> Result<Vec<Amf0Value>> {
        let count = self.read_u32()?;
        let mut values = Vec::new();
        for _ in 0..count {
            values.push(self.decode()?);
        }
        Ok(values)
    }
}

impl Iterator for Amf0Decoder<'_> {
    type Item = Result<Amf0Value>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.is_empty() {
            return None;
        }
        Some(self.decode())
    }
}

/// Decode one value at `offset`, returning it with the offset just past it.
pub fn decode_value(buf: &[u8], offset: usize) -> Result<(Amf0Value, usize)> {
    let mut dec = Amf0Decoder::new(buf).at(offset);
    let value = dec.decode()?;
    Ok((value, dec.position()))
}

/// Decode the body of an FLV script-data tag.
///
/// Values are read until the payload is exhausted. An object end sequence
/// directly after a top-level ECMA array (as written for `onMetaData`) is
/// consumed and reported as [`Amf0Value::ObjectEndMarker`].
pub fn decode_script_data(payload: &[u8]) -> Result<Vec<Amf0Value>> {
    decode_script_data_with(payload, DEFAULT_MAX_DEPTH)
}

pub fn decode_script_data_with(payload: &[u8], max_depth: usize) -> Result<Vec<Amf0Value>> {
    let mut dec = Amf0Decoder::new(payload).with_max_depth(max_depth);
    let mut values = Vec::new();
    while !dec.is_empty() {
        // only an ECMA array leaves its end sequence behind
        let after_array = matches!(values.last(), Some(Amf0Value::EcmaArray(_)));
        if after_array && dec.at_object_end() {
            values.push(Amf0Value::ObjectEndMarker);
            continue;
        }
        values.push(dec.decode()?);
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_string() {
        let data = [0x02, 0x00, 0x03, b'a', b'b', b'c'];
        let (value, next) = decode_value(&data, 0).unwrap();
        assert_eq!(value, Amf0Value::String("abc".to_string()));
        assert_eq!(next, 6);
    }

    #[test]
    fn test_reader_number() {
        let mut data = vec![0x00];
        data.extend_from_slice(&0x4059_0000_0000_0000u64.to_be_bytes());
        let (value, next) = decode_value(&data, 0).unwrap();
        assert_eq!(value, Amf0Value::Number(100.0));
        assert_eq!(next, 9);
    }

    #[test]
    fn test_reader_at_offset() {
        let data = [0xff, 0xff, 0x01, 0x01, 0x05];
        let (value, next) = decode_value(&data, 2).unwrap();
        assert_eq!(value, Amf0Value::Boolean(true));
        let (value, _) = decode_value(&data, next).unwrap();
        assert_eq!(value, Amf0Value::Null);
    }

    #[test]
    fn test_reader_object_stops_at_end_marker() {
        let mut data = vec![0x03, 0x00, 0x04];
        data.extend_from_slice(b"test");
        data.push(0x05); // null
        data.extend_from_slice(&OBJECT_END);
        data.push(0x06); // undefined, after the object

        let (value, next) = decode_value(&data, 0).unwrap();
        assert_eq!(
            value,
            Amf0Value::Object(vec![("test".to_string(), Amf0Value::Null)])
        );
        assert_eq!(next, data.len() - 1);
    }

    #[test]
    fn test_reader_ecma_array_is_count_bounded() {
        let mut data = vec![0x08, 0x00, 0x00, 0x00, 0x01];
        data.extend_from_slice(&[0x00, 0x01, b'k']);
        data.extend_from_slice(&[0x01, 0x00]);
        data.extend_from_slice(&OBJECT_END);

        let (value, next) = decode_value(&data, 0).unwrap();
        assert_eq!(
            value,
            Amf0Value::EcmaArray(vec![("k".to_string(), Amf0Value::Boolean(false))])
        );
        // the end sequence is not part of the array
        assert_eq!(next, data.len() - 3);
    }

    #[test]
    fn test_reader_strict_array_and_date() {
        let mut data = vec![0x0a, 0x00, 0x00, 0x00, 0x02];
        data.push(0x00);
        data.extend_from_slice(&1.5f64.to_be_bytes());
        data.push(0x0b);
        data.extend_from_slice(&1234567890.0f64.to_be_bytes());
        data.extend_from_slice(&(-60i16).to_be_bytes());

        let (value, _) = decode_value(&data, 0).unwrap();
        assert_eq!(
            value,
            Amf0Value::StrictArray(vec![
                Amf0Value::Number(1.5),
                Amf0Value::Date {
                    epoch_ms: 1234567890.0,
                    tz_offset_minutes: -60
                },
            ])
        );
    }

    #[test]
    fn test_reader_reference_and_long_string() {
        let mut data = vec![0x07, 0x00, 0x2a, 0x0c, 0x00, 0x00, 0x00, 0x02];
        data.extend_from_slice(b"hi");
        let values = Amf0Decoder::new(&data).decode_all().unwrap();
        assert_eq!(
            values,
            vec![
                Amf0Value::Reference(42),
                Amf0Value::LongString("hi".to_string())
            ]
        );
    }

    #[test]
    fn test_string_length_past_buffer() {
        let data = [0x02, 0x00, 0x10, b'a'];
        assert!(matches!(
            decode_value(&data, 0),
            Err(DecodeError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_unknown_marker() {
        assert_eq!(
            decode_value(&[0x11], 0),
            Err(DecodeError::UnknownMarker(0x11))
        );
    }

    #[test]
    fn test_nesting_limit() {
        // five strict arrays of one element each, innermost null
        let mut data = Vec::new();
        for _ in 0..5 {
            data.extend_from_slice(&[0x0a, 0x00, 0x00, 0x00, 0x01]);
        }
        data.push(0x05);

        let mut dec = Amf0Decoder::new(&data).with_max_depth(4);
        assert_eq!(
            dec.decode(),
            Err(DecodeError::NestingTooDeep { max_depth: 4 })
        );
        let mut dec = Amf0Decoder::new(&data).with_max_depth(5);
        assert!(dec.decode().is_ok());
    }

    #[test]
    fn test_script_data_with_trailing_end_marker() {
        let mut data = vec![0x02, 0x00, 0x0a];
        data.extend_from_slice(b"onMetaData");
        data.extend_from_slice(&[0x08, 0x00, 0x00, 0x00, 0x01]);
        data.extend_from_slice(&[0x00, 0x08]);
        data.extend_from_slice(b"duration");
        data.push(0x00);
        data.extend_from_slice(&12.5f64.to_be_bytes());
        data.extend_from_slice(&OBJECT_END);

        let values = decode_script_data(&data).unwrap();
        assert_eq!(values.len(), 3);
        assert_eq!(values[0].as_str(), Some("onMetaData"));
        assert_eq!(
            values[1].get("duration").and_then(Amf0Value::as_number),
            Some(12.5)
        );
        assert_eq!(values[2], Amf0Value::ObjectEndMarker);
    }

    #[test]
    fn test_script_data_number_resembling_end_marker() {
        // Number marker, then a double whose first bytes are 00 09
        let data = [0x00, 0x00, 0x09, 0, 0, 0, 0, 0, 0x01];
        let values = decode_script_data(&data).unwrap();
        assert_eq!(
            values,
            vec![Amf0Value::Number(f64::from_bits(0x0009_0000_0000_0001))]
        );

        let mut data = vec![0x02, 0x00, 0x01, b'x'];
        data.extend_from_slice(&[0x00, 0x00, 0x09, 0, 0, 0, 0, 0, 0x01]);
        let values = decode_script_data(&data).unwrap();
        assert_eq!(values.len(), 2);
        assert!(matches!(values[1], Amf0Value::Number(_)));
    }
}
