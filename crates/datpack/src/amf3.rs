//! AMF3 object-graph codec.
//!
//! Implements the subset of the AMF3 wire format the package index actually
//! uses: variable-length integers, doubles, UTF-8 strings, dense arrays, and
//! anonymous dynamic objects, with the reference tables that deduplicate
//! repeated strings and object instances. Reference indices are assigned in
//! first-seen order on both sides, so encoder and decoder stay in lockstep.

use std::collections::HashMap;

use thiserror::Error;

const MARKER_UNDEFINED: u8 = 0x00;
const MARKER_NULL: u8 = 0x01;
const MARKER_FALSE: u8 = 0x02;
const MARKER_TRUE: u8 = 0x03;
const MARKER_INTEGER: u8 = 0x04;
const MARKER_DOUBLE: u8 = 0x05;
const MARKER_STRING: u8 = 0x06;
const MARKER_ARRAY: u8 = 0x09;
const MARKER_OBJECT: u8 = 0x0A;

/// Signed 29-bit integer range; values outside it go on the wire as doubles.
const INT_MIN: i32 = -0x1000_0000;
const INT_MAX: i32 = 0x0FFF_FFFF;

/// Trait word for an inline anonymous dynamic object with no sealed members.
const ANONYMOUS_DYNAMIC_TRAIT: u32 = 0x0B;

/// Largest inline string/array length whose U29 header (`len << 1 | 1`)
/// still fits in 29 bits.
const MAX_INLINE_LEN: usize = 0x0FFF_FFFF;

/// Decode recursion cap. Real indices are two levels deep; a stream nested
/// past this is malformed, and recursing into it unbounded would exhaust
/// the stack.
const NESTING_LIMIT: usize = 256;

#[derive(Debug, Error)]
pub enum Amf3Error {
    #[error("unexpected end of data at offset {offset} (need {need} bytes, have {have})")]
    UnexpectedEof {
        offset: usize,
        need: usize,
        have: usize,
    },

    #[error("unknown type marker {marker:#04x} at offset {offset}")]
    UnknownMarker { marker: u8, offset: usize },

    #[error("{kind} reference {index} out of bounds (table holds {len})")]
    BadReference {
        kind: &'static str,
        index: usize,
        len: usize,
    },

    #[error("string at offset {offset} is not valid UTF-8")]
    InvalidUtf8 { offset: usize },

    #[error("value nesting exceeds {limit} levels")]
    NestingTooDeep { limit: usize },

    #[error("cannot encode {kind} of {len} elements (29-bit length limit)")]
    Oversized { kind: &'static str, len: usize },

    #[error("unsupported stream feature: {0}")]
    UnsupportedFeature(&'static str),

    #[error("cannot encode {0} value")]
    UnsupportedValue(&'static str),
}

/// A decoded AMF3 value.
///
/// `Undefined`, `Null`, and `Bool` exist for completeness of the wire
/// format's type tags; the package index only ever exercises the numeric,
/// string, array, and object variants.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    /// Signed 29-bit integer. Values outside that range are encoded as
    /// doubles on the wire.
    Integer(i32),
    Double(f64),
    String(String),
    /// Dense array.
    Array(Vec<Value>),
    /// Dynamic string-keyed map, in insertion order.
    Object(Vec<(String, Value)>),
}

impl Value {
    /// Numeric accessor with double normalization.
    ///
    /// Some encoders emit doubles for fields that are logically integers
    /// (offsets, lengths); this collapses either representation to a `u32`.
    pub fn as_u32(&self) -> Option<u32> {
        match *self {
            Value::Integer(n) if n >= 0 => Some(n as u32),
            Value::Double(d) if d.is_finite() && d >= 0.0 && d <= f64::from(u32::MAX) => {
                Some(d as u32)
            }
            _ => None,
        }
    }
}

/// Encode a value tree to AMF3 bytes.
pub fn encode(value: &Value) -> Result<Vec<u8>, Amf3Error> {
    let mut encoder = Encoder::default();
    encoder.write_value(value)?;
    Ok(encoder.out)
}

/// Decode a single AMF3 value from the front of `data`.
pub fn decode(data: &[u8]) -> Result<Value, Amf3Error> {
    Decoder::new(data).read_value()
}

#[derive(Default)]
struct Encoder {
    out: Vec<u8>,
    strings: HashMap<String, u32>,
    objects: Vec<Value>,
}

impl Encoder {
    fn write_u29(&mut self, v: u32) {
        debug_assert!(v < 1 << 29);
        if v < 0x80 {
            self.out.push(v as u8);
        } else if v < 0x4000 {
            self.out.push((v >> 7) as u8 | 0x80);
            self.out.push((v & 0x7F) as u8);
        } else if v < 0x20_0000 {
            self.out.push((v >> 14) as u8 | 0x80);
            self.out.push(((v >> 7) & 0x7F) as u8 | 0x80);
            self.out.push((v & 0x7F) as u8);
        } else {
            self.out.push((v >> 22) as u8 | 0x80);
            self.out.push(((v >> 15) & 0x7F) as u8 | 0x80);
            self.out.push(((v >> 8) & 0x7F) as u8 | 0x80);
            self.out.push((v & 0xFF) as u8);
        }
    }

    /// UTF-8-vr: back-reference for a known string, inline length + bytes
    /// otherwise. The empty string is always inline and never enters the
    /// reference table. Shared by string values and object member keys.
    fn write_string(&mut self, s: &str) -> Result<(), Amf3Error> {
        if s.len() > MAX_INLINE_LEN {
            return Err(Amf3Error::Oversized {
                kind: "string",
                len: s.len(),
            });
        }
        if !s.is_empty() {
            if let Some(&index) = self.strings.get(s) {
                self.write_u29(index << 1);
                return Ok(());
            }
            let index = self.strings.len() as u32;
            self.strings.insert(s.to_owned(), index);
        }
        self.write_u29((s.len() as u32) << 1 | 1);
        self.out.extend_from_slice(s.as_bytes());
        Ok(())
    }

    fn object_ref(&self, value: &Value) -> Option<u32> {
        self.objects.iter().position(|o| o == value).map(|i| i as u32)
    }

    fn write_value(&mut self, value: &Value) -> Result<(), Amf3Error> {
        match value {
            Value::Undefined => Err(Amf3Error::UnsupportedValue("undefined")),
            Value::Null => Err(Amf3Error::UnsupportedValue("null")),
            Value::Bool(_) => Err(Amf3Error::UnsupportedValue("boolean")),
            Value::Integer(n) => {
                if (INT_MIN..=INT_MAX).contains(n) {
                    self.out.push(MARKER_INTEGER);
                    self.write_u29((*n as u32) & 0x1FFF_FFFF);
                } else {
                    self.out.push(MARKER_DOUBLE);
                    self.out.extend_from_slice(&f64::from(*n).to_be_bytes());
                }
                Ok(())
            }
            Value::Double(d) => {
                self.out.push(MARKER_DOUBLE);
                self.out.extend_from_slice(&d.to_be_bytes());
                Ok(())
            }
            Value::String(s) => {
                self.out.push(MARKER_STRING);
                self.write_string(s)
            }
            Value::Array(items) => self.write_array(items, value),
            Value::Object(members) => self.write_object(members, value),
        }
    }

    fn write_array(&mut self, items: &[Value], whole: &Value) -> Result<(), Amf3Error> {
        self.out.push(MARKER_ARRAY);
        if let Some(index) = self.object_ref(whole) {
            self.write_u29(index << 1);
            return Ok(());
        }
        if items.len() > MAX_INLINE_LEN {
            return Err(Amf3Error::Oversized {
                kind: "array",
                len: items.len(),
            });
        }
        // Register before the children so reference indices line up with
        // the decoder's table.
        self.objects.push(whole.clone());
        self.write_u29((items.len() as u32) << 1 | 1);
        self.write_string("")?;
        for item in items {
            self.write_value(item)?;
        }
        Ok(())
    }

    fn write_object(&mut self, members: &[(String, Value)], whole: &Value) -> Result<(), Amf3Error> {
        self.out.push(MARKER_OBJECT);
        if let Some(index) = self.object_ref(whole) {
            self.write_u29(index << 1);
            return Ok(());
        }
        self.objects.push(whole.clone());
        self.write_u29(ANONYMOUS_DYNAMIC_TRAIT);
        self.write_string("")?;
        for (key, value) in members {
            if key.is_empty() {
                // The empty key is the member-list terminator on the wire.
                return Err(Amf3Error::UnsupportedValue("empty member key"));
            }
            self.write_string(key)?;
            self.write_value(value)?;
        }
        self.write_string("")
    }
}

#[derive(Clone)]
struct ObjectTrait {
    dynamic: bool,
    sealed: Vec<String>,
}

struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
    depth: usize,
    strings: Vec<String>,
    objects: Vec<Value>,
    traits: Vec<ObjectTrait>,
}

impl<'a> Decoder<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            depth: 0,
            strings: Vec::new(),
            objects: Vec::new(),
            traits: Vec::new(),
        }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], Amf3Error> {
        let have = self.data.len() - self.pos;
        if have < n {
            return Err(Amf3Error::UnexpectedEof {
                offset: self.pos,
                need: n,
                have,
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_u8(&mut self) -> Result<u8, Amf3Error> {
        Ok(self.take(1)?[0])
    }

    fn read_u29(&mut self) -> Result<u32, Amf3Error> {
        let mut acc = 0u32;
        let mut byte = self.read_u8()?;
        for _ in 0..3 {
            if byte & 0x80 == 0 {
                return Ok((acc << 7) | u32::from(byte));
            }
            acc = (acc << 7) | u32::from(byte & 0x7F);
            byte = self.read_u8()?;
        }
        // Fourth byte carries a full 8 bits.
        Ok((acc << 8) | u32::from(byte))
    }

    fn read_string(&mut self) -> Result<String, Amf3Error> {
        let header = self.read_u29()?;
        if header & 1 == 0 {
            let index = (header >> 1) as usize;
            return self.strings.get(index).cloned().ok_or(Amf3Error::BadReference {
                kind: "string",
                index,
                len: self.strings.len(),
            });
        }
        let len = (header >> 1) as usize;
        let offset = self.pos;
        let bytes = self.take(len)?;
        let s = std::str::from_utf8(bytes)
            .map_err(|_| Amf3Error::InvalidUtf8 { offset })?
            .to_owned();
        if !s.is_empty() {
            self.strings.push(s.clone());
        }
        Ok(s)
    }

    fn object_table_get(&self, index: usize) -> Result<Value, Amf3Error> {
        self.objects.get(index).cloned().ok_or(Amf3Error::BadReference {
            kind: "object",
            index,
            len: self.objects.len(),
        })
    }

    /// Containers recurse through here, so a crafted stream of nested
    /// inline markers must hit the depth cap and error rather than blow
    /// the stack.
    fn read_value(&mut self) -> Result<Value, Amf3Error> {
        if self.depth >= NESTING_LIMIT {
            return Err(Amf3Error::NestingTooDeep {
                limit: NESTING_LIMIT,
            });
        }
        self.depth += 1;
        let value = self.read_marked_value();
        self.depth -= 1;
        value
    }

    fn read_marked_value(&mut self) -> Result<Value, Amf3Error> {
        let offset = self.pos;
        let marker = self.read_u8()?;
        match marker {
            MARKER_UNDEFINED => Ok(Value::Undefined),
            MARKER_NULL => Ok(Value::Null),
            MARKER_FALSE => Ok(Value::Bool(false)),
            MARKER_TRUE => Ok(Value::Bool(true)),
            MARKER_INTEGER => {
                let raw = self.read_u29()?;
                let n = if raw & 0x1000_0000 != 0 {
                    (raw | 0xE000_0000) as i32
                } else {
                    raw as i32
                };
                Ok(Value::Integer(n))
            }
            MARKER_DOUBLE => {
                let bytes = self.take(8)?;
                let mut buf = [0u8; 8];
                buf.copy_from_slice(bytes);
                Ok(Value::Double(f64::from_be_bytes(buf)))
            }
            MARKER_STRING => Ok(Value::String(self.read_string()?)),
            MARKER_ARRAY => self.read_array(),
            MARKER_OBJECT => self.read_object(),
            _ => Err(Amf3Error::UnknownMarker { marker, offset }),
        }
    }

    fn read_array(&mut self) -> Result<Value, Amf3Error> {
        let header = self.read_u29()?;
        if header & 1 == 0 {
            return self.object_table_get((header >> 1) as usize);
        }
        let count = (header >> 1) as usize;
        let slot = self.objects.len();
        // Placeholder so children see consistent reference indices.
        self.objects.push(Value::Null);
        let key = self.read_string()?;
        if !key.is_empty() {
            return Err(Amf3Error::UnsupportedFeature("associative array section"));
        }
        let mut items = Vec::with_capacity(count.min(4096));
        for _ in 0..count {
            items.push(self.read_value()?);
        }
        let array = Value::Array(items);
        self.objects[slot] = array.clone();
        Ok(array)
    }

    fn read_object(&mut self) -> Result<Value, Amf3Error> {
        let header = self.read_u29()?;
        if header & 1 == 0 {
            return self.object_table_get((header >> 1) as usize);
        }
        let object_trait = if header & 2 == 0 {
            let index = (header >> 2) as usize;
            self.traits.get(index).cloned().ok_or(Amf3Error::BadReference {
                kind: "trait",
                index,
                len: self.traits.len(),
            })?
        } else {
            if header & 4 != 0 {
                return Err(Amf3Error::UnsupportedFeature("externalizable object"));
            }
            let dynamic = header & 8 != 0;
            let sealed_count = (header >> 4) as usize;
            let _class_name = self.read_string()?;
            let mut sealed = Vec::with_capacity(sealed_count.min(64));
            for _ in 0..sealed_count {
                sealed.push(self.read_string()?);
            }
            let t = ObjectTrait { dynamic, sealed };
            self.traits.push(t.clone());
            t
        };

        let slot = self.objects.len();
        self.objects.push(Value::Null);
        let mut members = Vec::new();
        for name in &object_trait.sealed {
            let value = self.read_value()?;
            members.push((name.clone(), value));
        }
        if object_trait.dynamic {
            loop {
                let key = self.read_string()?;
                if key.is_empty() {
                    break;
                }
                let value = self.read_value()?;
                members.push((key, value));
            }
        }
        let object = Value::Object(members);
        self.objects[slot] = object.clone();
        Ok(object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(value: &Value) -> Value {
        decode(&encode(value).unwrap()).unwrap()
    }

    #[test]
    fn test_integer_roundtrip() {
        for n in [0, 1, 127, 128, 16383, 16384, 0x1F_FFFF, 0x20_0000, INT_MAX, -1, INT_MIN] {
            assert_eq!(roundtrip(&Value::Integer(n)), Value::Integer(n), "n = {n}");
        }
    }

    #[test]
    fn test_u29_boundary_byte_lengths() {
        // marker + 1..4 payload bytes
        assert_eq!(encode(&Value::Integer(0x7F)).unwrap().len(), 2);
        assert_eq!(encode(&Value::Integer(0x80)).unwrap().len(), 3);
        assert_eq!(encode(&Value::Integer(0x3FFF)).unwrap().len(), 3);
        assert_eq!(encode(&Value::Integer(0x4000)).unwrap().len(), 4);
        assert_eq!(encode(&Value::Integer(0x1F_FFFF)).unwrap().len(), 4);
        assert_eq!(encode(&Value::Integer(0x20_0000)).unwrap().len(), 5);
        assert_eq!(encode(&Value::Integer(INT_MAX)).unwrap().len(), 5);
    }

    #[test]
    fn test_integer_promotes_to_double_outside_29_bits() {
        let in_range = encode(&Value::Integer(INT_MAX)).unwrap();
        assert_eq!(in_range[0], MARKER_INTEGER);

        let promoted = encode(&Value::Integer(INT_MAX + 1)).unwrap();
        assert_eq!(promoted[0], MARKER_DOUBLE);
        assert_eq!(
            decode(&promoted).unwrap(),
            Value::Double(f64::from(INT_MAX + 1))
        );

        let negative = encode(&Value::Integer(INT_MIN - 1)).unwrap();
        assert_eq!(negative[0], MARKER_DOUBLE);
    }

    #[test]
    fn test_double_roundtrip() {
        for d in [0.0, 1.5, -2.25, 1e18, f64::MIN_POSITIVE] {
            assert_eq!(roundtrip(&Value::Double(d)), Value::Double(d));
        }
    }

    #[test]
    fn test_string_roundtrip() {
        for s in ["", "a", "hello", "naïve UTF-8 ✓"] {
            assert_eq!(
                roundtrip(&Value::String(s.into())),
                Value::String(s.into())
            );
        }
    }

    #[test]
    fn test_repeated_string_uses_reference_table() {
        let once = Value::Array(vec![Value::String("shared-name".into())]);
        let twice = Value::Array(vec![
            Value::String("shared-name".into()),
            Value::String("shared-name".into()),
        ]);
        let once_len = encode(&once).unwrap().len();
        let twice_len = encode(&twice).unwrap().len();
        // The second occurrence is a 2-byte marker + reference, not a copy.
        assert_eq!(twice_len, once_len + 2);
        assert_eq!(roundtrip(&twice), twice);
    }

    #[test]
    fn test_repeated_object_uses_reference_table() {
        let inner = Value::Array(vec![Value::Integer(1), Value::Integer(2)]);
        let value = Value::Array(vec![inner.clone(), inner.clone(), inner]);
        let encoded = encode(&value).unwrap();
        assert_eq!(roundtrip(&value), value);
        // Outer array + one inline inner + two 2-byte references.
        let inner_len = encode(&Value::Array(vec![Value::Integer(1), Value::Integer(2)]))
            .unwrap()
            .len();
        assert_eq!(encoded.len(), 3 + inner_len + 2 + 2);
    }

    #[test]
    fn test_object_roundtrip_preserves_member_order() {
        let value = Value::Object(vec![
            ("zebra".into(), Value::Integer(1)),
            ("apple".into(), Value::String("x".into())),
            ("mid".into(), Value::Array(vec![Value::Double(0.5)])),
        ]);
        assert_eq!(roundtrip(&value), value);
    }

    #[test]
    fn test_known_index_encoding() {
        // Byte-for-byte what the reference client writes for
        // {"a.txt": [0, 10]}: anonymous dynamic object, dense array, U29 ints.
        let value = Value::Object(vec![(
            "a.txt".into(),
            Value::Array(vec![Value::Integer(0), Value::Integer(10)]),
        )]);
        let expected = [
            0x0A, 0x0B, 0x01, // object, inline dynamic trait, empty class name
            0x0B, b'a', b'.', b't', b'x', b't', // key "a.txt"
            0x09, 0x05, 0x01, // array, 2 dense elements, empty assoc section
            0x04, 0x00, // 0
            0x04, 0x0A, // 10
            0x01, // member terminator
        ];
        assert_eq!(encode(&value).unwrap(), expected);
        assert_eq!(decode(&expected).unwrap(), value);
    }

    #[test]
    fn test_encode_rejects_out_of_subset_values() {
        assert!(matches!(
            encode(&Value::Null),
            Err(Amf3Error::UnsupportedValue(_))
        ));
        assert!(matches!(
            encode(&Value::Bool(true)),
            Err(Amf3Error::UnsupportedValue(_))
        ));
        assert!(matches!(
            encode(&Value::Undefined),
            Err(Amf3Error::UnsupportedValue(_))
        ));
    }

    #[test]
    fn test_decode_accepts_scalar_completeness_markers() {
        assert_eq!(decode(&[0x00]).unwrap(), Value::Undefined);
        assert_eq!(decode(&[0x01]).unwrap(), Value::Null);
        assert_eq!(decode(&[0x02]).unwrap(), Value::Bool(false));
        assert_eq!(decode(&[0x03]).unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_decode_unknown_marker() {
        assert!(matches!(
            decode(&[0x42]),
            Err(Amf3Error::UnknownMarker { marker: 0x42, offset: 0 })
        ));
    }

    #[test]
    fn test_decode_truncated_buffer() {
        assert!(matches!(decode(&[]), Err(Amf3Error::UnexpectedEof { .. })));
        // Double marker with only 4 of 8 payload bytes.
        assert!(matches!(
            decode(&[0x05, 0x3F, 0xF0, 0x00, 0x00]),
            Err(Amf3Error::UnexpectedEof { .. })
        ));
        // String claims 5 bytes, carries 2.
        assert!(matches!(
            decode(&[0x06, 0x0B, b'h', b'i']),
            Err(Amf3Error::UnexpectedEof { .. })
        ));
    }

    #[test]
    fn test_decode_dangling_reference() {
        // String back-reference into an empty table.
        assert!(matches!(
            decode(&[0x06, 0x02]),
            Err(Amf3Error::BadReference { kind: "string", .. })
        ));
        // Array object-reference into an empty table.
        assert!(matches!(
            decode(&[0x09, 0x02]),
            Err(Amf3Error::BadReference { kind: "object", .. })
        ));
    }

    #[test]
    fn test_decode_invalid_utf8() {
        assert!(matches!(
            decode(&[0x06, 0x05, 0xFF, 0xFE]),
            Err(Amf3Error::InvalidUtf8 { .. })
        ));
    }

    #[test]
    fn test_decode_deep_nesting_fails_cleanly() {
        // One inline single-element array per level; unbounded recursion
        // here would abort the process instead of returning an error.
        let mut data = Vec::new();
        for _ in 0..40_000 {
            data.extend_from_slice(&[0x09, 0x03, 0x01]);
        }
        data.extend_from_slice(&[0x04, 0x00]);
        assert!(matches!(
            decode(&data),
            Err(Amf3Error::NestingTooDeep { .. })
        ));
    }

    #[test]
    fn test_decode_moderate_nesting_roundtrip() {
        let mut value = Value::Integer(7);
        for _ in 0..64 {
            value = Value::Array(vec![value]);
        }
        assert_eq!(roundtrip(&value), value);
    }

    #[test]
    fn test_encode_oversized_string_rejected() {
        let too_long = "a".repeat(MAX_INLINE_LEN + 1);
        assert!(matches!(
            encode(&Value::String(too_long)),
            Err(Amf3Error::Oversized { kind: "string", .. })
        ));
    }

    #[test]
    fn test_as_u32_normalizes_doubles() {
        assert_eq!(Value::Integer(42).as_u32(), Some(42));
        assert_eq!(Value::Double(42.0).as_u32(), Some(42));
        assert_eq!(Value::Double(268_435_456.0).as_u32(), Some(1 << 28));
        assert_eq!(Value::Integer(-1).as_u32(), None);
        assert_eq!(Value::Double(f64::NAN).as_u32(), None);
        assert_eq!(Value::String("10".into()).as_u32(), None);
    }
}
