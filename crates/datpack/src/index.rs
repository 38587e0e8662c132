//! Package index: insertion-ordered mapping from asset name to the byte
//! range holding its compressed blob.
//!
//! On the wire the index is an AMF3 dynamic map of `name -> [offset, length]`
//! dense arrays. Offsets and lengths within the signed 29-bit range encode as
//! integers; larger values are promoted to doubles, and some producing
//! encoders emit doubles even for small values, so decoding normalizes either
//! representation back to `u32`.

use std::collections::HashMap;

use thiserror::Error;

use crate::amf3::{self, Amf3Error, Value};

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index codec error: {0}")]
    Codec(#[from] Amf3Error),

    #[error("malformed index: {0}")]
    Shape(String),

    #[error("duplicate asset name: {0}")]
    DuplicateName(String),
}

/// One asset's location within the package body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub name: String,
    /// Byte offset of the compressed blob within the package file.
    pub offset: u32,
    /// Length of the compressed blob in bytes.
    pub length: u32,
}

/// Insertion-ordered `name -> (offset, length)` mapping.
#[derive(Debug, Default)]
pub struct PackageIndex {
    entries: Vec<IndexEntry>,
    by_name: HashMap<String, usize>,
}

impl PackageIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an asset. Names are unique per package; a duplicate fails fast
    /// rather than silently overwriting.
    pub fn insert(&mut self, name: &str, offset: u32, length: u32) -> Result<(), IndexError> {
        if self.by_name.contains_key(name) {
            return Err(IndexError::DuplicateName(name.to_owned()));
        }
        self.by_name.insert(name.to_owned(), self.entries.len());
        self.entries.push(IndexEntry {
            name: name.to_owned(),
            offset,
            length,
        });
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&IndexEntry> {
        self.by_name.get(name).map(|&i| &self.entries[i])
    }

    /// Asset names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Decode an index from its AMF3 encoding.
    ///
    /// Expects a dynamic map whose values are 2-element numeric arrays; any
    /// other shape is a malformed index. Numeric fields that arrive as
    /// doubles are normalized to integers here.
    pub fn from_bytes(raw: &[u8]) -> Result<Self, IndexError> {
        let decoded = amf3::decode(raw)?;
        let Value::Object(members) = decoded else {
            return Err(IndexError::Shape(
                "top-level value is not a dynamic map".to_owned(),
            ));
        };
        let mut index = Self::new();
        for (name, value) in members {
            let Value::Array(pair) = value else {
                return Err(IndexError::Shape(format!(
                    "entry {name} is not an array"
                )));
            };
            let [offset, length] = pair.as_slice() else {
                return Err(IndexError::Shape(format!(
                    "entry {name} has {} elements, expected 2",
                    pair.len()
                )));
            };
            let offset = offset.as_u32().ok_or_else(|| {
                IndexError::Shape(format!("entry {name} has a non-numeric offset"))
            })?;
            let length = length.as_u32().ok_or_else(|| {
                IndexError::Shape(format!("entry {name} has a non-numeric length"))
            })?;
            index.insert(&name, offset, length)?;
        }
        Ok(index)
    }

    /// Encode the index to its AMF3 representation.
    pub fn to_bytes(&self) -> Result<Vec<u8>, IndexError> {
        let members = self
            .entries
            .iter()
            .map(|e| {
                (
                    e.name.clone(),
                    Value::Array(vec![numeric(e.offset), numeric(e.length)]),
                )
            })
            .collect();
        Ok(amf3::encode(&Value::Object(members))?)
    }
}

/// Offsets/lengths outside the signed 29-bit integer range go on the wire as
/// doubles, mirroring the reference encoder's promotion rule.
fn numeric(v: u32) -> Value {
    if v <= 0x0FFF_FFFF {
        Value::Integer(v as i32)
    } else {
        Value::Double(f64::from(v))
    }
}
