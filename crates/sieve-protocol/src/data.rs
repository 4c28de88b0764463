//! Data - JSON-shaped metadata values
//!
//! Frame metadata is an ordered mapping from string keys to `Data` values.
//! `Data` covers the JSON value space plus a byte-string variant; maps
//! preserve insertion order, which also fixes the key order of the wire
//! header.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use serde::de::{self, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};

/// A metadata value
///
/// # Serialization
///
/// `Data` serializes to plain JSON. `Bytes` has no JSON representation and
/// is emitted as a base64 string: decoding yields `Data::Str`, so a wire
/// round trip preserves JSON-canonical equality but not the `Bytes` type.
#[derive(Debug, Clone, PartialEq)]
pub enum Data {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Bytes),
    List(Vec<Data>),
    Map(DataMap),
}

impl Data {
    /// True if this value is `Null`
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Data::Null)
    }

    /// View as a bool
    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Data::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// View as an integer
    #[inline]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Data::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// View as a float; integers coerce
    #[inline]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Data::Float(f) => Some(*f),
            Data::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    /// View as a string slice
    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Data::Str(s) => Some(s),
            _ => None,
        }
    }

    /// View as raw bytes
    #[inline]
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Data::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// View as a list
    #[inline]
    pub fn as_list(&self) -> Option<&[Data]> {
        match self {
            Data::List(items) => Some(items),
            _ => None,
        }
    }

    /// View as a map
    #[inline]
    pub fn as_map(&self) -> Option<&DataMap> {
        match self {
            Data::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Mutable view as a map
    #[inline]
    pub fn as_map_mut(&mut self) -> Option<&mut DataMap> {
        match self {
            Data::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Walk a dotted path through nested maps
    ///
    /// Returns `None` as soon as a segment is missing or the current value
    /// is not a map. An empty path returns `self`.
    pub fn get_path(&self, path: &str) -> Option<&Data> {
        if path.is_empty() {
            return Some(self);
        }
        let mut current = self;
        for segment in path.split('.') {
            current = current.as_map()?.get(segment)?;
        }
        Some(current)
    }

    /// Convert to a `serde_json::Value`
    ///
    /// Key order is not preserved (`serde_json` objects are sorted); use the
    /// `Serialize` impl when order matters.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Data::Null => serde_json::Value::Null,
            Data::Bool(b) => serde_json::Value::Bool(*b),
            Data::Int(n) => serde_json::Value::from(*n),
            Data::Float(f) => serde_json::Value::from(*f),
            Data::Str(s) => serde_json::Value::String(s.clone()),
            Data::Bytes(b) => serde_json::Value::String(BASE64.encode(b)),
            Data::List(items) => {
                serde_json::Value::Array(items.iter().map(Data::to_json).collect())
            }
            Data::Map(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| (k.to_string(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

impl Default for Data {
    fn default() -> Self {
        Data::Null
    }
}

impl From<bool> for Data {
    fn from(b: bool) -> Self {
        Data::Bool(b)
    }
}

impl From<i64> for Data {
    fn from(n: i64) -> Self {
        Data::Int(n)
    }
}

impl From<i32> for Data {
    fn from(n: i32) -> Self {
        Data::Int(n as i64)
    }
}

impl From<u32> for Data {
    fn from(n: u32) -> Self {
        Data::Int(n as i64)
    }
}

impl From<f64> for Data {
    fn from(f: f64) -> Self {
        Data::Float(f)
    }
}

impl From<&str> for Data {
    fn from(s: &str) -> Self {
        Data::Str(s.to_string())
    }
}

impl From<String> for Data {
    fn from(s: String) -> Self {
        Data::Str(s)
    }
}

impl From<Bytes> for Data {
    fn from(b: Bytes) -> Self {
        Data::Bytes(b)
    }
}

impl From<Vec<Data>> for Data {
    fn from(items: Vec<Data>) -> Self {
        Data::List(items)
    }
}

impl From<DataMap> for Data {
    fn from(map: DataMap) -> Self {
        Data::Map(map)
    }
}

impl Serialize for Data {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Data::Null => serializer.serialize_unit(),
            Data::Bool(b) => serializer.serialize_bool(*b),
            Data::Int(n) => serializer.serialize_i64(*n),
            Data::Float(f) => serializer.serialize_f64(*f),
            Data::Str(s) => serializer.serialize_str(s),
            Data::Bytes(b) => serializer.serialize_str(&BASE64.encode(b)),
            Data::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Data::Map(map) => {
                let mut obj = serializer.serialize_map(Some(map.len()))?;
                for (k, v) in map.iter() {
                    obj.serialize_entry(k, v)?;
                }
                obj.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Data {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(DataVisitor)
    }
}

struct DataVisitor;

impl<'de> Visitor<'de> for DataVisitor {
    type Value = Data;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a JSON value")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Data, E> {
        Ok(Data::Null)
    }

    fn visit_bool<E: de::Error>(self, b: bool) -> Result<Data, E> {
        Ok(Data::Bool(b))
    }

    fn visit_i64<E: de::Error>(self, n: i64) -> Result<Data, E> {
        Ok(Data::Int(n))
    }

    fn visit_u64<E: de::Error>(self, n: u64) -> Result<Data, E> {
        if n <= i64::MAX as u64 {
            Ok(Data::Int(n as i64))
        } else {
            Ok(Data::Float(n as f64))
        }
    }

    fn visit_f64<E: de::Error>(self, f: f64) -> Result<Data, E> {
        Ok(Data::Float(f))
    }

    fn visit_str<E: de::Error>(self, s: &str) -> Result<Data, E> {
        Ok(Data::Str(s.to_string()))
    }

    fn visit_string<E: de::Error>(self, s: String) -> Result<Data, E> {
        Ok(Data::Str(s))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Data, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(Data::List(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Data, A::Error> {
        // MapAccess yields entries in document order, which DataMap keeps.
        let mut map = DataMap::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((key, value)) = access.next_entry::<String, Data>()? {
            map.insert(key, value);
        }
        Ok(Data::Map(map))
    }
}

/// Insertion-ordered string-keyed map of `Data` values
///
/// Backed by a `Vec` of entries: metadata maps are small (tens of keys),
/// and preserving order matters more than sub-linear lookup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataMap {
    entries: Vec<(String, Data)>,
}

impl DataMap {
    /// Create an empty map
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty map with pre-allocated capacity
    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Number of entries
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the map has no entries
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up a value by key
    pub fn get(&self, key: &str) -> Option<&Data> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Look up a mutable value by key
    pub fn get_mut(&mut self, key: &str) -> Option<&mut Data> {
        self.entries
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// True if the key is present
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Insert a value, replacing in place if the key exists
    ///
    /// Replacement keeps the key's original position; new keys append.
    /// Returns the previous value, if any.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Data>) -> Option<Data> {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => Some(std::mem::replace(existing, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    /// Remove a key, returning its value
    pub fn remove(&mut self, key: &str) -> Option<Data> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    /// Get the map at `key`, inserting an empty one if absent
    ///
    /// Replaces any non-map value already stored under the key.
    pub fn entry_map(&mut self, key: &str) -> &mut DataMap {
        let needs_insert = !matches!(self.get(key), Some(Data::Map(_)));
        if needs_insert {
            self.insert(key, Data::Map(DataMap::new()));
        }
        match self.get_mut(key) {
            Some(Data::Map(map)) => map,
            _ => unreachable!("entry_map just inserted a map"),
        }
    }

    /// Iterate entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Data)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Iterate keys in insertion order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }
}

impl<K: Into<String>, V: Into<Data>> FromIterator<(K, V)> for DataMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = DataMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl IntoIterator for DataMap {
    type Item = (String, Data);
    type IntoIter = std::vec::IntoIter<(String, Data)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
