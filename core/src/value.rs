//! Dynamic values flowing into and out of a validation pass.
//!
//! Raw input arrives loosely typed (strings from environment variables and
//! CLI flags, numbers and mappings from YAML/JSON). Validation produces the
//! same [`Value`] model with canonical variants filled in: numeric strings
//! become [`Value::Number`], size literals become [`Value::Bytes`], map
//! schemas produce [`Value::Map`], and so on.

use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Read};
use std::sync::{Arc, Mutex};

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::byte_size::{ByteSizeValue, MAX_SAFE_INTEGER};
use crate::duration::DurationValue;

/// String-keyed mapping used for objects and records.
pub type Object = BTreeMap<String, Value>;

/// Shared handle to a readable byte stream.
///
/// Streams pass through validation untouched; clones share the same reader.
#[derive(Clone)]
pub struct StreamHandle(Arc<Mutex<Box<dyn Read + Send>>>);

impl StreamHandle {
    /// Wraps a reader.
    pub fn new(reader: impl Read + Send + 'static) -> Self {
        Self(Arc::new(Mutex::new(Box::new(reader))))
    }

    /// Drains the remaining bytes of the stream.
    pub fn read_to_end(&self) -> io::Result<Vec<u8>> {
        let mut reader = self
            .0
            .lock()
            .map_err(|_| io::Error::other("stream reader lock poisoned"))?;
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        Ok(buf)
    }
}

impl fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StreamHandle(..)")
    }
}

impl PartialEq for StreamHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// A loosely or canonically typed value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Explicit null.
    Null,
    /// Boolean.
    Bool(bool),
    /// Number (always `f64`, like JSON).
    Number(f64),
    /// UTF-8 string.
    String(String),
    /// Byte-size quantity.
    Bytes(ByteSizeValue),
    /// Duration quantity.
    Duration(DurationValue),
    /// Raw byte buffer.
    Binary(Vec<u8>),
    /// Readable stream.
    Stream(StreamHandle),
    /// Sequence.
    Array(Vec<Value>),
    /// Plain string-keyed mapping.
    Object(Object),
    /// Insertion-ordered mapping whose keys may be any value.
    Map(Vec<(Value, Value)>),
}

impl Value {
    /// Name of the value's type as used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Bytes(_) => "ByteSize",
            Value::Duration(_) => "Duration",
            Value::Binary(_) => "Buffer",
            Value::Stream(_) => "Stream",
            Value::Array(_) => "Array",
            Value::Object(_) => "Object",
            Value::Map(_) => "Map",
        }
    }

    /// Returns the string slice for [`Value::String`].
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the number for [`Value::Number`].
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the boolean for [`Value::Bool`].
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the quantity for [`Value::Bytes`].
    pub fn as_byte_size(&self) -> Option<ByteSizeValue> {
        match self {
            Value::Bytes(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the quantity for [`Value::Duration`].
    pub fn as_duration(&self) -> Option<DurationValue> {
        match self {
            Value::Duration(d) => Some(*d),
            _ => None,
        }
    }

    /// Returns the elements of [`Value::Array`].
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the mapping of [`Value::Object`].
    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Returns the entries of [`Value::Map`].
    pub fn as_map(&self) -> Option<&[(Value, Value)]> {
        match self {
            Value::Map(entries) => Some(entries),
            _ => None,
        }
    }

    /// Looks up a string key in an object or map.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Object(map) => map.get(key),
            Value::Map(entries) => entries
                .iter()
                .find(|(k, _)| k.as_str() == Some(key))
                .map(|(_, v)| v),
            _ => None,
        }
    }

    /// Follows a dotted path (`"server.port"`, `"hosts.0"`) through objects,
    /// maps and arrays.
    ///
    /// # Examples
    ///
    /// ```
    /// use config_schema_core::Value;
    ///
    /// let value = Value::from(serde_json::json!({ "server": { "hosts": ["a", "b"] } }));
    /// assert_eq!(value.pointer("server.hosts.1"), Some(&Value::from("b")));
    /// assert_eq!(value.pointer("server.port"), None);
    /// ```
    pub fn pointer(&self, path: &str) -> Option<&Value> {
        path.split('.').try_fold(self, |current, segment| match current {
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            other => other.get(segment),
        })
    }

    /// Parses JSON text into a value.
    pub fn from_json_str(text: &str) -> Result<Value, serde_json::Error> {
        serde_json::from_str::<serde_json::Value>(text).map(Value::from)
    }

    /// Converts to a JSON value. Quantities become their literal strings and
    /// map keys are stringified.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => f.write_str(s),
            Value::Bytes(b) => write!(f, "{b}"),
            Value::Duration(d) => write!(f, "{d}"),
            Value::Binary(bytes) => write!(f, "<Buffer {} bytes>", bytes.len()),
            Value::Stream(_) => f.write_str("[stream]"),
            Value::Array(_) | Value::Object(_) | Value::Map(_) => write!(f, "{}", self.to_json()),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) => {
                if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
                    serializer.serialize_i64(*n as i64)
                } else {
                    serializer.serialize_f64(*n)
                }
            }
            Value::String(s) => serializer.serialize_str(s),
            Value::Bytes(b) => b.serialize(serializer),
            Value::Duration(d) => d.serialize(serializer),
            Value::Binary(bytes) => {
                let mut seq = serializer.serialize_seq(Some(bytes.len()))?;
                for byte in bytes {
                    seq.serialize_element(byte)?;
                }
                seq.end()
            }
            Value::Stream(_) => serializer.serialize_str("[stream]"),
            Value::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Object(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (key, value) in map {
                    out.serialize_entry(key, value)?;
                }
                out.end()
            }
            Value::Map(entries) => {
                let mut out = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    out.serialize_entry(&key.to_string(), value)?;
                }
                out.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    /// Reads any self-describing document (JSON, YAML) through
    /// `serde_json::Value`.
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(key, value)| (key, Value::from(value)))
                    .collect(),
            ),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Number(f64::from(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Number(value as f64)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Number(f64::from(value))
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Value::Number(value as f64)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<ByteSizeValue> for Value {
    fn from(value: ByteSizeValue) -> Self {
        Value::Bytes(value)
    }
}

impl From<DurationValue> for Value {
    fn from(value: DurationValue) -> Self {
        Value::Duration(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Binary(value)
    }
}

impl From<StreamHandle> for Value {
    fn from(value: StreamHandle) -> Self {
        Value::Stream(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::Array(value)
    }
}

impl From<Object> for Value {
    fn from(value: Object) -> Self {
        Value::Object(value)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_from_json_preserves_structure() {
        let value = Value::from(json!({ "a": [1, "two", null], "b": { "c": true } }));
        assert_eq!(
            value.pointer("a"),
            Some(&Value::Array(vec![
                Value::Number(1.0),
                Value::from("two"),
                Value::Null
            ]))
        );
        assert_eq!(value.pointer("b.c"), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_type_names() {
        assert_eq!(Value::from("x").type_name(), "string");
        assert_eq!(Value::from(1).type_name(), "number");
        assert_eq!(Value::Array(Vec::new()).type_name(), "Array");
        assert_eq!(Value::Object(Object::new()).type_name(), "Object");
        assert_eq!(Value::Map(Vec::new()).type_name(), "Map");
        assert_eq!(Value::from(vec![1u8, 2]).type_name(), "Buffer");
    }

    #[test]
    fn test_serialize_canonical_forms() {
        let mut object = Object::new();
        object.insert("size".into(), Value::Bytes(ByteSizeValue::from_bytes(2048)));
        object.insert(
            "timeout".into(),
            Value::Duration(DurationValue::from_millis(5_000).unwrap()),
        );
        object.insert("count".into(), Value::Number(3.0));
        object.insert("ratio".into(), Value::Number(0.5));

        let json = Value::Object(object).to_json();
        assert_eq!(
            json,
            json!({ "size": "2kb", "timeout": "5s", "count": 3, "ratio": 0.5 })
        );
    }

    #[test]
    fn test_map_keys_are_stringified() {
        let map = Value::Map(vec![(Value::Number(1.0), Value::from("one"))]);
        assert_eq!(map.to_json(), json!({ "1": "one" }));
    }

    #[test]
    fn test_stream_equality_is_identity() {
        let stream = StreamHandle::new(std::io::empty());
        let clone = stream.clone();
        assert_eq!(stream, clone);
        assert_ne!(stream, StreamHandle::new(std::io::empty()));
    }

    #[test]
    fn test_stream_reads_through_handle() {
        let stream = StreamHandle::new(std::io::Cursor::new(b"hello".to_vec()));
        assert_eq!(stream.read_to_end().unwrap(), b"hello");
    }
}
