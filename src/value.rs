//! Dynamic value model for intercepted arguments and return values
//!
//! Intercepted calls carry duck-typed values; triggers match on either the
//! runtime type tag or structural equality. Serialization maps each variant
//! onto plain JSON so any consumer can round-trip a trace document through a
//! standard JSON parser.

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

/// Runtime type category of a [`Value`], used by type triggers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Null,
    Bool,
    /// Integers and floats share one numeric category
    Number,
    Text,
    Sequence,
    /// Ordered two-element tuple
    Pair,
    Mapping,
    Set,
}

/// A dynamically typed value observed at an intercepted call site
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Sequence(Vec<Value>),
    Pair(Box<Value>, Box<Value>),
    /// Insertion-ordered key/value entries
    Mapping(Vec<(Value, Value)>),
    /// Unordered collection; membership uses structural equality
    Set(Vec<Value>),
}

impl Value {
    /// The runtime type category this value belongs to
    pub fn type_tag(&self) -> TypeTag {
        match self {
            Value::Null => TypeTag::Null,
            Value::Bool(_) => TypeTag::Bool,
            Value::Int(_) | Value::Float(_) => TypeTag::Number,
            Value::Text(_) => TypeTag::Text,
            Value::Sequence(_) => TypeTag::Sequence,
            Value::Pair(_, _) => TypeTag::Pair,
            Value::Mapping(_) => TypeTag::Mapping,
            Value::Set(_) => TypeTag::Set,
        }
    }

    /// Construct an ordered pair
    pub fn pair(first: impl Into<Value>, second: impl Into<Value>) -> Self {
        Value::Pair(Box::new(first.into()), Box::new(second.into()))
    }

    /// Construct a set; duplicate members are collapsed
    pub fn set(members: impl IntoIterator<Item = Value>) -> Self {
        let mut unique: Vec<Value> = Vec::new();
        for member in members {
            if !unique.contains(&member) {
                unique.push(member);
            }
        }
        Value::Set(unique)
    }

    /// Construct a mapping from key/value entries
    pub fn mapping(entries: impl IntoIterator<Item = (Value, Value)>) -> Self {
        Value::Mapping(entries.into_iter().collect())
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Sequence(v)
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Sequence(items) | Value::Set(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Pair(a, b) => {
                let mut seq = serializer.serialize_seq(Some(2))?;
                seq.serialize_element(a.as_ref())?;
                seq.serialize_element(b.as_ref())?;
                seq.end()
            }
            Value::Mapping(entries) => {
                // Text keys map onto a JSON object; anything else falls back
                // to an array of [key, value] pairs
                if entries.iter().all(|(k, _)| matches!(k, Value::Text(_))) {
                    let mut map = serializer.serialize_map(Some(entries.len()))?;
                    for (k, v) in entries {
                        if let Value::Text(key) = k {
                            map.serialize_entry(key, v)?;
                        }
                    }
                    map.end()
                } else {
                    let mut seq = serializer.serialize_seq(Some(entries.len()))?;
                    for (k, v) in entries {
                        seq.serialize_element(&[k, v])?;
                    }
                    seq.end()
                }
            }
        }
    }
}
