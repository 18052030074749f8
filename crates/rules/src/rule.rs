//! Routing rule record: a required `name` key plus an opaque payload.
//!
//! The store only ever compares `name`. Everything else in the document
//! (condition, actions, priority, ...) belongs to the routing engine and is
//! carried through as an ordered YAML mapping so it survives a rewrite
//! value-for-value.

use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

/// Document key holding the rule name.
pub const NAME_KEY: &str = "name";

/// A single named routing rule.
///
/// `payload` never holds a `name` entry: on decode it is split out into
/// [`name`](Self::name), and on encode `name` is written first, followed by the
/// payload in its original order. Values are kept as [`Value`], so YAML tags
/// (`!cluster etl`) survive a rewrite.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingRule {
    /// Unique key of the rule within its file.
    pub name: String,
    /// All remaining document fields, in document order.
    pub payload: Mapping,
}

impl RoutingRule {
    /// Create a rule with an empty payload.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            payload: Mapping::new(),
        }
    }

    /// Builder-style [`set_field`](Self::set_field).
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set_field(key, value);
        self
    }

    /// Insert or replace a payload field, returning the previous value.
    ///
    /// The `name` key is routed to [`name`](Self::name) instead of the payload:
    /// a string value renames the rule and the old name is returned, any other
    /// value is refused and `None` is returned with the rule unchanged.
    pub fn set_field(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        if key == NAME_KEY {
            return match value {
                Value::String(name) => Some(Value::String(std::mem::replace(&mut self.name, name))),
                _ => None,
            };
        }
        self.payload.insert(Value::String(key), value)
    }

    /// Look up a payload field by key.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    pub fn description(&self) -> Option<&str> {
        self.field("description").and_then(Value::as_str)
    }

    pub fn priority(&self) -> Option<i64> {
        self.field("priority").and_then(Value::as_i64)
    }

    pub fn condition(&self) -> Option<&str> {
        self.field("condition").and_then(Value::as_str)
    }

    /// Action expressions, skipping any non-string entries.
    pub fn actions(&self) -> Vec<&str> {
        self.field("actions")
            .and_then(Value::as_sequence)
            .map(|seq| seq.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }
}

impl Serialize for RoutingRule {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.payload.len() + 1))?;
        map.serialize_entry(NAME_KEY, &self.name)?;
        for (key, value) in &self.payload {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for RoutingRule {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let document = Mapping::deserialize(deserializer)?;
        let mut name = None;
        let mut payload = Mapping::with_capacity(document.len());
        for (key, value) in document {
            if key.as_str() == Some(NAME_KEY) {
                name = Some(value);
            } else {
                payload.insert(key, value);
            }
        }
        let name = match name {
            Some(Value::String(name)) => name,
            Some(other) => {
                return Err(de::Error::custom(format!(
                    "`name` must be a string, found {other:?}"
                )))
            }
            None => return Err(de::Error::missing_field(NAME_KEY)),
        };
        Ok(Self { name, payload })
    }
}
