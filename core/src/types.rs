use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CollectionId(String);

impl From<&str> for CollectionId {
    fn from(val: &str) -> Self { CollectionId(val.to_string()) }
}
impl From<String> for CollectionId {
    fn from(val: String) -> Self { CollectionId(val) }
}
impl PartialEq<str> for CollectionId {
    fn eq(&self, other: &str) -> bool { self.0 == other }
}

impl AsRef<str> for CollectionId {
    fn as_ref(&self) -> &str { &self.0 }
}

impl CollectionId {
    pub fn as_str(&self) -> &str { &self.0 }
}

impl std::fmt::Display for CollectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "{}", self.0) }
}

/// A single row as the engine sees it - a JSON object, possibly a projection of the
/// full server-side record. Field completion (padding) may widen it after retrieval.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record(serde_json::Map<String, Value>);

impl Record {
    pub fn new() -> Self { Self(serde_json::Map::new()) }

    /// Returns None when the value is not a JSON object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> { self.0.get(field) }

    pub fn set(&mut self, field: impl Into<String>, value: Value) { self.0.insert(field.into(), value); }

    pub fn contains_field(&self, field: &str) -> bool { self.0.contains_key(field) }

    /// Merge the other record's fields into this one. The other record wins on conflict,
    /// which is the direction padding needs: the replacement is the fuller copy.
    pub fn merge(&mut self, other: &Record) {
        for (k, v) in other.0.iter() {
            self.0.insert(k.clone(), v.clone());
        }
    }

    pub fn to_value(&self) -> Value { Value::Object(self.0.clone()) }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> { self.0.iter() }
}

impl From<serde_json::Map<String, Value>> for Record {
    fn from(map: serde_json::Map<String, Value>) -> Self { Self(map) }
}

/// A real-time server-originated notification of a remote mutation. Reconciled into
/// the same buffered pipeline as local writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushMessage {
    pub collection: CollectionId,
    pub id: String,
    pub method: PushMethod,
    pub payload: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PushMethod {
    New,
    Change,
    /// Servers variously send "destroy" or "remove" for deletions
    #[serde(alias = "destroy")]
    Remove,
}
