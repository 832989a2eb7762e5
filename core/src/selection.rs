use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::Record;

/// Conjunction of field = value constraints. Kept as a BTreeMap so the canonical
/// form is deterministic regardless of insertion order - cache keys depend on that.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchClause(BTreeMap<String, Value>);

impl MatchClause {
    pub fn new() -> Self { Self::default() }

    pub fn eq(mut self, field: impl Into<String>, value: Value) -> Self {
        self.0.insert(field.into(), value);
        self
    }

    pub fn matches(&self, record: &Record) -> bool { self.0.iter().all(|(field, value)| record.get(field) == Some(value)) }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> { self.0.iter() }
}

/// Join behavior requested from the store. Strategy reads always use `SelfReferential`
/// so schemas where a record references other rows of its own table resolve correctly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinMode {
    Flat,
    SelfReferential,
}

/// What to read: an equality filter plus optional field projection, association and
/// exclusion lists. The store interprets it; the engine only routes it and derives
/// cache keys from it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub filter: MatchClause,
    /// Project down to these fields (plus whatever the store always returns). None = all.
    pub fields: Option<Vec<String>>,
    /// Related fields the store should resolve alongside the row
    pub associated: Vec<String>,
    pub exclude: Vec<String>,
}

impl Selection {
    pub fn all() -> Self { Self::default() }

    pub fn filtered(filter: MatchClause) -> Self { Self { filter, ..Default::default() } }

    /// Deterministic string form, used as the request cache key together with the
    /// collection name. String-keyed maps cannot fail to serialize.
    pub fn canonical(&self) -> String { serde_json::to_string(self).expect("selection serialization is infallible") }
}
