use std::sync::Arc;

use futures::future::{try_join_all, BoxFuture};
use serde_json::Value;
use tracing::debug;

use crate::error::RetrievalError;
use crate::selection::Selection;
use crate::storage::StorageEngine;
use crate::types::{CollectionId, Record};

/// Policy controlling whether a read triggers a network fetch before consulting the
/// local store, and whether that decision is remembered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachePolicy {
    /// Fetch from the network once per distinct query, then serve from the store.
    /// The "seen" flag is only set after the response has been merged into the store.
    #[default]
    ReuseRequest,
    /// Every issuance hits the network, merges, then reads back from the store.
    AlwaysRefetch,
}

/// On-demand completion of a projected/partial record: given a primary key value,
/// yields the full record, or None when the source has nothing fuller to offer.
pub type PadFn = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Option<Record>, RetrievalError>> + Send + Sync>;

/// Everything a read needs: what to select, how to cache it, and which fields the
/// caller requires to be present. Immutable once issued.
#[derive(Clone)]
pub struct QuerySpec {
    pub collection: CollectionId,
    pub selection: Selection,
    pub policy: CachePolicy,
    /// Fields the caller requires on every returned record; missing ones are padded
    pub required: Vec<String>,
    pub pad: Option<PadFn>,
}

impl QuerySpec {
    pub fn new(collection: impl Into<CollectionId>) -> Self {
        Self { collection: collection.into(), selection: Selection::all(), policy: CachePolicy::default(), required: Vec::new(), pad: None }
    }

    pub fn with_selection(mut self, selection: Selection) -> Self {
        self.selection = selection;
        self
    }

    pub fn with_policy(mut self, policy: CachePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_required(mut self, required: Vec<String>) -> Self {
        self.required = required;
        self
    }

    pub fn with_pad(mut self, pad: PadFn) -> Self {
        self.pad = Some(pad);
        self
    }

    /// Request cache key for this read, deterministic across issuances.
    pub(crate) fn cache_key(&self) -> String { format!("{} {}", self.collection, self.selection.canonical()) }
}

impl std::fmt::Debug for QuerySpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuerySpec")
            .field("collection", &self.collection)
            .field("selection", &self.selection)
            .field("policy", &self.policy)
            .field("required", &self.required)
            .field("pad", &self.pad.is_some())
            .finish()
    }
}

/// Interpret a network payload as rows: an array of objects, a single object, or
/// null/absent for an empty result.
pub(crate) fn records_from_payload(payload: Value) -> Result<Vec<Record>, RetrievalError> {
    match payload {
        Value::Array(items) => items
            .into_iter()
            .map(|item| {
                Record::from_value(item).ok_or_else(|| RetrievalError::MalformedResponse("array item is not an object".to_string()))
            })
            .collect(),
        Value::Object(map) => Ok(vec![Record::from(map)]),
        Value::Null => Ok(Vec::new()),
        other => Err(RetrievalError::MalformedResponse(format!("expected object or array, got {other}"))),
    }
}

/// Pad every record missing a required field by asking the query's pad function for a
/// fuller copy. Replacements are upserted into the store and merged into the
/// in-memory record, so downstream consumers see completed data. Records resolve
/// independently and concurrently; the whole pass settles before the read completes.
pub(crate) async fn pad_records(
    store: &Arc<dyn StorageEngine>,
    spec: &QuerySpec,
    primary_key: &str,
    records: &mut [Record],
) -> Result<(), RetrievalError> {
    let Some(pad) = &spec.pad else { return Ok(()) };
    if records.is_empty() || spec.required.is_empty() {
        return Ok(());
    }

    let incomplete = records.iter_mut().filter(|record| spec.required.iter().any(|field| !record.contains_field(field)));

    try_join_all(incomplete.filter_map(|record| {
        // A record without its primary key cannot be re-fetched
        let pk = record.get(primary_key).cloned()?;
        let fut = pad(pk);
        Some(async move {
            if let Some(replacement) = fut.await? {
                store.upsert(&spec.collection, replacement.clone()).await?;
                record.merge(&replacement);
            } else {
                debug!("padding source had no fuller record, leaving as-is");
            }
            Ok::<(), RetrievalError>(())
        })
    }))
    .await?;

    Ok(())
}
