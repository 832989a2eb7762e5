use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::error::{MutationError, SchemaError};
use crate::storage::StorageEngine;
use crate::types::{CollectionId, PushMessage};

/// Domain-specific dirty-field merge logic for `change` push messages. Returning
/// `None` is the "no handler for this message" sentinel: the engine falls back to a
/// generic upsert of the payload with the primary key set from the push id.
pub type MergeHandler =
    Arc<dyn Fn(Arc<dyn StorageEngine>, &PushMessage) -> Option<BoxFuture<'static, Result<(), MutationError>>> + Send + Sync>;

pub struct CollectionSchema {
    pub primary_key: String,
    /// Endpoint the engine fetches this collection from
    pub endpoint: String,
}

/// Registry of the collections the engine knows about. Issuing a read, write or push
/// against a collection not registered here fails synchronously with a SchemaError.
#[derive(Default)]
pub struct Schema {
    collections: HashMap<CollectionId, CollectionSchema>,
    merge_handlers: HashMap<CollectionId, MergeHandler>,
}

impl Schema {
    pub fn new() -> Self { Self::default() }

    pub fn collection(mut self, id: impl Into<CollectionId>, primary_key: impl Into<String>, endpoint: impl Into<String>) -> Self {
        self.collections.insert(id.into(), CollectionSchema { primary_key: primary_key.into(), endpoint: endpoint.into() });
        self
    }

    /// Which record types need custom merge logic is domain data, registered here
    /// rather than baked into the engine. Collections map 1:1 to record types.
    pub fn merge_handler(mut self, id: impl Into<CollectionId>, handler: MergeHandler) -> Self {
        self.merge_handlers.insert(id.into(), handler);
        self
    }

    pub fn get(&self, id: &CollectionId) -> Result<&CollectionSchema, SchemaError> {
        self.collections.get(id).ok_or_else(|| SchemaError::UnknownCollection(id.clone()))
    }

    pub fn handler_for(&self, id: &CollectionId) -> Option<&MergeHandler> { self.merge_handlers.get(id) }
}
