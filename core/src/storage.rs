use async_trait::async_trait;
use tokio::sync::watch;

use crate::error::StorageError;
use crate::selection::{JoinMode, MatchClause, Selection};
use crate::types::{CollectionId, Record};

/// The local queryable store, as the engine requires it. Indexing, join execution and
/// persistence are the implementor's concern; the engine only needs live reads keyed
/// by collection + selection, plus upsert/delete.
///
/// `fetch` returns a long-lived receiver: the store re-sends the matching row set on
/// every mutation that affects it. Dropping the receiver ends the subscription.
#[async_trait]
pub trait StorageEngine: Send + Sync {
    async fn fetch(
        &self,
        collection: &CollectionId,
        selection: &Selection,
        join: JoinMode,
    ) -> Result<watch::Receiver<Vec<Record>>, StorageError>;

    async fn upsert(&self, collection: &CollectionId, record: Record) -> Result<(), StorageError>;

    async fn delete(&self, collection: &CollectionId, clause: &MatchClause) -> Result<(), StorageError>;
}
