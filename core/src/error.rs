use thiserror::Error;

use crate::transport::TransportError;
use crate::types::CollectionId;

/// Thrown synchronously at read/write issuance. Fatal to that call, not recoverable.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SchemaError {
    #[error("unknown collection: {0}")]
    UnknownCollection(CollectionId),
}

/// Failure reported by the store. During buffer drain these are logged and swallowed
/// so the drain always completes; on the direct path they surface to the caller.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StorageError {
    #[error("query failed: {0}")]
    Query(String),
    #[error("mutation failed: {0}")]
    Mutation(String),
}

/// Error type for read operations (`Node::query` and live query resolution).
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RetrievalError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Padding is on the critical path of read completion, so its failures fail the read
    #[error("padding failed: {0}")]
    Padding(String),

    #[error("malformed network response: {0}")]
    MalformedResponse(String),
}

/// Error type for write and push operations.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum MutationError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("invalid record: {0}")]
    InvalidRecord(String),
}
