pub mod broker;
pub mod error;
pub mod livequery;
pub mod node;
pub mod retrieve;
pub mod schema;
pub mod selection;
pub mod storage;
pub mod task;
pub mod transport;
pub mod types;

pub use error::{MutationError, RetrievalError, SchemaError, StorageError};
pub use livequery::{LiveQuery, TypedLiveQuery};
pub use node::{MutationResult, Node, WriteSpec};
pub use retrieve::{CachePolicy, PadFn, QuerySpec};
pub use schema::{MergeHandler, Schema};
pub use selection::{JoinMode, MatchClause, Selection};
pub use storage::StorageEngine;
pub use transport::{Method, Transport, TransportError};
pub use types::{CollectionId, PushMessage, PushMethod, Record};
