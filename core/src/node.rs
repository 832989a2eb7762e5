use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, RwLock};

use futures_util::FutureExt;
use serde_json::Value;
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, warn};

use crate::broker::{RequestBroker, SharedFetch};
use crate::error::{MutationError, RetrievalError, StorageError};
use crate::livequery::{LiveQuery, WeakLiveQuery};
use crate::retrieve::{pad_records, records_from_payload, CachePolicy, QuerySpec};
use crate::schema::Schema;
use crate::selection::{JoinMode, MatchClause};
use crate::storage::StorageEngine;
use crate::transport::{Method, Transport, TransportError};
use crate::types::{CollectionId, PushMessage, PushMethod, Record};

/// The caller-visible outcome of a write: the network result, untouched. Shared so
/// the engine can observe the same emission internally for buffering.
pub type MutationResult = SharedFetch;

/// A write as issued by the caller. Create and Update are normalized to a single
/// upsert operation kind once the network result emits; Delete carries a match
/// clause instead of a record.
#[derive(Debug, Clone)]
pub enum WriteSpec {
    Create { collection: CollectionId },
    Update { collection: CollectionId },
    Delete { collection: CollectionId, clause: MatchClause },
}

impl WriteSpec {
    pub fn collection(&self) -> &CollectionId {
        match self {
            WriteSpec::Create { collection } | WriteSpec::Update { collection } | WriteSpec::Delete { collection, .. } => collection,
        }
    }
}

/// A write already materialized by its network result.
#[derive(Debug, Clone)]
enum WriteOp {
    Upsert(Record),
    Delete(MatchClause),
}

/// One entry in the pre-attachment buffer. FIFO, append-only until the drain.
enum BufferedOp {
    Write { collection: CollectionId, op: WriteOp },
    Push(PushMessage),
    Query { spec: QuerySpec, tx: watch::Sender<Vec<Record>>, handle: WeakLiveQuery },
}

/// Where operations go. One-way: `Pending` until the first `attach`, `Attached`
/// forever after. Buffer pushes and the swap happen under the same lock, so no
/// operation can land in an already-drained buffer.
enum Backing {
    Pending(Vec<BufferedOp>),
    Attached(Arc<dyn StorageEngine>),
}

/// The reconciliation engine: routes reads, writes and push messages either to the
/// pre-attachment buffer or to the attached store, applying cache strategy,
/// request deduplication and field-completion padding on the way.
#[derive(Clone)]
pub struct Node(Arc<NodeInner>);

pub(crate) struct NodeInner {
    schema: Schema,
    broker: RequestBroker,
    backing: Mutex<Backing>,
    /// ReuseRequest keys whose responses have been merged into the store
    fetched: RwLock<HashSet<String>>,
    errors: broadcast::Sender<TransportError>,
}

impl Node {
    pub fn new(schema: Schema, transport: Arc<dyn Transport>) -> Self {
        let (errors, _) = broadcast::channel(64);
        let broker = RequestBroker::new(transport, errors.clone());
        Self(Arc::new(NodeInner {
            schema,
            broker,
            backing: Mutex::new(Backing::Pending(Vec::new())),
            fetched: RwLock::new(HashSet::new()),
            errors,
        }))
    }

    /// Global transport-failure channel. Failures are re-broadcast here shortly
    /// after the failing call itself has observed them.
    pub fn errors(&self) -> broadcast::Receiver<TransportError> { self.0.errors.subscribe() }

    pub fn attached(&self) -> bool { matches!(*self.0.backing.lock().expect("Failed to lock the backing"), Backing::Attached(_)) }

    /// Issue a read. Before attachment the returned handle is backed by a
    /// placeholder and flips to store-backed data when the buffer drains; after
    /// attachment resolution starts immediately on a background task.
    pub fn query(&self, spec: QuerySpec) -> Result<LiveQuery, RetrievalError> {
        self.0.schema.get(&spec.collection)?;

        let (tx, rx) = watch::channel(Vec::new());
        let handle = LiveQuery::new(rx);

        let attached = {
            let mut backing = self.0.backing.lock().expect("Failed to lock the backing");
            match &mut *backing {
                Backing::Pending(buffer) => {
                    debug!("buffering read for {} until a store attaches", spec.collection);
                    buffer.push(BufferedOp::Query { spec, tx, handle: handle.weak() });
                    None
                }
                Backing::Attached(store) => Some((store.clone(), spec, tx)),
            }
        };

        if let Some((store, spec, tx)) = attached {
            let inner = self.0.clone();
            let weak = handle.weak();
            crate::task::spawn(async move { inner.resolve_query(store, spec, tx, weak).await });
        }

        Ok(handle)
    }

    /// Issue a write. `result` is the network call that materializes it; the caller
    /// gets that same result back, succeeding or failing on the network outcome
    /// alone, independent of buffering. Once it emits, the engine buffers or
    /// applies the corresponding store operation.
    pub fn mutate<F>(&self, write: WriteSpec, result: F) -> Result<MutationResult, MutationError>
    where F: Future<Output = Result<Value, TransportError>> + Send + 'static {
        self.0.schema.get(write.collection())?;

        let shared: MutationResult = result.boxed().shared();
        let inner = self.0.clone();
        let observed = shared.clone();
        crate::task::spawn(async move {
            match observed.await {
                Ok(value) => {
                    let (collection, op) = match write {
                        WriteSpec::Create { collection } | WriteSpec::Update { collection } => match Record::from_value(value) {
                            Some(record) => (collection, WriteOp::Upsert(record)),
                            None => {
                                warn!("write result for {collection} was not a record, dropping");
                                return;
                            }
                        },
                        // The emitted value is just the server's acknowledgement
                        WriteSpec::Delete { collection, clause } => (collection, WriteOp::Delete(clause)),
                    };
                    inner.stage_write(collection, op).await;
                }
                Err(e) => inner.broker.report_error(e),
            }
        });

        Ok(shared)
    }

    /// Reconcile a real-time push message. Buffered like any other operation while
    /// no store is attached; dispatched immediately otherwise. The buffered path
    /// acknowledges with Ok - by then the remote mutation already happened.
    pub async fn apply_push(&self, push: PushMessage) -> Result<(), MutationError> {
        self.0.schema.get(&push.collection)?;

        let attached = {
            let mut backing = self.0.backing.lock().expect("Failed to lock the backing");
            match &mut *backing {
                Backing::Pending(buffer) => {
                    buffer.push(BufferedOp::Push(push));
                    None
                }
                Backing::Attached(store) => Some((store.clone(), push)),
            }
        };

        match attached {
            Some((store, push)) => self.0.dispatch_push(&store, &push).await,
            None => Ok(()),
        }
    }

    /// Attach the local store. Idempotent - the first caller wins and later calls
    /// are ignored. Drains the buffer strictly in insertion order; individual
    /// failures are logged without aborting the rest of the drain, so the engine
    /// always reaches a consistent attached state.
    pub async fn attach(&self, store: Arc<dyn StorageEngine>) {
        let ops = {
            let mut backing = self.0.backing.lock().expect("Failed to lock the backing");
            match &mut *backing {
                Backing::Attached(_) => {
                    warn!("store already attached, ignoring");
                    return;
                }
                Backing::Pending(buffer) => {
                    let ops = std::mem::take(buffer);
                    *backing = Backing::Attached(store.clone());
                    ops
                }
            }
        };

        debug!(count = ops.len(), "attaching store, draining buffered operations");
        let mut first_error: Option<String> = None;
        for op in ops {
            let result = match op {
                BufferedOp::Write { collection, op } => {
                    apply_write(&store, &collection, op).await.map_err(|e| e.to_string())
                }
                BufferedOp::Push(push) => self.0.dispatch_push(&store, &push).await.map_err(|e| e.to_string()),
                BufferedOp::Query { spec, tx, handle } => {
                    if tx.is_closed() {
                        // Every handle was dropped before the drain - nothing to serve
                        debug!("skipping buffered read for {}, no subscribers remain", spec.collection);
                        Ok(())
                    } else {
                        // Reads are scheduled in order but not awaited, so a slow
                        // network fetch cannot stall the write replay behind it
                        let inner = self.0.clone();
                        let store = store.clone();
                        crate::task::spawn(async move { inner.resolve_query(store, spec, tx, handle).await });
                        Ok(())
                    }
                }
            };
            if let Err(e) = result {
                warn!("buffered operation failed during drain: {e}");
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
        if let Some(e) = first_error {
            error!("buffer drain completed with errors, first: {e}");
        }
    }
}

impl NodeInner {
    /// Buffer the materialized write, or apply it right away when attached. Store
    /// errors are not re-surfaced to the caller - its result stream already
    /// completed on the network outcome - so they are logged here.
    async fn stage_write(&self, collection: CollectionId, op: WriteOp) {
        let attached = {
            let mut backing = self.backing.lock().expect("Failed to lock the backing");
            match &mut *backing {
                Backing::Pending(buffer) => {
                    buffer.push(BufferedOp::Write { collection, op });
                    None
                }
                Backing::Attached(store) => Some((store.clone(), collection, op)),
            }
        };

        if let Some((store, collection, op)) = attached {
            if let Err(e) = apply_write(&store, &collection, op).await {
                warn!("store rejected write for {collection}: {e}");
            }
        }
    }

    /// Push dispatch rules: destroy/remove deletes by primary key, new upserts the
    /// payload, change defers to the collection's merge handler when one exists and
    /// otherwise upserts the payload with the primary key set from the push id.
    async fn dispatch_push(&self, store: &Arc<dyn StorageEngine>, push: &PushMessage) -> Result<(), MutationError> {
        let collection_schema = self.schema.get(&push.collection)?;
        match push.method {
            PushMethod::Remove => {
                let clause = MatchClause::new().eq(&collection_schema.primary_key, Value::String(push.id.clone()));
                store.delete(&push.collection, &clause).await?;
                Ok(())
            }
            PushMethod::New => {
                let record = Record::from_value(push.payload.clone())
                    .ok_or_else(|| MutationError::InvalidRecord("push payload is not an object".to_string()))?;
                store.upsert(&push.collection, record).await?;
                Ok(())
            }
            PushMethod::Change => {
                if let Some(handler) = self.schema.handler_for(&push.collection) {
                    if let Some(merge) = handler(store.clone(), push) {
                        return merge.await;
                    }
                }
                let mut record = Record::from_value(push.payload.clone())
                    .ok_or_else(|| MutationError::InvalidRecord("push payload is not an object".to_string()))?;
                record.set(&collection_schema.primary_key, Value::String(push.id.clone()));
                store.upsert(&push.collection, record).await?;
                Ok(())
            }
        }
    }

    /// Resolve a read against the attached store: cache-strategy fetch, store
    /// read-back, padding, then keep the handle fed with live store updates until
    /// every subscriber is gone.
    async fn resolve_query(
        self: Arc<Self>,
        store: Arc<dyn StorageEngine>,
        spec: QuerySpec,
        tx: watch::Sender<Vec<Record>>,
        handle: WeakLiveQuery,
    ) {
        let mut store_rx = match self.run_query(&store, &spec).await {
            Ok(rx) => rx,
            Err(e) => return fail_query(&spec, handle, e),
        };

        let mut records = store_rx.borrow_and_update().clone();
        let primary_key = match self.schema.get(&spec.collection) {
            Ok(cs) => cs.primary_key.clone(),
            Err(e) => return fail_query(&spec, handle, e.into()),
        };
        if let Err(e) = pad_records(&store, &spec, &primary_key, &mut records).await {
            return fail_query(&spec, handle, e);
        }

        // First real emission flips the handle from placeholder to store-backed
        if tx.send(records).is_err() {
            return;
        }
        if let Some(handle) = handle.upgrade() {
            handle.mark_resolved();
        }

        // Forward live store updates for as long as anyone is listening. Watching
        // tx.closed() releases the task as soon as every handle is dropped, even
        // when the store stays quiet.
        loop {
            tokio::select! {
                changed = store_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let records = store_rx.borrow_and_update().clone();
                    if tx.send(records).is_err() {
                        break;
                    }
                }
                _ = tx.closed() => break,
            }
        }
    }

    /// Cache-strategy read resolution. ReuseRequest fetches at most once per key and
    /// marks the key seen only after the response has been merged into the store;
    /// AlwaysRefetch fetches on every issuance. Both read back from the store with
    /// self-referential joins enabled, so callers observe store-shaped, joined data
    /// rather than the raw network payload.
    async fn run_query(
        &self,
        store: &Arc<dyn StorageEngine>,
        spec: &QuerySpec,
    ) -> Result<watch::Receiver<Vec<Record>>, RetrievalError> {
        let collection_schema = self.schema.get(&spec.collection)?;
        let key = spec.cache_key();

        let fetch_needed = match spec.policy {
            CachePolicy::AlwaysRefetch => true,
            CachePolicy::ReuseRequest => !self.fetched.read().expect("Failed to lock the fetched set").contains(&key),
        };

        if fetch_needed {
            debug!("fetching {} from {}", spec.collection, collection_schema.endpoint);
            let payload = self.broker.fetch(Method::Get, collection_schema.endpoint.clone(), spec.selection.canonical(), None).await?;
            for record in records_from_payload(payload)? {
                store.upsert(&spec.collection, record).await?;
            }
            if spec.policy == CachePolicy::ReuseRequest {
                self.fetched.write().expect("Failed to lock the fetched set").insert(key);
            }
        }

        let rx = store.fetch(&spec.collection, &spec.selection, JoinMode::SelfReferential).await?;
        Ok(rx)
    }
}

async fn apply_write(store: &Arc<dyn StorageEngine>, collection: &CollectionId, op: WriteOp) -> Result<(), StorageError> {
    match op {
        WriteOp::Upsert(record) => store.upsert(collection, record).await,
        WriteOp::Delete(clause) => store.delete(collection, &clause).await,
    }
}

fn fail_query(spec: &QuerySpec, handle: WeakLiveQuery, error: RetrievalError) {
    debug!("read of {} failed to resolve: {error}", spec.collection);
    if let Some(handle) = handle.upgrade() {
        handle.set_error(error);
    }
}
