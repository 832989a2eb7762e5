use std::{
    marker::PhantomData,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Weak,
    },
};

use serde::de::DeserializeOwned;
use tokio::sync::{watch, Notify};

use crate::error::RetrievalError;
use crate::types::Record;

/// A handle to an always-current result for a query.
///
/// Created at read issuance, before the store is necessarily attached: until then it
/// holds a placeholder (empty) value. The engine redirects the sender side exactly
/// once, at resolution time, to the store-backed feed - the handle itself never
/// changes, so callers keep it across attachment without re-issuing the read.
#[derive(Clone)]
pub struct LiveQuery(Arc<Inner>);

struct Inner {
    rx: watch::Receiver<Vec<Record>>,
    resolved: AtomicBool,
    notify: Notify,
    error: std::sync::Mutex<Option<RetrievalError>>,
}

/// Weak handle held by the engine's buffer, so a read nobody is waiting on anymore
/// can be skipped at drain time instead of keeping the handle alive.
pub struct WeakLiveQuery(Weak<Inner>);

impl WeakLiveQuery {
    pub fn upgrade(&self) -> Option<LiveQuery> { self.0.upgrade().map(LiveQuery) }
}

impl Clone for WeakLiveQuery {
    fn clone(&self) -> Self { Self(self.0.clone()) }
}

impl LiveQuery {
    pub(crate) fn new(rx: watch::Receiver<Vec<Record>>) -> Self {
        Self(Arc::new(Inner { rx, resolved: AtomicBool::new(false), notify: Notify::new(), error: std::sync::Mutex::new(None) }))
    }

    /// Snapshot of the current result. Empty placeholder until the query resolves.
    pub fn current(&self) -> Vec<Record> { self.0.rx.borrow().clone() }

    /// A receiver that observes every subsequent result set. Long-lived: the store
    /// pushes a new value on every matching mutation.
    pub fn subscribe(&self) -> watch::Receiver<Vec<Record>> { self.0.rx.clone() }

    /// Wait until the query is store-backed (or failed - check `error` afterwards).
    pub async fn wait_resolved(&self) {
        if self.0.resolved.load(Ordering::SeqCst) {
            return;
        }
        self.0.notify.notified().await;
    }

    pub fn resolved(&self) -> bool { self.0.resolved.load(Ordering::SeqCst) }

    /// Terminal resolution failure, if any.
    pub fn error(&self) -> Option<RetrievalError> { self.0.error.lock().expect("Failed to lock the error slot").clone() }

    /// Defer a typed transform: no deserialization happens until the result is read.
    pub fn map<R: DeserializeOwned>(self) -> TypedLiveQuery<R> { TypedLiveQuery(self, PhantomData) }

    pub(crate) fn weak(&self) -> WeakLiveQuery { WeakLiveQuery(Arc::downgrade(&self.0)) }

    pub(crate) fn mark_resolved(&self) {
        if !self.0.resolved.swap(true, Ordering::SeqCst) {
            self.0.notify.notify_waiters();
        }
    }

    pub(crate) fn set_error(&self, error: RetrievalError) {
        *self.0.error.lock().expect("Failed to lock the error slot") = Some(error);
        self.mark_resolved();
    }
}

#[derive(Clone)]
pub struct TypedLiveQuery<R: DeserializeOwned>(LiveQuery, PhantomData<R>);

impl<R: DeserializeOwned> std::ops::Deref for TypedLiveQuery<R> {
    type Target = LiveQuery;
    fn deref(&self) -> &Self::Target { &self.0 }
}

impl<R: DeserializeOwned> TypedLiveQuery<R> {
    /// Current result set, deserialized. Rows that do not fit R are dropped.
    pub fn current(&self) -> Vec<R> {
        self.0.current().into_iter().filter_map(|record| serde_json::from_value(record.to_value()).ok()).collect()
    }
}
