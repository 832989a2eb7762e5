use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::future::{BoxFuture, Shared};
use futures_util::FutureExt;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

use crate::transport::{Method, Transport, TransportError};

/// Delay before a transport failure is re-broadcast on the shared error channel,
/// so global listeners are notified without blocking the failing call's own path.
pub(crate) const ERROR_BROADCAST_DELAY: Duration = Duration::from_millis(10);

pub type SharedFetch = Shared<BoxFuture<'static, Result<Value, TransportError>>>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FetchKey {
    method: Method,
    url: String,
    query: String,
}

/// Deduplicates raw HTTP calls: for a given method + url + query there is at most one
/// in-flight transport request, and every concurrent caller shares its outcome.
///
/// The reservation table entry is evicted from inside the shared future itself, which
/// runs exactly once regardless of how many callers polled it - success and failure
/// both clear the entry, so a failed fetch is retriable on the next call.
#[derive(Clone)]
pub struct RequestBroker {
    transport: Arc<dyn Transport>,
    inflight: Arc<DashMap<FetchKey, SharedFetch>>,
    errors: broadcast::Sender<TransportError>,
}

impl RequestBroker {
    pub fn new(transport: Arc<dyn Transport>, errors: broadcast::Sender<TransportError>) -> Self {
        Self { transport, inflight: Arc::new(DashMap::new()), errors }
    }

    /// The body is not part of the cache key - deduplication is by method + url +
    /// query, matching how reads are addressed.
    pub fn fetch(&self, method: Method, url: impl Into<String>, query: impl Into<String>, body: Option<Value>) -> SharedFetch {
        let key = FetchKey { method, url: url.into(), query: query.into() };

        // entry() makes reservation atomic: a completing request's eviction cannot
        // race a new request's insertion into yielding two in-flight calls.
        match self.inflight.entry(key.clone()) {
            dashmap::mapref::entry::Entry::Occupied(entry) => {
                debug!("joining in-flight request for {} {}", key.method, key.url);
                entry.get().clone()
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                let transport = self.transport.clone();
                let inflight = self.inflight.clone();
                let errors = self.errors.clone();
                let fut: SharedFetch = async move {
                    let result = transport.request(key.method, &key.url, &key.query, body).await;
                    inflight.remove(&key);
                    if let Err(e) = &result {
                        report_error(&errors, e.clone());
                    }
                    result
                }
                .boxed()
                .shared();
                entry.insert(fut.clone());
                // Drive the request to completion even if every caller drops, so the
                // eviction finalizer always runs.
                crate::task::spawn(fut.clone().map(|_| ()));
                fut
            }
        }
    }

    /// Broadcast a transport failure that did not go through `fetch` (e.g. a
    /// caller-supplied write result) on the same shared error channel.
    pub(crate) fn report_error(&self, error: TransportError) { report_error(&self.errors, error); }
}

fn report_error(errors: &broadcast::Sender<TransportError>, error: TransportError) {
    let errors = errors.clone();
    crate::task::spawn(async move {
        tokio::time::sleep(ERROR_BROADCAST_DELAY).await;
        // No receivers is fine - nobody is listening for global errors
        let _ = errors.send(error);
    });
}
