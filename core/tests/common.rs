#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::watch;

use tidepool_core::{
    CollectionId, JoinMode, MatchClause, Method, Record, Schema, Selection, StorageEngine, StorageError, Transport, TransportError,
};

pub fn task_schema() -> Schema { Schema::new().collection("tasks", "_id", "/api/tasks") }

pub fn init_tracing() { let _ = tracing_subscriber::fmt().try_init(); }

/// In-memory store: equality filters only, no projection or joins (those are the
/// real store's concern, not the engine's). Upsert merges into an existing row with
/// the same primary key. Every mutation re-sends all affected live fetches.
pub struct MemoryStore {
    primary_key: String,
    upserts: AtomicUsize,
    deletes: AtomicUsize,
    fail_upserts: AtomicUsize,
    inner: Mutex<StoreInner>,
}

#[derive(Default)]
struct StoreInner {
    tables: HashMap<CollectionId, BTreeMap<String, Record>>,
    watchers: Vec<Watcher>,
}

struct Watcher {
    collection: CollectionId,
    selection: Selection,
    tx: watch::Sender<Vec<Record>>,
}

impl MemoryStore {
    pub fn new(primary_key: &str) -> Arc<Self> {
        Arc::new(Self {
            primary_key: primary_key.to_string(),
            upserts: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
            fail_upserts: AtomicUsize::new(0),
            inner: Mutex::new(StoreInner::default()),
        })
    }

    /// Make the next `n` upserts return a mutation error
    pub fn fail_next_upserts(&self, n: usize) { self.fail_upserts.store(n, Ordering::SeqCst); }

    pub fn rows(&self, collection: &str) -> Vec<Record> {
        let inner = self.inner.lock().unwrap();
        inner.tables.get(&CollectionId::from(collection)).map(|table| table.values().cloned().collect()).unwrap_or_default()
    }

    pub fn upsert_count(&self) -> usize { self.upserts.load(Ordering::SeqCst) }

    pub fn delete_count(&self) -> usize { self.deletes.load(Ordering::SeqCst) }

    /// Live fetch watchers not yet pruned by a notification round
    pub fn watcher_count(&self) -> usize { self.inner.lock().unwrap().watchers.len() }

    fn notify(inner: &mut StoreInner) {
        let StoreInner { tables, watchers } = inner;
        watchers.retain(|watcher| {
            let rows = matching(tables, &watcher.collection, &watcher.selection);
            watcher.tx.send(rows).is_ok()
        });
    }
}

fn matching(tables: &HashMap<CollectionId, BTreeMap<String, Record>>, collection: &CollectionId, selection: &Selection) -> Vec<Record> {
    tables
        .get(collection)
        .map(|table| table.values().filter(|record| selection.filter.matches(record)).cloned().collect())
        .unwrap_or_default()
}

fn value_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl StorageEngine for MemoryStore {
    async fn fetch(
        &self,
        collection: &CollectionId,
        selection: &Selection,
        _join: JoinMode,
    ) -> Result<watch::Receiver<Vec<Record>>, StorageError> {
        let mut inner = self.inner.lock().unwrap();
        let rows = matching(&inner.tables, collection, selection);
        let (tx, rx) = watch::channel(rows);
        inner.watchers.push(Watcher { collection: collection.clone(), selection: selection.clone(), tx });
        Ok(rx)
    }

    async fn upsert(&self, collection: &CollectionId, record: Record) -> Result<(), StorageError> {
        if self.fail_upserts.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok() {
            return Err(StorageError::Mutation("injected upsert failure".to_string()));
        }
        self.upserts.fetch_add(1, Ordering::SeqCst);
        let key = record
            .get(&self.primary_key)
            .map(value_key)
            .ok_or_else(|| StorageError::Mutation("record missing primary key".to_string()))?;
        let mut inner = self.inner.lock().unwrap();
        let table = inner.tables.entry(collection.clone()).or_default();
        match table.get_mut(&key) {
            Some(existing) => existing.merge(&record),
            None => {
                table.insert(key, record);
            }
        }
        Self::notify(&mut inner);
        Ok(())
    }

    async fn delete(&self, collection: &CollectionId, clause: &MatchClause) -> Result<(), StorageError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        let mut inner = self.inner.lock().unwrap();
        if let Some(table) = inner.tables.get_mut(collection) {
            table.retain(|_, record| !clause.matches(record));
        }
        Self::notify(&mut inner);
        Ok(())
    }
}

/// Records every request; replies with the canned response for the URL, or a 404
/// descriptor when none was set. Optional latency to hold requests in flight.
pub struct MockTransport {
    calls: Mutex<Vec<(Method, String, String)>>,
    responses: Mutex<HashMap<String, Value>>,
    latency: Mutex<Option<Duration>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { calls: Mutex::new(Vec::new()), responses: Mutex::new(HashMap::new()), latency: Mutex::new(None) })
    }

    pub fn respond(&self, url: &str, value: Value) { self.responses.lock().unwrap().insert(url.to_string(), value); }

    pub fn set_latency(&self, latency: Duration) { *self.latency.lock().unwrap() = Some(latency); }

    pub fn calls_to(&self, url: &str) -> usize { self.calls.lock().unwrap().iter().filter(|(_, u, _)| u == url).count() }

    pub fn total_calls(&self) -> usize { self.calls.lock().unwrap().len() }
}

#[async_trait]
impl Transport for MockTransport {
    async fn request(&self, method: Method, url: &str, query: &str, _body: Option<Value>) -> Result<Value, TransportError> {
        self.calls.lock().unwrap().push((method, url.to_string(), query.to_string()));
        let latency = *self.latency.lock().unwrap();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        let response = self.responses.lock().unwrap().get(url).cloned();
        match response {
            Some(value) => Ok(value),
            None => Err(TransportError::new(method, url, Some(404), "no canned response")),
        }
    }
}
