//! # Tidepool
//!
//! Tidepool is a client-side data-access layer that reconciles network responses
//! with a local queryable store. It provides cache-aware reads and buffered writes
//! before that store is even available: every operation issued early is queued and
//! replayed, in order, the moment the store attaches.
//!
//! ## Core Concepts
//!
//! - **Node**: the reconciliation engine; the place reads, writes and push messages
//!   are issued
//! - **LiveQuery**: a handle to an always-current result for a query, valid before
//!   and after the store attaches
//! - **CachePolicy**: whether a read hits the network once per query
//!   (`ReuseRequest`) or on every issuance (`AlwaysRefetch`)
//! - **Padding**: on-demand completion of projected records missing fields the
//!   caller declared required
//! - **Push messages**: server-originated mutations, reconciled through the same
//!   buffered pipeline as local writes
//!
//! The HTTP transport and the store itself are external collaborators behind the
//! [`Transport`] and [`StorageEngine`] traits.
//!
//! ## Example
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use tidepool::{Node, QuerySpec, CachePolicy, Schema};
//! # async fn demo(transport: Arc<dyn tidepool::Transport>, store: Arc<dyn tidepool::StorageEngine>) {
//! let schema = Schema::new().collection("tasks", "_id", "/api/tasks");
//! let node = Node::new(schema, transport);
//!
//! // Issued before the store exists - returns immediately with a placeholder
//! let tasks = node.query(QuerySpec::new("tasks").with_policy(CachePolicy::ReuseRequest)).unwrap();
//!
//! node.attach(store).await; // replays everything, flips the handle store-backed
//! tasks.wait_resolved().await;
//! println!("{} tasks", tasks.current().len());
//! # }
//! ```

pub use tidepool_core::*;
