//! # docmirror
//!
//! Keeps a primary document store's records mirrored into a search index.
//!
//! - [`index::serialize`] projects records through a [`MappingNode`] into
//!   index documents (ids and dates normalized, undeclared fields dropped).
//! - [`index::lifecycle`] creates the index or merges the mapping into it.
//! - [`index::sync`] rebuilds an index from the whole collection, one bulk
//!   page at a time.
//! - [`index::indexer`] indexes and removes single records, retrying deletes
//!   the engine hasn't caught up with yet.
//! - [`query::hydrate`] swaps search hits for authoritative records.
//!
//! The store and the engine are reached through the [`DocumentStore`] and
//! [`IndexEngine`] traits; `docmirror-http` implements the latter for
//! Elasticsearch-style REST APIs.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use docmirror::{MappingNode, MirrorConfig, MirroredModel, SearchOptions};
//! use serde_json::json;
//! # use std::sync::Arc;
//! # async fn run(
//! #     store: Arc<dyn docmirror::DocumentStore>,
//! #     engine: Arc<dyn docmirror::IndexEngine>,
//! # ) -> docmirror::Result<()> {
//! let mapping = MappingNode::from_json(&json!({
//!     "properties": {
//!         "name": {"type": "string"},
//!         "created": {"type": "date"}
//!     }
//! }))?;
//!
//! let users = MirroredModel::new("User", store, engine, mapping, MirrorConfig::default())?;
//! users.init().await?; // index "users", type "user"
//!
//! let report = users.synchronize(&json!({})).await;
//! println!("indexed {} in {:?}", report.indexed, report.elapsed);
//!
//! let hits = users
//!     .search(&json!({"query": {"match": {"name": "ada"}}}), SearchOptions::hydrated())
//!     .await?;
//! println!("{} hits", hits.total);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod descriptor;
pub mod engine;
pub mod error;
pub mod index;
pub mod mapping;
pub mod query;
pub mod service;
pub mod store;
pub mod types;

pub use config::MirrorConfig;
pub use descriptor::{IndexDescriptor, IndexTarget};
pub use engine::IndexEngine;
pub use error::{MirrorError, Result};
pub use index::{DocumentIndexer, IndexEvent, PageOutcome, RetryPolicy, SyncReport, Synchronizer};
pub use mapping::{FieldType, MappingNode};
pub use service::{MirroredModel, SearchOptions};
pub use store::DocumentStore;
pub use types::*;
