//! Index engine client interface.
//!
//! The engine is a remote service with its own transport and retry behavior;
//! implementations report failures through [`MirrorError`](crate::MirrorError)
//! using `NotFound` for missing targets, `Validation` for rejected requests and
//! `Transport` for everything else. `docmirror-http` provides the REST client.

use crate::error::Result;
use crate::types::{BulkAction, BulkOptions, BulkResponse, IndexResponse, SearchResults};
use async_trait::async_trait;
use serde_json::Value;

#[async_trait]
pub trait IndexEngine: Send + Sync {
    async fn index_exists(&self, index: &str) -> Result<bool>;

    /// Create `index` with `body` as its settings/mappings document
    /// (`{"mappings": {<type>: <mapping>}}`).
    async fn create_index(&self, index: &str, body: &Value) -> Result<Value>;

    /// Merge `mapping` (`{<type>: <mapping>}`) into an existing index.
    async fn put_mapping(&self, index: &str, type_name: &str, mapping: &Value) -> Result<Value>;

    async fn delete_index(&self, index: &str) -> Result<Value>;

    /// Upsert one document under `id`.
    async fn index(
        &self,
        index: &str,
        type_name: &str,
        id: &str,
        document: &Value,
        refresh: bool,
    ) -> Result<IndexResponse>;

    async fn delete(&self, index: &str, type_name: &str, id: &str) -> Result<Value>;

    /// Submit a batch. Transport success says nothing about individual
    /// entries; inspect [`BulkResponse::items`].
    async fn bulk(&self, actions: &[BulkAction], options: BulkOptions) -> Result<BulkResponse>;

    async fn search(&self, index: &str, body: &Value) -> Result<SearchResults>;

    async fn count(&self, index: &str, type_name: &str, query: Option<&Value>) -> Result<u64>;

    /// Register a change-feed river under `name`.
    async fn put_river(&self, river_type: &str, name: &str, config: &Value) -> Result<Value>;
}
