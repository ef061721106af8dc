//! Primary document store interface.

use crate::error::Result;
use crate::types::{Filter, QueryModifiers, Record};
use async_trait::async_trait;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn count(&self, filter: &Filter) -> Result<u64>;

    /// Records `[skip, skip + limit)` of the collection matching `filter`, in
    /// a stable order across calls.
    async fn find_page(&self, filter: &Filter, skip: u64, limit: u64) -> Result<Vec<Record>>;

    /// Records whose `_id` is in `ids`. Missing ids are simply not returned;
    /// `modifiers` are applied as-is to the query.
    async fn find_by_ids(&self, ids: &[String], modifiers: &QueryModifiers)
        -> Result<Vec<Record>>;

    async fn save(&self, record: &Record) -> Result<()>;
}
