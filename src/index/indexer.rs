//! Per-record indexing and removal.
//!
//! Outcomes are published as [`IndexEvent`]s on a broadcast channel so any
//! number of observers can follow a model's writes; an observer that isn't
//! listening simply misses them.

use crate::descriptor::IndexDescriptor;
use crate::engine::IndexEngine;
use crate::error::Result;
use crate::index::serialize::serialize_record;
use crate::mapping::MappingNode;
use crate::types::{IndexOptions, IndexResponse, Record};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

pub const DELETE_MAX_RETRIES: u32 = 3;
pub const DELETE_RETRY_BACKOFF: Duration = Duration::from_millis(500);

const EVENT_BUFFER: usize = 256;

/// Retry schedule for deletes that hit "not found" while the engine catches
/// up with the primary store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: DELETE_MAX_RETRIES,
            backoff: DELETE_RETRY_BACKOFF,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum IndexEvent {
    Indexed {
        id: String,
        outcome: Result<IndexResponse>,
    },
    /// Final outcome of a removal. After exhausted retries this carries the
    /// last `NotFound` error.
    Removed { id: String, outcome: Result<Value> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoveOutcome {
    pub id: String,
    pub attempts: u32,
    pub result: Result<Value>,
}

#[derive(Clone)]
pub struct DocumentIndexer {
    engine: Arc<dyn IndexEngine>,
    mapping: Arc<MappingNode>,
    descriptor: IndexDescriptor,
    retry: RetryPolicy,
    events: broadcast::Sender<IndexEvent>,
}

impl DocumentIndexer {
    pub fn new(
        engine: Arc<dyn IndexEngine>,
        mapping: Arc<MappingNode>,
        descriptor: IndexDescriptor,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        DocumentIndexer {
            engine,
            mapping,
            descriptor,
            retry: RetryPolicy::default(),
            events,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Publish on an existing channel instead of a private one.
    pub fn with_events(mut self, events: broadcast::Sender<IndexEvent>) -> Self {
        self.events = events;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<IndexEvent> {
        self.events.subscribe()
    }

    pub fn descriptor(&self) -> &IndexDescriptor {
        &self.descriptor
    }

    /// Serialize `record` and upsert it. The record's `_id` is the document
    /// id unless `options.id` says otherwise.
    ///
    /// A record with no id fails before any event is published.
    pub async fn index_one(&self, record: &Record, options: IndexOptions) -> Result<IndexResponse> {
        let id = match options.id {
            Some(id) => id,
            None => record.id()?,
        };
        let index = options.index.as_deref().unwrap_or(&self.descriptor.index);
        let type_name = options
            .type_name
            .as_deref()
            .unwrap_or(&self.descriptor.type_name);

        let document = serialize_record(record, &self.mapping);
        let outcome = self
            .engine
            .index(index, type_name, &id, &document, options.refresh)
            .await;

        if let Err(ref e) = outcome {
            tracing::warn!("[INDEX {}] index of {} failed: {}", index, id, e);
        }
        self.emit(IndexEvent::Indexed {
            id,
            outcome: outcome.clone(),
        });
        outcome
    }

    /// Delete the record's document in the background.
    ///
    /// Returns as soon as the task is spawned; the handle can be dropped.
    /// Fails only when the record has no `_id`.
    pub fn remove_one(&self, record: &Record) -> Result<JoinHandle<RemoveOutcome>> {
        let id = record.id()?;
        let this = self.clone();
        Ok(tokio::spawn(async move { this.remove_with_retry(&id).await }))
    }

    /// Delete `id`, retrying "not found" per the retry policy. Any other
    /// error ends the attempt immediately.
    pub async fn remove_with_retry(&self, id: &str) -> RemoveOutcome {
        let index = &self.descriptor.index;
        let mut attempts = 0;
        loop {
            attempts += 1;
            let result = self
                .engine
                .delete(index, &self.descriptor.type_name, id)
                .await;

            match result {
                Err(ref e) if e.is_retryable_delete() && attempts <= self.retry.max_retries => {
                    tracing::debug!(
                        "[INDEX {}] delete of {} not visible yet (attempt {}), retrying",
                        index,
                        id,
                        attempts
                    );
                    tokio::time::sleep(self.retry.backoff).await;
                }
                result => {
                    match result {
                        Err(ref e) if e.is_retryable_delete() => tracing::warn!(
                            "[INDEX {}] giving up on delete of {} after {} attempts: {}",
                            index,
                            id,
                            attempts,
                            e
                        ),
                        Err(ref e) => {
                            tracing::warn!("[INDEX {}] delete of {} failed: {}", index, id, e)
                        }
                        Ok(_) => {}
                    }
                    self.emit(IndexEvent::Removed {
                        id: id.to_string(),
                        outcome: result.clone(),
                    });
                    return RemoveOutcome {
                        id: id.to_string(),
                        attempts,
                        result,
                    };
                }
            }
        }
    }

    fn emit(&self, event: IndexEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_retry_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.backoff, Duration::from_millis(500));
    }
}
