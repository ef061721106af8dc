//! Bulk resynchronization of a whole collection.
//!
//! Pages are processed strictly one after another: page N+1 is not fetched
//! until page N's bulk call has returned, so at most one bulk payload is ever
//! outstanding against the engine.

use crate::descriptor::IndexDescriptor;
use crate::engine::IndexEngine;
use crate::error::MirrorError;
use crate::index::serialize::serialize_record;
use crate::mapping::MappingNode;
use crate::store::DocumentStore;
use crate::types::{BulkAction, BulkOptions, Filter, Record};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub const DEFAULT_PAGE_SIZE: u64 = 50;

/// Buffered progress messages before the page loop waits on the consumer.
const PROGRESS_BUFFER: usize = 16;

/// Result of one page: records `[from, to)` of the collection.
#[derive(Debug, Clone, PartialEq)]
pub struct PageOutcome {
    pub page: u64,
    pub from: u64,
    pub to: u64,
    /// Index actions sent in the bulk call.
    pub submitted: usize,
    /// Records that did not make it: skipped before submit or rejected by
    /// the engine.
    pub failed: usize,
    pub error: Option<MirrorError>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SyncReport {
    pub elapsed: Duration,
    /// Records matching the filter when the run started.
    pub total: u64,
    pub pages_attempted: u64,
    pub indexed: usize,
    pub failed: usize,
    /// A fetch error (which aborts the run) if there was one, otherwise the
    /// first page-level bulk error.
    pub error: Option<MirrorError>,
}

impl SyncReport {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Clone)]
pub struct Synchronizer {
    store: Arc<dyn DocumentStore>,
    engine: Arc<dyn IndexEngine>,
    mapping: Arc<MappingNode>,
    descriptor: IndexDescriptor,
    refresh: bool,
}

impl Synchronizer {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        engine: Arc<dyn IndexEngine>,
        mapping: Arc<MappingNode>,
        descriptor: IndexDescriptor,
    ) -> Self {
        Synchronizer {
            store,
            engine,
            mapping,
            descriptor,
            refresh: false,
        }
    }

    /// Ask the engine to refresh after every bulk call.
    pub fn with_refresh(mut self, refresh: bool) -> Self {
        self.refresh = refresh;
        self
    }

    /// Run to completion (or the first fetch error) and report.
    pub async fn run(&self, filter: &Filter, page_size: u64) -> SyncReport {
        self.run_pages(filter, page_size, None).await
    }

    /// Run in a background task, streaming a [`PageOutcome`] per page.
    ///
    /// Dropping the receiver stops the run once the page in flight is done;
    /// the join handle still yields the report for the pages attempted.
    pub fn spawn(
        &self,
        filter: Filter,
        page_size: u64,
    ) -> (mpsc::Receiver<PageOutcome>, JoinHandle<SyncReport>) {
        let (tx, rx) = mpsc::channel(PROGRESS_BUFFER);
        let this = self.clone();
        let handle =
            tokio::spawn(async move { this.run_pages(&filter, page_size, Some(&tx)).await });
        (rx, handle)
    }

    async fn run_pages(
        &self,
        filter: &Filter,
        page_size: u64,
        progress: Option<&mpsc::Sender<PageOutcome>>,
    ) -> SyncReport {
        let start = Instant::now();
        let index = &self.descriptor.index;
        let mut report = SyncReport::default();

        if page_size == 0 {
            report.error = Some(MirrorError::Validation(
                "page size must be greater than zero".to_string(),
            ));
            return report;
        }

        report.total = match self.store.count(filter).await {
            Ok(n) => n,
            Err(e) => {
                tracing::error!("[SYNC {}] count failed: {}", index, e);
                report.error = Some(e);
                report.elapsed = start.elapsed();
                return report;
            }
        };

        let page_count = report.total.div_ceil(page_size);
        tracing::info!(
            "[SYNC {}] {} records in {} pages of {}",
            index,
            report.total,
            page_count,
            page_size
        );

        for page in 0..page_count {
            let from = page * page_size;
            let records = match self.store.find_page(filter, from, page_size).await {
                Ok(records) => records,
                Err(e) => {
                    tracing::error!(
                        "[SYNC {}] fetch of page {} failed, aborting: {}",
                        index,
                        page,
                        e
                    );
                    report.error = Some(e.clone());
                    if let Some(tx) = progress {
                        let _ = tx
                            .send(PageOutcome {
                                page,
                                from,
                                to: from,
                                submitted: 0,
                                failed: 0,
                                error: Some(e),
                            })
                            .await;
                    }
                    break;
                }
            };

            let outcome = self.submit_page(page, from, &records).await;
            report.pages_attempted += 1;
            report.indexed += records.len().saturating_sub(outcome.failed);
            report.failed += outcome.failed;
            if report.error.is_none() {
                report.error = outcome.error.clone();
            }

            tracing::info!(
                "[SYNC {}] complete synchronize from {} to {}",
                index,
                outcome.from,
                outcome.to
            );

            if let Some(tx) = progress {
                if tx.send(outcome).await.is_err() {
                    tracing::warn!(
                        "[SYNC {}] progress receiver dropped, stopping after page {}",
                        index,
                        page
                    );
                    break;
                }
            }
        }

        report.elapsed = start.elapsed();
        tracing::info!(
            "[SYNC {}] finished in {}ms: indexed={}, failed={}",
            index,
            report.elapsed.as_millis(),
            report.indexed,
            report.failed
        );
        report
    }

    async fn submit_page(&self, page: u64, from: u64, records: &[Record]) -> PageOutcome {
        let mut outcome = PageOutcome {
            page,
            from,
            to: from + records.len() as u64,
            submitted: 0,
            failed: 0,
            error: None,
        };

        let mut actions = Vec::with_capacity(records.len());
        for record in records {
            match record.id() {
                Ok(id) => actions.push(BulkAction::Index {
                    index: self.descriptor.index.clone(),
                    type_name: self.descriptor.type_name.clone(),
                    id,
                    document: serialize_record(record, &self.mapping),
                }),
                Err(e) => {
                    tracing::warn!(
                        "[SYNC {}] skipping record without id: {}",
                        self.descriptor.index,
                        e
                    );
                    outcome.failed += 1;
                    outcome.error.get_or_insert(e);
                }
            }
        }

        outcome.submitted = actions.len();
        if actions.is_empty() {
            return outcome;
        }

        let options = BulkOptions {
            refresh: self.refresh,
        };
        match self.engine.bulk(&actions, options).await {
            Ok(resp) => {
                outcome.failed += resp.failed_count();
                if let Err(e) = resp.check() {
                    tracing::warn!("[SYNC {}] page {}: {}", self.descriptor.index, page, e);
                    outcome.error.get_or_insert(e);
                }
            }
            Err(e) => {
                tracing::warn!(
                    "[SYNC {}] bulk submit for page {} failed: {}",
                    self.descriptor.index,
                    page,
                    e
                );
                outcome.failed += actions.len();
                outcome.error.get_or_insert(e);
            }
        }
        outcome
    }
}
