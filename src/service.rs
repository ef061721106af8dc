//! The per-model service object.
//!
//! Bundles the store handle, engine client, mapping tree and (lazily
//! resolved) index descriptor, and exposes every mirroring operation for one
//! model. Construct one per model and share it; it is `Send + Sync`.

use crate::config::MirrorConfig;
use crate::descriptor::IndexDescriptor;
use crate::engine::IndexEngine;
use crate::error::{MirrorError, Result};
use crate::index::indexer::{DocumentIndexer, IndexEvent, RemoveOutcome, RetryPolicy};
use crate::index::lifecycle;
use crate::index::river::{register_river, RiverConfig};
use crate::index::sync::{PageOutcome, SyncReport, Synchronizer};
use crate::mapping::MappingNode;
use crate::query::hydrate;
use crate::store::DocumentStore;
use crate::types::{
    BulkResponse, Filter, IndexOptions, IndexResponse, QueryModifiers, Record, SearchResults,
};
use once_cell::sync::OnceCell;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

const EVENT_BUFFER: usize = 256;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchOptions {
    pub hydrate: bool,
    /// Overrides the model's default hydration modifiers.
    pub hydrate_options: Option<QueryModifiers>,
}

impl SearchOptions {
    pub fn hydrated() -> Self {
        SearchOptions {
            hydrate: true,
            hydrate_options: None,
        }
    }
}

pub struct MirroredModel {
    model_name: String,
    store: Arc<dyn DocumentStore>,
    engine: Arc<dyn IndexEngine>,
    mapping: Arc<MappingNode>,
    config: MirrorConfig,
    retry: RetryPolicy,
    descriptor: OnceCell<IndexDescriptor>,
    events: broadcast::Sender<IndexEvent>,
}

impl MirroredModel {
    /// # Errors
    ///
    /// [`MirrorError::Validation`] if the root mapping is not an object mapping,
    /// [`MirrorError::Config`] if `config` fails validation.
    pub fn new(
        model_name: &str,
        store: Arc<dyn DocumentStore>,
        engine: Arc<dyn IndexEngine>,
        mapping: MappingNode,
        config: MirrorConfig,
    ) -> Result<Self> {
        if !mapping.is_object() {
            return Err(MirrorError::Validation(format!(
                "Root mapping for {} must declare properties",
                model_name
            )));
        }
        config.validate()?;
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Ok(MirroredModel {
            model_name: model_name.to_string(),
            store,
            engine,
            mapping: Arc::new(mapping),
            config,
            retry: RetryPolicy::default(),
            descriptor: OnceCell::new(),
            events,
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn mapping(&self) -> &MappingNode {
        &self.mapping
    }

    pub fn config(&self) -> &MirrorConfig {
        &self.config
    }

    /// Index/type for this model, resolved on first use and fixed afterwards.
    pub fn descriptor(&self) -> Result<&IndexDescriptor> {
        self.descriptor
            .get_or_try_init(|| self.config.target().resolve(&self.model_name))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<IndexEvent> {
        self.events.subscribe()
    }

    /// Resolve the descriptor and make sure the index carries the mapping.
    pub async fn init(&self) -> Result<IndexDescriptor> {
        self.create_mapping().await?;
        Ok(self.descriptor()?.clone())
    }

    pub async fn create_mapping(&self) -> Result<Value> {
        let descriptor = self.descriptor()?;
        lifecycle::ensure_index(self.engine.as_ref(), descriptor, &self.mapping).await
    }

    pub async fn recreate_index(&self) -> Result<Value> {
        let descriptor = self.descriptor()?;
        lifecycle::recreate_index(self.engine.as_ref(), descriptor, &self.mapping).await
    }

    pub fn indexer(&self) -> Result<DocumentIndexer> {
        Ok(DocumentIndexer::new(
            Arc::clone(&self.engine),
            Arc::clone(&self.mapping),
            self.descriptor()?.clone(),
        )
        .with_retry_policy(self.retry)
        .with_events(self.events.clone()))
    }

    pub fn synchronizer(&self) -> Result<Synchronizer> {
        Ok(Synchronizer::new(
            Arc::clone(&self.store),
            Arc::clone(&self.engine),
            Arc::clone(&self.mapping),
            self.descriptor()?.clone(),
        )
        .with_refresh(self.config.sync_refresh))
    }

    pub async fn index(&self, record: &Record, options: IndexOptions) -> Result<IndexResponse> {
        self.indexer()?.index_one(record, options).await
    }

    /// Remove the record's document in the background (see
    /// [`DocumentIndexer::remove_one`]).
    pub fn un_index(&self, record: &Record) -> Result<JoinHandle<RemoveOutcome>> {
        self.indexer()?.remove_one(record)
    }

    /// Persist to the primary store, then index. Neither step is rolled back
    /// when the other fails.
    pub async fn save_and_index(&self, record: &Record, refresh: bool) -> Result<IndexResponse> {
        self.store.save(record).await?;
        let options = IndexOptions {
            refresh,
            ..Default::default()
        };
        self.index(record, options).await.map_err(|e| {
            tracing::error!(
                "[INDEX {}] saved {} but indexing failed: {}",
                self.model_name,
                record.id().unwrap_or_default(),
                e
            );
            e
        })
    }

    /// [`save_and_index`](Self::save_and_index) with an index refresh, so the
    /// record is searchable as soon as this returns.
    pub async fn save_and_index_sync(&self, record: &Record) -> Result<IndexResponse> {
        self.save_and_index(record, true).await
    }

    pub async fn synchronize(&self, filter: &Filter) -> SyncReport {
        match self.synchronizer() {
            Ok(sync) => sync.run(filter, self.config.bulk_size).await,
            Err(e) => SyncReport {
                error: Some(e),
                ..Default::default()
            },
        }
    }

    pub fn synchronize_with_progress(
        &self,
        filter: Filter,
    ) -> Result<(mpsc::Receiver<PageOutcome>, JoinHandle<SyncReport>)> {
        Ok(self.synchronizer()?.spawn(filter, self.config.bulk_size))
    }

    /// Run `body` against the model's index, hydrating when asked to per call
    /// or model-wide.
    pub async fn search(&self, body: &Value, options: SearchOptions) -> Result<SearchResults> {
        let descriptor = self.descriptor()?;
        let results = self.engine.search(&descriptor.index, body).await?;

        if !(options.hydrate || self.config.hydrate) {
            return Ok(results);
        }
        let modifiers = options
            .hydrate_options
            .as_ref()
            .unwrap_or(&self.config.hydrate_options);
        hydrate(results, self.store.as_ref(), modifiers).await
    }

    pub async fn es_count(&self, query: Option<&Value>) -> Result<u64> {
        let descriptor = self.descriptor()?;
        self.engine
            .count(&descriptor.index, &descriptor.type_name, query)
            .await
    }

    /// Delete every document of this model's type from the index.
    pub async fn clear_all(&self, refresh: bool) -> Result<BulkResponse> {
        lifecycle::clear_type(
            self.engine.as_ref(),
            self.descriptor()?,
            self.config.bulk_size,
            refresh,
        )
        .await
    }

    /// Register the change-feed river for this model. `database` is the
    /// primary store database the collection lives in.
    pub async fn river(&self, database: &str) -> Result<Value> {
        let options = self.config.use_river.as_ref().ok_or_else(|| {
            MirrorError::Config(format!("river is not enabled for {}", self.model_name))
        })?;
        let config = RiverConfig::for_model(database, self.descriptor()?, options)?;
        register_river(self.engine.as_ref(), &config).await
    }
}
