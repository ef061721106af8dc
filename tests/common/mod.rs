//! In-memory store and engine used by the integration tests.
//!
//! Both record every call so tests can assert on ordering and payloads, and
//! both can be scripted to fail.

#![allow(dead_code)]

use async_trait::async_trait;
use docmirror::{
    BulkAction, BulkActionKind, BulkItem, BulkOptions, BulkResponse, DocumentStore, Filter,
    HitSource, IndexEngine, IndexResponse, MirrorError, QueryModifiers, Record, Result,
    SearchHit, SearchResults,
};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Mutex;

pub fn user(id: usize) -> Record {
    Record::from_json(&json!({
        "_id": format!("{:024x}", id),
        "name": format!("user-{}", id),
        "email": format!("user{}@example.com", id),
        "password": "hunter2"
    }))
    .unwrap()
}

pub fn users(n: usize) -> Vec<Record> {
    (1..=n).map(user).collect()
}

pub fn user_mapping() -> docmirror::MappingNode {
    docmirror::MappingNode::from_json(&json!({
        "properties": {
            "name": {"type": "string"},
            "email": {"type": "string", "index": "not_analyzed"}
        }
    }))
    .unwrap()
}

// ── Store ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum StoreCall {
    Count,
    FindPage { skip: u64, limit: u64 },
    FindByIds { ids: Vec<String>, modifiers: QueryModifiers },
    Save(String),
}

#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<Vec<Record>>,
    calls: Mutex<Vec<StoreCall>>,
    fail_count: Mutex<bool>,
    fail_page_at_skip: Mutex<Option<u64>>,
    fail_find_by_ids: Mutex<bool>,
    fail_save: Mutex<bool>,
}

impl MemoryStore {
    pub fn with_records(records: Vec<Record>) -> Self {
        MemoryStore {
            records: Mutex::new(records),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn page_skips(&self) -> Vec<u64> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                StoreCall::FindPage { skip, .. } => Some(skip),
                _ => None,
            })
            .collect()
    }

    pub fn fail_count(&self) {
        *self.fail_count.lock().unwrap() = true;
    }

    pub fn fail_page_at(&self, skip: u64) {
        *self.fail_page_at_skip.lock().unwrap() = Some(skip);
    }

    pub fn fail_find_by_ids(&self) {
        *self.fail_find_by_ids.lock().unwrap() = true;
    }

    pub fn fail_save(&self) {
        *self.fail_save.lock().unwrap() = true;
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records
            .lock()
            .unwrap()
            .iter()
            .any(|r| r.id().ok().as_deref() == Some(id))
    }

    fn matching(&self, filter: &Filter) -> Vec<Record> {
        let conditions = filter.as_object().cloned().unwrap_or_default();
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| {
                let as_json = serde_json::to_value(r).unwrap();
                conditions
                    .iter()
                    .all(|(field, expected)| as_json.get(field) == Some(expected))
            })
            .cloned()
            .collect()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn count(&self, filter: &Filter) -> Result<u64> {
        self.calls.lock().unwrap().push(StoreCall::Count);
        if *self.fail_count.lock().unwrap() {
            return Err(MirrorError::Store("connection reset".into()));
        }
        Ok(self.matching(filter).len() as u64)
    }

    async fn find_page(&self, filter: &Filter, skip: u64, limit: u64) -> Result<Vec<Record>> {
        self.calls
            .lock()
            .unwrap()
            .push(StoreCall::FindPage { skip, limit });
        if *self.fail_page_at_skip.lock().unwrap() == Some(skip) {
            return Err(MirrorError::Store(format!("cursor lost at {}", skip)));
        }
        Ok(self
            .matching(filter)
            .into_iter()
            .skip(skip as usize)
            .take(limit as usize)
            .collect())
    }

    async fn find_by_ids(
        &self,
        ids: &[String],
        modifiers: &QueryModifiers,
    ) -> Result<Vec<Record>> {
        self.calls.lock().unwrap().push(StoreCall::FindByIds {
            ids: ids.to_vec(),
            modifiers: modifiers.clone(),
        });
        if *self.fail_find_by_ids.lock().unwrap() {
            return Err(MirrorError::Store("find failed".into()));
        }
        let wanted: HashSet<&String> = ids.iter().collect();
        // Natural order, not hit order, like a real `$in` query.
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.id().map(|id| wanted.contains(&id)).unwrap_or(false))
            .cloned()
            .collect())
    }

    async fn save(&self, record: &Record) -> Result<()> {
        let id = record.id()?;
        self.calls.lock().unwrap().push(StoreCall::Save(id.clone()));
        if *self.fail_save.lock().unwrap() {
            return Err(MirrorError::Store("write concern failed".into()));
        }
        let mut records = self.records.lock().unwrap();
        records.retain(|r| r.id().ok().as_deref() != Some(id.as_str()));
        records.push(record.clone());
        Ok(())
    }
}

// ── Engine ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    IndexExists(String),
    CreateIndex(String, Value),
    PutMapping(String, String, Value),
    DeleteIndex(String),
    Index {
        index: String,
        type_name: String,
        id: String,
        document: Value,
        refresh: bool,
    },
    Delete {
        index: String,
        type_name: String,
        id: String,
        at: tokio::time::Instant,
    },
    Bulk(Vec<BulkAction>, BulkOptions),
    Search(String, Value),
    Count(String, String, Option<Value>),
    PutRiver(String, String, Value),
}

#[derive(Default, Clone)]
struct IndexState {
    mappings: Map<String, Value>,
    docs: BTreeMap<(String, String), Value>,
}

#[derive(Default)]
pub struct MemoryEngine {
    indices: Mutex<BTreeMap<String, IndexState>>,
    calls: Mutex<Vec<EngineCall>>,
    delete_script: Mutex<VecDeque<Result<Value>>>,
    bulk_failures: Mutex<VecDeque<MirrorError>>,
    rejected_ids: Mutex<HashSet<String>>,
    fail_index: Mutex<Option<MirrorError>>,
}

fn deep_merge(target: &mut Value, incoming: &Value) {
    match (target, incoming) {
        (Value::Object(t), Value::Object(i)) => {
            for (k, v) in i {
                match t.get_mut(k) {
                    Some(existing) => deep_merge(existing, v),
                    None => {
                        t.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (t, i) => *t = i.clone(),
    }
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn bulk_calls(&self) -> Vec<Vec<BulkAction>> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                EngineCall::Bulk(actions, _) => Some(actions),
                _ => None,
            })
            .collect()
    }

    pub fn delete_calls(&self) -> Vec<tokio::time::Instant> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                EngineCall::Delete { at, .. } => Some(at),
                _ => None,
            })
            .collect()
    }

    /// Results handed out by `delete`, in order, before falling back to the
    /// real document state.
    pub fn script_deletes(&self, results: Vec<Result<Value>>) {
        *self.delete_script.lock().unwrap() = results.into();
    }

    /// Next bulk calls fail at the transport level, in order.
    pub fn fail_next_bulks(&self, errors: Vec<MirrorError>) {
        *self.bulk_failures.lock().unwrap() = errors.into();
    }

    /// Bulk entries for these ids come back with status 400.
    pub fn reject_ids(&self, ids: &[&str]) {
        let mut rejected = self.rejected_ids.lock().unwrap();
        for id in ids {
            rejected.insert(id.to_string());
        }
    }

    pub fn fail_index_with(&self, err: MirrorError) {
        *self.fail_index.lock().unwrap() = Some(err);
    }

    pub fn create(&self, index: &str) {
        self.indices
            .lock()
            .unwrap()
            .insert(index.to_string(), IndexState::default());
    }

    pub fn mappings(&self, index: &str) -> Option<Value> {
        self.indices
            .lock()
            .unwrap()
            .get(index)
            .map(|s| Value::Object(s.mappings.clone()))
    }

    pub fn doc(&self, index: &str, type_name: &str, id: &str) -> Option<Value> {
        self.indices
            .lock()
            .unwrap()
            .get(index)
            .and_then(|s| s.docs.get(&(type_name.to_string(), id.to_string())).cloned())
    }

    pub fn doc_count(&self, index: &str) -> usize {
        self.indices
            .lock()
            .unwrap()
            .get(index)
            .map(|s| s.docs.len())
            .unwrap_or(0)
    }

    pub fn put_doc(&self, index: &str, type_name: &str, id: &str, doc: Value) {
        self.indices
            .lock()
            .unwrap()
            .entry(index.to_string())
            .or_default()
            .docs
            .insert((type_name.to_string(), id.to_string()), doc);
    }

    fn record(&self, call: EngineCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl IndexEngine for MemoryEngine {
    async fn index_exists(&self, index: &str) -> Result<bool> {
        self.record(EngineCall::IndexExists(index.to_string()));
        Ok(self.indices.lock().unwrap().contains_key(index))
    }

    async fn create_index(&self, index: &str, body: &Value) -> Result<Value> {
        self.record(EngineCall::CreateIndex(index.to_string(), body.clone()));
        let mut indices = self.indices.lock().unwrap();
        if indices.contains_key(index) {
            return Err(MirrorError::Validation(format!(
                "index_already_exists_exception: {}",
                index
            )));
        }
        let mappings = body
            .get("mappings")
            .and_then(|m| m.as_object())
            .cloned()
            .unwrap_or_default();
        indices.insert(
            index.to_string(),
            IndexState {
                mappings,
                docs: BTreeMap::new(),
            },
        );
        Ok(json!({"acknowledged": true}))
    }

    async fn put_mapping(&self, index: &str, type_name: &str, mapping: &Value) -> Result<Value> {
        self.record(EngineCall::PutMapping(
            index.to_string(),
            type_name.to_string(),
            mapping.clone(),
        ));
        let mut indices = self.indices.lock().unwrap();
        let state = indices
            .get_mut(index)
            .ok_or_else(|| MirrorError::NotFound(format!("index {}", index)))?;
        let mut merged = Value::Object(state.mappings.clone());
        deep_merge(&mut merged, mapping);
        if let Value::Object(m) = merged {
            state.mappings = m;
        }
        Ok(json!({"acknowledged": true}))
    }

    async fn delete_index(&self, index: &str) -> Result<Value> {
        self.record(EngineCall::DeleteIndex(index.to_string()));
        match self.indices.lock().unwrap().remove(index) {
            Some(_) => Ok(json!({"acknowledged": true})),
            None => Err(MirrorError::NotFound(format!("index {}", index))),
        }
    }

    async fn index(
        &self,
        index: &str,
        type_name: &str,
        id: &str,
        document: &Value,
        refresh: bool,
    ) -> Result<IndexResponse> {
        self.record(EngineCall::Index {
            index: index.to_string(),
            type_name: type_name.to_string(),
            id: id.to_string(),
            document: document.clone(),
            refresh,
        });
        if let Some(err) = self.fail_index.lock().unwrap().clone() {
            return Err(err);
        }
        self.put_doc(index, type_name, id, document.clone());
        Ok(IndexResponse {
            index: index.to_string(),
            type_name: Some(type_name.to_string()),
            id: id.to_string(),
            version: Some(1),
            result: Some("created".to_string()),
        })
    }

    async fn delete(&self, index: &str, type_name: &str, id: &str) -> Result<Value> {
        self.record(EngineCall::Delete {
            index: index.to_string(),
            type_name: type_name.to_string(),
            id: id.to_string(),
            at: tokio::time::Instant::now(),
        });
        if let Some(scripted) = self.delete_script.lock().unwrap().pop_front() {
            return scripted;
        }
        let removed = self
            .indices
            .lock()
            .unwrap()
            .get_mut(index)
            .and_then(|s| s.docs.remove(&(type_name.to_string(), id.to_string())));
        match removed {
            Some(_) => Ok(json!({"found": true, "_id": id})),
            None => Err(MirrorError::NotFound(format!("{}/{}/{}", index, type_name, id))),
        }
    }

    async fn bulk(&self, actions: &[BulkAction], options: BulkOptions) -> Result<BulkResponse> {
        self.record(EngineCall::Bulk(actions.to_vec(), options));
        if let Some(err) = self.bulk_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        let rejected = self.rejected_ids.lock().unwrap().clone();
        let mut items = Vec::with_capacity(actions.len());
        for action in actions {
            let id = action.id().to_string();
            if rejected.contains(&id) {
                items.push(BulkItem {
                    action: action.kind(),
                    id,
                    status: 400,
                    error: Some("mapper_parsing_exception".into()),
                });
                continue;
            }
            match action {
                BulkAction::Index {
                    index,
                    type_name,
                    id,
                    document,
                } => {
                    self.put_doc(index, type_name, id, document.clone());
                    items.push(BulkItem {
                        action: BulkActionKind::Index,
                        id: id.clone(),
                        status: 201,
                        error: None,
                    });
                }
                BulkAction::Delete {
                    index,
                    type_name,
                    id,
                } => {
                    let removed = self
                        .indices
                        .lock()
                        .unwrap()
                        .get_mut(index)
                        .and_then(|s| s.docs.remove(&(type_name.clone(), id.clone())));
                    items.push(BulkItem {
                        action: BulkActionKind::Delete,
                        id: id.clone(),
                        status: if removed.is_some() { 200 } else { 404 },
                        error: None,
                    });
                }
            }
        }
        let errors = items.iter().any(|i| i.error.is_some());
        Ok(BulkResponse {
            took_ms: 1,
            errors,
            items,
        })
    }

    async fn search(&self, index: &str, body: &Value) -> Result<SearchResults> {
        self.record(EngineCall::Search(index.to_string(), body.clone()));
        let indices = self.indices.lock().unwrap();
        let state = indices
            .get(index)
            .ok_or_else(|| MirrorError::NotFound(format!("index {}", index)))?;
        let size = body.get("size").and_then(|s| s.as_u64()).unwrap_or(10) as usize;
        let hits: Vec<SearchHit> = state
            .docs
            .iter()
            .take(size)
            .map(|((type_name, id), doc)| SearchHit {
                index: index.to_string(),
                type_name: Some(type_name.clone()),
                id: id.clone(),
                score: Some(1.0),
                source: HitSource::Raw(doc.clone()),
            })
            .collect();
        Ok(SearchResults {
            total: state.docs.len() as u64,
            max_score: Some(1.0),
            hits,
        })
    }

    async fn count(&self, index: &str, type_name: &str, query: Option<&Value>) -> Result<u64> {
        self.record(EngineCall::Count(
            index.to_string(),
            type_name.to_string(),
            query.cloned(),
        ));
        Ok(self
            .indices
            .lock()
            .unwrap()
            .get(index)
            .map(|s| s.docs.keys().filter(|(t, _)| t == type_name).count() as u64)
            .unwrap_or(0))
    }

    async fn put_river(&self, river_type: &str, name: &str, config: &Value) -> Result<Value> {
        self.record(EngineCall::PutRiver(
            river_type.to_string(),
            name.to_string(),
            config.clone(),
        ));
        Ok(json!({"ok": true}))
    }
}
