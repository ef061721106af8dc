//! Request encoding and response decoding for the engine's REST dialect.

use docmirror::{
    BulkAction, BulkActionKind, BulkItem, BulkResponse, HitSource, MirrorError, Result, SearchHit,
    SearchResults,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};

/// Newline-delimited bulk body: one action line, plus a source line for
/// index actions. The body must end with a newline.
pub fn encode_bulk(actions: &[BulkAction]) -> Result<String> {
    let mut body = String::new();
    for action in actions {
        match action {
            BulkAction::Index {
                index,
                type_name,
                id,
                document,
            } => {
                let header = json!({"index": {"_index": index, "_type": type_name, "_id": id}});
                body.push_str(&serde_json::to_string(&header)?);
                body.push('\n');
                body.push_str(&serde_json::to_string(document)?);
                body.push('\n');
            }
            BulkAction::Delete {
                index,
                type_name,
                id,
            } => {
                let header = json!({"delete": {"_index": index, "_type": type_name, "_id": id}});
                body.push_str(&serde_json::to_string(&header)?);
                body.push('\n');
            }
        }
    }
    Ok(body)
}

/// `error` is an object (`{"type", "reason"}`) on newer engines and a plain
/// string on older ones.
pub fn error_reason(error: &Value) -> String {
    match error {
        Value::String(s) => s.clone(),
        Value::Object(obj) => {
            let kind = obj.get("type").and_then(Value::as_str);
            let reason = obj.get("reason").and_then(Value::as_str);
            match (kind, reason) {
                (Some(k), Some(r)) => format!("{}: {}", k, r),
                (Some(k), None) => k.to_string(),
                (None, Some(r)) => r.to_string(),
                (None, None) => error.to_string(),
            }
        }
        other => other.to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct RawBulkResponse {
    #[serde(default)]
    took: u64,
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct RawBulkItem {
    #[serde(rename = "_id", default)]
    id: String,
    #[serde(default)]
    status: Option<u16>,
    /// Pre-1.0 engines report `"ok": true` instead of a status.
    #[serde(default)]
    ok: Option<bool>,
    #[serde(default)]
    error: Option<Value>,
}

impl RawBulkItem {
    fn status(&self) -> u16 {
        match self.status {
            Some(status) => status,
            None if self.error.is_none() && self.ok != Some(false) => 200,
            None => 500,
        }
    }
}

pub fn decode_bulk(body: Value) -> Result<BulkResponse> {
    let raw: RawBulkResponse = serde_json::from_value(body)?;
    let mut items = Vec::with_capacity(raw.items.len());
    for entry in raw.items {
        // each item is {"<action>": {...}}
        let (action, detail) = entry.into_iter().next().ok_or_else(|| {
            MirrorError::Transport("bulk response item without an action".to_string())
        })?;
        let action = match action.as_str() {
            "delete" => BulkActionKind::Delete,
            _ => BulkActionKind::Index,
        };
        let item: RawBulkItem = serde_json::from_value(detail)?;
        let status = item.status();
        items.push(BulkItem {
            action,
            id: item.id,
            status,
            error: item.error.as_ref().map(error_reason),
        });
    }
    Ok(BulkResponse {
        took_ms: raw.took,
        errors: raw.errors,
        items,
    })
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawTotal {
    Count(u64),
    Object { value: u64 },
}

#[derive(Debug, Deserialize)]
struct RawHit {
    #[serde(rename = "_index", default)]
    index: String,
    #[serde(rename = "_type", default)]
    type_name: Option<String>,
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_score", default)]
    score: Option<f64>,
    #[serde(rename = "_source", default)]
    source: Value,
}

#[derive(Debug, Deserialize)]
struct RawHits {
    total: RawTotal,
    #[serde(default)]
    max_score: Option<f64>,
    #[serde(default)]
    hits: Vec<RawHit>,
}

#[derive(Debug, Deserialize)]
struct RawSearchResponse {
    hits: RawHits,
}

pub fn decode_search(body: Value) -> Result<SearchResults> {
    let raw: RawSearchResponse = serde_json::from_value(body)?;
    let total = match raw.hits.total {
        RawTotal::Count(n) | RawTotal::Object { value: n } => n,
    };
    Ok(SearchResults {
        total,
        max_score: raw.hits.max_score,
        hits: raw
            .hits
            .hits
            .into_iter()
            .map(|h| SearchHit {
                index: h.index,
                type_name: h.type_name,
                id: h.id,
                score: h.score,
                source: HitSource::Raw(h.source),
            })
            .collect(),
    })
}

#[derive(Debug, Deserialize)]
struct RawCount {
    count: u64,
}

pub fn decode_count(body: Value) -> Result<u64> {
    let raw: RawCount = serde_json::from_value(body)?;
    Ok(raw.count)
}
