use crate::error::{MirrorError, Result};
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use indexmap::IndexMap;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Primary store query document (e.g. `{"status": "active"}`). Opaque to the
/// core; handed to the [`crate::store::DocumentStore`] untouched.
pub type Filter = Value;

/// Name of the identifier field on every record.
pub const ID_FIELD: &str = "_id";

/// Render a timestamp the way dates are stored in index documents:
/// RFC 3339, millisecond precision, `Z` suffix.
pub fn canonical_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// 12-byte object identifier. Its canonical form is 24 lowercase hex chars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId([u8; 12]);

impl ObjectId {
    pub fn from_bytes(bytes: [u8; 12]) -> Self {
        ObjectId(bytes)
    }

    pub fn bytes(&self) -> [u8; 12] {
        self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for ObjectId {
    type Err = MirrorError;

    fn from_str(s: &str) -> Result<Self> {
        let raw = hex::decode(s)
            .map_err(|e| MirrorError::Validation(format!("Invalid object id '{}': {}", s, e)))?;
        let bytes: [u8; 12] = raw.try_into().map_err(|_| {
            MirrorError::Validation(format!("Invalid object id '{}': expected 12 bytes", s))
        })?;
        Ok(ObjectId(bytes))
    }
}

/// A value inside a domain record.
///
/// Unlike plain JSON this keeps object identifiers and dates as distinct
/// types, so the serializer can normalize them.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordValue {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    ObjectId(ObjectId),
    Date(DateTime<Utc>),
    Array(Vec<RecordValue>),
    Object(IndexMap<String, RecordValue>),
}

impl RecordValue {
    /// Convert JSON into a record value.
    ///
    /// Understands the extended-JSON wrappers `{"$oid": "<hex>"}` and
    /// `{"$date": "<rfc3339>" | <millis>}`; anything else maps structurally.
    pub fn from_json(json: &Value) -> Result<Self> {
        Ok(match json {
            Value::Null => RecordValue::Null,
            Value::Bool(b) => RecordValue::Bool(*b),
            Value::Number(n) => RecordValue::Number(n.clone()),
            Value::String(s) => RecordValue::String(s.clone()),
            Value::Array(items) => RecordValue::Array(
                items
                    .iter()
                    .map(RecordValue::from_json)
                    .collect::<Result<Vec<_>>>()?,
            ),
            Value::Object(obj) => {
                if obj.len() == 1 {
                    if let Some(oid) = obj.get("$oid").and_then(|v| v.as_str()) {
                        return Ok(RecordValue::ObjectId(oid.parse()?));
                    }
                    if let Some(date) = obj.get("$date") {
                        return Ok(RecordValue::Date(parse_extended_date(date)?));
                    }
                }
                let mut fields = IndexMap::with_capacity(obj.len());
                for (key, val) in obj {
                    fields.insert(key.clone(), RecordValue::from_json(val)?);
                }
                RecordValue::Object(fields)
            }
        })
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            RecordValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&IndexMap<String, RecordValue>> {
        match self {
            RecordValue::Object(o) => Some(o),
            _ => None,
        }
    }
}

fn parse_extended_date(value: &Value) -> Result<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| MirrorError::Validation(format!("Invalid $date '{}': {}", s, e))),
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .ok_or_else(|| MirrorError::Validation(format!("Invalid $date millis: {}", n))),
        other => Err(MirrorError::Validation(format!(
            "Invalid $date value: {}",
            other
        ))),
    }
}

impl From<&str> for RecordValue {
    fn from(s: &str) -> Self {
        RecordValue::String(s.to_string())
    }
}

impl From<String> for RecordValue {
    fn from(s: String) -> Self {
        RecordValue::String(s)
    }
}

impl From<i64> for RecordValue {
    fn from(i: i64) -> Self {
        RecordValue::Number(i.into())
    }
}

impl From<bool> for RecordValue {
    fn from(b: bool) -> Self {
        RecordValue::Bool(b)
    }
}

impl From<ObjectId> for RecordValue {
    fn from(id: ObjectId) -> Self {
        RecordValue::ObjectId(id)
    }
}

impl From<DateTime<Utc>> for RecordValue {
    fn from(dt: DateTime<Utc>) -> Self {
        RecordValue::Date(dt)
    }
}

impl Serialize for RecordValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            RecordValue::Null => serializer.serialize_unit(),
            RecordValue::Bool(b) => serializer.serialize_bool(*b),
            RecordValue::Number(n) => n.serialize(serializer),
            RecordValue::String(s) => serializer.serialize_str(s),
            RecordValue::ObjectId(id) => serializer.serialize_str(&id.to_hex()),
            RecordValue::Date(dt) => serializer.serialize_str(&canonical_timestamp(dt)),
            RecordValue::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            RecordValue::Object(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (k, v) in fields {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}

/// An authoritative record from the primary document store.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    fields: IndexMap<String, RecordValue>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fields(fields: IndexMap<String, RecordValue>) -> Self {
        Record { fields }
    }

    /// Parse a record from a JSON object (see [`RecordValue::from_json`]).
    ///
    /// # Errors
    ///
    /// Returns [`MirrorError::Validation`] if `json` is not an object or holds a
    /// malformed `$oid`/`$date` wrapper.
    pub fn from_json(json: &Value) -> Result<Self> {
        match RecordValue::from_json(json)? {
            RecordValue::Object(fields) => Ok(Record { fields }),
            _ => Err(MirrorError::Validation(
                "Expected JSON object for record".to_string(),
            )),
        }
    }

    /// Builder-style insert.
    pub fn with(mut self, field: &str, value: impl Into<RecordValue>) -> Self {
        self.fields.insert(field.to_string(), value.into());
        self
    }

    pub fn insert(&mut self, field: &str, value: impl Into<RecordValue>) {
        self.fields.insert(field.to_string(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&RecordValue> {
        self.fields.get(field)
    }

    pub fn fields(&self) -> &IndexMap<String, RecordValue> {
        &self.fields
    }

    /// Canonical string form of the record's `_id`.
    pub fn id(&self) -> Result<String> {
        match self.fields.get(ID_FIELD) {
            None | Some(RecordValue::Null) => Err(MirrorError::MissingField(ID_FIELD.to_string())),
            Some(RecordValue::ObjectId(oid)) => Ok(oid.to_hex()),
            Some(RecordValue::String(s)) => Ok(s.clone()),
            Some(RecordValue::Number(n)) => Ok(n.to_string()),
            Some(other) => Err(MirrorError::Validation(format!(
                "Unsupported _id value: {:?}",
                other
            ))),
        }
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (k, v) in &self.fields {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Either the engine's stored fields or the record re-fetched from the
/// primary store.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum HitSource {
    Raw(Value),
    Hydrated(Record),
}

impl HitSource {
    pub fn is_hydrated(&self) -> bool {
        matches!(self, HitSource::Hydrated(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    #[serde(rename = "_index")]
    pub index: String,
    #[serde(rename = "_type", skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_score")]
    pub score: Option<f64>,
    #[serde(rename = "_source")]
    pub source: HitSource,
}

/// Ranked hits from one search call. Order is the engine's rank order.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct SearchResults {
    pub total: u64,
    pub max_score: Option<f64>,
    pub hits: Vec<SearchHit>,
}

impl SearchResults {
    pub fn ids(&self) -> Vec<String> {
        self.hits.iter().map(|h| h.id.clone()).collect()
    }

    /// Ids of hits still carrying raw engine fields after hydration, i.e.
    /// the primary store no longer had them.
    pub fn unhydrated_ids(&self) -> Vec<&str> {
        self.hits
            .iter()
            .filter(|h| !h.source.is_hydrated())
            .map(|h| h.id.as_str())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BulkActionKind {
    Index,
    Delete,
}

/// One entry of a bulk request.
#[derive(Debug, Clone, PartialEq)]
pub enum BulkAction {
    Index {
        index: String,
        type_name: String,
        id: String,
        document: Value,
    },
    Delete {
        index: String,
        type_name: String,
        id: String,
    },
}

impl BulkAction {
    pub fn kind(&self) -> BulkActionKind {
        match self {
            BulkAction::Index { .. } => BulkActionKind::Index,
            BulkAction::Delete { .. } => BulkActionKind::Delete,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            BulkAction::Index { id, .. } | BulkAction::Delete { id, .. } => id,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkOptions {
    pub refresh: bool,
}

/// Per-entry outcome of a bulk request. Items may come back in any order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulkItem {
    pub action: BulkActionKind,
    pub id: String,
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BulkItem {
    pub fn is_success(&self) -> bool {
        self.error.is_none() && (200..300).contains(&self.status)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct BulkResponse {
    pub took_ms: u64,
    pub errors: bool,
    pub items: Vec<BulkItem>,
}

impl BulkResponse {
    pub fn failed_count(&self) -> usize {
        self.items.iter().filter(|i| !i.is_success()).count()
    }

    /// Turn rejected entries into [`MirrorError::PartialBatch`].
    pub fn check(&self) -> Result<()> {
        let failed = self.failed_count();
        if failed > 0 || self.errors {
            return Err(MirrorError::PartialBatch {
                failed,
                total: self.items.len(),
            });
        }
        Ok(())
    }
}

/// Options for a single-document index request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexOptions {
    /// Overrides the model's index name.
    pub index: Option<String>,
    /// Overrides the model's type name.
    pub type_name: Option<String>,
    /// Overrides the record's `_id` as the document id.
    pub id: Option<String>,
    pub refresh: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct IndexResponse {
    #[serde(rename = "_index", default)]
    pub index: String,
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    #[serde(rename = "_id", default)]
    pub id: String,
    #[serde(rename = "_version", default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

/// Modifiers applied to the primary-store query during hydration
/// (`{"select": "name address", "sort": "-name", "lean": true}`).
/// Unknown keys are carried in `extra` and passed through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryModifiers {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<String>,
    #[serde(default)]
    pub lean: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
