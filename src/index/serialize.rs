//! Projection of domain records into index documents.

use crate::mapping::{FieldMapping, FieldType, MappingNode};
use crate::types::{canonical_timestamp, ObjectId, Record, RecordValue};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde_json::{Map, Value};

/// Project a whole record through the root mapping.
///
/// Always yields a JSON object; fields the mapping doesn't declare, or that
/// the record doesn't carry, are left out.
pub fn serialize_record(record: &Record, mapping: &MappingNode) -> Value {
    match mapping {
        MappingNode::Object(obj) => Value::Object(project_fields(record.fields(), &obj.properties)),
        MappingNode::Field(_) => Value::Object(Map::new()),
    }
}

/// Project one value through a mapping node. `None` means "absent": the
/// caller must omit the field rather than write a null.
pub fn serialize(value: Option<&RecordValue>, node: &MappingNode) -> Option<Value> {
    let value = value?;
    match node {
        MappingNode::Object(obj) => match value {
            RecordValue::Object(fields) => {
                Some(Value::Object(project_fields(fields, &obj.properties)))
            }
            RecordValue::Array(items) => Some(Value::Array(
                items
                    .iter()
                    .filter_map(|item| serialize(Some(item), node))
                    .collect(),
            )),
            RecordValue::Null => Some(Value::Null),
            _ => None,
        },
        MappingNode::Field(field) => serialize_leaf(value, field.field_type()),
    }
}

fn project_fields(
    fields: &IndexMap<String, RecordValue>,
    properties: &IndexMap<String, MappingNode>,
) -> Map<String, Value> {
    let mut out = Map::new();
    for (name, child) in properties {
        if let Some(val) = serialize(fields.get(name), child) {
            out.insert(name.clone(), val);
        }
    }
    out
}

fn serialize_leaf(value: &RecordValue, field_type: FieldType) -> Option<Value> {
    match value {
        RecordValue::Null => Some(Value::Null),
        RecordValue::Bool(b) => Some(Value::Bool(*b)),
        RecordValue::Number(n) => Some(
            n.as_i64()
                .filter(|_| field_type == FieldType::Date)
                .and_then(DateTime::<Utc>::from_timestamp_millis)
                .map(|dt| Value::String(canonical_timestamp(&dt)))
                .unwrap_or_else(|| Value::Number(n.clone())),
        ),
        RecordValue::String(s) => Some(Value::String(normalize_string(s, field_type))),
        RecordValue::ObjectId(oid) => Some(Value::String(oid.to_hex())),
        RecordValue::Date(dt) => Some(Value::String(canonical_timestamp(dt))),
        // Primitives only; nested objects and arrays would leak undeclared
        // fields.
        RecordValue::Array(items) => Some(Value::Array(
            items
                .iter()
                .filter(|item| !matches!(item, RecordValue::Object(_) | RecordValue::Array(_)))
                .filter_map(|item| serialize_leaf(item, field_type))
                .collect(),
        )),
        RecordValue::Object(_) => None,
    }
}

/// Strings under date and id leaves are brought to canonical form when they
/// parse; anything else passes through untouched.
fn normalize_string(s: &str, field_type: FieldType) -> String {
    match field_type {
        FieldType::Date => DateTime::parse_from_rfc3339(s)
            .map(|dt| canonical_timestamp(&dt.with_timezone(&Utc)))
            .unwrap_or_else(|_| s.to_string()),
        FieldType::ObjectId => s
            .parse::<ObjectId>()
            .map(|oid| oid.to_hex())
            .unwrap_or_else(|_| s.to_string()),
        _ => s.to_string(),
    }
}
