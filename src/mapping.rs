//! Field mapping tree.
//!
//! Mirrors the engine's mapping JSON: a node with `properties` is an object
//! mapping, anything else is a leaf carrying a `type` and engine options.

use crate::error::{MirrorError, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Coarse classification of a leaf's engine type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Number,
    Date,
    Boolean,
    ObjectId,
    Other,
}

impl FieldType {
    pub fn classify(engine_type: &str) -> Self {
        match engine_type {
            "string" | "text" | "keyword" => FieldType::String,
            "number" | "long" | "integer" | "short" | "byte" | "double" | "float"
            | "half_float" => FieldType::Number,
            "date" => FieldType::Date,
            "boolean" => FieldType::Boolean,
            "objectid" | "object_id" => FieldType::ObjectId,
            _ => FieldType::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldMapping {
    /// Engine type name exactly as declared (`"string"`, `"long"`, ...).
    pub engine_type: String,
    /// Everything besides `type` (`index`, `boost`, `format`, ...).
    pub options: Map<String, Value>,
}

impl FieldMapping {
    pub fn field_type(&self) -> FieldType {
        FieldType::classify(&self.engine_type)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectMapping {
    pub properties: IndexMap<String, MappingNode>,
    /// Keys next to `properties`, e.g. `"type": "nested"` or `"dynamic"`.
    pub options: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum MappingNode {
    Field(FieldMapping),
    Object(ObjectMapping),
}

impl MappingNode {
    pub fn field(engine_type: &str) -> Self {
        MappingNode::Field(FieldMapping {
            engine_type: engine_type.to_string(),
            options: Map::new(),
        })
    }

    pub fn object<I, K>(properties: I) -> Self
    where
        I: IntoIterator<Item = (K, MappingNode)>,
        K: Into<String>,
    {
        MappingNode::Object(ObjectMapping {
            properties: properties
                .into_iter()
                .map(|(k, v)| (k.into(), v))
                .collect(),
            options: Map::new(),
        })
    }

    pub fn properties(&self) -> Option<&IndexMap<String, MappingNode>> {
        match self {
            MappingNode::Object(obj) => Some(&obj.properties),
            MappingNode::Field(_) => None,
        }
    }

    pub fn is_object(&self) -> bool {
        matches!(self, MappingNode::Object(_))
    }

    /// Parse an engine mapping document.
    pub fn from_json(json: &Value) -> Result<Self> {
        let obj = json.as_object().ok_or_else(|| {
            MirrorError::Validation(format!("Mapping node must be an object, got {}", json))
        })?;

        if let Some(props) = obj.get("properties") {
            let props = props.as_object().ok_or_else(|| {
                MirrorError::Validation("'properties' must be an object".to_string())
            })?;
            let mut properties = IndexMap::with_capacity(props.len());
            for (name, child) in props {
                let node = MappingNode::from_json(child).map_err(|e| match e {
                    MirrorError::Validation(msg) => {
                        MirrorError::Validation(format!("{}: {}", name, msg))
                    }
                    other => other,
                })?;
                properties.insert(name.clone(), node);
            }
            let options = obj
                .iter()
                .filter(|(k, _)| k.as_str() != "properties")
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            return Ok(MappingNode::Object(ObjectMapping {
                properties,
                options,
            }));
        }

        let engine_type = obj
            .get("type")
            .and_then(|v| v.as_str())
            .ok_or_else(|| MirrorError::Validation("Leaf mapping needs a 'type'".to_string()))?
            .to_string();
        let options = obj
            .iter()
            .filter(|(k, _)| k.as_str() != "type")
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(MappingNode::Field(FieldMapping {
            engine_type,
            options,
        }))
    }

    pub fn to_json(&self) -> Value {
        match self {
            MappingNode::Field(field) => {
                let mut map = Map::new();
                map.insert("type".to_string(), Value::String(field.engine_type.clone()));
                for (k, v) in &field.options {
                    map.insert(k.clone(), v.clone());
                }
                Value::Object(map)
            }
            MappingNode::Object(obj) => {
                let mut map = obj.options.clone();
                let props: Map<String, Value> = obj
                    .properties
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect();
                map.insert("properties".to_string(), Value::Object(props));
                Value::Object(map)
            }
        }
    }
}

impl TryFrom<Value> for MappingNode {
    type Error = MirrorError;

    fn try_from(value: Value) -> Result<Self> {
        MappingNode::from_json(&value)
    }
}

impl From<MappingNode> for Value {
    fn from(node: MappingNode) -> Self {
        node.to_json()
    }
}
