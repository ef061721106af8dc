use crate::error::{MirrorError, Result};
use serde::{Deserialize, Serialize};

/// Where a model's documents live in the engine. Fixed once resolved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub index: String,
    #[serde(rename = "type")]
    pub type_name: String,
}

/// Index/type as configured, before the model name is known.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexTarget {
    #[serde(default)]
    pub index: Option<String>,
    #[serde(default, rename = "type")]
    pub type_name: Option<String>,
}

impl IndexTarget {
    pub fn new(index: Option<String>, type_name: Option<String>) -> Self {
        IndexTarget { index, type_name }
    }

    /// Fill in whatever was not configured from the model name: the index
    /// defaults to the lowercased name plus `s`, the type to the lowercased
    /// name. Explicit values are never replaced.
    pub fn resolve(&self, model_name: &str) -> Result<IndexDescriptor> {
        let model = model_name.trim().to_lowercase();
        if model.is_empty() && (self.index.is_none() || self.type_name.is_none()) {
            return Err(MirrorError::Validation(
                "Model name is required to derive index/type names".to_string(),
            ));
        }
        Ok(IndexDescriptor {
            index: self
                .index
                .clone()
                .unwrap_or_else(|| format!("{}s", model)),
            type_name: self.type_name.clone().unwrap_or(model),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_model_name() {
        let d = IndexTarget::default().resolve("BlogPost").unwrap();
        assert_eq!(d.index, "blogposts");
        assert_eq!(d.type_name, "blogpost");
    }

    #[test]
    fn test_explicit_values_win() {
        let target = IndexTarget::new(Some("content".into()), None);
        let d = target.resolve("Article").unwrap();
        assert_eq!(d.index, "content");
        assert_eq!(d.type_name, "article");
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let target = IndexTarget::default();
        let once = target.resolve("User").unwrap();
        let twice = target.resolve("User").unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_blank_model_name_rejected() {
        assert!(IndexTarget::default().resolve("  ").is_err());
        let full = IndexTarget::new(Some("i".into()), Some("t".into()));
        assert!(full.resolve("").is_ok());
    }
}
