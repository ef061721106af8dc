//! Change-feed river registration.
//!
//! The river itself runs inside the engine (a MongoDB river plugin tailing the
//! oplog); all we do is describe source and target and submit it once.
//! Known to work with elasticsearch-river-mongodb 1.6 on a 0.20 engine.

use crate::descriptor::IndexDescriptor;
use crate::engine::IndexEngine;
use crate::error::{MirrorError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const RIVER_TYPE: &str = "mongodb";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiverOptions {
    /// Also stream GridFS files.
    #[serde(default)]
    pub gridfs: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiverSource {
    pub db: String,
    pub collection: String,
    pub gridfs: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiverIndex {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiverConfig {
    #[serde(rename = "type")]
    pub river_type: String,
    pub mongodb: RiverSource,
    pub index: RiverIndex,
}

impl RiverConfig {
    /// The source collection shares the index's name.
    ///
    /// # Errors
    ///
    /// [`MirrorError::Config`] when `database` is empty, which means the store
    /// connection hasn't been established yet.
    pub fn for_model(
        database: &str,
        descriptor: &IndexDescriptor,
        options: &RiverOptions,
    ) -> Result<Self> {
        if database.trim().is_empty() {
            return Err(MirrorError::Config(format!(
                "river for '{}' requested before the store connection has a database name",
                descriptor.index
            )));
        }
        Ok(RiverConfig {
            river_type: RIVER_TYPE.to_string(),
            mongodb: RiverSource {
                db: database.to_string(),
                collection: descriptor.index.clone(),
                gridfs: options.gridfs,
            },
            index: RiverIndex {
                name: descriptor.index.clone(),
                type_name: descriptor.type_name.clone(),
            },
        })
    }

    pub fn to_json(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Submit `config` as the river named after the target index.
pub async fn register_river(engine: &dyn IndexEngine, config: &RiverConfig) -> Result<Value> {
    tracing::info!(
        "[RIVER {}] registering {} river from {}.{}",
        config.index.name,
        config.river_type,
        config.mongodb.db,
        config.mongodb.collection
    );
    engine
        .put_river(&config.river_type, &config.index.name, &config.to_json()?)
        .await
}
