use crate::descriptor::IndexTarget;
use crate::error::{MirrorError, Result};
use crate::index::river::RiverOptions;
use crate::index::sync::DEFAULT_PAGE_SIZE;
use crate::types::QueryModifiers;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

pub const CONFIG_FILE_NAME: &str = "docmirror.json";

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    9200
}

fn default_bulk_size() -> u64 {
    DEFAULT_PAGE_SIZE
}

/// Per-model mirroring options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MirrorConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Explicit index name; derived from the model name when unset.
    #[serde(default)]
    pub index: Option<String>,
    /// Explicit type name; derived from the model name when unset.
    #[serde(default, rename = "type")]
    pub type_name: Option<String>,
    /// Hydrate every search, not only those asking for it.
    #[serde(default)]
    pub hydrate: bool,
    /// Default store query modifiers for hydration.
    #[serde(default)]
    pub hydrate_options: QueryModifiers,
    /// Records per bulk page during synchronize.
    #[serde(default = "default_bulk_size")]
    pub bulk_size: u64,
    /// Refresh the index after each synchronize page.
    #[serde(default)]
    pub sync_refresh: bool,
    /// Enables the change-feed river when present.
    #[serde(default)]
    pub use_river: Option<RiverOptions>,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        MirrorConfig {
            host: default_host(),
            port: default_port(),
            index: None,
            type_name: None,
            hydrate: false,
            hydrate_options: QueryModifiers::default(),
            bulk_size: default_bulk_size(),
            sync_refresh: false,
            use_river: None,
        }
    }
}

fn env_bool(name: &str) -> Result<Option<bool>> {
    match env::var(name) {
        Ok(v) => match v.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(Some(true)),
            "0" | "false" | "no" | "" => Ok(Some(false)),
            _ => Err(MirrorError::Config(format!("Invalid {}: {}", name, v))),
        },
        Err(_) => Ok(None),
    }
}

impl MirrorConfig {
    /// Engine base URL. `host` may already carry a scheme.
    pub fn base_url(&self) -> String {
        if self.host.starts_with("http://") || self.host.starts_with("https://") {
            format!("{}:{}", self.host.trim_end_matches('/'), self.port)
        } else {
            format!("http://{}:{}", self.host, self.port)
        }
    }

    pub fn target(&self) -> IndexTarget {
        IndexTarget::new(self.index.clone(), self.type_name.clone())
    }

    pub fn validate(&self) -> Result<()> {
        if self.bulk_size == 0 {
            return Err(MirrorError::Config("bulk_size must be at least 1".into()));
        }
        if self.host.trim().is_empty() {
            return Err(MirrorError::Config("host must not be empty".into()));
        }
        Ok(())
    }

    /// Load from `{dir}/docmirror.json`, falling back to defaults when the file
    /// is missing or unreadable.
    pub fn load_or_default(dir: &Path) -> Self {
        let path = dir.join(CONFIG_FILE_NAME);
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(content) => match serde_json::from_str::<MirrorConfig>(&content) {
                    Ok(config) => {
                        tracing::info!(
                            "Loaded mirror config from {}: engine={}",
                            path.display(),
                            config.base_url()
                        );
                        return config;
                    }
                    Err(e) => {
                        tracing::error!("Failed to parse {}: {}, using defaults", path.display(), e)
                    }
                },
                Err(e) => {
                    tracing::error!("Failed to read {}: {}, using defaults", path.display(), e)
                }
            }
        }
        MirrorConfig::default()
    }

    /// Defaults overridden by `DOCMIRROR_*` environment variables.
    ///
    /// Reads `DOCMIRROR_HOST`, `DOCMIRROR_PORT`, `DOCMIRROR_INDEX`,
    /// `DOCMIRROR_TYPE`, `DOCMIRROR_HYDRATE`, `DOCMIRROR_BULK_SIZE`,
    /// `DOCMIRROR_SYNC_REFRESH`, `DOCMIRROR_USE_RIVER` and
    /// `DOCMIRROR_RIVER_GRIDFS`.
    pub fn from_env() -> Result<Self> {
        MirrorConfig::default().with_env_overrides()
    }

    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(host) = env::var("DOCMIRROR_HOST") {
            self.host = host;
        }
        if let Ok(port) = env::var("DOCMIRROR_PORT") {
            self.port = port
                .parse()
                .map_err(|_| MirrorError::Config(format!("Invalid DOCMIRROR_PORT: {}", port)))?;
        }
        if let Ok(index) = env::var("DOCMIRROR_INDEX") {
            self.index = Some(index);
        }
        if let Ok(type_name) = env::var("DOCMIRROR_TYPE") {
            self.type_name = Some(type_name);
        }
        if let Some(hydrate) = env_bool("DOCMIRROR_HYDRATE")? {
            self.hydrate = hydrate;
        }
        if let Ok(size) = env::var("DOCMIRROR_BULK_SIZE") {
            self.bulk_size = size.parse().map_err(|_| {
                MirrorError::Config(format!("Invalid DOCMIRROR_BULK_SIZE: {}", size))
            })?;
        }
        if let Some(refresh) = env_bool("DOCMIRROR_SYNC_REFRESH")? {
            self.sync_refresh = refresh;
        }
        if let Some(true) = env_bool("DOCMIRROR_USE_RIVER")? {
            let gridfs = env_bool("DOCMIRROR_RIVER_GRIDFS")?.unwrap_or(false);
            self.use_river = Some(RiverOptions { gridfs });
        }
        self.validate()?;
        Ok(self)
    }
}
