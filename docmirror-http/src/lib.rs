//! HTTP transport for `docmirror`: an [`IndexEngine`](docmirror::IndexEngine)
//! speaking the Elasticsearch REST dialect over `reqwest`.
//!
//! ```no_run
//! # async fn run() -> docmirror::Result<()> {
//! use docmirror::{IndexEngine, MirrorConfig};
//! use docmirror_http::HttpIndexEngine;
//!
//! let engine = HttpIndexEngine::from_config(&MirrorConfig::default())?;
//! if !engine.index_exists("users").await? {
//!     engine.create_index("users", &serde_json::json!({})).await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod wire;

pub use client::{HttpIndexEngine, DEFAULT_TIMEOUT};
