use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MirrorError {
    /// Engine or network unavailable. Never retried by the core.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The engine reported the target (index, document) missing.
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// The bulk call itself succeeded but some entries were rejected.
    #[error("Bulk batch partially failed: {failed} of {total} entries rejected")]
    PartialBatch { failed: usize, total: usize },

    #[error("Document store error: {0}")]
    Store(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, MirrorError>;

impl From<serde_json::Error> for MirrorError {
    fn from(e: serde_json::Error) -> Self {
        MirrorError::Json(e.to_string())
    }
}

impl MirrorError {
    /// Only "not found" is worth retrying on delete: the engine may not have
    /// caught up with the primary store yet.
    pub fn is_retryable_delete(&self) -> bool {
        matches!(self, MirrorError::NotFound(_))
    }

    /// Short machine-readable code, used in logs and the CLI's JSON output.
    pub fn code(&self) -> &'static str {
        match self {
            MirrorError::Transport(_) => "transport_error",
            MirrorError::NotFound(_) => "not_found",
            MirrorError::Validation(_) => "validation_error",
            MirrorError::PartialBatch { .. } => "partial_batch",
            MirrorError::Store(_) => "store_error",
            MirrorError::MissingField(_) => "missing_field",
            MirrorError::Json(_) => "json_error",
            MirrorError::Config(_) => "config_error",
        }
    }
}
