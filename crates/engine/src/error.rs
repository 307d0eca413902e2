use normcache_core::CoreError;
use normcache_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("no selection entry for payload field `{field}` at `{path}`")]
    UnknownField { path: String, field: String },

    #[error("shape mismatch at `{path}`: expected {expected}, found {found}")]
    ShapeMismatch {
        path: String,
        expected: &'static str,
        found: String,
    },

    #[error("cannot find connection {name} for parent {parent_id}")]
    UnknownConnection { name: String, parent_id: String },

    #[error("unknown subscription: {0}")]
    UnknownSubscription(String),

    #[error("invalid parent id at `{path}`: {reason}")]
    InvalidParentId { path: String, reason: String },

    #[error("cannot delete using value {value} at `{path}`")]
    InvalidDeleteTarget { path: String, value: String },
}
