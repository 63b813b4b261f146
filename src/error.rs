//! Error types shared across tabdeck.
//!
//! Nothing here is fatal to the host: the coordination layer logs these and
//! degrades. They exist so inner layers can propagate with `?`.

use thiserror::Error;

use crate::models::EntityId;

/// Storage backend errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("stored record is not a JSON string map: {0}")]
    Json(#[from] serde_json::Error),

    #[error("key-value store failed: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("atomic replace failed: {0}")]
    Persist(#[from] tempfile::PersistError),

    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
}

/// Errors reported by host collaborators.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("entity not found: {0}")]
    NotFound(EntityId),

    #[error("entity {0} is missing required structure")]
    MissingStructure(EntityId),

    #[error("host capability unavailable: {0}")]
    Unavailable(&'static str),

    #[error("host operation failed: {0}")]
    Failed(String),
}
