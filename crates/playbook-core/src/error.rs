//! Error taxonomy for playbook maintenance operations.
//!
//! Per-delta rejections are not errors (see [`playbook_merge::Rejection`]) and
//! neither is an archival pass that ends over budget; both are result fields.

use std::path::PathBuf;

use playbook_merge::CodecError;

/// Errors produced by file-backed playbook operations.
#[derive(Debug, thiserror::Error)]
pub enum PlaybookError {
    #[error("required input missing: {}", path.display())]
    MissingInput { path: PathBuf },

    #[error("failed to parse {}: {source}", path.display())]
    Codec {
        path: PathBuf,
        #[source]
        source: CodecError,
    },

    #[error("failed to persist {}: {source}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("bullet {id} not found in archive {}", path.display())]
    BulletNotArchived { id: String, path: PathBuf },

    #[error("cannot restore bullet {id}: active bullet {existing} has the same content")]
    RestoreConflict { id: String, existing: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for playbook operations.
pub type Result<T> = std::result::Result<T, PlaybookError>;
