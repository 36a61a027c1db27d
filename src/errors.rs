// Stable error taxonomy (spec.md §7).
//
// Every failure surfaced across a subsystem boundary carries one of these
// codes unchanged; only the message/context may be enriched as the error
// propagates. HTTP status mapping lives in `http_types.rs`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConduitError {
    #[error("container runtime not found")]
    RuntimeNotFound,
    #[error("container runtime unavailable: {0}")]
    RuntimeUnavailable(String),
    #[error("container failed: {0}")]
    ContainerFailed(String),
    #[error("container not found: {0}")]
    ContainerNotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("permission required: {0}")]
    PermissionRequired(String),

    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
    #[error("instance not found: {0}")]
    InstanceNotFound(String),
    #[error("instance already exists: {0}")]
    InstanceExists(String),

    #[error("audit failed: {0}")]
    AuditFailed(String),
    #[error("audit blocked: {0}")]
    AuditBlocked(String),

    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),
    #[error("configuration not found: {0}")]
    ConfigNotFound(String),
    #[error("failed to write configuration: {0}")]
    ConfigWriteFail(String),

    #[error("source not found: {0}")]
    SourceNotFound(String),
    #[error("source already exists: {0}")]
    SourceExists(String),
    #[error("path not found: {0}")]
    PathNotFound(String),
    #[error("path not readable: {0}")]
    PathNotReadable(String),
    #[error("indexing failed: {0}")]
    IndexFailed(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("vector backend unavailable: {0}")]
    VectorUnavailable(String),
    #[error("graph backend unavailable: {0}")]
    GraphUnavailable(String),
    #[error("embedding backend unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ConduitError {
    /// The stable machine code from spec.md §7's taxonomy.
    pub fn code(&self) -> &'static str {
        match self {
            ConduitError::RuntimeNotFound => "RuntimeNotFound",
            ConduitError::RuntimeUnavailable(_) => "RuntimeUnavailable",
            ConduitError::ContainerFailed(_) => "ContainerFailed",
            ConduitError::ContainerNotFound(_) => "ContainerNotFound",
            ConduitError::PermissionDenied(_) => "PermissionDenied",
            ConduitError::PermissionRequired(_) => "PermissionRequired",
            ConduitError::InvalidTransition { .. } => "InvalidTransition",
            ConduitError::InstanceNotFound(_) => "InstanceNotFound",
            ConduitError::InstanceExists(_) => "InstanceExists",
            ConduitError::AuditFailed(_) => "AuditFailed",
            ConduitError::AuditBlocked(_) => "AuditBlocked",
            ConduitError::ConfigInvalid(_) => "ConfigInvalid",
            ConduitError::ConfigNotFound(_) => "ConfigNotFound",
            ConduitError::ConfigWriteFail(_) => "ConfigWriteFail",
            ConduitError::SourceNotFound(_) => "SourceNotFound",
            ConduitError::SourceExists(_) => "SourceExists",
            ConduitError::PathNotFound(_) => "PathNotFound",
            ConduitError::PathNotReadable(_) => "PathNotReadable",
            ConduitError::IndexFailed(_) => "IndexFailed",
            ConduitError::StoreUnavailable(_) => "StoreUnavailable",
            ConduitError::VectorUnavailable(_) => "VectorUnavailable",
            ConduitError::GraphUnavailable(_) => "GraphUnavailable",
            ConduitError::EmbeddingUnavailable(_) => "EmbeddingUnavailable",
            ConduitError::ValidationError(_) => "ValidationError",
            ConduitError::Other(_) => "Internal",
        }
    }

    /// Never locally recovered per spec.md §7: policy blocks, invalid
    /// transitions, and validation errors propagate as-is.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ConduitError::AuditBlocked(_)
                | ConduitError::PermissionDenied(_)
                | ConduitError::InvalidTransition { .. }
                | ConduitError::ValidationError(_)
        )
    }

    /// Transient backend errors eligible for bounded retry (spec.md §7).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ConduitError::VectorUnavailable(_)
                | ConduitError::GraphUnavailable(_)
                | ConduitError::EmbeddingUnavailable(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ConduitError>;
