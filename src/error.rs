use thiserror::Error;

/// Error taxonomy for the artifact grid. Every public operation returns
/// `Result<T, GridError>`; internal provider adapters use `anyhow::Result`
/// and are mapped to `GridError::ProviderError` at the coordinator boundary.
#[derive(Debug, Error)]
pub enum GridError {
    #[error("artifact not found: {0}")]
    ArtifactNotFound(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("session error: {0}")]
    SessionError(String),

    #[error("storage provider error: {0}")]
    ProviderError(String),

    #[error("configuration error: {0}")]
    ConfigurationError(String),

    #[error("malformed grid key: {0}")]
    MalformedKey(String),

    #[error("invalid part sequence: {0}")]
    InvalidPartSequence(String),

    #[error("part too small: {0}")]
    PartTooSmall(String),

    #[error("upload is not open: {0}")]
    UploadNotOpen(String),

    #[error("federation error: {0}")]
    FederationError(String),

    #[error("integrity check failed: {0}")]
    IntegrityError(String),

    #[error("user_id is required for scope=user")]
    MissingUserIdForUserScope,

    #[error("metadata write failed after object was stored: {0}")]
    MetadataWriteFailed(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type GridResult<T> = Result<T, GridError>;

impl From<object_store::Error> for GridError {
    fn from(err: object_store::Error) -> Self {
        match err {
            object_store::Error::NotFound { path, .. } => {
                GridError::ArtifactNotFound(path)
            }
            other => GridError::ProviderError(other.to_string()),
        }
    }
}

impl From<anyhow::Error> for GridError {
    fn from(err: anyhow::Error) -> Self {
        GridError::ProviderError(err.to_string())
    }
}
