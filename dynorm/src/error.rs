use crate::schema::ValidationError;
use crate::storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("bad argument: {0}")]
    BadArgument(String),

    #[error("malformed key: {0}")]
    BadKey(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Record not found")]
    NotFound,

    #[error("All pages were already scanned")]
    PagesExhausted,

    #[error("cannot save an instance with no attributes")]
    EmptyInstance,

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("settings error: {0}")]
    Settings(#[from] config::ConfigError),

    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl ModelError {
    pub fn config(message: impl Into<String>) -> Self {
        ModelError::Config(message.into())
    }

    pub fn bad_argument(message: impl Into<String>) -> Self {
        ModelError::BadArgument(message.into())
    }

    /// Configuration and shape errors are programming mistakes, everything else depends on data.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ModelError::Config(_) | ModelError::BadArgument(_) | ModelError::BadKey(_))
    }

    pub fn validation_error(&self) -> Option<&ValidationError> {
        match self {
            ModelError::Validation(err) => Some(err),
            _ => None,
        }
    }
}

pub type Result<T, E = ModelError> = std::result::Result<T, E>;
