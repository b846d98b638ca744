use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Payloads are plain strings so a single build result can be handed to
/// every caller waiting on it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("No reference embeddings for category: {0}")]
    EmptyCategory(String),

    #[error("Invalid category label: {0}")]
    InvalidCategory(String),

    #[error("Invalid vector dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error("Invalid vector: {0}")]
    InvalidVector(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Path escapes the reference root: {0}")]
    PathEscape(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Image error: {0}")]
    Image(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Stable machine-readable code, used in soft-failure records and
    /// HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Error::EmptyCategory(_) => "empty_category",
            Error::InvalidCategory(_) => "invalid_category",
            Error::InvalidDimension { .. } => "invalid_dimension",
            Error::InvalidVector(_) => "invalid_vector",
            Error::NotFound(_) => "not_found",
            Error::Validation(_) => "validation",
            Error::PathEscape(_) => "path_escape",
            Error::Model(_) => "model",
            Error::Timeout(_) => "timeout",
            Error::Storage(_) => "storage",
            Error::Persistence(_) => "persistence",
            Error::Io(_) => "io",
            Error::Serialization(_) => "serialization",
            Error::Image(_) => "image",
            Error::InvalidConfig(_) => "invalid_config",
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<image::ImageError> for Error {
    fn from(e: image::ImageError) -> Self {
        Error::Image(e.to_string())
    }
}
