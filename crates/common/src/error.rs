use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid startup parameter. The only fatal kind.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Incoming bar or update with a missing, non-numeric or inconsistent field.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The venue reported an error for an outstanding request.
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
