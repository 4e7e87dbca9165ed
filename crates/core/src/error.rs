use thiserror::Error;

use crate::types::UserId;

pub type RecResult<T> = Result<T, RecError>;

#[derive(Error, Debug)]
pub enum RecError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// Empty catalog or interaction log at train time. Sub-engines stay
    /// untrained and queries degrade to fallbacks.
    #[error("Data unavailable: {0}")]
    DataUnavailable(String),

    #[error("Unknown user: {0}")]
    UnknownUser(UserId),

    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    #[error("Catalog source error: {0}")]
    Catalog(String),

    #[error("Interaction log error: {0}")]
    InteractionLog(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}
