use thiserror::Error;

#[derive(Error, Debug)]
pub enum RaftError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("out-of-order append: expected index {expected}, got {got}")]
    OutOfOrderAppend { expected: u64, got: u64 },

    #[error("cannot remove from index {index}: log is anchored at snapshot index {snapshot_index}")]
    RemoveBeforeSnapshot { index: u64, snapshot_index: u64 },

    #[error("recovery error: {0}")]
    Recovery(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("snapshot error: {0}")]
    Snapshot(String),

    #[error("cohort error: {0}")]
    Cohort(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid state: {0}")]
    InvalidState(String),
}

pub type Result<T> = std::result::Result<T, RaftError>;

// Error conversions for common error types

impl From<bincode::error::EncodeError> for RaftError {
    fn from(e: bincode::error::EncodeError) -> Self {
        RaftError::Serialization(e.to_string())
    }
}

impl From<bincode::error::DecodeError> for RaftError {
    fn from(e: bincode::error::DecodeError) -> Self {
        RaftError::Serialization(e.to_string())
    }
}
