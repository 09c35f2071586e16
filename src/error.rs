use std::path::PathBuf;

/// Errors raised while loading a recorded dataset
#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("Dataset not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read dataset {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse dataset {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Dataset contains no samples: {0}")]
    Empty(PathBuf),
}

/// Errors raised by the replay scheduler
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("Cannot replay an empty sample sequence")]
    EmptySequence,
}

/// Errors raised by the live device feed
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Device connection error: {0}")]
    Connection(String),

    #[error("Device protocol error: {0}")]
    Protocol(String),
}

/// A write to a client session failed
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Session {0} is closed")]
    Closed(crate::types::SessionId),
}

/// Errors surfaced by source switch operations
#[derive(Debug, thiserror::Error)]
pub enum SwitchError {
    #[error("Dataset {0} not found in catalog")]
    UnknownDataset(i64),

    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    Device(#[from] DeviceError),
}

/// Result type for source switch operations
pub type SwitchResult<T> = Result<T, SwitchError>;
