use thiserror::Error;

use crate::scan::PatternError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Access denied opening process {pid}")]
    AccessDenied { pid: u32 },

    #[error("No such process: {pid}")]
    NoSuchProcess { pid: u32 },

    #[error("Failed to open process {pid}: {message}")]
    ProcessOpenFailed { pid: u32, message: String },

    #[error("Failed to close process handle for {pid}")]
    HandleCloseFailed { pid: u32 },

    #[error("Failed to query process: {0}")]
    QueryFailed(String),

    #[error("Cannot allocate a {size}-byte buffer")]
    Allocation { size: usize },

    #[error("Invalid hex value '{0}'")]
    InvalidHex(String),

    #[error("Invalid pattern: {0}")]
    InvalidPattern(#[from] PatternError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if this error is a "file not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Io(e) if e.kind() == std::io::ErrorKind::NotFound)
    }

    /// Check if the target process could not be opened because it is gone
    /// or never existed
    pub fn is_process_gone(&self) -> bool {
        matches!(self, Error::NoSuchProcess { .. })
    }
}
