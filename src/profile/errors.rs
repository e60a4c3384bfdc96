//! Profile-store error types

use super::ProfileId;
use std::{error::Error, fmt, io};

#[derive(Debug)]
pub enum StoreError {
    /// No profile with the given identifier
    NotFound(ProfileId),
    /// Backing file could not be parsed; the store fell back to empty
    Corrupt(String),
    /// Port outside 1-65535
    InvalidPort(u16),
    IoError(io::Error),
    SerializeError(serde_json::Error),
    /// Home directory could not be resolved for the default store path
    NoStorePath,
}

impl StoreError {
    /// Recoverable errors leave the store usable (possibly empty) and must
    /// never abort the process.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, StoreError::Corrupt(_))
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotFound(id) => write!(f, "Profile not found: {}", id),
            StoreError::Corrupt(msg) => write!(f, "Profile store corrupt: {}", msg),
            StoreError::InvalidPort(port) => write!(f, "Invalid port: {}", port),
            StoreError::IoError(err) => write!(f, "I/O error: {}", err),
            StoreError::SerializeError(err) => write!(f, "Serialization error: {}", err),
            StoreError::NoStorePath => write!(f, "Could not determine profile store path"),
        }
    }
}

impl Error for StoreError {}

impl From<io::Error> for StoreError {
    fn from(err: io::Error) -> Self {
        StoreError::IoError(err)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::SerializeError(err)
    }
}
