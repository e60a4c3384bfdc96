//! Session-level error types

use std::{error::Error, fmt, io};

#[derive(Debug)]
pub enum SessionError {
    /// Transport could not be established; recoverable, retry is sensible
    Connect(String),
    /// Mid-session read/write failure
    IoError(io::Error),
    /// Operation against a closed session
    Closed,
    /// Write queue stayed full past the configured deadline
    WriteTimeout,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Connect(msg) => write!(f, "Connect error: {}", msg),
            SessionError::IoError(err) => write!(f, "I/O error: {}", err),
            SessionError::Closed => write!(f, "Session is closed"),
            SessionError::WriteTimeout => write!(f, "Write timed out under backpressure"),
        }
    }
}

impl Error for SessionError {}

impl From<io::Error> for SessionError {
    fn from(err: io::Error) -> Self {
        SessionError::IoError(err)
    }
}
