mod errors;
mod handle;
mod transport;

pub use errors::SessionError;
pub use handle::SessionHandle;
pub use transport::{PtyTransport, PtyTransportFactory, Transport, TransportFactory};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque session identifier, allocated by the SessionManager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub(crate) u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// One element of a session's output stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputChunk {
    Data(Vec<u8>),
    /// Remote side closed cleanly (or the session was closed on purpose)
    Eof,
    /// Transport dropped unexpectedly
    Error(String),
}
