//! Manager-level error types

use super::TabId;
use crate::profile::StoreError;
use crate::session::{SessionError, SessionId};
use crate::vault::VaultError;
use std::{error::Error, fmt};

#[derive(Debug)]
pub enum ManagerError {
    SessionNotFound(SessionId),
    TabNotFound(TabId),
    /// Tab already has a live session; the existing one is untouched
    AlreadyBound(TabId),
    /// Session has not terminated yet, so its entry cannot be removed
    SessionStillLive(SessionId),
    Profile(StoreError),
    Vault(VaultError),
    Session(SessionError),
}

impl fmt::Display for ManagerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManagerError::SessionNotFound(id) => write!(f, "Session not found: {}", id),
            ManagerError::TabNotFound(id) => write!(f, "Tab not found: {}", id),
            ManagerError::AlreadyBound(id) => write!(f, "Tab {} already has an active session", id),
            ManagerError::SessionStillLive(id) => write!(f, "Session {} is still live", id),
            ManagerError::Profile(err) => write!(f, "Profile error: {}", err),
            ManagerError::Vault(err) => write!(f, "Vault error: {}", err),
            ManagerError::Session(err) => write!(f, "Session error: {}", err),
        }
    }
}

impl Error for ManagerError {}

impl From<StoreError> for ManagerError {
    fn from(err: StoreError) -> Self {
        ManagerError::Profile(err)
    }
}

impl From<VaultError> for ManagerError {
    fn from(err: VaultError) -> Self {
        ManagerError::Vault(err)
    }
}

impl From<SessionError> for ManagerError {
    fn from(err: SessionError) -> Self {
        ManagerError::Session(err)
    }
}
