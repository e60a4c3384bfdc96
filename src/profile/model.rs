//! Connection profile records as they live in the store and on disk.

use super::StoreError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque, immutable profile identifier. Independent of any UI or tab
/// identity; generated once at create time and never reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileId(String);

impl ProfileId {
    pub(crate) fn generate() -> Self {
        let mut raw = [0u8; 8];
        // getrandom only fails on broken platforms; fall back to a clock-
        // derived id rather than refusing to create the profile.
        if getrandom::fill(&mut raw).is_err() {
            let nanos = std::time::UNIX_EPOCH.elapsed().map(|d| d.as_nanos()).unwrap_or(0);
            raw.copy_from_slice(&(nanos as u64).to_be_bytes());
        }
        let mut id = String::with_capacity(raw.len() * 2);
        for byte in raw {
            id.push_str(&format!("{:02x}", byte));
        }
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ProfileId {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

/// An encrypted secret as stored at rest: opaque blob plus the algorithm
/// tag it was sealed with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedCredential {
    pub cipher: String,
    pub blob: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionProfile {
    pub id: ProfileId,
    pub host: String,
    pub port: u16,
    pub label: String,
    pub group: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<SealedCredential>,
}

/// Editable profile fields, used for both create and update. The id is
/// assigned by the store and never part of a draft.
#[derive(Debug, Clone)]
pub struct ProfileDraft {
    pub host: String,
    pub port: u16,
    pub label: String,
    pub group: String,
    pub credential: Option<SealedCredential>,
}

impl ProfileDraft {
    pub(crate) fn validate(&self) -> Result<(), StoreError> {
        if self.port == 0 {
            return Err(StoreError::InvalidPort(self.port));
        }
        Ok(())
    }

    pub(crate) fn into_profile(self, id: ProfileId) -> ConnectionProfile {
        ConnectionProfile {
            id,
            host: self.host,
            port: self.port,
            label: self.label,
            group: self.group,
            credential: self.credential,
        }
    }
}
