//! Durable storage for connection profiles.
//!
//! Profiles live in a single JSON document with a schema version field.
//! Mutations happen under a write lock and persist with a temp-file +
//! rename, so concurrent readers never observe a partially written store
//! and external watchers see exactly one change per mutation. A corrupt
//! backing file downgrades to an empty store instead of failing startup.

use super::{ConnectionProfile, ProfileDraft, ProfileId, StoreError};
use crate::events::{Event, EventBus, ProfileChangeKind};
use crate::{log_debug, log_info, log_warn};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

pub const STORE_SCHEMA_VERSION: u32 = 1;
#[cfg(unix)]
const PRIVATE_STORE_FILE_MODE: u32 = 0o600;

#[derive(Serialize, Deserialize)]
struct StoreFile {
    schema_version: u32,
    profiles: Vec<ConnectionProfile>,
}

pub struct ProfileStore {
    path: PathBuf,
    profiles: RwLock<HashMap<ProfileId, ConnectionProfile>>,
    events: Arc<EventBus>,
}

impl ProfileStore {
    /// Open the store at `path`, loading any existing profiles. A corrupt
    /// file is reported as the second tuple element (recoverable, already
    /// logged) and the store starts empty rather than failing.
    pub fn open(path: PathBuf, events: Arc<EventBus>) -> (Self, Option<StoreError>) {
        let (profiles, load_error) = match read_store_file(&path) {
            Ok(profiles) => (profiles, None),
            Err(err) if err.is_recoverable() => {
                log_warn!("Profile store at {:?} unreadable, starting empty: {}", path, err);
                (HashMap::new(), Some(err))
            }
            Err(err) => {
                // Missing file is a normal first run; anything else I/O-ish
                // also degrades to empty so the UI stays usable.
                if !path.exists() {
                    log_debug!("No profile store at {:?}, starting empty", path);
                    (HashMap::new(), None)
                } else {
                    log_warn!("Failed to read profile store at {:?}: {}", path, err);
                    (HashMap::new(), Some(StoreError::Corrupt(err.to_string())))
                }
            }
        };

        log_info!("Opened profile store at {:?} with {} profile(s)", path, profiles.len());

        (
            Self {
                path,
                profiles: RwLock::new(profiles),
                events,
            },
            load_error,
        )
    }

    /// Default backing file: `~/.shellmux/profiles.json`
    pub fn default_path() -> Result<PathBuf, StoreError> {
        let home_dir = dirs::home_dir().ok_or(StoreError::NoStorePath)?;
        let app_dir = home_dir.join(".shellmux");
        if !app_dir.exists() {
            fs::create_dir_all(&app_dir)?;
        }
        Ok(app_dir.join("profiles.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn create(&self, draft: ProfileDraft) -> Result<ProfileId, StoreError> {
        draft.validate()?;
        let id = ProfileId::generate();
        {
            // Stage on a copy and commit only after the file write lands,
            // so a failed persist leaves memory and disk agreeing.
            let mut profiles = self.write_guard();
            let mut staged = profiles.clone();
            staged.insert(id.clone(), draft.into_profile(id.clone()));
            self.persist(&staged)?;
            *profiles = staged;
        }
        log_debug!("Created profile {}", id);
        self.events.publish(Event::ProfileChanged {
            profile: id.clone(),
            kind: ProfileChangeKind::Added,
        });
        Ok(id)
    }

    pub fn update(&self, id: &ProfileId, draft: ProfileDraft) -> Result<(), StoreError> {
        draft.validate()?;
        {
            let mut profiles = self.write_guard();
            if !profiles.contains_key(id) {
                return Err(StoreError::NotFound(id.clone()));
            }
            let mut staged = profiles.clone();
            staged.insert(id.clone(), draft.into_profile(id.clone()));
            self.persist(&staged)?;
            *profiles = staged;
        }
        log_debug!("Updated profile {}", id);
        self.events.publish(Event::ProfileChanged {
            profile: id.clone(),
            kind: ProfileChangeKind::Updated,
        });
        Ok(())
    }

    pub fn delete(&self, id: &ProfileId) -> Result<ConnectionProfile, StoreError> {
        let removed = {
            let mut profiles = self.write_guard();
            let mut staged = profiles.clone();
            let removed = staged.remove(id).ok_or_else(|| StoreError::NotFound(id.clone()))?;
            self.persist(&staged)?;
            *profiles = staged;
            removed
        };
        log_debug!("Deleted profile {}", id);
        self.events.publish(Event::ProfileChanged {
            profile: id.clone(),
            kind: ProfileChangeKind::Removed,
        });
        Ok(removed)
    }

    pub fn get(&self, id: &ProfileId) -> Result<ConnectionProfile, StoreError> {
        self.read_guard().get(id).cloned().ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    /// All profiles ordered by (group, label, id) for tree-style display
    pub fn list(&self) -> Vec<ConnectionProfile> {
        let mut profiles: Vec<ConnectionProfile> = self.read_guard().values().cloned().collect();
        profiles.sort_by(|a, b| {
            a.group
                .cmp(&b.group)
                .then_with(|| a.label.cmp(&b.label))
                .then_with(|| a.id.cmp(&b.id))
        });
        profiles
    }

    pub fn len(&self) -> usize {
        self.read_guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_guard().is_empty()
    }

    /// Re-read the backing file (after an external edit) and publish a
    /// per-profile diff. A corrupt file leaves the in-memory state intact.
    pub fn reload(&self) -> Result<(), StoreError> {
        let fresh = read_store_file(&self.path)?;

        let mut changes: Vec<(ProfileId, ProfileChangeKind)> = Vec::new();
        {
            let mut profiles = self.write_guard();
            for (id, profile) in &fresh {
                match profiles.get(id) {
                    None => changes.push((id.clone(), ProfileChangeKind::Added)),
                    Some(existing) if existing != profile => changes.push((id.clone(), ProfileChangeKind::Updated)),
                    Some(_) => {}
                }
            }
            for id in profiles.keys() {
                if !fresh.contains_key(id) {
                    changes.push((id.clone(), ProfileChangeKind::Removed));
                }
            }
            *profiles = fresh;
        }

        if !changes.is_empty() {
            log_info!("Profile store reloaded with {} change(s)", changes.len());
        }
        for (profile, kind) in changes {
            self.events.publish(Event::ProfileChanged { profile, kind });
        }
        Ok(())
    }

    // Atomic persistence: write a temp file next to the store, then rename
    // over it. Called with the write lock held, so writers are serialized.
    fn persist(&self, profiles: &HashMap<ProfileId, ConnectionProfile>) -> Result<(), StoreError> {
        let mut records: Vec<&ConnectionProfile> = profiles.values().collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));

        let file = StoreFile {
            schema_version: STORE_SCHEMA_VERSION,
            profiles: records.into_iter().cloned().collect(),
        };
        let serialized = serde_json::to_string_pretty(&file)?;

        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, serialized)?;
        set_private_file_permissions(&tmp_path)?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    fn read_guard(&self) -> RwLockReadGuard<'_, HashMap<ProfileId, ConnectionProfile>> {
        match self.profiles.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, HashMap<ProfileId, ConnectionProfile>> {
        match self.profiles.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn read_store_file(path: &Path) -> Result<HashMap<ProfileId, ConnectionProfile>, StoreError> {
    let content = fs::read_to_string(path)?;
    let file: StoreFile = serde_json::from_str(&content).map_err(|err| StoreError::Corrupt(err.to_string()))?;
    if file.schema_version > STORE_SCHEMA_VERSION {
        return Err(StoreError::Corrupt(format!(
            "schema version {} is newer than supported version {}",
            file.schema_version, STORE_SCHEMA_VERSION
        )));
    }
    Ok(file.profiles.into_iter().map(|profile| (profile.id.clone(), profile)).collect())
}

#[cfg(unix)]
fn set_private_file_permissions(path: &Path) -> Result<(), StoreError> {
    fs::set_permissions(path, fs::Permissions::from_mode(PRIVATE_STORE_FILE_MODE))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_private_file_permissions(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}

#[cfg(test)]
#[path = "../test/profile/store.rs"]
mod tests;
