//! Session table, tab registry, and lifecycle enforcement.
//!
//! The manager owns every live session exclusively. UI layers refer to
//! sessions and tabs by id only and learn about changes through the
//! EventBus; transport failures never cross the UI boundary as errors,
//! they surface as a `Failed` state change.

mod errors;
mod state;

pub use errors::ManagerError;
pub use state::SessionState;
pub(crate) use state::transition_allowed;

use crate::config;
use crate::events::{Event, EventBus};
use crate::profile::{ProfileId, ProfileStore};
use crate::session::{OutputChunk, SessionError, SessionHandle, SessionId, TransportFactory};
use crate::vault::CredentialVault;
use crate::{log_debug, log_error, log_info, log_warn};
use std::{
    collections::HashMap,
    fmt,
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicU64, Ordering},
        mpsc::Receiver,
    },
    thread,
    time::Duration,
};

/// Opaque tab identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TabId(u64);

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// A tab references a session but never owns one
#[derive(Debug, Clone)]
pub struct Tab {
    pub id: TabId,
    pub title: String,
    pub session: Option<SessionId>,
}

/// How a terminated session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionExit {
    Clean,
    Error(String),
}

/// Snapshot of one session for UI queries
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub id: SessionId,
    pub state: SessionState,
    pub profile: Option<ProfileId>,
    pub tab: TabId,
    pub exit: Option<SessionExit>,
}

struct SessionEntry {
    state: SessionState,
    profile: Option<ProfileId>,
    tab: TabId,
    handle: Option<Arc<SessionHandle>>,
    output: Vec<u8>,
    exit: Option<SessionExit>,
    last_error: Option<String>,
}

type SessionTable = Arc<Mutex<HashMap<SessionId, SessionEntry>>>;
type TabTable = Arc<Mutex<HashMap<TabId, Tab>>>;

pub struct SessionManager {
    profiles: Arc<ProfileStore>,
    events: Arc<EventBus>,
    factory: Arc<dyn TransportFactory>,
    sessions: SessionTable,
    tabs: TabTable,
    next_session_id: AtomicU64,
    next_tab_id: AtomicU64,
}

impl SessionManager {
    pub fn new(profiles: Arc<ProfileStore>, events: Arc<EventBus>, factory: Arc<dyn TransportFactory>) -> Self {
        Self {
            profiles,
            events,
            factory,
            sessions: Arc::new(Mutex::new(HashMap::new())),
            tabs: Arc::new(Mutex::new(HashMap::new())),
            next_session_id: AtomicU64::new(1),
            next_tab_id: AtomicU64::new(1),
        }
    }

    // Tab registry.
    pub fn create_tab(&self, title: impl Into<String>) -> TabId {
        let id = TabId(self.next_tab_id.fetch_add(1, Ordering::SeqCst));
        let tab = Tab {
            id,
            title: title.into(),
            session: None,
        };
        lock_table(&self.tabs).insert(id, tab);
        log_debug!("Created tab {}", id);
        id
    }

    /// Closing a tab closes its bound session first.
    pub fn close_tab(&self, tab_id: TabId) -> Result<(), ManagerError> {
        let bound = {
            let tabs = lock_table(&self.tabs);
            let tab = tabs.get(&tab_id).ok_or(ManagerError::TabNotFound(tab_id))?;
            tab.session
        };
        if let Some(session_id) = bound {
            self.close(session_id)?;
        }
        lock_table(&self.tabs).remove(&tab_id);
        log_debug!("Closed tab {}", tab_id);
        Ok(())
    }

    pub fn list_tabs(&self) -> Vec<Tab> {
        let mut tabs: Vec<Tab> = lock_table(&self.tabs).values().cloned().collect();
        tabs.sort_by_key(|tab| tab.id.0);
        tabs
    }

    // Session lifecycle.
    /// Open a session on a tab. `profile` absent means a local shell. The
    /// vault is only needed when the profile carries a credential; an
    /// unseal failure propagates without creating any session state.
    pub fn open(
        &self,
        profile_id: Option<&ProfileId>,
        tab_id: TabId,
        vault: Option<&CredentialVault>,
        rows: u16,
        cols: u16,
    ) -> Result<SessionId, ManagerError> {
        let profile = match profile_id {
            Some(id) => Some(self.profiles.get(id)?),
            None => None,
        };

        let secret = match profile.as_ref().and_then(|profile| profile.credential.as_ref()) {
            Some(sealed) => match vault {
                Some(vault) => Some(vault.unseal(sealed)?),
                None => {
                    log_warn!("Profile {} has a credential but no vault is unlocked", profile.as_ref().map(|p| p.label.as_str()).unwrap_or("?"));
                    None
                }
            },
            None => None,
        };

        // Reserve the session and bind the tab before the (slow) connect so
        // a second open against the same tab sees AlreadyBound immediately.
        let session_id = {
            let mut sessions = lock_table(&self.sessions);
            let mut tabs = lock_table(&self.tabs);
            let tab = tabs.get_mut(&tab_id).ok_or(ManagerError::TabNotFound(tab_id))?;

            if let Some(bound) = tab.session {
                let live = sessions.get(&bound).map(|entry| entry.state.is_live()).unwrap_or(false);
                if live {
                    return Err(ManagerError::AlreadyBound(tab_id));
                }
                tab.session = None;
            }

            let session_id = SessionId(self.next_session_id.fetch_add(1, Ordering::SeqCst));
            sessions.insert(
                session_id,
                SessionEntry {
                    state: SessionState::Pending,
                    profile: profile_id.cloned(),
                    tab: tab_id,
                    handle: None,
                    output: Vec::new(),
                    exit: None,
                    last_error: None,
                },
            );
            tab.session = Some(session_id);

            self.publish_state(session_id, SessionState::Pending);
            self.transition(&mut sessions, session_id, SessionState::Connecting);
            session_id
        };

        log_info!("Opening session {} on tab {} (profile: {:?})", session_id, tab_id, profile_id);

        let (queue_capacity, write_timeout) = write_settings();
        let opened = SessionHandle::open(
            session_id,
            self.factory.as_ref(),
            profile.as_ref(),
            secret.as_ref().map(|bytes| bytes.as_slice()),
            rows,
            cols,
            queue_capacity,
            write_timeout,
        );

        let handle = match opened {
            Ok(handle) => handle,
            Err(err) => {
                let mut sessions = lock_table(&self.sessions);
                if let Some(entry) = sessions.get_mut(&session_id) {
                    if entry.state == SessionState::Closing {
                        // Close raced the connect and wins.
                        entry.exit = Some(SessionExit::Clean);
                        self.transition(&mut sessions, session_id, SessionState::Closed);
                    } else {
                        entry.last_error = Some(err.to_string());
                        entry.exit = Some(SessionExit::Error(err.to_string()));
                        self.transition(&mut sessions, session_id, SessionState::Failed);
                    }
                }
                self.unbind_tab(tab_id, session_id);
                log_error!("Session {} failed to connect: {}", session_id, err);
                return Err(ManagerError::Session(err));
            }
        };

        let output_rx = handle.take_output();
        let handle = Arc::new(handle);

        {
            let mut sessions = lock_table(&self.sessions);
            let Some(entry) = sessions.get_mut(&session_id) else {
                handle.close();
                return Err(ManagerError::SessionNotFound(session_id));
            };

            if entry.state == SessionState::Closing {
                // Close raced the connect and wins: tear the fresh transport
                // down and finish in Closed.
                handle.close();
                entry.exit = Some(SessionExit::Clean);
                self.transition(&mut sessions, session_id, SessionState::Closed);
                drop(sessions);
                self.unbind_tab(tab_id, session_id);
                return Ok(session_id);
            }

            entry.handle = Some(handle.clone());
            self.transition(&mut sessions, session_id, SessionState::Active);
        }

        if let Some(output_rx) = output_rx {
            self.spawn_output_pump(session_id, output_rx);
        }

        log_info!("Session {} active", session_id);
        Ok(session_id)
    }

    /// Close a session. Safe to call concurrently: only the first caller
    /// tears the transport down, later ones observe Closing/Closed and
    /// return immediately.
    pub fn close(&self, session_id: SessionId) -> Result<(), ManagerError> {
        let handle = {
            let mut sessions = lock_table(&self.sessions);
            let entry = sessions.get_mut(&session_id).ok_or(ManagerError::SessionNotFound(session_id))?;

            match entry.state {
                SessionState::Closing | SessionState::Closed | SessionState::Failed => return Ok(()),
                SessionState::Pending | SessionState::Connecting => {
                    // No handle yet; mark Closing and let the open path
                    // finish the teardown when the connect returns.
                    self.transition(&mut sessions, session_id, SessionState::Closing);
                    return Ok(());
                }
                SessionState::Active => {
                    let handle = sessions
                        .get_mut(&session_id)
                        .and_then(|entry| entry.handle.take());
                    self.transition(&mut sessions, session_id, SessionState::Closing);
                    handle
                }
            }
        };

        if let Some(handle) = handle {
            handle.close();
        }

        let tab_id = {
            let mut sessions = lock_table(&self.sessions);
            let Some(entry) = sessions.get_mut(&session_id) else {
                return Ok(());
            };
            if entry.state == SessionState::Closing {
                if entry.exit.is_none() {
                    entry.exit = Some(SessionExit::Clean);
                }
                self.transition(&mut sessions, session_id, SessionState::Closed);
            }
            sessions.get(&session_id).map(|entry| entry.tab)
        };

        if let Some(tab_id) = tab_id {
            self.unbind_tab(tab_id, session_id);
        }
        log_info!("Session {} closed", session_id);
        Ok(())
    }

    /// Queue input bytes for an active session.
    pub fn write(&self, session_id: SessionId, bytes: &[u8]) -> Result<(), ManagerError> {
        let handle = {
            let sessions = lock_table(&self.sessions);
            let entry = sessions.get(&session_id).ok_or(ManagerError::SessionNotFound(session_id))?;
            if entry.state != SessionState::Active {
                return Err(ManagerError::Session(SessionError::Closed));
            }
            entry.handle.clone()
        };

        match handle {
            Some(handle) => handle.write(bytes).map_err(ManagerError::Session),
            None => Err(ManagerError::Session(SessionError::Closed)),
        }
    }

    pub fn resize(&self, session_id: SessionId, rows: u16, cols: u16) -> Result<(), ManagerError> {
        let handle = {
            let sessions = lock_table(&self.sessions);
            let entry = sessions.get(&session_id).ok_or(ManagerError::SessionNotFound(session_id))?;
            entry.handle.clone()
        };

        match handle {
            Some(handle) => handle.resize(rows, cols).map_err(ManagerError::Session),
            None => Ok(()),
        }
    }

    /// Drain the buffered, unconsumed output for a session.
    pub fn take_output(&self, session_id: SessionId) -> Result<Vec<u8>, ManagerError> {
        let mut sessions = lock_table(&self.sessions);
        let entry = sessions.get_mut(&session_id).ok_or(ManagerError::SessionNotFound(session_id))?;
        Ok(std::mem::take(&mut entry.output))
    }

    pub fn session_state(&self, session_id: SessionId) -> Result<SessionState, ManagerError> {
        let sessions = lock_table(&self.sessions);
        sessions
            .get(&session_id)
            .map(|entry| entry.state)
            .ok_or(ManagerError::SessionNotFound(session_id))
    }

    pub fn session_exit(&self, session_id: SessionId) -> Result<Option<SessionExit>, ManagerError> {
        let sessions = lock_table(&self.sessions);
        sessions
            .get(&session_id)
            .map(|entry| entry.exit.clone())
            .ok_or(ManagerError::SessionNotFound(session_id))
    }

    /// Drop a terminated session's bookkeeping, including any undrained
    /// output. Live sessions must be closed first; entries are kept after
    /// termination only so the caller can read the exit record.
    pub fn remove_session(&self, session_id: SessionId) -> Result<(), ManagerError> {
        let tab_id = {
            let mut sessions = lock_table(&self.sessions);
            let entry = sessions.get(&session_id).ok_or(ManagerError::SessionNotFound(session_id))?;
            if !entry.state.is_terminal() {
                return Err(ManagerError::SessionStillLive(session_id));
            }
            sessions.remove(&session_id).map(|entry| entry.tab)
        };

        if let Some(tab_id) = tab_id {
            self.unbind_tab(tab_id, session_id);
        }
        log_debug!("Removed session {} from the table", session_id);
        Ok(())
    }

    pub fn list_sessions(&self) -> Vec<SessionInfo> {
        let sessions = lock_table(&self.sessions);
        let mut infos: Vec<SessionInfo> = sessions
            .iter()
            .map(|(id, entry)| SessionInfo {
                id: *id,
                state: entry.state,
                profile: entry.profile.clone(),
                tab: entry.tab,
                exit: entry.exit.clone(),
            })
            .collect();
        infos.sort_by_key(|info| info.id);
        infos
    }

    /// Delete a profile, closing every session opened from it first.
    pub fn remove_profile(&self, profile_id: &ProfileId) -> Result<(), ManagerError> {
        let bound: Vec<SessionId> = {
            let sessions = lock_table(&self.sessions);
            sessions
                .iter()
                .filter(|(_, entry)| entry.state.is_live() && entry.profile.as_ref() == Some(profile_id))
                .map(|(id, _)| *id)
                .collect()
        };

        for session_id in bound {
            log_info!("Closing session {} bound to removed profile {}", session_id, profile_id);
            self.close(session_id)?;
        }

        self.profiles.delete(profile_id)?;
        Ok(())
    }

    /// Process-exit teardown: close everything still live.
    pub fn shutdown(&self) {
        let live: Vec<SessionId> = {
            let sessions = lock_table(&self.sessions);
            sessions
                .iter()
                .filter(|(_, entry)| entry.state.is_live())
                .map(|(id, _)| *id)
                .collect()
        };

        for session_id in live {
            if let Err(err) = self.close(session_id) {
                log_error!("Failed to close session {} during shutdown: {}", session_id, err);
            }
        }
        log_info!("Session manager shut down");
    }

    // Internals.
    fn spawn_output_pump(&self, session_id: SessionId, output_rx: Receiver<OutputChunk>) {
        let sessions = self.sessions.clone();
        let tabs = self.tabs.clone();
        let events = self.events.clone();
        let output_limit = output_buffer_limit();

        if let Err(err) = thread::Builder::new()
            .name(format!("session-pump-{}", session_id))
            .spawn(move || run_output_pump(session_id, output_rx, sessions, tabs, events, output_limit))
        {
            log_error!("Failed to spawn output pump for session {}: {}", session_id, err);
        }
    }

    /// State updates go through here so the transition table stays the
    /// single source of truth. Called with the sessions lock held; the
    /// event is published under the lock to keep per-session ordering.
    fn transition(&self, sessions: &mut HashMap<SessionId, SessionEntry>, session_id: SessionId, to: SessionState) {
        transition_entry(sessions, &self.events, session_id, to);
    }

    fn publish_state(&self, session_id: SessionId, state: SessionState) {
        self.events.publish(Event::SessionStateChanged {
            session: session_id,
            state,
        });
    }

    fn unbind_tab(&self, tab_id: TabId, session_id: SessionId) {
        let mut tabs = lock_table(&self.tabs);
        if let Some(tab) = tabs.get_mut(&tab_id)
            && tab.session == Some(session_id)
        {
            tab.session = None;
        }
    }
}

fn lock_table<T>(table: &Arc<Mutex<T>>) -> MutexGuard<'_, T> {
    match table.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn write_settings() -> (usize, Duration) {
    let settings = match config::get_config().read() {
        Ok(config) => config.settings.clone(),
        Err(_) => Default::default(),
    };
    (settings.write_queue_capacity, Duration::from_millis(settings.write_timeout_ms))
}

fn output_buffer_limit() -> usize {
    match config::get_config().read() {
        Ok(config) => config.settings.output_buffer_limit,
        Err(_) => 1024 * 1024,
    }
}

fn transition_entry(sessions: &mut HashMap<SessionId, SessionEntry>, events: &EventBus, session_id: SessionId, to: SessionState) {
    let Some(entry) = sessions.get_mut(&session_id) else {
        return;
    };
    if !transition_allowed(entry.state, to) {
        log_warn!("Illegal session transition {} -> {} for {}", entry.state, to, session_id);
        return;
    }
    entry.state = to;
    events.publish(Event::SessionStateChanged {
        session: session_id,
        state: to,
    });
}

/// Consumes a session's chunk stream: buffers data, publishes
/// DataAvailable, and finalizes the session when the stream ends.
fn run_output_pump(
    session_id: SessionId,
    output_rx: Receiver<OutputChunk>,
    sessions: SessionTable,
    tabs: TabTable,
    events: Arc<EventBus>,
    output_limit: usize,
) {
    for chunk in output_rx {
        match chunk {
            OutputChunk::Data(bytes) => {
                let mut table = lock_table(&sessions);
                let Some(entry) = table.get_mut(&session_id) else {
                    break;
                };
                entry.output.extend_from_slice(&bytes);
                if entry.output.len() > output_limit {
                    let excess = entry.output.len() - output_limit;
                    entry.output.drain(..excess);
                }
                events.publish(Event::DataAvailable { session: session_id });
            }
            OutputChunk::Eof => {
                finalize_session(&sessions, &tabs, &events, session_id, SessionExit::Clean);
                break;
            }
            OutputChunk::Error(message) => {
                finalize_session(&sessions, &tabs, &events, session_id, SessionExit::Error(message));
                break;
            }
        }
    }
    log_debug!("Output pump for session {} exiting", session_id);
}

/// Terminal bookkeeping for a session whose stream ended. Clean EOF walks
/// Closing -> Closed; an unexpected transport drop goes to Failed. A kill
/// that arrives while we are already Closing is not a failure.
fn finalize_session(sessions: &SessionTable, tabs: &TabTable, events: &Arc<EventBus>, session_id: SessionId, outcome: SessionExit) {
    let tab_id = {
        let mut table = lock_table(sessions);
        let Some(entry) = table.get_mut(&session_id) else {
            return;
        };
        if entry.state.is_terminal() {
            return;
        }

        let entry_state = entry.state;
        if let Some(handle) = entry.handle.take() {
            handle.close();
        }

        match (entry_state, &outcome) {
            (SessionState::Closing, _) => {
                if entry.exit.is_none() {
                    entry.exit = Some(SessionExit::Clean);
                }
                transition_entry(&mut table, events, session_id, SessionState::Closed);
            }
            (_, SessionExit::Clean) => {
                entry.exit = Some(SessionExit::Clean);
                transition_entry(&mut table, events, session_id, SessionState::Closing);
                transition_entry(&mut table, events, session_id, SessionState::Closed);
            }
            (_, SessionExit::Error(message)) => {
                entry.last_error = Some(message.clone());
                entry.exit = Some(outcome.clone());
                transition_entry(&mut table, events, session_id, SessionState::Failed);
            }
        }

        table.get(&session_id).map(|entry| entry.tab)
    };

    if let Some(tab_id) = tab_id {
        let mut tab_table = lock_table(tabs);
        if let Some(tab) = tab_table.get_mut(&tab_id)
            && tab.session == Some(session_id)
        {
            tab.session = None;
        }
    }
}

#[cfg(test)]
#[path = "../test/manager/sessions.rs"]
mod tests;
