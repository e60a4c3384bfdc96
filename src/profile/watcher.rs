//! Profiles file watching and hot-reloading
//!
//! Monitors the profile store's backing file for external edits and reloads
//! the store when modifications are detected. Self-inflicted events from
//! our own atomic writes diff to nothing and publish no changes.

use super::ProfileStore;
use crate::{log_debug, log_error, log_info, log_warn};
use notify::{Error, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::{path::PathBuf, sync::Arc, sync::mpsc, thread, time::Duration};

fn event_targets_store_file(event: &Event, store_file_name: &str) -> bool {
    event.paths.iter().any(|path| {
        path.file_name()
            .and_then(|segment| segment.to_str())
            .map(|name| name == store_file_name)
            .unwrap_or(false)
    })
}

fn should_reload_for_event(event: &Event, store_file_name: &str) -> bool {
    (event.kind.is_modify() || event.kind.is_create()) && event_targets_store_file(event, store_file_name)
}

/// Start watching the profile store file for changes
pub fn store_watcher(store: Arc<ProfileStore>) -> Option<RecommendedWatcher> {
    let (tx, rx) = mpsc::channel();

    log_debug!("Initializing profile store watcher");

    let store_path = store.path().to_path_buf();
    let store_file_name = store_path.file_name().and_then(|segment| segment.to_str()).unwrap_or("").to_string();

    // Clone for use in the closure
    let store_file_name_clone = store_file_name.clone();

    let mut watcher = match RecommendedWatcher::new(
        move |res: Result<Event, Error>| {
            if let Ok(event) = res
                && should_reload_for_event(&event, &store_file_name_clone)
            {
                log_debug!("Profile store change detected: {:?}", event);
                let _ = tx.send(());
            }
        },
        notify::Config::default(),
    ) {
        Ok(watcher) => watcher,
        Err(err) => {
            log_error!("Failed to create file watcher: {}", err);
            log_warn!("Profile hot-reload disabled");
            return None;
        }
    };

    // Watch the parent directory to handle atomic writes (temp file + rename)
    let fallback = PathBuf::from(".");
    let watch_path = store_path.parent().unwrap_or(&fallback);
    log_info!("Starting profile watcher for: {:?} (watching directory: {:?})", store_path, watch_path);

    if let Err(err) = watcher.watch(watch_path, RecursiveMode::NonRecursive) {
        log_error!("Failed to watch profile store directory: {}", err);
        log_warn!("Profile hot-reload disabled");
        return None;
    }

    if let Err(err) = thread::Builder::new().name("profile-watcher".to_string()).spawn(move || {
        log_debug!("Profile watcher thread started");
        loop {
            match rx.recv() {
                Ok(()) => {
                    // Debounce: wait for additional events and discard them
                    while rx.recv_timeout(Duration::from_millis(500)).is_ok() {}

                    log_info!("Profile store change detected, reloading...");
                    if let Err(err) = store.reload() {
                        log_error!("Error reloading profile store: {}", err);
                    }
                }
                Err(err) => {
                    log_error!("Error receiving from channel: {}", err);
                    break;
                }
            }
        }
    }) {
        log_error!("Failed to spawn profile watcher thread: {}", err);
        log_warn!("Profile hot-reload disabled");
        return None;
    }

    Some(watcher)
}
