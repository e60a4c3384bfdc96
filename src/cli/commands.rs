//! Command handlers behind the argument parser.

use crate::cli::args::{AppCommand, CliArgs, ProfileCommand, VaultCommand};
use crate::config;
use crate::events::{Event, EventBus};
use crate::manager::{SessionManager, SessionExit};
use crate::profile::{ConnectionProfile, ProfileDraft, ProfileId, ProfileStore, SealedCredential, StoreError, store_watcher};
use crate::session::PtyTransportFactory;
use crate::vault::{self, CredentialVault, VaultError, load_or_create_salt, prompt_passphrase};
use crate::{Result, log_debug, log_error, log_info, log_warn};
use std::{
    io::{self, Read, Write},
    process::ExitCode,
    sync::Arc,
    thread,
};
use zeroize::Zeroizing;

const DEFAULT_ROWS: u16 = 24;
const DEFAULT_COLS: u16 = 80;

pub fn run(args: CliArgs) -> Result<ExitCode> {
    match args.command {
        AppCommand::Profile(command) => handle_profile(command),
        AppCommand::Vault(command) => handle_vault(command),
        AppCommand::Connect { profile } => handle_connect(&profile),
        AppCommand::Shell => handle_shell(),
    }
}

fn open_store(events: Arc<EventBus>) -> Result<Arc<ProfileStore>> {
    let path = ProfileStore::default_path()?;
    let (store, load_error) = ProfileStore::open(path, events);
    if let Some(err) = load_error {
        eprintln!("Warning: profile store could not be read ({}); starting with an empty list", err);
        log_warn!("Profile store load error: {}", err);
    }
    Ok(Arc::new(store))
}

/// Unlock the vault against its check file. Fails with NotInitialized
/// when `smux vault init` has never been run.
fn unlock_vault() -> std::result::Result<CredentialVault, VaultError> {
    let check_path = vault::default_check_path()?;
    if !check_path.exists() {
        return Err(VaultError::NotInitialized);
    }

    let salt = load_or_create_salt(&vault::default_salt_path()?)?;
    let passphrase = prompt_passphrase(false)?;
    let vault = CredentialVault::unlock(&passphrase, &salt)?;
    vault.verify_check_file(&check_path)?;
    Ok(vault)
}

/// Prompt for a secret and seal it for storage in a profile.
fn seal_password(label: &str) -> std::result::Result<SealedCredential, VaultError> {
    let vault = unlock_vault()?;
    let password = Zeroizing::new(rpassword::prompt_password(format!("Password for {}: ", label))?);
    if password.is_empty() {
        return Err(VaultError::EmptyPassphrase);
    }
    vault.seal(password.as_bytes())
}

/// Accept either a profile id or a unique label.
fn resolve_profile(store: &ProfileStore, needle: &str) -> std::result::Result<ConnectionProfile, StoreError> {
    let id = ProfileId::from(needle);
    match store.get(&id) {
        Ok(profile) => Ok(profile),
        Err(StoreError::NotFound(_)) => {
            let mut matches = store.list().into_iter().filter(|profile| profile.label == needle);
            match (matches.next(), matches.next()) {
                (Some(profile), None) => Ok(profile),
                _ => Err(StoreError::NotFound(id)),
            }
        }
        Err(err) => Err(err),
    }
}

fn handle_profile(command: ProfileCommand) -> Result<ExitCode> {
    let events = Arc::new(EventBus::new());
    let store = open_store(events)?;

    match command {
        ProfileCommand::Add {
            label,
            host,
            port,
            group,
            with_password,
        } => {
            let credential = if with_password { Some(seal_password(&label)?) } else { None };
            let draft = ProfileDraft {
                host,
                port,
                label,
                group: group.unwrap_or_default(),
                credential,
            };
            let id = store.create(draft)?;
            println!("Added profile {}", id);
            Ok(ExitCode::SUCCESS)
        }
        ProfileCommand::List => {
            let profiles = store.list();
            if profiles.is_empty() {
                println!("No profiles saved");
                return Ok(ExitCode::SUCCESS);
            }
            for profile in profiles {
                let group = if profile.group.is_empty() { "-" } else { profile.group.as_str() };
                let lock = if profile.credential.is_some() { " [sealed]" } else { "" };
                println!("{}  {}  {}:{}  ({}){}", profile.id, profile.label, profile.host, profile.port, group, lock);
            }
            Ok(ExitCode::SUCCESS)
        }
        ProfileCommand::Edit {
            id,
            label,
            host,
            port,
            group,
            with_password,
        } => {
            let existing = resolve_profile(&store, &id)?;
            let label = label.unwrap_or_else(|| existing.label.clone());
            let credential = if with_password {
                Some(seal_password(&label)?)
            } else {
                existing.credential.clone()
            };
            let draft = ProfileDraft {
                host: host.unwrap_or_else(|| existing.host.clone()),
                port: port.unwrap_or(existing.port),
                label,
                group: group.unwrap_or_else(|| existing.group.clone()),
                credential,
            };
            store.update(&existing.id, draft)?;
            println!("Updated profile {}", existing.id);
            Ok(ExitCode::SUCCESS)
        }
        ProfileCommand::Delete { id } => {
            let existing = resolve_profile(&store, &id)?;
            let removed = store.delete(&existing.id)?;
            println!("Deleted profile {} ({})", removed.id, removed.label);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn handle_vault(command: VaultCommand) -> Result<ExitCode> {
    match command {
        VaultCommand::Init => {
            let check_path = vault::default_check_path()?;
            if check_path.exists() {
                eprintln!("Vault is already initialized");
                return Ok(ExitCode::FAILURE);
            }
            let salt = load_or_create_salt(&vault::default_salt_path()?)?;
            let passphrase = prompt_passphrase(true)?;
            let vault = CredentialVault::unlock(&passphrase, &salt)?;
            vault.write_check_file(&check_path)?;
            log_info!("Vault initialized");
            println!("Vault initialized");
            Ok(ExitCode::SUCCESS)
        }
        VaultCommand::Status => {
            let check_path = vault::default_check_path()?;
            if !check_path.exists() {
                println!("Vault not initialized (run `smux vault init`)");
                return Ok(ExitCode::FAILURE);
            }
            match unlock_vault() {
                Ok(_) => {
                    println!("Vault unlocked: passphrase OK");
                    Ok(ExitCode::SUCCESS)
                }
                Err(VaultError::AuthenticationFailed) => {
                    eprintln!("Passphrase does not match");
                    Ok(ExitCode::FAILURE)
                }
                Err(err) => Err(err.into()),
            }
        }
    }
}

fn handle_connect(needle: &str) -> Result<ExitCode> {
    let events = Arc::new(EventBus::new());
    let store = open_store(events.clone())?;
    let profile = resolve_profile(&store, needle)?;

    let vault = if profile.credential.is_some() {
        Some(unlock_vault()?)
    } else {
        None
    };

    attach(store, events, Some(profile), vault)
}

fn handle_shell() -> Result<ExitCode> {
    let events = Arc::new(EventBus::new());
    let store = open_store(events.clone())?;
    attach(store, events, None, None)
}

/// Open a session and bridge it to this terminal: stdin is forwarded to
/// the session, session output is written to stdout, and the process
/// exits when the session reaches a terminal state.
fn attach(
    store: Arc<ProfileStore>,
    events: Arc<EventBus>,
    profile: Option<ConnectionProfile>,
    vault: Option<CredentialVault>,
) -> Result<ExitCode> {
    let watch = match config::get_config().read() {
        Ok(config) => config.settings.watch_profiles,
        Err(_) => false,
    };
    let _watcher = if watch { store_watcher(store.clone()) } else { None };

    let manager = Arc::new(SessionManager::new(store, events.clone(), Arc::new(PtyTransportFactory::new())));

    // Subscribe before opening so no early state event is missed.
    let event_rx = events.subscribe();

    let tab_title = profile.as_ref().map(|profile| profile.label.clone()).unwrap_or_else(|| "local".to_string());
    let tab = manager.create_tab(tab_title);
    let profile_id = profile.as_ref().map(|profile| profile.id.clone());
    let session = manager.open(profile_id.as_ref(), tab, vault.as_ref(), DEFAULT_ROWS, DEFAULT_COLS)?;

    // Forward stdin to the session until it closes or stdin ends.
    let stdin_manager = manager.clone();
    let stdin_thread = thread::Builder::new().name("stdin-forward".to_string()).spawn(move || {
        let mut stdin = io::stdin().lock();
        let mut buf = [0u8; 4096];
        loop {
            match stdin.read(&mut buf) {
                Ok(0) => {
                    let _ = stdin_manager.close(session);
                    break;
                }
                Ok(bytes_read) => {
                    if stdin_manager.write(session, &buf[..bytes_read]).is_err() {
                        break;
                    }
                }
                Err(err) => {
                    log_error!("stdin read failed: {}", err);
                    break;
                }
            }
        }
        log_debug!("stdin forwarder exiting");
    });
    if let Err(err) = stdin_thread {
        log_error!("Failed to spawn stdin forwarder: {}", err);
    }

    let stdout = io::stdout();
    let mut stdout = stdout.lock();
    for event in event_rx {
        match event {
            Event::DataAvailable { session: id } if id == session => {
                let bytes = manager.take_output(session)?;
                stdout.write_all(&bytes)?;
                stdout.flush()?;
            }
            Event::SessionStateChanged { session: id, state } if id == session && state.is_terminal() => {
                // Flush anything buffered after the last DataAvailable.
                let bytes = manager.take_output(session)?;
                stdout.write_all(&bytes)?;
                stdout.flush()?;
                break;
            }
            _ => {}
        }
    }

    let exit = manager.session_exit(session)?;
    manager.remove_session(session)?;
    manager.shutdown();

    match exit {
        Some(SessionExit::Error(message)) => {
            eprintln!("Session ended with an error: {}", message);
            Ok(ExitCode::FAILURE)
        }
        _ => Ok(ExitCode::SUCCESS),
    }
}
