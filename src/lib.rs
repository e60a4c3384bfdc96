// Core modules for the shellmux session manager.
pub mod cli;
pub mod config;
pub mod events;
pub mod log;
pub mod manager;
pub mod profile;
pub mod session;
pub mod vault;

use std::io;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    Config(config::ConfigError),
    Log(log::LogError),
    Profile(profile::StoreError),
    Vault(vault::VaultError),
    Session(session::SessionError),
    Manager(manager::ManagerError),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(err) => write!(f, "IO error: {}", err),
            Error::Config(err) => write!(f, "Configuration error: {}", err),
            Error::Log(err) => write!(f, "Logging error: {}", err),
            Error::Profile(err) => write!(f, "Profile store error: {}", err),
            Error::Vault(err) => write!(f, "Vault error: {}", err),
            Error::Session(err) => write!(f, "Session error: {}", err),
            Error::Manager(err) => write!(f, "Session manager error: {}", err),
        }
    }
}

impl std::error::Error for Error {}

// Implement From for each error type
impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err)
    }
}

impl From<log::LogError> for Error {
    fn from(err: log::LogError) -> Self {
        Error::Log(err)
    }
}

impl From<profile::StoreError> for Error {
    fn from(err: profile::StoreError) -> Self {
        Error::Profile(err)
    }
}

impl From<vault::VaultError> for Error {
    fn from(err: vault::VaultError) -> Self {
        Error::Vault(err)
    }
}

impl From<session::SessionError> for Error {
    fn from(err: session::SessionError) -> Self {
        Error::Session(err)
    }
}

impl From<manager::ManagerError> for Error {
    fn from(err: manager::ManagerError) -> Self {
        Error::Manager(err)
    }
}
