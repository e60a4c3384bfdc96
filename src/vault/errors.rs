//! Vault-related error types

use std::{error::Error, fmt, io};

#[derive(Debug)]
pub enum VaultError {
    IoError(io::Error),
    /// AEAD verification failed: wrong passphrase or tampered blob
    AuthenticationFailed,
    /// Malformed blob: bad base64, truncated, or unknown cipher tag
    InvalidBlob(String),
    KeyDerivation(String),
    EncryptionFailed,
    RandomFailure(String),
    EmptyPassphrase,
    PassphraseMismatch,
    /// No check file yet; `vault init` has not been run
    NotInitialized,
}

impl fmt::Display for VaultError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VaultError::IoError(err) => write!(f, "I/O error: {}", err),
            VaultError::AuthenticationFailed => write!(f, "Authentication failed: wrong passphrase or tampered data"),
            VaultError::InvalidBlob(msg) => write!(f, "Invalid credential blob: {}", msg),
            VaultError::KeyDerivation(msg) => write!(f, "Key derivation failed: {}", msg),
            VaultError::EncryptionFailed => write!(f, "Encryption failed"),
            VaultError::RandomFailure(msg) => write!(f, "Random generator failure: {}", msg),
            VaultError::EmptyPassphrase => write!(f, "Empty passphrase"),
            VaultError::PassphraseMismatch => write!(f, "Passphrases do not match"),
            VaultError::NotInitialized => write!(f, "Vault not initialized"),
        }
    }
}

impl Error for VaultError {}

impl From<io::Error> for VaultError {
    fn from(err: io::Error) -> Self {
        VaultError::IoError(err)
    }
}
