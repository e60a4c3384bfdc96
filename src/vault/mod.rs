mod core;
mod errors;

pub use core::{CIPHER_TAG, CredentialVault, load_or_create_salt, prompt_passphrase};
pub use errors::VaultError;

use std::path::PathBuf;

/// Default locations of the vault's salt and passphrase-check files
pub fn default_salt_path() -> Result<PathBuf, VaultError> {
    app_file("vault.salt")
}

pub fn default_check_path() -> Result<PathBuf, VaultError> {
    app_file("vault.check")
}

fn app_file(name: &str) -> Result<PathBuf, VaultError> {
    let home_dir = dirs::home_dir().ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "Home directory not found"))?;
    let app_dir = home_dir.join(".shellmux");
    if !app_dir.exists() {
        std::fs::create_dir_all(&app_dir)?;
    }
    Ok(app_dir.join(name))
}
