//! Credential sealing with a passphrase-derived key.
//!
//! Argon2id derives a 256-bit key from the master passphrase and a stored
//! per-installation salt; XChaCha20-Poly1305 seals each secret with a fresh
//! random nonce. The AEAD tag means any bit flip in a stored blob is
//! detected at unseal time instead of handing back garbage credentials. A
//! sealed sentinel file lets unlock reject a wrong passphrase up front.

use super::VaultError;
use crate::profile::SealedCredential;
use crate::{log_debug, log_info};
use argon2::Argon2;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use chacha20poly1305::{
    Key, XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit},
};
use rpassword::prompt_password;
use secrecy::{ExposeSecret, SecretString};
use std::{fs, path::Path};
use zeroize::Zeroizing;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// Algorithm tag written into every sealed blob
pub const CIPHER_TAG: &str = "xchacha20poly1305-argon2id";

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 24;
const KEY_LEN: usize = 32;
const CHECK_PLAINTEXT: &[u8] = b"shellmux-vault-check-v1";
#[cfg(unix)]
const PRIVATE_VAULT_FILE_MODE: u32 = 0o600;

pub struct CredentialVault {
    cipher: XChaCha20Poly1305,
}

impl CredentialVault {
    /// Derive the sealing key from a passphrase and salt. Cheap to call
    /// relative to a session open; the KDF runs once per unlock, not per
    /// seal.
    pub fn unlock(passphrase: &SecretString, salt: &[u8]) -> Result<Self, VaultError> {
        if passphrase.expose_secret().is_empty() {
            return Err(VaultError::EmptyPassphrase);
        }

        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        Argon2::default()
            .hash_password_into(passphrase.expose_secret().as_bytes(), salt, key.as_mut())
            .map_err(|err| VaultError::KeyDerivation(err.to_string()))?;

        let cipher = XChaCha20Poly1305::new(Key::from_slice(key.as_ref()));
        log_debug!("Vault unlocked");
        Ok(Self { cipher })
    }

    /// Encrypt a secret for at-rest storage
    pub fn seal(&self, plaintext: &[u8]) -> Result<SealedCredential, VaultError> {
        let mut nonce = [0u8; NONCE_LEN];
        getrandom::fill(&mut nonce).map_err(|err| VaultError::RandomFailure(err.to_string()))?;

        let ciphertext = self
            .cipher
            .encrypt(XNonce::from_slice(&nonce), plaintext)
            .map_err(|_| VaultError::EncryptionFailed)?;

        let mut blob_bytes = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob_bytes.extend_from_slice(&nonce);
        blob_bytes.extend_from_slice(&ciphertext);

        Ok(SealedCredential {
            cipher: CIPHER_TAG.to_string(),
            blob: BASE64.encode(blob_bytes),
        })
    }

    /// Decrypt a stored secret. Tampering or a wrong key surfaces as
    /// `AuthenticationFailed`, never as silent garbage.
    pub fn unseal(&self, sealed: &SealedCredential) -> Result<Zeroizing<Vec<u8>>, VaultError> {
        if sealed.cipher != CIPHER_TAG {
            return Err(VaultError::InvalidBlob(format!("unknown cipher tag '{}'", sealed.cipher)));
        }

        let blob_bytes = BASE64
            .decode(&sealed.blob)
            .map_err(|err| VaultError::InvalidBlob(format!("bad base64: {}", err)))?;
        if blob_bytes.len() < NONCE_LEN {
            return Err(VaultError::InvalidBlob("blob shorter than nonce".to_string()));
        }

        let (nonce, ciphertext) = blob_bytes.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(XNonce::from_slice(nonce), ciphertext)
            .map_err(|_| VaultError::AuthenticationFailed)?;

        Ok(Zeroizing::new(plaintext))
    }

    /// Write the sealed sentinel used to verify the passphrase on later
    /// unlocks.
    pub fn write_check_file(&self, path: &Path) -> Result<(), VaultError> {
        let sealed = self.seal(CHECK_PLAINTEXT)?;
        let serialized = serde_json::to_string(&sealed).map_err(|err| VaultError::InvalidBlob(err.to_string()))?;
        fs::write(path, serialized)?;
        set_private_file_permissions(path)?;
        log_info!("Vault check file written to {:?}", path);
        Ok(())
    }

    /// Verify this vault's key against the stored sentinel. Missing file
    /// means the vault was never initialized.
    pub fn verify_check_file(&self, path: &Path) -> Result<(), VaultError> {
        if !path.exists() {
            return Err(VaultError::NotInitialized);
        }
        let content = fs::read_to_string(path)?;
        let sealed: SealedCredential = serde_json::from_str(&content).map_err(|err| VaultError::InvalidBlob(err.to_string()))?;
        let plaintext = self.unseal(&sealed)?;
        if plaintext.as_slice() != CHECK_PLAINTEXT {
            return Err(VaultError::AuthenticationFailed);
        }
        Ok(())
    }
}

/// Load the per-installation salt, creating a fresh random one on first use
pub fn load_or_create_salt(path: &Path) -> Result<Vec<u8>, VaultError> {
    if path.exists() {
        let content = fs::read_to_string(path)?;
        return BASE64
            .decode(content.trim())
            .map_err(|err| VaultError::InvalidBlob(format!("bad salt file: {}", err)));
    }

    let mut salt = [0u8; SALT_LEN];
    getrandom::fill(&mut salt).map_err(|err| VaultError::RandomFailure(err.to_string()))?;
    fs::write(path, BASE64.encode(salt))?;
    set_private_file_permissions(path)?;
    log_info!("Vault salt created at {:?}", path);
    Ok(salt.to_vec())
}

/// Prompt for the master passphrase, optionally with a verify pass for
/// vault initialization.
pub fn prompt_passphrase(confirm: bool) -> Result<SecretString, VaultError> {
    let passphrase = prompt_password("Enter vault passphrase: ")?;
    if passphrase.is_empty() {
        return Err(VaultError::EmptyPassphrase);
    }

    if confirm {
        let verified = prompt_password("Verify vault passphrase: ")?;
        if passphrase != verified {
            return Err(VaultError::PassphraseMismatch);
        }
    }

    Ok(SecretString::from(passphrase))
}

#[cfg(unix)]
fn set_private_file_permissions(path: &Path) -> Result<(), VaultError> {
    fs::set_permissions(path, fs::Permissions::from_mode(PRIVATE_VAULT_FILE_MODE))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_private_file_permissions(_path: &Path) -> Result<(), VaultError> {
    Ok(())
}

#[cfg(test)]
#[path = "../test/vault/core.rs"]
mod tests;
