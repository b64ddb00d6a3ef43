//! Secret storage for the Slack bearer token.
//!
//! `SecretVault` is the opaque get/set/delete seam. "Not found" is a value
//! (`Ok(None)` on get, `Ok(())` on delete), never an error. Backend failures
//! surface as `VaultError::Unhandled` carrying the backend's own status text,
//! which callers log but do not interpret.

use fs_err as fs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;

use crate::storage::atomic_write;

/// The fixed logical key the token is stored under.
pub const TOKEN_KEY: &str = "sashimi.slack-token";

const KEYCHAIN_ACCOUNT: &str = "sashimi";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VaultError {
    #[error("vault backend error: {0}")]
    Unhandled(String),

    #[error("stored secret is not valid UTF-8")]
    UnexpectedData,
}

pub trait SecretVault: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, VaultError>;
    fn set(&self, key: &str, value: &str) -> Result<(), VaultError>;
    fn delete(&self, key: &str) -> Result<(), VaultError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VaultBackend {
    #[default]
    Keychain,
    File,
}

impl FromStr for VaultBackend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "keychain" => Ok(Self::Keychain),
            "file" => Ok(Self::File),
            other => Err(format!("unknown vault backend: {}", other)),
        }
    }
}

impl std::fmt::Display for VaultBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VaultBackend::Keychain => write!(f, "keychain"),
            VaultBackend::File => write!(f, "file"),
        }
    }
}

/// Builds the configured backend. The file backend keeps its data at `file_path`.
pub fn open_vault(backend: VaultBackend, file_path: PathBuf) -> Box<dyn SecretVault> {
    match backend {
        VaultBackend::Keychain => Box::new(KeychainVault),
        VaultBackend::File => Box::new(FileVault::new(file_path)),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// OS secure storage
// ═══════════════════════════════════════════════════════════════════════════════

/// macOS Keychain, Windows Credential Manager, or on Linux the keyutils
/// cache backed by Secret Service (so the token survives a reboot), through
/// the `keyring` crate. The key is used as the service name.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeychainVault;

impl KeychainVault {
    fn entry(key: &str) -> Result<keyring::Entry, VaultError> {
        keyring::Entry::new(key, KEYCHAIN_ACCOUNT).map_err(map_keyring_error)
    }
}

impl SecretVault for KeychainVault {
    fn get(&self, key: &str) -> Result<Option<String>, VaultError> {
        match Self::entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(err) => Err(map_keyring_error(err)),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), VaultError> {
        Self::entry(key)?
            .set_password(value)
            .map_err(map_keyring_error)
    }

    fn delete(&self, key: &str) -> Result<(), VaultError> {
        match Self::entry(key)?.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => {
                tracing::debug!(key, "Tried to delete a vault key that didn't exist");
                Ok(())
            }
            Err(err) => Err(map_keyring_error(err)),
        }
    }
}

fn map_keyring_error(err: keyring::Error) -> VaultError {
    match err {
        keyring::Error::BadEncoding(_) => VaultError::UnexpectedData,
        other => VaultError::Unhandled(other.to_string()),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// File-backed storage
// ═══════════════════════════════════════════════════════════════════════════════

/// JSON map of secrets in a single owner-only file.
///
/// For hosts without a usable secret service, and for tests.
#[derive(Debug)]
pub struct FileVault {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileVault {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>, VaultError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(BTreeMap::new())
            }
            Err(err) => return Err(VaultError::Unhandled(err.to_string())),
        };
        let text = String::from_utf8(bytes).map_err(|_| VaultError::UnexpectedData)?;
        serde_json::from_str(&text).map_err(|err| VaultError::Unhandled(err.to_string()))
    }

    /// Owner-only from creation: the token never sits in a readable file.
    fn write_all(&self, secrets: &BTreeMap<String, String>) -> Result<(), VaultError> {
        let payload = serde_json::to_vec_pretty(secrets)
            .map_err(|err| VaultError::Unhandled(err.to_string()))?;
        atomic_write(&self.path, &payload).map_err(|err| VaultError::Unhandled(err.to_string()))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ()> {
        self.write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SecretVault for FileVault {
    fn get(&self, key: &str) -> Result<Option<String>, VaultError> {
        let _guard = self.lock();
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), VaultError> {
        let _guard = self.lock();
        let mut secrets = self.read_all()?;
        secrets.insert(key.to_string(), value.to_string());
        self.write_all(&secrets)
    }

    fn delete(&self, key: &str) -> Result<(), VaultError> {
        let _guard = self.lock();
        let mut secrets = self.read_all()?;
        if secrets.remove(key).is_none() {
            tracing::debug!(key, "Tried to delete a vault key that didn't exist");
            return Ok(());
        }
        self.write_all(&secrets)
    }
}
