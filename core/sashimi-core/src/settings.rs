//! User settings loading and saving.
//!
//! Settings live in `~/.sashimi/settings.json`. The preferences UI writes
//! them; the daemon only reads. Missing or malformed files fall back to
//! defaults, and blank strings count as unset.

use fs_err as fs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, SyncError};
use crate::storage::{atomic_write, expand_tilde};
use crate::types::StatusProfile;
use crate::vault::VaultBackend;

pub const DEFAULT_SLACK_SCOPE: &str = "users.profile:write";

const CLIENT_ID_ENV: &str = "SASHIMI_SLACK_CLIENT_ID";
const VAULT_BACKEND_ENV: &str = "SASHIMI_VAULT_BACKEND";

#[cfg(target_os = "linux")]
const TEAMS_STORAGE_SEGMENTS: &[&str] = &["Microsoft", "Microsoft Teams", "storage.json"];
#[cfg(not(target_os = "linux"))]
const TEAMS_STORAGE_SEGMENTS: &[&str] = &["Microsoft", "Teams", "storage.json"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_emoji: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_text: Option<String>,
    /// Relative expiry for the in-call status. Unset means "until cleared".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_expiration_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watched_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slack_client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slack_scope: Option<String>,
    #[serde(default)]
    pub vault_backend: VaultBackend,
    #[serde(default = "default_sync_on_start")]
    pub sync_on_start: bool,
}

fn default_sync_on_start() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            status_emoji: None,
            status_text: None,
            status_expiration_secs: None,
            watched_file: None,
            slack_client_id: None,
            slack_scope: None,
            vault_backend: VaultBackend::default(),
            sync_on_start: default_sync_on_start(),
        }
    }
}

impl Settings {
    pub fn profile(&self) -> StatusProfile {
        StatusProfile::new(
            non_blank(&self.status_emoji),
            non_blank(&self.status_text),
        )
        .with_expiry(self.status_expiration_secs.filter(|secs| *secs > 0))
    }

    /// The file to observe, tilde-expanded. `None` only when no override is
    /// set and the platform has no config directory.
    pub fn watched_file(&self) -> Option<PathBuf> {
        if let Some(path) = non_blank(&self.watched_file) {
            return Some(expand_tilde(&path));
        }
        default_watched_file()
    }

    pub fn client_id(&self) -> Option<String> {
        non_blank(&self.slack_client_id)
    }

    pub fn scope(&self) -> String {
        non_blank(&self.slack_scope).unwrap_or_else(|| DEFAULT_SLACK_SCOPE.to_string())
    }

    /// Applies environment overrides through `lookup` (normally `std::env::var`).
    pub fn apply_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(client_id) = lookup(CLIENT_ID_ENV).filter(|v| !v.trim().is_empty()) {
            self.slack_client_id = Some(client_id.trim().to_string());
        }
        if let Some(raw) = lookup(VAULT_BACKEND_ENV) {
            match raw.parse::<VaultBackend>() {
                Ok(backend) => self.vault_backend = backend,
                Err(err) => tracing::warn!(value = %raw, error = %err, "Ignoring vault backend override"),
            }
        }
        self
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn default_watched_file() -> Option<PathBuf> {
    let mut path = dirs::config_dir()?;
    for segment in TEAMS_STORAGE_SEGMENTS {
        path.push(segment);
    }
    Some(path)
}

/// Source of the in-call status profile, consulted at each transition.
pub trait ProfileSource {
    fn current_profile(&self) -> StatusProfile;
}

/// Reads and writes the settings file. Cheap to clone; holds only the path.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads settings, returning defaults if the file is missing or malformed.
    pub fn load(&self) -> Settings {
        match self.try_load() {
            Ok(settings) => settings,
            Err(err) => {
                tracing::warn!(error = %err, "Falling back to default settings");
                Settings::default()
            }
        }
    }

    pub fn try_load(&self) -> Result<Settings> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Settings::default())
            }
            Err(source) => {
                return Err(SyncError::Io {
                    context: "reading settings".to_string(),
                    source,
                })
            }
        };
        serde_json::from_str(&content).map_err(|err| SyncError::SettingsMalformed {
            path: self.path.clone(),
            details: err.to_string(),
        })
    }

    pub fn save(&self, settings: &Settings) -> Result<()> {
        let content = serde_json::to_string_pretty(settings).map_err(|source| SyncError::Json {
            context: "serializing settings".to_string(),
            source,
        })?;
        atomic_write(&self.path, content.as_bytes())
    }
}

impl ProfileSource for SettingsStore {
    /// Re-reads the file every time so edits made between calls take effect.
    fn current_profile(&self) -> StatusProfile {
        self.load().profile()
    }
}
