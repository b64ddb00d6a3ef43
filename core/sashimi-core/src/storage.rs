//! Storage configuration and path management for Sashimi.
//!
//! All file paths the daemon and CLI touch are decided here so tests can
//! inject a temp root with `StorageConfig::with_root()`.

use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::error::{Result, SyncError};

const ROOT_DIR_NAME: &str = ".sashimi";

/// Central configuration for all Sashimi storage paths.
///
/// Production code uses `StorageConfig::from_home()` which points to
/// `~/.sashimi/`. Tests use `StorageConfig::with_root(temp_dir)`.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    root: PathBuf,
}

impl StorageConfig {
    pub fn from_home() -> Result<Self> {
        let home = dirs::home_dir().ok_or(SyncError::HomeDirNotFound)?;
        Ok(Self {
            root: home.join(ROOT_DIR_NAME),
        })
    }

    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// User preferences (status profile, watched file, client id).
    pub fn settings_file(&self) -> PathBuf {
        self.root.join("settings.json")
    }

    /// Secrets for the file vault backend.
    pub fn vault_file(&self) -> PathBuf {
        self.root.join("vault.json")
    }

    pub fn socket_path(&self) -> PathBuf {
        self.root.join("daemon.sock")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }
}

/// Expands a leading `~` or `~/` against the home directory. Other paths are
/// returned unchanged.
pub fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    } else if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Writes `contents` to `path` atomically (temp file in the same directory,
/// then rename). The temp file is created owner-only and removed if any
/// step fails.
pub fn atomic_write(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs_err::create_dir_all(dir).map_err(|source| SyncError::Io {
        context: format!("creating directory {}", dir.display()),
        source,
    })?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|source| SyncError::Io {
        context: format!("creating temp file in {}", dir.display()),
        source,
    })?;

    tmp.write_all(contents).map_err(|source| SyncError::Io {
        context: format!("writing temp file for {}", path.display()),
        source,
    })?;

    tmp.flush().map_err(|source| SyncError::Io {
        context: format!("flushing temp file for {}", path.display()),
        source,
    })?;

    tmp.persist(path).map_err(|err| SyncError::Io {
        context: format!("persisting temp file to {}", path.display()),
        source: err.error,
    })?;

    Ok(())
}
