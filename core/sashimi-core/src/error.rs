//! Error types for sashimi-core operations.
//!
//! Vault and token-ingestion failures have their own enums (`vault::VaultError`,
//! `token::TokenError`) because callers match on them individually.

use std::path::PathBuf;

/// All errors that can occur while wiring up or running the sync engine.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    // ─────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Settings file malformed: {path}: {details}")]
    SettingsMalformed { path: PathBuf, details: String },

    #[error("Slack client id is not configured")]
    ClientIdMissing,

    // ─────────────────────────────────────────────────────────────────────
    // Watch Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Cannot watch {path}: parent directory does not exist")]
    WatchParentMissing { path: PathBuf },

    #[error("Failed to watch {path}: {source}")]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    // ─────────────────────────────────────────────────────────────────────
    // Network / Platform Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("HTTP client setup failed: {0}")]
    HttpClient(#[source] reqwest::Error),

    #[error("Invalid URL: {context}: {source}")]
    Url {
        context: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Failed to open {url} in browser: {source}")]
    BrowserOpen {
        url: String,
        #[source]
        source: std::io::Error,
    },

    // ─────────────────────────────────────────────────────────────────────
    // I/O Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Convenience type alias for Results using SyncError.
pub type Result<T> = std::result::Result<T, SyncError>;

impl From<SyncError> for String {
    fn from(err: SyncError) -> String {
        err.to_string()
    }
}
