//! # sashimi-core
//!
//! Core library for Sashimi: keeps a Slack status in step with whether a call
//! is in progress in a desktop app, by passively watching that app's local
//! state file.
//!
//! ## Design Principles
//!
//! - **Synchronous**: No async runtime dependency. Network pushes run on
//!   detached threads and never report back.
//! - **Best-effort presence**: Status updates are advisory. Failures are
//!   logged, never retried, and never interrupt the watch loop.
//! - **Graceful degradation**: Missing files, unreadable settings, and vault
//!   failures fall back to defaults or "unauthenticated", not errors.
//! - **Explicit wiring**: Collaborators (vault, client, settings) are built
//!   once at startup and passed by reference. No process-wide singletons.
//!
//! ## Pipeline
//!
//! ```text
//! FileObserver ──WatchEvent──▶ classify ──CallState──▶ SyncController ──▶ SlackClient
//!                                                                            ▲
//! redirect URL ──▶ ingest_redirect ──▶ SecretVault (persist) ────────────────┘ (activate)
//! ```

pub mod classify;
pub mod error;
pub mod observer;
pub mod patterns;
pub mod platform;
pub mod settings;
pub mod slack;
pub mod storage;
pub mod sync;
pub mod token;
pub mod types;
pub mod vault;

pub use classify::classify;
pub use error::{Result, SyncError};
pub use observer::{FileObserver, ObserverOptions};
pub use settings::{ProfileSource, Settings, SettingsStore};
pub use slack::{PresenceClient, SlackClient, SlackStatus};
pub use storage::StorageConfig;
pub use sync::{SyncAction, SyncController, SyncState};
pub use token::{ingest_redirect, load_credential, sign_out, IngestOutcome, TokenError};
pub use types::{CallState, StatusProfile, WatchEvent};
pub use vault::{FileVault, KeychainVault, SecretVault, VaultBackend, VaultError, TOKEN_KEY};
