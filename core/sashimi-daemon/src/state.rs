//! Daemon-wide shared state: the single Slack client, the vault, and what the
//! observer is doing. Request threads and the observer thread share one
//! `SlackClient` so a token ingested over IPC is seen by the next transition.

use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use sashimi_core::vault::SecretVault;
use sashimi_core::{
    ingest_redirect, sign_out, IngestOutcome, Settings, SettingsStore, SlackClient, SyncError,
    TokenError, VaultError,
};

#[derive(Debug, Clone, Default, Serialize)]
pub struct WatchStatus {
    pub watching: bool,
    pub watched_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct SharedState {
    client: Arc<SlackClient>,
    vault: Box<dyn SecretVault>,
    settings: SettingsStore,
    watch: Mutex<WatchStatus>,
}

impl SharedState {
    pub fn new(client: Arc<SlackClient>, vault: Box<dyn SecretVault>, settings: SettingsStore) -> Self {
        Self {
            client,
            vault,
            settings,
            watch: Mutex::new(WatchStatus::default()),
        }
    }

    pub fn has_token(&self) -> bool {
        self.client.has_token()
    }

    pub fn set_watch_status(&self, status: WatchStatus) {
        if let Ok(mut watch) = self.watch.lock() {
            *watch = status;
        }
    }

    pub fn watch_status(&self) -> WatchStatus {
        self.watch
            .lock()
            .map(|watch| watch.clone())
            .unwrap_or_default()
    }

    pub fn ingest_redirect(&self, url: &str) -> Result<IngestOutcome, TokenError> {
        ingest_redirect(url, self.vault.as_ref(), &self.client)
    }

    /// Re-reads settings and pushes the current client id into the client.
    /// An id already held is kept when the settings have none.
    fn refresh_settings(&self) -> Settings {
        self.refresh_settings_with(|key| std::env::var(key).ok())
    }

    fn refresh_settings_with<F>(&self, lookup: F) -> Settings
    where
        F: Fn(&str) -> Option<String>,
    {
        let settings = self.settings.load().apply_env_overrides(lookup);
        if let Some(client_id) = settings.client_id() {
            self.client.set_client_id(Some(client_id));
        }
        settings
    }

    /// Opens the browser for sign-in. Client id and the fallback scope come
    /// from settings read fresh.
    pub fn authorise(&self, scope: Option<String>) -> Result<String, SyncError> {
        let settings = self.refresh_settings();
        let scope = scope.unwrap_or_else(|| settings.scope());
        self.client.authorise(&scope)?;
        Ok(scope)
    }

    pub fn sign_out(&self) -> Result<(), VaultError> {
        sign_out(self.vault.as_ref(), &self.client)
    }
}
