//! Slack presence client.
//!
//! Status pushes are fire-and-forget: each one runs on its own detached
//! thread, logs its outcome, and reports nothing back to the caller. Presence
//! is advisory, so a failed or stalled request must never hold up the watch
//! loop or the next transition. Overlapping pushes may race on the network.

use chrono::Utc;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use std::thread;
use std::time::Duration;
use url::Url;

use crate::error::{Result, SyncError};
use crate::platform;
use crate::types::StatusProfile;

pub const SLACK_BASE_URL: &str = "https://slack.com";

const PROFILE_SET_PATH: &str = "/api/users.profile.set";
const AUTHORIZE_PATH: &str = "/oauth/authorize";
const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";
const REQUEST_TIMEOUT_SECS: u64 = 10;
const CONNECT_TIMEOUT_SECS: u64 = 5;

/// Wire body for `users.profile.set`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlackStatus {
    pub status_emoji: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_expiration: Option<i64>,
    pub status_text: String,
}

impl SlackStatus {
    /// Builds the body for a profile; a relative expiry becomes an absolute
    /// unix timestamp counted from `now_unix`.
    pub fn from_profile(profile: &StatusProfile, now_unix: i64) -> Self {
        let status_expiration = profile
            .expires_in_secs
            .and_then(|secs| i64::try_from(secs).ok())
            .map(|secs| now_unix.saturating_add(secs));
        Self {
            status_emoji: profile.emoji().to_string(),
            status_expiration,
            status_text: profile.text().to_string(),
        }
    }

    pub fn cleared() -> Self {
        Self {
            status_emoji: String::new(),
            status_expiration: None,
            status_text: String::new(),
        }
    }
}

/// Slack's response envelope. Decoded for logging only.
#[derive(Debug, Deserialize)]
struct SlackEnvelope {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

/// What the sync controller needs from a presence backend.
pub trait PresenceClient: Send + Sync {
    fn has_token(&self) -> bool;
    fn set_status(&self, profile: &StatusProfile);
    fn clear_status(&self);
}

impl<T: PresenceClient + ?Sized> PresenceClient for Arc<T> {
    fn has_token(&self) -> bool {
        (**self).has_token()
    }

    fn set_status(&self, profile: &StatusProfile) {
        (**self).set_status(profile)
    }

    fn clear_status(&self) {
        (**self).clear_status()
    }
}

pub struct SlackClient {
    client_id: RwLock<Option<String>>,
    base_url: String,
    http: reqwest::blocking::Client,
    token: RwLock<Option<String>>,
}

impl std::fmt::Debug for SlackClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackClient")
            .field("client_id", &self.client_id())
            .field("base_url", &self.base_url)
            .field("has_token", &self.has_token())
            .finish()
    }
}

impl SlackClient {
    /// Creates an unauthenticated client. `client_id` is only needed for
    /// `authorise`.
    pub fn new(client_id: Option<String>) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .user_agent(concat!("Sashimi/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(SyncError::HttpClient)?;
        Ok(Self {
            client_id: RwLock::new(client_id),
            base_url: SLACK_BASE_URL.to_string(),
            http,
            token: RwLock::new(None),
        })
    }

    /// Points the client at another Slack-compatible host.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Replaces the in-memory credential. Persistence is the caller's job.
    pub fn set_token(&self, token: Option<String>) {
        let mut slot = self
            .token
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = token;
    }

    pub fn has_token(&self) -> bool {
        self.current_token().is_some()
    }

    /// Replaces the OAuth client id used by `authorise`.
    pub fn set_client_id(&self, client_id: Option<String>) {
        let mut slot = self
            .client_id
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = client_id;
    }

    pub fn client_id(&self) -> Option<String> {
        self.client_id
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn current_token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn authorize_url(&self, scope: &str) -> Result<Url> {
        let client_id = self.client_id().ok_or(SyncError::ClientIdMissing)?;
        let endpoint = format!("{}{}", self.base_url, AUTHORIZE_PATH);
        Url::parse_with_params(&endpoint, &[("client_id", client_id.as_str()), ("scope", scope)]).map_err(
            |source| SyncError::Url {
                context: "building authorization URL".to_string(),
                source,
            },
        )
    }

    /// Opens the Slack authorization page in the browser. The token arrives
    /// later through the redirect handler; nothing here waits for it.
    pub fn authorise(&self, scope: &str) -> Result<()> {
        let url = self.authorize_url(scope)?;
        tracing::info!(scope, "Opening Slack authorization page");
        platform::open_url(url.as_str())
    }

    pub fn set_status(&self, profile: &StatusProfile) {
        self.dispatch(SlackStatus::from_profile(profile, Utc::now().timestamp()));
    }

    pub fn clear_status(&self) {
        self.dispatch(SlackStatus::cleared());
    }

    /// Posts `status` on a detached thread. Intentionally lossy: there is no
    /// result channel, no retry, and no cancellation.
    fn dispatch(&self, status: SlackStatus) {
        let Some(token) = self.current_token() else {
            tracing::info!("No Slack token; dropping status update");
            return;
        };

        let body = match serde_json::to_vec(&status) {
            Ok(body) => body,
            Err(err) => {
                tracing::error!(error = %err, "Failed to serialize Slack status");
                return;
            }
        };

        let http = self.http.clone();
        let url = format!("{}{}", self.base_url, PROFILE_SET_PATH);
        let clearing = status.status_emoji.is_empty() && status.status_text.is_empty();

        let spawned = thread::Builder::new()
            .name("slack-status".to_string())
            .spawn(move || post_status(&http, &url, &token, body, clearing));
        if let Err(err) = spawned {
            tracing::warn!(error = %err, "Failed to spawn Slack status thread");
        }
    }
}

fn post_status(
    http: &reqwest::blocking::Client,
    url: &str,
    token: &str,
    body: Vec<u8>,
    clearing: bool,
) {
    let action = if clearing { "clear" } else { "set" };
    let response = match http
        .post(url)
        .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
        .header(AUTHORIZATION, format!("Bearer {}", token))
        .body(body)
        .send()
    {
        Ok(response) => response,
        Err(err) => {
            tracing::warn!(action, error = %err, "Slack status request failed");
            return;
        }
    };

    let status = response.status();
    let text = response.text().unwrap_or_default();
    if !status.is_success() {
        tracing::warn!(action, status = %status, body = %text, "Slack status request rejected");
        return;
    }

    match serde_json::from_str::<SlackEnvelope>(&text) {
        Ok(SlackEnvelope { ok: true, .. }) => {
            tracing::info!(action, "Slack status updated");
        }
        Ok(SlackEnvelope { ok: false, error }) => {
            tracing::warn!(
                action,
                error = error.as_deref().unwrap_or("unknown"),
                "Slack refused status update"
            );
        }
        Err(_) => {
            tracing::debug!(action, body = %text, "Slack status response was not JSON");
        }
    }
}

impl PresenceClient for SlackClient {
    fn has_token(&self) -> bool {
        SlackClient::has_token(self)
    }

    fn set_status(&self, profile: &StatusProfile) {
        SlackClient::set_status(self, profile)
    }

    fn clear_status(&self) {
        SlackClient::clear_status(self)
    }
}
