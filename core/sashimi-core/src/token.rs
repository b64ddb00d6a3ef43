//! Credential lifecycle: redirect ingestion, startup load, and sign-out.
//!
//! The redirect arrives as `sashimi://auth?token=<token>`. For a custom
//! scheme the route lands in the URL's host (`auth`), so the route checked
//! against `EXPECTED_REDIRECT_ROUTE` is host and path joined, minus slashes.

use url::Url;

use crate::slack::SlackClient;
use crate::vault::{SecretVault, VaultError, TOKEN_KEY};

/// The only route a sign-in redirect is expected to carry.
pub const EXPECTED_REDIRECT_ROUTE: &str = "auth";

const TOKEN_PARAM: &str = "token";

pub const SESSION_ONLY_WARNING: &str =
    "Signed in for this session only: the token could not be saved to secure storage.";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("Sign-in link is missing its query parameters.")]
    MissingQueryParameters,

    #[error("Sign-in link has unexpected path {0:?}.")]
    InvalidPath(String),

    #[error("Sign-in link did not include a token.")]
    MissingTokenParameter,
}

impl TokenError {
    /// Stable machine-readable code for IPC responses.
    pub fn code(&self) -> &'static str {
        match self {
            TokenError::MissingQueryParameters => "missing_query_parameters",
            TokenError::InvalidPath(_) => "invalid_path",
            TokenError::MissingTokenParameter => "missing_token_parameter",
        }
    }
}

/// Result of a successful ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOutcome {
    /// `None` when the token was persisted, or the vault error when it was
    /// only activated in memory.
    pub persist_error: Option<VaultError>,
    /// Non-fatal validation findings (currently only a route mismatch).
    pub path_warning: Option<TokenError>,
}

impl IngestOutcome {
    pub fn stored(&self) -> bool {
        self.persist_error.is_none()
    }

    /// User-facing warnings, if any.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if let Some(path_warning) = &self.path_warning {
            warnings.push(path_warning.to_string());
        }
        if self.persist_error.is_some() {
            warnings.push(SESSION_ONLY_WARNING.to_string());
        }
        warnings
    }
}

/// The route part of a redirect: host and path joined, without slashes.
pub fn redirect_route(url: &Url) -> String {
    let host = url.host_str().unwrap_or("");
    let joined = format!("{}/{}", host, url.path().trim_matches('/'));
    joined.trim_matches('/').to_string()
}

/// Validates a redirect URL and extracts its token without touching any state.
pub fn parse_redirect(raw_url: &str) -> Result<(String, Option<TokenError>), TokenError> {
    let url = Url::parse(raw_url.trim()).map_err(|_| TokenError::MissingQueryParameters)?;
    if url.query().map_or(true, str::is_empty) {
        return Err(TokenError::MissingQueryParameters);
    }

    let route = redirect_route(&url);
    let path_warning = if route == EXPECTED_REDIRECT_ROUTE {
        None
    } else {
        let warning = TokenError::InvalidPath(route);
        tracing::warn!(error = %warning, "Redirect route mismatch; continuing");
        Some(warning)
    };

    let token = url
        .query_pairs()
        .find(|(key, _)| key == TOKEN_PARAM)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or(TokenError::MissingTokenParameter)?;

    Ok((token, path_warning))
}

/// Handles a sign-in redirect: validate, persist, activate.
///
/// Validation failures change nothing. A persistence failure is reported in
/// the outcome but the token is still activated for this session.
pub fn ingest_redirect(
    raw_url: &str,
    vault: &dyn SecretVault,
    client: &SlackClient,
) -> Result<IngestOutcome, TokenError> {
    let (token, path_warning) = parse_redirect(raw_url).map_err(|err| {
        tracing::warn!(error = %err, "Rejected sign-in redirect");
        err
    })?;

    let persist_error = match vault.set(TOKEN_KEY, &token) {
        Ok(()) => None,
        Err(err) => {
            tracing::warn!(error = %err, "Failed to persist Slack token; using it for this session only");
            Some(err)
        }
    };

    client.set_token(Some(token));
    tracing::info!(stored = persist_error.is_none(), "Slack token activated");

    Ok(IngestOutcome {
        persist_error,
        path_warning,
    })
}

/// Restores the persisted token at startup. Absence and vault failures both
/// leave the client unauthenticated; neither is fatal.
pub fn load_credential(vault: &dyn SecretVault, client: &SlackClient) -> bool {
    match vault.get(TOKEN_KEY) {
        Ok(Some(token)) if !token.trim().is_empty() => {
            client.set_token(Some(token));
            tracing::info!("Loaded Slack token from vault");
            true
        }
        Ok(_) => {
            tracing::info!("No Slack token stored; starting signed out");
            false
        }
        Err(err) => {
            tracing::warn!(error = %err, "Failed to load Slack token; starting signed out");
            false
        }
    }
}

/// Forgets the credential in memory and in the vault. The in-memory token is
/// cleared even when the vault delete fails.
pub fn sign_out(vault: &dyn SecretVault, client: &SlackClient) -> Result<(), VaultError> {
    client.set_token(None);
    let result = vault.delete(TOKEN_KEY);
    match &result {
        Ok(()) => tracing::info!("Signed out of Slack"),
        Err(err) => tracing::warn!(error = %err, "Signed out in memory but vault delete failed"),
    }
    result
}
