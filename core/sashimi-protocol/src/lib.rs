//! IPC protocol types and validation for sashimi-daemon.
//!
//! Shared by the daemon and `sashimi-link` to prevent schema drift. The daemon
//! remains the authority on validation; clients reuse the same types to build
//! requests. Wire format: one JSON object per line, one request per connection.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const PROTOCOL_VERSION: u32 = 1;
pub const MAX_REQUEST_BYTES: usize = 1024 * 1024; // 1MB
pub const MAX_REDIRECT_URL_BYTES: usize = 8 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    GetHealth,
    IngestRedirect,
    Authorise,
    SignOut,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Request {
    pub protocol_version: u32,
    pub method: Method,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
}

impl Request {
    pub fn new(method: Method, params: Option<Value>) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            method,
            id: None,
            params,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Response {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl Response {
    pub fn ok(id: Option<String>, data: Value) -> Self {
        Self {
            ok: true,
            id,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(id: Option<String>, code: &str, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            id,
            data: None,
            error: Some(ErrorInfo::new(code, message)),
        }
    }

    pub fn error_with_info(id: Option<String>, error: ErrorInfo) -> Self {
        Self {
            ok: false,
            id,
            data: None,
            error: Some(error),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Method params
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IngestRedirectParams {
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthoriseParams {
    #[serde(default)]
    pub scope: Option<String>,
}

/// Only structural checks happen here. Whether the URL is a usable sign-in
/// link is decided by the daemon's token ingestion.
pub fn parse_ingest_redirect(params: Option<Value>) -> Result<IngestRedirectParams, ErrorInfo> {
    let params = params.ok_or_else(|| ErrorInfo::new("invalid_params", "url is required"))?;
    let parsed: IngestRedirectParams = serde_json::from_value(params).map_err(|err| {
        ErrorInfo::new(
            "invalid_params",
            format!("ingest_redirect params are invalid: {}", err),
        )
    })?;
    if parsed.url.trim().is_empty() {
        return Err(ErrorInfo::new("missing_field", "url is required"));
    }
    if parsed.url.len() > MAX_REDIRECT_URL_BYTES {
        return Err(ErrorInfo::new(
            "invalid_params",
            format!("url must be {} bytes or fewer", MAX_REDIRECT_URL_BYTES),
        ));
    }
    Ok(parsed)
}

pub fn parse_authorise(params: Option<Value>) -> Result<AuthoriseParams, ErrorInfo> {
    let Some(params) = params else {
        return Ok(AuthoriseParams::default());
    };
    let mut parsed: AuthoriseParams = serde_json::from_value(params).map_err(|err| {
        ErrorInfo::new(
            "invalid_params",
            format!("authorise params are invalid: {}", err),
        )
    })?;
    parsed.scope = parsed
        .scope
        .map(|scope| scope.trim().to_string())
        .filter(|scope| !scope.is_empty());
    Ok(parsed)
}
