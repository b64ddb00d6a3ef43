//! Shared value types for the observe → classify → sync pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_STATUS_EMOJI: &str = ":sushi:";
pub const DEFAULT_STATUS_TEXT: &str = "In a call";

/// Call state inferred from the watched file. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallState {
    /// No classification. Partial writes and unrecognised values land here.
    #[default]
    Unknown,
    InCall,
    NotInCall,
}

impl std::fmt::Display for CallState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallState::Unknown => write!(f, "unknown"),
            CallState::InCall => write!(f, "in_call"),
            CallState::NotInCall => write!(f, "not_in_call"),
        }
    }
}

/// The custom status the user wants shown while in a call.
///
/// Either half may be unset; `emoji()` and `text()` apply the defaults.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatusProfile {
    #[serde(default)]
    pub emoji: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    /// Seconds after the push at which Slack should drop the status.
    #[serde(default)]
    pub expires_in_secs: Option<u64>,
}

impl StatusProfile {
    pub fn new(emoji: Option<String>, text: Option<String>) -> Self {
        Self {
            emoji,
            text,
            expires_in_secs: None,
        }
    }

    pub fn with_expiry(mut self, expires_in_secs: Option<u64>) -> Self {
        self.expires_in_secs = expires_in_secs;
        self
    }

    pub fn emoji(&self) -> &str {
        self.emoji.as_deref().unwrap_or(DEFAULT_STATUS_EMOJI)
    }

    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or(DEFAULT_STATUS_TEXT)
    }
}

/// One filesystem notification for the watched path, with the contents read
/// at delivery time.
#[derive(Debug, Clone)]
pub struct WatchEvent {
    pub source_path: PathBuf,
    pub raw_contents: Vec<u8>,
    pub sequence_id: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_defaults_apply_per_field() {
        let profile = StatusProfile::new(None, Some("Heads down".to_string()));
        assert_eq!(profile.emoji(), ":sushi:");
        assert_eq!(profile.text(), "Heads down");

        let profile = StatusProfile::default();
        assert_eq!(profile.emoji(), DEFAULT_STATUS_EMOJI);
        assert_eq!(profile.text(), DEFAULT_STATUS_TEXT);
    }

    #[test]
    fn call_state_defaults_to_unknown() {
        assert_eq!(CallState::default(), CallState::Unknown);
        assert_eq!(CallState::InCall.to_string(), "in_call");
    }
}
