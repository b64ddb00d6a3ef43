//! Maps raw watched-file contents to a `CallState`.
//!
//! Conservative rules: anything that is not clearly one of the two known
//! values is `Unknown`, which never drives a transition. Partial writes
//! therefore cannot cause a false status clear.

use crate::patterns::RE_APP_STATES;
use crate::types::CallState;

/// Value written while a call is in progress.
pub const IN_CALL_VALUE: &str = "InCall";
/// Value written once a call has ended.
pub const CALL_ENDED_VALUE: &str = "CallEnded";

/// Classifies file contents. Never panics, whatever the input.
pub fn classify(contents: &[u8]) -> CallState {
    let text = String::from_utf8_lossy(contents);
    match current_state_value(&text) {
        Some(IN_CALL_VALUE) => CallState::InCall,
        Some(CALL_ENDED_VALUE) => CallState::NotInCall,
        _ => CallState::Unknown,
    }
}

/// The `states` field holds a comma-separated history; the last entry is the
/// current one.
fn current_state_value(text: &str) -> Option<&str> {
    let states = RE_APP_STATES.captures(text)?.get(1)?.as_str();
    states
        .rsplit(',')
        .map(str::trim)
        .find(|segment| !segment.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_call_marker_yields_in_call() {
        let contents = br#"{"theme":"dark","appStates":{"states":"Idle,InCall"},"x":1}"#;
        assert_eq!(classify(contents), CallState::InCall);
    }

    #[test]
    fn call_ended_marker_yields_not_in_call() {
        let contents = br#"{"appStates":{"states":"InCall,CallEnded"}}"#;
        assert_eq!(classify(contents), CallState::NotInCall);
    }

    #[test]
    fn single_value_without_history() {
        assert_eq!(
            classify(br#"{"appStates":{"states":"InCall"}}"#),
            CallState::InCall
        );
    }

    #[test]
    fn tolerates_whitespace_and_sibling_keys() {
        let contents = b"{\n  \"appStates\" : {\n    \"lastUpdated\": 5,\n    \"states\" : \"Idle, CallEnded\"\n  }\n}";
        assert_eq!(classify(contents), CallState::NotInCall);
    }

    #[test]
    fn missing_marker_is_unknown() {
        assert_eq!(classify(br#"{"states":"InCall"}"#), CallState::Unknown);
        assert_eq!(classify(b""), CallState::Unknown);
    }

    #[test]
    fn unrecognised_value_is_unknown() {
        assert_eq!(
            classify(br#"{"appStates":{"states":"Idle,Available"}}"#),
            CallState::Unknown
        );
    }

    #[test]
    fn comparison_is_case_sensitive() {
        assert_eq!(
            classify(br#"{"appStates":{"states":"incall"}}"#),
            CallState::Unknown
        );
    }

    #[test]
    fn truncated_write_is_unknown() {
        assert_eq!(
            classify(br#"{"appStates":{"states":"Idle,InCa"#),
            CallState::Unknown
        );
        assert_eq!(classify(br#"{"appStates":{"sta"#), CallState::Unknown);
    }

    #[test]
    fn invalid_utf8_does_not_panic() {
        let mut contents = br#"{"appStates":{"states":"InCall"}}"#.to_vec();
        contents.insert(0, 0xFF);
        contents.push(0xC3);
        assert_eq!(classify(&contents), CallState::InCall);
        assert_eq!(classify(&[0xFF, 0xFE, 0x00]), CallState::Unknown);
    }

    #[test]
    fn states_in_unrelated_object_is_ignored() {
        let contents = br#"{"appStates":{"nested":{"states":"InCall"}}}"#;
        assert_eq!(classify(contents), CallState::Unknown);
    }
}
