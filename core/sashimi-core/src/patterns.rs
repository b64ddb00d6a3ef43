//! Compiled regex patterns for scraping the watched state file.
//!
//! The file's schema is undocumented; only the `appStates.states` string is
//! consulted. Update these when the observed app changes its format.

use once_cell::sync::Lazy;
use regex::Regex;

/// `"appStates": { ... "states": "<value>" ... }`, tolerant of whitespace and
/// of sibling keys before `states`. Does not cross into nested objects.
pub static RE_APP_STATES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""appStates"\s*:\s*\{[^{}]*?"states"\s*:\s*"([^"]*)""#).unwrap()
});
