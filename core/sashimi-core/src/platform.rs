//! OS hand-offs that have no portable std API.

use std::process::Command;
use std::thread;

use crate::error::{Result, SyncError};

#[cfg(target_os = "macos")]
const OPENER: &str = "open";
#[cfg(target_os = "windows")]
const OPENER: &str = "explorer";
#[cfg(not(any(target_os = "macos", target_os = "windows")))]
const OPENER: &str = "xdg-open";

/// Asks the OS to open `url` in the default browser. Does not wait for the
/// browser; only a failure to launch the opener is reported.
pub fn open_url(url: &str) -> Result<()> {
    let mut child = Command::new(OPENER)
        .arg(url)
        .spawn()
        .map_err(|source| SyncError::BrowserOpen {
            url: url.to_string(),
            source,
        })?;

    // Reap the opener so a long-running daemon doesn't collect zombies.
    thread::spawn(move || {
        let _ = child.wait();
    });
    Ok(())
}
