//! File state observer.
//!
//! Watches the parent directory of one file (so the file may be created
//! later, or replaced by an atomic rename) and emits a `WatchEvent` for every
//! notification that names it. No debouncing happens here; repeated events
//! are absorbed by the controller's idempotence.
//!
//! The watch is owned by `FileObserver`: dropping it stops notifications,
//! which ends the worker thread.

use fs_err as fs;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use crate::error::{Result, SyncError};
use crate::types::WatchEvent;

#[derive(Debug, Clone, Copy, Default)]
pub struct ObserverOptions {
    /// Deliver the file's current contents once before any notification.
    pub emit_initial: bool,
}

pub struct FileObserver {
    path: PathBuf,
    watcher: Option<RecommendedWatcher>,
    worker: Option<JoinHandle<()>>,
}

impl FileObserver {
    /// Starts watching `path`, calling `handler` serially on a background
    /// thread for each event.
    ///
    /// Fails only if the watch itself cannot be established; a missing file
    /// is fine as long as its directory exists.
    pub fn start<F>(path: PathBuf, options: ObserverOptions, handler: F) -> Result<Self>
    where
        F: FnMut(WatchEvent) + Send + 'static,
    {
        let parent = path
            .parent()
            .filter(|parent| parent.is_dir())
            .ok_or_else(|| SyncError::WatchParentMissing { path: path.clone() })?
            .to_path_buf();
        let file_name = path
            .file_name()
            .map(|name| name.to_os_string())
            .ok_or_else(|| SyncError::WatchParentMissing { path: path.clone() })?;

        let (tx, rx) = mpsc::channel::<Event>();
        let mut watcher =
            notify::recommended_watcher(move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let _ = tx.send(event);
                }
                Err(err) => tracing::warn!(error = %err, "File watch error"),
            })
            .map_err(|source| SyncError::Watch {
                path: path.clone(),
                source,
            })?;

        watcher
            .watch(&parent, RecursiveMode::NonRecursive)
            .map_err(|source| SyncError::Watch {
                path: path.clone(),
                source,
            })?;

        let worker_path = path.clone();
        let worker = thread::Builder::new()
            .name("sashimi-observer".to_string())
            .spawn(move || run_worker(worker_path, file_name, options, rx, handler))
            .map_err(|source| SyncError::Io {
                context: "spawning observer thread".to_string(),
                source,
            })?;

        tracing::info!(path = %path.display(), "Watching call state file");
        Ok(Self {
            path,
            watcher: Some(watcher),
            worker: Some(worker),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileObserver {
    fn drop(&mut self) {
        // Dropping the watcher drops the sender, which ends the worker loop.
        self.watcher.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::warn!(path = %self.path.display(), "Observer thread panicked");
            }
        }
    }
}

fn run_worker<F>(
    path: PathBuf,
    file_name: OsString,
    options: ObserverOptions,
    rx: mpsc::Receiver<Event>,
    mut handler: F,
) where
    F: FnMut(WatchEvent),
{
    if options.emit_initial && path.exists() {
        if let Some(event) = read_event(&path, 0) {
            handler(event);
        }
    }

    let mut sequence_id = 0u64;
    while let Ok(event) = rx.recv() {
        if !is_relevant(&event, &file_name) {
            continue;
        }
        sequence_id += 1;
        if let Some(watch_event) = read_event(&path, sequence_id) {
            handler(watch_event);
        }
    }
    tracing::debug!(path = %path.display(), "Observer stopped");
}

fn is_relevant(event: &Event, file_name: &OsString) -> bool {
    matches!(
        event.kind,
        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Any
    ) && event
        .paths
        .iter()
        .any(|candidate| candidate.file_name() == Some(file_name.as_os_str()))
}

/// Reads the file for one notification. Read failures (file mid-replace,
/// permissions) skip the event.
fn read_event(path: &Path, sequence_id: u64) -> Option<WatchEvent> {
    match fs::read(path) {
        Ok(raw_contents) => Some(WatchEvent {
            source_path: path.to_path_buf(),
            raw_contents,
            sequence_id,
        }),
        Err(err) => {
            tracing::debug!(error = %err, sequence_id, "Skipping unreadable watch event");
            None
        }
    }
}
