//! Sashimi daemon entrypoint.
//!
//! A small long-running service: it watches the call-state file, drives the
//! sync controller, and owns the one Slack client. `sashimi-link` talks to it
//! over a Unix socket to deliver sign-in redirects and account commands.

use fs_err as fs;
use std::env;
use std::io::{Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use sashimi_core::vault::open_vault;
use sashimi_core::{
    classify, load_credential, FileObserver, ObserverOptions, Settings, SettingsStore, SlackClient,
    StorageConfig, SyncController, SyncError,
};
use sashimi_protocol::{
    parse_authorise, parse_ingest_redirect, ErrorInfo, Method, Request, Response,
    MAX_REQUEST_BYTES, PROTOCOL_VERSION,
};

mod state;

use state::{SharedState, WatchStatus};

const SOCKET_ENV: &str = "SASHIMI_DAEMON_SOCKET";
const WATCH_RETRY_ENV: &str = "SASHIMI_WATCH_RETRY_MS";
const DEFAULT_WATCH_RETRY_SECS: u64 = 30;
const READ_TIMEOUT_SECS: u64 = 2;
const READ_CHUNK_SIZE: usize = 4096;

fn main() {
    init_logging();

    let storage = match StorageConfig::from_home() {
        Ok(storage) => storage,
        Err(err) => {
            error!(error = %err, "Failed to resolve storage root");
            std::process::exit(1);
        }
    };

    let socket_path = daemon_socket_path(&storage);

    if let Err(err) = prepare_socket_dir(&socket_path) {
        error!(error = %err, "Failed to prepare daemon socket directory");
        std::process::exit(1);
    }

    if let Err(err) = remove_existing_socket(&socket_path) {
        error!(error = %err, path = %socket_path.display(), "Failed to remove existing socket");
        std::process::exit(1);
    }

    let listener = match UnixListener::bind(&socket_path) {
        Ok(listener) => listener,
        Err(err) => {
            error!(error = %err, path = %socket_path.display(), "Failed to bind daemon socket");
            std::process::exit(1);
        }
    };

    info!(path = %socket_path.display(), "Sashimi daemon started");

    let settings_store = SettingsStore::new(storage.settings_file());
    let settings = settings_store
        .load()
        .apply_env_overrides(|key| env::var(key).ok());
    info!(
        vault_backend = %settings.vault_backend,
        client_id_configured = settings.client_id().is_some(),
        sync_on_start = settings.sync_on_start,
        "Settings loaded"
    );

    let client = match SlackClient::new(settings.client_id()) {
        Ok(client) => Arc::new(client),
        Err(err) => {
            error!(error = %err, "Failed to initialize Slack client");
            std::process::exit(1);
        }
    };

    let vault = open_vault(settings.vault_backend, storage.vault_file());
    load_credential(vault.as_ref(), &client);

    let shared_state = Arc::new(SharedState::new(
        Arc::clone(&client),
        vault,
        settings_store.clone(),
    ));

    // Held for the process lifetime; dropping it tears the watch down.
    let _observer = start_observer(&settings, &settings_store, &client, &shared_state);

    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let state = Arc::clone(&shared_state);
                thread::spawn(move || handle_connection(stream, state));
            }
            Err(err) => {
                warn!(error = %err, "Failed to accept daemon connection");
            }
        }
    }
}

/// Failing to watch is not fatal: the daemon keeps serving sign-in and
/// account requests with presence sync inactive, and keeps retrying in the
/// background so sync starts once the watched directory appears.
fn start_observer(
    settings: &Settings,
    settings_store: &SettingsStore,
    client: &Arc<SlackClient>,
    state: &Arc<SharedState>,
) -> Option<FileObserver> {
    let Some(path) = settings.watched_file() else {
        error!("No watched file configured and no platform default; presence sync inactive");
        state.set_watch_status(WatchStatus {
            watching: false,
            watched_file: None,
            error: Some("no watched file".to_string()),
        });
        return None;
    };

    let emit_initial = settings.sync_on_start;
    match watch_file(&path, emit_initial, settings_store, client) {
        Ok(observer) => {
            state.set_watch_status(watching(&path));
            Some(observer)
        }
        Err(err) => {
            error!(
                error = %err,
                path = %path.display(),
                "Failed to watch call state file; presence sync inactive until it can be watched"
            );
            state.set_watch_status(not_watching(&path, &err));

            let settings_store = settings_store.clone();
            let client = Arc::clone(client);
            let state = Arc::clone(state);
            let interval = watch_retry_interval();
            let spawned = thread::Builder::new()
                .name("sashimi-watch-retry".to_string())
                .spawn(move || {
                    let observer = keep_trying(
                        || watch_file(&path, emit_initial, &settings_store, &client),
                        interval,
                        |err| state.set_watch_status(not_watching(&path, err)),
                    );
                    info!(path = %path.display(), "Call state file is now watched");
                    state.set_watch_status(watching(&path));
                    // The observer lives as long as this thread.
                    let _observer = observer;
                    loop {
                        thread::park();
                    }
                });
            if let Err(err) = spawned {
                warn!(error = %err, "Failed to spawn watch retry thread");
            }
            None
        }
    }
}

fn watch_file(
    path: &Path,
    emit_initial: bool,
    settings_store: &SettingsStore,
    client: &Arc<SlackClient>,
) -> Result<FileObserver, SyncError> {
    let mut controller = SyncController::new(Arc::clone(client), settings_store.clone());
    let options = ObserverOptions { emit_initial };
    FileObserver::start(path.to_path_buf(), options, move |event| {
        let call_state = classify(&event.raw_contents);
        tracing::debug!(
            sequence_id = event.sequence_id,
            bytes = event.raw_contents.len(),
            call_state = %call_state,
            "Watch event"
        );
        controller.on_event(call_state);
    })
}

fn watching(path: &Path) -> WatchStatus {
    WatchStatus {
        watching: true,
        watched_file: Some(path.to_path_buf()),
        error: None,
    }
}

fn not_watching(path: &Path, err: &SyncError) -> WatchStatus {
    WatchStatus {
        watching: false,
        watched_file: Some(path.to_path_buf()),
        error: Some(err.to_string()),
    }
}

fn watch_retry_interval() -> Duration {
    env::var(WATCH_RETRY_ENV)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(DEFAULT_WATCH_RETRY_SECS))
}

/// Calls `attempt` every `interval` until it succeeds.
fn keep_trying<T, E, A, F>(mut attempt: A, interval: Duration, mut on_error: F) -> T
where
    A: FnMut() -> Result<T, E>,
    F: FnMut(&E),
    E: std::fmt::Display,
{
    loop {
        thread::sleep(interval);
        match attempt() {
            Ok(value) => return value,
            Err(err) => {
                tracing::debug!(error = %err, "Watch retry failed");
                on_error(&err);
            }
        }
    }
}

fn init_logging() {
    let debug_enabled = env::var("SASHIMI_DEBUG_LOG")
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    let filter = if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn daemon_socket_path(storage: &StorageConfig) -> PathBuf {
    match env::var(SOCKET_ENV) {
        Ok(path) if !path.trim().is_empty() => PathBuf::from(path),
        _ => storage.socket_path(),
    }
}

fn prepare_socket_dir(socket_path: &Path) -> Result<(), String> {
    let parent = socket_path
        .parent()
        .ok_or_else(|| "Socket path has no parent".to_string())?;
    fs::create_dir_all(parent).map_err(|err| format!("Failed to create socket directory: {}", err))
}

fn remove_existing_socket(socket_path: &Path) -> Result<(), String> {
    if socket_path.exists() {
        fs::remove_file(socket_path)
            .map_err(|err| format!("Failed to remove existing socket: {}", err))?;
    }
    Ok(())
}

fn handle_connection(mut stream: UnixStream, state: Arc<SharedState>) {
    let request = match read_request(&mut stream) {
        Ok(request) => request,
        Err(err) => {
            warn!(code = %err.code, message = %err.message, "Failed to read request");
            let response = Response::error_with_info(None, err);
            let _ = write_response(&mut stream, response);
            return;
        }
    };

    tracing::debug!(method = ?request.method, id = ?request.id, "Daemon request received");
    let response = handle_request(request, &state);
    let _ = write_response(&mut stream, response);
}

fn read_request(stream: &mut UnixStream) -> Result<Request, ErrorInfo> {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(READ_TIMEOUT_SECS)));

    let mut buffer = Vec::new();
    let mut chunk = [0u8; READ_CHUNK_SIZE];

    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                buffer.extend_from_slice(&chunk[..n]);
                if buffer.len() > MAX_REQUEST_BYTES {
                    return Err(ErrorInfo::new(
                        "request_too_large",
                        "request exceeded maximum size",
                    ));
                }
                if chunk[..n].contains(&b'\n') {
                    break;
                }
            }
            Err(err)
                if matches!(
                    err.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) =>
            {
                return Err(ErrorInfo::new("read_timeout", "request timed out"));
            }
            Err(err) => {
                return Err(ErrorInfo::new(
                    "read_error",
                    format!("failed to read request: {}", err),
                ));
            }
        }
    }

    let request_bytes = match buffer.iter().position(|b| *b == b'\n') {
        Some(index) => &buffer[..index],
        None => buffer.as_slice(),
    };

    if request_bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(ErrorInfo::new("empty_request", "request body was empty"));
    }

    serde_json::from_slice(request_bytes).map_err(|err| {
        ErrorInfo::new(
            "invalid_json",
            format!("request was not valid JSON: {}", err),
        )
    })
}

fn handle_request(request: Request, state: &SharedState) -> Response {
    if request.protocol_version != PROTOCOL_VERSION {
        return Response::error(
            request.id,
            "protocol_mismatch",
            "unsupported protocol version",
        );
    }

    match request.method {
        Method::GetHealth => {
            let watch = state.watch_status();
            Response::ok(
                request.id,
                serde_json::json!({
                    "status": "ok",
                    "pid": std::process::id(),
                    "version": env!("CARGO_PKG_VERSION"),
                    "protocol_version": PROTOCOL_VERSION,
                    "has_token": state.has_token(),
                    "watching": watch.watching,
                    "watched_file": watch.watched_file,
                    "watch_error": watch.error,
                }),
            )
        }
        Method::IngestRedirect => {
            let params = match parse_ingest_redirect(request.params) {
                Ok(params) => params,
                Err(err) => return Response::error_with_info(request.id, err),
            };
            match state.ingest_redirect(&params.url) {
                Ok(outcome) => Response::ok(
                    request.id,
                    serde_json::json!({
                        "stored": outcome.stored(),
                        "warnings": outcome.warnings(),
                    }),
                ),
                Err(err) => Response::error(request.id, err.code(), err.to_string()),
            }
        }
        Method::Authorise => {
            let params = match parse_authorise(request.params) {
                Ok(params) => params,
                Err(err) => return Response::error_with_info(request.id, err),
            };
            match state.authorise(params.scope) {
                Ok(scope) => Response::ok(request.id, serde_json::json!({ "opened": true, "scope": scope })),
                Err(err) => {
                    warn!(error = %err, "Authorisation could not be started");
                    Response::error(request.id, authorise_error_code(&err), err.to_string())
                }
            }
        }
        Method::SignOut => {
            let vault_error = state.sign_out().err().map(|err| err.to_string());
            Response::ok(
                request.id,
                serde_json::json!({ "signed_out": true, "vault_error": vault_error }),
            )
        }
    }
}

fn authorise_error_code(err: &SyncError) -> &'static str {
    match err {
        SyncError::ClientIdMissing => "client_id_missing",
        SyncError::BrowserOpen { .. } => "browser_open_failed",
        _ => "authorise_failed",
    }
}

fn write_response(stream: &mut UnixStream, response: Response) -> std::io::Result<()> {
    serde_json::to_writer(&mut *stream, &response)?;
    stream.write_all(b"\n")?;
    stream.flush()?;
    Ok(())
}
