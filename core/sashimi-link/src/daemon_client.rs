//! Client helper for talking to sashimi-daemon.
//!
//! The daemon owns the Slack client and the vault, so every command here is a
//! single request over the socket. Failures are surfaced to the caller; there
//! is no fallback that touches the vault directly.

use sashimi_core::StorageConfig;
use sashimi_protocol::{Method, Request, Response, MAX_REQUEST_BYTES};
use serde_json::Value;
use std::env;
use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

const SOCKET_ENV: &str = "SASHIMI_DAEMON_SOCKET";
const READ_TIMEOUT_MS: u64 = 3000;
const WRITE_TIMEOUT_MS: u64 = 600;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Sashimi isn't running ({0})")]
    Unavailable(String),

    #[error("{message}")]
    Rejected { code: String, message: String },

    #[error("Unexpected daemon response: {0}")]
    Protocol(String),
}

impl ClientError {
    pub fn code(&self) -> Option<&str> {
        match self {
            ClientError::Rejected { code, .. } => Some(code),
            _ => None,
        }
    }
}

pub fn ingest_redirect(url: &str) -> Result<Value, ClientError> {
    call(
        Method::IngestRedirect,
        Some(serde_json::json!({ "url": url })),
    )
}

pub fn authorise(scope: Option<&str>) -> Result<Value, ClientError> {
    let params = scope.map(|scope| serde_json::json!({ "scope": scope }));
    call(Method::Authorise, params)
}

pub fn sign_out() -> Result<Value, ClientError> {
    call(Method::SignOut, None)
}

pub fn health() -> Result<Value, ClientError> {
    call(Method::GetHealth, None)
}

fn call(method: Method, params: Option<Value>) -> Result<Value, ClientError> {
    let request = Request::new(method, params).with_id(request_id());
    let response = send_request(request)?;
    if response.ok {
        return Ok(response.data.unwrap_or(Value::Null));
    }
    Err(match response.error {
        Some(err) => ClientError::Rejected {
            code: err.code,
            message: err.message,
        },
        None => ClientError::Protocol("error response without details".to_string()),
    })
}

fn request_id() -> String {
    format!("link-{}", std::process::id())
}

fn socket_path() -> Result<PathBuf, ClientError> {
    if let Ok(path) = env::var(SOCKET_ENV) {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }
    StorageConfig::from_home()
        .map(|storage| storage.socket_path())
        .map_err(|err| ClientError::Unavailable(err.to_string()))
}

fn send_request(request: Request) -> Result<Response, ClientError> {
    let socket = socket_path()?;
    let mut stream = UnixStream::connect(&socket).map_err(|err| {
        ClientError::Unavailable(format!("failed to connect to {}: {}", socket.display(), err))
    })?;
    let _ = stream.set_read_timeout(Some(Duration::from_millis(READ_TIMEOUT_MS)));
    let _ = stream.set_write_timeout(Some(Duration::from_millis(WRITE_TIMEOUT_MS)));

    serde_json::to_writer(&mut stream, &request)
        .map_err(|err| ClientError::Unavailable(format!("failed to write request: {}", err)))?;
    stream
        .write_all(b"\n")
        .map_err(|err| ClientError::Unavailable(format!("failed to flush request: {}", err)))?;
    stream.flush().ok();

    read_response(&mut stream)
}

fn read_response(stream: &mut UnixStream) -> Result<Response, ClientError> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                buffer.extend_from_slice(&chunk[..n]);
                if buffer.len() > MAX_REQUEST_BYTES {
                    return Err(ClientError::Protocol(
                        "response exceeded maximum size".to_string(),
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
                return Err(ClientError::Unavailable(
                    "timed out waiting for daemon response".to_string(),
                ));
            }
            Err(err) => {
                return Err(ClientError::Unavailable(format!(
                    "failed to read response: {}",
                    err
                )))
            }
        }
    }

    let response_bytes = match buffer.iter().position(|b| *b == b'\n') {
        Some(index) => &buffer[..index],
        None => buffer.as_slice(),
    };

    if response_bytes.is_empty() {
        return Err(ClientError::Protocol("daemon response was empty".to_string()));
    }

    serde_json::from_slice(response_bytes)
        .map_err(|err| ClientError::Protocol(format!("invalid response JSON: {}", err)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::net::UnixListener;
    use std::sync::{Arc, Mutex, OnceLock};
    use tempfile::TempDir;

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    struct EnvGuard {
        key: &'static str,
        prior: Option<String>,
    }

    impl EnvGuard {
        fn set(key: &'static str, value: &str) -> Self {
            let prior = std::env::var(key).ok();
            std::env::set_var(key, value);
            Self { key, prior }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            if let Some(value) = &self.prior {
                std::env::set_var(self.key, value);
            } else {
                std::env::remove_var(self.key);
            }
        }
    }

    fn env_lock() -> std::sync::MutexGuard<'static, ()> {
        ENV_LOCK
            .get_or_init(|| Mutex::new(()))
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn read_request(stream: &mut UnixStream) -> Option<Request> {
        let mut buffer = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            match stream.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => {
                    buffer.extend_from_slice(&chunk[..n]);
                    if buffer.contains(&b'\n') {
                        break;
                    }
                }
                Err(_) => return None,
            }
        }
        let end = buffer.iter().position(|b| *b == b'\n').unwrap_or(buffer.len());
        serde_json::from_slice(&buffer[..end]).ok()
    }

    /// Answers a single request with `response` and records what was asked.
    fn serve_once(
        listener: UnixListener,
        response: Response,
    ) -> (std::thread::JoinHandle<()>, Arc<Mutex<Option<Request>>>) {
        let captured = Arc::new(Mutex::new(None));
        let captured_clone = Arc::clone(&captured);
        let server = std::thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                *captured_clone.lock().unwrap() = read_request(&mut stream);
                let mut payload = serde_json::to_vec(&response).unwrap();
                payload.push(b'\n');
                let _ = stream.write_all(&payload);
            }
        });
        (server, captured)
    }

    #[test]
    fn ingest_redirect_sends_url_and_returns_data() {
        let _guard = env_lock();
        let dir = TempDir::new().unwrap();
        let socket = dir.path().join("daemon.sock");
        let listener = UnixListener::bind(&socket).unwrap();
        let (server, captured) = serve_once(
            listener,
            Response::ok(None, serde_json::json!({"stored": true, "warnings": []})),
        );
        let _socket_guard = EnvGuard::set(SOCKET_ENV, socket.to_str().unwrap());

        let data = ingest_redirect("sashimi://auth?token=abc123").unwrap();
        server.join().unwrap();

        assert_eq!(data["stored"], true);
        let request = captured.lock().unwrap().take().expect("captured request");
        assert_eq!(request.method, Method::IngestRedirect);
        assert_eq!(
            request.params.unwrap()["url"],
            "sashimi://auth?token=abc123"
        );
    }

    #[test]
    fn daemon_errors_keep_their_code() {
        let _guard = env_lock();
        let dir = TempDir::new().unwrap();
        let socket = dir.path().join("daemon.sock");
        let listener = UnixListener::bind(&socket).unwrap();
        let (server, _) = serve_once(
            listener,
            Response::error(None, "missing_token_parameter", "no token"),
        );
        let _socket_guard = EnvGuard::set(SOCKET_ENV, socket.to_str().unwrap());

        let err = ingest_redirect("sashimi://auth?x=1").unwrap_err();
        server.join().unwrap();

        assert_eq!(err.code(), Some("missing_token_parameter"));
        assert_eq!(err.to_string(), "no token");
    }

    #[test]
    fn authorise_omits_params_without_scope() {
        let _guard = env_lock();
        let dir = TempDir::new().unwrap();
        let socket = dir.path().join("daemon.sock");
        let listener = UnixListener::bind(&socket).unwrap();
        let (server, captured) = serve_once(
            listener,
            Response::ok(None, serde_json::json!({"opened": true})),
        );
        let _socket_guard = EnvGuard::set(SOCKET_ENV, socket.to_str().unwrap());

        authorise(None).unwrap();
        server.join().unwrap();

        let request = captured.lock().unwrap().take().expect("captured request");
        assert_eq!(request.method, Method::Authorise);
        assert!(request.params.is_none());
    }

    #[test]
    fn missing_daemon_is_unavailable() {
        let _guard = env_lock();
        let dir = TempDir::new().unwrap();
        let socket = dir.path().join("absent.sock");
        let _socket_guard = EnvGuard::set(SOCKET_ENV, socket.to_str().unwrap());

        let err = health().unwrap_err();
        assert!(matches!(err, ClientError::Unavailable(_)));
        assert_eq!(err.code(), None);
    }
}
