use sashimi_core::vault::SecretVault;
use sashimi_core::{FileVault, TOKEN_KEY};
use sashimi_protocol::{Method, Request, Response, PROTOCOL_VERSION};
use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};
use tempfile::TempDir;

struct DaemonGuard {
    child: Child,
}

impl Drop for DaemonGuard {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn spawn_daemon(home: &Path) -> Child {
    spawn_daemon_with(home, &[])
}

fn spawn_daemon_with(home: &Path, extra_env: &[(&str, &str)]) -> Child {
    Command::new(env!("CARGO_BIN_EXE_sashimi-daemon"))
        .env("HOME", home)
        .envs(extra_env.iter().copied())
        .env("SASHIMI_VAULT_BACKEND", "file")
        .env_remove("SASHIMI_DAEMON_SOCKET")
        .env_remove("SASHIMI_SLACK_CLIENT_ID")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("Failed to spawn sashimi-daemon")
}

fn sashimi_dir(home: &Path) -> PathBuf {
    home.join(".sashimi")
}

fn write_settings(home: &Path, watched_file: &Path) {
    let dir = sashimi_dir(home);
    std::fs::create_dir_all(&dir).expect("create settings dir");
    let settings = serde_json::json!({
        "watched_file": watched_file.to_string_lossy(),
        "sync_on_start": false,
    });
    std::fs::write(dir.join("settings.json"), settings.to_string()).expect("write settings");
}

fn wait_for_socket(path: &Path, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if path.exists() {
            return;
        }
        sleep(Duration::from_millis(25));
    }
    panic!("Timed out waiting for daemon socket at {}", path.display());
}

fn send_request(socket: &Path, request: Request) -> Response {
    let mut stream = UnixStream::connect(socket).expect("Failed to connect to daemon socket");
    serde_json::to_writer(&mut stream, &request).expect("Failed to serialize request");
    stream.write_all(b"\n").expect("Failed to write request");
    stream.flush().ok();
    read_response(&mut stream)
}

fn read_response(stream: &mut UnixStream) -> Response {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        let n = stream.read(&mut chunk).expect("Failed to read response");
        if n == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..n]);
        if chunk[..n].contains(&b'\n') {
            break;
        }
    }

    let response_bytes = match buffer.iter().position(|b| *b == b'\n') {
        Some(index) => &buffer[..index],
        None => buffer.as_slice(),
    };

    serde_json::from_slice(response_bytes).expect("Failed to parse response JSON")
}

fn health(socket: &Path) -> serde_json::Value {
    let response = send_request(socket, Request::new(Method::GetHealth, None).with_id("health"));
    assert!(response.ok, "health response was not ok");
    response.data.expect("health payload")
}

fn ingest(socket: &Path, url: &str) -> Response {
    send_request(
        socket,
        Request::new(
            Method::IngestRedirect,
            Some(serde_json::json!({ "url": url })),
        ),
    )
}

#[test]
fn daemon_ipc_sign_in_and_sign_out_smoke() {
    let home = TempDir::new().expect("Failed to create temp HOME");
    let teams_dir = home.path().join("teams");
    std::fs::create_dir_all(&teams_dir).expect("create watched dir");
    let watched_file = teams_dir.join("storage.json");
    write_settings(home.path(), &watched_file);

    let socket = sashimi_dir(home.path()).join("daemon.sock");
    let _guard = DaemonGuard {
        child: spawn_daemon(home.path()),
    };
    wait_for_socket(&socket, Duration::from_secs(2));

    let before = health(&socket);
    assert_eq!(before["status"], "ok");
    assert_eq!(before["protocol_version"], PROTOCOL_VERSION);
    assert_eq!(before["has_token"], false);
    assert_eq!(before["watching"], true);
    assert_eq!(
        before["watched_file"].as_str(),
        Some(watched_file.to_string_lossy().as_ref())
    );

    let stored = ingest(&socket, "sashimi://auth?token=abc123");
    assert!(stored.ok, "ingest response was not ok");
    let data = stored.data.expect("ingest payload");
    assert_eq!(data["stored"], true);
    assert_eq!(data["warnings"].as_array().map(Vec::len), Some(0));
    assert_eq!(health(&socket)["has_token"], true);

    let vault = FileVault::new(sashimi_dir(home.path()).join("vault.json"));
    assert_eq!(vault.get(TOKEN_KEY), Ok(Some("abc123".to_string())));

    let signed_out = send_request(&socket, Request::new(Method::SignOut, None));
    assert!(signed_out.ok, "sign_out response was not ok");
    assert_eq!(health(&socket)["has_token"], false);
    assert_eq!(vault.get(TOKEN_KEY), Ok(None));
}

#[test]
fn daemon_ipc_reports_redirect_errors() {
    let home = TempDir::new().expect("Failed to create temp HOME");
    let watched_file = home.path().join("storage.json");
    write_settings(home.path(), &watched_file);

    let socket = sashimi_dir(home.path()).join("daemon.sock");
    let _guard = DaemonGuard {
        child: spawn_daemon(home.path()),
    };
    wait_for_socket(&socket, Duration::from_secs(2));

    let missing_query = ingest(&socket, "sashimi://auth");
    assert!(!missing_query.ok);
    assert_eq!(
        missing_query.error.expect("error").code,
        "missing_query_parameters"
    );

    let missing_token = ingest(&socket, "sashimi://auth?state=xyz");
    assert_eq!(
        missing_token.error.expect("error").code,
        "missing_token_parameter"
    );
    assert_eq!(health(&socket)["has_token"], false);

    let wrong_route = ingest(&socket, "sashimi://elsewhere?token=abc123");
    assert!(wrong_route.ok, "wrong route should still store the token");
    let data = wrong_route.data.expect("ingest payload");
    assert_eq!(data["warnings"].as_array().map(Vec::len), Some(1));
    assert_eq!(health(&socket)["has_token"], true);

    let authorise = send_request(&socket, Request::new(Method::Authorise, None));
    assert_eq!(authorise.error.expect("error").code, "client_id_missing");

    let mut mismatched = Request::new(Method::GetHealth, None);
    mismatched.protocol_version = PROTOCOL_VERSION + 1;
    let response = send_request(&socket, mismatched);
    assert_eq!(response.error.expect("error").code, "protocol_mismatch");
}

#[test]
fn daemon_starts_watching_once_directory_appears() {
    let home = TempDir::new().expect("Failed to create temp HOME");
    let teams_dir = home.path().join("not-yet-installed");
    let watched_file = teams_dir.join("storage.json");
    write_settings(home.path(), &watched_file);

    let socket = sashimi_dir(home.path()).join("daemon.sock");
    let _guard = DaemonGuard {
        child: spawn_daemon_with(home.path(), &[("SASHIMI_WATCH_RETRY_MS", "50")]),
    };
    wait_for_socket(&socket, Duration::from_secs(2));

    let before = health(&socket);
    assert_eq!(before["watching"], false);
    assert!(before["watch_error"].is_string());

    std::fs::create_dir_all(&teams_dir).expect("create watched dir");

    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let current = health(&socket);
        if current["watching"] == true {
            assert!(current["watch_error"].is_null());
            break;
        }
        assert!(
            Instant::now() < deadline,
            "daemon never started watching {}",
            watched_file.display()
        );
        sleep(Duration::from_millis(50));
    }
}
