//! End-to-end: file write → observer → classify → controller → Slack POST.

use sashimi_core::{
    classify, ingest_redirect, FileObserver, FileVault, ObserverOptions, SecretVault, Settings,
    SettingsStore, SlackClient, SyncController, TOKEN_KEY,
};
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

const IN_CALL: &str = r#"{"version":3,"appStates":{"states":"Idle,InCall"},"theme":"dark"}"#;
const CALL_ENDED: &str = r#"{"version":3,"appStates":{"states":"InCall,CallEnded"},"theme":"dark"}"#;

fn read_body(stream: &TcpStream) -> (String, String) {
    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let mut request_line = String::new();
    reader.read_line(&mut request_line).unwrap();

    let mut content_length = 0usize;
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((key, value)) = line.split_once(':') {
            if key.trim().eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().unwrap_or(0);
            }
        }
    }

    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body).unwrap();
    (
        request_line.trim_end().to_string(),
        String::from_utf8(body).unwrap(),
    )
}

fn spawn_fake_slack() -> (String, mpsc::Receiver<(String, String)>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { break };
            let captured = read_body(&stream);
            let reply = "{\"ok\":true}";
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                reply.len(),
                reply
            );
            let _ = stream.write_all(response.as_bytes());
            if tx.send(captured).is_err() {
                break;
            }
        }
    });
    (base_url, rx)
}

struct Harness {
    _dir: TempDir,
    watched: std::path::PathBuf,
    settings: SettingsStore,
    client: Arc<SlackClient>,
    vault: FileVault,
    posts: mpsc::Receiver<(String, String)>,
    _observer: FileObserver,
}

fn start_harness() -> Harness {
    let dir = TempDir::new().unwrap();
    let watched = dir.path().join("storage.json");
    let settings = SettingsStore::new(dir.path().join("settings.json"));
    let vault = FileVault::new(dir.path().join("vault.json"));

    let (base_url, posts) = spawn_fake_slack();
    let client = Arc::new(SlackClient::new(None).unwrap().with_base_url(base_url));

    let mut controller = SyncController::new(Arc::clone(&client), settings.clone());
    let observer = FileObserver::start(watched.clone(), ObserverOptions::default(), move |event| {
        controller.on_event(classify(&event.raw_contents));
    })
    .unwrap();

    Harness {
        _dir: dir,
        watched,
        settings,
        client,
        vault,
        posts,
        _observer: observer,
    }
}

#[test]
fn call_start_and_end_push_set_then_clear() {
    let harness = start_harness();
    ingest_redirect("sashimi://auth?token=abc123", &harness.vault, &harness.client).unwrap();

    std::fs::write(&harness.watched, IN_CALL).unwrap();
    let (request_line, body) = harness
        .posts
        .recv_timeout(Duration::from_secs(5))
        .expect("set status POST");
    assert_eq!(request_line, "POST /api/users.profile.set HTTP/1.1");
    assert_eq!(body, r#"{"status_emoji":":sushi:","status_text":"In a call"}"#);

    std::fs::write(&harness.watched, CALL_ENDED).unwrap();
    let (_, body) = harness
        .posts
        .recv_timeout(Duration::from_secs(5))
        .expect("clear status POST");
    assert_eq!(body, r#"{"status_emoji":"","status_text":""}"#);

    assert!(harness
        .posts
        .recv_timeout(Duration::from_millis(500))
        .is_err());
}

#[test]
fn configured_profile_is_used() {
    let harness = start_harness();
    harness.client.set_token(Some("xoxp-test".to_string()));
    harness
        .settings
        .save(&Settings {
            status_emoji: Some(":telephone_receiver:".to_string()),
            status_text: Some("On a call".to_string()),
            ..Settings::default()
        })
        .unwrap();

    std::fs::write(&harness.watched, IN_CALL).unwrap();
    let (_, body) = harness
        .posts
        .recv_timeout(Duration::from_secs(5))
        .expect("set status POST");
    assert_eq!(
        body,
        r#"{"status_emoji":":telephone_receiver:","status_text":"On a call"}"#
    );
}

#[test]
fn partial_writes_and_missing_token_send_nothing() {
    let harness = start_harness();

    std::fs::write(&harness.watched, r#"{"appStates":{"states":"Idle,InCa"#).unwrap();
    std::fs::write(&harness.watched, IN_CALL).unwrap();

    assert!(harness
        .posts
        .recv_timeout(Duration::from_millis(700))
        .is_err());
    assert_eq!(harness.vault.get(TOKEN_KEY), Ok(None));
}
