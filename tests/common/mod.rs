use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde_json::json;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use streamchat::chat::{ChatController, ChatFacade, EventSink};
use streamchat::config::{Config, ProviderKind, ProviderSetting};
use streamchat::session::SessionTaskRegistry;
use streamchat::storage::{InMemoryStore, SqliteStorage};

#[allow(dead_code)]
pub fn create_temp_storage() -> (SqliteStorage, TempDir) {
    let tmp = TempDir::new().expect("failed to create tempdir");
    let db_path = tmp.path().join("history.db");
    let storage =
        SqliteStorage::new_with_path(db_path).expect("failed to create sqlite storage with path");
    (storage, tmp)
}

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

/// One OpenAI-compatible `data:` event carrying a text delta
#[allow(dead_code)]
pub fn openai_event(delta: &str) -> String {
    let event = json!({
        "id": "chatcmpl-1",
        "model": "test-model",
        "choices": [{"index": 0, "delta": {"content": delta}, "finish_reason": null}]
    });
    format!("data: {}\n\n", event)
}

/// SSE body for an OpenAI-compatible stream, ending with `[DONE]`
#[allow(dead_code)]
pub fn openai_sse(deltas: &[&str]) -> String {
    let mut body: String = deltas.iter().map(|d| openai_event(d)).collect();
    let last = json!({
        "id": "chatcmpl-1",
        "model": "test-model",
        "choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}]
    });
    body.push_str(&format!("data: {}\n\n", last));
    body.push_str("data: [DONE]\n\n");
    body
}

/// SSE body for a Gemini stream; the last event carries `STOP`
#[allow(dead_code)]
pub fn gemini_sse(deltas: &[&str]) -> String {
    let mut body = String::new();
    for (i, delta) in deltas.iter().enumerate() {
        let mut candidate = json!({
            "content": {"role": "model", "parts": [{"text": delta}]},
            "index": 0
        });
        if i + 1 == deltas.len() {
            candidate["finishReason"] = json!("STOP");
        }
        body.push_str(&format!("data: {}\n\n", json!({"candidates": [candidate]})));
    }
    body
}

#[allow(dead_code)]
pub fn setting(kind: ProviderKind, base_url: &str, keys: &[&str]) -> ProviderSetting {
    ProviderSetting {
        name: "mock".to_string(),
        kind,
        base_url: base_url.to_string(),
        api_keys: keys.iter().map(|k| k.to_string()).collect(),
        proxy: None,
        default_model: Some(match kind {
            ProviderKind::OpenAi => "test-model".to_string(),
            ProviderKind::Gemini => "gemini-test".to_string(),
        }),
    }
}

/// Config whose only provider points at a mock server
#[allow(dead_code)]
pub fn config_for(setting: ProviderSetting) -> Config {
    let mut config = Config::default();
    config.provider.active = setting.name.clone();
    config.provider.settings = vec![setting];
    config.streaming.throttle_interval_ms = 0;
    config.streaming.typing_delay_ms = 1;
    config
}

#[allow(dead_code)]
pub struct Harness {
    pub controller: ChatController,
    pub store: Arc<InMemoryStore>,
    pub registry: Arc<SessionTaskRegistry>,
}

#[allow(dead_code)]
pub fn harness(config: &Config) -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let registry = Arc::new(SessionTaskRegistry::new());
    let controller = ChatController::new(
        config,
        Arc::new(ChatFacade::new().expect("facade")),
        Arc::clone(&registry),
        store.clone(),
        EventSink::disabled(),
    )
    .expect("controller");
    Harness {
        controller,
        store,
        registry,
    }
}

/// Response served by [`scripted_sse_server`] for one connection
#[allow(dead_code)]
pub struct ScriptedReply {
    pub body: String,
    /// Keep the connection open after the body instead of closing it
    pub hang: bool,
}

#[allow(dead_code)]
pub struct ScriptedServer {
    pub uri: String,
    pub bodies: Arc<Mutex<Vec<String>>>,
}

#[allow(dead_code)]
impl ScriptedServer {
    pub fn request_bodies(&self) -> Vec<String> {
        self.bodies.lock().unwrap().clone()
    }
}

/// Plain TCP server answering each connection with the next reply in order
///
/// Unlike a mock server it can send part of a stream and then stall, which
/// leaves a generation running mid-answer.
#[allow(dead_code)]
pub async fn scripted_sse_server(replies: Vec<ScriptedReply>) -> ScriptedServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let uri = format!("http://{}", listener.local_addr().unwrap());
    let bodies = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&bodies);

    tokio::spawn(async move {
        for reply in replies {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let body = read_request_body(&mut socket).await;
            seen.lock().unwrap().push(body);
            tokio::spawn(async move {
                let head = "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\nconnection: close\r\n\r\n";
                let _ = socket.write_all(head.as_bytes()).await;
                let _ = socket.write_all(reply.body.as_bytes()).await;
                let _ = socket.flush().await;
                if reply.hang {
                    std::future::pending::<()>().await;
                }
                let _ = socket.shutdown().await;
            });
        }
    });

    ScriptedServer { uri, bodies }
}

async fn read_request_body(socket: &mut TcpStream) -> String {
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = socket.read(&mut buf).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);
        if let Some(end) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&data[..end]).to_lowercase();
            let length = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|value| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            let start = end + 4;
            if data.len() >= start + length {
                return String::from_utf8_lossy(&data[start..start + length]).into_owned();
            }
        }
    }
    String::from_utf8_lossy(&data).into_owned()
}
