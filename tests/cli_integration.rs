//! Binary smoke tests

mod common;

use assert_cmd::Command;
use common::{create_temp_storage, openai_sse, temp_config_file};
use predicates::prelude::*;
use streamchat::providers::{ChatHistoryItem, Role};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn streamchat() -> Command {
    let mut cmd = Command::cargo_bin("streamchat").unwrap();
    for var in [
        "STREAMCHAT_PROVIDER",
        "STREAMCHAT_API_KEYS",
        "STREAMCHAT_BASE_URL",
        "STREAMCHAT_MODEL",
        "STREAMCHAT_HISTORY_DB",
        "RUST_LOG",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn test_help_lists_commands() {
    streamchat()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("chat"))
        .stdout(predicate::str::contains("history"))
        .stdout(predicate::str::contains("image"));
}

#[test]
fn test_history_list_empty() {
    let tmp = TempDir::new().unwrap();
    streamchat()
        .args(["--config", "does-not-exist.yaml", "history", "list"])
        .env("STREAMCHAT_HISTORY_DB", tmp.path().join("history.db"))
        .assert()
        .success()
        .stdout(predicate::str::contains("No conversation history found."));
}

#[test]
fn test_history_list_and_show_stored_session() {
    let (storage, _tmp) = create_temp_storage();
    storage
        .append("abcdef12-0000", &ChatHistoryItem::new(Role::User, "Plan a trip"))
        .unwrap();
    storage
        .append("abcdef12-0000", &ChatHistoryItem::new(Role::Assistant, "Where to?"))
        .unwrap();
    let db = storage.path().to_string_lossy().to_string();

    streamchat()
        .args(["--config", "does-not-exist.yaml", "--storage-path", &db, "history", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Plan a trip"))
        .stdout(predicate::str::contains("abcdef12"));

    streamchat()
        .args(["--config", "does-not-exist.yaml", "--storage-path", &db])
        .args(["history", "show", "abcdef12"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Where to?"));
}

#[test]
fn test_history_show_unknown_session_fails() {
    let tmp = TempDir::new().unwrap();
    streamchat()
        .args(["--config", "does-not-exist.yaml", "history", "show", "nope"])
        .env("STREAMCHAT_HISTORY_DB", tmp.path().join("history.db"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("No stored session matches"));
}

#[test]
fn test_invalid_provider_is_rejected() {
    streamchat()
        .args(["--config", "does-not-exist.yaml", "-p", "missing", "history", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No provider setting named"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_ask_streams_answer_to_stdout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(openai_sse(&["Hi", " there"])),
        )
        .mount(&server)
        .await;

    let (_config_dir, config_path) = temp_config_file(&format!(
        "provider:\n  active: mock\n  settings:\n    - name: mock\n      kind: openai\n      base_url: {}\n      default_model: test-model\n",
        server.uri()
    ));
    let db_dir = TempDir::new().unwrap();
    let db = db_dir.path().join("history.db");

    let output = tokio::task::spawn_blocking({
        let config_path = config_path.clone();
        let db = db.clone();
        move || {
            streamchat()
                .arg("--config")
                .arg(&config_path)
                .arg("--storage-path")
                .arg(&db)
                .args(["ask", "Hello"])
                .output()
                .unwrap()
        }
    })
    .await
    .unwrap();

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("Hi there"));

    let storage = streamchat::storage::SqliteStorage::new_with_path(&db).unwrap();
    let sessions = storage.list_sessions().unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].title, "Hello");
    assert_eq!(sessions[0].message_count, 2);
}
