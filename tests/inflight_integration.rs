//! Send and regenerate while an answer is still streaming

mod common;

use std::time::Duration;

use common::{config_for, harness, openai_event, openai_sse, scripted_sse_server, setting, ScriptedReply};
use serde_json::Value;
use streamchat::chat::{ChatController, GenerationOutcome, ViewKind};
use streamchat::config::ProviderKind;
use streamchat::providers::{ChatHistoryItem, Role};
use streamchat::storage::InMemoryStore;

fn complete(text: &str) -> ScriptedReply {
    ScriptedReply {
        body: openai_sse(&[text]),
        hang: false,
    }
}

fn stalled(text: &str) -> ScriptedReply {
    ScriptedReply {
        body: openai_event(text),
        hang: true,
    }
}

fn chat_view(controller: &ChatController, session: &str) -> Vec<ChatHistoryItem> {
    controller
        .messages(session)
        .into_iter()
        .filter(|m| m.kind == ViewKind::Chat)
        .map(|m| ChatHistoryItem::new(m.role, m.content))
        .collect()
}

fn sent_messages(body: &str) -> Vec<(String, String)> {
    let body: Value = serde_json::from_str(body).unwrap();
    body["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| {
            (
                m["role"].as_str().unwrap().to_string(),
                m["content"].as_str().unwrap().to_string(),
            )
        })
        .collect()
}

async fn wait_for_partial(store: &InMemoryStore, session: &str, text: &str) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while store.last_assistant(session).as_deref() != Some(text) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("partial answer was never saved");
}

#[tokio::test]
async fn test_regenerate_while_streaming_replaces_partial_answer() {
    let server = scripted_sse_server(vec![
        complete("B"),
        stalled("partial"),
        complete("X"),
    ])
    .await;
    let h = harness(&config_for(setting(ProviderKind::OpenAi, &server.uri, &[])));
    let session = h.controller.active_session();

    let first = h.controller.send("A").await.unwrap().unwrap().wait().await;
    assert_eq!(first, GenerationOutcome::Completed("B".to_string()));

    let running = h.controller.send("C").await.unwrap().unwrap();
    wait_for_partial(&h.store, &session, "partial").await;

    let regenerated = h.controller.regenerate().await.unwrap().unwrap();
    let cancelled = tokio::time::timeout(Duration::from_secs(2), running.wait())
        .await
        .expect("running generation should be cancelled");
    assert_eq!(cancelled, GenerationOutcome::Cancelled);
    assert_eq!(
        regenerated.wait().await,
        GenerationOutcome::Completed("X".to_string())
    );

    let expected = vec![
        ChatHistoryItem::new(Role::User, "A"),
        ChatHistoryItem::new(Role::Assistant, "B"),
        ChatHistoryItem::new(Role::User, "C"),
        ChatHistoryItem::new(Role::Assistant, "X"),
    ];
    assert_eq!(h.store.messages(&session), expected);
    assert_eq!(chat_view(&h.controller, &session), expected);

    let bodies = server.request_bodies();
    assert_eq!(bodies.len(), 3);
    assert_eq!(
        sent_messages(&bodies[2]),
        vec![
            ("user".to_string(), "A".to_string()),
            ("assistant".to_string(), "B".to_string()),
            ("user".to_string(), "C".to_string()),
        ]
    );
    assert!(h.registry.is_empty());
}

#[tokio::test]
async fn test_send_while_streaming_keeps_partial_before_new_question() {
    let server = scripted_sse_server(vec![stalled("partial"), complete("second answer")]).await;
    let h = harness(&config_for(setting(ProviderKind::OpenAi, &server.uri, &[])));
    let session = h.controller.active_session();

    let running = h.controller.send("first").await.unwrap().unwrap();
    wait_for_partial(&h.store, &session, "partial").await;

    let next = h.controller.send("second").await.unwrap().unwrap();
    let cancelled = tokio::time::timeout(Duration::from_secs(2), running.wait())
        .await
        .expect("running generation should be cancelled");
    assert_eq!(cancelled, GenerationOutcome::Cancelled);
    assert_eq!(
        next.wait().await,
        GenerationOutcome::Completed("second answer".to_string())
    );

    let expected = vec![
        ChatHistoryItem::new(Role::User, "first"),
        ChatHistoryItem::new(Role::Assistant, "partial"),
        ChatHistoryItem::new(Role::User, "second"),
        ChatHistoryItem::new(Role::Assistant, "second answer"),
    ];
    assert_eq!(h.store.messages(&session), expected);
    assert_eq!(chat_view(&h.controller, &session), expected);
    assert_eq!(
        sent_messages(&server.request_bodies()[1]),
        vec![
            ("user".to_string(), "first".to_string()),
            ("assistant".to_string(), "partial".to_string()),
            ("user".to_string(), "second".to_string()),
        ]
    );
}
