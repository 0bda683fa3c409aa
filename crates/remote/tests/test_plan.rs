//! Integration tests for the `chatify-remote` crate.
//!
//! REST and storage calls run against an `httpmock` server, realtime against
//! a local websocket server speaking the channel protocol.

use std::time::Duration;

use chatify_chats::entities::{MembershipStatus, NewMessage, NewReaction};
use chatify_chats::repositories::{
    ConversationRepository, MembershipRepository, MessageRepository, ObjectStorage,
    ReactionRepository, RealtimeSource,
};
use chatify_chats::{ChatError, ProgressReporter};
use chatify_config::ClientConfig;
use chatify_remote::RemoteBackend;
use futures_util::{SinkExt, StreamExt};
use httpmock::prelude::*;
use httpmock::Method::PATCH;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as Frame;

fn config_for(base_url: &str) -> ClientConfig {
    let mut config = ClientConfig::default();
    config.backend.url = base_url.to_string();
    config.backend.api_key = Some("anon-key".to_string());
    config.session.access_token = Some("user-token".to_string());
    config.backend.request_timeout_seconds = 5;
    config
}

fn message_row(id: &str, content: &str) -> Value {
    json!({
        "id": id,
        "chat_id": "c1",
        "sender_id": "u2",
        "created_at": "2024-05-01T10:00:00+00:00",
        "type": "text",
        "content": content,
    })
}

#[tokio::test]
async fn history_sends_credentials_and_skips_invalid_rows() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/rest/v1/messages")
                .query_param("chat_id", "eq.c1")
                .query_param("order", "created_at.asc")
                .header("apikey", "anon-key")
                .header("authorization", "Bearer user-token");
            then.status(200).json_body(json!([
                message_row("m1", "hello"),
                { "id": "m2", "chat_id": "c1" },
                message_row("m3", "again"),
            ]));
        })
        .await;

    let backend = RemoteBackend::new(&config_for(&server.base_url())).unwrap();
    let history = backend.history("c1").await.unwrap();

    mock.assert_async().await;
    let ids: Vec<_> = history.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, ["m1", "m3"]);
}

#[tokio::test]
async fn insert_posts_row_and_decodes_representation() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/rest/v1/messages")
                .header("prefer", "return=representation")
                .json_body(json!({
                    "chat_id": "c1",
                    "sender_id": "u1",
                    "type": "text",
                    "content": "hi",
                }));
            then.status(201).json_body(json!([{
                "id": "m9",
                "chat_id": "c1",
                "sender_id": "u1",
                "created_at": "2024-05-01T10:00:00Z",
                "type": "text",
                "content": "hi",
            }]));
        })
        .await;

    let backend = RemoteBackend::new(&config_for(&server.base_url())).unwrap();
    let message = MessageRepository::insert(&backend, NewMessage::text("c1", "u1", "hi"))
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(message.id, "m9");
    assert_eq!(message.text(), Some("hi"));
}

#[tokio::test]
async fn rejected_requests_map_to_session_errors() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/rest/v1/chat_members");
            then.status(401).body("JWT expired");
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/rest/v1/messages");
            then.status(503).body("unavailable");
        })
        .await;

    let backend = RemoteBackend::new(&config_for(&server.base_url())).unwrap();

    let error = backend.memberships("c1").await.unwrap_err();
    assert!(matches!(error, ChatError::AccessDenied { .. }));
    let error = backend.history("c1").await.unwrap_err();
    assert!(matches!(error, ChatError::Transport { .. }));
}

#[tokio::test]
async fn update_status_patches_one_membership() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(PATCH)
                .path("/rest/v1/chat_members")
                .query_param("chat_id", "eq.c1")
                .query_param("user_id", "eq.u2")
                .json_body(json!({ "status": "blocked" }));
            then.status(204);
        })
        .await;

    let backend = RemoteBackend::new(&config_for(&server.base_url())).unwrap();
    backend
        .update_status("c1", "u2", MembershipStatus::Blocked)
        .await
        .unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn upload_reports_completion_after_acknowledgment() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/storage/v1/object/chat-files/file_1_u1_x.txt")
                .header("content-type", "text/plain")
                .body("hello storage");
            then.status(200).json_body(json!({ "Key": "chat-files/file_1_u1_x.txt" }));
        })
        .await;

    let backend = RemoteBackend::new(&config_for(&server.base_url())).unwrap();
    let progress = ProgressReporter::new();
    let url = ObjectStorage::upload(
        &backend,
        "chat-files",
        "file_1_u1_x.txt",
        "hello storage".into(),
        "text/plain",
        &progress,
    )
    .await
    .unwrap();

    mock.assert_async().await;
    assert!(progress.is_complete());
    assert_eq!(
        url,
        format!("{}/storage/v1/object/public/chat-files/file_1_u1_x.txt", server.base_url())
    );
}

#[tokio::test]
async fn failed_upload_is_a_storage_error_and_never_completes() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path_contains("/storage/v1/object/");
            then.status(500).body("disk full");
        })
        .await;
    let delete = server
        .mock_async(|when, then| {
            when.method(DELETE).path("/storage/v1/object/chat-files/a.txt");
            then.status(200);
        })
        .await;

    let backend = RemoteBackend::new(&config_for(&server.base_url())).unwrap();
    let progress = ProgressReporter::new();
    let error = backend
        .upload("chat-files", "a.txt", "data".into(), "text/plain", &progress)
        .await
        .unwrap_err();

    assert!(matches!(error, ChatError::Storage { .. }));
    assert!(!progress.is_complete());

    ObjectStorage::delete(&backend, "chat-files", "a.txt").await.unwrap();
    delete.assert_hits_async(1).await;
}

#[tokio::test]
async fn reactions_use_in_filter_and_skip_empty_requests() {
    let server = MockServer::start_async().await;
    let select = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/rest/v1/reactions")
                .query_param("message_id", "in.(\"m1\",\"m2\")");
            then.status(200).json_body(json!([
                { "id": "r1", "message_id": "m1", "user_id": "u1", "emoji": "🔥" },
                { "id": "r2", "message_id": "m2", "user_id": "u1", "emoji": "" },
            ]));
        })
        .await;
    let insert = server
        .mock_async(|when, then| {
            when.method(POST).path("/rest/v1/reactions").json_body(json!({
                "message_id": "m1",
                "user_id": "u1",
                "emoji": "🎉",
            }));
            then.status(201).json_body(json!([
                { "id": "r3", "message_id": "m1", "user_id": "u1", "emoji": "🎉" },
            ]));
        })
        .await;

    let backend = RemoteBackend::new(&config_for(&server.base_url())).unwrap();
    assert!(backend.for_messages(&[]).await.unwrap().is_empty());

    let reactions = backend
        .for_messages(&["m1".to_string(), "m2".to_string()])
        .await
        .unwrap();
    assert_eq!(reactions.len(), 1);
    assert_eq!(reactions[0].emoji, "🔥");
    select.assert_hits_async(1).await;

    let stored = ReactionRepository::insert(&backend, NewReaction::new("m1", "u1", "🎉"))
        .await
        .unwrap();
    assert_eq!(stored.id, "r3");
    insert.assert_async().await;
}

#[tokio::test]
async fn create_direct_inserts_chat_then_both_memberships() {
    let server = MockServer::start_async().await;
    let chat = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/rest/v1/chats")
                .json_body(json!({ "is_group": false }));
            then.status(201).json_body(json!([{ "id": "c7", "is_group": false }]));
        })
        .await;
    let members = server
        .mock_async(|when, then| {
            when.method(POST).path("/rest/v1/chat_members").json_body(json!([
                { "chat_id": "c7", "user_id": "u1", "status": "accepted" },
                { "chat_id": "c7", "user_id": "u2", "status": "pending" },
            ]));
            then.status(201).json_body(json!([]));
        })
        .await;

    let backend = RemoteBackend::new(&config_for(&server.base_url())).unwrap();
    let id = backend.create_direct("u1", "u2").await.unwrap();

    assert_eq!(id, "c7");
    chat.assert_async().await;
    members.assert_async().await;
}

#[tokio::test]
async fn existing_direct_intersects_memberships() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/rest/v1/chat_members")
                .query_param("user_id", "eq.u1");
            then.status(200)
                .json_body(json!([{ "chat_id": "c1" }, { "chat_id": "c2" }]));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/rest/v1/chat_members")
                .query_param("user_id", "eq.u2")
                .query_param("chat_id", "in.(\"c1\",\"c2\")");
            then.status(200).json_body(json!([{ "chat_id": "c2" }]));
        })
        .await;

    let backend = RemoteBackend::new(&config_for(&server.base_url())).unwrap();
    assert_eq!(
        backend.existing_direct("u1", "u2").await.unwrap().as_deref(),
        Some("c2")
    );
}

/// Minimal channel server: acknowledges the join, pushes the given frames
/// and reports every frame the client sends afterwards.
async fn spawn_channel_server(pushes: Vec<Value>) -> (String, mpsc::UnboundedReceiver<Value>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    let (seen_tx, seen_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut socket = tokio_tungstenite::accept_async(stream).await.unwrap();

        while let Some(Ok(frame)) = socket.next().await {
            let Frame::Text(text) = frame else { continue };
            let value: Value = serde_json::from_str(&text).unwrap();
            let joined = value["event"] == "phx_join";
            let topic = value["topic"].clone();
            let _ = seen_tx.send(value);

            if joined {
                let reply = json!({
                    "topic": topic,
                    "event": "phx_reply",
                    "payload": { "status": "ok", "response": {} },
                    "ref": "1",
                });
                socket.send(Frame::Text(reply.to_string())).await.unwrap();
                for push in &pushes {
                    socket.send(Frame::Text(push.to_string())).await.unwrap();
                }
            }
        }
    });

    (format!("ws://{address}/socket"), seen_rx)
}

fn change_frame(record: Value) -> Value {
    json!({
        "topic": "realtime:messages:c1",
        "event": "postgres_changes",
        "payload": { "data": { "type": "INSERT", "schema": "public", "table": "messages", "record": record } },
        "ref": null,
    })
}

#[tokio::test]
async fn realtime_subscription_decodes_inserts_and_leaves_on_unsubscribe() {
    let (url, mut seen) = spawn_channel_server(vec![
        change_frame(message_row("m1", "pushed")),
        change_frame(json!({ "id": "m2", "chat_id": "c1" })),
    ])
    .await;

    let mut config = config_for("http://127.0.0.1:9");
    config.realtime.url = Some(url);
    let backend = RemoteBackend::new(&config).unwrap();

    let mut subscription = backend.subscribe("c1").await.unwrap();

    let join = seen.recv().await.unwrap();
    assert_eq!(join["event"], "phx_join");
    assert_eq!(join["topic"], "realtime:messages:c1");
    assert_eq!(
        join["payload"]["config"]["postgres_changes"][0]["filter"],
        "chat_id=eq.c1"
    );

    let first = tokio::time::timeout(Duration::from_secs(5), subscription.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(first.id, "m1");
    assert_eq!(first.text(), Some("pushed"));

    let second = tokio::time::timeout(Duration::from_secs(5), subscription.next())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(second, Err(ChatError::Decode { .. })));

    subscription.unsubscribe();
    assert!(subscription.next().await.is_none());

    let leave = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let frame = seen.recv().await.unwrap();
            if frame["event"] == "phx_leave" {
                return frame;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(leave["topic"], "realtime:messages:c1");
}
