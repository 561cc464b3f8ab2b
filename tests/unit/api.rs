use bytes::Bytes;
use guild_chat::api::{ChatBackend, HttpBackend, OutgoingMessage, StagedAttachment};
use guild_chat::session::{SessionContext, SessionData};
use guild_chat::ChatError;
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_json, body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn session() -> SessionContext {
    SessionContext::in_memory(SessionData {
        token: Some("tok-abc".to_string()),
        user: None,
        chat_open: false,
    })
}

fn backend(server: &MockServer) -> HttpBackend {
    HttpBackend::with_client(reqwest::Client::new(), &server.uri(), session())
}

fn message_json(id: u64, conversation_id: u64, text: &str) -> serde_json::Value {
    json!({
        "id": id,
        "conversation_id": conversation_id,
        "sender": {"id": 2, "name": "Bruno", "handle": "bruno", "avatar_url": null},
        "text": text,
        "attachment": null,
        "created_at": "2024-05-01T18:31:00Z",
        "edited_at": null
    })
}

#[tokio::test]
async fn test_list_conversations_sends_bearer_and_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/conversations"))
        .and(query_param("page", "2"))
        .and(header("authorization", "Bearer tok-abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{
                "id": 7,
                "type": "direct",
                "title": null,
                "participants": [],
                "unread_count": 3,
                "last_activity_at": "2024-05-01T18:30:00Z"
            }],
            "meta": {"current_page": 2, "last_page": 3}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let page = backend(&server).list_conversations(2).await.unwrap();
    assert_eq!(page.data.len(), 1);
    assert_eq!(page.data[0].unread_count, 3);
    assert_eq!(page.next_page(), Some(3));
}

#[tokio::test]
async fn test_fetch_messages_uses_cursor() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/conversations/9/messages"))
        .and(query_param("limit", "3"))
        .and(query_param("before_id", "10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [message_json(9, 9, "c"), message_json(8, 9, "b"), message_json(7, 9, "a")]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let messages = backend(&server).fetch_messages(9, Some(10), 3).await.unwrap();
    let ids: Vec<u64> = messages.iter().map(|m| m.id).collect();
    assert_eq!(ids, vec![9, 8, 7]);
}

#[tokio::test]
async fn test_unauthorized_maps_to_auth() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/messages/unread-count"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "Unauthenticated."})))
        .mount(&server)
        .await;

    let err = backend(&server).unread_total().await.unwrap_err();
    assert_eq!(err, ChatError::Auth);
}

#[tokio::test]
async fn test_not_found_maps_to_conflict_or_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/conversations/4/read"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "Conversa não encontrada."})))
        .mount(&server)
        .await;

    let err = backend(&server).mark_read(4).await.unwrap_err();
    assert!(matches!(err, ChatError::ConflictOrNotFound(_)));
}

#[tokio::test]
async fn test_server_error_is_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/conversations/4/typing"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let err = backend(&server).notify_typing(4).await.unwrap_err();
    assert!(matches!(err, ChatError::Http { status: 503, .. }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_validation_message_surfaces() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/conversations/direct"))
        .respond_with(
            ResponseTemplate::new(422).set_body_json(json!({"message": "Usuário inválido."})),
        )
        .mount(&server)
        .await;

    let err = backend(&server).create_direct_conversation(99).await.unwrap_err();
    assert_eq!(err, ChatError::Validation("Usuário inválido.".to_string()));
}

#[tokio::test]
async fn test_mark_read_returns_canonical_count() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/conversations/4/read"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"unread_count": 1})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/conversations/5/read"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let backend = backend(&server);
    assert_eq!(backend.mark_read(4).await.unwrap(), 1);
    assert_eq!(backend.mark_read(5).await.unwrap(), 0);
}

#[tokio::test]
async fn test_unread_total() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/messages/unread-count"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"count": 12})))
        .mount(&server)
        .await;

    assert_eq!(backend(&server).unread_total().await.unwrap(), 12);
}

#[tokio::test]
async fn test_create_direct_posts_user_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/conversations/direct"))
        .and(body_json(json!({"user_id": 42})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "data": {
                "id": 31,
                "type": "direct",
                "title": null,
                "participants": [],
                "unread_count": 0,
                "last_activity_at": "2024-05-01T18:30:00Z"
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let conv = backend(&server).create_direct_conversation(42).await.unwrap();
    assert_eq!(conv.id, 31);
}

#[tokio::test]
async fn test_send_message_multipart() {
    let server = MockServer::start().await;
    let nonce = Uuid::new_v4();
    Mock::given(method("POST"))
        .and(path("/conversations/9/messages"))
        .and(body_string_contains("name=\"content\""))
        .and(body_string_contains("Rolem iniciativa"))
        .and(body_string_contains(nonce.to_string().as_str()))
        .and(body_string_contains("filename=\"mapa.png\""))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "data": message_json(500, 9, "Rolem iniciativa")
        })))
        .expect(1)
        .mount(&server)
        .await;

    let sent = backend(&server)
        .send_message(
            9,
            OutgoingMessage {
                text: Some("Rolem iniciativa".to_string()),
                attachment: Some(StagedAttachment {
                    file_name: "mapa.png".to_string(),
                    mime_type: "image/png".to_string(),
                    bytes: Bytes::from_static(b"fake-png-bytes"),
                }),
                client_nonce: nonce,
            },
        )
        .await
        .unwrap();
    assert_eq!(sent.id, 500);
}
