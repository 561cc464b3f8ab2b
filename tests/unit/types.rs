use guild_chat::types::{AttachmentKind, Conversation, ConversationKind, Message, Page};
use serde_json::json;

#[test]
fn test_conversation_deserialize() {
    let conv: Conversation = serde_json::from_value(json!({
        "id": 12,
        "type": "campaign",
        "title": "A Maldição de Strahd",
        "participants": [
            {"id": 1, "name": "Ana", "handle": "ana", "avatar_url": null},
            {"id": 2, "name": "Bruno", "handle": "bruno", "avatar_url": "https://cdn/b.png"}
        ],
        "unread_count": 4,
        "last_activity_at": "2024-05-01T18:30:00Z"
    }))
    .unwrap();
    assert_eq!(conv.kind, ConversationKind::Campaign);
    assert_eq!(conv.participants.len(), 2);
    assert_eq!(conv.unread_count, 4);
    assert_eq!(conv.display_title(Some(1)), "A Maldição de Strahd");
}

#[test]
fn test_conversation_defaults_and_unknown_kind() {
    let conv: Conversation = serde_json::from_value(json!({
        "id": 3,
        "type": "guild-hall",
        "title": null,
        "last_activity_at": "2024-05-01T18:30:00Z"
    }))
    .unwrap();
    assert_eq!(conv.kind, ConversationKind::Other);
    assert_eq!(conv.unread_count, 0);
    assert!(conv.participants.is_empty());
}

#[test]
fn test_message_with_attachment() {
    let message: Message = serde_json::from_value(json!({
        "id": 99,
        "conversation_id": 12,
        "sender": {"id": 2, "name": "Bruno", "handle": "bruno", "avatar_url": null},
        "text": null,
        "attachment": {"url": "https://cdn/mapa.png", "mime_type": "image/png", "size": 2048},
        "created_at": "2024-05-01T18:31:00Z",
        "edited_at": null
    }))
    .unwrap();
    assert!(message.is_well_formed());
    assert!(message.client_nonce.is_none());
    assert_eq!(message.attachment.as_ref().unwrap().kind(), AttachmentKind::Image);
    assert_eq!(message.preview(), "Imagem");
}

#[test]
fn test_message_without_content_is_malformed() {
    let message: Message = serde_json::from_value(json!({
        "id": 100,
        "conversation_id": 12,
        "sender": {"id": 2, "name": "Bruno", "handle": "bruno", "avatar_url": null},
        "text": "",
        "attachment": null,
        "created_at": "2024-05-01T18:31:00Z",
        "edited_at": null
    }))
    .unwrap();
    assert!(!message.is_well_formed());
    assert_eq!(message.preview(), "");
}

#[test]
fn test_page_with_meta() {
    let page: Page<Conversation> = serde_json::from_value(json!({
        "data": [],
        "meta": {"current_page": 2, "last_page": 5}
    }))
    .unwrap();
    assert_eq!(page.next_page(), Some(3));
}

#[test]
fn test_attachment_kind_labels() {
    assert_eq!(AttachmentKind::Document.label(), "Documento");
    assert_eq!(AttachmentKind::Other.label(), "Arquivo");
}
