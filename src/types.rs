use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type ConversationId = u64;
pub type MessageId = u64;
pub type UserId = u64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: UserId,
    pub name: String,
    pub handle: String,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationKind {
    Direct,
    Campaign,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    #[serde(rename = "type")]
    pub kind: ConversationKind,
    pub title: Option<String>,
    #[serde(default)]
    pub participants: Vec<Participant>,
    #[serde(default)]
    pub unread_count: u32,
    pub last_activity_at: DateTime<Utc>,
}

impl Conversation {
    /// Title for list rows: explicit title, else the other participants' names.
    pub fn display_title(&self, own_user: Option<UserId>) -> String {
        if let Some(title) = self.title.as_deref().filter(|t| !t.trim().is_empty()) {
            return title.to_string();
        }
        let names: Vec<&str> = self
            .participants
            .iter()
            .filter(|p| Some(p.id) != own_user)
            .map(|p| p.name.as_str())
            .collect();
        if names.is_empty() {
            "Conversa".to_string()
        } else {
            names.join(", ")
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    Image,
    Video,
    Audio,
    Document,
    Other,
}

impl AttachmentKind {
    pub fn from_mime(mime: &str) -> Self {
        let mime = mime.trim().to_lowercase();
        match mime.split('/').next().unwrap_or_default() {
            "image" => AttachmentKind::Image,
            "video" => AttachmentKind::Video,
            "audio" => AttachmentKind::Audio,
            _ if mime == "application/pdf" || mime.starts_with("text/") => AttachmentKind::Document,
            _ => AttachmentKind::Other,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AttachmentKind::Image => "Imagem",
            AttachmentKind::Video => "Vídeo",
            AttachmentKind::Audio => "Áudio",
            AttachmentKind::Document => "Documento",
            AttachmentKind::Other => "Arquivo",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    pub url: String,
    pub mime_type: String,
    pub size: u64,
}

impl AttachmentRef {
    pub fn kind(&self) -> AttachmentKind {
        AttachmentKind::from_mime(&self.mime_type)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender: Participant,
    pub text: Option<String>,
    pub attachment: Option<AttachmentRef>,
    pub created_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_nonce: Option<Uuid>,
}

impl Message {
    /// A message must carry text or an attachment.
    pub fn is_well_formed(&self) -> bool {
        let has_text = self
            .text
            .as_deref()
            .map(|t| !t.trim().is_empty())
            .unwrap_or(false);
        has_text || self.attachment.is_some()
    }

    pub fn order_key(&self) -> (DateTime<Utc>, MessageId) {
        (self.created_at, self.id)
    }

    /// Short text for conversation list previews.
    pub fn preview(&self) -> String {
        match (self.text.as_deref(), self.attachment.as_ref()) {
            (Some(text), _) if !text.trim().is_empty() => text.trim().to_string(),
            (_, Some(att)) => att.kind().label().to_string(),
            _ => String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSnapshot {
    pub id: UserId,
    pub name: String,
    pub handle: String,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMeta {
    pub current_page: u32,
    pub last_page: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub meta: Option<PageMeta>,
}

impl<T> Page<T> {
    pub fn next_page(&self) -> Option<u32> {
        self.meta
            .filter(|m| m.current_page < m.last_page)
            .map(|m| m.current_page + 1)
    }
}
