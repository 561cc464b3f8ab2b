use crate::config::ApiConfig;
use crate::error::{ChatError, ChatResult};
use crate::session::SessionContext;
use crate::types::{Conversation, ConversationId, Message, MessageId, Page, UserId};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use uuid::Uuid;

/// File picked by the user but not uploaded yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedAttachment {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Bytes,
}

impl StagedAttachment {
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub text: Option<String>,
    pub attachment: Option<StagedAttachment>,
    pub client_nonce: Uuid,
}

#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn list_conversations(&self, page: u32) -> ChatResult<Page<Conversation>>;

    /// Newest-first page of messages strictly older than `before` when given.
    async fn fetch_messages(
        &self,
        conversation_id: ConversationId,
        before: Option<MessageId>,
        limit: usize,
    ) -> ChatResult<Vec<Message>>;

    async fn send_message(
        &self,
        conversation_id: ConversationId,
        message: OutgoingMessage,
    ) -> ChatResult<Message>;

    async fn create_direct_conversation(&self, user_id: UserId) -> ChatResult<Conversation>;

    /// Returns the canonical unread count after the read mark.
    async fn mark_read(&self, conversation_id: ConversationId) -> ChatResult<u32>;

    async fn unread_total(&self) -> ChatResult<u64>;

    async fn notify_typing(&self, conversation_id: ConversationId) -> ChatResult<()>;
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct ReadResponse {
    #[serde(default)]
    unread_count: u32,
}

#[derive(Deserialize)]
struct UnreadCountResponse {
    count: u64,
}

pub struct HttpBackend {
    http: Client,
    base_url: String,
    session: SessionContext,
}

impl HttpBackend {
    pub fn new(cfg: &ApiConfig, session: SessionContext) -> ChatResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_seconds.max(1)))
            .build()?;
        Ok(Self::with_client(http, &cfg.base_url, session))
    }

    pub fn with_client(http: Client, base_url: &str, session: SessionContext) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            session,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authed(&self, req: RequestBuilder) -> ChatResult<RequestBuilder> {
        let token = self.session.token().ok_or(ChatError::Auth)?;
        Ok(req.bearer_auth(token).header("Accept", "application/json"))
    }
}

async fn check(resp: Response) -> ChatResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ChatError::from_status(status.as_u16(), &body))
}

async fn decode<T: DeserializeOwned>(resp: Response) -> ChatResult<T> {
    let resp = check(resp).await?;
    Ok(resp.json::<T>().await?)
}

#[async_trait]
impl ChatBackend for HttpBackend {
    async fn list_conversations(&self, page: u32) -> ChatResult<Page<Conversation>> {
        let req = self
            .authed(self.http.get(self.url("/conversations")))?
            .query(&[("page", page.to_string())]);
        decode(req.send().await?).await
    }

    async fn fetch_messages(
        &self,
        conversation_id: ConversationId,
        before: Option<MessageId>,
        limit: usize,
    ) -> ChatResult<Vec<Message>> {
        let mut query = vec![("limit", limit.to_string())];
        if let Some(before) = before {
            query.push(("before_id", before.to_string()));
        }
        let path = format!("/conversations/{}/messages", conversation_id);
        let req = self.authed(self.http.get(self.url(&path)))?.query(&query);
        let envelope: Envelope<Vec<Message>> = decode(req.send().await?).await?;
        Ok(envelope.data)
    }

    async fn send_message(
        &self,
        conversation_id: ConversationId,
        message: OutgoingMessage,
    ) -> ChatResult<Message> {
        let mut form = reqwest::multipart::Form::new()
            .text("client_nonce", message.client_nonce.to_string());
        if let Some(text) = message.text {
            form = form.text("content", text);
        }
        if let Some(att) = message.attachment {
            let part = reqwest::multipart::Part::bytes(att.bytes.to_vec())
                .file_name(att.file_name)
                .mime_str(&att.mime_type)?;
            form = form.part("file", part);
        }
        let path = format!("/conversations/{}/messages", conversation_id);
        let req = self.authed(self.http.post(self.url(&path)))?.multipart(form);
        let envelope: Envelope<Message> = decode(req.send().await?).await?;
        Ok(envelope.data)
    }

    async fn create_direct_conversation(&self, user_id: UserId) -> ChatResult<Conversation> {
        let req = self
            .authed(self.http.post(self.url("/conversations/direct")))?
            .json(&serde_json::json!({ "user_id": user_id }));
        let envelope: Envelope<Conversation> = decode(req.send().await?).await?;
        Ok(envelope.data)
    }

    async fn mark_read(&self, conversation_id: ConversationId) -> ChatResult<u32> {
        let path = format!("/conversations/{}/read", conversation_id);
        let req = self.authed(self.http.post(self.url(&path)))?;
        let resp = check(req.send().await?).await?;
        let body = resp.text().await?;
        if body.trim().is_empty() {
            return Ok(0);
        }
        let parsed: ReadResponse =
            serde_json::from_str(&body).map_err(|e| ChatError::Network(e.to_string()))?;
        Ok(parsed.unread_count)
    }

    async fn unread_total(&self) -> ChatResult<u64> {
        let req = self.authed(self.http.get(self.url("/messages/unread-count")))?;
        let parsed: UnreadCountResponse = decode(req.send().await?).await?;
        Ok(parsed.count)
    }

    async fn notify_typing(&self, conversation_id: ConversationId) -> ChatResult<()> {
        let path = format!("/conversations/{}/typing", conversation_id);
        let req = self.authed(self.http.post(self.url(&path)))?;
        check(req.send().await?).await?;
        Ok(())
    }
}
