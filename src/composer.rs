use crate::api::{ChatBackend, OutgoingMessage, StagedAttachment};
use crate::config::ComposerConfig;
use crate::error::{ChatError, ChatResult};
use crate::types::{ConversationId, Message};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

const MIB: u64 = 1024 * 1024;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Draft {
    pub text: String,
    pub attachment: Option<StagedAttachment>,
}

impl Draft {
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.attachment.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnterAction {
    Submit,
    InsertNewline,
}

/// Enter sends, Shift+Enter breaks the line.
pub fn enter_action(shift: bool) -> EnterAction {
    if shift {
        EnterAction::InsertNewline
    } else {
        EnterAction::Submit
    }
}

pub fn validate_attachment(cfg: &ComposerConfig, attachment: &StagedAttachment) -> ChatResult<()> {
    if attachment.size() == 0 {
        return Err(ChatError::Validation("O arquivo está vazio.".to_string()));
    }
    if attachment.size() > cfg.max_attachment_bytes {
        return Err(ChatError::Validation(format!(
            "O arquivo excede o limite de {} MB.",
            cfg.max_attachment_bytes / MIB
        )));
    }
    let mime = attachment
        .mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase();
    if !cfg
        .allowed_mime_types
        .iter()
        .any(|allowed| allowed.eq_ignore_ascii_case(&mime))
    {
        return Err(ChatError::Validation(format!(
            "Tipo de arquivo não permitido: {}.",
            attachment.mime_type
        )));
    }
    Ok(())
}

#[derive(Debug, Default)]
struct ComposerState {
    draft: Draft,
    revision: u64,
    sending: bool,
    last_typing_notice: Option<Instant>,
}

/// Outgoing message draft. Never writes to message history itself.
#[derive(Clone)]
pub struct Composer {
    backend: Arc<dyn ChatBackend>,
    config: ComposerConfig,
    typing_throttle: Duration,
    state: Arc<Mutex<ComposerState>>,
}

impl Composer {
    pub fn new(backend: Arc<dyn ChatBackend>, config: ComposerConfig, typing_throttle: Duration) -> Self {
        Self {
            backend,
            config,
            typing_throttle,
            state: Arc::new(Mutex::new(ComposerState::default())),
        }
    }

    /// Replaces the draft text and, when given, stages a new attachment.
    /// A rejected attachment leaves the staged one untouched.
    pub async fn update_draft(
        &self,
        text: impl Into<String>,
        attachment: Option<StagedAttachment>,
    ) -> ChatResult<()> {
        let mut state = self.state.lock().await;
        state.draft.text = text.into();
        state.revision += 1;
        if let Some(attachment) = attachment {
            validate_attachment(&self.config, &attachment)?;
            state.draft.attachment = Some(attachment);
        }
        Ok(())
    }

    pub async fn clear_attachment(&self) {
        let mut state = self.state.lock().await;
        state.draft.attachment = None;
        state.revision += 1;
    }

    pub async fn cancel(&self) {
        let mut state = self.state.lock().await;
        state.draft = Draft::default();
        state.revision += 1;
        state.last_typing_notice = None;
    }

    pub async fn draft(&self) -> Draft {
        self.state.lock().await.draft.clone()
    }

    pub async fn is_sending(&self) -> bool {
        self.state.lock().await.sending
    }

    /// Sends the draft. Empty drafts are rejected without touching the network.
    pub async fn submit(&self, conversation_id: ConversationId) -> ChatResult<Message> {
        let (outgoing, revision) = {
            let mut state = self.state.lock().await;
            if state.draft.is_empty() {
                return Err(ChatError::Validation(
                    "Escreva uma mensagem ou anexe um arquivo.".to_string(),
                ));
            }
            if state.sending {
                return Err(ChatError::Validation("Envio em andamento.".to_string()));
            }
            state.sending = true;
            let text = state.draft.text.trim();
            let outgoing = OutgoingMessage {
                text: (!text.is_empty()).then(|| text.to_string()),
                attachment: state.draft.attachment.clone(),
                client_nonce: Uuid::new_v4(),
            };
            (outgoing, state.revision)
        };

        let result = self.backend.send_message(conversation_id, outgoing).await;

        let mut state = self.state.lock().await;
        state.sending = false;
        let message = result?;
        // edits made while sending belong to the next message
        if state.revision == revision {
            state.draft = Draft::default();
            state.revision += 1;
            state.last_typing_notice = None;
        }
        Ok(message)
    }

    /// Whether a typing whisper should go out now; records it when it does.
    pub async fn typing_due(&self, now: Instant) -> bool {
        let mut state = self.state.lock().await;
        if state.draft.text.trim().is_empty() {
            return false;
        }
        let due = state
            .last_typing_notice
            .map(|last| now.saturating_duration_since(last) >= self.typing_throttle)
            .unwrap_or(true);
        if due {
            state.last_typing_notice = Some(now);
        }
        due
    }
}
