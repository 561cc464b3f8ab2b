use crate::api::ChatBackend;
use crate::error::ChatResult;
use crate::types::{ConversationId, Message, MessageId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Page applied; carries the number of messages the backend returned.
    Loaded(usize),
    /// Nothing to do: no more history, a load already running, or no conversation.
    Skipped,
    /// Response arrived after the active conversation changed and was discarded.
    Stale,
}

#[derive(Debug, Default)]
struct PagerState {
    conversation: Option<ConversationId>,
    messages: Vec<Message>,
    has_more: bool,
    loading: bool,
    generation: u64,
}

/// Message history of the active conversation.
#[derive(Clone)]
pub struct MessagePager {
    backend: Arc<dyn ChatBackend>,
    page_size: usize,
    state: Arc<Mutex<PagerState>>,
}

impl MessagePager {
    pub fn new(backend: Arc<dyn ChatBackend>, page_size: usize) -> Self {
        Self {
            backend,
            page_size: page_size.max(1),
            state: Arc::new(Mutex::new(PagerState::default())),
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub async fn load_initial(&self, conversation_id: ConversationId) -> ChatResult<LoadOutcome> {
        let generation = self.begin(conversation_id).await;
        self.fetch_initial(conversation_id, generation).await
    }

    /// Switches to `conversation_id` and returns the new generation.
    /// Responses issued under any earlier generation are discarded.
    pub async fn begin(&self, conversation_id: ConversationId) -> u64 {
        let mut state = self.state.lock().await;
        state.generation += 1;
        state.conversation = Some(conversation_id);
        state.messages.clear();
        state.has_more = true;
        state.loading = true;
        state.generation
    }

    /// Fetches the newest page for a generation returned by [`MessagePager::begin`].
    pub async fn fetch_initial(
        &self,
        conversation_id: ConversationId,
        generation: u64,
    ) -> ChatResult<LoadOutcome> {
        let result = self
            .backend
            .fetch_messages(conversation_id, None, self.page_size)
            .await;

        let mut state = self.state.lock().await;
        if state.generation != generation {
            debug!(conversation_id, "discarding stale initial page");
            return Ok(LoadOutcome::Stale);
        }
        state.loading = false;
        let page = result?;
        let len = page.len();
        let page = sanitize(conversation_id, page);
        // pushes accepted while the page was in flight stay
        let existing = std::mem::take(&mut state.messages);
        state.messages = merge_messages(existing, page);
        state.has_more = len == self.page_size;
        Ok(LoadOutcome::Loaded(len))
    }

    pub async fn load_older(&self) -> ChatResult<LoadOutcome> {
        let (generation, conversation_id, cursor) = {
            let mut state = self.state.lock().await;
            let Some(conversation_id) = state.conversation else {
                return Ok(LoadOutcome::Skipped);
            };
            if !state.has_more || state.loading {
                return Ok(LoadOutcome::Skipped);
            }
            state.loading = true;
            let cursor = state.messages.first().map(|m| m.id);
            (state.generation, conversation_id, cursor)
        };

        let result = self
            .backend
            .fetch_messages(conversation_id, cursor, self.page_size)
            .await;

        let mut state = self.state.lock().await;
        if state.generation != generation {
            debug!(conversation_id, "discarding stale older page");
            return Ok(LoadOutcome::Stale);
        }
        state.loading = false;
        let page = result?;
        let len = page.len();
        let page = sanitize(conversation_id, page);
        let existing = std::mem::take(&mut state.messages);
        state.messages = merge_messages(existing, page);
        state.has_more = len == self.page_size;
        Ok(LoadOutcome::Loaded(len))
    }

    /// Inserts a real-time message; returns false when it was dropped.
    pub async fn receive_push(&self, message: Message) -> bool {
        let mut state = self.state.lock().await;
        if state.conversation != Some(message.conversation_id) {
            return false;
        }
        if !message.is_well_formed() {
            warn!(message_id = message.id, "dropping message without text or attachment");
            return false;
        }
        if state.messages.iter().any(|m| m.id == message.id) {
            return false;
        }
        let key = message.order_key();
        let pos = state.messages.partition_point(|m| m.order_key() < key);
        state.messages.insert(pos, message);
        true
    }

    /// Forgets the current conversation; in-flight responses become stale.
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        state.generation += 1;
        state.conversation = None;
        state.messages.clear();
        state.has_more = false;
        state.loading = false;
    }

    pub async fn messages(&self) -> Vec<Message> {
        self.state.lock().await.messages.clone()
    }

    pub async fn message_ids(&self) -> Vec<MessageId> {
        self.state.lock().await.messages.iter().map(|m| m.id).collect()
    }

    pub async fn has_more(&self) -> bool {
        self.state.lock().await.has_more
    }

    pub async fn is_loading(&self) -> bool {
        self.state.lock().await.loading
    }

    pub async fn conversation(&self) -> Option<ConversationId> {
        self.state.lock().await.conversation
    }
}

fn sanitize(conversation_id: ConversationId, page: Vec<Message>) -> Vec<Message> {
    page.into_iter()
        .filter(|m| {
            let keep = m.conversation_id == conversation_id && m.is_well_formed();
            if !keep {
                warn!(message_id = m.id, "dropping foreign or empty message from page");
            }
            keep
        })
        .collect()
}

/// Union of both lists, unique by id, ascending by `(created_at, id)`.
/// On duplicate ids the incoming copy wins.
pub fn merge_messages(existing: Vec<Message>, incoming: Vec<Message>) -> Vec<Message> {
    let mut by_id: HashMap<MessageId, Message> =
        HashMap::with_capacity(existing.len() + incoming.len());
    for message in existing.into_iter().chain(incoming) {
        by_id.insert(message.id, message);
    }
    let mut merged: Vec<Message> = by_id.into_values().collect();
    merged.sort_by_key(|m| m.order_key());
    merged
}
