use crate::api::ChatBackend;
use crate::error::{ChatError, ChatResult};
use crate::events::{ChatEvent, EventBus};
use crate::pager::{LoadOutcome, MessagePager};
use crate::types::{Conversation, ConversationId, Message, UserId};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct StoreState {
    conversations: Vec<Conversation>,
    active: Option<ConversationId>,
    loaded: bool,
    /// Bumped whenever the list is replaced wholesale by a reload.
    list_generation: u64,
}

/// Cached conversation list plus the single active conversation.
#[derive(Clone)]
pub struct ConversationStore {
    backend: Arc<dyn ChatBackend>,
    bus: EventBus,
    pager: MessagePager,
    page_limit: u32,
    state: Arc<Mutex<StoreState>>,
}

impl ConversationStore {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        bus: EventBus,
        pager: MessagePager,
        page_limit: u32,
    ) -> Self {
        Self {
            backend,
            bus,
            pager,
            page_limit: page_limit.max(1),
            state: Arc::new(Mutex::new(StoreState::default())),
        }
    }

    pub async fn load_conversations(&self) -> ChatResult<usize> {
        let mut page_no = 1;
        let mut all = Vec::new();
        for _ in 0..self.page_limit {
            let page = match self.backend.list_conversations(page_no).await {
                Ok(page) => page,
                Err(err) => {
                    warn!("loading conversations failed: {err}");
                    self.bus.escalate(&err);
                    return Err(err);
                }
            };
            let next = page.next_page();
            all.extend(page.data);
            match next {
                Some(next) if next > page_no && next <= self.page_limit => page_no = next,
                _ => break,
            }
        }

        let mut seen = HashSet::new();
        all.retain(|c| seen.insert(c.id));
        sort_by_activity(&mut all);
        let count = all.len();

        {
            let mut state = self.state.lock().await;
            state.conversations = all;
            state.loaded = true;
            state.list_generation += 1;
            if let Some(id) = state.active {
                if !state.conversations.iter().any(|c| c.id == id) {
                    state.active = None;
                    self.pager.reset().await;
                }
            }
        }

        info!(count, "conversations loaded");
        self.bus.publish(ChatEvent::ConversationsLoaded);
        Ok(count)
    }

    /// Makes `id` the active conversation and loads its newest page.
    /// The latest selection wins; earlier in-flight loads come back as `Stale`.
    pub async fn select_conversation(&self, id: ConversationId) -> ChatResult<LoadOutcome> {
        // `active` and the pager generation change under the same store lock
        let generation = {
            let mut state = self.state.lock().await;
            state.active = Some(id);
            self.pager.begin(id).await
        };
        self.bus.publish(ChatEvent::ConversationSelected(id));

        match self.pager.fetch_initial(id, generation).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                self.handle_failure(id, &err).await;
                Err(err)
            }
        }
    }

    pub async fn deselect(&self) {
        let mut state = self.state.lock().await;
        state.active = None;
        self.pager.reset().await;
    }

    /// Optimistically zeroes the unread count, rolling back if the backend refuses.
    pub async fn mark_read(&self, id: ConversationId) -> ChatResult<()> {
        let (previous, list_generation) = {
            let mut state = self.state.lock().await;
            let previous = state
                .conversations
                .iter_mut()
                .find(|c| c.id == id)
                .map(|c| std::mem::replace(&mut c.unread_count, 0));
            (previous, state.list_generation)
        };

        match self.backend.mark_read(id).await {
            Ok(canonical) => {
                let mut state = self.state.lock().await;
                if let Some(conv) = state.conversations.iter_mut().find(|c| c.id == id) {
                    conv.unread_count = canonical;
                }
                drop(state);
                self.bus.publish(ChatEvent::ConversationRead(id));
                Ok(())
            }
            Err(err) => {
                if let Some(previous) = previous {
                    let mut state = self.state.lock().await;
                    // a reload during the request already brought the server's count
                    let replaced = state.list_generation != list_generation;
                    if let Some(conv) = state.conversations.iter_mut().find(|c| c.id == id) {
                        if !replaced {
                            // keep anything that arrived while the request was in flight
                            conv.unread_count = conv.unread_count.saturating_add(previous);
                        }
                    }
                }
                warn!(conversation_id = id, "mark read failed, rolled back: {err}");
                self.handle_failure(id, &err).await;
                if err != ChatError::Auth && !matches!(err, ChatError::ConflictOrNotFound(_)) {
                    self.bus.publish(ChatEvent::Error(err.to_string()));
                }
                Err(err)
            }
        }
    }

    /// Creates (or reuses) the direct conversation with `user_id` and selects it.
    pub async fn open_direct(&self, user_id: UserId) -> ChatResult<Conversation> {
        let conversation = match self.backend.create_direct_conversation(user_id).await {
            Ok(conversation) => conversation,
            Err(err) => {
                self.bus.escalate(&err);
                return Err(err);
            }
        };
        self.upsert(conversation.clone()).await;
        self.select_conversation(conversation.id).await?;
        Ok(conversation)
    }

    pub async fn upsert(&self, conversation: Conversation) {
        let mut state = self.state.lock().await;
        match state.conversations.iter_mut().find(|c| c.id == conversation.id) {
            Some(existing) => *existing = conversation,
            None => state.conversations.push(conversation),
        }
        sort_by_activity(&mut state.conversations);
    }

    /// Records activity from a pushed message. Returns whether unread was bumped,
    /// or `None` when the conversation is not in the local list.
    pub async fn note_incoming(&self, message: &Message, own_user: Option<UserId>) -> Option<bool> {
        let mut state = self.state.lock().await;
        let active = state.active;
        let conv = state
            .conversations
            .iter_mut()
            .find(|c| c.id == message.conversation_id)?;
        if message.created_at > conv.last_activity_at {
            conv.last_activity_at = message.created_at;
        }
        let counted = active != Some(conv.id) && Some(message.sender.id) != own_user;
        if counted {
            conv.unread_count = conv.unread_count.saturating_add(1);
        }
        sort_by_activity(&mut state.conversations);
        Some(counted)
    }

    /// Applies a read mark made elsewhere (another tab or device).
    pub async fn clear_unread_local(&self, id: ConversationId) {
        let mut state = self.state.lock().await;
        if let Some(conv) = state.conversations.iter_mut().find(|c| c.id == id) {
            conv.unread_count = 0;
        }
    }

    pub async fn remove(&self, id: ConversationId) {
        {
            let mut state = self.state.lock().await;
            state.conversations.retain(|c| c.id != id);
            if state.active == Some(id) {
                state.active = None;
                self.pager.reset().await;
            }
        }
        debug!(conversation_id = id, "conversation removed");
        self.bus.publish(ChatEvent::ConversationRemoved(id));
    }

    pub async fn conversations(&self) -> Vec<Conversation> {
        self.state.lock().await.conversations.clone()
    }

    pub async fn get(&self, id: ConversationId) -> Option<Conversation> {
        self.state
            .lock()
            .await
            .conversations
            .iter()
            .find(|c| c.id == id)
            .cloned()
    }

    pub async fn active(&self) -> Option<ConversationId> {
        self.state.lock().await.active
    }

    pub async fn is_loaded(&self) -> bool {
        self.state.lock().await.loaded
    }

    /// Sum of cached unread counts, `None` until the list has been loaded.
    pub async fn total_unread(&self) -> Option<u64> {
        let state = self.state.lock().await;
        if !state.loaded {
            return None;
        }
        Some(state.conversations.iter().map(|c| c.unread_count as u64).sum())
    }

    async fn handle_failure(&self, id: ConversationId, err: &ChatError) {
        match err {
            ChatError::Auth => self.bus.escalate(err),
            ChatError::ConflictOrNotFound(_) => self.remove(id).await,
            _ => {}
        }
    }
}

fn sort_by_activity(conversations: &mut [Conversation]) {
    conversations.sort_by(|a, b| {
        b.last_activity_at
            .cmp(&a.last_activity_at)
            .then_with(|| b.id.cmp(&a.id))
    });
}
