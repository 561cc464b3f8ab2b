pub mod api;
pub mod composer;
pub mod config;
pub mod error;
pub mod events;
pub mod pager;
pub mod session;
pub mod store;
pub mod types;
pub mod typing;
pub mod unread;
pub mod ws;

pub use config::Config;
pub use error::{ChatError, ChatResult};

use self::api::{ChatBackend, HttpBackend, StagedAttachment};
use self::composer::Composer;
use self::config::{load_config, resolve_session_path};
use self::events::{ChatEvent, EventBus};
use self::pager::{LoadOutcome, MessagePager};
use self::session::SessionContext;
use self::store::ConversationStore;
use self::types::{ConversationId, Message};
use self::typing::TypingTracker;
use self::unread::UnreadPoller;
use self::ws::PushEvent;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Every chat handle of a signed-in session. Cloning shares the same state.
#[derive(Clone)]
pub struct ChatClient {
    pub config: Config,
    pub session: SessionContext,
    pub backend: Arc<dyn ChatBackend>,
    pub bus: EventBus,
    pub store: ConversationStore,
    pub pager: MessagePager,
    pub composer: Composer,
    pub typing: TypingTracker,
    pub unread: UnreadPoller,
}

pub fn create_client() -> anyhow::Result<ChatClient> {
    let config = load_config();
    let session = SessionContext::load(resolve_session_path(&config));
    let backend = HttpBackend::new(&config.api, session.clone())?;
    Ok(ChatClient::new(config, session, Arc::new(backend)))
}

impl ChatClient {
    pub fn new(config: Config, session: SessionContext, backend: Arc<dyn ChatBackend>) -> Self {
        let bus = EventBus::new();
        let pager = MessagePager::new(backend.clone(), config.chat.page_size);
        let store = ConversationStore::new(
            backend.clone(),
            bus.clone(),
            pager.clone(),
            config.chat.conversation_page_limit,
        );
        let composer = Composer::new(
            backend.clone(),
            config.composer.clone(),
            Duration::from_millis(config.chat.typing_notify_throttle_ms),
        );
        let typing = TypingTracker::new(Duration::from_millis(config.chat.typing_window_ms));
        let unread = UnreadPoller::new(store.clone(), backend.clone(), bus.clone());
        Self {
            config,
            session,
            backend,
            bus,
            store,
            pager,
            composer,
            typing,
            unread,
        }
    }

    /// Spawns the background tasks. Abort the handles on teardown.
    pub fn start(&self) -> Vec<JoinHandle<()>> {
        let mut handles = vec![
            self.unread
                .spawn(Duration::from_secs(self.config.chat.unread_poll_seconds)),
            self.typing.spawn_sweeper(
                Duration::from_millis(self.config.chat.typing_sweep_ms),
                self.bus.clone(),
            ),
            self.spawn_session_guard(),
        ];

        if let Some(url) = self.config.push.url.clone() {
            let channels = self
                .session
                .user()
                .map(|u| ws::user_channels(u.id))
                .unwrap_or_default();
            let (tx, mut rx) = mpsc::channel::<PushEvent>(100);
            handles.push(tokio::spawn(ws::start_push_listener(
                url,
                self.session.clone(),
                channels,
                tx,
                Duration::from_secs(self.config.push.reconnect_max_seconds),
            )));
            let client = self.clone();
            handles.push(tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    client.handle_push(event).await;
                }
            }));
        }

        handles
    }

    fn spawn_session_guard(&self) -> JoinHandle<()> {
        let mut events = self.bus.subscribe();
        let session = self.session.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if event != ChatEvent::SessionInvalid {
                    continue;
                }
                match session.clear() {
                    Ok(()) => info!("session invalidated, credential cleared"),
                    Err(err) => error!("failed to clear session: {err:?}"),
                }
            }
        })
    }

    pub async fn handle_push(&self, event: PushEvent) {
        let own_user = self.session.user().map(|u| u.id);
        match event {
            PushEvent::MessageCreated { message } => {
                let conversation_id = message.conversation_id;
                let message_id = message.id;
                if self.typing.clear_user(conversation_id, message.sender.id).await {
                    self.bus.publish(ChatEvent::TypingChanged(conversation_id));
                }
                let shown = self.pager.receive_push(message.clone()).await;
                let known = self.store.note_incoming(&message, own_user).await;
                if known.is_none() && self.store.is_loaded().await {
                    // first message of a conversation this client has not seen yet
                    if let Err(err) = self.store.load_conversations().await {
                        warn!("refreshing conversations after push failed: {err}");
                    }
                }
                debug!(conversation_id, message_id, shown, "push message");
                self.bus.publish(ChatEvent::MessageReceived {
                    conversation_id,
                    message_id,
                });
            }
            PushEvent::Typing {
                conversation_id,
                user_id,
            } => {
                if Some(user_id) == own_user {
                    return;
                }
                if self.typing.on_typing_event(user_id, conversation_id).await {
                    self.bus.publish(ChatEvent::TypingChanged(conversation_id));
                }
            }
            PushEvent::ConversationRead { conversation_id } => {
                self.store.clear_unread_local(conversation_id).await;
                self.bus.publish(ChatEvent::ConversationRead(conversation_id));
            }
            PushEvent::Unknown => {}
        }
    }

    /// Selects a conversation and marks it read. A failed read mark is not fatal.
    pub async fn open_conversation(&self, id: ConversationId) -> ChatResult<LoadOutcome> {
        let outcome = self.store.select_conversation(id).await?;
        if outcome != LoadOutcome::Stale {
            if let Err(err) = self.store.mark_read(id).await {
                warn!(conversation_id = id, "mark read on open failed: {err}");
            }
        }
        Ok(outcome)
    }

    /// Updates the draft and whispers "typing" to the active conversation, throttled.
    pub async fn draft_changed(
        &self,
        text: impl Into<String>,
        attachment: Option<StagedAttachment>,
    ) -> ChatResult<()> {
        let result = self.composer.update_draft(text, attachment).await;
        if let Some(conversation_id) = self.store.active().await {
            if self.composer.typing_due(tokio::time::Instant::now()).await {
                let backend = self.backend.clone();
                tokio::spawn(async move {
                    if let Err(err) = backend.notify_typing(conversation_id).await {
                        debug!(conversation_id, "typing notice failed: {err}");
                    }
                });
            }
        }
        result
    }

    /// Sends the draft to the active conversation. The returned message is merged
    /// into history right away; the later echo is deduplicated by id.
    pub async fn submit(&self) -> ChatResult<Message> {
        let Some(conversation_id) = self.store.active().await else {
            return Err(ChatError::Validation(
                "Nenhuma conversa selecionada.".to_string(),
            ));
        };
        match self.composer.submit(conversation_id).await {
            Ok(message) => {
                let own_user = self.session.user().map(|u| u.id);
                self.store.note_incoming(&message, own_user).await;
                self.pager.receive_push(message.clone()).await;
                self.bus.publish(ChatEvent::MessageSent {
                    conversation_id,
                    message_id: message.id,
                });
                Ok(message)
            }
            Err(err) => {
                match &err {
                    ChatError::Auth => self.bus.escalate(&err),
                    ChatError::ConflictOrNotFound(_) => self.store.remove(conversation_id).await,
                    _ => {}
                }
                Err(err)
            }
        }
    }
}
