use crate::events::{ChatEvent, EventBus};
use crate::types::{ConversationId, UserId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingSignal {
    pub user_id: UserId,
    pub conversation_id: ConversationId,
    pub first_seen: Instant,
    pub expires_at: Instant,
}

impl TypingSignal {
    pub fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// Remote users currently typing. Signals live in first-seen order.
#[derive(Clone)]
pub struct TypingTracker {
    window: Duration,
    signals: Arc<Mutex<Vec<TypingSignal>>>,
}

impl TypingTracker {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            signals: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub async fn on_typing_event(&self, user_id: UserId, conversation_id: ConversationId) -> bool {
        self.record_at(user_id, conversation_id, Instant::now()).await
    }

    /// Inserts or refreshes a signal. Returns true when the user was not already visible.
    pub async fn record_at(&self, user_id: UserId, conversation_id: ConversationId, now: Instant) -> bool {
        let mut signals = self.signals.lock().await;
        let expires_at = now + self.window;
        if let Some(pos) = signals
            .iter()
            .position(|s| s.user_id == user_id && s.conversation_id == conversation_id)
        {
            if signals[pos].is_live(now) {
                signals[pos].expires_at = expires_at;
                return false;
            }
            signals.remove(pos);
        }
        signals.push(TypingSignal {
            user_id,
            conversation_id,
            first_seen: now,
            expires_at,
        });
        true
    }

    pub async fn visible_typers(&self, conversation_id: ConversationId) -> Vec<TypingSignal> {
        self.visible_at(conversation_id, Instant::now()).await
    }

    pub async fn visible_at(&self, conversation_id: ConversationId, now: Instant) -> Vec<TypingSignal> {
        self.signals
            .lock()
            .await
            .iter()
            .filter(|s| s.conversation_id == conversation_id && s.is_live(now))
            .cloned()
            .collect()
    }

    /// A message from the user ends their typing indicator.
    pub async fn clear_user(&self, conversation_id: ConversationId, user_id: UserId) -> bool {
        let mut signals = self.signals.lock().await;
        let before = signals.len();
        signals.retain(|s| !(s.conversation_id == conversation_id && s.user_id == user_id));
        signals.len() != before
    }

    /// Drops expired signals and returns the conversations that lost a typer.
    pub async fn sweep(&self, now: Instant) -> Vec<ConversationId> {
        let mut signals = self.signals.lock().await;
        let mut changed = Vec::new();
        signals.retain(|s| {
            if s.is_live(now) {
                return true;
            }
            if !changed.contains(&s.conversation_id) {
                changed.push(s.conversation_id);
            }
            false
        });
        changed
    }

    pub fn spawn_sweeper(&self, every: Duration, bus: EventBus) -> JoinHandle<()> {
        let tracker = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every.max(Duration::from_millis(10)));
            loop {
                ticker.tick().await;
                for conversation_id in tracker.sweep(Instant::now()).await {
                    bus.publish(ChatEvent::TypingChanged(conversation_id));
                }
            }
        })
    }
}
