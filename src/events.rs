use crate::error::ChatError;
use crate::types::{ConversationId, MessageId};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

const BUS_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    SessionInvalid,
    ConversationsLoaded,
    ConversationSelected(ConversationId),
    ConversationRemoved(ConversationId),
    ConversationRead(ConversationId),
    MessageReceived {
        conversation_id: ConversationId,
        message_id: MessageId,
    },
    MessageSent {
        conversation_id: ConversationId,
        message_id: MessageId,
    },
    TypingChanged(ConversationId),
    UnreadChanged(u64),
    Error(String),
}

#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ChatEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    pub fn publish(&self, event: ChatEvent) {
        tracing::trace!(?event, "publish");
        let _ = self.tx.send(event);
    }

    /// Forwards errors that belong to the app shell rather than the caller.
    pub fn escalate(&self, err: &ChatError) {
        if *err == ChatError::Auth {
            self.publish(ChatEvent::SessionInvalid);
        }
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Live subscription; dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    rx: broadcast::Receiver<ChatEvent>,
}

impl Subscription {
    /// Next event, or `None` once the bus is gone. Lagged events are skipped.
    pub async fn recv(&mut self) -> Option<ChatEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("event subscriber lagged, skipped {skipped} events");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    pub fn try_recv(&mut self) -> Option<ChatEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}
