use crate::api::ChatBackend;
use crate::error::ChatResult;
use crate::events::{ChatEvent, EventBus};
use crate::store::ConversationStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Total unread badge shown outside the chat view.
///
/// The cached conversation list is the source of truth once it has been loaded;
/// the summary endpoint is only consulted before that.
#[derive(Clone)]
pub struct UnreadPoller {
    store: ConversationStore,
    backend: Arc<dyn ChatBackend>,
    bus: EventBus,
    tx: Arc<watch::Sender<u64>>,
}

impl UnreadPoller {
    pub fn new(store: ConversationStore, backend: Arc<dyn ChatBackend>, bus: EventBus) -> Self {
        let (tx, _) = watch::channel(0);
        Self {
            store,
            backend,
            bus,
            tx: Arc::new(tx),
        }
    }

    pub fn watch(&self) -> watch::Receiver<u64> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> u64 {
        *self.tx.borrow()
    }

    /// Recomputes the badge. On failure the previous value stays on screen.
    pub async fn recompute(&self) -> ChatResult<u64> {
        let total = match self.store.total_unread().await {
            Some(total) => Ok(total),
            None => self.backend.unread_total().await,
        };
        match total {
            Ok(total) => {
                let previous = self.tx.send_replace(total);
                if previous != total {
                    debug!(previous, total, "unread badge changed");
                    self.bus.publish(ChatEvent::UnreadChanged(total));
                }
                Ok(total)
            }
            Err(err) => {
                warn!("unread recompute failed, keeping {}: {err}", self.current());
                self.bus.escalate(&err);
                Err(err)
            }
        }
    }

    pub fn spawn(&self, every: Duration) -> JoinHandle<()> {
        let poller = self.clone();
        let mut events = self.bus.subscribe();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every.max(Duration::from_secs(1)));
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    evt = events.recv() => match evt {
                        None => break,
                        Some(evt) if triggers_recompute(&evt) => {}
                        Some(_) => continue,
                    },
                }
                let _ = poller.recompute().await;
            }
        })
    }
}

fn triggers_recompute(event: &ChatEvent) -> bool {
    matches!(
        event,
        ChatEvent::MessageReceived { .. }
            | ChatEvent::MessageSent { .. }
            | ChatEvent::ConversationRead(_)
            | ChatEvent::ConversationsLoaded
            | ChatEvent::ConversationRemoved(_)
    )
}
