use crate::error::{ChatError, ChatResult};
use crate::session::SessionContext;
use crate::types::{ConversationId, Message, UserId};
use futures::{Sink, SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

const PING_SECONDS: u64 = 30;

/// Frame as sent by the broadcaster: an event name plus its payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsEnvelope {
    pub event: String,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PushEvent {
    #[serde(rename = "message.created")]
    MessageCreated { message: Message },
    #[serde(rename = "typing")]
    Typing {
        conversation_id: ConversationId,
        user_id: UserId,
    },
    #[serde(rename = "conversation.read")]
    ConversationRead { conversation_id: ConversationId },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PushCommand {
    #[serde(rename = "connect")]
    Connect { token: Option<String> },
    #[serde(rename = "subscribe")]
    Subscribe { channels: Vec<String> },
    #[serde(rename = "ping")]
    Ping,
}

/// Decodes a text frame; `None` for anything that is not an envelope with an object payload.
pub fn decode_push_frame(text: &str) -> Option<PushEvent> {
    let envelope: WsEnvelope = serde_json::from_str(text).ok()?;
    let mut payload = envelope.payload;
    payload
        .as_object_mut()?
        .insert("type".to_string(), serde_json::Value::String(envelope.event));
    serde_json::from_value(payload).ok()
}

pub fn compute_backoff(attempt: u32, max: Duration) -> Duration {
    let exponent = (attempt.max(1) - 1).min(8);
    Duration::from_secs(2_u64.pow(exponent)).min(max)
}

pub fn user_channels(user_id: UserId) -> Vec<String> {
    vec![format!("user.{}", user_id)]
}

/// Keeps a push connection alive and forwards decoded events until `tx` closes.
pub async fn start_push_listener(
    url: String,
    session: SessionContext,
    channels: Vec<String>,
    tx: mpsc::Sender<PushEvent>,
    max_backoff: Duration,
) {
    let mut attempt: u32 = 0;
    loop {
        match run_connection(&url, &session, &channels, &tx).await {
            Ok(()) => attempt = 0,
            Err(ChatError::Auth) => {
                warn!("push channel has no credential, stopping");
                return;
            }
            Err(err) => warn!("push channel error: {err}"),
        }
        if tx.is_closed() {
            return;
        }
        attempt = attempt.saturating_add(1);
        let delay = compute_backoff(attempt, max_backoff);
        debug!(attempt, ?delay, "reconnecting push channel");
        sleep(delay).await;
    }
}

async fn run_connection(
    url: &str,
    session: &SessionContext,
    channels: &[String],
    tx: &mpsc::Sender<PushEvent>,
) -> ChatResult<()> {
    let token = session.token().ok_or(ChatError::Auth)?;
    let (mut socket, _) = connect_async(url)
        .await
        .map_err(|e| ChatError::Network(e.to_string()))?;

    send_command(&mut socket, &PushCommand::Connect { token: Some(token) }).await?;
    send_command(
        &mut socket,
        &PushCommand::Subscribe {
            channels: channels.to_vec(),
        },
    )
    .await?;
    info!("push channel connected");

    let mut ping = tokio::time::interval(Duration::from_secs(PING_SECONDS));
    ping.tick().await;
    loop {
        tokio::select! {
            frame = socket.next() => {
                match frame {
                    None | Some(Ok(WsMessage::Close(_))) => return Ok(()),
                    Some(Err(err)) => return Err(ChatError::Network(err.to_string())),
                    Some(Ok(WsMessage::Text(text))) => {
                        match decode_push_frame(&text) {
                            Some(PushEvent::Unknown) | None => debug!("ignoring push frame: {text}"),
                            Some(event) => {
                                if tx.send(event).await.is_err() {
                                    return Ok(());
                                }
                            }
                        }
                    }
                    Some(Ok(_)) => {}
                }
            }
            _ = ping.tick() => {
                send_command(&mut socket, &PushCommand::Ping).await?;
            }
        }
    }
}

async fn send_command<S>(socket: &mut S, command: &PushCommand) -> ChatResult<()>
where
    S: Sink<WsMessage> + Unpin,
    S::Error: std::fmt::Display,
{
    let text = serde_json::to_string(command).map_err(|e| ChatError::Network(e.to_string()))?;
    socket
        .send(WsMessage::Text(text))
        .await
        .map_err(|e| ChatError::Network(e.to_string()))
}
