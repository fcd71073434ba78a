//! Relay loop: one session per duplex channel. Reads one request at a time, streams the
//! model's answer back fragment by fragment, then commits the turn to history.
//!
//! Requests that fail to decode or validate, and turns whose upstream call fails,
//! are logged and dropped without a response; only a channel error ends the session.

use crate::channel::{ChannelError, DuplexChannel};
use crate::llm::{build_messages, ConversationMessage, LlmBackend, LlmError};
use crate::session::Session;
use futures_util::StreamExt;
use serde::Deserialize;

/// Frame written after the last fragment of a completed answer. Empty fragments are
/// never forwarded, so an empty frame cannot be mistaken for answer text.
pub const ANSWER_SENTINEL: &str = "";

/// Inbound request: `{"content": "...", "images": ["https://...", ...]}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InboundRequest {
    pub content: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub images: Vec<String>,
}

/// `"images": null` means no images, same as leaving the field out.
fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let images: Option<Vec<String>> = Option::deserialize(deserializer)?;
    Ok(images.unwrap_or_default())
}

impl InboundRequest {
    /// Decode and validate one inbound payload.
    pub fn decode(payload: &[u8]) -> Result<Self, RelayError> {
        let req: InboundRequest = serde_json::from_slice(payload)?;
        if req.content.is_empty() {
            return Err(RelayError::Validation("content is required"));
        }
        Ok(req)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("invalid request format: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid request: {0}")]
    Validation(&'static str),
    #[error("failed to open upstream stream: {0}")]
    Dispatch(LlmError),
    #[error("upstream stream failed: {0}")]
    Stream(LlmError),
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

/// Per-gateway relay settings shared by every session.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    /// Model id sent with every upstream request.
    pub model: String,
    /// Leading system message for every upstream request; never stored in history.
    pub system_prompt: Option<String>,
    /// When set, written once after a mid-stream failure so the client can tell the
    /// answer is incomplete. Unset means the client only sees the missing sentinel.
    pub error_frame: Option<String>,
}

impl RelaySettings {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system_prompt: None,
            error_frame: None,
        }
    }
}

/// Drive one session until its channel closes. Returns the session so the caller can
/// report on it; history is dropped with it.
pub async fn run_session<C, B>(channel: &mut C, backend: &B, settings: &RelaySettings) -> Session
where
    C: DuplexChannel + ?Sized,
    B: LlmBackend + ?Sized,
{
    let mut session = Session::new();
    log::info!("session {} opened", session.id());

    loop {
        let payload = match channel.recv().await {
            Ok(p) => p,
            Err(e) => {
                log::info!("session {} closed: {}", session.id(), e);
                break;
            }
        };

        let request = match InboundRequest::decode(&payload) {
            Ok(r) => r,
            Err(e) => {
                log::warn!("session {}: dropping request: {}", session.id(), e);
                continue;
            }
        };

        match run_turn(channel, backend, settings, &mut session, request).await {
            Ok(()) => {}
            Err(RelayError::Channel(e)) => {
                log::info!("session {} closed during turn: {}", session.id(), e);
                break;
            }
            Err(e) => {
                log::warn!("session {}: turn abandoned: {}", session.id(), e);
            }
        }
    }

    session
}

/// One request/response cycle. History is only touched after the stream ends cleanly.
pub async fn run_turn<C, B>(
    channel: &mut C,
    backend: &B,
    settings: &RelaySettings,
    session: &mut Session,
    request: InboundRequest,
) -> Result<(), RelayError>
where
    C: DuplexChannel + ?Sized,
    B: LlmBackend + ?Sized,
{
    let user = ConversationMessage::user_turn(&request.content, request.images.as_slice());
    let messages = build_messages(settings.system_prompt.as_deref(), session.messages(), &user);
    log::debug!(
        "session {}: dispatching {} message(s) with {} image(s) to {}",
        session.id(),
        messages.len(),
        request.images.len(),
        settings.model
    );

    let mut stream = backend
        .stream_complete(&settings.model, &messages)
        .await
        .map_err(RelayError::Dispatch)?;

    let mut answer = String::new();
    while let Some(fragment) = stream.next().await {
        let fragment = match fragment {
            Ok(f) => f,
            Err(e) => {
                drop(stream);
                if let Some(ref frame) = settings.error_frame {
                    channel.send_text(frame).await?;
                }
                return Err(RelayError::Stream(e));
            }
        };
        if fragment.is_empty() {
            continue;
        }
        channel.send_text(&fragment).await?;
        answer.push_str(&fragment);
    }
    drop(stream);

    session.commit_turn(user, answer);
    channel.send_text(ANSWER_SENTINEL).await?;
    log::debug!("session {}: turn complete, {} message(s) in history", session.id(), session.len());
    Ok(())
}
