//! Duplex message channel between one client and the relay.
//!
//! The relay only needs "next inbound payload" and "send one text frame"; the
//! WebSocket implementation below adapts an upgraded axum socket to that.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use tokio::sync::broadcast;

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("channel closed")]
    Closed,
    #[error("channel transport error: {0}")]
    Transport(String),
}

/// Bidirectional message transport owned by one session.
#[async_trait]
pub trait DuplexChannel: Send {
    /// Wait for the next inbound payload. Any error ends the session.
    async fn recv(&mut self) -> Result<Vec<u8>, ChannelError>;

    /// Send one outbound text frame.
    async fn send_text(&mut self, text: &str) -> Result<(), ChannelError>;
}

/// WebSocket-backed channel. Text and binary frames are both payloads; a close frame,
/// end of stream, or the gateway shutdown notice closes the channel.
pub struct WsChannel {
    socket: WebSocket,
    shutdown: broadcast::Receiver<()>,
}

impl WsChannel {
    pub fn new(socket: WebSocket, shutdown: broadcast::Receiver<()>) -> Self {
        Self { socket, shutdown }
    }

    /// Best-effort close frame once the session is over.
    pub async fn close(mut self) {
        let _ = self.socket.send(Message::Close(None)).await;
    }
}

#[async_trait]
impl DuplexChannel for WsChannel {
    async fn recv(&mut self) -> Result<Vec<u8>, ChannelError> {
        loop {
            tokio::select! {
                _ = self.shutdown.recv() => return Err(ChannelError::Closed),
                msg = self.socket.recv() => {
                    match msg {
                        None => return Err(ChannelError::Closed),
                        Some(Err(e)) => return Err(ChannelError::Transport(e.to_string())),
                        Some(Ok(Message::Text(text))) => return Ok(text.into_bytes()),
                        Some(Ok(Message::Binary(data))) => return Ok(data),
                        Some(Ok(Message::Close(_))) => return Err(ChannelError::Closed),
                        // axum answers pings itself
                        Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {}
                    }
                }
            }
        }
    }

    async fn send_text(&mut self, text: &str) -> Result<(), ChannelError> {
        self.socket
            .send(Message::Text(text.to_string()))
            .await
            .map_err(|e| ChannelError::Transport(e.to_string()))
    }
}
