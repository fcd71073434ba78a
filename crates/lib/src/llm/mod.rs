//! LLM abstraction: multimodal conversation messages, the streaming backend trait,
//! and the OpenAI-compatible client.

pub mod message;
mod openai;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

pub use message::{build_messages, ContentPart, ConversationMessage, ImageUrl, MessageContent, Role};
pub use openai::OpenAiClient;

/// Lazy, finite sequence of content fragments. `None` is end-of-stream; an `Err` item
/// is a failure and is the last item yielded. Dropping the stream releases the
/// underlying transport.
pub type FragmentStream = BoxStream<'static, Result<String, LlmError>>;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("upstream request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("upstream api error: {0}")]
    Api(String),
}

/// A chat-completion provider that can stream its answer.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Open a streaming completion. Errors here mean the stream never opened
    /// (network, auth, non-2xx status); failures after that arrive as stream items.
    async fn stream_complete(
        &self,
        model: &str,
        messages: &[ConversationMessage],
    ) -> Result<FragmentStream, LlmError>;
}
