//! Iris core library: streaming multimodal chat relay, OpenAI-compatible client,
//! image storage, and the gateway used by the CLI.

pub mod channel;
pub mod config;
pub mod gateway;
pub mod init;
pub mod llm;
pub mod relay;
pub mod session;
pub mod storage;
