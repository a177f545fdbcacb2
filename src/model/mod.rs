pub mod openai;

use crate::bridge::{Message, ToolCallRequest};
use crate::catalog::ToolCatalog;
use crate::error::Result;
use async_trait::async_trait;

pub use openai::OpenAiClient;

/// What the model decided to do with the conversation so far.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    FinalAnswer(String),
    ToolCallBatch(Vec<ToolCallRequest>),
}

/// Snapshot handed to the model; the client never mutates history.
#[derive(Debug, Clone, Copy)]
pub struct CompletionRequest<'a> {
    pub system_prompt: Option<&'a str>,
    pub history: &'a [Message],
    pub catalog: &'a ToolCatalog,
}

#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Ask the model for its next step. Rate limits are reported, not retried.
    async fn complete(&self, request: CompletionRequest<'_>) -> Result<Outcome>;

    fn model_name(&self) -> &str;
}
