//! Model port: bind tools, stream a completion.

use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;
use thiserror::Error;

use crate::domain::{ChatMessage, ToolDefinition};

/// Errors a model adapter can report.
#[derive(Debug, Error)]
pub enum ModelError {
    /// The request could not be sent or was rejected.
    #[error("Model request failed: {0}")]
    Request(String),

    /// The stream broke after it started.
    #[error("Model stream failed: {0}")]
    Stream(String),

    /// The provider answered with something we cannot interpret.
    #[error("Invalid model response: {0}")]
    InvalidResponse(String),
}

/// Fragment of one tool call, as streamed.
///
/// Fragments sharing an `index` belong to the same call. Any field may be
/// absent on any fragment; `args` is a raw slice of JSON text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolCallChunk {
    pub index: u32,
    pub id: Option<String>,
    pub name: Option<String>,
    pub args: Option<String>,
}

impl ToolCallChunk {
    pub const fn new(index: u32) -> Self {
        Self {
            index,
            id: None,
            name: None,
            args: None,
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_args(mut self, args: impl Into<String>) -> Self {
        self.args = Some(args.into());
        self
    }
}

/// One streamed response chunk: a text delta and/or tool-call fragments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelChunk {
    pub content: Option<String>,
    pub tool_call_chunks: Vec<ToolCallChunk>,
}

impl ModelChunk {
    pub fn text(delta: impl Into<String>) -> Self {
        Self {
            content: Some(delta.into()),
            tool_call_chunks: Vec::new(),
        }
    }

    pub fn tool_call(chunk: ToolCallChunk) -> Self {
        Self {
            content: None,
            tool_call_chunks: vec![chunk],
        }
    }
}

/// Stream of chunks for one model turn.
pub type ModelStream = Pin<Box<dyn Stream<Item = Result<ModelChunk, ModelError>> + Send>>;

/// A chat model that can call tools.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Bind `tools` and start a streamed completion over `messages`.
    async fn stream(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ModelStream, ModelError>;
}
