//! Events streamed to the caller while a query runs.
//!
//! Wire shape is `{"type": "...", "content": ...}`, one JSON object per event.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::McpToolResult;

/// A tool call as announced to the UI, with arguments already parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallInfo {
    pub name: String,
    pub arguments: Value,
}

/// Outcome of one tool call. `result` is `null` when the tool had no route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultInfo {
    pub name: String,
    pub result: Option<McpToolResult>,
}

/// Chat identity, sent once a conversation is created or resumed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatInfo {
    pub id: String,
    pub title: String,
}

/// Persisted ids of the user and assistant messages of this exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageInfo {
    pub user_message_id: String,
    pub assistant_message_id: String,
}

/// One event on the query stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "snake_case")]
pub enum ChatStreamEvent {
    /// A text delta from the model.
    Text(String),
    /// Tool calls the model requested this turn, before dispatch.
    ToolCalls(Vec<ToolCallInfo>),
    /// One tool call finished.
    ToolResult(ToolResultInfo),
    /// A failure the UI should show.
    Error(String),
    ChatInfo(ChatInfo),
    MessageInfo(MessageInfo),
}

impl ChatStreamEvent {
    pub fn text(delta: impl Into<String>) -> Self {
        Self::Text(delta.into())
    }

    pub fn tool_result(name: impl Into<String>, result: Option<McpToolResult>) -> Self {
        Self::ToolResult(ToolResultInfo {
            name: name.into(),
            result,
        })
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(message.into())
    }
}
