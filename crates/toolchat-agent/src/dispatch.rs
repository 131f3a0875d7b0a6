//! Concurrent execution of one turn's tool calls.
//!
//! Every call runs at once. A `tool_result` event is emitted as each call
//! lands, while the returned results keep request order so the transcript
//! pairs them with the AI message that asked for them.

use futures_util::future::join_all;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use toolchat_core::{
    ChatEventSink, ChatMessage, ChatStreamEvent, McpToolResult, ToolCallRequest, ToolIndex,
};
use tracing::{debug, warn};

/// Error text for calls interrupted by cancellation.
pub const CANCELLED_MESSAGE: &str = "cancelled";

/// Arguments as shown in the `tool_calls` event.
///
/// Text that does not parse is carried as a JSON string so the caller still
/// sees what the model produced.
pub fn display_arguments(arguments: &str) -> Value {
    serde_json::from_str(arguments).unwrap_or_else(|_| Value::String(arguments.to_string()))
}

/// Run `calls` concurrently and collect their results in request order.
///
/// `None` means the tool name had no route.
pub async fn dispatch_tool_calls(
    calls: &[ToolCallRequest],
    index: &ToolIndex,
    sink: &dyn ChatEventSink,
    cancel: &CancellationToken,
) -> Vec<Option<McpToolResult>> {
    join_all(
        calls
            .iter()
            .map(|call| dispatch_one(call, index, sink, cancel)),
    )
    .await
}

async fn dispatch_one(
    call: &ToolCallRequest,
    index: &ToolIndex,
    sink: &dyn ChatEventSink,
    cancel: &CancellationToken,
) -> Option<McpToolResult> {
    let result = tokio::select! {
        biased;
        () = cancel.cancelled() => Some(McpToolResult::error(CANCELLED_MESSAGE)),
        result = invoke(call, index) => result,
    };

    sink.emit(ChatStreamEvent::tool_result(&call.name, result.clone()));
    result
}

async fn invoke(call: &ToolCallRequest, index: &ToolIndex) -> Option<McpToolResult> {
    let Some(connection) = index.get(&call.name) else {
        warn!(tool = %call.name, "No server provides this tool");
        return None;
    };

    let arguments: Value = match serde_json::from_str(&call.arguments) {
        Ok(arguments) => arguments,
        Err(e) => {
            warn!(tool = %call.name, error = %e, "Tool arguments are not valid JSON");
            return Some(McpToolResult::error(format!("Invalid tool arguments: {e}")));
        }
    };

    debug!(tool = %call.name, call_id = %call.id, "Calling tool");
    match connection.call_tool(&call.name, arguments).await {
        Ok(result) => Some(result),
        Err(e) => {
            warn!(tool = %call.name, error = %e, "Tool call failed");
            Some(McpToolResult::error(e.to_string()))
        }
    }
}

/// Transcript message carrying one call's result, keyed by the call id.
///
/// The content is the JSON rendering of the result; a missing route renders
/// as `null`.
pub fn tool_result_message(call: &ToolCallRequest, result: Option<&McpToolResult>) -> ChatMessage {
    let content = serde_json::to_string(&result).unwrap_or_else(|_| "null".to_string());
    ChatMessage::tool_result(call.id.clone(), content)
}
