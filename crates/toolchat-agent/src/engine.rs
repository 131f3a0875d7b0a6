//! The tool-augmented query loop.
//!
//! One run appends the user's message, then alternates model turns and tool
//! dispatch until a turn requests no tools. Every turn appends at least one
//! message, so the transcript grows strictly until the loop ends.

use futures_util::StreamExt;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use toolchat_core::{
    AgentSettings, ChatEventSink, ChatMessage, ChatModel, ChatStreamEvent, ModelError, QueryInput,
    ToolCallInfo, ToolCallRequest, ToolDefinition, ToolIndex,
};
use tracing::{debug, info, warn};

use crate::accumulator::ToolCallAccumulator;
use crate::dispatch::{display_arguments, dispatch_tool_calls, tool_result_message};
use crate::input::{AttachmentError, normalize_input};

/// Errors that end a query.
#[derive(Debug, Error)]
pub enum AgentError {
    /// No model handle was supplied. The transcript is left untouched.
    #[error("No model configured")]
    ModelNotConfigured,

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Attachment(#[from] AttachmentError),

    /// The model kept requesting tools past the configured cap.
    #[error("Tool loop did not converge within {limit} model turns")]
    IterationsExhausted { limit: u32, partial_text: String },

    /// Regeneration named a message the chat does not hold.
    #[error("Message {0} does not exist")]
    UnknownMessage(String),

    /// Regeneration named a message with no user prompt at or before it.
    #[error("No user prompt precedes message {0}")]
    NoPromptToReplay(String),
}

/// Tools the model may call this run, and where each one is routed.
#[derive(Clone, Copy)]
pub struct ToolSurface<'a> {
    pub index: &'a ToolIndex,
    pub tools: &'a [ToolDefinition],
}

impl<'a> ToolSurface<'a> {
    pub const fn new(index: &'a ToolIndex, tools: &'a [ToolDefinition]) -> Self {
        Self { index, tools }
    }
}

impl std::fmt::Debug for ToolSurface<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolSurface")
            .field("routes", &self.index.len())
            .field("tools", &self.tools.len())
            .finish()
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOutcome {
    /// Text of every turn, concatenated.
    pub text: String,
    /// Whether the run stopped because of cancellation.
    pub cancelled: bool,
    /// Number of model invocations.
    pub iterations: u32,
}

/// Result of streaming one model turn.
struct Turn {
    text: String,
    calls: Vec<ToolCallRequest>,
    cancelled: bool,
}

/// Drives the conversation loop.
#[derive(Debug, Clone, Default)]
pub struct QueryEngine {
    settings: AgentSettings,
}

impl QueryEngine {
    pub const fn new(settings: AgentSettings) -> Self {
        Self { settings }
    }

    pub const fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    /// Run one query against `history`.
    ///
    /// New messages are appended to `history` as they are produced, so the
    /// caller keeps the full transcript even when the run fails or is
    /// cancelled. Cancellation is not an error: the outcome carries the
    /// partial text and `cancelled: true`.
    pub async fn run(
        &self,
        tools: ToolSurface<'_>,
        model: Option<&dyn ChatModel>,
        input: QueryInput,
        history: &mut Vec<ChatMessage>,
        sink: &dyn ChatEventSink,
        cancel: &CancellationToken,
    ) -> Result<QueryOutcome, AgentError> {
        let Some(model) = model else {
            return Err(AgentError::ModelNotConfigured);
        };

        history.push(normalize_input(input).await?);

        let mut text = String::new();
        let mut iterations: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Ok(QueryOutcome {
                    text,
                    cancelled: true,
                    iterations,
                });
            }

            if let Some(limit) = self.settings.max_tool_iterations {
                if iterations >= limit {
                    warn!(limit, "Tool loop hit the iteration cap");
                    return Err(AgentError::IterationsExhausted {
                        limit,
                        partial_text: text,
                    });
                }
            }

            iterations += 1;
            debug!(iteration = iterations, tool_count = tools.tools.len(), "Starting model turn");

            let turn = stream_turn(model, tools.tools, history, sink, cancel).await?;
            text.push_str(&turn.text);

            if turn.cancelled {
                if !turn.text.is_empty() {
                    history.push(ChatMessage::ai(turn.text));
                }
                info!(iterations, "Query cancelled during model turn");
                return Ok(QueryOutcome {
                    text,
                    cancelled: true,
                    iterations,
                });
            }

            if turn.calls.is_empty() {
                history.push(ChatMessage::ai(turn.text));
                info!(iterations, "Query finished");
                return Ok(QueryOutcome {
                    text,
                    cancelled: false,
                    iterations,
                });
            }

            let calls = turn.calls;
            sink.emit(ChatStreamEvent::ToolCalls(
                calls
                    .iter()
                    .map(|call| ToolCallInfo {
                        name: call.name.clone(),
                        arguments: display_arguments(&call.arguments),
                    })
                    .collect(),
            ));
            history.push(ChatMessage::ai_with_tool_calls(turn.text, calls.clone()));

            debug!(call_count = calls.len(), "Dispatching tool calls");
            let results = dispatch_tool_calls(&calls, tools.index, sink, cancel).await;
            history.extend(
                calls
                    .iter()
                    .zip(&results)
                    .map(|(call, result)| tool_result_message(call, result.as_ref())),
            );
        }
    }
}

async fn stream_turn(
    model: &dyn ChatModel,
    tools: &[ToolDefinition],
    history: &[ChatMessage],
    sink: &dyn ChatEventSink,
    cancel: &CancellationToken,
) -> Result<Turn, AgentError> {
    let mut stream = tokio::select! {
        biased;
        () = cancel.cancelled() => {
            return Ok(Turn {
                text: String::new(),
                calls: Vec::new(),
                cancelled: true,
            });
        }
        stream = model.stream(history, tools) => stream?,
    };

    let mut text = String::new();
    let mut accumulator = ToolCallAccumulator::new();

    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                return Ok(Turn {
                    text,
                    calls: Vec::new(),
                    cancelled: true,
                });
            }
            next = stream.next() => next,
        };

        let Some(chunk) = next else {
            break;
        };
        let chunk = chunk?;

        if let Some(delta) = chunk.content.filter(|delta| !delta.is_empty()) {
            text.push_str(&delta);
            sink.emit(ChatStreamEvent::Text(delta));
        }

        for fragment in &chunk.tool_call_chunks {
            accumulator.push(fragment);
        }
    }

    Ok(Turn {
        text,
        calls: accumulator.finish(),
        cancelled: false,
    })
}
