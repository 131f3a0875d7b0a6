//! OpenAI-compatible chat completions adapter for the `ChatModel` port.
//!
//! Streams `/chat/completions` with `stream: true` and turns each SSE `data:`
//! line into a [`ModelChunk`]. Any provider speaking this dialect works
//! (OpenAI, Ollama, LM Studio, llama.cpp, OpenRouter, Gemini's compatibility
//! endpoint).

use std::fmt::Display;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use reqwest::Client;
use serde_json::{Map, Value, json};
use toolchat_core::{
    ChatMessage, ChatModel, ModelChunk, ModelError, ModelSettings, ModelStream, ToolCallChunk,
    ToolDefinition, to_gemini_tools,
};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// `ChatModel` over an OpenAI-compatible HTTP API.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleModel {
    client: Client,
    endpoint: String,
    settings: ModelSettings,
}

impl OpenAiCompatibleModel {
    pub fn new(settings: ModelSettings) -> Self {
        let base = settings.base_url().unwrap_or(DEFAULT_BASE_URL);
        Self {
            client: Client::new(),
            endpoint: format!("{}/chat/completions", base.trim_end_matches('/')),
            settings,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Whether tool schemas must use the Gemini dialect.
    fn wants_gemini_schema(&self) -> bool {
        self.settings
            .model_provider
            .as_deref()
            .is_some_and(|provider| {
                let provider = provider.to_ascii_lowercase();
                provider.contains("gemini") || provider.starts_with("google")
            })
    }

    /// Request body for one streamed completion.
    ///
    /// Extra settings are copied in last but never replace a key set here.
    pub fn request_body(&self, messages: &[ChatMessage], tools: &[ToolDefinition]) -> Value {
        let mut body = Map::new();
        body.insert("model".to_string(), json!(self.settings.model));
        body.insert("stream".to_string(), json!(true));
        body.insert(
            "messages".to_string(),
            Value::Array(messages.iter().map(wire_message).collect()),
        );

        if !tools.is_empty() {
            let tools = if self.wants_gemini_schema() {
                to_gemini_tools(tools)
            } else {
                tools.to_vec()
            };
            body.insert("tools".to_string(), json!(tools));
        }

        if let Some(temperature) = self.settings.temperature {
            body.insert("temperature".to_string(), json!(temperature));
        }
        if let Some(top_p) = self.settings.top_p {
            body.insert("top_p".to_string(), json!(top_p));
        }
        if let Some(max_tokens) = self.settings.max_tokens {
            body.insert("max_tokens".to_string(), json!(max_tokens));
        }

        for (key, value) in &self.settings.extra {
            body.entry(key.clone()).or_insert_with(|| value.clone());
        }

        Value::Object(body)
    }
}

#[async_trait]
impl ChatModel for OpenAiCompatibleModel {
    async fn stream(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ModelStream, ModelError> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&self.request_body(messages, tools));
        if let Some(api_key) = self.settings.api_key.as_deref().filter(|k| !k.is_empty()) {
            request = request.bearer_auth(api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ModelError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Request(format!("HTTP {status}: {body}")));
        }

        Ok(sse_chunks(response.bytes_stream()))
    }
}

/// Decode a chat completions SSE body into model chunks.
///
/// Bytes are buffered until a full line arrives, so a multi-byte character
/// split across network reads is decoded whole. The stream ends at
/// `data: [DONE]` or when the body ends.
fn sse_chunks<S, B, E>(body: S) -> ModelStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let stream = async_stream::stream! {
        let mut body = Box::pin(body);
        let mut buffer: Vec<u8> = Vec::new();

        while let Some(next) = body.next().await {
            match next {
                Ok(bytes) => buffer.extend_from_slice(bytes.as_ref()),
                Err(e) => {
                    yield Err(ModelError::Stream(e.to_string()));
                    return;
                }
            }

            while let Some(line_end) = buffer.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=line_end).collect();
                let line = match std::str::from_utf8(&line) {
                    Ok(line) => line.trim(),
                    Err(e) => {
                        yield Err(ModelError::InvalidResponse(format!("SSE line is not UTF-8: {e}")));
                        return;
                    }
                };

                let Some(data) = line.strip_prefix("data:").map(str::trim_start) else {
                    continue;
                };
                if data == "[DONE]" {
                    return;
                }
                match parse_sse_data(data) {
                    Ok(Some(chunk)) => yield Ok(chunk),
                    Ok(None) => {}
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }
        }
    };

    Box::pin(stream)
}

/// One message in the chat completions wire format.
fn wire_message(message: &ChatMessage) -> Value {
    match message {
        ChatMessage::System { content } => json!({"role": "system", "content": content}),
        ChatMessage::Human { content } => json!({"role": "user", "content": content}),
        ChatMessage::Ai {
            content,
            tool_calls,
        } => {
            let mut wire = json!({"role": "assistant", "content": content});
            if !tool_calls.is_empty() {
                wire["tool_calls"] = tool_calls
                    .iter()
                    .map(|call| {
                        json!({
                            "id": call.id,
                            "type": "function",
                            "function": {"name": call.name, "arguments": call.arguments},
                        })
                    })
                    .collect();
            }
            wire
        }
        ChatMessage::ToolResult {
            tool_call_id,
            content,
        } => json!({"role": "tool", "tool_call_id": tool_call_id, "content": content}),
    }
}

/// Parse one SSE `data:` payload.
///
/// Payloads without a choice (usage-only chunks, keep-alives) yield `None`.
/// A payload carrying an `error` object is a stream failure.
fn parse_sse_data(data: &str) -> Result<Option<ModelChunk>, ModelError> {
    let value: Value = serde_json::from_str(data)
        .map_err(|e| ModelError::InvalidResponse(format!("{e}: {data}")))?;

    if let Some(error) = value.get("error").filter(|error| !error.is_null()) {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map_or_else(|| error.to_string(), str::to_string);
        return Err(ModelError::Stream(message));
    }

    let Some(delta) = value.pointer("/choices/0/delta") else {
        return Ok(None);
    };

    let content = delta
        .get("content")
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
        .map(str::to_string);

    let tool_call_chunks: Vec<ToolCallChunk> = delta
        .get("tool_calls")
        .and_then(Value::as_array)
        .map(|calls| {
            calls
                .iter()
                .map(|call| ToolCallChunk {
                    index: call
                        .get("index")
                        .and_then(Value::as_u64)
                        .and_then(|index| u32::try_from(index).ok())
                        .unwrap_or(0),
                    id: call.get("id").and_then(Value::as_str).map(str::to_string),
                    name: call
                        .pointer("/function/name")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    args: call
                        .pointer("/function/arguments")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                })
                .collect()
        })
        .unwrap_or_default();

    if content.is_none() && tool_call_chunks.is_empty() {
        return Ok(None);
    }

    Ok(Some(ModelChunk {
        content,
        tool_call_chunks,
    }))
}
