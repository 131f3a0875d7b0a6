//! HTTP+SSE transport.
//!
//! The client opens a `GET` event stream. The server's first `endpoint`
//! event names the URL (often relative, carrying a session id) that client
//! messages are `POST`ed to. Server messages arrive as `message` events.

use std::fmt::Display;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use reqwest::Url;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use tokio::sync::oneshot;
use tokio::time::timeout;

use crate::client::{Inbound, McpClient, McpClientError, Outbound};

const ENDPOINT_EVENT: &str = "endpoint";
const MESSAGE_EVENT: &str = "message";

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SseEvent {
    pub event: String,
    pub data: String,
}

/// Incremental `text/event-stream` decoder.
///
/// Bytes are buffered until a line is complete, so a multi-byte character
/// split across two reads is decoded whole.
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    buffer: Vec<u8>,
    event: String,
    data: Vec<String>,
}

impl SseDecoder {
    /// Feed raw bytes and return the events they complete.
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(line_end) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=line_end).collect();
            let line = String::from_utf8_lossy(&line);
            if let Some(event) = self.line(line.trim_end_matches(['\n', '\r'])) {
                events.push(event);
            }
        }
        events
    }

    fn line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = line
            .split_once(':')
            .map_or((line, ""), |(field, value)| {
                (field, value.strip_prefix(' ').unwrap_or(value))
            });
        match field {
            "event" => self.event = value.to_string(),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = std::mem::take(&mut self.event);
        if self.data.is_empty() {
            return None;
        }
        Some(SseEvent {
            event: if event.is_empty() {
                MESSAGE_EVENT.to_string()
            } else {
                event
            },
            data: std::mem::take(&mut self.data).join("\n"),
        })
    }
}

struct SseOutbound {
    http: reqwest::Client,
    endpoint: Url,
    /// Local process started for this server, if the entry names a command.
    launcher: Option<McpClient>,
}

#[async_trait]
impl Outbound for SseOutbound {
    async fn send(&self, message: String) -> Result<(), McpClientError> {
        let response = self
            .http
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(message)
            .send()
            .await
            .map_err(|e| McpClientError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(McpClientError::Transport(format!(
                "HTTP {status} posting to {}",
                self.endpoint
            )));
        }
        Ok(())
    }

    async fn close(&self) {
        if let Some(launcher) = &self.launcher {
            launcher.shutdown().await;
        }
    }
}

impl McpClient {
    /// Open the event stream at `url`, wait for the endpoint announcement,
    /// then complete the MCP handshake.
    ///
    /// `launcher` is kept alive for the lifetime of the connection and shut
    /// down with it.
    pub async fn connect_sse(
        server_name: &str,
        url: &str,
        launcher: Option<Self>,
        request_timeout: Duration,
    ) -> Result<Self, McpClientError> {
        let url = Url::parse(url)
            .map_err(|e| McpClientError::Transport(format!("Invalid SSE URL '{url}': {e}")))?;
        let http = reqwest::Client::new();

        let response = timeout(
            request_timeout,
            http.get(url.clone())
                .header(ACCEPT, "text/event-stream")
                .send(),
        )
        .await
        .map_err(|_| McpClientError::Timeout {
            method: "connect".to_string(),
            seconds: request_timeout.as_secs(),
        })?
        .map_err(|e| McpClientError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(McpClientError::Transport(format!("HTTP {status} from {url}")));
        }

        let inbound = Inbound::new(server_name);
        let (endpoint_tx, endpoint_rx) = oneshot::channel();
        let reader = tokio::spawn(read_events(
            inbound.clone(),
            url.clone(),
            response.bytes_stream(),
            endpoint_tx,
        ));

        let endpoint = match timeout(request_timeout, endpoint_rx).await {
            Ok(Ok(Ok(endpoint))) => endpoint,
            Ok(Ok(Err(message))) => {
                reader.abort();
                return Err(McpClientError::Transport(message));
            }
            Ok(Err(_)) => {
                reader.abort();
                return Err(McpClientError::Transport(
                    "Event stream ended before the endpoint event".to_string(),
                ));
            }
            Err(_) => {
                reader.abort();
                return Err(McpClientError::Timeout {
                    method: ENDPOINT_EVENT.to_string(),
                    seconds: request_timeout.as_secs(),
                });
            }
        };

        tracing::debug!(server_name = %server_name, endpoint = %endpoint, "SSE endpoint announced");

        let outbound = SseOutbound {
            http,
            endpoint,
            launcher,
        };
        Self::start(Box::new(outbound), inbound, vec![reader], request_timeout).await
    }
}

/// Decode the event stream until it ends, routing `message` events.
///
/// The first `endpoint` event is resolved against `base` and reported once.
async fn read_events<S, B, E>(
    inbound: Inbound,
    base: Url,
    stream: S,
    endpoint_tx: oneshot::Sender<Result<Url, String>>,
) where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
{
    let mut stream = Box::pin(stream);
    let mut endpoint_tx = Some(endpoint_tx);
    let mut decoder = SseDecoder::default();

    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::debug!(server_name = %inbound.server_name(), error = %e, "SSE stream failed");
                break;
            }
        };

        for event in decoder.push(chunk.as_ref()) {
            match event.event.as_str() {
                ENDPOINT_EVENT => {
                    if let Some(tx) = endpoint_tx.take() {
                        let endpoint = base.join(event.data.trim()).map_err(|e| {
                            format!("Invalid endpoint '{}': {e}", event.data.trim())
                        });
                        let _ = tx.send(endpoint);
                    }
                }
                MESSAGE_EVENT => inbound.deliver(&event.data),
                other => {
                    tracing::debug!(server_name = %inbound.server_name(), event = other, "Ignoring SSE event");
                }
            }
        }
    }

    tracing::debug!(server_name = %inbound.server_name(), "MCP event stream closed");
    inbound.finish();
}
