//! WebSocket transport: one JSON-RPC message per text frame, `mcp` subprotocol.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::client::{Inbound, McpClient, McpClientError, Outbound};

const SUBPROTOCOL: &str = "mcp";

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct WebSocketOutbound {
    server_name: String,
    sink: Mutex<Option<SplitSink<WsStream, WsMessage>>>,
}

#[async_trait]
impl Outbound for WebSocketOutbound {
    async fn send(&self, message: String) -> Result<(), McpClientError> {
        let mut guard = self.sink.lock().await;
        let sink = guard.as_mut().ok_or(McpClientError::NotConnected)?;
        sink.send(WsMessage::Text(message))
            .await
            .map_err(|e| McpClientError::Transport(e.to_string()))
    }

    async fn close(&self) {
        if let Some(mut sink) = self.sink.lock().await.take() {
            if let Err(e) = sink.close().await {
                tracing::debug!(server_name = %self.server_name, error = %e, "WebSocket close failed");
            }
        }
    }
}

impl McpClient {
    /// Open a WebSocket to `url` and complete the MCP handshake.
    pub async fn connect_websocket(
        server_name: &str,
        url: &str,
        request_timeout: Duration,
    ) -> Result<Self, McpClientError> {
        let mut request = url
            .into_client_request()
            .map_err(|e| McpClientError::Transport(format!("Invalid WebSocket URL '{url}': {e}")))?;
        request
            .headers_mut()
            .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(SUBPROTOCOL));

        let (ws_stream, _) = timeout(request_timeout, connect_async(request))
            .await
            .map_err(|_| McpClientError::Timeout {
                method: "connect".to_string(),
                seconds: request_timeout.as_secs(),
            })?
            .map_err(|e| McpClientError::Transport(e.to_string()))?;

        let (sink, stream) = ws_stream.split();
        let inbound = Inbound::new(server_name);
        let reader = tokio::spawn(read_frames(inbound.clone(), stream));

        let outbound = WebSocketOutbound {
            server_name: server_name.to_string(),
            sink: Mutex::new(Some(sink)),
        };
        Self::start(Box::new(outbound), inbound, vec![reader], request_timeout).await
    }
}

async fn read_frames(inbound: Inbound, mut stream: SplitStream<WsStream>) {
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => inbound.deliver(&text),
            Ok(WsMessage::Binary(bytes)) => match std::str::from_utf8(&bytes) {
                Ok(text) => inbound.deliver(text),
                Err(e) => {
                    tracing::debug!(server_name = %inbound.server_name(), error = %e, "Skipping non-UTF-8 frame");
                }
            },
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(server_name = %inbound.server_name(), error = %e, "WebSocket read failed");
                break;
            }
        }
    }

    tracing::debug!(server_name = %inbound.server_name(), "MCP WebSocket closed");
    inbound.finish();
}
