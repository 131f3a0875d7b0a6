//! Wire transports for [`McpClient`](crate::McpClient).
//!
//! - `stdio` - spawned child process, one JSON-RPC message per line
//! - `sse` - `GET` an event stream, `POST` messages to the announced endpoint
//! - `websocket` - one JSON-RPC message per text frame

mod sse;
mod stdio;
mod websocket;
