//! Port definitions (trait abstractions) for external systems.
//!
//! Ports define the interfaces the core needs from the outside world,
//! without coupling to any concrete provider or transport.
//!
//! # Design Rules
//!
//! - No provider SDK types in any signature
//! - Traits are object-safe and `Send + Sync`, used behind `Arc<dyn _>`
//! - Error types describe domain failures, not transport internals

mod chat_model;
mod event_sink;
mod mcp_connection;
mod mcp_error;

pub use chat_model::{ChatModel, ModelChunk, ModelError, ModelStream, ToolCallChunk};
pub use event_sink::{ChannelSink, ChatEventSink, NoopSink};
pub use mcp_connection::{McpConnection, ToolIndex};
pub use mcp_error::{McpError, McpErrorCategory, McpErrorInfo, McpServiceError};
