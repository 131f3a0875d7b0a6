//! Event sink port for streaming query progress to a caller.

use tokio::sync::mpsc;

use crate::events::ChatStreamEvent;

/// Receives events in emission order.
pub trait ChatEventSink: Send + Sync {
    fn emit(&self, event: ChatStreamEvent);
}

/// Sink that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl ChatEventSink for NoopSink {
    fn emit(&self, _event: ChatStreamEvent) {}
}

/// Sink forwarding events into an unbounded channel.
///
/// A dropped receiver is not an error; the query keeps running.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ChatStreamEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ChatStreamEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ChatEventSink for ChannelSink {
    fn emit(&self, event: ChatStreamEvent) {
        let _ = self.tx.send(event);
    }
}
