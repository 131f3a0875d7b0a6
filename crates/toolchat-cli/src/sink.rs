//! Terminal rendering of stream events.

use std::io::Write;

use toolchat_core::{ChatEventSink, ChatStreamEvent};

/// Prints events as they arrive.
///
/// Text deltas go to stdout unbuffered. Tool activity goes to stderr so the
/// answer can be piped on its own. In JSON mode every event is one line on
/// stdout in its wire shape.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalSink {
    json: bool,
}

impl TerminalSink {
    pub const fn new(json: bool) -> Self {
        Self { json }
    }
}

impl ChatEventSink for TerminalSink {
    fn emit(&self, event: ChatStreamEvent) {
        if self.json {
            if let Ok(line) = serde_json::to_string(&event) {
                println!("{line}");
            }
            return;
        }

        if let Some(line) = render(&event) {
            eprintln!("{line}");
            return;
        }

        if let ChatStreamEvent::Text(delta) = event {
            let mut stdout = std::io::stdout().lock();
            let _ = stdout.write_all(delta.as_bytes());
            let _ = stdout.flush();
        }
    }
}

/// Status line for non-text events.
fn render(event: &ChatStreamEvent) -> Option<String> {
    match event {
        ChatStreamEvent::Text(_) | ChatStreamEvent::ChatInfo(_) | ChatStreamEvent::MessageInfo(_) => {
            None
        }
        ChatStreamEvent::ToolCalls(calls) => Some(
            calls
                .iter()
                .map(|call| format!("\n→ {}({})", call.name, call.arguments))
                .collect::<String>(),
        ),
        ChatStreamEvent::ToolResult(info) => Some(match &info.result {
            None => format!("← {}: no server provides this tool", info.name),
            Some(result) if result.success => format!("← {}: ok", info.name),
            Some(result) => format!(
                "← {}: error: {}",
                info.name,
                result.error.as_deref().unwrap_or("unknown error")
            ),
        }),
        ChatStreamEvent::Error(message) => Some(format!("error: {message}")),
    }
}
