//! Assembly of streamed tool-call fragments into complete calls.
//!
//! Fragments are keyed by their stream index. Argument slices are
//! concatenated in arrival order; whenever the buffer looks like a complete
//! object it is parsed and re-serialized into canonical form. A failed parse
//! just means more fragments are coming.

use std::collections::BTreeMap;

use serde_json::Value;
use toolchat_core::{ToolCallChunk, ToolCallRequest};

#[derive(Debug, Default)]
struct PartialCall {
    id: Option<String>,
    name: String,
    arguments: String,
}

/// Collects the tool-call fragments of one model turn.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    calls: BTreeMap<u32, PartialCall>,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one fragment into the call at its index.
    pub fn push(&mut self, chunk: &ToolCallChunk) {
        let call = self.calls.entry(chunk.index).or_default();

        if call.id.is_none() {
            if let Some(id) = chunk.id.as_deref().filter(|id| !id.is_empty()) {
                call.id = Some(id.to_string());
            }
        }

        if let Some(name) = chunk.name.as_deref().filter(|name| !name.is_empty()) {
            call.name = name.to_string();
        }

        if let Some(args) = chunk.args.as_deref() {
            call.arguments.push_str(args);
            canonicalize(&mut call.arguments);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    /// Finished calls in index order.
    ///
    /// Calls that never received an id get a generated one; calls that never
    /// received arguments get `{}`.
    pub fn finish(self) -> Vec<ToolCallRequest> {
        self.calls
            .into_values()
            .map(|call| ToolCallRequest {
                id: call
                    .id
                    .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple())),
                name: call.name,
                arguments: if call.arguments.trim().is_empty() {
                    "{}".to_string()
                } else {
                    call.arguments
                },
            })
            .collect()
    }
}

fn canonicalize(buffer: &mut String) {
    let trimmed = buffer.trim();
    if !(trimmed.starts_with('{') && trimmed.ends_with('}')) {
        return;
    }
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        if let Ok(canonical) = serde_json::to_string(&value) {
            *buffer = canonical;
        }
    }
}
