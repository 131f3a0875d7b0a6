#![doc = include_str!(concat!(env!("OUT_DIR"), "/README_GENERATED.md"))]
#![deny(unsafe_code)]
#![deny(unused_crate_dependencies)]

pub mod accumulator;
pub mod dispatch;
pub mod engine;
pub mod history;
pub mod input;
pub mod prompt;
pub mod session;

pub use accumulator::ToolCallAccumulator;
pub use dispatch::{CANCELLED_MESSAGE, dispatch_tool_calls, display_arguments, tool_result_message};
pub use engine::{AgentError, QueryEngine, QueryOutcome, ToolSurface};
pub use history::convert_stored_messages;
pub use input::{AttachmentError, normalize_input};
pub use prompt::{DEFAULT_RULES_FILE, default_system_prompt, load_rules, system_prompt};
pub use session::{ChatExchange, ChatSession, DEFAULT_TITLE};
