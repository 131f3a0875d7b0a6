#![doc = include_str!(concat!(env!("OUT_DIR"), "/README_GENERATED.md"))]
#![deny(unsafe_code)]
#![deny(unused_crate_dependencies)]

pub mod bootstrap;
pub mod config;
pub mod handlers;
pub mod logging;
pub mod openai;
pub mod parser;
pub mod sink;

pub use bootstrap::{CliContext, bootstrap};
pub use config::CliConfig;
pub use openai::OpenAiCompatibleModel;
pub use parser::{Cli, Commands};
pub use sink::TerminalSink;
