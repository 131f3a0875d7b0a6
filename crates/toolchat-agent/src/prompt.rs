//! Default system prompt and user-defined rules.
//!
//! Rules come from a plain text file (`.customrules` in the working
//! directory unless another path is given). They are embedded verbatim and
//! take precedence over every built-in guideline.

use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{debug, warn};

/// Rules file looked up in the working directory when none is named.
pub const DEFAULT_RULES_FILE: &str = ".customrules";

/// Build the default system prompt around `rules`, stamped with `now`.
pub fn system_prompt(rules: &str, now: DateTime<Utc>) -> String {
    format!(
        "\
<System_Protocol>
  I am an assistant that uses the Model Context Protocol (MCP) to call tools and applications.
  Current Time: {time}

  User_Defined_Rules override every other rule. When they conflict with anything below, follow User_Defined_Rules.

  <User_Defined_Rules>
{rules}
  </User_Defined_Rules>

  <Core_Guidelines>
    - Use MCP tools to reach data sources such as databases, APIs and file systems, within their security and privacy limits.
    - Do not ask for information the conversation already contains. Reuse what earlier turns and attached files established.
    - Break complex questions into parts, check assumptions, and say when something is uncertain.
  </Core_Guidelines>

  <System_Specific_Rules>
    - If a question concerns a previously attached non-image file and the conversation lacks its content, read it through a tool.
    - Images arrive inline as base64. Analyse them directly; use tools only for processing the image itself.
    - Show local file paths with markdown syntax.
    - Answer in markdown. Write formulas in KaTeX: $...$ inline, $$ \\displaystyle ... $$ for blocks.
    - Diagrams that Mermaid can render are written as Mermaid blocks.
  </System_Specific_Rules>
</System_Protocol>
",
        time = now.to_rfc3339_opts(SecondsFormat::Millis, true),
        rules = indent(rules.trim_end(), "    "),
    )
}

/// The default system prompt with the rules at `rules_path`, stamped now.
pub async fn default_system_prompt(rules_path: Option<&Path>) -> String {
    system_prompt(&load_rules(rules_path).await, Utc::now())
}

/// Read the rules file, or `""` when it cannot be read.
///
/// `None` looks for [`DEFAULT_RULES_FILE`] in the working directory. An
/// unreadable file is logged and treated as empty.
pub async fn load_rules(path: Option<&Path>) -> String {
    let path = path.map_or_else(|| PathBuf::from(DEFAULT_RULES_FILE), Path::to_path_buf);
    match tokio::fs::read_to_string(&path).await {
        Ok(rules) => {
            debug!(path = %path.display(), bytes = rules.len(), "Loaded custom rules");
            rules
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Cannot read custom rules");
            String::new()
        }
    }
}

fn indent(text: &str, prefix: &str) -> String {
    text.lines()
        .map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("{prefix}{line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
