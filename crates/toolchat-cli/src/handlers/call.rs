//! `toolchat call`: route one tool call through the catalog.

use anyhow::{Context, Result, bail};
use serde_json::Value;
use tracing::debug;

use crate::bootstrap::CliContext;

pub async fn execute(ctx: &CliContext, tool: &str, args: &str) -> Result<()> {
    let arguments: Value =
        serde_json::from_str(args).with_context(|| format!("--args is not valid JSON: {args}"))?;
    if !arguments.is_object() {
        bail!("--args must be a JSON object");
    }

    let catalog = ctx.manager.catalog().await;
    let Some(connection) = catalog.tool_index().get(tool) else {
        let mut known: Vec<&str> = catalog
            .available_tools()
            .iter()
            .map(|tool| tool.name())
            .collect();
        known.sort_unstable();
        if known.is_empty() {
            bail!("Unknown tool '{tool}': no tools are available");
        }
        bail!("Unknown tool '{tool}'. Available: {}", known.join(", "));
    };

    debug!(tool, "Calling tool directly");
    let result = connection
        .call_tool(tool, arguments)
        .await
        .with_context(|| format!("Tool '{tool}' failed"))?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    if !result.success {
        bail!(
            "Tool '{tool}' reported an error: {}",
            result.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}
