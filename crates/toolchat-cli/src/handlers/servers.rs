//! `toolchat servers`: connection status and tools per server.

use anyhow::Result;
use toolchat_core::{McpConnectionStatus, McpServerToolInfo};

use crate::bootstrap::CliContext;

pub async fn execute(ctx: &CliContext, json: bool) -> Result<()> {
    let infos = ctx.manager.tool_infos().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&infos)?);
        return Ok(());
    }

    if ctx.registry.is_empty() {
        println!("No MCP servers configured.");
        return Ok(());
    }

    for (name, config) in &ctx.registry.servers {
        let status = ctx.manager.status(name).await;
        let info = infos.iter().find(|info| &info.server_name == name);
        print!("{}", render_server(name, config.enabled, status, info));
    }

    for error in &ctx.connect_errors {
        println!("! {}: {}", error.server_name, error.message);
    }

    Ok(())
}

fn status_label(status: McpConnectionStatus) -> &'static str {
    match status {
        McpConnectionStatus::Unconnected => "not connected",
        McpConnectionStatus::Connecting => "connecting",
        McpConnectionStatus::Connected => "connected",
        McpConnectionStatus::Disconnected => "disconnected",
    }
}

fn render_server(
    name: &str,
    enabled: bool,
    status: McpConnectionStatus,
    info: Option<&McpServerToolInfo>,
) -> String {
    let mut out = format!(
        "{name} [{}{}]\n",
        status_label(status),
        if enabled { "" } else { ", disabled" }
    );

    let Some(info) = info else {
        return out;
    };

    if !info.description.is_empty() {
        out.push_str(&format!("  {}\n", info.description));
    }
    for tool in &info.tools {
        match &tool.description {
            Some(description) => out.push_str(&format!("  - {}: {description}\n", tool.name)),
            None => out.push_str(&format!("  - {}\n", tool.name)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use toolchat_core::ToolSummary;

    #[test]
    fn test_render_connected_server() {
        let info = McpServerToolInfo {
            server_name: "weather".to_string(),
            description: "Forecasts".to_string(),
            icon: String::new(),
            enabled: true,
            tools: vec![
                ToolSummary {
                    name: "get_weather".to_string(),
                    description: Some("Current weather".to_string()),
                },
                ToolSummary {
                    name: "ping".to_string(),
                    description: None,
                },
            ],
        };

        let out = render_server("weather", true, McpConnectionStatus::Connected, Some(&info));
        assert_eq!(
            out,
            "weather [connected]\n  Forecasts\n  - get_weather: Current weather\n  - ping\n"
        );
    }

    #[test]
    fn test_render_disabled_unconnected_server() {
        let out = render_server("fs", false, McpConnectionStatus::Unconnected, None);
        assert_eq!(out, "fs [not connected, disabled]\n");
    }
}
