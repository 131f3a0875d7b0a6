//! Command-line parser.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Chat with a language model that can call MCP server tools.
#[derive(Debug, Parser)]
#[command(name = "toolchat")]
#[command(about = "Chat with a model that can call MCP server tools")]
#[command(version)]
pub struct Cli {
    /// MCP server config file (default: <config dir>/toolchat/mcp_config.json)
    #[arg(long = "mcp-config", env = "TOOLCHAT_MCP_CONFIG", global = true)]
    pub mcp_config: Option<PathBuf>,

    /// Model config file (default: <config dir>/toolchat/model_config.json)
    #[arg(long = "model-config", env = "TOOLCHAT_MODEL_CONFIG", global = true)]
    pub model_config: Option<PathBuf>,

    /// Enable verbose/debug output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Connect every enabled server and list its tools
    Servers {
        /// Print the tool infos as JSON
        #[arg(long)]
        json: bool,
    },

    /// Call one tool directly
    Call {
        /// Tool name
        tool: String,

        /// Arguments as a JSON object
        #[arg(long, default_value = "{}")]
        args: String,
    },

    /// Ask the model a question; tools are called as needed.
    /// Without a prompt, starts an interactive session.
    Chat {
        /// The prompt; omit to chat interactively
        prompt: Option<String>,

        /// Attach an image (repeatable)
        #[arg(long = "image", value_name = "PATH")]
        images: Vec<String>,

        /// Reference a document (repeatable)
        #[arg(long = "document", value_name = "PATH")]
        documents: Vec<String>,

        /// System prompt, replacing the default one
        #[arg(long, conflicts_with = "rules")]
        system: Option<String>,

        /// Custom rules for the default system prompt (default: ./.customrules)
        #[arg(long, value_name = "PATH")]
        rules: Option<PathBuf>,

        /// Maximum model turns; 0 means unbounded
        #[arg(long = "max-iterations")]
        max_iterations: Option<u32>,

        /// Print stream events as JSON lines instead of text
        #[arg(long)]
        json: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parser_builds() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_chat_with_attachments() {
        let cli = Cli::parse_from([
            "toolchat",
            "--verbose",
            "chat",
            "what is this",
            "--image",
            "/tmp/a.png",
            "--image",
            "/tmp/b.png",
            "--document",
            "/tmp/c.pdf",
        ]);
        assert!(cli.verbose);
        let Commands::Chat {
            prompt,
            images,
            documents,
            ..
        } = cli.command
        else {
            panic!("expected chat");
        };
        assert_eq!(prompt.as_deref(), Some("what is this"));
        assert_eq!(images, vec!["/tmp/a.png", "/tmp/b.png"]);
        assert_eq!(documents, vec!["/tmp/c.pdf"]);
    }

    #[test]
    fn test_chat_without_prompt_is_interactive() {
        let cli = Cli::parse_from(["toolchat", "chat", "--rules", "/etc/rules.txt"]);
        let Commands::Chat { prompt, rules, .. } = cli.command else {
            panic!("expected chat");
        };
        assert!(prompt.is_none());
        assert_eq!(rules, Some(PathBuf::from("/etc/rules.txt")));
    }

    #[test]
    fn test_system_and_rules_conflict() {
        let result = Cli::try_parse_from([
            "toolchat", "chat", "hi", "--system", "be brief", "--rules", "r.txt",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_call_defaults_to_empty_args() {
        let cli = Cli::parse_from(["toolchat", "call", "get_weather"]);
        let Commands::Call { tool, args } = cli.command else {
            panic!("expected call");
        };
        assert_eq!(tool, "get_weather");
        assert_eq!(args, "{}");
    }

    #[test]
    fn test_global_config_paths() {
        let cli = Cli::parse_from(["toolchat", "servers", "--mcp-config", "/etc/mcp.json"]);
        assert_eq!(cli.mcp_config, Some(PathBuf::from("/etc/mcp.json")));
    }
}
