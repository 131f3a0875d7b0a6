//! CLI entry point, the composition root.

use clap::Parser;

use toolchat_cli::handlers::chat::ChatArgs;
use toolchat_cli::{Cli, CliConfig, Commands, bootstrap, config, handlers, logging};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Before parsing, so flag fallbacks and RUST_LOG can come from .env
    let dotenv_error = config::load_dotenv();
    let cli = Cli::parse();
    logging::init_tracing(cli.verbose);
    if let Some(e) = dotenv_error {
        tracing::warn!(error = %e, "Ignoring unreadable .env file");
    }

    let config = CliConfig::resolve(&cli)?;
    let ctx = bootstrap(&config).await?;

    let result = match cli.command {
        Commands::Servers { json } => handlers::servers::execute(&ctx, json).await,
        Commands::Call { tool, args } => handlers::call::execute(&ctx, &tool, &args).await,
        Commands::Chat {
            prompt,
            images,
            documents,
            system,
            rules,
            max_iterations,
            json,
        } => {
            handlers::chat::execute(
                &ctx,
                ChatArgs {
                    prompt,
                    images,
                    documents,
                    system,
                    rules,
                    max_iterations,
                    json,
                },
            )
            .await
        }
    };

    ctx.shutdown().await;
    result
}
