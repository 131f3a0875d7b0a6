//! `toolchat chat`: talk to the model, tools included.
//!
//! With a prompt, runs one exchange. Without one, reads prompts from stdin
//! into a single chat until `exit` or end of input. Ctrl-C cancels the
//! running answer; at the prompt it ends the session.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use toolchat_agent::{AgentError, ChatExchange, ChatSession, QueryEngine, ToolSurface};
use toolchat_core::{
    AgentSettings, ChatEventSink, ChatModel, ModelConfig, QueryAttachments, QueryInput, ToolIndex,
};
use tracing::{debug, info};

use crate::bootstrap::CliContext;
use crate::openai::OpenAiCompatibleModel;
use crate::sink::TerminalSink;

/// Options of one `chat` invocation.
#[derive(Debug, Clone, Default)]
pub struct ChatArgs {
    /// `None` starts an interactive session.
    pub prompt: Option<String>,
    pub images: Vec<String>,
    pub documents: Vec<String>,
    pub system: Option<String>,
    pub rules: Option<PathBuf>,
    pub max_iterations: Option<u32>,
    pub json: bool,
}

pub async fn execute(ctx: &CliContext, args: ChatArgs) -> Result<()> {
    if args.prompt.is_none() && !(args.images.is_empty() && args.documents.is_empty()) {
        bail!("Attachments need a prompt; pass one or drop --image/--document");
    }

    let model = build_model(&ctx.model_config)?;
    let model = model.as_ref().map(|model| model as &dyn ChatModel);
    let engine = QueryEngine::new(agent_settings(args.max_iterations));

    let catalog = ctx.manager.catalog().await;
    let empty_index = ToolIndex::new();
    let tools = if ctx.model_config.enable_tools {
        ToolSurface::new(catalog.tool_index(), catalog.available_tools())
    } else {
        debug!("Tools disabled by model config");
        ToolSurface::new(&empty_index, &[])
    };

    let system = match &args.system {
        Some(system) => system.clone(),
        None => toolchat_agent::default_system_prompt(args.rules.as_deref()).await,
    };
    let mut session = ChatSession::new(engine).with_system_prompt(system);

    let json = args.json;
    let sink = TerminalSink::new(json);
    let (interrupts, watcher) = watch_interrupts();

    let result = match args.prompt {
        Some(prompt) => {
            let input = query_input(prompt, args.images, args.documents);
            run_turn(&mut session, tools, model, input, &sink, &interrupts)
                .await
                .map(|exchange| finish_answer(&exchange, json))
                .map_err(anyhow::Error::from)
        }
        None => {
            eprintln!("Chat ID: {}", session.id());
            let stdin = BufReader::new(tokio::io::stdin());
            repl(&mut session, tools, model, &sink, stdin, &interrupts, json)
                .await
                .map(|answered| debug!(answered, "Interactive chat ended"))
        }
    };
    watcher.abort();
    result
}

/// Forward every Ctrl-C to the returned [`Notify`].
fn watch_interrupts() -> (std::sync::Arc<Notify>, JoinHandle<()>) {
    let interrupts = std::sync::Arc::new(Notify::new());
    let watcher = tokio::spawn({
        let interrupts = interrupts.clone();
        async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                interrupts.notify_one();
            }
        }
    });
    (interrupts, watcher)
}

/// One exchange; an interrupt cancels it.
async fn run_turn(
    session: &mut ChatSession,
    tools: ToolSurface<'_>,
    model: Option<&dyn ChatModel>,
    input: QueryInput,
    sink: &dyn ChatEventSink,
    interrupts: &Notify,
) -> Result<ChatExchange, AgentError> {
    let cancel = CancellationToken::new();
    let turn = session.send(tools, model, input, sink, &cancel);
    tokio::pin!(turn);

    loop {
        tokio::select! {
            result = &mut turn => return result,
            () = interrupts.notified() => {
                info!("Interrupted, cancelling query");
                cancel.cancel();
            }
        }
    }
}

/// What one line typed at the prompt asks for.
#[derive(Debug, PartialEq, Eq)]
enum ReplLine<'a> {
    Blank,
    Exit,
    Prompt(&'a str),
}

impl<'a> ReplLine<'a> {
    fn parse(line: &'a str) -> Self {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            Self::Blank
        } else if trimmed.eq_ignore_ascii_case("exit") || trimmed.eq_ignore_ascii_case("quit") {
            Self::Exit
        } else {
            Self::Prompt(line)
        }
    }
}

/// Read prompts from `input` into `session` until `exit`, end of input, or
/// an interrupt at the prompt. A failed turn is reported and the loop goes
/// on. Returns the number of answered prompts.
async fn repl<R>(
    session: &mut ChatSession,
    tools: ToolSurface<'_>,
    model: Option<&dyn ChatModel>,
    sink: &dyn ChatEventSink,
    input: R,
    interrupts: &Notify,
    json: bool,
) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    let mut answered = 0;

    loop {
        eprint!("\n> ");
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read from stdin")?,
            () = interrupts.notified() => None,
        };
        let Some(line) = line else {
            break;
        };

        match ReplLine::parse(&line) {
            ReplLine::Blank => eprintln!("Please enter a message, or 'exit' to quit."),
            ReplLine::Exit => break,
            ReplLine::Prompt(prompt) => {
                let input = QueryInput::Text(prompt.to_string());
                match run_turn(session, tools, model, input, sink, interrupts).await {
                    Ok(exchange) => {
                        answered += 1;
                        finish_answer(&exchange, json);
                    }
                    // Already shown through the sink's error event.
                    Err(e) => debug!(error = %e, "Turn failed"),
                }
            }
        }
    }

    if !json {
        eprintln!("\nSee you next time!");
    }
    Ok(answered)
}

fn finish_answer(exchange: &ChatExchange, json: bool) {
    if !json {
        println!();
        if exchange.cancelled {
            eprintln!("(cancelled)");
        }
    }
}

/// The configured model, or `None` when no provider is selected.
fn build_model(config: &ModelConfig) -> Result<Option<OpenAiCompatibleModel>> {
    if config.active_provider.is_none() {
        return Ok(None);
    }
    let settings = config
        .active_settings()
        .context("Invalid model configuration")?;
    Ok(Some(OpenAiCompatibleModel::new(settings.clone())))
}

/// `0` lifts the cap.
const fn agent_settings(max_iterations: Option<u32>) -> AgentSettings {
    match max_iterations {
        None => AgentSettings::with_defaults(),
        Some(0) => AgentSettings::unbounded(),
        Some(limit) => AgentSettings {
            max_tool_iterations: Some(limit),
        },
    }
}

fn query_input(prompt: String, images: Vec<String>, documents: Vec<String>) -> QueryInput {
    if images.is_empty() && documents.is_empty() {
        QueryInput::Text(prompt)
    } else {
        QueryInput::Structured(QueryAttachments {
            text: Some(prompt),
            images,
            documents,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use toolchat_core::{
        ChatMessage, DEFAULT_MAX_TOOL_ITERATIONS, ModelChunk, ModelError, ModelSettings,
        ModelStream, NoopSink, ToolDefinition,
    };

    /// Answers with the number of messages it was shown.
    struct CountingModel;

    #[async_trait]
    impl ChatModel for CountingModel {
        async fn stream(
            &self,
            messages: &[ChatMessage],
            _tools: &[ToolDefinition],
        ) -> Result<ModelStream, ModelError> {
            let reply = format!("seen {}", messages.len());
            Ok(Box::pin(futures_util::stream::iter(vec![Ok(ModelChunk::text(reply))])))
        }
    }

    /// Never produces a chunk.
    struct StalledModel;

    #[async_trait]
    impl ChatModel for StalledModel {
        async fn stream(
            &self,
            _messages: &[ChatMessage],
            _tools: &[ToolDefinition],
        ) -> Result<ModelStream, ModelError> {
            Ok(Box::pin(futures_util::stream::pending()))
        }
    }

    fn contents(session: &ChatSession) -> Vec<String> {
        session
            .messages()
            .map(|(_, message)| message.content.clone().unwrap_or_default())
            .collect()
    }

    #[tokio::test]
    async fn test_repl_keeps_one_session_until_exit() {
        let index = ToolIndex::new();
        let mut session = ChatSession::new(QueryEngine::default());
        let input: &[u8] = b"hello\n\n   \nand again\nEXIT\nnever read\n";

        let answered = repl(
            &mut session,
            ToolSurface::new(&index, &[]),
            Some(&CountingModel),
            &NoopSink,
            input,
            &Notify::new(),
            true,
        )
        .await
        .unwrap();

        assert_eq!(answered, 2);
        // The second prompt sees the first exchange.
        assert_eq!(contents(&session), ["hello", "seen 1", "and again", "seen 3"]);
    }

    #[tokio::test]
    async fn test_repl_goes_on_after_a_failed_turn() {
        let index = ToolIndex::new();
        let mut session = ChatSession::new(QueryEngine::default());
        let input: &[u8] = b"first\nsecond";

        let answered = repl(
            &mut session,
            ToolSurface::new(&index, &[]),
            None,
            &NoopSink,
            input,
            &Notify::new(),
            true,
        )
        .await
        .unwrap();

        assert_eq!(answered, 0);
        assert_eq!(session.messages().count(), 0);
    }

    #[tokio::test]
    async fn test_interrupt_at_the_prompt_ends_the_session() {
        let index = ToolIndex::new();
        let mut session = ChatSession::new(QueryEngine::default());
        let (reader, _writer) = tokio::io::duplex(64);
        let interrupts = Notify::new();
        interrupts.notify_one();

        let answered = tokio::time::timeout(
            Duration::from_secs(5),
            repl(
                &mut session,
                ToolSurface::new(&index, &[]),
                Some(&CountingModel),
                &NoopSink,
                BufReader::new(reader),
                &interrupts,
                true,
            ),
        )
        .await
        .expect("an interrupt at the prompt must end the loop")
        .unwrap();

        assert_eq!(answered, 0);
    }

    #[tokio::test]
    async fn test_interrupt_cancels_only_the_running_answer() {
        let index = ToolIndex::new();
        let mut session = ChatSession::new(QueryEngine::default());
        let input: &[u8] = b"hang\nexit\n";
        let interrupts = Arc::new(Notify::new());
        let trigger = tokio::spawn({
            let interrupts = interrupts.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                interrupts.notify_one();
            }
        });

        let answered = tokio::time::timeout(
            Duration::from_secs(5),
            repl(
                &mut session,
                ToolSurface::new(&index, &[]),
                Some(&StalledModel),
                &NoopSink,
                input,
                &interrupts,
                true,
            ),
        )
        .await
        .expect("a cancelled answer must not stall the loop")
        .unwrap();
        trigger.await.unwrap();

        assert_eq!(answered, 1);
        assert_eq!(contents(&session), ["hang", ""]);
    }

    #[test]
    fn test_repl_line_kinds() {
        assert_eq!(ReplLine::parse("  \t"), ReplLine::Blank);
        assert_eq!(ReplLine::parse(" Exit "), ReplLine::Exit);
        assert_eq!(ReplLine::parse("quit"), ReplLine::Exit);
        assert_eq!(ReplLine::parse(" exit now"), ReplLine::Prompt(" exit now"));
    }

    #[test]
    fn test_agent_settings_from_flag() {
        assert_eq!(
            agent_settings(None).max_tool_iterations,
            Some(DEFAULT_MAX_TOOL_ITERATIONS)
        );
        assert_eq!(agent_settings(Some(0)).max_tool_iterations, None);
        assert_eq!(agent_settings(Some(4)).max_tool_iterations, Some(4));
    }

    #[test]
    fn test_query_input_shapes() {
        let plain = query_input("hi".to_string(), Vec::new(), Vec::new());
        assert_eq!(plain, QueryInput::Text("hi".to_string()));

        let structured = query_input("look".to_string(), vec!["/a.png".to_string()], Vec::new());
        assert!(matches!(structured, QueryInput::Structured(ref a) if a.images.len() == 1));
    }

    #[test]
    fn test_no_provider_means_no_model() {
        assert!(build_model(&ModelConfig::default()).unwrap().is_none());
    }

    #[test]
    fn test_invalid_provider_settings_are_an_error() {
        let mut config = ModelConfig {
            active_provider: Some("openai".to_string()),
            ..ModelConfig::default()
        };
        config
            .configs
            .insert("openai".to_string(), ModelSettings::new(""));
        assert!(build_model(&config).is_err());
    }
}
