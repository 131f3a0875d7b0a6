//! A chat conversation backed by its stored messages.
//!
//! Each exchange rebuilds the transcript from the stored records, runs the
//! engine, and records the user prompt and the final answer. Tool traffic is
//! not persisted; only what the user said and what the assistant answered.
//! An answer can be regenerated, which drops everything after its prompt.

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use toolchat_core::{
    ChatEventSink, ChatInfo, ChatMessage, ChatModel, ChatStreamEvent, MessageInfo,
    QueryAttachments, QueryInput, StoredMessage, StoredRole,
};
use tracing::{debug, error};

use crate::engine::{AgentError, QueryEngine, QueryOutcome, ToolSurface};
use crate::history::convert_stored_messages;
use crate::input::is_image_path;

/// Title used until the first prompt names the chat.
pub const DEFAULT_TITLE: &str = "New Chat";

const MAX_TITLE_CHARS: usize = 60;

/// Ids and outcome of one completed exchange.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatExchange {
    /// Empty for a regenerated answer; its prompt was already recorded.
    pub user_message_id: String,
    pub assistant_message_id: String,
    pub text: String,
    pub cancelled: bool,
}

/// One chat: id, title, stored messages.
#[derive(Debug)]
pub struct ChatSession {
    id: String,
    title: Option<String>,
    system_prompt: Option<String>,
    engine: QueryEngine,
    messages: Vec<(String, StoredMessage)>,
}

impl ChatSession {
    /// Start a new chat with a generated id.
    pub fn new(engine: QueryEngine) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: None,
            system_prompt: None,
            engine,
            messages: Vec::new(),
        }
    }

    /// Resume a stored chat.
    pub fn resume(
        id: impl Into<String>,
        title: impl Into<String>,
        engine: QueryEngine,
        messages: Vec<StoredMessage>,
    ) -> Self {
        Self {
            id: id.into(),
            title: Some(title.into()),
            system_prompt: None,
            engine,
            messages: messages
                .into_iter()
                .map(|message| (uuid::Uuid::new_v4().to_string(), message))
                .collect(),
        }
    }

    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into()).filter(|p| !p.is_empty());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        self.title.as_deref().unwrap_or(DEFAULT_TITLE)
    }

    /// Stored messages with their ids, oldest first.
    pub fn messages(&self) -> impl Iterator<Item = (&str, &StoredMessage)> {
        self.messages.iter().map(|(id, message)| (id.as_str(), message))
    }

    /// Run one exchange.
    ///
    /// Emits `chat_info` before the run; after a successful run, emits
    /// `message_info` and `chat_info` again. A failure is emitted as an
    /// `error` event and returned. Nothing is recorded for a failed run.
    pub async fn send(
        &mut self,
        tools: ToolSurface<'_>,
        model: Option<&dyn ChatModel>,
        input: QueryInput,
        sink: &dyn ChatEventSink,
        cancel: &CancellationToken,
    ) -> Result<ChatExchange, AgentError> {
        sink.emit(self.chat_info());
        let result = self.exchange(tools, model, input, sink, cancel).await;
        self.report(result, sink)
    }

    /// Answer the prompt behind `message_id` again.
    ///
    /// The replayed prompt is the user message at `message_id`, or the last
    /// one before it. Everything after that prompt is replaced by the new
    /// answer. The prompt keeps its id, so the exchange carries an empty
    /// `user_message_id`. Events and failure handling match [`Self::send`];
    /// a failed run leaves the stored messages untouched.
    pub async fn regenerate(
        &mut self,
        message_id: &str,
        tools: ToolSurface<'_>,
        model: Option<&dyn ChatModel>,
        sink: &dyn ChatEventSink,
        cancel: &CancellationToken,
    ) -> Result<ChatExchange, AgentError> {
        sink.emit(self.chat_info());
        let result = self.replay(message_id, tools, model, sink, cancel).await;
        self.report(result, sink)
    }

    fn report(
        &self,
        result: Result<ChatExchange, AgentError>,
        sink: &dyn ChatEventSink,
    ) -> Result<ChatExchange, AgentError> {
        match result {
            Ok(exchange) => {
                sink.emit(ChatStreamEvent::MessageInfo(MessageInfo {
                    user_message_id: exchange.user_message_id.clone(),
                    assistant_message_id: exchange.assistant_message_id.clone(),
                }));
                sink.emit(self.chat_info());
                debug!(chat_id = %self.id, "Exchange recorded");
                Ok(exchange)
            }
            Err(e) => {
                error!(chat_id = %self.id, error = %e, "Query failed");
                sink.emit(ChatStreamEvent::error(e.to_string()));
                Err(e)
            }
        }
    }

    async fn exchange(
        &mut self,
        tools: ToolSurface<'_>,
        model: Option<&dyn ChatModel>,
        input: QueryInput,
        sink: &dyn ChatEventSink,
        cancel: &CancellationToken,
    ) -> Result<ChatExchange, AgentError> {
        let user_record = user_record(&input);
        let QueryOutcome {
            text, cancelled, ..
        } = self
            .run_after(self.messages.len(), tools, model, input, sink, cancel)
            .await?;

        if self.title.is_none() {
            self.title = Some(title_from_prompt(user_record.content.as_deref()));
        }

        let user_message_id = uuid::Uuid::new_v4().to_string();
        self.messages.push((user_message_id.clone(), user_record));
        let assistant_message_id = self.record_answer(&text);

        Ok(ChatExchange {
            user_message_id,
            assistant_message_id,
            text,
            cancelled,
        })
    }

    async fn replay(
        &mut self,
        message_id: &str,
        tools: ToolSurface<'_>,
        model: Option<&dyn ChatModel>,
        sink: &dyn ChatEventSink,
        cancel: &CancellationToken,
    ) -> Result<ChatExchange, AgentError> {
        let target = self
            .messages
            .iter()
            .position(|(id, _)| id == message_id)
            .ok_or_else(|| AgentError::UnknownMessage(message_id.to_string()))?;
        let prompt_at = self.messages[..=target]
            .iter()
            .rposition(|(_, message)| message.role == StoredRole::User)
            .ok_or_else(|| AgentError::NoPromptToReplay(message_id.to_string()))?;

        let input = replay_input(&self.messages[prompt_at].1);
        let QueryOutcome {
            text, cancelled, ..
        } = self
            .run_after(prompt_at, tools, model, input, sink, cancel)
            .await?;

        debug!(
            chat_id = %self.id,
            replaced = self.messages.len() - prompt_at - 1,
            "Regenerating answer"
        );
        self.messages.truncate(prompt_at + 1);
        let assistant_message_id = self.record_answer(&text);

        Ok(ChatExchange {
            user_message_id: String::new(),
            assistant_message_id,
            text,
            cancelled,
        })
    }

    /// Run `input` on top of the system prompt and the first `kept` records.
    async fn run_after(
        &self,
        kept: usize,
        tools: ToolSurface<'_>,
        model: Option<&dyn ChatModel>,
        input: QueryInput,
        sink: &dyn ChatEventSink,
        cancel: &CancellationToken,
    ) -> Result<QueryOutcome, AgentError> {
        let mut history: Vec<ChatMessage> = self
            .system_prompt
            .iter()
            .map(|prompt| ChatMessage::system(prompt.as_str()))
            .collect();
        let stored: Vec<StoredMessage> = self.messages[..kept]
            .iter()
            .map(|(_, message)| message.clone())
            .collect();
        history.extend(convert_stored_messages(&stored).await?);

        self.engine
            .run(tools, model, input, &mut history, sink, cancel)
            .await
    }

    fn record_answer(&mut self, text: &str) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        self.messages.push((
            id.clone(),
            StoredMessage {
                role: StoredRole::Assistant,
                content: Some(text.to_string()),
                files: Vec::new(),
            },
        ));
        id
    }

    fn chat_info(&self) -> ChatStreamEvent {
        ChatStreamEvent::ChatInfo(ChatInfo {
            id: self.id.clone(),
            title: self.title().to_string(),
        })
    }
}

fn user_record(input: &QueryInput) -> StoredMessage {
    match input {
        QueryInput::Text(text) => StoredMessage {
            role: StoredRole::User,
            content: Some(text.clone()),
            files: Vec::new(),
        },
        QueryInput::Structured(attachments) => StoredMessage {
            role: StoredRole::User,
            content: Some(attachments.text.clone().unwrap_or_default()),
            files: attachments
                .images
                .iter()
                .chain(&attachments.documents)
                .cloned()
                .collect(),
        },
    }
}

/// Rebuild the query input a stored user message was created from.
fn replay_input(record: &StoredMessage) -> QueryInput {
    let text = record.content.clone().unwrap_or_default();
    if record.files.is_empty() {
        return QueryInput::Text(text);
    }
    let (images, documents): (Vec<String>, Vec<String>) = record
        .files
        .iter()
        .cloned()
        .partition(|file| is_image_path(file));
    QueryInput::Structured(QueryAttachments {
        text: Some(text),
        images,
        documents,
    })
}

/// First non-empty line of the prompt, shortened.
fn title_from_prompt(prompt: Option<&str>) -> String {
    let Some(line) = prompt
        .into_iter()
        .flat_map(str::lines)
        .map(str::trim)
        .find(|line| !line.is_empty())
    else {
        return DEFAULT_TITLE.to_string();
    };

    if line.chars().count() <= MAX_TITLE_CHARS {
        line.to_string()
    } else {
        let mut title: String = line.chars().take(MAX_TITLE_CHARS - 1).collect();
        title.push('…');
        title
    }
}
