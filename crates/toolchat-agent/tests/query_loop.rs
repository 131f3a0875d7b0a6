//! End-to-end runs of the query loop against a scripted model and fake tools.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use toolchat_agent::{QueryEngine, ToolSurface};
use toolchat_core::{
    AgentSettings, ChannelSink, ChatMessage, ChatModel, ChatStreamEvent, McpCapabilities,
    McpConnection, McpError, McpTool, McpToolResult, ModelChunk, ModelError, ModelStream,
    NoopSink, ToolCallChunk, ToolDefinition, ToolIndex,
};

/// One scripted model turn.
enum Script {
    Chunks(Vec<ModelChunk>),
    /// Emit these chunks, then never finish.
    Stall(Vec<ModelChunk>),
}

/// Replays one script per invocation and records what it was shown.
struct ScriptedModel {
    turns: Mutex<VecDeque<Script>>,
    invocations: AtomicUsize,
    seen: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedModel {
    fn new(turns: Vec<Script>) -> Self {
        Self {
            turns: Mutex::new(turns.into()),
            invocations: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn stream(
        &self,
        messages: &[ChatMessage],
        _tools: &[ToolDefinition],
    ) -> Result<ModelStream, ModelError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(messages.to_vec());

        match self.turns.lock().unwrap().pop_front() {
            Some(Script::Chunks(chunks)) => {
                Ok(Box::pin(futures_util::stream::iter(chunks.into_iter().map(Ok))))
            }
            Some(Script::Stall(chunks)) => Ok(Box::pin(
                futures_util::stream::iter(chunks.into_iter().map(Ok))
                    .chain(futures_util::stream::pending()),
            )),
            None => Err(ModelError::Request("script exhausted".to_string())),
        }
    }
}

/// Tool server answering every call with `"<name> ok"`, counting calls.
#[derive(Default)]
struct CountingConnection {
    calls: AtomicUsize,
}

#[async_trait]
impl McpConnection for CountingConnection {
    async fn list_tools(&self) -> Result<Vec<McpTool>, McpError> {
        Ok(Vec::new())
    }

    async fn capabilities(&self) -> Result<McpCapabilities, McpError> {
        Ok(McpCapabilities::default())
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<McpToolResult, McpError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(McpToolResult::success(json!({"tool": name, "args": arguments})))
    }

    async fn close(&self) -> Result<(), McpError> {
        Ok(())
    }
}

/// Tool server whose calls wait until `barrier` is full.
struct RendezvousConnection {
    barrier: tokio::sync::Barrier,
}

#[async_trait]
impl McpConnection for RendezvousConnection {
    async fn list_tools(&self) -> Result<Vec<McpTool>, McpError> {
        Ok(Vec::new())
    }

    async fn capabilities(&self) -> Result<McpCapabilities, McpError> {
        Ok(McpCapabilities::default())
    }

    async fn call_tool(&self, name: &str, _arguments: Value) -> Result<McpToolResult, McpError> {
        self.barrier.wait().await;
        Ok(McpToolResult::success(json!(name)))
    }

    async fn close(&self) -> Result<(), McpError> {
        Ok(())
    }
}

/// Tool server whose transport fails on every call.
struct BrokenConnection;

#[async_trait]
impl McpConnection for BrokenConnection {
    async fn list_tools(&self) -> Result<Vec<McpTool>, McpError> {
        Ok(Vec::new())
    }

    async fn capabilities(&self) -> Result<McpCapabilities, McpError> {
        Ok(McpCapabilities::default())
    }

    async fn call_tool(&self, _name: &str, _arguments: Value) -> Result<McpToolResult, McpError> {
        Err(McpError::Protocol("pipe exploded".to_string()))
    }

    async fn close(&self) -> Result<(), McpError> {
        Ok(())
    }
}

fn call_chunk(index: u32, id: &str, name: &str, args: &str) -> ModelChunk {
    ModelChunk::tool_call(ToolCallChunk::new(index).with_id(id).with_name(name).with_args(args))
}

async fn collect(mut rx: tokio::sync::mpsc::UnboundedReceiver<ChatStreamEvent>) -> Vec<ChatStreamEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn plain_text_answer_streams_and_finishes() {
    let model = ScriptedModel::new(vec![Script::Chunks(vec![
        ModelChunk::text("Hel"),
        ModelChunk::text("lo"),
    ])]);
    let index = ToolIndex::new();
    let mut history = Vec::new();
    let (sink, rx) = ChannelSink::new();

    let outcome = QueryEngine::default()
        .run(
            ToolSurface::new(&index, &[]),
            Some(&model),
            "Hi".into(),
            &mut history,
            &sink,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    drop(sink);

    assert_eq!(outcome.text, "Hello");
    assert!(!outcome.cancelled);
    assert_eq!(outcome.iterations, 1);
    assert_eq!(history, vec![ChatMessage::human("Hi"), ChatMessage::ai("Hello")]);
    assert_eq!(
        collect(rx).await,
        vec![ChatStreamEvent::text("Hel"), ChatStreamEvent::text("lo")]
    );
}

#[tokio::test]
async fn missing_route_produces_null_result_and_continues() {
    let model = ScriptedModel::new(vec![
        Script::Chunks(vec![call_chunk(0, "call_1", "tool_b", "{}")]),
        Script::Chunks(vec![ModelChunk::text("done")]),
    ]);
    let index = ToolIndex::new();
    let mut history = Vec::new();
    let (sink, rx) = ChannelSink::new();

    let outcome = QueryEngine::default()
        .run(
            ToolSurface::new(&index, &[]),
            Some(&model),
            "use tool_b".into(),
            &mut history,
            &sink,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    drop(sink);

    assert_eq!(outcome.text, "done");
    assert_eq!(history[2], ChatMessage::tool_result("call_1", "null"));

    let events = collect(rx).await;
    assert!(matches!(&events[0], ChatStreamEvent::ToolCalls(calls) if calls[0].name == "tool_b"));
    assert_eq!(events[1], ChatStreamEvent::tool_result("tool_b", None));
    assert_eq!(events[2], ChatStreamEvent::text("done"));
}

#[tokio::test]
async fn loop_terminates_after_three_model_invocations() {
    let server = Arc::new(CountingConnection::default());
    let mut index = ToolIndex::new();
    index.insert("search".to_string(), server.clone() as Arc<dyn McpConnection>);
    let tools = vec![ToolDefinition::from(&McpTool::new("search"))];

    let model = ScriptedModel::new(vec![
        Script::Chunks(vec![
            ModelChunk::text("Looking. "),
            call_chunk(0, "c1", "search", r#"{"q":"a"}"#),
        ]),
        Script::Chunks(vec![call_chunk(0, "c2", "search", r#"{"q":"b"}"#)]),
        Script::Chunks(vec![ModelChunk::text("Found it.")]),
    ]);
    let mut history = Vec::new();

    let outcome = QueryEngine::new(AgentSettings { max_tool_iterations: Some(3) })
        .run(
            ToolSurface::new(&index, &tools),
            Some(&model),
            "find".into(),
            &mut history,
            &NoopSink,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(model.invocations(), 3);
    assert_eq!(server.calls.load(Ordering::SeqCst), 2);
    assert_eq!(outcome.iterations, 3);
    assert_eq!(outcome.text, "Looking. Found it.");
    // human, (ai + result) x2, final ai
    assert_eq!(history.len(), 6);

    // Every invocation sees a strictly longer transcript.
    let seen = model.seen.lock().unwrap();
    let lengths: Vec<usize> = seen.iter().map(Vec::len).collect();
    assert_eq!(lengths, vec![1, 3, 5]);
}

#[tokio::test]
async fn fragmented_calls_assemble_by_index_and_results_keep_order() {
    let server = Arc::new(CountingConnection::default());
    let mut index = ToolIndex::new();
    index.insert("alpha".to_string(), server.clone() as Arc<dyn McpConnection>);
    index.insert("beta".to_string(), server.clone() as Arc<dyn McpConnection>);

    let model = ScriptedModel::new(vec![
        Script::Chunks(vec![
            ModelChunk::tool_call(ToolCallChunk::new(1).with_id("b").with_name("beta").with_args("{\"n\":")),
            ModelChunk::tool_call(ToolCallChunk::new(0).with_id("a").with_name("alpha").with_args("{\"n\"")),
            ModelChunk::tool_call(ToolCallChunk::new(0).with_args(":1}")),
            ModelChunk::tool_call(ToolCallChunk::new(1).with_args("2}")),
        ]),
        Script::Chunks(vec![ModelChunk::text("ok")]),
    ]);
    let mut history = Vec::new();

    QueryEngine::default()
        .run(
            ToolSurface::new(&index, &[]),
            Some(&model),
            "go".into(),
            &mut history,
            &NoopSink,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let calls = history[1].tool_calls();
    assert_eq!(calls.len(), 2);
    assert_eq!((calls[0].id.as_str(), calls[0].arguments.as_str()), ("a", r#"{"n":1}"#));
    assert_eq!((calls[1].id.as_str(), calls[1].arguments.as_str()), ("b", r#"{"n":2}"#));

    let ChatMessage::ToolResult { tool_call_id, .. } = &history[2] else {
        panic!("expected tool result");
    };
    assert_eq!(tool_call_id, "a");
    let ChatMessage::ToolResult { tool_call_id, content } = &history[3] else {
        panic!("expected tool result");
    };
    assert_eq!(tool_call_id, "b");
    let parsed: Value = serde_json::from_str(&content.as_text()).unwrap();
    assert_eq!(parsed["data"]["args"], json!({"n": 2}));
}

#[tokio::test]
async fn cancellation_mid_stream_keeps_partial_text() {
    let model = ScriptedModel::new(vec![Script::Stall(vec![ModelChunk::text("partial")])]);
    let index = ToolIndex::new();
    let mut history = Vec::new();
    let (sink, mut rx) = ChannelSink::new();
    let cancel = CancellationToken::new();

    let engine = QueryEngine::default();
    let run = engine.run(
        ToolSurface::new(&index, &[]),
        Some(&model),
        "long answer please".into(),
        &mut history,
        &sink,
        &cancel,
    );
    let canceller = async {
        // Cancel once the first delta arrives.
        let first = rx.recv().await;
        cancel.cancel();
        first
    };

    let (outcome, first) = tokio::join!(run, canceller);
    let outcome = outcome.unwrap();

    assert_eq!(first, Some(ChatStreamEvent::text("partial")));
    assert!(outcome.cancelled);
    assert_eq!(outcome.text, "partial");
    assert_eq!(model.invocations(), 1);
    assert_eq!(history.last(), Some(&ChatMessage::ai("partial")));
}

#[tokio::test]
async fn tool_calls_in_one_turn_run_concurrently() {
    // Each call blocks until the other has started.
    let server = Arc::new(RendezvousConnection {
        barrier: tokio::sync::Barrier::new(2),
    });
    let mut index = ToolIndex::new();
    index.insert("left".to_string(), server.clone() as Arc<dyn McpConnection>);
    index.insert("right".to_string(), server as Arc<dyn McpConnection>);

    let model = ScriptedModel::new(vec![
        Script::Chunks(vec![
            call_chunk(0, "l", "left", "{}"),
            call_chunk(1, "r", "right", "{}"),
        ]),
        Script::Chunks(vec![ModelChunk::text("both done")]),
    ]);
    let mut history = Vec::new();

    let outcome = tokio::time::timeout(
        std::time::Duration::from_secs(5),
        QueryEngine::default().run(
            ToolSurface::new(&index, &[]),
            Some(&model),
            "run both".into(),
            &mut history,
            &NoopSink,
            &CancellationToken::new(),
        ),
    )
    .await
    .expect("tool calls must not run one after another")
    .unwrap();

    assert_eq!(outcome.text, "both done");
    assert_eq!(history[2], ChatMessage::tool_result("l", r#"{"success":true,"data":"left"}"#));
    assert_eq!(history[3], ChatMessage::tool_result("r", r#"{"success":true,"data":"right"}"#));
}

#[tokio::test]
async fn failing_tool_beside_working_tool_still_completes_the_turn() {
    let mut index = ToolIndex::new();
    index.insert(
        "lookup".to_string(),
        Arc::new(CountingConnection::default()) as Arc<dyn McpConnection>,
    );
    index.insert("flaky".to_string(), Arc::new(BrokenConnection) as Arc<dyn McpConnection>);

    let model = ScriptedModel::new(vec![
        Script::Chunks(vec![
            call_chunk(0, "ok", "lookup", r#"{"id":7}"#),
            call_chunk(1, "bad", "flaky", "{}"),
        ]),
        Script::Chunks(vec![ModelChunk::text("Partial answer.")]),
    ]);
    let mut history = Vec::new();
    let (sink, rx) = ChannelSink::new();

    let outcome = QueryEngine::default()
        .run(
            ToolSurface::new(&index, &[]),
            Some(&model),
            "look up 7".into(),
            &mut history,
            &sink,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    drop(sink);

    assert_eq!(outcome.text, "Partial answer.");
    assert_eq!(model.invocations(), 2);

    let results: Vec<Value> = history[2..4]
        .iter()
        .map(|message| {
            let ChatMessage::ToolResult { content, .. } = message else {
                panic!("expected tool result");
            };
            serde_json::from_str(&content.as_text()).unwrap()
        })
        .collect();
    assert_eq!(results[0]["success"], true);
    assert_eq!(results[1]["success"], false);
    assert!(results[1]["error"].as_str().unwrap().contains("pipe exploded"));

    // The second model invocation saw both results.
    assert_eq!(model.seen.lock().unwrap()[1].len(), 4);

    let events = collect(rx).await;
    let tool_results = events
        .iter()
        .filter(|event| matches!(event, ChatStreamEvent::ToolResult(_)))
        .count();
    assert_eq!(tool_results, 2);
}
