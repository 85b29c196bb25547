//! End-to-end integration tests for the Slothtop assistant.
//!
//! These tests exercise the full pipeline from a settings file on disk,
//! through the assembler and the execution loop, to the built-in tools,
//! using scripted model backends in place of a real one.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use slothtop_agent::{
    AgentAssembler, AgentError, ConversationMemory, ExecutionPolicy, Session, StopReason, TraceKind,
};
use slothtop_config::{SettingField, SettingsStore, ToolsConfig};
use slothtop_core::error::ProviderError;
use slothtop_core::event::{DomainEvent, EventBus};
use slothtop_core::message::{Message, MessageToolCall, Role};
use slothtop_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use slothtop_core::tool::ToolRegistry;
use slothtop_monitor::MonitorHub;
use slothtop_tools::{AppControl, ToolContext, default_registry};

// ── Mock Providers ───────────────────────────────────────────────────────

/// A mock provider that returns scripted responses in sequence.
struct ScriptedProvider {
    responses: Mutex<Vec<ProviderResponse>>,
    call_count: Mutex<usize>,
}

impl ScriptedProvider {
    fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: Mutex::new(responses),
            call_count: Mutex::new(0),
        }
    }

    fn calls(&self) -> usize {
        *self.call_count.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut count = self.call_count.lock().unwrap();
        let responses = self.responses.lock().unwrap();
        if *count >= responses.len() {
            panic!("ScriptedProvider exhausted: call #{}, have {}", *count, responses.len());
        }
        let resp = responses[*count].clone();
        *count += 1;
        Ok(resp)
    }
}

/// Asks for `multiply` on a fresh question and answers once it sees the
/// product. Replies depend only on the request.
struct MultiplyingProvider;

#[async_trait::async_trait]
impl Provider for MultiplyingProvider {
    fn name(&self) -> &str {
        "multiplying"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let last = request.messages.last().cloned().unwrap_or_else(|| Message::user(""));
        if last.role == Role::Tool {
            return Ok(text_response(&format!(
                "[{} t={}] The product is {}.",
                request.model, request.sampling.temperature, last.content
            )));
        }
        Ok(tool_response(
            vec![make_tool_call("multiply", serde_json::json!({"a": 6, "b": 7}))],
            "",
        ))
    }
}

fn text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock".into(),
    }
}

fn tool_response(tool_calls: Vec<MessageToolCall>, thought: &str) -> ProviderResponse {
    let mut response = text_response(thought);
    response.message.tool_calls = tool_calls;
    response
}

fn make_tool_call(name: &str, args: serde_json::Value) -> MessageToolCall {
    MessageToolCall {
        id: format!("call_{name}"),
        name: name.to_string(),
        arguments: serde_json::to_string(&args).unwrap(),
    }
}

// ── Fixtures ─────────────────────────────────────────────────────────────

/// An application launcher where nothing is installed.
struct NothingInstalled;

#[async_trait::async_trait]
impl AppControl for NothingInstalled {
    async fn open(&self, app: &str) -> Result<(), String> {
        Err(format!("{app} not found"))
    }

    async fn close(&self, app: &str) -> Result<(), String> {
        Err(format!("{app} not found"))
    }
}

fn tools() -> Arc<ToolRegistry> {
    let http = slothtop_providers::http_client(5).unwrap();
    let monitors = Arc::new(MonitorHub::new(Duration::from_millis(100), 5));
    let ctx = ToolContext::new(http, monitors, ToolsConfig::default())
        .with_apps(Arc::new(NothingInstalled))
        .with_timeout(Duration::from_secs(5));
    Arc::new(default_registry(&ctx).unwrap())
}

fn policy(max_iterations: u32) -> ExecutionPolicy {
    ExecutionPolicy {
        max_iterations,
        ..ExecutionPolicy::default()
    }
}

fn settings_store(dir: &tempfile::TempDir, bus: &EventBus) -> Arc<SettingsStore> {
    let store = SettingsStore::init(dir.path().join("settings.json"))
        .unwrap()
        .with_events(bus.clone());
    Arc::new(store)
}

// ── E2E: Settings ────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_setting_written_then_reloaded() {
    let dir = tempfile::tempdir().unwrap();
    let store = settings_store(&dir, &EventBus::new(8));

    let before = store.load().unwrap();
    assert_eq!(before.temperature, 0.7);

    store.set(SettingField::Temperature, 0.3).unwrap();

    // a fresh store on the same file sees the change
    let reloaded = SettingsStore::open(store.path()).load().unwrap();
    assert_eq!(reloaded.temperature, 0.3);
    assert_eq!(reloaded.top_k, before.top_k);
    assert_eq!(reloaded.model, before.model);
}

#[tokio::test]
async fn e2e_rejected_setting_leaves_file_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let store = settings_store(&dir, &EventBus::new(8));
    let before = std::fs::read_to_string(store.path()).unwrap();

    assert!(store.set_from_str("top_p", "2.5").is_err());
    assert!(store.set_from_str("colour", "blue").is_err());

    assert_eq!(std::fs::read_to_string(store.path()).unwrap(), before);
}

// ── E2E: Tools ───────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_failing_side_effect_becomes_error_text() {
    let registry = tools();
    let output = registry
        .invoke("open_app", serde_json::json!({"app_name": "notepad"}))
        .await;
    assert!(output.contains("error"), "{output}");
    assert!(output.contains("not found"), "{output}");
}

#[tokio::test]
async fn e2e_failing_tool_inside_the_loop() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        tool_response(
            vec![make_tool_call("open_app", serde_json::json!({"app_name": "notepad"}))],
            "",
        ),
        text_response("Notepad does not seem to be installed."),
    ]));
    let assembler = AgentAssembler::new(provider.clone(), policy(5));
    let mut agent = assembler
        .build(&Default::default(), tools(), ConversationMemory::new(20))
        .await
        .unwrap();

    let result = agent.invoke("open notepad").await.unwrap();
    assert_eq!(result.output, "Notepad does not seem to be installed.");
    assert_eq!(result.stop, StopReason::Answered);
    assert_eq!(result.trace.len(), 1);
    assert!(result.trace[0].output.contains("not found"));
    assert_eq!(provider.calls(), 2);
}

// ── E2E: Execution loop ──────────────────────────────────────────────────

#[tokio::test]
async fn e2e_iteration_cap_ends_with_fallback_answer() {
    let responses = (0..6)
        .map(|i| {
            tool_response(
                vec![make_tool_call("multiply", serde_json::json!({"a": i, "b": 2}))],
                "",
            )
        })
        .collect();
    let provider = Arc::new(ScriptedProvider::new(responses));
    let assembler = AgentAssembler::new(provider.clone(), policy(3));
    let mut agent = assembler
        .build(&Default::default(), tools(), ConversationMemory::new(20))
        .await
        .unwrap();

    let result = agent.invoke("keep multiplying").await.unwrap();
    assert_eq!(result.stop, StopReason::IterationLimit);
    assert_eq!(result.rounds, 3);
    assert_eq!(provider.calls(), 3);
    assert_eq!(result.tool_calls().count(), 3);
    assert!(!result.output.trim().is_empty());
    assert!(result.output.contains("multiply"));
}

#[tokio::test]
async fn e2e_recovers_from_one_malformed_action() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        text_response("{\"name\": \"multiply\", \"arguments\": {\"a\": 2"),
        text_response("2 times 3 is 6."),
    ]));
    let assembler = AgentAssembler::new(provider.clone(), policy(5));
    let mut agent = assembler
        .build(&Default::default(), tools(), ConversationMemory::new(20))
        .await
        .unwrap();

    let result = agent.invoke("what is 2 times 3?").await.unwrap();
    assert_eq!(result.output, "2 times 3 is 6.");
    assert_eq!(result.stop, StopReason::Answered);
    let corrections = result
        .trace
        .iter()
        .filter(|e| e.kind == TraceKind::ParseError)
        .count();
    assert_eq!(corrections, 1);
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn e2e_identical_builds_give_identical_results() {
    let assembler = AgentAssembler::new(Arc::new(MultiplyingProvider), policy(5));
    let registry = tools();
    let settings = Default::default();

    let mut first = assembler
        .build(&settings, Arc::clone(&registry), ConversationMemory::new(20))
        .await
        .unwrap();
    let mut second = assembler
        .build(&settings, Arc::clone(&registry), ConversationMemory::new(20))
        .await
        .unwrap();

    let a = first.invoke("what is 6 times 7?").await.unwrap();
    let b = second.invoke("what is 6 times 7?").await.unwrap();
    assert_eq!(a, b);
    assert!(a.output.contains("The product is 42."), "{}", a.output);
}

// ── E2E: Session ─────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_session_picks_up_setting_changes() {
    let dir = tempfile::tempdir().unwrap();
    let bus = EventBus::new(64);
    let store = settings_store(&dir, &bus);
    let mut events = bus.subscribe();

    let assembler = AgentAssembler::new(Arc::new(MultiplyingProvider), policy(5)).with_events(bus.clone());
    let mut session = Session::open(Arc::clone(&store), assembler, tools(), &bus).await.unwrap();

    let result = session.send("6 times 7").await.unwrap();
    assert!(result.output.contains("t=0.7"), "{}", result.output);

    // written behind the session's back, then picked up on the next send
    store.set(SettingField::Temperature, 0.3).unwrap();
    store.set(SettingField::Model, "qwen2.5:7b").unwrap();
    let result = session.send("6 times 7").await.unwrap();
    assert!(result.output.contains("[qwen2.5:7b t=0.3]"), "{}", result.output);
    assert_eq!(session.conversation().len(), 4);

    let mut rebuilds = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event.as_ref(), DomainEvent::AgentRebuilt { .. }) {
            rebuilds += 1;
        }
    }
    // the initial build plus one for both changes
    assert_eq!(rebuilds, 2);
}

#[tokio::test]
async fn e2e_backend_error_surfaces_without_losing_the_transcript() {
    struct Unreachable;

    #[async_trait::async_trait]
    impl Provider for Unreachable {
        fn name(&self) -> &str {
            "ollama"
        }
        async fn complete(&self, _r: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            Err(ProviderError::Network("connection refused".into()))
        }
        async fn health_check(&self) -> Result<bool, ProviderError> {
            Ok(false)
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let bus = EventBus::new(64);
    let store = settings_store(&dir, &bus);
    let assembler = AgentAssembler::new(Arc::new(Unreachable), policy(5));
    let mut session = Session::open(store, assembler, tools(), &bus).await.unwrap();

    assert!(!session.has_agent());
    let err = session.send("hello").await.unwrap_err();
    assert!(matches!(err, AgentError::BackendUnavailable { .. }));
    assert!(err.to_string().contains("ollama"));
    assert!(session.conversation().is_empty());
}
