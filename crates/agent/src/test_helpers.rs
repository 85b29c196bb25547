//! Shared test helpers: scripted providers and response builders.

use slothtop_core::error::ProviderError;
use slothtop_core::message::{Message, MessageToolCall, Role};
use slothtop_core::provider::{Provider, ProviderRequest, ProviderResponse, SamplingParams, Usage};
use slothtop_core::tool::ToolRegistry;
use std::sync::{Arc, Mutex};

use crate::executor::{AgentInstance, ExecutionPolicy};
use crate::memory::ConversationMemory;
use crate::prompt::PromptTemplate;

/// A mock provider that returns a sequence of scripted responses.
///
/// Each call to `complete` returns the next response in the queue and
/// records the request. Panics if more calls are made than responses provided.
pub struct SequentialMockProvider {
    responses: Mutex<Vec<ProviderResponse>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A provider that returns a single text response (no tool calls).
    pub fn single_text(text: &str) -> Self {
        Self::new(vec![make_text_response(text)])
    }

    /// A provider that first returns tool calls, then a final answer.
    pub fn tool_then_answer(tool_calls: Vec<MessageToolCall>, thought: &str, answer: &str) -> Self {
        Self::new(vec![
            make_tool_call_response(tool_calls, thought),
            make_text_response(answer),
        ])
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        let responses = self.responses.lock().unwrap();
        let count = requests.len();

        if count >= responses.len() {
            panic!(
                "SequentialMockProvider: no more responses (call #{count}, have {})",
                responses.len()
            );
        }

        requests.push(request);
        Ok(responses[count].clone())
    }
}

/// Answers every request from its content alone, so identical requests get
/// identical replies.
pub struct EchoProvider;

#[async_trait::async_trait]
impl Provider for EchoProvider {
    fn name(&self) -> &str {
        "echo"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let system = request
            .messages
            .iter()
            .find(|m| m.role == Role::System)
            .map(|m| m.content.clone())
            .unwrap_or_default();
        let last = request.messages.last().map(|m| m.content.clone()).unwrap_or_default();
        Ok(make_text_response(&format!(
            "[{} t={} k={} tools={}] {system} :: {last}",
            request.model,
            request.sampling.temperature,
            request.sampling.top_k,
            request.tools.len()
        )))
    }
}

/// A backend that is never reachable.
pub struct FailingProvider;

#[async_trait::async_trait]
impl Provider for FailingProvider {
    fn name(&self) -> &str {
        "down"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        Err(ProviderError::Network("connection refused".into()))
    }

    async fn health_check(&self) -> Result<bool, ProviderError> {
        Ok(false)
    }
}

/// Create a simple text response (no tool calls).
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}

/// Create a response with tool calls and optional thought content.
pub fn make_tool_call_response(tool_calls: Vec<MessageToolCall>, thought: &str) -> ProviderResponse {
    let mut response = make_text_response(thought);
    response.message.tool_calls = tool_calls;
    response
}

/// Helper to create a tool call.
pub fn make_tool_call(name: &str, args: serde_json::Value) -> MessageToolCall {
    MessageToolCall {
        id: format!("call_{name}"),
        name: name.to_string(),
        arguments: serde_json::to_string(&args).unwrap(),
    }
}

/// An instance wired directly, skipping the assembler's backend checks.
pub fn test_instance(provider: Arc<dyn Provider>, tools: Arc<ToolRegistry>, max_iterations: u32) -> AgentInstance {
    let definitions = tools.definitions();
    AgentInstance {
        provider,
        name: "Slothtop".into(),
        model: "mock-model".into(),
        sampling: SamplingParams::default(),
        prompt: PromptTemplate::new("You are {name}."),
        tools,
        definitions,
        policy: ExecutionPolicy {
            max_iterations,
            ..ExecutionPolicy::default()
        },
        memory: ConversationMemory::new(20),
        events: None,
    }
}
