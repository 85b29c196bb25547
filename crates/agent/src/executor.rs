//! The execution loop.
//!
//! One call to [`AgentInstance::invoke`] runs
//! `Dispatching -> {ToolCall -> Observing -> Dispatching}* -> Responding`:
//! ask the model, run whatever tools it requested, feed the results back,
//! and stop at the first plain-text reply or at the iteration cap.

use serde::Serialize;
use serde_json::Value;
use slothtop_core::event::{DomainEvent, EventBus};
use slothtop_core::message::{Message, MessageToolCall};
use slothtop_core::provider::{Provider, ProviderRequest, SamplingParams, ToolDefinition};
use slothtop_core::tool::ToolRegistry;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::action::{Action, ParsedCall, parse_reply};
use crate::error::AgentError;
use crate::memory::ConversationMemory;
use crate::prompt::PromptTemplate;

/// How a turn is run.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionPolicy {
    /// Model round-trips per turn before a fallback answer is forced.
    pub max_iterations: u32,
    /// Feed unparseable actions back as a correction instead of returning
    /// the raw reply.
    pub recover_parse_errors: bool,
    /// Messages of prior conversation sent with every request.
    pub memory_window: usize,
}

impl Default for ExecutionPolicy {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            recover_parse_errors: true,
            memory_window: 20,
        }
    }
}

impl From<&slothtop_config::AgentPolicyConfig> for ExecutionPolicy {
    fn from(cfg: &slothtop_config::AgentPolicyConfig) -> Self {
        Self {
            max_iterations: cfg.max_iterations,
            recover_parse_errors: cfg.recover_parse_errors,
            memory_window: cfg.memory_window,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceKind {
    /// A registered tool ran (successfully or not).
    ToolCall,
    /// The model named a tool that does not exist.
    UnknownTool,
    /// The reply looked like an action but could not be read.
    ParseError,
}

/// One step of a turn, as shown to the user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceEntry {
    pub kind: TraceKind,
    pub tool: String,
    pub input: Value,
    pub output: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The model produced a final answer.
    Answered,
    /// The iteration cap was reached first.
    IterationLimit,
}

/// Everything one `invoke` produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvocationResult {
    pub output: String,
    pub trace: Vec<TraceEntry>,
    pub rounds: u32,
    pub stop: StopReason,
}

impl InvocationResult {
    /// Only the tool calls, without corrections.
    pub fn tool_calls(&self) -> impl Iterator<Item = &TraceEntry> {
        self.trace.iter().filter(|e| e.kind == TraceKind::ToolCall)
    }
}

/// A ready-to-run agent: prompt, tools, model client and policy bound
/// together. Built by [`AgentAssembler`](crate::AgentAssembler).
pub struct AgentInstance {
    pub(crate) provider: Arc<dyn Provider>,
    pub(crate) name: String,
    pub(crate) model: String,
    pub(crate) sampling: SamplingParams,
    pub(crate) prompt: PromptTemplate,
    pub(crate) tools: Arc<ToolRegistry>,
    pub(crate) definitions: Vec<ToolDefinition>,
    pub(crate) policy: ExecutionPolicy,
    pub(crate) memory: ConversationMemory,
    pub(crate) events: Option<EventBus>,
}

impl std::fmt::Debug for AgentInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentInstance")
            .field("backend", &self.provider.name())
            .field("name", &self.name)
            .field("model", &self.model)
            .field("sampling", &self.sampling)
            .field("tools", &self.definitions.len())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl AgentInstance {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn sampling(&self) -> SamplingParams {
        self.sampling
    }

    pub fn policy(&self) -> &ExecutionPolicy {
        &self.policy
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.definitions.iter().map(|d| d.name.as_str()).collect()
    }

    /// Run one user utterance to completion.
    ///
    /// Only a backend failure is an error; tool failures, unknown tools and
    /// unreadable actions become observations, and the iteration cap ends
    /// the turn with a best-effort answer.
    pub async fn invoke(&mut self, input: &str) -> Result<InvocationResult, AgentError> {
        let max_iterations = self.policy.max_iterations.max(1);
        let mut messages = self.prompt.messages(&self.name, &self.memory.messages(), input);
        let mut trace = Vec::new();

        info!(model = %self.model, max_iterations, "Invoking agent");

        for round in 1..=max_iterations {
            debug!(round, messages = messages.len(), "Dispatching to model");

            let request = ProviderRequest {
                model: self.model.clone(),
                messages: messages.clone(),
                sampling: self.sampling,
                tools: self.definitions.clone(),
            };
            let response = self
                .provider
                .complete(request)
                .await
                .map_err(|e| AgentError::backend(self.provider.name(), e))?;
            let reply = response.message;

            match parse_reply(&reply, round) {
                Ok(Action::Final(text)) => {
                    return Ok(self.respond(input, text, trace, round, StopReason::Answered));
                }
                Ok(Action::Calls(calls)) => {
                    debug!(round, count = calls.len(), "Executing tool calls");
                    let mut assistant = Message::assistant(reply.content);
                    assistant.tool_calls = calls
                        .iter()
                        .map(|c| MessageToolCall {
                            id: c.id.clone(),
                            name: c.name.clone(),
                            arguments: c.arguments.to_string(),
                        })
                        .collect();
                    messages.push(assistant);

                    for call in calls {
                        let id = call.id.clone();
                        let entry = self.dispatch(call).await;
                        messages.push(Message::tool_result(id, entry.output.clone()));
                        trace.push(entry);
                    }
                }
                Err(e) if self.policy.recover_parse_errors => {
                    warn!(round, error = %e, "Could not parse model action");
                    let observation = format!(
                        "Could not parse that action: {e}. Answer in plain text, or call a tool \
                         with a JSON object like {{\"name\": \"tool_name\", \"arguments\": {{...}}}}."
                    );
                    messages.push(Message::assistant(reply.content.clone()));
                    messages.push(Message::user(observation.clone()));
                    trace.push(TraceEntry {
                        kind: TraceKind::ParseError,
                        tool: String::new(),
                        input: Value::String(reply.content),
                        output: observation,
                    });
                }
                Err(e) => {
                    warn!(round, error = %e, "Could not parse model action, returning reply as text");
                    return Ok(self.respond(input, reply.content, trace, round, StopReason::Answered));
                }
            }
        }

        warn!(max_iterations, "Iteration limit reached, forcing a response");
        let output = fallback_answer(max_iterations, &trace);
        Ok(self.respond(input, output, trace, max_iterations, StopReason::IterationLimit))
    }

    async fn dispatch(&self, call: ParsedCall) -> TraceEntry {
        if !self.tools.contains(&call.name) {
            warn!(tool = %call.name, "Model requested an unknown tool");
            return TraceEntry {
                kind: TraceKind::UnknownTool,
                output: format!(
                    "Unknown tool '{}'. Available tools: {}.",
                    call.name,
                    self.tools.names().join(", ")
                ),
                tool: call.name,
                input: call.arguments,
            };
        }

        let observation = self.tools.observe(&call.name, call.arguments.clone()).await;
        if let Some(bus) = &self.events {
            bus.publish(DomainEvent::ToolExecuted {
                tool_name: call.name.clone(),
                success: observation.success,
                duration_ms: observation.duration_ms,
                timestamp: chrono::Utc::now(),
            });
        }
        TraceEntry {
            kind: TraceKind::ToolCall,
            tool: call.name,
            input: call.arguments,
            output: observation.output,
        }
    }

    fn respond(
        &mut self,
        input: &str,
        output: String,
        trace: Vec<TraceEntry>,
        rounds: u32,
        stop: StopReason,
    ) -> InvocationResult {
        let output = if output.trim().is_empty() {
            "I don't know.".to_string()
        } else {
            output
        };
        self.memory.record(input, &output);
        info!(rounds, steps = trace.len(), ?stop, "Agent responded");
        InvocationResult {
            output,
            trace,
            rounds,
            stop,
        }
    }
}

/// The answer given when the model never stopped calling tools.
fn fallback_answer(rounds: u32, trace: &[TraceEntry]) -> String {
    match trace.iter().rev().find(|e| e.kind == TraceKind::ToolCall) {
        Some(last) => format!(
            "I stopped after {rounds} steps without finishing. The last result, from {}, was: {}",
            last.tool, last.output
        ),
        None => format!("I stopped after {rounds} steps without reaching an answer. Please rephrase the request."),
    }
}
