//! Provider trait: the abstraction over LLM backends.
//!
//! A Provider knows how to send a conversation (plus the tool schemas the
//! model may call) to a text-generation backend and return either final
//! text or a set of tool-call requests.
//!
//! Implementations: Ollama native API, OpenAI-compatible endpoints.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::ProviderError;
use crate::message::Message;

/// Sampling parameters forwarded to the backend on every request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    /// Temperature (0.0 = deterministic, 1.0 = creative)
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    /// Maximum tokens to generate
    pub max_tokens: u32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_k: 40,
            top_p: 0.9,
            max_tokens: 1024,
        }
    }
}

/// Configuration for a provider request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use (e.g., "llama3.2", "qwen2.5:7b")
    pub model: String,

    /// The conversation messages
    pub messages: Vec<Message>,

    #[serde(default)]
    pub sampling: SamplingParams,

    /// Available tools the model can call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
}

/// A tool definition sent to the LLM so it knows what tools it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// A complete (non-streaming) response from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// The generated message; tool-call requests live in `message.tool_calls`
    pub message: Message,

    /// Token usage statistics
    pub usage: Option<Usage>,

    /// Which model actually responded (may differ from requested)
    pub model: String,
}

/// Token usage information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// The core Provider trait.
///
/// The execution loop calls `complete()` without knowing which backend is
/// answering. The assembler uses `health_check()` and `list_models()` to
/// decide whether a build can go ahead.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "ollama").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(&self, request: ProviderRequest) -> std::result::Result<ProviderResponse, ProviderError>;

    /// List available models for this provider.
    async fn list_models(&self) -> std::result::Result<Vec<String>, ProviderError> {
        Ok(Vec::new())
    }

    /// Health check: can we reach the provider?
    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        Ok(true)
    }
}

/// Whether `wanted` appears in `available`, treating a missing tag as `:latest`.
pub fn model_matches(available: &[String], wanted: &str) -> bool {
    let normalize = |m: &str| {
        if m.contains(':') {
            m.to_string()
        } else {
            format!("{m}:latest")
        }
    };
    let wanted = normalize(wanted);
    available.iter().any(|m| normalize(m) == wanted)
}
