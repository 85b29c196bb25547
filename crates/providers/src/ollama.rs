//! Ollama native API provider.
//!
//! Talks to `/api/chat` (non-streaming) for completions and `/api/tags` for
//! model discovery and health checks. Tool calls come back with their
//! arguments as a JSON object; they are re-serialized to a string so the
//! agent sees the same shape every backend produces.

use async_trait::async_trait;
use slothtop_core::error::ProviderError;
use slothtop_core::message::{Message, MessageToolCall, Role};
use slothtop_core::provider::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Health checks must answer quickly even if completions are slow.
const HEALTH_TIMEOUT: Duration = Duration::from_secs(3);

pub struct OllamaProvider {
    base_url: String,
    client: reqwest::Client,
}

impl OllamaProvider {
    /// Create a provider for `base_url` (e.g. `http://localhost:11434`).
    ///
    /// The client is shared; rebuilding an agent does not open new pools.
    pub fn new(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build the `/api/chat` request body.
    fn request_body(request: &ProviderRequest) -> ChatRequest {
        ChatRequest {
            model: request.model.clone(),
            messages: request.messages.iter().map(to_api_message).collect(),
            tools: request
                .tools
                .iter()
                .map(|t| ApiTool {
                    r#type: "function".into(),
                    function: ApiToolFunction {
                        name: t.name.clone(),
                        description: t.description.clone(),
                        parameters: t.parameters.clone(),
                    },
                })
                .collect(),
            stream: false,
            options: ChatOptions {
                temperature: request.sampling.temperature,
                top_k: request.sampling.top_k,
                top_p: request.sampling.top_p,
                num_predict: request.sampling.max_tokens,
            },
        }
    }

    fn into_response(api: ChatResponse) -> ProviderResponse {
        let tool_calls = api
            .message
            .tool_calls
            .into_iter()
            // the API carries no call ids; the agent assigns per-round ones
            .map(|tc| MessageToolCall {
                id: String::new(),
                name: tc.function.name,
                arguments: match tc.function.arguments {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                },
            })
            .collect();

        let mut message = Message::assistant(api.message.content);
        message.tool_calls = tool_calls;

        let usage = match (api.prompt_eval_count, api.eval_count) {
            (None, None) => None,
            (prompt, completion) => {
                let prompt = prompt.unwrap_or(0);
                let completion = completion.unwrap_or(0);
                Some(Usage {
                    prompt_tokens: prompt,
                    completion_tokens: completion,
                    total_tokens: prompt + completion,
                })
            }
        };

        ProviderResponse {
            message,
            usage,
            model: api.model,
        }
    }

    async fn fetch_tags(&self, timeout: Option<Duration>) -> std::result::Result<TagsResponse, ProviderError> {
        let url = format!("{}/api/tags", self.base_url);
        let mut req = self.client.get(&url);
        if let Some(t) = timeout {
            req = req.timeout(t);
        }
        let response = req.send().await.map_err(map_reqwest_error)?;
        if !response.status().is_success() {
            return Err(ProviderError::ApiError {
                status_code: response.status().as_u16(),
                message: format!("GET {url} failed"),
            });
        }
        response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))
    }
}

fn to_api_message(m: &Message) -> ApiMessage {
    ApiMessage {
        role: match m.role {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Tool => "tool",
        }
        .into(),
        content: m.content.clone(),
        tool_calls: m
            .tool_calls
            .iter()
            .map(|tc| ApiToolCall {
                function: ApiFunction {
                    name: tc.name.clone(),
                    arguments: serde_json::from_str(&tc.arguments)
                        .unwrap_or_else(|_| serde_json::Value::String(tc.arguments.clone())),
                },
            })
            .collect(),
    }
}

fn map_reqwest_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(e.to_string())
    } else {
        ProviderError::Network(e.to_string())
    }
}

#[async_trait]
impl slothtop_core::Provider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = Self::request_body(&request);

        debug!(model = %request.model, messages = body.messages.len(), tools = body.tools.len(), "Sending chat request");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status().as_u16();
        if status == 404 {
            return Err(ProviderError::ModelNotFound(request.model));
        }
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Ollama returned error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let api: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        Ok(Self::into_response(api))
    }

    async fn list_models(&self) -> std::result::Result<Vec<String>, ProviderError> {
        let tags = self.fetch_tags(None).await?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        match self.fetch_tags(Some(HEALTH_TIMEOUT)).await {
            Ok(_) => Ok(true),
            Err(ProviderError::Network(_) | ProviderError::Timeout(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

// --- Ollama API types ---

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ApiTool>,
    stream: bool,
    options: ChatOptions,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
    top_k: u32,
    top_p: f32,
    num_predict: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(default)]
    content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<ApiToolCall>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct ApiTool {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: String,
    message: ApiMessage,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagModel>,
}

#[derive(Debug, Deserialize)]
struct TagModel {
    name: String,
}
