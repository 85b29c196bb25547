//! Tool trait and the ordered tool registry.
//!
//! Tools are what give the assistant the ability to act on the desktop:
//! open applications, power off the machine, query the web, sample hardware.
//! Each tool declares an ordered parameter list; the registry derives the
//! JSON schema sent to the model from it and validates arguments against it
//! before dispatch.
//!
//! Every invocation goes through [`ToolRegistry::invoke`], which never fails:
//! errors, timeouts and panics all come back as a `{"error": ...}` string the
//! agent can observe.

use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use crate::error::ToolError;
use crate::provider::ToolDefinition;

/// Default bound on a single tool invocation.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// The declared type of a tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
}

impl ParamType {
    pub fn as_str(self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
        }
    }
}

/// One entry of a tool's ordered input schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolParam {
    pub name: String,
    pub kind: ParamType,
    pub description: String,
    pub required: bool,
}

impl ToolParam {
    pub fn required(name: &str, kind: ParamType, description: &str) -> Self {
        Self {
            name: name.into(),
            kind,
            description: description.into(),
            required: true,
        }
    }

    pub fn optional(name: &str, kind: ParamType, description: &str) -> Self {
        Self {
            required: false,
            ..Self::required(name, kind, description)
        }
    }
}

/// The result of a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether the tool executed successfully
    pub success: bool,

    /// The output content
    pub output: String,

    /// Optional structured data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ToolResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// The core Tool trait.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "open_app").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// Ordered parameter list.
    fn params(&self) -> Vec<ToolParam>;

    /// JSON Schema describing this tool's parameters, derived from `params()`.
    fn parameters_schema(&self) -> serde_json::Value {
        schema_for(&self.params())
    }

    /// Execute the tool with already-validated arguments.
    async fn execute(&self, arguments: serde_json::Value) -> std::result::Result<ToolResult, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the LLM.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// Build an object schema whose `properties` keep declaration order.
pub fn schema_for(params: &[ToolParam]) -> serde_json::Value {
    let mut properties = serde_json::Map::new();
    let mut required = Vec::new();
    for p in params {
        properties.insert(
            p.name.clone(),
            serde_json::json!({ "type": p.kind.as_str(), "description": p.description }),
        );
        if p.required {
            required.push(serde_json::Value::String(p.name.clone()));
        }
    }
    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

/// Check `arguments` against `params`, coercing numeric strings where the
/// declared type is numeric. Returns the normalized argument object.
pub fn validate_arguments(
    params: &[ToolParam],
    arguments: serde_json::Value,
) -> std::result::Result<serde_json::Value, ToolError> {
    let mut map = match arguments {
        serde_json::Value::Object(map) => map,
        serde_json::Value::Null => serde_json::Map::new(),
        other => {
            return Err(ToolError::InvalidArguments(format!(
                "expected an object, got {other}"
            )));
        }
    };

    for p in params {
        let Some(value) = map.get(&p.name) else {
            if p.required {
                return Err(ToolError::InvalidArguments(format!(
                    "missing required parameter '{}'",
                    p.name
                )));
            }
            continue;
        };
        let coerced = coerce(p.kind, value).ok_or_else(|| {
            ToolError::InvalidArguments(format!(
                "parameter '{}' must be {}, got {value}",
                p.name,
                p.kind.as_str()
            ))
        })?;
        map.insert(p.name.clone(), coerced);
    }

    Ok(serde_json::Value::Object(map))
}

fn coerce(kind: ParamType, value: &serde_json::Value) -> Option<serde_json::Value> {
    use serde_json::Value;
    match (kind, value) {
        (ParamType::String, Value::String(_)) => Some(value.clone()),
        (ParamType::String, Value::Number(n)) => Some(Value::String(n.to_string())),
        (ParamType::Integer, Value::Number(n)) if n.is_i64() || n.is_u64() => Some(value.clone()),
        (ParamType::Integer, Value::String(s)) => s.trim().parse::<i64>().ok().map(Value::from),
        (ParamType::Number, Value::Number(_)) => Some(value.clone()),
        (ParamType::Number, Value::String(s)) => s.trim().parse::<f64>().ok().map(Value::from),
        (ParamType::Boolean, Value::Bool(_)) => Some(value.clone()),
        (ParamType::Boolean, Value::String(s)) => s.trim().parse::<bool>().ok().map(Value::from),
        _ => None,
    }
}

/// Render a tool error the way the agent observes it.
pub fn error_payload(err: &ToolError) -> String {
    serde_json::json!({ "error": err.to_string() }).to_string()
}

/// A registered tool: its metadata plus the handler that runs it.
#[derive(Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub params: Vec<ToolParam>,
    pub handler: Arc<dyn Tool>,
}

impl std::fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl ToolDescriptor {
    pub fn from_tool(tool: Arc<dyn Tool>) -> Self {
        Self {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            params: tool.params(),
            handler: tool,
        }
    }

    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: schema_for(&self.params),
        }
    }
}

/// An ordered registry of available tools.
///
/// The execution loop uses this to:
/// 1. Get tool definitions to send to the LLM, in registration order
/// 2. Dispatch a parsed tool call by name, bounded by the registry timeout
pub struct ToolRegistry {
    tools: Vec<ToolDescriptor>,
    index: HashMap<String, usize>,
    timeout: Duration,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: Vec::new(),
            index: HashMap::new(),
            timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    /// Bound every invocation by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Register a tool. Names must be unique.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> std::result::Result<(), ToolError> {
        self.register_descriptor(ToolDescriptor::from_tool(tool))
    }

    pub fn register_descriptor(&mut self, descriptor: ToolDescriptor) -> std::result::Result<(), ToolError> {
        if self.index.contains_key(&descriptor.name) {
            return Err(ToolError::Duplicate(descriptor.name));
        }
        self.index.insert(descriptor.name.clone(), self.tools.len());
        self.tools.push(descriptor);
        Ok(())
    }

    /// All descriptors in registration order.
    pub fn list(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    /// Get a descriptor by name.
    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Tool definitions for the model, in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(ToolDescriptor::definition).collect()
    }

    /// Registered tool names, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Validate and run a tool, converting panics and timeouts into errors.
    pub async fn try_invoke(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> std::result::Result<ToolResult, ToolError> {
        let descriptor = self
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        let arguments = validate_arguments(&descriptor.params, arguments)?;

        let handler = Arc::clone(&descriptor.handler);
        let run = AssertUnwindSafe(async move { handler.execute(arguments).await }).catch_unwind();

        match tokio::time::timeout(self.timeout, run).await {
            Ok(Ok(result)) => result,
            Ok(Err(panic)) => Err(ToolError::Panicked {
                tool_name: name.to_string(),
                reason: panic_message(panic.as_ref()),
            }),
            Err(_) => Err(ToolError::Timeout {
                tool_name: name.to_string(),
                timeout_secs: self.timeout.as_secs(),
            }),
        }
    }

    /// Run a tool and always return a string: the output on success, an
    /// `{"error": ...}` object otherwise.
    pub async fn invoke(&self, name: &str, arguments: serde_json::Value) -> String {
        self.observe(name, arguments).await.output
    }

    /// Like [`invoke`](Self::invoke), but also reports whether the tool
    /// succeeded and how long it took.
    pub async fn observe(&self, name: &str, arguments: serde_json::Value) -> Observation {
        let started = std::time::Instant::now();
        let (success, output) = match self.try_invoke(name, arguments).await {
            Ok(result) if result.success => (true, result.output),
            Ok(result) => {
                warn!(tool = name, "Tool reported failure");
                (false, error_payload(&ToolError::failed(name, result.output)))
            }
            Err(e) => {
                warn!(tool = name, error = %e, "Tool invocation failed");
                (false, error_payload(&e))
            }
        };
        let duration_ms = started.elapsed().as_millis() as u64;
        if success {
            debug!(tool = name, duration_ms, "Tool succeeded");
        }
        Observation {
            success,
            output,
            duration_ms,
        }
    }
}

/// What the agent sees after a tool ran.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub success: bool,
    pub output: String,
    pub duration_ms: u64,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
