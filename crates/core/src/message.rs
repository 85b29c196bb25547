//! Message and conversation domain types.
//!
//! `Message` is what flows between the agent and a model backend.
//! `ConversationState` is the user-facing transcript: the front-end appends
//! turns to it and the agent assembler reads it to seed memory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The role of a message sender in a model request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The AI assistant
    Assistant,
    /// System instructions (identity, rules)
    System,
    /// Tool execution result
    Tool,
}

/// A single message in a model request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Who sent this message
    pub role: Role,

    /// The text content
    pub content: String,

    /// Tool calls requested by the assistant (if any)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<MessageToolCall>,

    /// If this is a tool result, which tool call it responds to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Timestamp
    pub timestamp: DateTime<Utc>,
}

impl Message {
    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            timestamp: Utc::now(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content)
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }

    /// Create a tool result message.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        let mut msg = Self::with_role(Role::Tool, content);
        msg.tool_call_id = Some(tool_call_id.into());
        msg
    }
}

/// A tool call embedded in an assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageToolCall {
    /// Unique ID for this tool call
    pub id: String,

    /// Name of the tool to invoke
    pub name: String,

    /// Arguments as JSON string, exactly as the model produced them
    pub arguments: String,
}

/// Who spoke a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Assistant,
}

/// One turn of the user-facing transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub speaker: Speaker,

    /// Display name of the speaker ("You", or the agent's configured name)
    pub name: String,

    pub text: String,

    pub timestamp: DateTime<Utc>,
}

/// Ordered, append-only transcript of a chat session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationState {
    turns: Vec<Turn>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a user turn.
    pub fn push_user(&mut self, name: impl Into<String>, text: impl Into<String>) {
        self.push(Speaker::User, name, text);
    }

    /// Append an assistant turn.
    pub fn push_assistant(&mut self, name: impl Into<String>, text: impl Into<String>) {
        self.push(Speaker::Assistant, name, text);
    }

    fn push(&mut self, speaker: Speaker, name: impl Into<String>, text: impl Into<String>) {
        self.turns.push(Turn {
            speaker,
            name: name.into(),
            text: text.into(),
            timestamp: Utc::now(),
        });
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// The last `n` turns, oldest first.
    pub fn tail(&self, n: usize) -> &[Turn] {
        let start = self.turns.len().saturating_sub(n);
        &self.turns[start..]
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
