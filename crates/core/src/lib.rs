//! # Slothtop Core
//!
//! Domain types, traits, and error definitions for the Slothtop desktop
//! assistant. Every other crate depends inward on this one.
//!
//! - [`provider::Provider`] abstracts the model backend
//! - [`tool::Tool`] and [`tool::ToolRegistry`] hold the desktop actions
//! - [`message::ConversationState`] is the chat transcript
//! - [`event::EventBus`] carries settings-change notifications

pub mod error;
pub mod message;
pub mod provider;
pub mod tool;
pub mod event;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, Result, ToolError};
pub use message::{ConversationState, Message, MessageToolCall, Role, Speaker, Turn};
pub use provider::{Provider, ProviderRequest, ProviderResponse, SamplingParams, ToolDefinition};
pub use tool::{Observation, ParamType, Tool, ToolDescriptor, ToolParam, ToolRegistry, ToolResult};
pub use event::{DomainEvent, EventBus};
