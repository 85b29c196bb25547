//! The Slothtop agent.
//!
//! The agent follows a **Dispatch → Act → Observe** cycle:
//!
//! 1. **Assemble**: settings, tool registry and model client are bound into
//!    an [`AgentInstance`] by the [`AgentAssembler`]
//! 2. **Dispatch** the prompt, rolling memory and user input to the model
//! 3. **If tool calls**: run them through the registry, feed each result back
//!    as an observation, and loop back to step 2
//! 4. **If text**: that is the answer
//!
//! The loop also stops at the iteration cap. A [`Session`] owns the live
//! instance and replaces it whenever the settings store reports a change.

pub mod action;
pub mod assembler;
pub mod error;
pub mod executor;
pub mod memory;
pub mod prompt;
pub mod session;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use action::{Action, ActionParseError, ParsedCall, parse_reply};
pub use assembler::AgentAssembler;
pub use error::AgentError;
pub use executor::{AgentInstance, ExecutionPolicy, InvocationResult, StopReason, TraceEntry, TraceKind};
pub use memory::ConversationMemory;
pub use prompt::PromptTemplate;
pub use session::{Session, USER_DISPLAY_NAME};
