//! Model backend clients for Slothtop.
//!
//! All providers implement the `slothtop_core::Provider` trait.
//! [`router::build_from_config`] picks one from the runtime configuration.

pub mod ollama;
pub mod openai_compat;
pub mod router;

pub use ollama::OllamaProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use router::{build_from_config, http_client};
