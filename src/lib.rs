//! # PolyLLM
//!
//! PolyLLM is a routing core for applications that converse with Large Language
//! Models across heterogeneous backends and let those models execute structured
//! actions through tools.
//!
//! The crate provides carefully layered abstractions for:
//!
//! * **A Provider-Neutral Message Model**: conversations are sequences of
//!   [`Turn`]s built from typed [`ContentBlock`]s (text, images, tool calls,
//!   tool results), so business logic never touches a provider's wire shapes
//! * **Provider Adapters**: the [`ProviderAdapter`] trait implemented for
//!   Gemini-native, OpenAI-style chat-completions, and locally hosted
//!   Ollama-style APIs, each owning the full translation to its native format
//! * **Tools**: a [`tool_registry::ToolRegistry`] of schema-validated async
//!   tools the model can call, with execution failures fed back into the
//!   conversation as data rather than surfaced as errors
//! * **Stateful Sessions**: append-only [`ChatSession`] transcripts, each
//!   bound to one provider and guarded for single-writer access
//! * **The Router**: [`Router`] owns the adapter table and every live
//!   session, and drives the dispatch loop (model asks for tools, host
//!   executes them, results go back) until a final answer emerges, with
//!   bounded retries for transport faults
//!
//! ## Getting Started
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use polyllm::config::RouterConfig;
//! use polyllm::message::Turn;
//! use polyllm::tool_registry::ToolRegistry;
//! use polyllm::Router;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     polyllm::init_logger();
//!
//!     let config: RouterConfig = serde_json::from_str(r#"{
//!         "default_provider": "local",
//!         "providers": {
//!             "local": {
//!                 "kind": "ollama",
//!                 "base_url": "http://localhost:11434",
//!                 "model": "llama3.1"
//!             }
//!         },
//!         "system_prompt": "You are terse."
//!     }"#)?;
//!
//!     let router = Router::from_config(config, Arc::new(ToolRegistry::new()))?;
//!     let session = router.create_session(None, None)?;
//!
//!     let reply = router
//!         .send(&session, Turn::user_text("Summarise PolyLLM in one sentence."), None)
//!         .await?;
//!
//!     println!("{}", reply.text());
//!     Ok(())
//! }
//! ```
//!
//! ### Registering Tools
//!
//! ```rust
//! use std::sync::Arc;
//! use polyllm::tool_registry::{ToolDefinition, ToolParameter, ToolParameterType, ToolRegistry};
//!
//! let mut registry = ToolRegistry::new();
//! registry.register(
//!     ToolDefinition::new("get_entry_details", "Look up a stored vocabulary entry.")
//!         .with_parameter(
//!             ToolParameter::new("query_text", ToolParameterType::String)
//!                 .with_description("The word or phrase to look up")
//!                 .required(),
//!         )
//!         .with_tag("vocabulary")
//!         .with_handler(Arc::new(|args| {
//!             Box::pin(async move {
//!                 Ok(serde_json::json!({ "entry": args["query_text"] }))
//!             })
//!         })),
//! ).unwrap();
//! ```
//!
//! Continue exploring the modules re-exported from the crate root for the
//! individual building blocks.

use std::sync::Once;

static INIT_LOGGER: Once = Once::new();

/// Initialise the global [`env_logger`] subscriber exactly once.
///
/// The helper is intentionally lightweight so that applications embedding
/// PolyLLM can opt-in to simple `RUST_LOG` driven diagnostics without having
/// to choose a specific logging backend upfront.
///
/// ```rust
/// polyllm::init_logger();
/// log::info!("Logger is ready");
/// ```
pub fn init_logger() {
    INIT_LOGGER.call_once(|| {
        env_logger::init();
    });
}

// Import the top-level `polyllm` module.
pub mod polyllm;

// Re-exporting key items for easier external access.
pub use crate::polyllm::chat_session::ChatSession;
pub use crate::polyllm::config;
pub use crate::polyllm::config::{ProviderConfig, ProviderKind, RouterConfig};
pub use crate::polyllm::error;
pub use crate::polyllm::error::{
    MessageError, ProviderError, RouterError, ToolRegistryError, TransportKind,
};
pub use crate::polyllm::message;
pub use crate::polyllm::message::{ContentBlock, ImageData, Role, Turn};
pub use crate::polyllm::provider::{Capabilities, ProviderAdapter};
pub use crate::polyllm::providers;
pub use crate::polyllm::router::{Router, SessionId};
pub use crate::polyllm::tool_registry;
pub use crate::polyllm::tool_registry::{
    ToolDefinition, ToolHandler, ToolParameter, ToolParameterType, ToolRegistry, ToolSpec,
};
