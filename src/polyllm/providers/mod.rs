//! Backend adapters, one module per wire protocol, plus the shared HTTP
//! client pool. Each adapter implements
//! [`ProviderAdapter`](crate::polyllm::provider::ProviderAdapter) and keeps
//! its provider's native shapes private to its own module.

pub mod gemini;
pub mod http;
pub mod ollama;
pub mod openai;

pub use gemini::GeminiAdapter;
pub use ollama::OllamaAdapter;
pub use openai::OpenAiAdapter;
