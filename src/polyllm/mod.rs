// src/polyllm/mod.rs

pub mod chat_session;
pub mod config;
pub mod error;
pub mod message;
pub mod provider;
pub mod providers;
pub mod router;
pub mod tool_registry;

// Explicitly export the router so callers reach it as polyllm::Router
// instead of polyllm::polyllm::router::Router.
pub use chat_session::ChatSession;
pub use router::Router;
