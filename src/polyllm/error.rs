//! Error types for the routing core.
//!
//! The taxonomy distinguishes errors by what the router may do about them:
//! transport faults are retryable, auth and response-shape faults are not,
//! and tool execution failures never appear here at all — they travel inside
//! the conversation as `ToolResult { is_error: true }` blocks.

use std::error::Error;
use std::fmt;

use crate::polyllm::message::Role;

/// Violations of the internal message model's construction rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageError {
    /// A turn was built with no content blocks.
    EmptyContent { role: Role },
    /// `ToolResult` blocks were mixed with other block kinds in one turn.
    MixedToolResults,
    /// A `Tool` role turn carried something other than `ToolResult` blocks.
    NonResultInToolTurn,
    /// A block kind not permitted for the turn's role.
    InvalidBlockForRole { role: Role },
    /// A `ToolResult` referenced a `call_id` with no matching `ToolCall` in
    /// any preceding assistant turn of the session.
    UnmatchedToolResult { call_id: String },
    /// A system turn was appended after the conversation had started.
    SystemTurnMidConversation,
}

impl fmt::Display for MessageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageError::EmptyContent { role } => {
                write!(f, "turn with role {:?} has no content blocks", role)
            }
            MessageError::MixedToolResults => {
                write!(f, "tool results cannot share a turn with other block kinds")
            }
            MessageError::NonResultInToolTurn => {
                write!(f, "tool turns may only contain tool result blocks")
            }
            MessageError::InvalidBlockForRole { role } => {
                write!(f, "block kind not allowed in a {:?} turn", role)
            }
            MessageError::UnmatchedToolResult { call_id } => {
                write!(
                    f,
                    "tool result references call_id '{}' with no matching tool call",
                    call_id
                )
            }
            MessageError::SystemTurnMidConversation => {
                write!(f, "system turns are only allowed at the start of a session")
            }
        }
    }
}

impl Error for MessageError {}

/// What kind of transport fault interrupted a provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// The request (or the caller-supplied deadline) timed out.
    Timeout,
    /// The endpoint refused or never accepted the connection. The usual
    /// failure mode for a local Ollama daemon that is not running.
    ConnectionRefused,
    /// Any other network-level I/O fault.
    Io,
}

/// Failure of a single provider network round trip.
///
/// The router retries `Transport` with bounded backoff; `Auth` and
/// `Response` surface immediately because retrying cannot fix credentials or
/// a contract mismatch.
#[derive(Debug)]
pub enum ProviderError {
    /// Network or timeout fault. Retryable.
    Transport {
        provider: String,
        kind: TransportKind,
        message: String,
    },
    /// The provider rejected our credentials. Fatal for that provider.
    Auth { provider: String, message: String },
    /// The response could not be parsed or had an unexpected shape;
    /// signals an adapter/provider contract mismatch.
    Response { provider: String, message: String },
}

impl ProviderError {
    /// The id of the provider that produced this error.
    pub fn provider(&self) -> &str {
        match self {
            ProviderError::Transport { provider, .. }
            | ProviderError::Auth { provider, .. }
            | ProviderError::Response { provider, .. } => provider,
        }
    }

    /// Whether the router's backoff loop may retry this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::Transport { .. })
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Transport {
                provider,
                kind,
                message,
            } => write!(f, "[{}] transport fault ({:?}): {}", provider, kind, message),
            ProviderError::Auth { provider, message } => {
                write!(f, "[{}] authentication rejected: {}", provider, message)
            }
            ProviderError::Response { provider, message } => {
                write!(f, "[{}] unexpected response: {}", provider, message)
            }
        }
    }
}

impl Error for ProviderError {}

/// Errors surfaced by [`Router`](crate::polyllm::router::Router) operations.
#[derive(Debug)]
pub enum RouterError {
    /// A provider call failed after exhausting the retry budget.
    Provider(ProviderError),
    /// The dispatch loop hit its configured maximum tool-call round trips.
    ToolLoopExceeded { provider: String, iterations: usize },
    /// No provider registered under the requested id.
    UnknownProvider(String),
    /// The provider exists but its configuration failed validation.
    ProviderUnavailable { provider: String, reason: String },
    /// No session registered under the supplied handle.
    UnknownSession(String),
    /// Configuration rejected at startup.
    InvalidConfig(String),
    /// A turn violated the message model.
    Message(MessageError),
}

impl fmt::Display for RouterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouterError::Provider(e) => write!(f, "provider call failed: {}", e),
            RouterError::ToolLoopExceeded {
                provider,
                iterations,
            } => write!(
                f,
                "[{}] tool-call loop exceeded {} iterations without a final answer",
                provider, iterations
            ),
            RouterError::UnknownProvider(id) => write!(f, "unknown provider '{}'", id),
            RouterError::ProviderUnavailable { provider, reason } => {
                write!(f, "provider '{}' is disabled: {}", provider, reason)
            }
            RouterError::UnknownSession(id) => write!(f, "unknown session '{}'", id),
            RouterError::InvalidConfig(msg) => write!(f, "invalid configuration: {}", msg),
            RouterError::Message(e) => write!(f, "invalid turn: {}", e),
        }
    }
}

impl Error for RouterError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            RouterError::Provider(e) => Some(e),
            RouterError::Message(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ProviderError> for RouterError {
    fn from(err: ProviderError) -> Self {
        RouterError::Provider(err)
    }
}

impl From<MessageError> for RouterError {
    fn from(err: MessageError) -> Self {
        RouterError::Message(err)
    }
}

/// Configuration-time errors from the tool registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolRegistryError {
    /// A tool with the same name is already registered.
    DuplicateTool(String),
}

impl fmt::Display for ToolRegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolRegistryError::DuplicateTool(name) => {
                write!(f, "tool '{}' is already registered", name)
            }
        }
    }
}

impl Error for ToolRegistryError {}
