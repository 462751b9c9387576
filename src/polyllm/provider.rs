//! The capability interface every backend adapter implements.
//!
//! A [`ProviderAdapter`] owns the full translation between the internal
//! message model and one provider's wire protocol: packing history, packing
//! tool schemas, issuing the HTTP call, and decoding the raw response into
//! exactly one assistant [`Turn`]. Provider-native shapes never leak past
//! this boundary.

use async_trait::async_trait;

use crate::polyllm::error::ProviderError;
use crate::polyllm::message::Turn;
use crate::polyllm::tool_registry::ToolSpec;

/// What a provider can handle, used by the router to strip unsupported
/// content before dispatch instead of failing the whole call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub supports_tool_calls: bool,
    pub supports_images: bool,
    /// Upper bound on transcript turns per request; the router truncates the
    /// oldest non-system turns to fit.
    pub max_context_turns: usize,
}

/// Uniform interface over heterogeneous backend AI services.
///
/// Implementations perform exactly one network round trip per [`call`] and
/// report failures through the three-way [`ProviderError`] taxonomy so the
/// router's retry policy can distinguish them.
///
/// [`call`]: ProviderAdapter::call
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Stable id this adapter is registered under (matches the config key).
    fn id(&self) -> &str;

    /// Static description of what this backend supports.
    fn capabilities(&self) -> Capabilities;

    /// Re-encode `history` and `available_tools` into the provider's native
    /// format, perform one HTTP round trip, and decode the response into a
    /// single assistant turn. Tool-call requests in the response are decoded
    /// into `ToolCall` blocks with provider-supplied or synthesized ids.
    async fn call(
        &self,
        history: &[Turn],
        available_tools: &[ToolSpec],
    ) -> Result<Turn, ProviderError>;
}
