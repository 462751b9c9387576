//! Adapter for a locally hosted Ollama-style API.
//!
//! The request side reuses the chat-completions message packing from the
//! openai module (with object-valued tool arguments instead of JSON
//! strings); the `/api/chat` response envelope and the auth story (none)
//! are Ollama's own. Like Gemini, Ollama supplies no tool-call ids, so
//! this adapter synthesizes `call_N` ids in emission order.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

use crate::polyllm::config::ProviderConfig;
use crate::polyllm::error::ProviderError;
use crate::polyllm::message::{ContentBlock, Role, Turn};
use crate::polyllm::provider::{Capabilities, ProviderAdapter};
use crate::polyllm::providers::http::{classify_transport, get_http_client};
use crate::polyllm::providers::openai::{pack_messages, pack_tools};
use crate::polyllm::tool_registry::ToolSpec;

pub struct OllamaAdapter {
    id: String,
    client: reqwest::Client,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl OllamaAdapter {
    /// Build an adapter from a validated provider config entry. Validation
    /// guarantees `base_url` is present for this kind.
    pub fn from_config(id: impl Into<String>, config: &ProviderConfig) -> Self {
        let base_url = config.base_url.clone().unwrap_or_default();
        OllamaAdapter {
            id: id.into(),
            client: get_http_client(&base_url),
            base_url,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    message: WireMessage,
}

#[derive(Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Deserialize)]
struct WireToolCall {
    function: WireFunction,
}

#[derive(Deserialize)]
struct WireFunction {
    name: String,
    arguments: serde_json::Map<String, JsonValue>,
}

fn unpack_response(response: ChatResponse) -> Result<Turn, String> {
    let mut blocks = Vec::new();
    if !response.message.content.is_empty() {
        blocks.push(ContentBlock::text(response.message.content));
    }
    for (index, call) in response
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .enumerate()
    {
        blocks.push(ContentBlock::ToolCall {
            call_id: format!("call_{}", index),
            tool_name: call.function.name,
            arguments: call.function.arguments,
        });
    }

    if blocks.is_empty() {
        return Err("message contained neither content nor tool calls".to_string());
    }

    Turn::new(Role::Assistant, blocks).map_err(|e| e.to_string())
}

#[async_trait]
impl ProviderAdapter for OllamaAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            supports_tool_calls: true,
            supports_images: false,
            max_context_turns: 64,
        }
    }

    async fn call(
        &self,
        history: &[Turn],
        available_tools: &[ToolSpec],
    ) -> Result<Turn, ProviderError> {
        let mut request = json!({
            "model": self.model,
            "messages": pack_messages(history, false),
            "stream": false,
            "options": {
                "temperature": self.temperature,
                "num_predict": self.max_tokens,
            },
        });
        if !available_tools.is_empty() {
            request["tools"] = json!(pack_tools(available_tools));
        }

        let url = format!("{}/api/chat", self.base_url.trim_end_matches('/'));

        // No credentials; the usual failure mode here is a daemon that is
        // not running, which surfaces as Transport { ConnectionRefused }.
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| classify_transport(&self.id, &e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Response {
                provider: self.id.clone(),
                message: format!("status {}: {}", status.as_u16(), body),
            });
        }

        let decoded: ChatResponse =
            response.json().await.map_err(|e| ProviderError::Response {
                provider: self.id.clone(),
                message: format!("undecodable body: {}", e),
            })?;

        unpack_response(decoded).map_err(|message| {
            log::error!("OllamaAdapter::call [{}]: {}", self.id, message);
            ProviderError::Response {
                provider: self.id.clone(),
                message,
            }
        })
    }
}
