//! Adapter for OpenAI-style chat-completions APIs.
//!
//! This is the most widely cloned wire format, so the message packing lives
//! in free `pub(crate)` functions that the Ollama adapter reuses. The
//! OpenAI-specific quirks: tool-call arguments are a JSON *string* rather
//! than an object, every tool result is its own `tool`-role message keyed by
//! `tool_call_id`, and inline images travel as `data:` URLs inside
//! `image_url` content parts.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

use crate::polyllm::config::ProviderConfig;
use crate::polyllm::error::ProviderError;
use crate::polyllm::message::{ContentBlock, ImageData, Role, Turn};
use crate::polyllm::provider::{Capabilities, ProviderAdapter};
use crate::polyllm::providers::http::{classify_transport, get_http_client};
use crate::polyllm::tool_registry::ToolSpec;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiAdapter {
    id: String,
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl OpenAiAdapter {
    /// Build an adapter from a validated provider config entry. Pointing
    /// `base_url` at a compatible vendor works unchanged.
    pub fn from_config(id: impl Into<String>, config: &ProviderConfig) -> Self {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        OpenAiAdapter {
            id: id.into(),
            client: get_http_client(&base_url),
            base_url,
            api_key: config.api_key.clone().unwrap_or_default(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }
}

// --- translation, shared with the ollama adapter ---

fn image_url(mime_type: &str, data: &ImageData) -> String {
    match data {
        ImageData::Url(url) => url.clone(),
        ImageData::Bytes(bytes) => {
            format!("data:{};base64,{}", mime_type, BASE64.encode(bytes))
        }
    }
}

/// Encode the history as a chat-completions `messages` array.
///
/// `args_as_string` selects how assistant tool-call arguments are encoded:
/// OpenAI wants a serialized JSON string, Ollama wants the object itself.
pub(crate) fn pack_messages(history: &[Turn], args_as_string: bool) -> Vec<JsonValue> {
    let mut messages = Vec::new();

    for turn in history {
        match turn.role {
            Role::System => messages.push(json!({
                "role": "system",
                "content": turn.text(),
            })),
            Role::User => {
                let has_image = turn
                    .content
                    .iter()
                    .any(|b| matches!(b, ContentBlock::Image { .. }));
                if !has_image {
                    messages.push(json!({
                        "role": "user",
                        "content": turn.text(),
                    }));
                } else {
                    let parts: Vec<JsonValue> = turn
                        .content
                        .iter()
                        .filter_map(|block| match block {
                            ContentBlock::Text { text } => Some(json!({
                                "type": "text",
                                "text": text,
                            })),
                            ContentBlock::Image { mime_type, data } => Some(json!({
                                "type": "image_url",
                                "image_url": { "url": image_url(mime_type, data) },
                            })),
                            _ => None,
                        })
                        .collect();
                    messages.push(json!({
                        "role": "user",
                        "content": parts,
                    }));
                }
            }
            Role::Assistant => {
                let text = turn.text();
                let mut message = json!({
                    "role": "assistant",
                    "content": if text.is_empty() { JsonValue::Null } else { json!(text) },
                });
                let calls: Vec<JsonValue> = turn
                    .content
                    .iter()
                    .filter_map(|block| match block {
                        ContentBlock::ToolCall {
                            call_id,
                            tool_name,
                            arguments,
                        } => {
                            let encoded_args = if args_as_string {
                                json!(JsonValue::Object(arguments.clone()).to_string())
                            } else {
                                JsonValue::Object(arguments.clone())
                            };
                            Some(json!({
                                "id": call_id,
                                "type": "function",
                                "function": {
                                    "name": tool_name,
                                    "arguments": encoded_args,
                                },
                            }))
                        }
                        _ => None,
                    })
                    .collect();
                if !calls.is_empty() {
                    message["tool_calls"] = json!(calls);
                }
                messages.push(message);
            }
            // One tool-role message per result, correlated by tool_call_id.
            Role::Tool => {
                for block in &turn.content {
                    if let ContentBlock::ToolResult {
                        call_id, result, ..
                    } = block
                    {
                        messages.push(json!({
                            "role": "tool",
                            "tool_call_id": call_id,
                            "content": result.to_string(),
                        }));
                    }
                }
            }
        }
    }

    messages
}

pub(crate) fn pack_tools(tools: &[ToolSpec]) -> Vec<JsonValue> {
    tools
        .iter()
        .map(|spec| {
            json!({
                "type": "function",
                "function": {
                    "name": spec.name,
                    "description": spec.description,
                    "parameters": spec.parameters_schema,
                },
            })
        })
        .collect()
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: WireMessage,
}

#[derive(Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunction,
}

#[derive(Deserialize)]
struct WireFunction {
    name: String,
    arguments: String,
}

/// Decode the first choice into one assistant turn. Provider-supplied
/// tool-call ids pass through untouched.
fn unpack_response(response: ChatResponse) -> Result<Turn, String> {
    let message = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| "response contained no choices".to_string())?
        .message;

    let mut blocks = Vec::new();
    if let Some(text) = message.content {
        if !text.is_empty() {
            blocks.push(ContentBlock::text(text));
        }
    }
    for call in message.tool_calls.unwrap_or_default() {
        let arguments = match serde_json::from_str::<JsonValue>(&call.function.arguments) {
            Ok(JsonValue::Object(map)) => map,
            Ok(other) => {
                return Err(format!(
                    "tool call '{}' arguments are not a JSON object: {}",
                    call.function.name, other
                ))
            }
            Err(e) => {
                return Err(format!(
                    "tool call '{}' arguments are not valid JSON: {}",
                    call.function.name, e
                ))
            }
        };
        blocks.push(ContentBlock::ToolCall {
            call_id: call.id,
            tool_name: call.function.name,
            arguments,
        });
    }

    if blocks.is_empty() {
        return Err("choice contained neither content nor tool calls".to_string());
    }

    Turn::new(Role::Assistant, blocks).map_err(|e| e.to_string())
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            supports_tool_calls: true,
            supports_images: true,
            max_context_turns: 128,
        }
    }

    async fn call(
        &self,
        history: &[Turn],
        available_tools: &[ToolSpec],
    ) -> Result<Turn, ProviderError> {
        let mut request = json!({
            "model": self.model,
            "messages": pack_messages(history, true),
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });
        if !available_tools.is_empty() {
            request["tools"] = json!(pack_tools(available_tools));
            request["tool_choice"] = json!("auto");
        }

        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| classify_transport(&self.id, &e))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Auth {
                provider: self.id.clone(),
                message: format!("status {}: {}", status.as_u16(), body),
            });
        }
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
            log::error!("OpenAiAdapter::call [{}]: {}", self.id, message);
            ProviderError::Response {
                provider: self.id.clone(),
                message,
            }
        })
    }
}
