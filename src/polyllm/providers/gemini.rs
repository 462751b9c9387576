//! Adapter for the hosted Gemini-style generation API.
//!
//! The wire format differs structurally from chat-completions: turns map to
//! a `contents` array with roles `user`/`model`, the system prompt is a
//! separate top-level `systemInstruction` field rather than a transcript
//! turn, and tool calls arrive as structured `functionCall` parts inside a
//! model turn. There is no native tool role; tool results are folded back as
//! `functionResponse` parts inside a user-role content.
//!
//! Gemini supplies no tool-call ids, so this adapter synthesizes `call_N`
//! ids in part order within each decoded turn.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::polyllm::config::ProviderConfig;
use crate::polyllm::error::ProviderError;
use crate::polyllm::message::{ContentBlock, ImageData, Role, Turn};
use crate::polyllm::provider::{Capabilities, ProviderAdapter};
use crate::polyllm::providers::http::{classify_transport, get_http_client};
use crate::polyllm::tool_registry::ToolSpec;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiAdapter {
    id: String,
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl GeminiAdapter {
    /// Build an adapter from a validated provider config entry.
    pub fn from_config(id: impl Into<String>, config: &ProviderConfig) -> Self {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        GeminiAdapter {
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

// --- wire format types ---

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<WireContent>,
    contents: Vec<WireContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireToolGroup>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Serialize, Deserialize)]
struct WireContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<WirePart>,
}

#[derive(Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct WirePart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<WireInlineData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_call: Option<WireFunctionCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_response: Option<WireFunctionResponse>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireInlineData {
    mime_type: String,
    data: String,
}

#[derive(Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    args: serde_json::Map<String, JsonValue>,
}

#[derive(Serialize, Deserialize)]
struct WireFunctionResponse {
    name: String,
    response: JsonValue,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireToolGroup {
    function_declarations: Vec<WireFunctionDeclaration>,
}

#[derive(Serialize)]
struct WireFunctionDeclaration {
    name: String,
    description: String,
    parameters: JsonValue,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: WireContent,
}

// --- translation ---

/// Split the history into the top-level system instruction and the
/// `contents` array. System turns never appear in the transcript; assistant
/// turns become `model` contents; tool turns become user-role contents
/// carrying `functionResponse` parts.
fn pack_history(history: &[Turn]) -> (Option<WireContent>, Vec<WireContent>) {
    let mut system_instruction = None;
    let mut contents = Vec::new();

    for turn in history {
        if turn.role == Role::System {
            system_instruction = Some(WireContent {
                role: None,
                parts: vec![WirePart {
                    text: Some(turn.text()),
                    ..WirePart::default()
                }],
            });
            continue;
        }

        let role = match turn.role {
            Role::Assistant => "model",
            _ => "user",
        };

        let mut parts = Vec::new();
        for block in &turn.content {
            match block {
                ContentBlock::Text { text } => parts.push(WirePart {
                    text: Some(text.clone()),
                    ..WirePart::default()
                }),
                ContentBlock::Image { mime_type, data } => {
                    let encoded = match data {
                        ImageData::Bytes(bytes) => BASE64.encode(bytes),
                        // Gemini's inline_data wants bytes; a URL payload is
                        // passed through as text so the model still sees it.
                        ImageData::Url(url) => {
                            parts.push(WirePart {
                                text: Some(url.clone()),
                                ..WirePart::default()
                            });
                            continue;
                        }
                    };
                    parts.push(WirePart {
                        inline_data: Some(WireInlineData {
                            mime_type: mime_type.clone(),
                            data: encoded,
                        }),
                        ..WirePart::default()
                    });
                }
                ContentBlock::ToolCall {
                    tool_name,
                    arguments,
                    ..
                } => parts.push(WirePart {
                    function_call: Some(WireFunctionCall {
                        name: tool_name.clone(),
                        args: arguments.clone(),
                    }),
                    ..WirePart::default()
                }),
                ContentBlock::ToolResult {
                    tool_name, result, ..
                } => parts.push(WirePart {
                    function_response: Some(WireFunctionResponse {
                        name: tool_name.clone(),
                        response: serde_json::json!({ "content": result }),
                    }),
                    ..WirePart::default()
                }),
            }
        }

        if !parts.is_empty() {
            contents.push(WireContent {
                role: Some(role.to_string()),
                parts,
            });
        }
    }

    (system_instruction, contents)
}

fn pack_tools(tools: &[ToolSpec]) -> Option<Vec<WireToolGroup>> {
    if tools.is_empty() {
        return None;
    }
    let declarations = tools
        .iter()
        .map(|spec| WireFunctionDeclaration {
            name: spec.name.clone(),
            description: spec.description.clone(),
            parameters: spec.parameters_schema.clone(),
        })
        .collect();
    Some(vec![WireToolGroup {
        function_declarations: declarations,
    }])
}

/// Decode the first candidate into one assistant turn, preserving part
/// order and synthesizing `call_N` ids for function calls.
fn unpack_response(response: GenerateResponse) -> Result<Turn, String> {
    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| "response contained no candidates".to_string())?;

    let mut blocks = Vec::new();
    let mut next_call = 0usize;
    for part in candidate.content.parts {
        if let Some(call) = part.function_call {
            blocks.push(ContentBlock::ToolCall {
                call_id: format!("call_{}", next_call),
                tool_name: call.name,
                arguments: call.args,
            });
            next_call += 1;
        } else if let Some(text) = part.text {
            if !text.is_empty() {
                blocks.push(ContentBlock::text(text));
            }
        }
    }

    if blocks.is_empty() {
        return Err("candidate contained no text or function calls".to_string());
    }

    Turn::new(Role::Assistant, blocks).map_err(|e| e.to_string())
}

#[async_trait]
impl ProviderAdapter for GeminiAdapter {
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
        let (system_instruction, contents) = pack_history(history);
        let request = GenerateRequest {
            system_instruction,
            contents,
            tools: pack_tools(available_tools),
            generation_config: GenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_tokens,
            },
        };

        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
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

        let decoded: GenerateResponse =
            response.json().await.map_err(|e| ProviderError::Response {
                provider: self.id.clone(),
                message: format!("undecodable body: {}", e),
            })?;

        unpack_response(decoded).map_err(|message| {
            log::error!("GeminiAdapter::call [{}]: {}", self.id, message);
            ProviderError::Response {
                provider: self.id.clone(),
                message,
            }
        })
    }
}
