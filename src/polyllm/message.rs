//! Provider-neutral conversation model.
//!
//! Every adapter translates to and from the types in this module, so callers
//! write business logic once and never see a provider's native wire shapes.
//! A conversation is an ordered sequence of [`Turn`]s; each turn carries an
//! ordered sequence of [`ContentBlock`]s.
//!
//! # Example
//!
//! ```rust
//! use polyllm::message::{ContentBlock, Role, Turn};
//!
//! let turn = Turn::user_text("Was bedeutet 'Fernweh'?");
//! assert_eq!(turn.role, Role::User);
//! assert_eq!(turn.text(), "Was bedeutet 'Fernweh'?");
//!
//! let invalid = Turn::new(Role::Tool, vec![ContentBlock::text("not a tool result")]);
//! assert!(invalid.is_err());
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::polyllm::error::MessageError;

/// Conversation roles understood by every adapter.
///
/// Providers without a native equivalent for a role synthesize one during
/// packing (e.g. Gemini folds `Tool` results into a user-role content).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Set by the developer to steer the model's responses.
    System,
    /// A message sent by a human user (or app user).
    User,
    /// Content generated by the model.
    Assistant,
    /// Results of host-executed tool calls, fed back to the model.
    Tool,
}

/// Payload of an [`ContentBlock::Image`] block: raw bytes or a fetchable URL.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageData {
    Bytes(Vec<u8>),
    Url(String),
}

/// One unit of content inside a [`Turn`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain text.
    Text { text: String },
    /// An image attachment. Adapters that lack vision support never see
    /// these; the router downgrades them to text placeholders first.
    Image { mime_type: String, data: ImageData },
    /// The model asking the host to invoke a registered tool.
    ///
    /// `arguments` preserves the key order the provider emitted. `call_id`
    /// is provider-supplied where available (OpenAI) and synthesized
    /// deterministically otherwise (`call_N` in part order).
    ToolCall {
        call_id: String,
        tool_name: String,
        arguments: serde_json::Map<String, JsonValue>,
    },
    /// The host-side outcome of one tool call, correlated by `call_id`.
    ///
    /// Failures travel here as data with `is_error` set; they are never
    /// surfaced to the router as errors.
    ToolResult {
        call_id: String,
        tool_name: String,
        result: JsonValue,
        is_error: bool,
    },
}

impl ContentBlock {
    /// Shorthand for a text block.
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }

    pub fn is_tool_call(&self) -> bool {
        matches!(self, ContentBlock::ToolCall { .. })
    }

    pub fn is_tool_result(&self) -> bool {
        matches!(self, ContentBlock::ToolResult { .. })
    }
}

/// One conversation turn: a role plus its ordered content blocks.
///
/// Invariants enforced at construction:
/// - `content` is never empty;
/// - a `Tool` turn contains only [`ContentBlock::ToolResult`] blocks;
/// - `ToolResult` blocks never mix with other block kinds in one turn;
/// - `System` turns are text-only, and only `Assistant` turns carry
///   [`ContentBlock::ToolCall`] blocks.
///
/// The cross-turn invariant (every tool result references a `call_id` from a
/// preceding assistant turn) needs history context and is enforced by
/// [`ChatSession`](crate::polyllm::chat_session::ChatSession) on append.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl Turn {
    /// Validating constructor; the only way to build a turn from raw blocks.
    pub fn new(role: Role, content: Vec<ContentBlock>) -> Result<Self, MessageError> {
        if content.is_empty() {
            return Err(MessageError::EmptyContent { role });
        }

        let has_result = content.iter().any(ContentBlock::is_tool_result);
        let all_results = content.iter().all(ContentBlock::is_tool_result);
        if has_result && !all_results {
            return Err(MessageError::MixedToolResults);
        }

        match role {
            Role::Tool => {
                if !all_results {
                    return Err(MessageError::NonResultInToolTurn);
                }
            }
            Role::System => {
                if !content
                    .iter()
                    .any(|b| matches!(b, ContentBlock::Text { .. }))
                    || content
                        .iter()
                        .any(|b| !matches!(b, ContentBlock::Text { .. }))
                {
                    return Err(MessageError::InvalidBlockForRole { role });
                }
            }
            Role::User => {
                if content.iter().any(|b| b.is_tool_call() || b.is_tool_result()) {
                    return Err(MessageError::InvalidBlockForRole { role });
                }
            }
            Role::Assistant => {
                if has_result {
                    return Err(MessageError::InvalidBlockForRole { role });
                }
            }
        }

        Ok(Turn { role, content })
    }

    /// Build a system turn from a prompt string.
    pub fn system(prompt: impl Into<String>) -> Self {
        Turn {
            role: Role::System,
            content: vec![ContentBlock::text(prompt)],
        }
    }

    /// Build a text-only user turn.
    pub fn user_text(text: impl Into<String>) -> Self {
        Turn {
            role: Role::User,
            content: vec![ContentBlock::text(text)],
        }
    }

    /// Build a user turn carrying text plus an image attachment.
    pub fn user_with_image(
        text: impl Into<String>,
        mime_type: impl Into<String>,
        data: ImageData,
    ) -> Self {
        Turn {
            role: Role::User,
            content: vec![
                ContentBlock::text(text),
                ContentBlock::Image {
                    mime_type: mime_type.into(),
                    data,
                },
            ],
        }
    }

    /// Build a text-only assistant turn.
    pub fn assistant_text(text: impl Into<String>) -> Self {
        Turn {
            role: Role::Assistant,
            content: vec![ContentBlock::text(text)],
        }
    }

    /// Build a tool turn from result blocks.
    ///
    /// Returns an error when `results` is empty or contains non-result
    /// blocks, same rules as [`Turn::new`].
    pub fn tool_results(results: Vec<ContentBlock>) -> Result<Self, MessageError> {
        Turn::new(Role::Tool, results)
    }

    /// Concatenated text of every [`ContentBlock::Text`] block in this turn.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for block in &self.content {
            if let ContentBlock::Text { text } = block {
                out.push_str(text);
            }
        }
        out
    }

    /// Borrow the tool-call blocks of this turn, in emission order.
    pub fn tool_calls(&self) -> Vec<&ContentBlock> {
        self.content.iter().filter(|b| b.is_tool_call()).collect()
    }

    /// Whether this turn requests at least one tool invocation.
    pub fn has_tool_calls(&self) -> bool {
        self.content.iter().any(ContentBlock::is_tool_call)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call_block(id: &str) -> ContentBlock {
        ContentBlock::ToolCall {
            call_id: id.to_string(),
            tool_name: "lookup".to_string(),
            arguments: serde_json::Map::new(),
        }
    }

    fn result_block(id: &str) -> ContentBlock {
        ContentBlock::ToolResult {
            call_id: id.to_string(),
            tool_name: "lookup".to_string(),
            result: json!("ok"),
            is_error: false,
        }
    }

    #[test]
    fn empty_content_is_rejected() {
        let err = Turn::new(Role::User, vec![]).unwrap_err();
        assert!(matches!(err, MessageError::EmptyContent { role: Role::User }));
    }

    #[test]
    fn tool_turn_accepts_only_results() {
        assert!(Turn::new(Role::Tool, vec![result_block("call_0")]).is_ok());
        assert!(Turn::new(Role::Tool, vec![ContentBlock::text("hi")]).is_err());
    }

    #[test]
    fn results_never_mix_with_other_blocks() {
        let err = Turn::new(
            Role::Tool,
            vec![result_block("call_0"), ContentBlock::text("extra")],
        )
        .unwrap_err();
        assert!(matches!(err, MessageError::MixedToolResults));
    }

    #[test]
    fn assistant_may_mix_text_and_tool_calls() {
        let turn = Turn::new(
            Role::Assistant,
            vec![ContentBlock::text("let me check"), call_block("call_0")],
        )
        .unwrap();
        assert!(turn.has_tool_calls());
        assert_eq!(turn.tool_calls().len(), 1);
        assert_eq!(turn.text(), "let me check");
    }

    #[test]
    fn user_turn_rejects_tool_blocks() {
        assert!(Turn::new(Role::User, vec![call_block("call_0")]).is_err());
        assert!(Turn::new(Role::System, vec![call_block("call_0")]).is_err());
    }

    #[test]
    fn text_concatenates_in_order() {
        let turn = Turn::new(
            Role::Assistant,
            vec![ContentBlock::text("a"), ContentBlock::text("b")],
        )
        .unwrap();
        assert_eq!(turn.text(), "ab");
    }
}
