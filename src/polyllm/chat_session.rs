//! Append-only conversation state.
//!
//! A [`ChatSession`] owns the ordered transcript for one conversation and
//! the id of the provider it is bound to. Turns are validated on append and
//! never mutated or removed afterwards, so the history handed to an adapter
//! is always a faithful prefix of everything that happened.

use crate::polyllm::error::MessageError;
use crate::polyllm::message::{ContentBlock, Role, Turn};

/// One conversation bound to one provider.
#[derive(Debug, Clone)]
pub struct ChatSession {
    provider_id: String,
    history: Vec<Turn>,
}

impl ChatSession {
    /// Create a session bound to `provider_id`, seeding the history with a
    /// system turn when `system_prompt` is given.
    pub fn new(provider_id: impl Into<String>, system_prompt: Option<&str>) -> Self {
        let mut history = Vec::new();
        if let Some(prompt) = system_prompt {
            history.push(Turn::system(prompt));
        }
        ChatSession {
            provider_id: provider_id.into(),
            history,
        }
    }

    pub fn provider_id(&self) -> &str {
        &self.provider_id
    }

    /// The full transcript, oldest first.
    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.history.last()
    }

    /// Append a turn, enforcing the cross-turn rules [`Turn::new`] cannot
    /// see: a system turn is only valid as the very first turn, and every
    /// tool result must reference a `call_id` emitted by a tool call in a
    /// preceding assistant turn.
    pub fn append(&mut self, turn: Turn) -> Result<(), MessageError> {
        if turn.role == Role::System && !self.history.is_empty() {
            return Err(MessageError::SystemTurnMidConversation);
        }

        if turn.role == Role::Tool {
            for block in &turn.content {
                if let ContentBlock::ToolResult { call_id, .. } = block {
                    if !self.has_tool_call(call_id) {
                        return Err(MessageError::UnmatchedToolResult {
                            call_id: call_id.clone(),
                        });
                    }
                }
            }
        }

        self.history.push(turn);
        Ok(())
    }

    fn has_tool_call(&self, wanted: &str) -> bool {
        self.history
            .iter()
            .filter(|t| t.role == Role::Assistant)
            .flat_map(|t| t.content.iter())
            .any(|block| {
                matches!(block, ContentBlock::ToolCall { call_id, .. } if call_id == wanted)
            })
    }
}
