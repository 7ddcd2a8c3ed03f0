//! Assembly of one assistant turn from a completion stream.
//!
//! Text deltas are concatenated, tool-argument fragments are concatenated
//! per content-block index, and each tool call's arguments are parsed once
//! its stream is exhausted.

use anyhow::Result;
use futures_util::StreamExt;
use serde_json::Value;
use tracing::{debug, warn};

use crate::providers::{
    ChatContentBlock, ChatMessage, ContentBlockType, ProviderError, ProviderStream, StreamEvent,
};

/// Tool call whose JSON arguments are still streaming.
#[derive(Debug, Clone)]
pub struct ToolUseBuilder {
    pub index: usize,
    pub id: String,
    pub name: String,
    pub input_json: String,
}

impl ToolUseBuilder {
    /// Parses the accumulated arguments.
    ///
    /// Empty, malformed or non-object JSON becomes an empty object; the call
    /// still goes out so the handler can report the missing fields.
    pub fn finalize(self) -> ToolUse {
        let input = if self.input_json.trim().is_empty() {
            Value::Object(serde_json::Map::new())
        } else {
            match serde_json::from_str::<Value>(&self.input_json) {
                Ok(value @ Value::Object(_)) => value,
                Ok(other) => {
                    warn!(
                        tool = %self.name,
                        arguments = %other,
                        "Tool arguments are not an object; substituting empty object"
                    );
                    Value::Object(serde_json::Map::new())
                }
                Err(e) => {
                    warn!(
                        tool = %self.name,
                        error = %e,
                        "Malformed tool arguments; substituting empty object"
                    );
                    Value::Object(serde_json::Map::new())
                }
            }
        };

        ToolUse {
            id: self.id,
            name: self.name,
            input,
        }
    }
}

/// Tool call with parsed input.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolUse {
    pub id: String,
    pub name: String,
    pub input: Value,
}

#[derive(Debug, Default)]
pub struct AssistantTurnBuilder {
    pub text: String,
    pub tool_uses: Vec<ToolUseBuilder>,
    pub stop_reason: Option<String>,
}

impl AssistantTurnBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find_tool_use_mut(&mut self, index: usize) -> Option<&mut ToolUseBuilder> {
        self.tool_uses.iter_mut().find(|t| t.index == index)
    }

    /// Applies one stream event. Returns the text delta, if any.
    ///
    /// # Errors
    /// Returns a [`ProviderError`] for an in-stream error event.
    pub fn apply(&mut self, event: StreamEvent) -> Result<Option<String>, ProviderError> {
        match event {
            StreamEvent::TextDelta { text, .. } if !text.is_empty() => {
                self.text.push_str(&text);
                return Ok(Some(text));
            }
            StreamEvent::ContentBlockStart {
                index,
                block_type: ContentBlockType::ToolUse,
                id,
                name,
            } => {
                self.tool_uses.push(ToolUseBuilder {
                    index,
                    id: id.unwrap_or_default(),
                    name: name.unwrap_or_default(),
                    input_json: String::new(),
                });
            }
            StreamEvent::InputJsonDelta {
                index,
                partial_json,
            } => {
                if let Some(tu) = self.find_tool_use_mut(index) {
                    tu.input_json.push_str(&partial_json);
                } else {
                    debug!(index, "Argument fragment for unknown block; ignoring");
                }
            }
            StreamEvent::MessageDelta { stop_reason, usage } => {
                if stop_reason.is_some() {
                    self.stop_reason = stop_reason;
                }
                if let Some(usage) = usage {
                    debug!(output_tokens = usage.output_tokens, "Turn usage");
                }
            }
            StreamEvent::Error {
                error_type,
                message,
            } => return Err(ProviderError::api_error(&error_type, &message)),
            _ => {}
        }
        Ok(None)
    }

    /// Finalizes every tool call in stream order.
    pub fn finish(self) -> AssistantTurn {
        AssistantTurn {
            text: self.text,
            tool_uses: self
                .tool_uses
                .into_iter()
                .map(ToolUseBuilder::finalize)
                .collect(),
            stop_reason: self.stop_reason,
        }
    }
}

/// A fully received assistant turn.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssistantTurn {
    pub text: String,
    pub tool_uses: Vec<ToolUse>,
    pub stop_reason: Option<String>,
}

impl AssistantTurn {
    pub fn has_tool_uses(&self) -> bool {
        !self.tool_uses.is_empty()
    }

    /// Transcript entry for this turn: text first, then tool calls.
    ///
    /// `None` for a turn with neither; the API rejects empty assistant content.
    pub fn to_message(&self) -> Option<ChatMessage> {
        if self.text.is_empty() && self.tool_uses.is_empty() {
            return None;
        }
        let mut blocks = Vec::with_capacity(1 + self.tool_uses.len());
        if !self.text.is_empty() {
            blocks.push(ChatContentBlock::Text {
                text: self.text.clone(),
            });
        }
        for tu in &self.tool_uses {
            blocks.push(ChatContentBlock::ToolUse {
                id: tu.id.clone(),
                name: tu.name.clone(),
                input: tu.input.clone(),
            });
        }
        Some(ChatMessage::assistant_blocks(blocks))
    }
}

/// Drains `stream` into an [`AssistantTurn`], calling `on_text` for every
/// text delta as it arrives.
///
/// # Errors
/// Returns the first transport, parse or in-stream API error.
pub async fn consume_stream<F>(mut stream: ProviderStream, mut on_text: F) -> Result<AssistantTurn>
where
    F: FnMut(&str),
{
    let mut builder = AssistantTurnBuilder::new();
    while let Some(event) = stream.next().await {
        let event = event.map_err(anyhow::Error::new)?;
        if let Some(text) = builder.apply(event)? {
            on_text(&text);
        }
    }
    Ok(builder.finish())
}
