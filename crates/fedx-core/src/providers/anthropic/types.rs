use serde::Serialize;
use serde_json::Value;

use crate::providers::shared::{ChatContentBlock, ChatMessage, MessageContent};
use crate::tools::ToolDefinition;

#[derive(Debug, Serialize)]
pub(crate) struct StreamingMessagesRequest<'a> {
    pub(crate) model: &'a str,
    pub(crate) max_tokens: u32,
    pub(crate) messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) tools: Option<Vec<ApiToolDef<'a>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) system: Option<&'a str>,
    pub(crate) stream: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct ApiToolDef<'a> {
    pub(crate) name: &'a str,
    pub(crate) description: &'a str,
    pub(crate) input_schema: &'a Value,
}

impl<'a> From<&'a ToolDefinition> for ApiToolDef<'a> {
    fn from(def: &'a ToolDefinition) -> Self {
        Self {
            name: &def.name,
            description: &def.description,
            input_schema: &def.input_schema,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ApiMessage {
    pub(crate) role: String,
    pub(crate) content: ApiMessageContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub(crate) enum ApiMessageContent {
    Text(String),
    Blocks(Vec<ApiContentBlock>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum ApiContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
}

impl From<&ChatMessage> for ApiMessage {
    fn from(msg: &ChatMessage) -> Self {
        let content = match &msg.content {
            MessageContent::Text(text) => ApiMessageContent::Text(text.clone()),
            MessageContent::Blocks(blocks) => ApiMessageContent::Blocks(
                blocks
                    .iter()
                    .filter_map(|block| match block {
                        // The API rejects empty text blocks.
                        ChatContentBlock::Text { text } if text.is_empty() => None,
                        ChatContentBlock::Text { text } => {
                            Some(ApiContentBlock::Text { text: text.clone() })
                        }
                        ChatContentBlock::ToolUse { id, name, input } => {
                            Some(ApiContentBlock::ToolUse {
                                id: id.clone(),
                                name: name.clone(),
                                input: input.clone(),
                            })
                        }
                        ChatContentBlock::ToolResult(result) => Some(ApiContentBlock::ToolResult {
                            tool_use_id: result.tool_use_id.clone(),
                            content: result.content.clone(),
                            is_error: result.is_error,
                        }),
                    })
                    .collect(),
            ),
        };

        ApiMessage {
            role: msg.role.clone(),
            content,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::tools::ToolResult;

    #[test]
    fn test_assistant_blocks_serialize_to_api_shape() {
        let msg = ChatMessage::assistant_blocks(vec![
            ChatContentBlock::Text {
                text: String::new(),
            },
            ChatContentBlock::Text {
                text: "Spawning a worker.".to_string(),
            },
            ChatContentBlock::ToolUse {
                id: "toolu_1".to_string(),
                name: "spawn_worker".to_string(),
                input: json!({"worker_type": "general"}),
            },
        ]);

        let value = serde_json::to_value(ApiMessage::from(&msg)).unwrap();
        assert_eq!(
            value,
            json!({
                "role": "assistant",
                "content": [
                    {"type": "text", "text": "Spawning a worker."},
                    {"type": "tool_use", "id": "toolu_1", "name": "spawn_worker", "input": {"worker_type": "general"}}
                ]
            })
        );
    }

    #[test]
    fn test_tool_result_omits_false_is_error() {
        let msg = ChatMessage::tool_results(vec![
            ToolResult::text("toolu_1", "done"),
            ToolResult {
                tool_use_id: "toolu_2".to_string(),
                content: "Error [not_found]: File not found: a.txt".to_string(),
                is_error: true,
            },
        ]);

        let value = serde_json::to_value(ApiMessage::from(&msg)).unwrap();
        assert!(value["content"][0].get("is_error").is_none());
        assert_eq!(value["content"][1]["is_error"], true);
    }
}
