//! Wire types for the inference server's `/api/chat` endpoint.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::message::{Message, ToolCall};
use crate::core::options::ModelOptions;
use crate::tools::ToolDefinition;

#[derive(Serialize, Clone, Debug)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ChatToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

impl From<&Message> for ChatMessage {
    fn from(message: &Message) -> Self {
        let tool_calls = (!message.tool_calls.is_empty()).then(|| {
            message
                .tool_calls
                .iter()
                .map(ChatToolCall::from)
                .collect::<Vec<_>>()
        });

        Self {
            role: message.role.as_str().to_string(),
            content: message.content.clone(),
            tool_calls,
            tool_call_id: message.tool_call_id.clone(),
            tool_name: message.tool_name.clone(),
        }
    }
}

#[derive(Serialize, Debug)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
    pub options: &'a ModelOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ChatToolDefinition>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<&'static str>,
}

impl<'a> ChatRequest<'a> {
    pub fn new(model: &'a str, messages: &[Message], options: &'a ModelOptions, stream: bool) -> Self {
        Self {
            model,
            messages: messages.iter().map(ChatMessage::from).collect(),
            stream,
            options,
            tools: None,
            tool_choice: None,
        }
    }

    pub fn with_tools(mut self, tools: &[ToolDefinition]) -> Self {
        self.tools = Some(tools.iter().map(ChatToolDefinition::from).collect());
        self.tool_choice = Some("auto");
        self
    }
}

/// One response body, or one NDJSON record when streaming.
#[derive(Deserialize, Debug, Default)]
pub struct ChatResponse {
    #[serde(default)]
    pub message: Option<ChatResponseMessage>,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub error: Option<Value>,
}

#[derive(Deserialize, Debug, Default)]
pub struct ChatResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ChatToolCall>>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ChatToolCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub function: ChatToolCallFunction,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ChatToolCallFunction {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

impl From<&ToolCall> for ChatToolCall {
    fn from(call: &ToolCall) -> Self {
        Self {
            id: Some(call.id.clone()),
            kind: Some("function".to_string()),
            function: ChatToolCallFunction {
                name: call.name.clone(),
                arguments: call.arguments.clone(),
            },
        }
    }
}

/// Converts server tool calls, assigning `call_<index>` ids where the server
/// omitted them.
pub fn into_tool_calls(calls: Vec<ChatToolCall>) -> Vec<ToolCall> {
    calls
        .into_iter()
        .enumerate()
        .map(|(index, call)| {
            let id = call
                .id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| format!("call_{index}"));
            ToolCall::new(id, call.function.name, call.function.arguments)
        })
        .collect()
}

#[derive(Serialize, Clone, Debug)]
pub struct ChatToolDefinition {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub function: ChatToolFunction,
}

#[derive(Serialize, Clone, Debug)]
pub struct ChatToolFunction {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl From<&ToolDefinition> for ChatToolDefinition {
    fn from(tool: &ToolDefinition) -> Self {
        Self {
            kind: "function",
            function: ChatToolFunction {
                name: tool.name.clone(),
                description: tool.description.clone(),
                parameters: tool.parameters.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_carries_tools_and_choice_hint() {
        let options = ModelOptions::default();
        let tool = ToolDefinition::new(
            "word_count",
            "Count words",
            json!({"type": "object", "properties": {"text": {"type": "string"}}}),
        );
        let request = ChatRequest::new("qwen3:8b", &[Message::user("hi")], &options, false)
            .with_tools(&[tool]);

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["stream"], false);
        assert_eq!(value["tool_choice"], "auto");
        assert_eq!(value["options"]["top_p"], 0.9);
        assert_eq!(value["tools"][0]["type"], "function");
        assert_eq!(value["tools"][0]["function"]["name"], "word_count");
        assert_eq!(value["messages"][0], json!({"role": "user", "content": "hi"}));
    }

    #[test]
    fn plain_request_omits_tool_fields() {
        let options = ModelOptions::default();
        let request = ChatRequest::new("m", &[], &options, true);
        let value = serde_json::to_value(&request).unwrap();
        assert!(value.get("tools").is_none());
        assert!(value.get("tool_choice").is_none());
    }

    #[test]
    fn tool_result_messages_keep_correlation() {
        let call = ToolCall::new("call_7", "sha256_hash", json!({"text": "x"}));
        let history = [
            Message::assistant_tool_calls("", vec![call.clone()]),
            Message::tool_result(&call, "{}"),
        ];
        let options = ModelOptions::default();
        let request = ChatRequest::new("m", &history, &options, false);
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value["messages"][0]["tool_calls"][0]["id"], "call_7");
        assert_eq!(
            value["messages"][0]["tool_calls"][0]["function"]["arguments"],
            json!({"text": "x"})
        );
        assert_eq!(value["messages"][1]["tool_call_id"], "call_7");
        assert_eq!(value["messages"][1]["tool_name"], "sha256_hash");
    }

    #[test]
    fn response_tool_calls_get_generated_ids() {
        let raw = r#"{"message":{"content":"","tool_calls":[
            {"function":{"name":"add_numbers","arguments":{"numbers":[1,2]}}},
            {"id":"abc","function":{"name":"word_count","arguments":"{\"text\":\"a b\"}"}}
        ]},"done":true}"#;
        let response: ChatResponse = serde_json::from_str(raw).unwrap();
        let calls = into_tool_calls(response.message.unwrap().tool_calls.unwrap());

        assert_eq!(calls[0].id, "call_0");
        assert_eq!(calls[0].arguments, json!({"numbers": [1, 2]}));
        assert_eq!(calls[1].id, "abc");
        assert_eq!(calls[1].arguments_value().unwrap(), json!({"text": "a b"}));
    }
}
