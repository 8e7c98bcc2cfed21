//! OpenAI-compatible chat-completions wire format.
//!
//! Shapes [`ChatMessage`] transcripts and [`ToolSpec`]s into request payloads and
//! turns response JSON back into a [`Completion`]. Only the subset this service
//! exchanges is handled: text content and function-style tool calls.

use serde_json::{json, Value};
use tracing::warn;

use super::base::{ChatMessage, Completion, ToolCall, ToolSpec, Usage};
use super::errors::ProviderError;
use crate::model::ModelConfig;

pub fn format_messages(messages: &[ChatMessage]) -> Vec<Value> {
    let mut spec = Vec::with_capacity(messages.len());

    for message in messages {
        match message {
            ChatMessage::User(text) => {
                spec.push(json!({ "role": "user", "content": text }));
            }
            ChatMessage::Assistant { text, tool_calls } => {
                let mut converted = json!({ "role": "assistant" });
                if let Some(text) = text {
                    converted["content"] = json!(text);
                }
                if !tool_calls.is_empty() {
                    let calls: Vec<Value> = tool_calls
                        .iter()
                        .map(|call| {
                            json!({
                                "id": call.id,
                                "type": "function",
                                "function": {
                                    "name": call.name,
                                    "arguments": call.arguments.to_string(),
                                }
                            })
                        })
                        .collect();
                    converted["tool_calls"] = json!(calls);
                }
                spec.push(converted);
            }
            ChatMessage::ToolResult {
                call_id,
                output,
                is_error,
            } => {
                let content = if *is_error {
                    format!("Error: {output}")
                } else {
                    output.clone()
                };
                spec.push(json!({
                    "role": "tool",
                    "tool_call_id": call_id,
                    "content": content,
                }));
            }
        }
    }

    spec
}

pub fn format_tools(tools: &[ToolSpec]) -> Vec<Value> {
    tools
        .iter()
        .map(|tool| {
            let mut description = tool.description.clone();
            // OpenAI caps tool descriptions at 1024 characters
            description.truncate(1024);
            json!({
                "type": "function",
                "function": {
                    "name": tool.name,
                    "description": description,
                    "parameters": tool.parameters,
                }
            })
        })
        .collect()
}

pub fn create_request(
    model_config: &ModelConfig,
    system: &str,
    messages: &[ChatMessage],
    tools: &[ToolSpec],
) -> Value {
    let mut messages_array = vec![json!({ "role": "system", "content": system })];
    messages_array.extend(format_messages(messages));

    let mut payload = json!({
        "model": model_config.model_name,
        "messages": messages_array,
    });

    if let Some(temperature) = model_config.temperature {
        payload["temperature"] = json!(temperature);
    }
    if let Some(max_tokens) = model_config.max_tokens {
        payload["max_tokens"] = json!(max_tokens);
    }
    if !tools.is_empty() {
        payload["tools"] = json!(format_tools(tools));
    }

    payload
}

pub fn response_to_completion(response: &Value) -> Result<Completion, ProviderError> {
    let message = response
        .pointer("/choices/0/message")
        .ok_or_else(|| ProviderError::ResponseParse("response has no choices".to_string()))?;

    let text = message
        .get("content")
        .and_then(|content| content.as_str())
        .filter(|content| !content.is_empty())
        .map(str::to_string);

    let mut tool_calls = Vec::new();
    if let Some(calls) = message.get("tool_calls").and_then(|calls| calls.as_array()) {
        for call in calls {
            let id = call["id"].as_str().unwrap_or_default().to_string();
            let name = call["function"]["name"]
                .as_str()
                .unwrap_or_default()
                .to_string();
            let raw_arguments = call["function"]["arguments"].as_str().unwrap_or_default();
            let arguments = match serde_json::from_str::<Value>(raw_arguments) {
                Ok(value) => value,
                Err(error) => {
                    // A malformed call becomes an unusable delegation, not a
                    // failed response; the caller reports it back to the model.
                    warn!(call_id = %id, %error, "tool call carried unparseable arguments");
                    Value::Null
                }
            };
            tool_calls.push(ToolCall::new(id, name, arguments));
        }
    }

    Ok(Completion {
        text,
        tool_calls,
        usage: get_usage(response),
    })
}

pub fn get_usage(response: &Value) -> Usage {
    let Some(usage) = response.get("usage") else {
        return Usage::default();
    };

    let read = |key: &str| usage.get(key).and_then(|value| value.as_i64()).map(|v| v as i32);
    let input_tokens = read("prompt_tokens");
    let output_tokens = read("completion_tokens");
    let total_tokens = read("total_tokens").or_else(|| match (input_tokens, output_tokens) {
        (Some(input), Some(output)) => Some(input + output),
        _ => None,
    });

    Usage::new(input_tokens, output_tokens, total_tokens)
}
