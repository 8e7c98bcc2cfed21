use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::ProviderError;
use crate::model::ModelConfig;

/// A tool offered to the model, described in JSON-schema terms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolSpec {
    pub fn new<N: Into<String>, D: Into<String>>(name: N, description: D, parameters: Value) -> Self {
        ToolSpec {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// A tool invocation the model asked for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

impl ToolCall {
    pub fn new<I: Into<String>, N: Into<String>>(id: I, name: N, arguments: Value) -> Self {
        ToolCall {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// One entry in the transcript sent to a provider. Dispatch converts stored
/// turns into `User`/`Assistant` entries and feeds delegate outputs back as
/// `ToolResult`s between rounds.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatMessage {
    User(String),
    Assistant {
        text: Option<String>,
        tool_calls: Vec<ToolCall>,
    },
    ToolResult {
        call_id: String,
        output: String,
        is_error: bool,
    },
}

impl ChatMessage {
    pub fn user<S: Into<String>>(text: S) -> Self {
        ChatMessage::User(text.into())
    }

    pub fn assistant<S: Into<String>>(text: S) -> Self {
        ChatMessage::Assistant {
            text: Some(text.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn tool_result<I: Into<String>, S: Into<String>>(call_id: I, output: S) -> Self {
        ChatMessage::ToolResult {
            call_id: call_id.into(),
            output: output.into(),
            is_error: false,
        }
    }

    pub fn tool_error<I: Into<String>, S: Into<String>>(call_id: I, output: S) -> Self {
        ChatMessage::ToolResult {
            call_id: call_id.into(),
            output: output.into(),
            is_error: true,
        }
    }
}

/// Token accounting reported by a provider, when available.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: Option<i32>,
    pub output_tokens: Option<i32>,
    pub total_tokens: Option<i32>,
}

impl Usage {
    pub fn new(
        input_tokens: Option<i32>,
        output_tokens: Option<i32>,
        total_tokens: Option<i32>,
    ) -> Self {
        Usage {
            input_tokens,
            output_tokens,
            total_tokens,
        }
    }
}

/// One model reply: text, requested tool calls, or both.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Usage,
}

impl Completion {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Final text of a reply, empty when the model produced none.
    pub fn text_or_empty(&self) -> String {
        self.text.clone().unwrap_or_default()
    }
}

/// The opaque reasoning capability: routing decisions, specialist task work,
/// and final composition all go through this seam.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    fn get_model_config(&self) -> ModelConfig;

    async fn complete(
        &self,
        system: &str,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<Completion, ProviderError>;
}
