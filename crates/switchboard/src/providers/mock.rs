//! Scripted provider for tests.
//!
//! Replies are consumed in order; once the script is exhausted the provider
//! answers with a plain "ok". Every call is recorded so tests can assert what
//! the dispatcher and handles actually sent.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use super::base::{ChatMessage, Completion, Provider, ToolCall, ToolSpec, Usage};
use super::errors::ProviderError;
use crate::model::ModelConfig;

#[derive(Debug, Clone)]
pub enum MockReply {
    Text(String),
    ToolCalls(Vec<ToolCall>),
    Failure(String),
}

impl MockReply {
    pub fn text<S: Into<String>>(text: S) -> Self {
        MockReply::Text(text.into())
    }

    /// A delegation reply: one `{"task": ...}` call per `(capability, task)` pair.
    pub fn delegations(pairs: &[(&str, &str)]) -> Self {
        let calls = pairs
            .iter()
            .enumerate()
            .map(|(index, (name, task))| {
                ToolCall::new(format!("call-{index}"), *name, json!({ "task": task }))
            })
            .collect();
        MockReply::ToolCalls(calls)
    }

    pub fn failure<S: Into<String>>(detail: S) -> Self {
        MockReply::Failure(detail.into())
    }
}

/// One recorded `complete` call.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub system: String,
    pub messages: Vec<ChatMessage>,
    pub tool_names: Vec<String>,
}

#[derive(Clone, Default)]
pub struct MockProvider {
    script: Arc<Mutex<VecDeque<MockReply>>>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl MockProvider {
    pub fn new() -> Self {
        MockProvider::default()
    }

    pub fn with_script<I: IntoIterator<Item = MockReply>>(replies: I) -> Self {
        MockProvider {
            script: Arc::new(Mutex::new(replies.into_iter().collect())),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn get_model_config(&self) -> ModelConfig {
        ModelConfig::new("mock-model")
    }

    async fn complete(
        &self,
        system: &str,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<Completion, ProviderError> {
        self.calls.lock().unwrap().push(RecordedCall {
            system: system.to_string(),
            messages: messages.to_vec(),
            tool_names: tools.iter().map(|tool| tool.name.clone()).collect(),
        });

        let reply = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| MockReply::text("ok"));

        match reply {
            MockReply::Text(text) => Ok(Completion {
                text: Some(text),
                tool_calls: Vec::new(),
                usage: Usage::default(),
            }),
            MockReply::ToolCalls(tool_calls) => Ok(Completion {
                text: None,
                tool_calls,
                usage: Usage::default(),
            }),
            MockReply::Failure(detail) => Err(ProviderError::ExecutionError(detail)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_replies_come_back_in_order_then_default() {
        let provider = MockProvider::with_script([
            MockReply::text("first"),
            MockReply::delegations(&[("github", "list PRs")]),
        ]);

        let first = provider.complete("s", &[], &[]).await.unwrap();
        assert_eq!(first.text.as_deref(), Some("first"));

        let second = provider.complete("s", &[], &[]).await.unwrap();
        assert_eq!(second.tool_calls[0].name, "github");
        assert_eq!(second.tool_calls[0].arguments["task"], "list PRs");

        let third = provider.complete("s", &[], &[]).await.unwrap();
        assert_eq!(third.text.as_deref(), Some("ok"));

        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn failures_surface_as_provider_errors() {
        let provider = MockProvider::with_script([MockReply::failure("model down")]);
        let error = provider.complete("s", &[], &[]).await.unwrap_err();
        assert!(matches!(error, ProviderError::ExecutionError(_)));
    }
}
