//! Dispatcher: turns one natural-language request into one reply.
//!
//! A request runs through a short pipeline: greeting fast path, then rounds
//! of provider reasoning where the provider may delegate sub-tasks to running
//! capabilities, then a final composed answer. Delegate failures are fed back
//! into the reasoning loop as partial results; only a failure of the
//! reasoning provider itself fails the whole dispatch.

pub mod fast_reply;
pub mod routing;

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::capability::{CapabilityRegistry, CapabilityStatus, InvokeError};
use crate::conversation::Turn;
use crate::providers::{ChatMessage, Provider, ProviderError, ToolCall};

/// User-safe text returned whenever dispatch fails outright. The real cause
/// stays in the logs and in `DispatchOutcome::Failed`.
pub const APOLOGY: &str = "Sorry, I encountered an error processing your request.";

/// One request to dispatch, with whatever session history the caller wants
/// the reasoning step to see.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub request_id: String,
    pub requester: String,
    pub query: String,
    pub history: Vec<Turn>,
}

impl DispatchRequest {
    pub fn new<I, R, Q>(request_id: I, requester: R, query: Q) -> Self
    where
        I: Into<String>,
        R: Into<String>,
        Q: Into<String>,
    {
        DispatchRequest {
            request_id: request_id.into(),
            requester: requester.into(),
            query: query.into(),
            history: Vec::new(),
        }
    }

    pub fn with_history(mut self, history: Vec<Turn>) -> Self {
        self.history = history;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The composed reply text for the requester.
    Replied(String),
    /// Dispatch could not produce a reply; `detail` is for logs, not users.
    Failed { detail: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchResult {
    pub outcome: DispatchOutcome,
    /// Capabilities that actually ran a delegated task, for observability.
    pub invoked: BTreeSet<String>,
    /// True when the greeting fast path answered without any reasoning.
    pub quick: bool,
}

impl DispatchResult {
    fn replied(text: String, invoked: BTreeSet<String>) -> Self {
        DispatchResult {
            outcome: DispatchOutcome::Replied(text),
            invoked,
            quick: false,
        }
    }

    fn quick_replied(text: String) -> Self {
        DispatchResult {
            outcome: DispatchOutcome::Replied(text),
            invoked: BTreeSet::new(),
            quick: true,
        }
    }

    fn failed(detail: String, invoked: BTreeSet<String>) -> Self {
        DispatchResult {
            outcome: DispatchOutcome::Failed { detail },
            invoked,
            quick: false,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, DispatchOutcome::Failed { .. })
    }

    /// What the requester should see: the reply, or the fixed apology.
    pub fn user_text(&self) -> &str {
        match &self.outcome {
            DispatchOutcome::Replied(text) => text,
            DispatchOutcome::Failed { .. } => APOLOGY,
        }
    }
}

pub struct Dispatcher {
    provider: Arc<dyn Provider>,
    registry: Arc<CapabilityRegistry>,
    max_rounds: usize,
}

impl Dispatcher {
    pub fn new(
        provider: Arc<dyn Provider>,
        registry: Arc<CapabilityRegistry>,
        max_rounds: usize,
    ) -> Self {
        Dispatcher {
            provider,
            registry,
            max_rounds,
        }
    }

    /// Run one request to completion. Never returns an error to the caller;
    /// anything unrecoverable becomes a failure-shaped result.
    #[instrument(skip(self, request, cancel_token), fields(request_id = %request.request_id, requester = %request.requester))]
    pub async fn dispatch(
        &self,
        request: DispatchRequest,
        cancel_token: CancellationToken,
    ) -> DispatchResult {
        if let Some(text) = fast_reply::check(&request.query, &request.requester) {
            debug!("greeting fast path");
            return DispatchResult::quick_replied(text);
        }

        let mut invoked = BTreeSet::new();
        match self.run_rounds(&request, &cancel_token, &mut invoked).await {
            Ok(text) => {
                info!(invoked = invoked.len(), "dispatch complete");
                DispatchResult::replied(text, invoked)
            }
            Err(error) => {
                error!(error = %error, "dispatch failed");
                DispatchResult::failed(error.to_string(), invoked)
            }
        }
    }

    async fn run_rounds(
        &self,
        request: &DispatchRequest,
        cancel_token: &CancellationToken,
        invoked: &mut BTreeSet<String>,
    ) -> Result<String, ProviderError> {
        let available = self.running_capabilities().await;
        let tools = routing::delegation_tools(&available);
        let system = routing::system_prompt(&available);
        let mut messages = routing::initial_messages(&request.history, &request.query);

        for round in 0..self.max_rounds {
            let completion = self.provider.complete(&system, &messages, &tools).await?;

            if !completion.has_tool_calls() {
                return Ok(completion.text_or_empty());
            }

            info!(
                round,
                delegations = completion.tool_calls.len(),
                "fanning out to capabilities"
            );
            messages.push(ChatMessage::Assistant {
                text: completion.text.clone(),
                tool_calls: completion.tool_calls.clone(),
            });
            let feedback = self
                .invoke_delegates(&completion.tool_calls, cancel_token, invoked)
                .await;
            messages.extend(feedback);
        }

        // Round cap reached; compose the final answer without tools.
        debug!(max_rounds = self.max_rounds, "round cap hit, composing");
        let completion = self.provider.complete(&system, &messages, &[]).await?;
        Ok(completion.text_or_empty())
    }

    /// Run every delegation of one round concurrently and fold the outcomes
    /// back into transcript messages. A delegate failing or being unavailable
    /// becomes feedback for the next reasoning round, never an abort.
    async fn invoke_delegates(
        &self,
        calls: &[ToolCall],
        cancel_token: &CancellationToken,
        invoked: &mut BTreeSet<String>,
    ) -> Vec<ChatMessage> {
        let futures: Vec<_> = calls
            .iter()
            .map(|call| async move {
                let Some(task) = routing::task_text(&call.arguments) else {
                    return (call, false, Err("missing task argument".to_string()));
                };
                match self.registry.get(&call.name) {
                    Some(handle) => {
                        // Specialists get only the subtask text, not the
                        // conversation history.
                        let result = handle
                            .invoke(&task, None, cancel_token.child_token())
                            .await;
                        let engaged = !matches!(result, Err(InvokeError::Unavailable));
                        (call, engaged, result.map_err(|e| e.to_string()))
                    }
                    None => (call, false, Err(InvokeError::Unavailable.to_string())),
                }
            })
            .collect();

        let results = futures::future::join_all(futures).await;

        let mut feedback = Vec::with_capacity(results.len());
        for (call, engaged, result) in results {
            if engaged {
                invoked.insert(call.name.clone());
            }
            match result {
                Ok(output) => feedback.push(ChatMessage::tool_result(&call.id, output)),
                Err(detail) => {
                    warn!(capability = %call.name, error = %detail, "delegation failed");
                    feedback.push(ChatMessage::tool_error(&call.id, detail));
                }
            }
        }
        feedback
    }

    /// Names and descriptions of capabilities currently running, sorted so
    /// tool order and prompts are stable.
    async fn running_capabilities(&self) -> Vec<(String, String)> {
        let mut available = Vec::new();
        for handle in self.registry.iter() {
            if handle.status().await == CapabilityStatus::Running {
                available.push((handle.name().to_string(), handle.description().to_string()));
            }
        }
        available.sort();
        available
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::test_support::FakeConnection;
    use crate::capability::{CapabilityDescriptor, CapabilityHandle};
    use crate::providers::mock::{MockProvider, MockReply};
    use std::collections::HashMap;
    use std::time::Duration;

    fn descriptor(name: &str) -> CapabilityDescriptor {
        CapabilityDescriptor {
            name: name.to_string(),
            description: format!("Handles {name} requests"),
            command: "switchboard-no-such-binary".to_string(),
            args: Vec::new(),
            env: HashMap::new(),
        }
    }

    /// A running capability whose specialist answers from its own script.
    fn running_capability(name: &str, replies: Vec<MockReply>) -> CapabilityHandle {
        CapabilityHandle::with_connection(
            descriptor(name),
            Arc::new(MockProvider::with_script(replies)),
            Duration::from_secs(5),
            Arc::new(FakeConnection::new(&[name])),
        )
    }

    /// A registered capability that was never started.
    fn stopped_capability(name: &str) -> CapabilityHandle {
        CapabilityHandle::new(
            descriptor(name),
            Arc::new(MockProvider::new()),
            Duration::from_secs(5),
        )
    }

    fn dispatcher(
        provider: &MockProvider,
        handles: Vec<CapabilityHandle>,
    ) -> Dispatcher {
        Dispatcher::new(
            Arc::new(provider.clone()),
            Arc::new(CapabilityRegistry::from_handles(handles)),
            4,
        )
    }

    fn request(query: &str) -> DispatchRequest {
        DispatchRequest::new("req-1", "user123", query)
    }

    #[tokio::test]
    async fn greeting_short_circuits_everything() {
        let provider = MockProvider::new();
        let dispatcher = dispatcher(&provider, vec![]);

        let result = dispatcher
            .dispatch(request("hi"), CancellationToken::new())
            .await;

        assert_eq!(
            result.outcome,
            DispatchOutcome::Replied("Hello there <@user123>!".to_string())
        );
        assert!(result.invoked.is_empty());
        assert!(result.quick);
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn direct_answer_without_delegation() {
        let provider = MockProvider::with_script([MockReply::text("It deployed fine.")]);
        let dispatcher = dispatcher(
            &provider,
            vec![running_capability("github", vec![])],
        );

        let result = dispatcher
            .dispatch(request("did the deploy work?"), CancellationToken::new())
            .await;

        assert_eq!(result.user_text(), "It deployed fine.");
        assert!(result.invoked.is_empty());
        assert!(!result.quick);

        // The routing round offered the running capability as a tool.
        let recorded = provider.calls();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].tool_names, vec!["github"]);
    }

    #[tokio::test]
    async fn single_delegation_flows_into_the_final_answer() {
        let provider = MockProvider::with_script([
            MockReply::delegations(&[("github", "find the latest PRs")]),
            MockReply::text("The latest PRs are #12 and #13."),
        ]);
        let dispatcher = dispatcher(
            &provider,
            vec![running_capability(
                "github",
                vec![MockReply::text("found PRs #12 and #13")],
            )],
        );

        let result = dispatcher
            .dispatch(request("find the latest PRs on repo X"), CancellationToken::new())
            .await;

        assert_eq!(result.user_text(), "The latest PRs are #12 and #13.");
        assert_eq!(
            result.invoked,
            BTreeSet::from(["github".to_string()])
        );

        // Composition saw the specialist's output as a tool result.
        let recorded = provider.calls();
        assert_eq!(recorded.len(), 2);
        assert!(recorded[1].messages.iter().any(|message| matches!(
            message,
            ChatMessage::ToolResult { is_error: false, output, .. } if output.contains("#12")
        )));
    }

    #[tokio::test]
    async fn parallel_delegations_all_run_and_all_report() {
        let provider = MockProvider::with_script([
            MockReply::delegations(&[
                ("github", "list open PRs"),
                ("search", "find release notes"),
            ]),
            MockReply::text("PRs and notes gathered."),
        ]);
        let dispatcher = dispatcher(
            &provider,
            vec![
                running_capability("github", vec![MockReply::text("two PRs open")]),
                running_capability("search", vec![MockReply::text("notes found")]),
            ],
        );

        let result = dispatcher
            .dispatch(request("gather release info"), CancellationToken::new())
            .await;

        assert_eq!(result.user_text(), "PRs and notes gathered.");
        assert_eq!(
            result.invoked,
            BTreeSet::from(["github".to_string(), "search".to_string()])
        );

        let recorded = provider.calls();
        let tool_results = recorded[1]
            .messages
            .iter()
            .filter(|message| matches!(message, ChatMessage::ToolResult { .. }))
            .count();
        assert_eq!(tool_results, 2);
    }

    #[tokio::test]
    async fn one_failed_delegate_still_yields_a_reply() {
        let provider = MockProvider::with_script([
            MockReply::delegations(&[("github", "list PRs"), ("search", "find docs")]),
            MockReply::text("Got the PRs; search is unavailable right now."),
        ]);
        let dispatcher = dispatcher(
            &provider,
            vec![
                running_capability("github", vec![MockReply::text("PRs listed")]),
                running_capability("search", vec![MockReply::failure("model down")]),
            ],
        );

        let result = dispatcher
            .dispatch(request("gather release info"), CancellationToken::new())
            .await;

        assert!(!result.is_failure());
        assert_eq!(
            result.invoked,
            BTreeSet::from(["github".to_string(), "search".to_string()])
        );

        // One success and one failure note went back to composition.
        let recorded = provider.calls();
        assert!(recorded[1].messages.iter().any(|message| matches!(
            message,
            ChatMessage::ToolResult { is_error: true, .. }
        )));
        assert!(recorded[1].messages.iter().any(|message| matches!(
            message,
            ChatMessage::ToolResult { is_error: false, .. }
        )));
    }

    #[tokio::test]
    async fn stopped_capabilities_are_not_offered_and_count_as_unavailable() {
        let provider = MockProvider::with_script([
            MockReply::delegations(&[("code-host", "list PRs")]),
            MockReply::text("I could not reach the code host."),
        ]);
        let dispatcher = dispatcher(&provider, vec![stopped_capability("code-host")]);

        let result = dispatcher
            .dispatch(request("find the latest PRs"), CancellationToken::new())
            .await;

        assert!(!result.is_failure());
        assert!(result.invoked.is_empty());

        let recorded = provider.calls();
        // Not running, so not offered as a tool.
        assert!(recorded[0].tool_names.is_empty());
        // The forced delegation came back as an unavailability note.
        assert!(recorded[1].messages.iter().any(|message| matches!(
            message,
            ChatMessage::ToolResult { is_error: true, .. }
        )));
    }

    #[tokio::test]
    async fn unknown_capability_names_become_failure_notes() {
        let provider = MockProvider::with_script([
            MockReply::delegations(&[("ghost", "haunt")]),
            MockReply::text("No such helper here."),
        ]);
        let dispatcher = dispatcher(&provider, vec![]);

        let result = dispatcher
            .dispatch(request("ask the ghost"), CancellationToken::new())
            .await;

        assert_eq!(result.user_text(), "No such helper here.");
        assert!(result.invoked.is_empty());
    }

    #[tokio::test]
    async fn provider_failure_is_a_failure_shaped_result() {
        let provider = MockProvider::with_script([MockReply::failure("rate limited")]);
        let dispatcher = dispatcher(&provider, vec![]);

        let result = dispatcher
            .dispatch(request("anything"), CancellationToken::new())
            .await;

        assert!(result.is_failure());
        assert_eq!(result.user_text(), APOLOGY);
        assert!(matches!(
            &result.outcome,
            DispatchOutcome::Failed { detail } if detail.contains("rate limited")
        ));
    }

    #[tokio::test]
    async fn round_cap_forces_composition() {
        let provider = MockProvider::with_script([
            MockReply::delegations(&[("github", "step 1")]),
            MockReply::delegations(&[("github", "step 2")]),
            MockReply::delegations(&[("github", "step 3")]),
            MockReply::delegations(&[("github", "step 4")]),
            // Would keep delegating, but the cap cuts it off.
            MockReply::text("Best effort after four rounds."),
        ]);
        let dispatcher = dispatcher(
            &provider,
            vec![running_capability(
                "github",
                vec![
                    MockReply::text("done 1"),
                    MockReply::text("done 2"),
                    MockReply::text("done 3"),
                    MockReply::text("done 4"),
                ],
            )],
        );

        let result = dispatcher
            .dispatch(request("do a long thing"), CancellationToken::new())
            .await;

        assert_eq!(result.user_text(), "Best effort after four rounds.");
        let recorded = provider.calls();
        assert_eq!(recorded.len(), 5);
        // The composition call had its tools taken away.
        assert!(recorded.last().unwrap().tool_names.is_empty());
    }

    #[tokio::test]
    async fn empty_query_still_routes_normally() {
        let provider = MockProvider::with_script([MockReply::text("What can I help with?")]);
        let dispatcher = dispatcher(&provider, vec![]);

        let result = dispatcher
            .dispatch(request(""), CancellationToken::new())
            .await;

        assert_eq!(result.user_text(), "What can I help with?");
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn history_is_presented_to_the_reasoning_round() {
        let provider = MockProvider::with_script([MockReply::text("As I said, yes.")]);
        let dispatcher = dispatcher(&provider, vec![]);

        let result = dispatcher
            .dispatch(
                request("is that still true?").with_history(vec![
                    Turn::human("is the deploy green?"),
                    Turn::assistant("Yes, all checks passed."),
                ]),
                CancellationToken::new(),
            )
            .await;

        assert_eq!(result.user_text(), "As I said, yes.");
        let recorded = provider.calls();
        assert_eq!(recorded[0].messages.len(), 3);
        assert_eq!(
            recorded[0].messages[1],
            ChatMessage::assistant("Yes, all checks passed.")
        );
    }
}
