//! Lifecycle and task execution for a single capability.
//!
//! A handle owns the child MCP server for one capability and runs delegated
//! tasks against it: list the server's tools, let the provider reason with
//! them, execute the calls it asks for, and hand back the final text.

use std::sync::Arc;
use std::time::Duration;

use indoc::formatdoc;
use rmcp::model::{CallToolResult, Tool};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;

use super::connection::{CapabilityConnection, McpConnection};
use super::descriptor::CapabilityDescriptor;
use super::errors::{InvokeError, StartError, StopError};
use crate::conversation::{Role, Turn};
use crate::providers::{ChatMessage, Provider, ToolSpec};

/// Upper bound on provider/tool rounds within a single task before the
/// handle forces a tool-free answer.
const MAX_TOOL_ROUNDS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityStatus {
    Stopped,
    Starting,
    Running,
    Failed,
    Stopping,
}

enum HandleState {
    Stopped,
    Starting,
    Running(Arc<dyn CapabilityConnection>),
    Failed(String),
    Stopping,
}

impl HandleState {
    fn status(&self) -> CapabilityStatus {
        match self {
            HandleState::Stopped => CapabilityStatus::Stopped,
            HandleState::Starting => CapabilityStatus::Starting,
            HandleState::Running(_) => CapabilityStatus::Running,
            HandleState::Failed(_) => CapabilityStatus::Failed,
            HandleState::Stopping => CapabilityStatus::Stopping,
        }
    }
}

pub struct CapabilityHandle {
    descriptor: CapabilityDescriptor,
    provider: Arc<dyn Provider>,
    timeout: Duration,
    state: RwLock<HandleState>,
}

impl CapabilityHandle {
    /// `timeout` bounds the startup handshake, each MCP request, and the
    /// whole of one `invoke`.
    pub fn new(
        descriptor: CapabilityDescriptor,
        provider: Arc<dyn Provider>,
        timeout: Duration,
    ) -> Self {
        CapabilityHandle {
            descriptor,
            provider,
            timeout,
            state: RwLock::new(HandleState::Stopped),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_connection(
        descriptor: CapabilityDescriptor,
        provider: Arc<dyn Provider>,
        timeout: Duration,
        connection: Arc<dyn CapabilityConnection>,
    ) -> Self {
        CapabilityHandle {
            descriptor,
            provider,
            timeout,
            state: RwLock::new(HandleState::Running(connection)),
        }
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn description(&self) -> &str {
        &self.descriptor.description
    }

    pub async fn status(&self) -> CapabilityStatus {
        self.state.read().await.status()
    }

    /// Detail of the last start failure, if the handle is in that state.
    pub async fn failure(&self) -> Option<String> {
        match &*self.state.read().await {
            HandleState::Failed(detail) => Some(detail.clone()),
            _ => None,
        }
    }

    /// Spawn the capability's server process and run the MCP handshake.
    /// Starting an already running handle is a no-op; starting after a
    /// failure retries from scratch.
    #[instrument(skip(self), fields(capability = %self.descriptor.name))]
    pub async fn start(&self) -> Result<(), StartError> {
        {
            let mut state = self.state.write().await;
            match &*state {
                // Another caller is mid-transition; leave it to them.
                HandleState::Running(_) | HandleState::Starting | HandleState::Stopping => {
                    return Ok(())
                }
                HandleState::Stopped | HandleState::Failed(_) => *state = HandleState::Starting,
            }
        }

        match self.spawn_connection().await {
            Ok(connection) => {
                let mut state = self.state.write().await;
                if matches!(&*state, HandleState::Starting) {
                    *state = HandleState::Running(Arc::new(connection));
                    info!("capability started");
                } else {
                    // stop() won the race while we were connecting.
                    drop(state);
                    let _ = connection.shutdown().await;
                    debug!("start abandoned, capability was stopped while connecting");
                }
                Ok(())
            }
            Err(error) => {
                let mut state = self.state.write().await;
                *state = HandleState::Failed(error.to_string());
                warn!(error = %error, "capability failed to start");
                Err(error)
            }
        }
    }

    async fn spawn_connection(&self) -> Result<McpConnection, StartError> {
        let env = self.descriptor.resolve_env()?;
        let args = self.descriptor.resolve_args()?;
        McpConnection::connect_stdio(&self.descriptor.command, &args, &env, self.timeout).await
    }

    /// Run one delegated task to completion. Fails fast when the capability
    /// is not running; otherwise bounded by the handle's timeout. The
    /// dispatcher sends only the subtask text; direct callers may supply
    /// prior turns for context.
    #[instrument(skip(self, history, cancel_token), fields(capability = %self.descriptor.name))]
    pub async fn invoke(
        &self,
        task: &str,
        history: Option<&[Turn]>,
        cancel_token: CancellationToken,
    ) -> Result<String, InvokeError> {
        let connection = {
            let state = self.state.read().await;
            match &*state {
                HandleState::Running(connection) => Arc::clone(connection),
                _ => return Err(InvokeError::Unavailable),
            }
        };

        match tokio::time::timeout(
            self.timeout,
            self.run_task(connection, task, history, cancel_token),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout_secs = self.timeout.as_secs(), "task timed out");
                Err(InvokeError::Timeout(self.timeout))
            }
        }
    }

    async fn run_task(
        &self,
        connection: Arc<dyn CapabilityConnection>,
        task: &str,
        history: Option<&[Turn]>,
        cancel_token: CancellationToken,
    ) -> Result<String, InvokeError> {
        let tools = connection
            .list_tools(cancel_token.clone())
            .await
            .map_err(|e| InvokeError::RemoteFailure {
                detail: e.to_string(),
            })?;
        let specs: Vec<ToolSpec> = tools.iter().map(tool_spec).collect();
        debug!(tool_count = specs.len(), "starting task");

        let system = self.system_prompt(&specs);
        let mut messages: Vec<ChatMessage> = history
            .unwrap_or_default()
            .iter()
            .map(|turn| match turn.role {
                Role::Human => ChatMessage::user(&turn.content),
                Role::Assistant => ChatMessage::assistant(&turn.content),
            })
            .collect();
        messages.push(ChatMessage::user(task));

        for _ in 0..MAX_TOOL_ROUNDS {
            let completion = self
                .provider
                .complete(&system, &messages, &specs)
                .await
                .map_err(|e| InvokeError::RemoteFailure {
                    detail: e.to_string(),
                })?;

            if !completion.has_tool_calls() {
                return Ok(completion.text_or_empty());
            }

            messages.push(ChatMessage::Assistant {
                text: completion.text.clone(),
                tool_calls: completion.tool_calls.clone(),
            });

            for call in &completion.tool_calls {
                let arguments = match &call.arguments {
                    Value::Object(map) => Some(map.clone()),
                    _ => None,
                };
                match connection
                    .call_tool(&call.name, arguments, cancel_token.clone())
                    .await
                {
                    Ok(result) => {
                        let output = render_tool_output(&result);
                        if result.is_error == Some(true) {
                            warn!(tool = %call.name, "tool reported an error");
                            messages.push(ChatMessage::tool_error(&call.id, output));
                        } else {
                            messages.push(ChatMessage::tool_result(&call.id, output));
                        }
                    }
                    Err(error) => {
                        warn!(tool = %call.name, error = %error, "tool call failed");
                        messages.push(ChatMessage::tool_error(&call.id, error.to_string()));
                    }
                }
            }
        }

        // Out of rounds; take away the tools and ask for a final answer.
        let completion = self
            .provider
            .complete(&system, &messages, &[])
            .await
            .map_err(|e| InvokeError::RemoteFailure {
                detail: e.to_string(),
            })?;
        Ok(completion.text_or_empty())
    }

    fn system_prompt(&self, tools: &[ToolSpec]) -> String {
        let tool_list = tools
            .iter()
            .map(|tool| format!("- {}: {}", tool.name, tool.description))
            .collect::<Vec<_>>()
            .join("\n");
        formatdoc! {r#"
            You are the {name} capability of switchboard, a request dispatch service.
            {description}

            Complete the task you are given with the tools below, then reply with a
            concise summary of the outcome. Do not ask follow-up questions; make
            reasonable assumptions and finish.

            Available tools:
            {tools}
        "#,
            name = self.descriptor.name,
            description = self.descriptor.description,
            tools = tool_list,
        }
    }

    /// Tear down the server process. Safe to call in any state; a failed
    /// handle is reset to stopped.
    #[instrument(skip(self), fields(capability = %self.descriptor.name))]
    pub async fn stop(&self) -> Result<(), StopError> {
        let connection = {
            let mut state = self.state.write().await;
            match std::mem::replace(&mut *state, HandleState::Stopping) {
                HandleState::Running(connection) => connection,
                HandleState::Stopping => return Ok(()),
                HandleState::Stopped | HandleState::Starting | HandleState::Failed(_) => {
                    *state = HandleState::Stopped;
                    return Ok(());
                }
            }
        };

        let result = connection.shutdown().await;
        *self.state.write().await = HandleState::Stopped;
        match &result {
            Ok(()) => info!("capability stopped"),
            Err(error) => warn!(error = %error, "capability shutdown reported an error"),
        }
        result
    }
}

fn tool_spec(tool: &Tool) -> ToolSpec {
    ToolSpec {
        name: tool.name.to_string(),
        description: tool
            .description
            .as_ref()
            .map(|d| d.to_string())
            .unwrap_or_default(),
        parameters: Value::Object(tool.input_schema.as_ref().clone()),
    }
}

fn render_tool_output(result: &CallToolResult) -> String {
    result
        .content
        .iter()
        .filter_map(|content| content.as_text().map(|text| text.text.clone()))
        .collect::<Vec<_>>()
        .join("\n")
}
