//! Scripted connection doubles shared by handle and registry tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use rmcp::model::{CallToolResult, Content, JsonObject, Tool};
use rmcp::object;
use tokio_util::sync::CancellationToken;

use super::connection::{CapabilityConnection, ConnectionError};
use super::errors::StopError;

pub(crate) fn fake_tool(name: &str) -> Tool {
    Tool::new(
        name.to_string(),
        format!("{name} test tool"),
        object!({
            "type": "object",
            "properties": { "task": { "type": "string" } },
            "required": ["task"]
        }),
    )
}

/// In-memory stand-in for a spawned MCP server. Tool replies are consumed in
/// order; once exhausted every call answers with a plain "done".
pub(crate) struct FakeConnection {
    tools: Vec<Tool>,
    replies: Mutex<VecDeque<Result<CallToolResult, ConnectionError>>>,
    calls: Mutex<Vec<(String, Option<JsonObject>)>>,
    shutdowns: AtomicUsize,
    fail_shutdown: bool,
    hang_shutdown: bool,
    hang_calls: bool,
}

impl FakeConnection {
    pub(crate) fn new(tool_names: &[&str]) -> Self {
        FakeConnection {
            tools: tool_names.iter().map(|name| fake_tool(name)).collect(),
            replies: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            shutdowns: AtomicUsize::new(0),
            fail_shutdown: false,
            hang_shutdown: false,
            hang_calls: false,
        }
    }

    pub(crate) fn with_reply(self, reply: Result<CallToolResult, ConnectionError>) -> Self {
        self.replies.lock().unwrap().push_back(reply);
        self
    }

    pub(crate) fn failing_shutdown(mut self) -> Self {
        self.fail_shutdown = true;
        self
    }

    pub(crate) fn hanging_shutdown(mut self) -> Self {
        self.hang_shutdown = true;
        self
    }

    pub(crate) fn hanging_calls(mut self) -> Self {
        self.hang_calls = true;
        self
    }

    pub(crate) fn calls(&self) -> Vec<(String, Option<JsonObject>)> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn shutdown_count(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CapabilityConnection for FakeConnection {
    async fn list_tools(
        &self,
        _cancel_token: CancellationToken,
    ) -> Result<Vec<Tool>, ConnectionError> {
        Ok(self.tools.clone())
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Option<JsonObject>,
        _cancel_token: CancellationToken,
    ) -> Result<CallToolResult, ConnectionError> {
        self.calls
            .lock()
            .unwrap()
            .push((name.to_string(), arguments));
        if self.hang_calls {
            std::future::pending::<()>().await;
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(CallToolResult::success(vec![Content::text("done")])))
    }

    async fn shutdown(&self) -> Result<(), StopError> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        if self.hang_shutdown {
            std::future::pending::<()>().await;
        }
        if self.fail_shutdown {
            return Err(StopError::Shutdown("fake shutdown failure".to_string()));
        }
        Ok(())
    }
}
