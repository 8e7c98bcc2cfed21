//! MCP wire plumbing for capability servers.
//!
//! A capability runs as a child process speaking MCP over stdio. This module
//! owns the rmcp client service for that process and exposes the narrow
//! surface the handle needs: tool discovery, tool invocation, shutdown.

use std::time::Duration;

use async_trait::async_trait;
use rmcp::{
    model::{
        CallToolRequest, CallToolRequestParam, CallToolResult, CancelledNotification,
        CancelledNotificationMethod, CancelledNotificationParam, ClientCapabilities, ClientInfo,
        ClientRequest, Extensions, Implementation, JsonObject, ListToolsRequest,
        PaginatedRequestParam, ProtocolVersion, RequestId, ServerResult, Tool,
    },
    service::{PeerRequestOptions, RequestHandle, RunningService, ServiceRole},
    transport::TokioChildProcess,
    ClientHandler, Peer, RoleClient, ServiceError, ServiceExt,
};
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::errors::{StartError, StopError};

pub type ConnectionError = rmcp::ServiceError;

/// Client-side MCP handler. We initiate everything and ignore server
/// notifications, so only the handshake identity is filled in.
#[derive(Clone, Default)]
pub struct SwitchboardClient;

impl ClientHandler for SwitchboardClient {
    fn get_info(&self) -> ClientInfo {
        ClientInfo {
            protocol_version: ProtocolVersion::V_2025_03_26,
            capabilities: ClientCapabilities::builder().build(),
            client_info: Implementation {
                name: "switchboard".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                icons: None,
                title: None,
                website_url: None,
            },
        }
    }
}

/// What a running capability connection can do. The handle talks to this
/// trait so tests can stand in a scripted connection without spawning a
/// child process.
#[async_trait]
pub trait CapabilityConnection: Send + Sync {
    /// All tools the server advertises, with pagination followed to the end.
    async fn list_tools(&self, cancel_token: CancellationToken)
        -> Result<Vec<Tool>, ConnectionError>;

    async fn call_tool(
        &self,
        name: &str,
        arguments: Option<JsonObject>,
        cancel_token: CancellationToken,
    ) -> Result<CallToolResult, ConnectionError>;

    /// Tear down the connection and the process behind it.
    async fn shutdown(&self) -> Result<(), StopError>;
}

/// A live MCP session over a spawned child process.
pub struct McpConnection {
    service: Mutex<RunningService<RoleClient, SwitchboardClient>>,
    timeout: Duration,
}

impl McpConnection {
    /// Spawn `command` with `args`/`env` and run the MCP handshake against
    /// its stdio. The same `timeout` bounds the handshake and each later
    /// request.
    pub async fn connect_stdio(
        command: &str,
        args: &[String],
        env: &[(String, String)],
        timeout: Duration,
    ) -> Result<Self, StartError> {
        let mut cmd = Command::new(command);
        cmd.args(args);
        for (key, value) in env {
            cmd.env(key, value);
        }

        let transport = TokioChildProcess::new(cmd).map_err(|e| StartError::Spawn {
            command: command.to_string(),
            detail: e.to_string(),
        })?;

        let service = tokio::time::timeout(timeout, SwitchboardClient.serve(transport))
            .await
            .map_err(|_| StartError::Timeout(timeout))?
            .map_err(|e| StartError::Connect(e.to_string()))?;

        if let Some(info) = service.peer_info() {
            debug!(
                server = %info.server_info.name,
                version = %info.server_info.version,
                "mcp server initialized"
            );
        }

        Ok(Self {
            service: Mutex::new(service),
            timeout,
        })
    }

    async fn send_request(
        &self,
        request: ClientRequest,
        cancel_token: &CancellationToken,
    ) -> Result<ServerResult, ConnectionError> {
        let handle = self
            .service
            .lock()
            .await
            .send_cancellable_request(request, PeerRequestOptions::no_options())
            .await?;

        await_response(handle, self.timeout, cancel_token).await
    }
}

async fn await_response(
    handle: RequestHandle<RoleClient>,
    timeout: Duration,
    cancel_token: &CancellationToken,
) -> Result<<RoleClient as ServiceRole>::PeerResp, ServiceError> {
    let receiver = handle.rx;
    let peer = handle.peer;
    let request_id = handle.id;
    tokio::select! {
        result = receiver => {
            result.map_err(|_e| ServiceError::TransportClosed)?
        }
        _ = tokio::time::sleep(timeout) => {
            send_cancel_message(&peer, request_id, Some("timed out".to_owned())).await?;
            Err(ServiceError::Timeout { timeout })
        }
        _ = cancel_token.cancelled() => {
            send_cancel_message(&peer, request_id, Some("operation cancelled".to_owned())).await?;
            Err(ServiceError::Cancelled { reason: None })
        }
    }
}

async fn send_cancel_message(
    peer: &Peer<RoleClient>,
    request_id: RequestId,
    reason: Option<String>,
) -> Result<(), ServiceError> {
    peer.send_notification(
        CancelledNotification {
            params: CancelledNotificationParam { request_id, reason },
            method: CancelledNotificationMethod,
            extensions: Extensions::new(),
        }
        .into(),
    )
    .await
}

#[async_trait]
impl CapabilityConnection for McpConnection {
    async fn list_tools(
        &self,
        cancel_token: CancellationToken,
    ) -> Result<Vec<Tool>, ConnectionError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let res = self
                .send_request(
                    ClientRequest::ListToolsRequest(ListToolsRequest {
                        params: Some(PaginatedRequestParam {
                            cursor: cursor.take(),
                        }),
                        method: Default::default(),
                        extensions: Extensions::new(),
                    }),
                    &cancel_token,
                )
                .await?;

            let page = match res {
                ServerResult::ListToolsResult(result) => result,
                _ => return Err(ServiceError::UnexpectedResponse),
            };
            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(tools)
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Option<JsonObject>,
        cancel_token: CancellationToken,
    ) -> Result<CallToolResult, ConnectionError> {
        let res = self
            .send_request(
                ClientRequest::CallToolRequest(CallToolRequest {
                    params: CallToolRequestParam {
                        name: name.to_string().into(),
                        arguments,
                    },
                    method: Default::default(),
                    extensions: Extensions::new(),
                }),
                &cancel_token,
            )
            .await?;

        match res {
            ServerResult::CallToolResult(result) => Ok(result),
            _ => Err(ServiceError::UnexpectedResponse),
        }
    }

    async fn shutdown(&self) -> Result<(), StopError> {
        // Cancelling the service token stops the client task and reaps the
        // child process once the last reference drops.
        self.service.lock().await.cancellation_token().cancel();
        Ok(())
    }
}
