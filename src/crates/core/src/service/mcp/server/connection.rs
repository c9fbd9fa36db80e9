//! MCP connection management
//!
//! Owns at most one live session with the remote tool server and exposes the
//! connect / invoke / disconnect lifecycle the environment layer drives.

use crate::service::mcp::protocol::{
    transport_remote::{CallFailure, RemoteMCPTransport, RemoteSession},
    InitializeResult, MCPTool, ToolCall, ToolResponse,
};
use crate::util::errors::{EnvError, EnvResult};
use async_trait::async_trait;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::time::Duration;

/// Session lifecycle against a remote tool server.
///
/// Calls on one session are strictly sequential; implementations never see
/// two invocations in flight.
#[async_trait]
pub trait ToolSession: Send + 'static {
    fn is_connected(&self) -> bool;

    /// Opens the session. No-op when already connected.
    async fn connect(&mut self) -> EnvResult<()>;

    /// Sends one tool call and returns the raw envelope without interpreting it.
    async fn invoke(&mut self, call: &ToolCall) -> EnvResult<ToolResponse>;

    /// Releases the session. Safe to call repeatedly.
    async fn disconnect(&mut self) -> EnvResult<()>;
}

/// MCP connection.
pub struct MCPConnection {
    transport: RemoteMCPTransport,
    client_name: String,
    client_version: String,
    session: Option<RemoteSession>,
    server_info: Option<InitializeResult>,
    tools: Vec<MCPTool>,
}

impl MCPConnection {
    /// Creates a new remote connection instance (Streamable HTTP). Nothing is
    /// sent until [`ToolSession::connect`].
    pub fn new_remote(
        url: String,
        headers: &HashMap<String, String>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            transport: RemoteMCPTransport::new(url, headers, request_timeout),
            client_name: "mcpgym".to_string(),
            client_version: crate::VERSION.to_string(),
            session: None,
            server_info: None,
            tools: Vec::new(),
        }
    }

    pub fn with_client_info(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.client_name = name.into();
        self.client_version = version.into();
        self
    }

    pub fn url(&self) -> &str {
        self.transport.url()
    }

    /// Handshake summary of the current session.
    pub fn server_info(&self) -> Option<&InitializeResult> {
        self.server_info.as_ref()
    }

    /// Tools discovered during the last successful connect.
    pub fn tools(&self) -> &[MCPTool] {
        &self.tools
    }
}

#[async_trait]
impl ToolSession for MCPConnection {
    fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    async fn connect(&mut self) -> EnvResult<()> {
        if self.session.is_some() {
            return Ok(());
        }

        info!("Connecting to MCP server: url={}", self.url());
        // On any error below the session is dropped, which cancels it.
        let session = self
            .transport
            .open(&self.client_name, &self.client_version)
            .await?;
        let server_info = session.server_info()?;
        debug!("Session initialize: {:?}", server_info);

        let tools = session.list_tools().await?;
        debug!(
            "Connected to server with tools: {:?}",
            tools.iter().map(|t| t.name.as_str()).collect::<Vec<_>>()
        );

        self.server_info = Some(server_info);
        self.tools = tools;
        self.session = Some(session);
        Ok(())
    }

    async fn invoke(&mut self, call: &ToolCall) -> EnvResult<ToolResponse> {
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| EnvError::invocation("MCP session is not connected"))?;

        let result = session.call_tool(call).await;
        match result {
            Ok(response) => {
                debug!(
                    "Call tool '{}' with params {:?} received: {:?}",
                    call.name, call.params, response
                );
                Ok(response)
            }
            Err(CallFailure::Rejected(msg)) => Err(EnvError::Invocation(msg)),
            Err(CallFailure::Broken(msg)) => {
                warn!("Dropping broken MCP session, next call reconnects: {}", msg);
                self.session = None;
                Err(EnvError::Invocation(msg))
            }
        }
    }

    async fn disconnect(&mut self) -> EnvResult<()> {
        match self.session.take() {
            Some(session) => {
                info!("Disconnecting from MCP server: url={}", self.url());
                session.close().await
            }
            None => Ok(()),
        }
    }
}
