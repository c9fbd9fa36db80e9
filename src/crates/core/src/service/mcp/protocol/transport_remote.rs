//! Remote MCP transport (Streamable HTTP)
//!
//! Uses the official `rmcp` Rust SDK with a `reqwest` client. A successful
//! handshake yields a [`RemoteSession`] that owns the running protocol
//! service; the service in turn owns the HTTP stream.

use super::types::{InitializeResult, MCPServerInfo, MCPTool, ToolCall, ToolContent, ToolResponse};
use crate::util::errors::{EnvError, EnvResult};
use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use rmcp::model::{
    CallToolRequestParam, ClientCapabilities, ClientInfo, Content, Implementation, LoggingLevel,
    LoggingMessageNotificationParam, PaginatedRequestParam, ProtocolVersion, RawContent,
    ResourceContents,
};
use rmcp::service::{NotificationContext, RunningService};
use rmcp::transport::streamable_http_client::StreamableHttpClientTransportConfig;
use rmcp::transport::StreamableHttpClientTransport;
use rmcp::{ClientHandler, RoleClient, ServiceError};
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_USER_AGENT: &str = concat!("MCPGym-MCP-Client/", env!("CARGO_PKG_VERSION"));

#[derive(Clone)]
struct GymClientHandler {
    info: ClientInfo,
}

impl ClientHandler for GymClientHandler {
    fn get_info(&self) -> ClientInfo {
        self.info.clone()
    }

    async fn on_logging_message(
        &self,
        params: LoggingMessageNotificationParam,
        _context: NotificationContext<RoleClient>,
    ) {
        let level = match params.level {
            LoggingLevel::Debug => log::Level::Debug,
            LoggingLevel::Info | LoggingLevel::Notice => log::Level::Info,
            LoggingLevel::Warning => log::Level::Warn,
            _ => log::Level::Error,
        };
        log::log!(
            level,
            "MCP server log message: logger={:?} data={}",
            params.logger.as_deref(),
            params.data
        );
    }
}

type GymService = RunningService<RoleClient, GymClientHandler>;

/// Why a `tools/call` did not produce a result.
#[derive(Debug)]
pub(crate) enum CallFailure {
    /// The server answered with a JSON-RPC error; the session is still usable.
    Rejected(String),
    /// The transport failed or timed out; the session must be rebuilt.
    Broken(String),
}

/// Remote MCP transport backed by Streamable HTTP.
pub struct RemoteMCPTransport {
    url: String,
    http_client: reqwest::Client,
    request_timeout: Duration,
}

impl RemoteMCPTransport {
    fn normalize_authorization_value(value: &str) -> Option<String> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return None;
        }
        if trimmed.to_ascii_lowercase().starts_with("bearer ") || trimmed.contains(char::is_whitespace)
        {
            return Some(trimmed.to_string());
        }
        Some(format!("Bearer {}", trimmed))
    }

    fn build_default_headers(headers: &HashMap<String, String>) -> HeaderMap {
        let mut header_map = HeaderMap::new();

        for (name, value) in headers {
            let Ok(header_name) = HeaderName::from_str(name) else {
                warn!("Invalid HTTP header name in environment config (skipping): {}", name);
                continue;
            };

            let header_value_str = if header_name == reqwest::header::AUTHORIZATION {
                match Self::normalize_authorization_value(value) {
                    Some(v) => v,
                    None => continue,
                }
            } else {
                value.trim().to_string()
            };

            let Ok(header_value) = HeaderValue::from_str(&header_value_str) else {
                warn!(
                    "Invalid HTTP header value in environment config (skipping): header={}",
                    name
                );
                continue;
            };

            header_map.insert(header_name, header_value);
        }

        if !header_map.contains_key(USER_AGENT) {
            header_map.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));
        }

        header_map
    }

    pub fn new(url: String, headers: &HashMap<String, String>, request_timeout: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .default_headers(Self::build_default_headers(headers))
            .build()
            .unwrap_or_else(|e| {
                warn!("Failed to create HTTP client, using default config: {}", e);
                reqwest::Client::new()
            });

        Self {
            url,
            http_client,
            request_timeout,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn build_client_info(client_name: &str, client_version: &str) -> ClientInfo {
        ClientInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ClientCapabilities::default(),
            client_info: Implementation {
                name: client_name.to_string(),
                title: None,
                version: client_version.to_string(),
                icons: None,
                website_url: None,
            },
        }
    }

    /// Opens the stream and performs the MCP handshake.
    pub async fn open(&self, client_name: &str, client_version: &str) -> EnvResult<RemoteSession> {
        let transport = StreamableHttpClientTransport::with_client(
            self.http_client.clone(),
            StreamableHttpClientTransportConfig::with_uri(self.url.clone()),
        );
        let handler = GymClientHandler {
            info: Self::build_client_info(client_name, client_version),
        };

        let service = tokio::time::timeout(self.request_timeout, rmcp::serve_client(handler, transport))
            .await
            .map_err(|_| {
                EnvError::connection(format!(
                    "Timed out handshaking with MCP server after {:?}: {}",
                    self.request_timeout, self.url
                ))
            })?
            .map_err(|e| EnvError::connection(format!("Handshake failed with {}: {}", self.url, e)))?;

        Ok(RemoteSession {
            service: Some(service),
            request_timeout: self.request_timeout,
        })
    }
}

/// A live MCP session.
///
/// Call [`RemoteSession::close`] for an orderly shutdown. If the session is
/// dropped instead, the service's drop guard cancels it and the transport is
/// released with it.
pub struct RemoteSession {
    service: Option<GymService>,
    request_timeout: Duration,
}

impl RemoteSession {
    fn service(&self) -> EnvResult<&GymService> {
        self.service
            .as_ref()
            .ok_or_else(|| EnvError::connection("MCP session already released"))
    }

    pub fn server_info(&self) -> EnvResult<InitializeResult> {
        let info = self.service()?.peer().peer_info().ok_or_else(|| {
            EnvError::connection("Handshake succeeded but server info missing")
        })?;

        Ok(InitializeResult {
            protocol_version: info.protocol_version.to_string(),
            server_info: MCPServerInfo {
                name: info.server_info.name.clone(),
                version: info.server_info.version.clone(),
                description: info.server_info.title.clone().or(info.instructions.clone()),
            },
            supports_tools: info.capabilities.tools.is_some(),
        })
    }

    /// Lists every tool, following pagination cursors.
    pub async fn list_tools(&self) -> EnvResult<Vec<MCPTool>> {
        let service = self.service()?;
        let mut tools = Vec::new();
        let mut cursor = None;

        loop {
            let fut = service.peer().list_tools(Some(PaginatedRequestParam { cursor }));
            let page = tokio::time::timeout(self.request_timeout, fut)
                .await
                .map_err(|_| EnvError::connection("MCP tools/list timeout"))?
                .map_err(|e| EnvError::connection(format!("MCP tools/list failed: {}", e)))?;

            tools.extend(page.tools.into_iter().map(map_tool));
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        Ok(tools)
    }

    pub(crate) async fn call_tool(&self, call: &ToolCall) -> Result<ToolResponse, CallFailure> {
        let service = self
            .service()
            .map_err(|e| CallFailure::Broken(e.to_string()))?;

        let fut = service.peer().call_tool(CallToolRequestParam {
            name: call.name.clone().into(),
            arguments: Some(call.params.clone()),
        });

        match tokio::time::timeout(self.request_timeout, fut).await {
            Err(_) => Err(CallFailure::Broken(format!(
                "MCP tools/call '{}' timed out after {:?}",
                call.name, self.request_timeout
            ))),
            Ok(Err(e @ ServiceError::McpError(_))) => Err(CallFailure::Rejected(format!(
                "MCP tools/call '{}' rejected: {}",
                call.name, e
            ))),
            Ok(Err(e)) => Err(CallFailure::Broken(format!(
                "MCP tools/call '{}' failed: {}",
                call.name, e
            ))),
            Ok(Ok(result)) => Ok(map_tool_result(result)),
        }
    }

    /// Cancels the session; the transport stream closes once the service stops.
    pub async fn close(mut self) -> EnvResult<()> {
        let Some(service) = self.service.take() else {
            return Ok(());
        };
        let reason = service
            .cancel()
            .await
            .map_err(|e| EnvError::connection(format!("MCP session shutdown failed: {}", e)))?;
        debug!("MCP session closed: reason={:?}", reason);
        Ok(())
    }
}

impl Drop for RemoteSession {
    fn drop(&mut self) {
        if self.service.take().is_some() {
            debug!("MCP session dropped without close, cancelling service");
        }
    }
}

fn map_tool(tool: rmcp::model::Tool) -> MCPTool {
    MCPTool {
        name: tool.name.to_string(),
        description: tool.description.map(|d| d.to_string()),
        input_schema: Value::Object((*tool.input_schema).clone()),
    }
}

fn map_tool_result(result: rmcp::model::CallToolResult) -> ToolResponse {
    let mut content: Vec<ToolContent> = result.content.into_iter().map(map_content_block).collect();

    if content.is_empty() {
        if let Some(value) = result.structured_content {
            content.push(ToolContent::text(value.to_string()));
        }
    }

    ToolResponse {
        content,
        is_error: result.is_error.unwrap_or(false),
    }
}

fn map_content_block(content: Content) -> ToolContent {
    match content.raw {
        RawContent::Text(text) => ToolContent::Text { text: text.text },
        RawContent::Image(image) => ToolContent::Image {
            mime_type: image.mime_type,
        },
        RawContent::Resource(resource) => match resource.resource {
            ResourceContents::TextResourceContents { uri, .. }
            | ResourceContents::BlobResourceContents { uri, .. } => ToolContent::Resource { uri },
        },
        RawContent::Audio(audio) => ToolContent::Other {
            kind: format!("audio ({})", audio.mime_type),
        },
        RawContent::ResourceLink(link) => ToolContent::Resource { uri: link.uri },
    }
}
