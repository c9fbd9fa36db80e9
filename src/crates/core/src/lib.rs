// MCPGym Core Library - synchronous environments backed by remote MCP tools
// Three-layer architecture: Util -> Service -> Agentic

pub mod agentic; // Agentic layer - turn-based environments, sync/async bridge
pub mod service; // Service layer - MCP protocol types, transport, tool session
pub mod util; // Utility layer - errors

// Export main types
pub use util::errors::*;

// Export service layer components
pub use service::mcp::{
    protocol::{InitializeResult, MCPTool, ToolCall, ToolContent, ToolResponse},
    server::{MCPConnection, ToolSession},
};

// Export Agentic environment types
pub use agentic::env::{
    AsyncBridge, EnvConfig, MetricAggregation, ResetInfo, SokobanMcpEnv, StepInfo, StepOutcome,
    TextEnv,
};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const CORE_NAME: &str = "MCPGym Core";
