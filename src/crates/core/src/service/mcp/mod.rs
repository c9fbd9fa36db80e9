//! MCP service
//!
//! Remote tool server access: protocol types, the Streamable HTTP transport
//! and the session lifecycle built on top of it.

pub mod protocol;
pub mod server;
