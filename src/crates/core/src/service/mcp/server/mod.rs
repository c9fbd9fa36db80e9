pub mod connection;

pub use connection::{MCPConnection, ToolSession};
