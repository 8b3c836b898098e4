//! Tool server access for LysAI.
//!
//! The database and report rendering live behind an MCP server; this crate
//! is the client the pipeline stages use through the `ToolServer` trait.

pub mod content;
pub mod mcp;

pub use mcp::{EXECUTE_SQL_TOOL, McpToolServer};
