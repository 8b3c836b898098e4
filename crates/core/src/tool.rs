//! ToolServer trait: the remote tool server the pipeline stages call.
//!
//! The tool server owns the database connection and report rendering. The
//! pipeline only ever sees it through this trait: list what is available,
//! run a query, or call a named tool with JSON arguments.

use crate::error::ToolError;
use crate::state::Row;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A tool advertised by the remote tool server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Unique tool name (e.g., "execute_sql", "generate_pdf")
    pub name: String,

    /// What the tool does
    #[serde(default)]
    pub description: String,

    /// JSON Schema of the tool's arguments
    #[serde(default)]
    pub parameters: serde_json::Value,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: serde_json::Value::Null,
        }
    }

    /// One summary line, as shown in tool-inspection records.
    pub fn summary_line(&self) -> String {
        let description = if self.description.is_empty() {
            "No description"
        } else {
            self.description.as_str()
        };
        format!("- {}: {}", self.name, description)
    }
}

/// The remote tool server.
#[async_trait]
pub trait ToolServer: Send + Sync {
    /// A human-readable name for this server (e.g., "mcp").
    fn name(&self) -> &str;

    /// Discover the tools the server offers.
    async fn list_tools(&self) -> std::result::Result<Vec<ToolDescriptor>, ToolError>;

    /// Run a SQL query and return its rows.
    async fn execute_sql(&self, sql: &str) -> std::result::Result<Vec<Row>, ToolError>;

    /// Call any named tool with JSON arguments.
    async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> std::result::Result<serde_json::Value, ToolError>;
}
