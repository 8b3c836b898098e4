//! MCP tool server client over streamable HTTP.
//!
//! Speaks JSON-RPC 2.0: `initialize` once per client (capturing the
//! `Mcp-Session-Id` header when the server issues one), then `tools/list`
//! and `tools/call`. Each call is bounded by the configured timeout.

use crate::content;
use async_trait::async_trait;
use lysai_config::ToolServerConfig;
use lysai_core::error::ToolError;
use lysai_core::state::Row;
use lysai_core::{ToolDescriptor, ToolServer};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info};

const PROTOCOL_VERSION: &str = "2025-03-26";
const SESSION_HEADER: &str = "Mcp-Session-Id";

/// Name of the query tool on the server.
pub const EXECUTE_SQL_TOOL: &str = "execute_sql";

pub struct McpToolServer {
    url: String,
    timeout: Duration,
    client: reqwest::Client,
    next_id: AtomicU64,
    session: OnceCell<Option<String>>,
}

impl McpToolServer {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();

        Self {
            url: url.into(),
            timeout,
            client,
            next_id: AtomicU64::new(1),
            session: OnceCell::new(),
        }
    }

    pub fn from_config(config: &ToolServerConfig) -> Self {
        Self::new(&config.url, Duration::from_secs(config.timeout_secs))
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn map_send_error(&self, label: &str, e: reqwest::Error) -> ToolError {
        if e.is_timeout() {
            ToolError::Timeout {
                tool_name: label.to_string(),
                timeout_secs: self.timeout.as_secs(),
            }
        } else {
            ToolError::Unreachable(format!("{}: {e}", self.url))
        }
    }

    /// POST one JSON-RPC message. Returns the response headers' session id
    /// (if any) and the body text.
    async fn post(
        &self,
        label: &str,
        session: Option<&str>,
        body: &Value,
    ) -> Result<(Option<String>, String), ToolError> {
        let mut request = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json, text/event-stream")
            .json(body);
        if let Some(session) = session {
            request = request.header(SESSION_HEADER, session);
        }

        let response = request
            .send()
            .await
            .map_err(|e| self.map_send_error(label, e))?;

        let status = response.status();
        let session_id = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let text = response
            .text()
            .await
            .map_err(|e| self.map_send_error(label, e))?;

        if !status.is_success() {
            return Err(ToolError::Unreachable(format!(
                "{} returned HTTP {}: {}",
                self.url,
                status.as_u16(),
                text.chars().take(200).collect::<String>()
            )));
        }
        Ok((session_id, text))
    }

    async fn initialize(&self) -> Result<Option<String>, ToolError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "initialize",
            "params": {
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": { "name": "lysai", "version": env!("CARGO_PKG_VERSION") }
            }
        });

        let (session, text) = self.post("initialize", None, &body).await?;
        let result = content::into_result(content::extract_message(&text, id)?)?;
        let server = result
            .pointer("/serverInfo/name")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        info!(url = %self.url, server, "Connected to tool server");

        let notification = json!({ "jsonrpc": "2.0", "method": "notifications/initialized" });
        self.post("initialize", session.as_deref(), &notification)
            .await?;
        Ok(session)
    }

    async fn request(&self, method: &str, label: &str, params: Value) -> Result<Value, ToolError> {
        let session = self
            .session
            .get_or_try_init(|| self.initialize())
            .await?
            .clone();

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
        debug!(method, label, id, "Tool server request");

        let (_, text) = self.post(label, session.as_deref(), &body).await?;
        content::into_result(content::extract_message(&text, id)?)
    }

    async fn call_raw(&self, name: &str, arguments: Value) -> Result<Value, ToolError> {
        self.request(
            "tools/call",
            name,
            json!({ "name": name, "arguments": arguments }),
        )
        .await
    }
}

#[async_trait]
impl ToolServer for McpToolServer {
    fn name(&self) -> &str {
        "mcp"
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ToolError> {
        let result = self.request("tools/list", "tools/list", json!({})).await?;
        content::parse_tool_list(result)
    }

    async fn execute_sql(&self, sql: &str) -> Result<Vec<Row>, ToolError> {
        let result = self
            .call_raw(EXECUTE_SQL_TOOL, json!({ "query": sql }))
            .await?;
        content::decode_rows(EXECUTE_SQL_TOOL, result)
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, ToolError> {
        let result = self.call_raw(name, arguments).await?;
        content::decode_tool_result(name, result)
    }
}
