//! Decoding of MCP payloads: SSE framing, tool lists, tool-call results.

use lysai_core::error::ToolError;
use lysai_core::state::Row;
use lysai_core::ToolDescriptor;
use serde::Deserialize;
use serde_json::Value;

/// Pull the JSON-RPC message with `id` out of a response body.
///
/// Streamable-HTTP servers answer either with a plain JSON body or with an
/// SSE stream whose `data:` lines carry the messages.
pub fn extract_message(body: &str, id: u64) -> Result<Value, ToolError> {
    let trimmed = body.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        let value: Value = serde_json::from_str(trimmed)
            .map_err(|e| ToolError::InvalidResponse(format!("JSON body: {e}")))?;
        return match value {
            Value::Array(batch) => batch
                .into_iter()
                .find(|m| m.get("id").and_then(Value::as_u64) == Some(id))
                .ok_or_else(|| ToolError::InvalidResponse(format!("no response for id {id}"))),
            single => Ok(single),
        };
    }

    let mut data = String::new();
    let mut events = Vec::new();
    for line in body.lines() {
        if let Some(rest) = line.strip_prefix("data:") {
            if !data.is_empty() {
                data.push('\n');
            }
            data.push_str(rest.trim_start());
        } else if line.trim().is_empty() && !data.is_empty() {
            events.push(std::mem::take(&mut data));
        }
    }
    if !data.is_empty() {
        events.push(data);
    }

    events
        .iter()
        .filter_map(|event| serde_json::from_str::<Value>(event).ok())
        .find(|m| m.get("id").and_then(Value::as_u64) == Some(id))
        .ok_or_else(|| ToolError::InvalidResponse(format!("no response for id {id} in event stream")))
}

/// Unwrap a JSON-RPC response into its `result`.
pub fn into_result(message: Value) -> Result<Value, ToolError> {
    if let Some(error) = message.get("error") {
        let text = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        let code = error.get("code").and_then(Value::as_i64).unwrap_or_default();
        return Err(ToolError::InvalidResponse(format!("JSON-RPC error {code}: {text}")));
    }
    message
        .get("result")
        .cloned()
        .ok_or_else(|| ToolError::InvalidResponse("response carries no result".into()))
}

#[derive(Deserialize)]
struct ToolList {
    #[serde(default)]
    tools: Vec<RawTool>,
}

#[derive(Deserialize)]
struct RawTool {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default, rename = "inputSchema")]
    input_schema: Value,
}

/// Parse a `tools/list` result.
pub fn parse_tool_list(result: Value) -> Result<Vec<ToolDescriptor>, ToolError> {
    let list: ToolList = serde_json::from_value(result)
        .map_err(|e| ToolError::InvalidResponse(format!("tools/list: {e}")))?;
    Ok(list
        .tools
        .into_iter()
        .map(|t| ToolDescriptor {
            name: t.name,
            description: t.description.unwrap_or_default(),
            parameters: t.input_schema,
        })
        .collect())
}

/// Text items of a tool result's content, in order.
fn text_items(result: &Value) -> Vec<&str> {
    result
        .get("content")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter(|item| item.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|item| item.get("text").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default()
}

/// Decode a `tools/call` result into a JSON value.
///
/// `isError` results become `ExecutionFailed`. Structured content wins when
/// present (FastMCP wraps non-object returns as `{"result": ...}`); otherwise
/// the first text item is parsed as JSON, falling back to the raw text.
pub fn decode_tool_result(tool_name: &str, result: Value) -> Result<Value, ToolError> {
    let texts = text_items(&result);

    if result.get("isError").and_then(Value::as_bool).unwrap_or(false) {
        let reason = texts.first().copied().unwrap_or("tool reported an error");
        return Err(ToolError::ExecutionFailed {
            tool_name: tool_name.to_string(),
            reason: reason.to_string(),
        });
    }

    if let Some(structured) = result.get("structuredContent").filter(|v| !v.is_null()) {
        if let Some(inner) = structured
            .as_object()
            .filter(|o| o.len() == 1)
            .and_then(|o| o.get("result"))
        {
            return Ok(inner.clone());
        }
        return Ok(structured.clone());
    }

    match texts.first() {
        Some(first) => {
            Ok(serde_json::from_str(first).unwrap_or_else(|_| Value::String(first.to_string())))
        }
        None => Ok(Value::Null),
    }
}

/// Decode an `execute_sql` result into rows.
///
/// Accepts a structured or text-encoded array of objects, one object per text
/// item, or `{"rows": [...]}`. An error object (`{"error": ...}`) from the
/// server becomes `ExecutionFailed`.
pub fn decode_rows(tool_name: &str, result: Value) -> Result<Vec<Row>, ToolError> {
    let texts: Vec<String> = text_items(&result).into_iter().map(str::to_string).collect();
    let value = decode_tool_result(tool_name, result)?;

    let value = match value {
        // One object per text item
        Value::Object(ref obj) if texts.len() > 1 && !obj.contains_key("rows") => Value::Array(
            texts
                .iter()
                .filter_map(|t| serde_json::from_str::<Value>(t).ok())
                .collect(),
        ),
        other => other,
    };

    match value {
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(row) => Ok(row),
                other => Err(ToolError::InvalidResponse(format!(
                    "expected row object, got {other}"
                ))),
            })
            .collect(),
        Value::Object(mut obj) => {
            if let Some(error) = obj.get("error").filter(|e| !e.is_null()) {
                let reason = error.as_str().map_or_else(|| error.to_string(), str::to_string);
                return Err(ToolError::ExecutionFailed {
                    tool_name: tool_name.to_string(),
                    reason,
                });
            }
            match obj.remove("rows") {
                Some(rows) => decode_rows(
                    tool_name,
                    serde_json::json!({ "structuredContent": { "result": rows } }),
                ),
                None => Ok(vec![obj]),
            }
        }
        Value::Null => Ok(Vec::new()),
        other => Err(ToolError::InvalidResponse(format!(
            "expected rows, got {other}"
        ))),
    }
}
