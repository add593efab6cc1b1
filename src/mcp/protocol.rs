use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

pub const JSONRPC_VERSION: &str = "2.0";
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";
pub const CLIENT_NAME: &str = "ludus-mcp-connection-manager";
pub const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Command launched when no explicit server command is configured.
pub const DEFAULT_SERVER_COMMAND: &str = "ludus-fastmcp";

/// Timeout for protocol-level requests (initialize, tools/list).
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Default timeout for tools/call round trips.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(120);
/// Minimum wait budget for tools that imply LLM/agent/build work.
pub const LONG_RUNNING_TOOL_TIMEOUT: Duration = Duration::from_secs(180);
/// Timeout for the lightweight tools/list health probe.
pub const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Substrings in a tool name that mark it as a long-running operation.
const LONG_RUNNING_TOOL_MARKERS: [&str; 3] = ["agent", "build", "prompt"];

/// Widen the requested timeout for tools whose name implies LLM-assisted work.
pub fn widen_tool_timeout(name: &str, requested: Duration) -> Duration {
    if LONG_RUNNING_TOOL_MARKERS
        .iter()
        .any(|marker| name.contains(marker))
    {
        requested.max(LONG_RUNNING_TOOL_TIMEOUT)
    } else {
        requested
    }
}

/// Truncate a string to at most `max` characters for error excerpts.
pub fn truncate_excerpt(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Outbound JSON-RPC 2.0 request, one per line on the server's stdin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.into(),
            params,
        }
    }
}

/// Outbound notification: carries no id and expects no response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    pub params: Value,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
        }
    }
}

/// Inbound response line from the server's stdout.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcErrorObject>,
}

/// The `error` member of a failed JSON-RPC response.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcErrorObject {
    #[serde(default)]
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

/// Tool descriptor as returned by `tools/list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Result of a `tools/call` invocation.
///
/// Tool-level failures are reported through `is_error`, never as a raised
/// error; only transport and protocol failures surface as `LudusError`.
#[derive(Debug, Clone, Serialize)]
pub struct ToolCallOutcome {
    pub tool: String,
    pub arguments: Map<String, Value>,
    pub result: String,
    pub is_error: bool,
}

impl ToolCallOutcome {
    /// Flatten a `tools/call` result: each `content` item contributes its
    /// `text` field if present, else its stringified form, joined by newlines.
    pub fn from_result(tool: &str, arguments: Map<String, Value>, result: &Value) -> Self {
        let mut output = Vec::new();
        if let Some(content) = result.get("content").and_then(Value::as_array) {
            for item in content {
                match item.get("text").and_then(Value::as_str) {
                    Some(text) => output.push(text.to_string()),
                    None => output.push(item.to_string()),
                }
            }
        }
        Self {
            tool: tool.to_string(),
            arguments,
            result: output.join("\n"),
            is_error: result
                .get("isError")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        }
    }
}
