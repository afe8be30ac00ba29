//! JSON-RPC 2.0 protocol dispatcher.
//!
//! Parses inbound messages, negotiates the protocol version, routes methods
//! to handlers, and enforces the authentication boundary on tool calls.
//! Every failure becomes a JSON-RPC error with a stable code; nothing here
//! panics on client input.

use std::borrow::Cow;
use std::sync::Arc;

use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};

use crate::server::session::Session;
use crate::server::transport::{AppState, external_base_url};
use crate::tools::{CallContext, McpTool};

/// Protocol versions this server speaks, newest first.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2025-06-18", "2025-03-26"];

/// Version offered when the client does not name one.
pub const DEFAULT_PROTOCOL_VERSION: &str = SUPPORTED_PROTOCOL_VERSIONS[0];

/// JSON-RPC error codes used by this server.
///
/// -32700..-32603 are the standard codes; the -32000 block is
/// implementation-defined and kept stable so clients can branch on it:
/// `SESSION_REQUIRED` (unknown/missing/expired session) is deliberately
/// distinct from `AUTH_REQUIRED` (missing/invalid bearer token), which
/// signals that the client should start the OAuth flow.
pub mod codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
    pub const SESSION_REQUIRED: i32 = -32000;
    pub const AUTH_REQUIRED: i32 = -32001;
    pub const UNSUPPORTED_PROTOCOL_VERSION: i32 = -32002;
    pub const TOOL_FAILED: i32 = -32003;
}

/// JSON-RPC 2.0 request.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default)]
    pub jsonrpc: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
    #[serde(default)]
    pub id: Option<serde_json::Value>,
}

/// JSON-RPC 2.0 response.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: Cow<'static, str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Option<serde_json::Value>,
}

/// JSON-RPC 2.0 error.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl JsonRpcResponse {
    /// JSON-RPC version constant.
    const VERSION: &'static str = "2.0";

    #[must_use]
    pub fn success(id: Option<serde_json::Value>, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: Cow::Borrowed(Self::VERSION),
            result: Some(result),
            error: None,
            id,
        }
    }

    #[must_use]
    pub fn error(id: Option<serde_json::Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: Cow::Borrowed(Self::VERSION),
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
            id,
        }
    }
}

/// Outcome of dispatching one inbound message.
pub enum DispatchOutcome {
    /// A response body, plus the freshly created session after `initialize`
    /// (surfaced as the `Mcp-Session-Id` response header).
    Reply(JsonRpcResponse, Option<Arc<Session>>),
    /// A notification was absorbed; respond 202 with no body.
    Accepted,
}

impl DispatchOutcome {
    fn reply(response: JsonRpcResponse) -> Self {
        Self::Reply(response, None)
    }
}

/// Dispatch a parsed JSON-RPC message.
pub async fn dispatch(
    state: &Arc<AppState>,
    headers: &HeaderMap,
    req: JsonRpcRequest,
) -> DispatchOutcome {
    if req.jsonrpc != "2.0" {
        return DispatchOutcome::reply(JsonRpcResponse::error(
            req.id,
            codes::INVALID_REQUEST,
            "Invalid Request: jsonrpc must be 2.0",
        ));
    }
    if req.method.is_empty() {
        return DispatchOutcome::reply(JsonRpcResponse::error(
            req.id,
            codes::INVALID_REQUEST,
            "Invalid Request: method required",
        ));
    }

    // The version header, when present, must name a version we speak.
    if let Some(header_version) = header_str(headers, "mcp-protocol-version") {
        if !SUPPORTED_PROTOCOL_VERSIONS.contains(&header_version) {
            return DispatchOutcome::reply(JsonRpcResponse::error(
                req.id,
                codes::UNSUPPORTED_PROTOCOL_VERSION,
                format!("Unsupported protocol version: {header_version}"),
            ));
        }
    }

    if req.id.is_none() {
        handle_notification(state, headers, &req).await;
        return DispatchOutcome::Accepted;
    }

    if req.method == "initialize" {
        return handle_initialize(state, headers, req).await;
    }

    // Every non-initialize request must name its session.
    let Some(session_id) = header_str(headers, "mcp-session-id") else {
        return DispatchOutcome::reply(JsonRpcResponse::error(
            req.id,
            codes::SESSION_REQUIRED,
            "Session ID required",
        ));
    };
    let Some(session) = state.sessions.get(session_id).await else {
        return DispatchOutcome::reply(JsonRpcResponse::error(
            req.id,
            codes::SESSION_REQUIRED,
            "Session not found",
        ));
    };

    let response = match req.method.as_str() {
        "ping" => JsonRpcResponse::success(req.id, serde_json::json!({})),
        "tools/list" => handle_tools_list(req.id, &state.tools),
        "tools/call" => handle_tools_call(state, &session, headers, req.id, &req.params).await,
        "resources/list" => {
            JsonRpcResponse::success(req.id, serde_json::json!({"resources": []}))
        }
        "prompts/list" => JsonRpcResponse::success(req.id, serde_json::json!({"prompts": []})),
        other => JsonRpcResponse::error(
            req.id,
            codes::METHOD_NOT_FOUND,
            format!("Method not found: {other}"),
        ),
    };

    DispatchOutcome::reply(response)
}

async fn handle_notification(state: &Arc<AppState>, headers: &HeaderMap, req: &JsonRpcRequest) {
    match req.method.as_str() {
        "notifications/initialized" | "initialized" => {
            if let Some(session_id) = header_str(headers, "mcp-session-id") {
                if let Some(session) = state.sessions.get(session_id).await {
                    session.mark_active();
                    tracing::debug!(session_id = %session.id, "Session activated");
                }
            }
        }
        "notifications/cancelled" => {
            tracing::debug!("Client cancelled an in-flight request");
        }
        other => {
            tracing::debug!(method = %other, "Ignoring unknown notification");
        }
    }
}

async fn handle_initialize(
    state: &Arc<AppState>,
    headers: &HeaderMap,
    req: JsonRpcRequest,
) -> DispatchOutcome {
    let requested = req
        .params
        .get("protocolVersion")
        .and_then(|v| v.as_str())
        .unwrap_or(DEFAULT_PROTOCOL_VERSION);

    if !SUPPORTED_PROTOCOL_VERSIONS.contains(&requested) {
        // No session is created for a version we cannot speak.
        return DispatchOutcome::reply(JsonRpcResponse::error(
            req.id,
            codes::UNSUPPORTED_PROTOCOL_VERSION,
            format!("Unsupported protocol version: {requested}"),
        ));
    }

    let client_info = req.params.get("clientInfo").cloned().unwrap_or_default();
    let session = state.sessions.create(requested.to_string(), client_info).await;

    let base_url = external_base_url(&state.config, headers);
    let result = serde_json::json!({
        "protocolVersion": requested,
        "capabilities": {
            "tools": {"listChanged": false},
            "resources": {"subscribe": false, "listChanged": false},
            "prompts": {"listChanged": false}
        },
        "serverInfo": {
            "name": "budget-mcp",
            "version": env!("CARGO_PKG_VERSION")
        },
        "protectedResourceMetadata": {
            "resource": format!("{base_url}/mcp"),
            "authorization_servers": [base_url]
        }
    });

    DispatchOutcome::Reply(JsonRpcResponse::success(req.id, result), Some(session))
}

fn handle_tools_list(id: Option<serde_json::Value>, tools: &[Box<dyn McpTool>]) -> JsonRpcResponse {
    let tool_list: Vec<serde_json::Value> = tools
        .iter()
        .map(|t| {
            serde_json::json!({
                "name": t.name(),
                "description": t.description(),
                "inputSchema": t.input_schema(),
                "requiresAuth": t.requires_auth()
            })
        })
        .collect();

    JsonRpcResponse::success(id, serde_json::json!({"tools": tool_list}))
}

async fn handle_tools_call(
    state: &Arc<AppState>,
    session: &Arc<Session>,
    headers: &HeaderMap,
    id: Option<serde_json::Value>,
    params: &serde_json::Value,
) -> JsonRpcResponse {
    let Some(tool_name) = params.get("name").and_then(|v| v.as_str()) else {
        return JsonRpcResponse::error(id, codes::INVALID_PARAMS, "Missing 'name' parameter");
    };

    let arguments = params.get("arguments").cloned().unwrap_or(serde_json::json!({}));

    let Some(tool) = state.tools.iter().find(|t| t.name() == tool_name) else {
        return JsonRpcResponse::error(
            id,
            codes::METHOD_NOT_FOUND,
            format!("Tool not found: {tool_name}"),
        );
    };

    let auth = if tool.requires_auth() {
        let Some(token) = bearer_token(headers) else {
            return JsonRpcResponse::error(
                id,
                codes::AUTH_REQUIRED,
                "Authorization required: present a bearer token to call this tool",
            );
        };
        match state.oauth.introspect(token).await {
            Ok(info) => Some(info),
            Err(err) => {
                tracing::debug!(tool = %tool_name, reason = %err, "Rejected bearer token");
                return JsonRpcResponse::error(
                    id,
                    codes::AUTH_REQUIRED,
                    format!("Authorization required: {err}"),
                );
            }
        }
    } else {
        None
    };

    // Clients that skip the initialized acknowledgment still get to call
    // tools; the first call activates the session.
    session.mark_active();

    tracing::info!(tool = %tool_name, session_id = %session.id, "Executing tool");

    let call = CallContext { session, auth: auth.as_ref() };
    match tool.execute(&state.ctx, &call, arguments).await {
        Ok(text) => JsonRpcResponse::success(
            id,
            serde_json::json!({
                "content": [{
                    "type": "text",
                    "text": text
                }]
            }),
        ),
        Err(e) if e.is_invalid_input() => {
            JsonRpcResponse::error(id, codes::INVALID_PARAMS, e.to_user_message())
        }
        Err(e) => {
            tracing::error!(tool = %tool_name, error = %e, "Tool execution failed");
            JsonRpcResponse::error(id, codes::TOOL_FAILED, e.to_user_message())
        }
    }
}

/// Extract the bearer token from the Authorization header.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    header_str(headers, "authorization")?.strip_prefix("Bearer ")
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer abc123".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc123"));

        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Basic dXNlcg==".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);

        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }

    #[test]
    fn test_response_serialization_shape() {
        let ok = JsonRpcResponse::success(Some(serde_json::json!(1)), serde_json::json!({"a": 1}));
        let value = serde_json::to_value(&ok).unwrap();
        assert_eq!(value["jsonrpc"], "2.0");
        assert!(value.get("error").is_none());

        let err = JsonRpcResponse::error(None, codes::PARSE_ERROR, "bad json");
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value["error"]["code"], codes::PARSE_ERROR);
        assert!(value.get("result").is_none());
        // A parse error carries an explicit null id.
        assert!(value["id"].is_null());
    }

    #[test]
    fn test_supported_versions_are_ordered_newest_first() {
        assert_eq!(DEFAULT_PROTOCOL_VERSION, "2025-06-18");
        assert!(SUPPORTED_PROTOCOL_VERSIONS.contains(&"2025-03-26"));
    }
}
