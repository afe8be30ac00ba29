//! HTTP transport for the MCP server.
//!
//! A single `/mcp` endpoint accepts POST (one JSON-RPC message, one
//! response) and GET (the session's SSE channel), next to the OAuth and
//! discovery endpoints. Origin enforcement is an explicit allow-list:
//! agent front ends make credentialed requests, which rules out wildcard
//! CORS responses.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    middleware::{self, Next},
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use futures::Stream;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::server::dispatch::{self, DispatchOutcome, JsonRpcRequest, JsonRpcResponse, codes};
use crate::server::oauth::{TokenStore, handlers as oauth_handlers};
use crate::server::session::SessionRegistry;
use crate::tools::{McpTool, ToolContext};

/// Preflight cache lifetime.
const CORS_MAX_AGE_SECS: u64 = 3600;

/// SSE keep-alive ping interval.
const SSE_KEEP_ALIVE: Duration = Duration::from_secs(15);

/// Shared state for HTTP handlers.
///
/// The transport holds references to the session registry and OAuth store;
/// both are constructed once at startup and live for the process lifetime.
pub struct AppState {
    pub tools: Vec<Box<dyn McpTool>>,
    pub ctx: ToolContext,
    pub sessions: Arc<SessionRegistry>,
    pub oauth: Arc<TokenStore>,
    pub config: Config,
}

/// Create the HTTP router.
pub fn create_router(
    tools: Vec<Box<dyn McpTool>>,
    ctx: ToolContext,
    sessions: Arc<SessionRegistry>,
    oauth: Arc<TokenStore>,
    config: Config,
) -> Router {
    let state = Arc::new(AppState { tools, ctx, sessions, oauth, config });

    Router::new()
        .route("/", get(health_check))
        .route("/health", get(health_check))
        // Streamable HTTP transport - single endpoint
        .route("/mcp", post(handle_mcp_post).get(handle_mcp_get).options(handle_preflight))
        // Discovery
        .route(
            "/.well-known/oauth-authorization-server",
            get(oauth_handlers::handle_auth_server_metadata),
        )
        .route(
            "/.well-known/oauth-protected-resource",
            get(oauth_handlers::handle_protected_resource),
        )
        .route("/.well-known/mcp.json", get(handle_mcp_manifest))
        // OAuth
        .route("/oauth/register", post(oauth_handlers::handle_register))
        .route("/oauth/authorize", get(oauth_handlers::handle_authorize))
        .route("/oauth/token", post(oauth_handlers::handle_token))
        .route("/oauth/revoke", post(oauth_handlers::handle_revoke))
        .layer(middleware::from_fn_with_state(Arc::clone(&state), enforce_origin))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Resolve the externally visible base URL for discovery documents and
/// redirect targets.
///
/// A pinned public URL wins; otherwise trust the standard forwarded headers
/// a TLS-terminating proxy sets, falling back to the literal Host.
#[must_use]
pub fn external_base_url(config: &Config, headers: &HeaderMap) -> String {
    if let Some(ref url) = config.public_url {
        return url.trim_end_matches('/').to_string();
    }

    let proto = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("http");
    let host = headers
        .get("x-forwarded-host")
        .or_else(|| headers.get(header::HOST))
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");

    format!("{proto}://{host}")
}

// ─── Origin enforcement ──────────────────────────────────────────────────────

/// Allow-list CORS middleware.
///
/// Preflights answer 204 with `Vary: Origin` and a bounded max-age; actual
/// requests from a disallowed origin are rejected outright.
async fn enforce_origin(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let origin = request
        .headers()
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string);

    let allowed = origin
        .as_deref()
        .map(|o| state.config.allowed_origins.iter().any(|a| a == o));

    if request.method() == Method::OPTIONS {
        let mut response = StatusCode::NO_CONTENT.into_response();
        apply_cors_headers(response.headers_mut(), origin.as_deref(), allowed);
        return response;
    }

    if allowed == Some(false) {
        tracing::warn!(origin = %origin.as_deref().unwrap_or_default(), "Rejected origin");
        return (
            StatusCode::FORBIDDEN,
            Json(serde_json::json!({"error": "Invalid origin"})),
        )
            .into_response();
    }

    let mut response = next.run(request).await;
    apply_cors_headers(response.headers_mut(), origin.as_deref(), allowed);
    response
}

fn apply_cors_headers(
    headers: &mut HeaderMap,
    origin: Option<&str>,
    allowed: Option<bool>,
) {
    if allowed == Some(true) {
        if let Some(value) = origin.and_then(|o| HeaderValue::from_str(o).ok()) {
            headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
            headers
                .insert(header::ACCESS_CONTROL_ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
        }
    }
    headers.insert(header::VARY, HeaderValue::from_static("Origin"));
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(
            "Content-Type, Accept, Authorization, Mcp-Session-Id, MCP-Protocol-Version",
        ),
    );
    headers.insert(
        header::ACCESS_CONTROL_EXPOSE_HEADERS,
        HeaderValue::from_static("Mcp-Session-Id"),
    );
    if let Ok(value) = HeaderValue::from_str(&CORS_MAX_AGE_SECS.to_string()) {
        headers.insert(header::ACCESS_CONTROL_MAX_AGE, value);
    }
}

async fn handle_preflight() -> StatusCode {
    // Headers are attached by the middleware; nothing to do here.
    StatusCode::NO_CONTENT
}

// ─── Health and discovery ────────────────────────────────────────────────────

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "budget-mcp",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// `GET /.well-known/mcp.json` — MCP endpoint advertisement.
async fn handle_mcp_manifest(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let base_url = external_base_url(&state.config, &headers);
    Json(serde_json::json!({
        "name": "budget-mcp",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "mcp": format!("{base_url}/mcp")
        },
        "transport": ["streamable-http"],
        "authorization": {
            "type": "oauth2",
            "authorization_servers": [base_url]
        }
    }))
}

// ─── MCP endpoint ────────────────────────────────────────────────────────────

/// Handle POST requests to /mcp (one JSON-RPC message per request).
async fn handle_mcp_post(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .unwrap_or_default()
        .trim();
    if content_type != "application/json" {
        return (StatusCode::UNSUPPORTED_MEDIA_TYPE, "Content-Type must be application/json")
            .into_response();
    }

    let request: JsonRpcRequest = match serde_json::from_str(&body) {
        Ok(request) => request,
        Err(e) => {
            return Json(JsonRpcResponse::error(
                None,
                codes::PARSE_ERROR,
                format!("Parse error: {e}"),
            ))
            .into_response();
        }
    };

    tracing::debug!(method = %request.method, "Handling MCP POST request");

    match dispatch::dispatch(&state, &headers, request).await {
        DispatchOutcome::Accepted => StatusCode::ACCEPTED.into_response(),
        DispatchOutcome::Reply(response, new_session) => {
            let mut http_response = Json(response).into_response();
            if let Some(session) = new_session {
                if let Ok(value) = HeaderValue::from_str(&session.id) {
                    http_response.headers_mut().insert("Mcp-Session-Id", value);
                }
            }
            http_response
        }
    }
}

/// Handle GET requests to /mcp (bind the session's SSE channel).
async fn handle_mcp_get(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let accept = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !accept.contains("text/event-stream") && !accept.contains("*/*") {
        return (StatusCode::NOT_ACCEPTABLE, "Accept header must allow text/event-stream")
            .into_response();
    }

    let Some(session_id) = headers.get("mcp-session-id").and_then(|v| v.to_str().ok()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(JsonRpcResponse::error(None, codes::SESSION_REQUIRED, "Session ID required")),
        )
            .into_response();
    };

    let Some(session) = state.sessions.get(session_id).await else {
        return (
            StatusCode::BAD_REQUEST,
            Json(JsonRpcResponse::error(None, codes::SESSION_REQUIRED, "Session not found")),
        )
            .into_response();
    };

    tracing::info!(session_id = %session.id, "New SSE stream connection");

    let stream = build_sse_stream(session);

    (
        [
            ("X-Accel-Buffering", "no"),
            ("Cache-Control", "no-cache, no-store, must-revalidate"),
        ],
        Sse::new(stream).keep_alive(KeepAlive::new().interval(SSE_KEEP_ALIVE).text("ping")),
    )
        .into_response()
}

/// Build the SSE stream for a session: a `connected` event, then the
/// session's outbound queue until the channel is superseded or the client
/// disconnects. Dropping the stream releases the binding via the guard.
fn build_sse_stream(
    session: Arc<crate::server::session::Session>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    let session_id = session.id.clone();
    let (mut rx, guard) = session.bind_channel();

    async_stream::stream! {
        let _guard = guard;

        let hello = serde_json::json!({"session": session_id});
        yield Ok::<_, Infallible>(Event::default().event("connected").data(hello.to_string()));

        while let Some(event) = rx.recv().await {
            yield Ok(Event::default().event(event.event).data(event.data));
        }
    }
}
