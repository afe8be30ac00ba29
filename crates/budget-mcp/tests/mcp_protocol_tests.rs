//! Integration tests for the JSON-RPC protocol surface of `/mcp`.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::json;
use tower::ServiceExt;

use budget_mcp::config::Config;
use budget_mcp::provider::LedgerClient;
use budget_mcp::server::oauth::{ClientMetadata, TokenStore};
use budget_mcp::server::session::SessionRegistry;
use budget_mcp::server::transport::create_router;
use budget_mcp::tools::{self, ToolContext};

const BASE_URL: &str = "https://budget.example.org";

struct Harness {
    router: axum::Router,
    oauth: Arc<TokenStore>,
    sessions: Arc<SessionRegistry>,
}

fn build_harness_with_timeout(idle_timeout: Duration) -> Harness {
    let config = Config::for_testing(BASE_URL);
    let ledger = Arc::new(LedgerClient::new(&config).unwrap());
    let ctx = ToolContext::new(ledger, config.clone());
    let tools = tools::register_all_tools();
    let sessions = Arc::new(SessionRegistry::new(idle_timeout));
    let oauth = Arc::new(TokenStore::new());

    let router =
        create_router(tools, ctx, Arc::clone(&sessions), Arc::clone(&oauth), config);
    Harness { router, oauth, sessions }
}

fn build_harness() -> Harness {
    build_harness_with_timeout(Duration::from_secs(3600))
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

async fn post_mcp(router: &axum::Router, payload: serde_json::Value) -> axum::response::Response {
    post_mcp_raw(router, payload.to_string(), None, None).await
}

async fn post_mcp_with_session(
    router: &axum::Router,
    payload: serde_json::Value,
    session_id: &str,
) -> axum::response::Response {
    post_mcp_raw(router, payload.to_string(), Some(session_id), None).await
}

async fn post_mcp_raw(
    router: &axum::Router,
    body: String,
    session_id: Option<&str>,
    bearer: Option<&str>,
) -> axum::response::Response {
    let mut builder = Request::post("/mcp").header("Content-Type", "application/json");
    if let Some(id) = session_id {
        builder = builder.header("Mcp-Session-Id", id);
    }
    if let Some(token) = bearer {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }
    router.clone().oneshot(builder.body(Body::from(body)).unwrap()).await.unwrap()
}

/// Run `initialize` and return the session id from the response header.
async fn initialize(router: &axum::Router) -> String {
    let response = post_mcp(
        router,
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {
                "protocolVersion": "2025-06-18",
                "clientInfo": {"name": "test-agent", "version": "0.0.1"}
            }
        }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    response.headers().get("Mcp-Session-Id").unwrap().to_str().unwrap().to_string()
}

/// Register a client and mint a valid bearer token for it.
async fn mint_token(oauth: &TokenStore) -> String {
    let client = oauth
        .register_client(ClientMetadata {
            client_name: Some("test-agent".into()),
            redirect_uris: vec!["https://agent.example/cb".into()],
            ..ClientMetadata::default()
        })
        .await
        .unwrap();
    oauth.create_token_pair(&client.client_id, "accounts transactions").await.access_token
}

// ─── initialize ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_initialize_creates_session_and_echoes_version() {
    let h = build_harness();

    let response = post_mcp(
        &h.router,
        json!({
            "jsonrpc": "2.0",
            "id": "init-1",
            "method": "initialize",
            "params": {"protocolVersion": "2025-03-26"}
        }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let session_id = response.headers().get("Mcp-Session-Id").unwrap().to_str().unwrap();
    assert!(!session_id.is_empty());

    let json = body_json(response).await;
    assert_eq!(json["result"]["protocolVersion"], "2025-03-26");
    assert_eq!(json["result"]["serverInfo"]["name"], "budget-mcp");
    assert_eq!(
        json["result"]["protectedResourceMetadata"]["resource"],
        format!("{BASE_URL}/mcp")
    );
    assert_eq!(h.sessions.count().await, 1);
}

#[tokio::test]
async fn test_initialize_defaults_to_latest_version() {
    let h = build_harness();

    let response = post_mcp(
        &h.router,
        json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}),
    )
    .await;

    let json = body_json(response).await;
    assert_eq!(json["result"]["protocolVersion"], "2025-06-18");
}

#[tokio::test]
async fn test_initialize_with_unknown_version_creates_no_session() {
    let h = build_harness();

    let response = post_mcp(
        &h.router,
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {"protocolVersion": "9999-01-01"}
        }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("Mcp-Session-Id").is_none());
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], -32002);
    assert_eq!(h.sessions.count().await, 0);
}

#[tokio::test]
async fn test_unsupported_version_header_is_rejected() {
    let h = build_harness();
    let session_id = initialize(&h.router).await;

    let response = post_mcp_raw(
        &h.router,
        json!({"jsonrpc": "2.0", "id": 2, "method": "ping"}).to_string(),
        Some(&session_id),
        None,
    )
    .await;
    // Sanity: ping works without the version header.
    assert_eq!(body_json(response).await["result"], json!({}));

    let response = h
        .router
        .clone()
        .oneshot(
            Request::post("/mcp")
                .header("Content-Type", "application/json")
                .header("Mcp-Session-Id", &session_id)
                .header("MCP-Protocol-Version", "1999-12-31")
                .body(Body::from(json!({"jsonrpc": "2.0", "id": 3, "method": "ping"}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], -32002);
}

// ─── Envelope validation ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_malformed_json_is_parse_error() {
    let h = build_harness();

    let response = post_mcp_raw(&h.router, "{not json".to_string(), None, None).await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], -32700);
    assert!(json["id"].is_null());
}

#[tokio::test]
async fn test_wrong_jsonrpc_version_is_invalid_request() {
    let h = build_harness();

    let response =
        post_mcp(&h.router, json!({"jsonrpc": "1.0", "id": 1, "method": "ping"})).await;

    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], -32600);
}

#[tokio::test]
async fn test_wrong_content_type_is_rejected() {
    let h = build_harness();

    let response = h
        .router
        .oneshot(
            Request::post("/mcp")
                .header("Content-Type", "text/plain")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

// ─── Session enforcement ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_request_without_session_header_fails() {
    let h = build_harness();

    let response = post_mcp(&h.router, json!({"jsonrpc": "2.0", "id": 1, "method": "ping"})).await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], -32000);
    assert!(json["error"]["message"].as_str().unwrap().contains("Session ID required"));
}

#[tokio::test]
async fn test_unknown_session_id_fails() {
    let h = build_harness();

    let response = post_mcp_with_session(
        &h.router,
        json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}),
        "00000000-0000-4000-8000-000000000000",
    )
    .await;

    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], -32000);
    assert!(json["error"]["message"].as_str().unwrap().contains("Session not found"));
}

#[tokio::test]
async fn test_idle_session_expires_to_not_found() {
    let h = build_harness_with_timeout(Duration::ZERO);
    let session_id = initialize(&h.router).await;

    let closed = h.sessions.sweep_idle().await;
    assert_eq!(closed, 1);

    let response = post_mcp_with_session(
        &h.router,
        json!({"jsonrpc": "2.0", "id": 2, "method": "ping"}),
        &session_id,
    )
    .await;

    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], -32000);
    assert!(json["error"]["message"].as_str().unwrap().contains("Session not found"));
}

#[tokio::test]
async fn test_notification_is_accepted_with_no_body() {
    let h = build_harness();
    let session_id = initialize(&h.router).await;

    let response = post_mcp_with_session(
        &h.router,
        json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
        &session_id,
    )
    .await;

    assert_eq!(response.status(), StatusCode::ACCEPTED);
}

// ─── tools/list ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_tools_list_requires_no_bearer_and_is_stable() {
    let h = build_harness();
    let session_id = initialize(&h.router).await;

    let mut first: Option<serde_json::Value> = None;
    for _ in 0..2 {
        let response = post_mcp_with_session(
            &h.router,
            json!({"jsonrpc": "2.0", "id": 7, "method": "tools/list"}),
            &session_id,
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;

        let tools = json["result"]["tools"].as_array().unwrap().clone();
        let names: Vec<&str> = tools.iter().map(|t| t["name"].as_str().unwrap()).collect();
        assert!(names.contains(&"echo"));
        assert!(names.contains(&"summary.today"));
        assert!(names.contains(&"projection.month"));
        assert!(names.contains(&"transactions.query"));

        let echo = tools.iter().find(|t| t["name"] == "echo").unwrap();
        assert_eq!(echo["requiresAuth"], false);
        let summary = tools.iter().find(|t| t["name"] == "summary.today").unwrap();
        assert_eq!(summary["requiresAuth"], true);
        assert!(summary["inputSchema"]["type"] == "object");

        // Idempotent: identical descriptor set on repeat calls.
        match first {
            None => first = Some(json["result"].clone()),
            Some(ref prev) => assert_eq!(prev, &json["result"]),
        }
    }
}

// ─── tools/call ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_public_tool_call_without_bearer() {
    let h = build_harness();
    let session_id = initialize(&h.router).await;

    let response = post_mcp_with_session(
        &h.router,
        json!({
            "jsonrpc": "2.0",
            "id": 3,
            "method": "tools/call",
            "params": {"name": "echo", "arguments": {"message": "hello budget"}}
        }),
        &session_id,
    )
    .await;

    let json = body_json(response).await;
    assert_eq!(json["result"]["content"][0]["text"], "hello budget");
}

#[tokio::test]
async fn test_protected_tool_without_bearer_is_auth_required() {
    let h = build_harness();
    let session_id = initialize(&h.router).await;

    let response = post_mcp_with_session(
        &h.router,
        json!({
            "jsonrpc": "2.0",
            "id": 4,
            "method": "tools/call",
            "params": {"name": "summary.today", "arguments": {}}
        }),
        &session_id,
    )
    .await;

    // JSON-RPC error, not an HTTP 401.
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], -32001);
}

#[tokio::test]
async fn test_protected_tool_with_valid_bearer_succeeds() {
    let h = build_harness();
    let session_id = initialize(&h.router).await;
    let token = mint_token(&h.oauth).await;

    let response = post_mcp_raw(
        &h.router,
        json!({
            "jsonrpc": "2.0",
            "id": 5,
            "method": "tools/call",
            "params": {"name": "summary.today", "arguments": {}}
        })
        .to_string(),
        Some(&session_id),
        Some(&token),
    )
    .await;

    let json = body_json(response).await;
    let text = json["result"]["content"][0]["text"].as_str().unwrap();
    let summary: serde_json::Value = serde_json::from_str(text).unwrap();
    assert!(summary["summary"]["total_spent"].is_number());
}

#[tokio::test]
async fn test_revoked_token_is_auth_required() {
    let h = build_harness();
    let session_id = initialize(&h.router).await;
    let token = mint_token(&h.oauth).await;
    h.oauth.revoke_token(&token).await;

    let response = post_mcp_raw(
        &h.router,
        json!({
            "jsonrpc": "2.0",
            "id": 6,
            "method": "tools/call",
            "params": {"name": "transactions.query", "arguments": {}}
        })
        .to_string(),
        Some(&session_id),
        Some(&token),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], -32001);
}

#[tokio::test]
async fn test_unknown_tool_is_not_found() {
    let h = build_harness();
    let session_id = initialize(&h.router).await;

    let response = post_mcp_with_session(
        &h.router,
        json!({
            "jsonrpc": "2.0",
            "id": 8,
            "method": "tools/call",
            "params": {"name": "no.such.tool", "arguments": {}}
        }),
        &session_id,
    )
    .await;

    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], -32601);
}

#[tokio::test]
async fn test_invalid_arguments_are_invalid_params() {
    let h = build_harness();
    let session_id = initialize(&h.router).await;
    let token = mint_token(&h.oauth).await;

    let response = post_mcp_raw(
        &h.router,
        json!({
            "jsonrpc": "2.0",
            "id": 9,
            "method": "tools/call",
            "params": {"name": "transactions.query", "arguments": {"since": "not-a-date"}}
        })
        .to_string(),
        Some(&session_id),
        Some(&token),
    )
    .await;

    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], -32602);
}

// ─── Other methods ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_unknown_method_is_not_found() {
    let h = build_harness();
    let session_id = initialize(&h.router).await;

    let response = post_mcp_with_session(
        &h.router,
        json!({"jsonrpc": "2.0", "id": 10, "method": "resources/subscribe"}),
        &session_id,
    )
    .await;

    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], -32601);
}

#[tokio::test]
async fn test_resource_and_prompt_listing_are_empty() {
    let h = build_harness();
    let session_id = initialize(&h.router).await;

    let response = post_mcp_with_session(
        &h.router,
        json!({"jsonrpc": "2.0", "id": 11, "method": "resources/list"}),
        &session_id,
    )
    .await;
    assert_eq!(body_json(response).await["result"]["resources"], json!([]));

    let response = post_mcp_with_session(
        &h.router,
        json!({"jsonrpc": "2.0", "id": 12, "method": "prompts/list"}),
        &session_id,
    )
    .await;
    assert_eq!(body_json(response).await["result"]["prompts"], json!([]));
}

// ─── CORS / origin enforcement ───────────────────────────────────────────────

#[tokio::test]
async fn test_preflight_is_no_content_with_vary_origin() {
    let h = build_harness();

    let response = h
        .router
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/mcp")
                .header("Origin", "https://claude.ai")
                .header("Access-Control-Request-Method", "POST")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let headers = response.headers();
    assert_eq!(headers.get("Vary").unwrap(), "Origin");
    assert_eq!(headers.get("Access-Control-Allow-Origin").unwrap(), "https://claude.ai");
    assert_eq!(headers.get("Access-Control-Max-Age").unwrap(), "3600");
    assert!(
        headers
            .get("Access-Control-Expose-Headers")
            .unwrap()
            .to_str()
            .unwrap()
            .contains("Mcp-Session-Id")
    );
}

#[tokio::test]
async fn test_disallowed_origin_is_forbidden() {
    let h = build_harness();

    let response = h
        .router
        .oneshot(
            Request::post("/mcp")
                .header("Content-Type", "application/json")
                .header("Origin", "https://evil.example")
                .body(Body::from(
                    json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_allowed_origin_gets_credentialed_cors_headers() {
    let h = build_harness();

    let response = h
        .router
        .oneshot(
            Request::get("/health")
                .header("Origin", "http://localhost:3000")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers.get("Access-Control-Allow-Origin").unwrap(), "http://localhost:3000");
    assert_eq!(headers.get("Access-Control-Allow-Credentials").unwrap(), "true");
}
