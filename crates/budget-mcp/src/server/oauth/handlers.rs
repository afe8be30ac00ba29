//! OAuth 2.1 endpoint handlers for MCP authentication.
//!
//! Implements:
//! - RFC 9728: OAuth Protected Resource Metadata
//! - RFC 8414: OAuth Authorization Server Metadata
//! - RFC 7591: Dynamic Client Registration
//! - RFC 7636: PKCE (S256 required, plain accepted)
//! - RFC 6749: OAuth 2.0 Authorization Code + Refresh Token Grants
//! - RFC 7009: Token Revocation
//!
//! OAuth endpoints use plain HTTP status semantics; only the MCP endpoint
//! wraps failures in JSON-RPC envelopes.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use crate::error::GrantError;
use crate::server::transport::{AppState, external_base_url};

use super::pkce;
use super::store::{ClientMetadata, TokenPair, TokenStore};
use super::types::CodeChallengeMethod;

// ─── RFC 9728: Protected Resource Metadata ───────────────────────────────────

/// `GET /.well-known/oauth-protected-resource`
///
/// Tells clients where to find the authorization server for this resource.
pub async fn handle_protected_resource(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let base_url = external_base_url(&state.config, &headers);
    Json(serde_json::json!({
        "resource": format!("{base_url}/mcp"),
        "authorization_servers": [base_url],
        "bearer_methods_supported": ["header"],
        "scopes_supported": ["accounts", "transactions"]
    }))
}

// ─── RFC 8414: Authorization Server Metadata ─────────────────────────────────

/// `GET /.well-known/oauth-authorization-server`
///
/// Describes the OAuth endpoints and capabilities. URLs reflect the
/// externally visible scheme/host so deployments behind a TLS-terminating
/// proxy advertise correct HTTPS endpoints.
pub async fn handle_auth_server_metadata(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let base_url = external_base_url(&state.config, &headers);
    Json(serde_json::json!({
        "issuer": base_url,
        "authorization_endpoint": format!("{base_url}/oauth/authorize"),
        "token_endpoint": format!("{base_url}/oauth/token"),
        "registration_endpoint": format!("{base_url}/oauth/register"),
        "revocation_endpoint": format!("{base_url}/oauth/revoke"),
        "scopes_supported": ["accounts", "transactions"],
        "response_types_supported": ["code"],
        "grant_types_supported": ["authorization_code", "refresh_token"],
        "token_endpoint_auth_methods_supported": ["none", "client_secret_post"],
        "code_challenge_methods_supported": ["S256", "plain"]
    }))
}

// ─── RFC 7591: Dynamic Client Registration ───────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub client_name: Option<String>,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
    pub grant_types: Option<Vec<String>>,
    pub response_types: Option<Vec<String>>,
    pub scope: Option<String>,
    pub token_endpoint_auth_method: Option<String>,
}

/// `POST /oauth/register`
///
/// Register a new OAuth client dynamically. The secret, when issued, is
/// shown once in this response and never again.
pub async fn handle_register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Response {
    let meta = ClientMetadata {
        client_name: req.client_name,
        redirect_uris: req.redirect_uris,
        grant_types: req.grant_types,
        response_types: req.response_types,
        scope: req.scope,
        token_endpoint_auth_method: req.token_endpoint_auth_method,
    };

    match state.oauth.register_client(meta).await {
        Ok(client) => {
            tracing::info!(client_id = %client.client_id, "Registered OAuth client");

            let mut body = serde_json::json!({
                "client_id": client.client_id,
                "client_id_issued_at": client.client_id_issued_at,
                "client_name": client.client_name,
                "redirect_uris": client.redirect_uris,
                "grant_types": client.grant_types,
                "response_types": client.response_types,
                "scope": client.scope,
                "token_endpoint_auth_method": client.token_endpoint_auth_method
            });
            if let Some(secret) = client.client_secret {
                body["client_secret"] = serde_json::Value::String(secret);
            }

            (StatusCode::CREATED, no_store_headers(), Json(body)).into_response()
        }
        Err(err) => oauth_error(StatusCode::BAD_REQUEST, &err),
    }
}

// ─── Authorization Endpoint ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AuthorizeQuery {
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub response_type: Option<String>,
    pub state: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    pub scope: Option<String>,
}

/// `GET /oauth/authorize`
///
/// Issue an authorization code and redirect immediately. This deployment has
/// a single implicit resource owner (the household), so there is no local
/// consent page; actual account consent happens at the upstream banking
/// provider. The `state` parameter is round-tripped unmodified and is never
/// logged.
pub async fn handle_authorize(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AuthorizeQuery>,
) -> Response {
    let Some(client_id) = query.client_id.as_deref() else {
        return (StatusCode::BAD_REQUEST, "Missing client_id").into_response();
    };
    let Some(redirect_uri) = query.redirect_uri.as_deref() else {
        return (StatusCode::BAD_REQUEST, "Missing redirect_uri").into_response();
    };
    let Some(code_challenge) = query.code_challenge.as_deref() else {
        return (StatusCode::BAD_REQUEST, "Missing code_challenge").into_response();
    };

    if query.response_type.as_deref() != Some("code") {
        return (StatusCode::BAD_REQUEST, "response_type must be 'code'").into_response();
    }
    let Some(challenge_method) = CodeChallengeMethod::parse(query.code_challenge_method.as_deref())
    else {
        return (StatusCode::BAD_REQUEST, "code_challenge_method must be 'S256' or 'plain'")
            .into_response();
    };

    let Some(client) = state.oauth.get_client(client_id).await else {
        return oauth_error(StatusCode::BAD_REQUEST, &GrantError::InvalidClient);
    };

    // Exact-match validation against the registered (augmented) set.
    if !client.redirect_uris.iter().any(|u| u == redirect_uri) {
        return oauth_error(StatusCode::BAD_REQUEST, &GrantError::InvalidRedirectUri);
    }

    let scope = query.scope.as_deref().unwrap_or(&client.scope);

    let code = state
        .oauth
        .create_auth_code(
            client_id.to_owned(),
            redirect_uri.to_owned(),
            code_challenge.to_owned(),
            challenge_method,
            scope.to_owned(),
        )
        .await;

    tracing::info!(client_id = %client_id, "Issued authorization code");

    let mut redirect_url = redirect_uri.to_owned();
    redirect_url.push_str(if redirect_url.contains('?') { "&" } else { "?" });
    redirect_url.push_str(&format!("code={code}"));
    if let Some(ref oauth_state) = query.state {
        redirect_url.push_str(&format!("&state={}", url_encode(oauth_state)));
    }

    (StatusCode::FOUND, [("Location", redirect_url)]).into_response()
}

// ─── Token Endpoint ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub grant_type: String,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub code_verifier: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub refresh_token: Option<String>,
}

/// `POST /oauth/token`
///
/// Exchange authorization code for tokens, or refresh tokens.
pub async fn handle_token(
    State(state): State<Arc<AppState>>,
    axum::Form(form): axum::Form<TokenRequest>,
) -> Response {
    match form.grant_type.as_str() {
        "authorization_code" => handle_authorization_code_grant(&state.oauth, &form).await,
        "refresh_token" => handle_refresh_token_grant(&state.oauth, &form).await,
        _ => oauth_error(StatusCode::BAD_REQUEST, &GrantError::UnsupportedGrantType),
    }
}

async fn handle_authorization_code_grant(store: &TokenStore, form: &TokenRequest) -> Response {
    let Some(ref code) = form.code else {
        return token_error("invalid_request", "Missing code");
    };
    let Some(ref code_verifier) = form.code_verifier else {
        return token_error("invalid_request", "Missing code_verifier");
    };

    // Consume the auth code (one-time); no token state is committed unless
    // every check below passes, so a failed exchange leaves nothing behind.
    let auth_code = match store.consume_auth_code(code).await {
        Ok(info) => info,
        Err(err) => return oauth_error(StatusCode::BAD_REQUEST, &err),
    };

    if let Some(ref redirect_uri) = form.redirect_uri {
        if *redirect_uri != auth_code.redirect_uri {
            return token_error("invalid_grant", "redirect_uri mismatch");
        }
    }

    if let Some(ref client_id) = form.client_id {
        if *client_id != auth_code.client_id {
            return token_error("invalid_grant", "client_id mismatch");
        }
    }

    // Confidential clients must present their secret.
    if let Some(client) = store.get_client(&auth_code.client_id).await {
        if let Some(ref secret) = client.client_secret {
            if form.client_secret.as_deref() != Some(secret.as_str()) {
                return oauth_error(StatusCode::UNAUTHORIZED, &GrantError::InvalidClient);
            }
        }
    }

    if !pkce::verify(auth_code.challenge_method, code_verifier, &auth_code.code_challenge) {
        return oauth_error(StatusCode::BAD_REQUEST, &GrantError::PkceMismatch);
    }

    let pair = store.create_token_pair(&auth_code.client_id, &auth_code.scope).await;

    tracing::info!(client_id = %auth_code.client_id, "Issued token pair");

    token_success(&pair)
}

async fn handle_refresh_token_grant(store: &TokenStore, form: &TokenRequest) -> Response {
    let Some(ref refresh_token) = form.refresh_token else {
        return token_error("invalid_request", "Missing refresh_token");
    };

    match store.refresh_token_pair(refresh_token).await {
        Ok(pair) => {
            tracing::info!("Refreshed token pair");
            token_success(&pair)
        }
        Err(err) => oauth_error(StatusCode::BAD_REQUEST, &err),
    }
}

// ─── RFC 7009: Revocation Endpoint ───────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RevokeRequest {
    pub token: String,
    #[allow(dead_code)]
    pub token_type_hint: Option<String>,
}

/// `POST /oauth/revoke`
///
/// Mark a token revoked. Idempotent: revoking an unknown token succeeds,
/// per RFC 7009 §2.2.
pub async fn handle_revoke(
    State(state): State<Arc<AppState>>,
    axum::Form(form): axum::Form<RevokeRequest>,
) -> Response {
    state.oauth.revoke_token(&form.token).await;
    (StatusCode::OK, Json(serde_json::json!({"status": "revoked"}))).into_response()
}

// ─── Response helpers ────────────────────────────────────────────────────────

/// Build a token response with required OAuth 2.0 cache headers (RFC 6749 §5.1).
fn token_success(pair: &TokenPair) -> Response {
    let mut response = Json(serde_json::json!({
        "access_token": pair.access_token,
        "token_type": "Bearer",
        "expires_in": pair.expires_in,
        "refresh_token": pair.refresh_token,
        "scope": pair.scope
    }))
    .into_response();

    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    response
}

fn token_error(error: &str, description: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({
            "error": error,
            "error_description": description
        })),
    )
        .into_response()
}

fn oauth_error(status: StatusCode, err: &GrantError) -> Response {
    (
        status,
        Json(serde_json::json!({
            "error": err.oauth_code(),
            "error_description": err.to_string()
        })),
    )
        .into_response()
}

fn no_store_headers() -> [(header::HeaderName, HeaderValue); 2] {
    [
        (header::CACHE_CONTROL, HeaderValue::from_static("no-store")),
        (header::PRAGMA, HeaderValue::from_static("no-cache")),
    ]
}

/// Percent-encode a string for use in URL query parameters.
fn url_encode(s: &str) -> String {
    let mut encoded = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char);
            }
            _ => {
                encoded.push_str(&format!("%{byte:02X}"));
            }
        }
    }
    encoded
}
