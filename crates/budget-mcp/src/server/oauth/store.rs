//! In-memory token store backing the OAuth authorization service.
//!
//! Holds clients, authorization codes, and access/refresh tokens behind
//! `RwLock`ed maps: reads (introspection) never block each other, and the
//! single-use operations (code consumption, refresh rotation) run entirely
//! under the write lock so two racing requests cannot both succeed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use url::Url;

use crate::error::{AuthError, GrantError};

use super::types::{AccessToken, AuthCode, CodeChallengeMethod, OAuthClient, RefreshToken};

/// Auth code lifetime: 10 minutes.
pub const AUTH_CODE_LIFETIME: u64 = 600;
/// Access token lifetime: 1 hour.
const ACCESS_TOKEN_LIFETIME: u64 = 3600;
/// Refresh token lifetime: 30 days.
const REFRESH_TOKEN_LIFETIME: u64 = 30 * 24 * 3600;
/// Cleanup interval: 5 minutes.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

/// Known agent-platform callback URLs merged into every registration.
///
/// Exact-match validation still applies; this only widens the registered set
/// so platform redirects work without per-deployment configuration.
const PLATFORM_CALLBACKS: &[&str] = &[
    "https://claude.ai/api/mcp/auth_callback",
    "https://www.claude.ai/api/mcp/auth_callback",
];

/// Registration request metadata (RFC 7591 subset).
#[derive(Debug, Default, Clone)]
pub struct ClientMetadata {
    pub client_name: Option<String>,
    pub redirect_uris: Vec<String>,
    pub grant_types: Option<Vec<String>>,
    pub response_types: Option<Vec<String>>,
    pub scope: Option<String>,
    pub token_endpoint_auth_method: Option<String>,
}

/// Identity attached to a validated bearer token.
#[derive(Debug, Clone)]
pub struct AuthInfo {
    pub client_id: String,
    pub scope: String,
}

/// A token pair returned from token creation/refresh.
#[derive(Debug)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
    pub scope: String,
}

/// In-memory OAuth state store.
#[derive(Clone)]
pub struct TokenStore {
    clients: Arc<RwLock<HashMap<String, OAuthClient>>>,
    auth_codes: Arc<RwLock<HashMap<String, AuthCode>>>,
    access_tokens: Arc<RwLock<HashMap<String, AccessToken>>>,
    refresh_tokens: Arc<RwLock<HashMap<String, RefreshToken>>>,
}

impl TokenStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            clients: Arc::new(RwLock::new(HashMap::new())),
            auth_codes: Arc::new(RwLock::new(HashMap::new())),
            access_tokens: Arc::new(RwLock::new(HashMap::new())),
            refresh_tokens: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Generate a random token using two UUIDs (256 bits).
    fn generate_token() -> String {
        format!("{}{}", uuid::Uuid::new_v4().simple(), uuid::Uuid::new_v4().simple())
    }

    /// Register a new OAuth client (Dynamic Client Registration).
    ///
    /// Validates redirect URIs (absolute HTTPS, or HTTP on a loopback host)
    /// and augments the set with the known platform callbacks. A secret is
    /// generated only for confidential clients.
    ///
    /// # Errors
    ///
    /// Returns `GrantError::InvalidMetadata` when the redirect set is empty
    /// or contains a non-conforming URL.
    pub async fn register_client(&self, meta: ClientMetadata) -> Result<OAuthClient, GrantError> {
        if meta.redirect_uris.is_empty() {
            return Err(GrantError::InvalidMetadata("redirect_uris is required".into()));
        }
        for uri in &meta.redirect_uris {
            validate_redirect_uri(uri)?;
        }

        let mut redirect_uris = meta.redirect_uris;
        for callback in PLATFORM_CALLBACKS {
            if !redirect_uris.iter().any(|u| u == callback) {
                redirect_uris.push((*callback).to_string());
            }
        }

        let auth_method =
            meta.token_endpoint_auth_method.unwrap_or_else(|| "none".to_string());
        let client_secret =
            (auth_method != "none").then(Self::generate_token);

        let client = OAuthClient {
            client_id: uuid::Uuid::new_v4().simple().to_string(),
            client_secret,
            client_name: meta.client_name,
            redirect_uris,
            grant_types: meta
                .grant_types
                .unwrap_or_else(|| vec!["authorization_code".into(), "refresh_token".into()]),
            response_types: meta.response_types.unwrap_or_else(|| vec!["code".into()]),
            scope: meta.scope.unwrap_or_else(|| "accounts transactions".into()),
            token_endpoint_auth_method: auth_method,
            client_id_issued_at: chrono::Utc::now().timestamp(),
        };

        self.clients.write().await.insert(client.client_id.clone(), client.clone());
        Ok(client)
    }

    /// Look up a client by ID.
    pub async fn get_client(&self, client_id: &str) -> Option<OAuthClient> {
        self.clients.read().await.get(client_id).cloned()
    }

    /// Create an authorization code for an approved request.
    pub async fn create_auth_code(
        &self,
        client_id: String,
        redirect_uri: String,
        code_challenge: String,
        challenge_method: CodeChallengeMethod,
        scope: String,
    ) -> String {
        let code = Self::generate_token();

        self.auth_codes.write().await.insert(
            code.clone(),
            AuthCode {
                client_id,
                redirect_uri,
                code_challenge,
                challenge_method,
                scope,
                created_at: Instant::now(),
                consumed: false,
            },
        );

        code
    }

    /// Consume an authorization code (one-time use).
    ///
    /// The consumed flag is flipped under the write lock, so of two racing
    /// exchanges exactly one observes an unconsumed code.
    ///
    /// # Errors
    ///
    /// `InvalidGrant` for unknown or already-consumed codes, `ExpiredGrant`
    /// past the code lifetime.
    pub async fn consume_auth_code(&self, code: &str) -> Result<AuthCodeInfo, GrantError> {
        let mut codes = self.auth_codes.write().await;
        let auth_code = codes.get_mut(code).ok_or(GrantError::InvalidGrant)?;

        if auth_code.consumed {
            return Err(GrantError::InvalidGrant);
        }
        if auth_code.is_expired() {
            return Err(GrantError::ExpiredGrant);
        }

        auth_code.consumed = true;

        Ok(AuthCodeInfo {
            client_id: auth_code.client_id.clone(),
            redirect_uri: auth_code.redirect_uri.clone(),
            code_challenge: auth_code.code_challenge.clone(),
            challenge_method: auth_code.challenge_method,
            scope: auth_code.scope.clone(),
        })
    }

    /// Create an access + refresh token pair.
    pub async fn create_token_pair(&self, client_id: &str, scope: &str) -> TokenPair {
        let access = Self::generate_token();
        let refresh = Self::generate_token();

        self.access_tokens.write().await.insert(
            access.clone(),
            AccessToken {
                client_id: client_id.to_owned(),
                scope: scope.to_owned(),
                created_at: Instant::now(),
                expires_in: ACCESS_TOKEN_LIFETIME,
                revoked: false,
            },
        );

        self.refresh_tokens.write().await.insert(
            refresh.clone(),
            RefreshToken {
                client_id: client_id.to_owned(),
                access_token: access.clone(),
                scope: scope.to_owned(),
                created_at: Instant::now(),
                expires_in: REFRESH_TOKEN_LIFETIME,
                revoked: false,
            },
        );

        TokenPair {
            access_token: access,
            refresh_token: refresh,
            expires_in: ACCESS_TOKEN_LIFETIME,
            scope: scope.to_owned(),
        }
    }

    /// Validate a bearer token for a protected tool call.
    ///
    /// A token is valid iff it exists, is not expired, is not revoked, and
    /// its issuing client is still registered.
    ///
    /// # Errors
    ///
    /// The matching [`AuthError`] variant; callers map all of them onto the
    /// JSON-RPC "authorization required" code.
    pub async fn introspect(&self, token: &str) -> Result<AuthInfo, AuthError> {
        let (client_id, scope) = {
            let tokens = self.access_tokens.read().await;
            let access = tokens.get(token).ok_or(AuthError::UnknownToken)?;
            if access.revoked {
                return Err(AuthError::RevokedToken);
            }
            if access.is_expired() {
                return Err(AuthError::ExpiredToken);
            }
            (access.client_id.clone(), access.scope.clone())
        };

        if !self.clients.read().await.contains_key(&client_id) {
            return Err(AuthError::UnknownClient);
        }

        Ok(AuthInfo { client_id, scope })
    }

    /// Refresh a token pair: rotate the refresh token and revoke the old pair.
    ///
    /// The old refresh token is removed under the write lock, so of two
    /// racing refreshes exactly one succeeds.
    ///
    /// # Errors
    ///
    /// `InvalidGrant` for unknown or expired refresh tokens, `Revoked` for
    /// revoked ones.
    pub async fn refresh_token_pair(&self, refresh_token: &str) -> Result<TokenPair, GrantError> {
        let old = {
            let mut tokens = self.refresh_tokens.write().await;
            let old = tokens.remove(refresh_token).ok_or(GrantError::InvalidGrant)?;
            if old.revoked {
                return Err(GrantError::Revoked);
            }
            if old.is_expired() {
                return Err(GrantError::InvalidGrant);
            }
            old
        };

        // Old access token dies with the rotation.
        if let Some(access) = self.access_tokens.write().await.get_mut(&old.access_token) {
            access.revoked = true;
        }

        Ok(self.create_token_pair(&old.client_id, &old.scope).await)
    }

    /// Revoke a token (access or refresh), idempotently.
    ///
    /// Unknown tokens are treated as already revoked. Revoking a refresh
    /// token also revokes its paired access token.
    pub async fn revoke_token(&self, token: &str) {
        if let Some(access) = self.access_tokens.write().await.get_mut(token) {
            access.revoked = true;
        }

        let paired_access = {
            let mut tokens = self.refresh_tokens.write().await;
            tokens.get_mut(token).map(|refresh| {
                refresh.revoked = true;
                refresh.access_token.clone()
            })
        };

        if let Some(access_token) = paired_access {
            if let Some(access) = self.access_tokens.write().await.get_mut(&access_token) {
                access.revoked = true;
            }
        }
    }

    /// Start background cleanup task for expired tokens and codes.
    pub fn start_cleanup_task(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
            loop {
                interval.tick().await;
                self.cleanup_expired().await;
            }
        });
    }

    async fn cleanup_expired(&self) {
        // Consumed codes linger briefly so a replayed exchange still gets a
        // precise error, then fall out with expiry.
        {
            let mut codes = self.auth_codes.write().await;
            codes.retain(|_, code| !code.is_expired());
        }

        {
            let mut tokens = self.access_tokens.write().await;
            let before = tokens.len();
            tokens.retain(|_, token| !token.is_expired());
            let removed = before - tokens.len();
            if removed > 0 {
                tracing::debug!(count = removed, "Cleaned up expired access tokens");
            }
        }

        {
            let mut tokens = self.refresh_tokens.write().await;
            let before = tokens.len();
            tokens.retain(|_, token| !token.is_expired());
            let removed = before - tokens.len();
            if removed > 0 {
                tracing::debug!(count = removed, "Cleaned up expired refresh tokens");
            }
        }
    }
}

impl Default for TokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore").finish()
    }
}

/// Subset of auth code info returned from consume.
#[derive(Debug)]
pub struct AuthCodeInfo {
    pub client_id: String,
    pub redirect_uri: String,
    pub code_challenge: String,
    pub challenge_method: CodeChallengeMethod,
    pub scope: String,
}

/// Redirect URIs must be absolute HTTPS URLs, or HTTP on a loopback host.
fn validate_redirect_uri(uri: &str) -> Result<(), GrantError> {
    let parsed = Url::parse(uri)
        .map_err(|_| GrantError::InvalidMetadata(format!("redirect_uri is not absolute: {uri}")))?;

    match parsed.scheme() {
        "https" => Ok(()),
        "http" => {
            let loopback = matches!(parsed.host_str(), Some("localhost" | "127.0.0.1" | "[::1]"));
            if loopback {
                Ok(())
            } else {
                Err(GrantError::InvalidMetadata(format!(
                    "http redirect_uri must be loopback: {uri}"
                )))
            }
        }
        other => Err(GrantError::InvalidMetadata(format!("unsupported scheme '{other}': {uri}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(redirect_uris: &[&str]) -> ClientMetadata {
        ClientMetadata {
            client_name: Some("Test App".into()),
            redirect_uris: redirect_uris.iter().map(ToString::to_string).collect(),
            ..ClientMetadata::default()
        }
    }

    #[tokio::test]
    async fn test_client_registration_augments_platform_callbacks() {
        let store = TokenStore::new();
        let client =
            store.register_client(metadata(&["https://agent.example/callback"])).await.unwrap();

        assert!(!client.client_id.is_empty());
        assert!(client.redirect_uris.contains(&"https://agent.example/callback".to_string()));
        for callback in PLATFORM_CALLBACKS {
            assert!(client.redirect_uris.contains(&(*callback).to_string()));
        }

        let stored = store.get_client(&client.client_id).await.unwrap();
        assert_eq!(stored.client_name.as_deref(), Some("Test App"));
    }

    #[tokio::test]
    async fn test_public_client_gets_no_secret() {
        let store = TokenStore::new();
        let client = store.register_client(metadata(&["https://a.example/cb"])).await.unwrap();
        assert!(client.client_secret.is_none());
        assert_eq!(client.token_endpoint_auth_method, "none");
    }

    #[tokio::test]
    async fn test_confidential_client_gets_secret() {
        let store = TokenStore::new();
        let mut meta = metadata(&["https://a.example/cb"]);
        meta.token_endpoint_auth_method = Some("client_secret_post".into());
        let client = store.register_client(meta).await.unwrap();
        assert!(client.client_secret.is_some());
    }

    #[tokio::test]
    async fn test_registration_rejects_bad_redirects() {
        let store = TokenStore::new();
        for bad in ["not-a-url", "http://attacker.example/cb", "ftp://files.example/cb"] {
            let err = store.register_client(metadata(&[bad])).await.unwrap_err();
            assert!(matches!(err, GrantError::InvalidMetadata(_)), "{bad} should be rejected");
        }
        // Loopback HTTP is fine for local development tooling.
        assert!(store.register_client(metadata(&["http://localhost:3000/cb"])).await.is_ok());
        // Empty set is rejected.
        assert!(store.register_client(metadata(&[])).await.is_err());
    }

    #[tokio::test]
    async fn test_auth_code_single_use() {
        let store = TokenStore::new();

        let code = store
            .create_auth_code(
                "client1".into(),
                "https://a.example/cb".into(),
                "challenge".into(),
                CodeChallengeMethod::S256,
                "accounts transactions".into(),
            )
            .await;

        // First consume succeeds
        let info = store.consume_auth_code(&code).await.unwrap();
        assert_eq!(info.client_id, "client1");

        // Second consume fails (already used)
        assert_eq!(store.consume_auth_code(&code).await.unwrap_err(), GrantError::InvalidGrant);

        // Unknown code fails the same way
        assert_eq!(store.consume_auth_code("bogus").await.unwrap_err(), GrantError::InvalidGrant);
    }

    #[tokio::test]
    async fn test_introspection_lifecycle() {
        let store = TokenStore::new();
        let client = store.register_client(metadata(&["https://a.example/cb"])).await.unwrap();
        let pair = store.create_token_pair(&client.client_id, "accounts transactions").await;

        let info = store.introspect(&pair.access_token).await.unwrap();
        assert_eq!(info.client_id, client.client_id);
        assert_eq!(info.scope, "accounts transactions");

        assert_eq!(store.introspect("invalid").await.unwrap_err(), AuthError::UnknownToken);
    }

    #[tokio::test]
    async fn test_introspection_requires_live_client() {
        let store = TokenStore::new();
        // Token issued for a client id that was never registered.
        let pair = store.create_token_pair("ghost", "accounts").await;
        assert_eq!(
            store.introspect(&pair.access_token).await.unwrap_err(),
            AuthError::UnknownClient
        );
    }

    #[tokio::test]
    async fn test_refresh_rotates_and_invalidates() {
        let store = TokenStore::new();
        let client = store.register_client(metadata(&["https://a.example/cb"])).await.unwrap();
        let pair = store.create_token_pair(&client.client_id, "accounts").await;

        let new_pair = store.refresh_token_pair(&pair.refresh_token).await.unwrap();
        assert_ne!(new_pair.access_token, pair.access_token);
        assert_ne!(new_pair.refresh_token, pair.refresh_token);

        // Old access token is revoked by the rotation
        assert_eq!(
            store.introspect(&pair.access_token).await.unwrap_err(),
            AuthError::RevokedToken
        );

        // New access token is valid
        assert!(store.introspect(&new_pair.access_token).await.is_ok());

        // Old refresh token can't be reused
        assert_eq!(
            store.refresh_token_pair(&pair.refresh_token).await.unwrap_err(),
            GrantError::InvalidGrant
        );
    }

    #[tokio::test]
    async fn test_revoke_is_idempotent() {
        let store = TokenStore::new();
        let client = store.register_client(metadata(&["https://a.example/cb"])).await.unwrap();
        let pair = store.create_token_pair(&client.client_id, "accounts").await;

        store.revoke_token(&pair.access_token).await;
        assert_eq!(
            store.introspect(&pair.access_token).await.unwrap_err(),
            AuthError::RevokedToken
        );

        // Revoking again, or revoking garbage, is not an error
        store.revoke_token(&pair.access_token).await;
        store.revoke_token("never-issued").await;
    }

    #[tokio::test]
    async fn test_revoking_refresh_kills_access_token() {
        let store = TokenStore::new();
        let client = store.register_client(metadata(&["https://a.example/cb"])).await.unwrap();
        let pair = store.create_token_pair(&client.client_id, "accounts").await;

        store.revoke_token(&pair.refresh_token).await;

        assert_eq!(
            store.introspect(&pair.access_token).await.unwrap_err(),
            AuthError::RevokedToken
        );
        assert_eq!(
            store.refresh_token_pair(&pair.refresh_token).await.unwrap_err(),
            GrantError::Revoked
        );
    }

    #[tokio::test]
    async fn test_racing_exchanges_only_one_wins() {
        let store = Arc::new(TokenStore::new());
        let code = store
            .create_auth_code(
                "client1".into(),
                "https://a.example/cb".into(),
                "challenge".into(),
                CodeChallengeMethod::S256,
                "accounts".into(),
            )
            .await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            let code = code.clone();
            handles.push(tokio::spawn(async move { store.consume_auth_code(&code).await.is_ok() }));
        }

        let mut wins = 0;
        for handle in handles {
            if handle.await.unwrap() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);
    }
}
