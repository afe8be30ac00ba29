//! OAuth 2.1 types for MCP authentication.

use std::time::Instant;

/// PKCE code challenge method.
///
/// S256 is required for new clients; `plain` is accepted for backward
/// compatibility with older agent front ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CodeChallengeMethod {
    #[default]
    S256,
    Plain,
}

impl CodeChallengeMethod {
    /// Parse the `code_challenge_method` request parameter.
    ///
    /// An absent parameter means `plain` per RFC 7636 §4.3.
    #[must_use]
    pub fn parse(value: Option<&str>) -> Option<Self> {
        match value {
            Some("S256") => Some(Self::S256),
            None | Some("plain") => Some(Self::Plain),
            Some(_) => None,
        }
    }
}

/// A dynamically registered OAuth client.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    pub client_id: String,
    /// Present only for confidential clients (`token_endpoint_auth_method != "none"`).
    pub client_secret: Option<String>,
    pub client_name: Option<String>,
    pub redirect_uris: Vec<String>,
    pub grant_types: Vec<String>,
    pub response_types: Vec<String>,
    pub scope: String,
    pub token_endpoint_auth_method: String,
    /// Unix timestamp for the registration response.
    pub client_id_issued_at: i64,
}

/// An authorization code issued by the authorize endpoint.
pub struct AuthCode {
    pub client_id: String,
    pub redirect_uri: String,
    pub code_challenge: String,
    pub challenge_method: CodeChallengeMethod,
    pub scope: String,
    pub created_at: Instant,
    pub consumed: bool,
}

/// An access token for protected tool calls.
pub struct AccessToken {
    pub client_id: String,
    pub scope: String,
    pub created_at: Instant,
    pub expires_in: u64,
    pub revoked: bool,
}

/// A refresh token for obtaining new access tokens.
pub struct RefreshToken {
    pub client_id: String,
    pub access_token: String,
    pub scope: String,
    pub created_at: Instant,
    pub expires_in: u64,
    pub revoked: bool,
}

impl AccessToken {
    /// Check if the token has expired.
    pub fn is_expired(&self) -> bool {
        self.created_at.elapsed().as_secs() > self.expires_in
    }
}

impl RefreshToken {
    /// Check if the token has expired.
    pub fn is_expired(&self) -> bool {
        self.created_at.elapsed().as_secs() > self.expires_in
    }
}

impl AuthCode {
    /// Check if the code has expired (10 minute lifetime).
    pub fn is_expired(&self) -> bool {
        self.created_at.elapsed().as_secs() > super::store::AUTH_CODE_LIFETIME
    }
}
