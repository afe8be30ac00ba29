//! Error types for the budget MCP server.
//!
//! Uses `thiserror` for structured error handling with automatic `From` implementations.
//! Each failure domain gets its own enum: the provider boundary, tool execution,
//! bearer-token introspection, and the OAuth grant flows.

use std::time::Duration;

/// Errors from the financial-data provider boundary.
#[derive(thiserror::Error, Debug)]
pub enum ProviderError {
    /// HTTP transport error (connection, DNS, TLS, etc.)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Middleware error
    #[error("Middleware error: {0}")]
    Middleware(#[from] reqwest_middleware::Error),

    /// Request timeout
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// JSON parsing error
    #[error("Failed to parse provider response: {0}")]
    Parse(#[from] serde_json::Error),

    /// Unexpected HTTP status from the provider
    #[error("Unexpected status {status}: {message}")]
    UnexpectedStatus {
        /// HTTP status code
        status: u16,
        /// Response body or message
        message: String,
    },
}

impl ProviderError {
    /// Create an unexpected-status error.
    #[must_use]
    pub fn unexpected_status(status: u16, message: impl Into<String>) -> Self {
        Self::UnexpectedStatus { status, message: message.into() }
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::UnexpectedStatus { status: 500..=599, .. })
    }
}

/// Errors from MCP tool execution.
#[derive(thiserror::Error, Debug)]
pub enum ToolError {
    /// Error from the provider client
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Input validation failed
    #[error("Validation error: {message}")]
    Validation {
        /// Field that failed validation
        field: String,
        /// Validation error message
        message: String,
    },

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal tool logic error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Resource not available
    #[error("Resource unavailable: {0}")]
    Unavailable(String),
}

impl ToolError {
    /// Create a validation error.
    #[must_use]
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation { field: field.into(), message: message.into() }
    }

    /// Create an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create an unavailable error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    /// True when the failure is the caller's fault (maps to JSON-RPC invalid params).
    #[must_use]
    pub const fn is_invalid_input(&self) -> bool {
        matches!(self, Self::Validation { .. } | Self::Serialization(_))
    }

    /// Convert to a stable, client-safe message for the MCP response.
    ///
    /// Internal detail (provider URLs, backtraces) must not leak here.
    #[must_use]
    pub fn to_user_message(&self) -> String {
        match self {
            Self::Provider(_) => "Upstream data provider is unavailable".to_string(),
            Self::Validation { field, message } => {
                format!("Invalid input for '{field}': {message}")
            }
            Self::Serialization(e) => format!("Invalid arguments: {e}"),
            Self::Unavailable(what) => format!("Not available: {what}"),
            Self::Internal(_) => "Internal error".to_string(),
        }
    }
}

/// Bearer-token introspection failures.
///
/// All variants map onto the same JSON-RPC "authorization required" code so
/// clients know to start the OAuth flow; the variant is logged server-side.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum AuthError {
    /// No `Authorization: Bearer` header on the request
    #[error("Missing bearer token")]
    MissingToken,

    /// Token is not one this server issued
    #[error("Unknown bearer token")]
    UnknownToken,

    /// Token lifetime elapsed
    #[error("Bearer token expired")]
    ExpiredToken,

    /// Token was revoked
    #[error("Bearer token revoked")]
    RevokedToken,

    /// The client the token was issued to no longer exists
    #[error("Token client no longer registered")]
    UnknownClient,
}

/// OAuth grant-flow failures.
///
/// Each variant carries the RFC 6749 error code used in the HTTP response.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum GrantError {
    /// Registration metadata failed validation
    #[error("Invalid client metadata: {0}")]
    InvalidMetadata(String),

    /// Unknown client id
    #[error("Unknown client")]
    InvalidClient,

    /// Redirect URI not in the client's registered set
    #[error("redirect_uri not registered for this client")]
    InvalidRedirectUri,

    /// Code is unknown, already consumed, or bound to another client
    #[error("Invalid or consumed authorization code")]
    InvalidGrant,

    /// Code lifetime elapsed
    #[error("Authorization code expired")]
    ExpiredGrant,

    /// PKCE verifier does not match the stored challenge
    #[error("PKCE verification failed")]
    PkceMismatch,

    /// Refresh token was revoked
    #[error("Refresh token revoked")]
    Revoked,

    /// grant_type outside {authorization_code, refresh_token}
    #[error("Unsupported grant type")]
    UnsupportedGrantType,
}

impl GrantError {
    /// RFC 6749 §5.2 error code for the token/registration response body.
    #[must_use]
    pub const fn oauth_code(&self) -> &'static str {
        match self {
            Self::InvalidMetadata(_) => "invalid_client_metadata",
            Self::InvalidClient => "invalid_client",
            Self::InvalidRedirectUri | Self::PkceMismatch => "invalid_request",
            Self::InvalidGrant | Self::ExpiredGrant | Self::Revoked => "invalid_grant",
            Self::UnsupportedGrantType => "unsupported_grant_type",
        }
    }
}

/// Result type alias for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Result type alias for tool operations.
pub type ToolResult<T> = Result<T, ToolError>;
