//! OAuth 2.1 authorization server for MCP authentication.
//!
//! Implements a self-contained OAuth server embedded in the binary,
//! supporting the MCP OAuth flow used by agent front ends (Claude.ai
//! Custom Connector and the MCP Inspector).
//!
//! ## Supported Standards
//! - RFC 9728: OAuth Protected Resource Metadata
//! - RFC 8414: OAuth Authorization Server Metadata
//! - RFC 7591: Dynamic Client Registration
//! - RFC 7636: PKCE (S256, plain)
//! - RFC 6749: Authorization Code + Refresh Token Grants
//! - RFC 7009: Token Revocation

pub mod handlers;
pub mod pkce;
pub mod store;
mod types;

pub use store::{AuthInfo, ClientMetadata, TokenStore};
pub use types::CodeChallengeMethod;
