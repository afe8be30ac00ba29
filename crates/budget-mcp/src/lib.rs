//! Budget MCP Server
//!
//! A remote Model Context Protocol (MCP) server exposing a household's
//! financial tools to AI-agent clients over streamable HTTP, guarded by an
//! embedded OAuth 2.1 authorization server.
//!
//! # Features
//!
//! - **Streamable HTTP transport**: single `/mcp` endpoint, POST for
//!   JSON-RPC, GET for the per-session SSE channel
//! - **Embedded OAuth 2.1**: dynamic client registration, PKCE,
//!   refresh-token rotation, revocation, introspection
//! - **Session lifecycle**: negotiated protocol versions, idle expiry,
//!   channel superseding
//! - **Budget tools**: spending summaries, month projections, transaction
//!   search over a provider-backed ledger
//!
//! # Example
//!
//! ```no_run
//! use budget_mcp::{config::Config, server::McpServer};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     McpServer::new(config)?.run_http().await
//! }
//! ```

pub mod config;
pub mod error;
pub mod models;
pub mod provider;
pub mod server;
pub mod tools;

pub use config::Config;
pub use error::{AuthError, GrantError, ProviderError, ToolError};
pub use provider::LedgerClient;
