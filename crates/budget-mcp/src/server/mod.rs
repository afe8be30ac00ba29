//! MCP server implementation.
//!
//! Composes the token store, session registry, tool registry, dispatcher,
//! and HTTP transport into one process-lifetime server object. All shared
//! state is constructed here and passed down explicitly; there are no
//! module-level singletons.

pub mod dispatch;
pub mod oauth;
pub mod session;
pub mod transport;

use std::net::SocketAddr;
use std::sync::Arc;

use crate::config::{Config, defaults};
use crate::provider::LedgerClient;
use crate::tools::{self, McpTool, ToolContext};

use oauth::TokenStore;
use session::SessionRegistry;

/// Remote MCP server for the household budget.
pub struct McpServer {
    config: Config,
    ctx: ToolContext,
    tools: Vec<Box<dyn McpTool>>,
    sessions: Arc<SessionRegistry>,
    oauth: Arc<TokenStore>,
}

impl McpServer {
    /// Create a new MCP server.
    ///
    /// # Errors
    ///
    /// Returns error if the provider client cannot be constructed.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let ledger = Arc::new(LedgerClient::new(&config)?);
        let ctx = ToolContext::new(ledger, config.clone());
        let tools = tools::register_all_tools();
        let sessions = Arc::new(SessionRegistry::new(config.session_timeout));
        let oauth = Arc::new(TokenStore::new());

        Ok(Self { config, ctx, tools, sessions, oauth })
    }

    /// Run the server in HTTP mode until shutdown.
    ///
    /// # Errors
    ///
    /// Returns error on bind or serve failure.
    pub async fn run_http(self) -> anyhow::Result<()> {
        tracing::info!(port = self.config.port, "Starting MCP server");
        tracing::info!("Registered {} tools", self.tools.len());

        // Background maintenance for the process lifetime.
        Arc::clone(&self.sessions).start_sweep_task(defaults::SESSION_SWEEP_INTERVAL);
        Arc::clone(&self.oauth).start_cleanup_task();

        let sessions = Arc::clone(&self.sessions);
        let router = transport::create_router(
            self.tools,
            self.ctx,
            Arc::clone(&self.sessions),
            self.oauth,
            self.config.clone(),
        );

        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.port));
        tracing::info!("HTTP server listening on http://{}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router).with_graceful_shutdown(shutdown_signal()).await?;

        // Tear down sessions so bound SSE channels terminate promptly.
        sessions.close_all().await;

        tracing::info!("HTTP server shut down");
        Ok(())
    }

    /// List all registered tools.
    #[must_use]
    pub fn list_tools(&self) -> Vec<(&str, &str)> {
        self.tools.iter().map(|t| (t.name(), t.description())).collect()
    }
}

impl std::fmt::Debug for McpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpServer").field("tools", &self.tools.len()).finish()
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install CTRL+C handler");
        return;
    }
    tracing::info!("Received shutdown signal");
}
