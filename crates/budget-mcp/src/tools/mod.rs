//! MCP tool implementations.
//!
//! Each tool module provides handlers that:
//! 1. Parse and validate input parameters (typed serde structs)
//! 2. Read the household ledger through the provider client
//! 3. Return a JSON-serializable result string
//!
//! Tools never perform their own authentication checks — the dispatcher has
//! already enforced `requires_auth` and hands the validated identity in via
//! [`CallContext`].

mod budget;
mod transactions;
mod utility;

pub use budget::*;
pub use transactions::*;
pub use utility::*;

use std::sync::Arc;

use crate::config::Config;
use crate::error::ToolResult;
use crate::provider::LedgerClient;
use crate::server::oauth::AuthInfo;
use crate::server::session::Session;

/// Tool execution context.
pub struct ToolContext {
    /// Ledger data client.
    pub ledger: Arc<LedgerClient>,

    /// Budget configuration.
    pub config: Config,
}

impl ToolContext {
    /// Create a new tool context.
    #[must_use]
    pub fn new(ledger: Arc<LedgerClient>, config: Config) -> Self {
        Self { ledger, config }
    }
}

/// Per-call context handed to a tool by the dispatcher.
pub struct CallContext<'a> {
    /// The caller's session; progress notifications go to its bound channel.
    pub session: &'a Arc<Session>,

    /// Validated bearer identity, present iff the tool requires auth.
    pub auth: Option<&'a AuthInfo>,
}

impl CallContext<'_> {
    /// Push a progress notification to the caller's SSE channel, if bound.
    pub fn progress(&self, message: &str) {
        self.session.notify(
            "notifications/progress",
            serde_json::json!({
                "message": message,
            }),
        );
    }
}

/// Trait for MCP tools.
#[async_trait::async_trait]
pub trait McpTool: Send + Sync {
    /// Tool name (e.g. "transactions.query").
    fn name(&self) -> &'static str;

    /// Tool description for the LLM.
    fn description(&self) -> &'static str;

    /// JSON Schema for input parameters.
    fn input_schema(&self) -> serde_json::Value;

    /// Whether calls must present a valid bearer token.
    fn requires_auth(&self) -> bool {
        true
    }

    /// Execute the tool with given input.
    async fn execute(
        &self,
        ctx: &ToolContext,
        call: &CallContext<'_>,
        input: serde_json::Value,
    ) -> ToolResult<String>;
}

/// Register all tools.
#[must_use]
pub fn register_all_tools() -> Vec<Box<dyn McpTool>> {
    vec![
        // Public (1)
        Box::new(utility::EchoTool),
        // Ledger access (4)
        Box::new(transactions::SearchTool),
        Box::new(transactions::FetchTool),
        Box::new(transactions::TransactionsQueryTool),
        Box::new(transactions::TransactionsSyncTool),
        // Budget intelligence (2)
        Box::new(budget::SummaryTodayTool),
        Box::new(budget::ProjectionMonthTool),
    ]
}
