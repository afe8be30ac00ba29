//! Ledger tools: search, fetch, transactions.query, transactions.sync.

use chrono::Utc;
use serde_json::json;

use super::{CallContext, McpTool, ToolContext};
use crate::error::{ToolError, ToolResult};
use crate::models::{FetchInput, SearchInput, Transaction, TransactionsQueryInput};

fn transaction_json(t: &Transaction) -> serde_json::Value {
    json!({
        "id": t.id,
        "date": t.date,
        "amount": t.amount,
        "currency": t.currency,
        "merchant": t.merchant,
        "description": t.description,
        "category": t.category().as_str(),
        "account_id": t.account_id,
        "reference": t.reference,
    })
}

/// Free-text transaction search.
pub struct SearchTool;

#[async_trait::async_trait]
impl McpTool for SearchTool {
    fn name(&self) -> &'static str {
        "search"
    }

    fn description(&self) -> &'static str {
        "Search recent transactions by free text across merchant, description and category."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Free-text query (e.g. 'groceries', 'tesco')"
                },
                "limit": {
                    "type": "integer",
                    "default": 100,
                    "description": "Maximum matches to return"
                }
            }
        })
    }

    async fn execute(
        &self,
        ctx: &ToolContext,
        call: &CallContext<'_>,
        input: serde_json::Value,
    ) -> ToolResult<String> {
        let params: SearchInput = serde_json::from_value(input)?;
        let query = params.query.to_lowercase();

        let transactions = ctx.ledger.transactions().await?;
        let results: Vec<serde_json::Value> = transactions
            .iter()
            .filter(|t| {
                query.is_empty()
                    || t.merchant.to_lowercase().contains(&query)
                    || t.description.to_lowercase().contains(&query)
                    || t.category().as_str().contains(&query)
            })
            .take(params.limit)
            .map(transaction_json)
            .collect();

        call.session.notify(
            "notifications/message",
            json!({
                "type": "search",
                "query": params.query,
                "count": results.len(),
            }),
        );

        let body = json!({"results": results, "query": params.query});
        Ok(serde_json::to_string_pretty(&body)?)
    }
}

/// Single-transaction lookup.
pub struct FetchTool;

#[async_trait::async_trait]
impl McpTool for FetchTool {
    fn name(&self) -> &'static str {
        "fetch"
    }

    fn description(&self) -> &'static str {
        "Fetch a single transaction by id."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "id": {
                    "type": "string",
                    "description": "Transaction id"
                }
            },
            "required": ["id"]
        })
    }

    async fn execute(
        &self,
        ctx: &ToolContext,
        _call: &CallContext<'_>,
        input: serde_json::Value,
    ) -> ToolResult<String> {
        let params: FetchInput = serde_json::from_value(input)?;
        if params.id.is_empty() {
            return Err(ToolError::validation("id", "must not be empty"));
        }

        let transactions = ctx.ledger.transactions().await?;
        let Some(found) = transactions.iter().find(|t| t.id == params.id) else {
            return Err(ToolError::unavailable(format!("transaction {}", params.id)));
        };

        let body = json!({"resource": transaction_json(found)});
        Ok(serde_json::to_string_pretty(&body)?)
    }
}

/// Filtered ledger slice with progress streaming.
pub struct TransactionsQueryTool;

#[async_trait::async_trait]
impl McpTool for TransactionsQueryTool {
    fn name(&self) -> &'static str {
        "transactions.query"
    }

    fn description(&self) -> &'static str {
        "Query transactions with optional date range and limit. \
         Progress updates stream over the session's SSE channel."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "since": {
                    "type": "string",
                    "format": "date",
                    "description": "Earliest booking date (inclusive, ISO 8601)"
                },
                "until": {
                    "type": "string",
                    "format": "date",
                    "description": "Latest booking date (inclusive, ISO 8601)"
                },
                "limit": {
                    "type": "integer",
                    "default": 100,
                    "description": "Maximum transactions to return"
                }
            }
        })
    }

    async fn execute(
        &self,
        ctx: &ToolContext,
        call: &CallContext<'_>,
        input: serde_json::Value,
    ) -> ToolResult<String> {
        let params: TransactionsQueryInput = serde_json::from_value(input)?;
        if let (Some(since), Some(until)) = (params.since, params.until) {
            if since > until {
                return Err(ToolError::validation("since", "must not be after 'until'"));
            }
        }

        call.progress("Fetching transactions");
        let transactions = ctx.ledger.transactions().await?;

        call.progress("Filtering results");
        let total_available = transactions.len();
        let selected: Vec<serde_json::Value> = transactions
            .iter()
            .filter(|t| params.since.is_none_or(|since| t.date >= since))
            .filter(|t| params.until.is_none_or(|until| t.date <= until))
            .take(params.limit)
            .map(transaction_json)
            .collect();

        let body = json!({
            "transactions": selected,
            "count": selected.len(),
            "total_available": total_available,
            "since": params.since,
            "until": params.until,
            "limit": params.limit,
        });
        Ok(serde_json::to_string_pretty(&body)?)
    }
}

/// Provider re-sync.
pub struct TransactionsSyncTool;

#[async_trait::async_trait]
impl McpTool for TransactionsSyncTool {
    fn name(&self) -> &'static str {
        "transactions.sync"
    }

    fn description(&self) -> &'static str {
        "Refresh the ledger from the upstream data provider and report the count."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn execute(
        &self,
        ctx: &ToolContext,
        call: &CallContext<'_>,
        _input: serde_json::Value,
    ) -> ToolResult<String> {
        call.progress("Syncing transactions from provider");
        let count = ctx.ledger.sync().await?;
        call.progress("Sync complete");

        let body = json!({
            "status": "synced",
            "transactions_synced": count,
            "last_sync": Utc::now().to_rfc3339(),
        });
        Ok(serde_json::to_string_pretty(&body)?)
    }
}
