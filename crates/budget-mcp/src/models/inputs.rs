//! Input models for MCP tool parameters.
//!
//! Deserialized from `tools/call` arguments; a failure here surfaces to the
//! caller as a JSON-RPC invalid-params error.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Input for the echo tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EchoInput {
    /// Message to echo back.
    #[serde(default)]
    pub message: String,
}

/// Input for free-text transaction search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchInput {
    /// Free-text query matched against merchant, description and category.
    #[serde(default)]
    pub query: String,

    /// Maximum matches to return.
    #[serde(default = "default_limit")]
    pub limit: usize,
}

/// Input for fetching a single transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchInput {
    /// Transaction id.
    pub id: String,
}

/// Input for `transactions.query`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionsQueryInput {
    /// Earliest booking date (inclusive).
    #[serde(default)]
    pub since: Option<NaiveDate>,

    /// Latest booking date (inclusive).
    #[serde(default)]
    pub until: Option<NaiveDate>,

    /// Maximum transactions to return.
    #[serde(default = "default_limit")]
    pub limit: usize,
}

/// Input for `summary.today` (no parameters today, kept for schema symmetry).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SummaryInput {
    /// Override the "today" date, mainly for deterministic tests.
    #[serde(default)]
    pub date: Option<NaiveDate>,
}

/// Input for `projection.month`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectionInput {
    /// Override the reference date, mainly for deterministic tests.
    #[serde(default)]
    pub date: Option<NaiveDate>,
}

fn default_limit() -> usize {
    100
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_input_defaults() {
        let input: TransactionsQueryInput = serde_json::from_str("{}").unwrap();
        assert!(input.since.is_none());
        assert_eq!(input.limit, 100);
    }

    #[test]
    fn test_query_input_parses_dates() {
        let input: TransactionsQueryInput =
            serde_json::from_value(serde_json::json!({"since": "2025-01-01", "limit": 5})).unwrap();
        assert_eq!(input.since, NaiveDate::from_ymd_opt(2025, 1, 1));
        assert_eq!(input.limit, 5);
    }

    #[test]
    fn test_fetch_input_requires_id() {
        assert!(serde_json::from_str::<FetchInput>("{}").is_err());
    }

    #[test]
    fn test_bad_date_is_rejected() {
        let res = serde_json::from_value::<TransactionsQueryInput>(
            serde_json::json!({"since": "not-a-date"}),
        );
        assert!(res.is_err());
    }
}
