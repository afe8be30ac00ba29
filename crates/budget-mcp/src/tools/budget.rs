//! Budget intelligence tools: summary.today, projection.month.

use std::collections::BTreeMap;

use chrono::{Datelike, Days, NaiveDate, Utc};
use serde_json::json;

use super::{CallContext, McpTool, ToolContext};
use crate::error::ToolResult;
use crate::models::{ProjectionInput, SummaryInput, Transaction};

fn pace_label(variance: f64) -> &'static str {
    if variance > 0.0 { "over" } else { "under" }
}

/// Sum of outflows in a date range, inclusive.
fn spent_between(transactions: &[Transaction], from: NaiveDate, to: NaiveDate) -> f64 {
    transactions
        .iter()
        .filter(|t| t.is_outflow() && t.date >= from && t.date <= to)
        .map(|t| t.amount)
        .sum()
}

/// Days in the month containing `date`.
fn days_in_month(date: NaiveDate) -> u32 {
    let next_month = date
        .with_day(1)
        .and_then(|d| d.checked_add_days(Days::new(32)))
        .and_then(|d| d.with_day(1));
    next_month
        .and_then(|d| d.checked_sub_days(Days::new(1)))
        .map_or(30, |last| last.day())
}

/// Today's spending summary against the daily budget.
pub struct SummaryTodayTool;

#[async_trait::async_trait]
impl McpTool for SummaryTodayTool {
    fn name(&self) -> &'static str {
        "summary.today"
    }

    fn description(&self) -> &'static str {
        "Today's spending: total, per-category breakdown, and variance against the daily budget."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "date": {
                    "type": "string",
                    "format": "date",
                    "description": "Override the reference date (defaults to today)"
                }
            }
        })
    }

    async fn execute(
        &self,
        ctx: &ToolContext,
        _call: &CallContext<'_>,
        input: serde_json::Value,
    ) -> ToolResult<String> {
        let params: SummaryInput = serde_json::from_value(input)?;
        let today = params.date.unwrap_or_else(|| Utc::now().date_naive());

        let transactions = ctx.ledger.transactions().await?;
        let todays: Vec<&Transaction> =
            transactions.iter().filter(|t| t.date == today && t.is_outflow()).collect();

        let total_spent: f64 = todays.iter().map(|t| t.amount).sum();

        // BTreeMap keeps category order stable across calls.
        let mut categories: BTreeMap<&'static str, f64> = BTreeMap::new();
        for t in &todays {
            *categories.entry(t.category().as_str()).or_insert(0.0) += t.amount;
        }

        let daily_budget = ctx.config.daily_budget;
        let variance = total_spent - daily_budget;

        let body = json!({
            "summary": {
                "date": today,
                "total_spent": total_spent,
                "categories": categories,
                "transaction_count": todays.len(),
                "vs_budget": {
                    "daily_budget": daily_budget,
                    "variance": variance,
                    "status": pace_label(variance),
                }
            }
        });
        Ok(serde_json::to_string_pretty(&body)?)
    }
}

/// Month-to-date spend projected to a full month.
pub struct ProjectionMonthTool;

#[async_trait::async_trait]
impl McpTool for ProjectionMonthTool {
    fn name(&self) -> &'static str {
        "projection.month"
    }

    fn description(&self) -> &'static str {
        "Project this month's spending from the current pace and compare against the monthly budget."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "date": {
                    "type": "string",
                    "format": "date",
                    "description": "Override the reference date (defaults to today)"
                }
            }
        })
    }

    async fn execute(
        &self,
        ctx: &ToolContext,
        _call: &CallContext<'_>,
        input: serde_json::Value,
    ) -> ToolResult<String> {
        let params: ProjectionInput = serde_json::from_value(input)?;
        let today = params.date.unwrap_or_else(|| Utc::now().date_naive());
        let month_start = today.with_day(1).unwrap_or(today);

        let transactions = ctx.ledger.transactions().await?;
        let current_spend = spent_between(&transactions, month_start, today);

        let day_of_month = today.day();
        let month_days = days_in_month(today);
        let projection_factor = f64::from(month_days) / f64::from(day_of_month.max(1));
        let projected_spend = current_spend * projection_factor;

        let budget = ctx.config.monthly_budget;
        let variance = projected_spend - budget;

        let body = json!({
            "projection": {
                "month": today.format("%Y-%m").to_string(),
                "projected_spend": (projected_spend * 100.0).round() / 100.0,
                "current_spend": (current_spend * 100.0).round() / 100.0,
                "budget": budget,
                "variance": (variance * 100.0).round() / 100.0,
                "pace": pace_label(variance),
                "days_remaining": month_days.saturating_sub(day_of_month),
            }
        });
        Ok(serde_json::to_string_pretty(&body)?)
    }
}
