//! Tool semantics over a wiremock-backed provider.
//!
//! Exercises the provider boundary contract: upstream records are
//! normalized, partial records are dropped, and upstream failures surface
//! as tool errors instead of crashing the dispatcher.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use budget_mcp::config::Config;
use budget_mcp::provider::LedgerClient;
use budget_mcp::server::session::{Session, SessionRegistry};
use budget_mcp::tools::{
    CallContext, FetchTool, McpTool, ProjectionMonthTool, SearchTool, SummaryTodayTool,
    ToolContext, TransactionsQueryTool,
};
use budget_mcp::{ToolError, tools};

fn wire_transactions() -> serde_json::Value {
    json!({
        "transactions": [
            {
                "transactionId": "mock_001",
                "bookingDate": "2025-01-01",
                "transactionAmount": {"amount": "1200.00", "currency": "GBP"},
                "creditorName": "Property Management Ltd",
                "remittanceInformationUnstructured": "Monthly rent"
            },
            {
                "transactionId": "mock_002",
                "bookingDate": "2025-01-15",
                "transactionAmount": {"amount": "45.20", "currency": "GBP"},
                "creditorName": "Tesco",
                "remittanceInformationUnstructured": "Groceries shopping"
            },
            {
                "transactionId": "mock_003",
                "bookingDate": "2025-01-15",
                "transactionAmount": {"amount": "65.00", "currency": "GBP"},
                "creditorName": "Pizza Express",
                "remittanceInformationUnstructured": "Dinner"
            },
            {
                "transactionId": "mock_004",
                "bookingDate": "2025-01-16",
                "transactionAmount": {"amount": "3.20", "currency": "GBP"},
                "creditorName": "TFL",
                "remittanceInformationUnstructured": "Travel"
            },
            {
                "transactionId": "mock_005",
                "bookingDate": "2025-01-10",
                "transactionAmount": {"amount": "-2500.00", "currency": "GBP"},
                "creditorName": "Acme Payroll",
                "remittanceInformationUnstructured": "Salary"
            },
            {
                // No amount: must be dropped, not fail the page.
                "transactionId": "mock_006",
                "bookingDate": "2025-01-12",
                "creditorName": "Broken Record"
            }
        ]
    })
}

async fn mock_provider() -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/accounts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accounts": [{"id": "acc-1", "name": "Main", "currency": "GBP"}]
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/accounts/acc-1/transactions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(wire_transactions()))
        .mount(&server)
        .await;

    server
}

async fn setup(provider_url: &str) -> (ToolContext, Arc<Session>) {
    let mut config = Config::for_testing("https://budget.example.org");
    config.provider_url = Some(provider_url.to_string());

    let ledger = Arc::new(LedgerClient::new(&config).unwrap());
    let ctx = ToolContext::new(ledger, config);
    let registry = SessionRegistry::new(Duration::from_secs(3600));
    let session = registry.create("2025-06-18".into(), serde_json::Value::Null).await;
    (ctx, session)
}

#[tokio::test]
async fn test_query_normalizes_provider_records() {
    let server = mock_provider().await;
    let (ctx, session) = setup(&server.uri()).await;
    let call = CallContext { session: &session, auth: None };

    let out = TransactionsQueryTool
        .execute(&ctx, &call, json!({"since": "2025-01-15", "until": "2025-01-16"}))
        .await
        .unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();

    assert_eq!(parsed["count"], 3);
    // The partial record was dropped in normalization.
    assert_eq!(parsed["total_available"], 5);

    let first = &parsed["transactions"][0];
    assert!(first["category"].is_string());
    assert_eq!(first["account_id"], "acc-1");
}

#[tokio::test]
async fn test_search_matches_category_names() {
    let server = mock_provider().await;
    let (ctx, session) = setup(&server.uri()).await;
    let call = CallContext { session: &session, auth: None };

    let out = SearchTool.execute(&ctx, &call, json!({"query": "groceries"})).await.unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
    let results = parsed["results"].as_array().unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["merchant"], "Tesco");
}

#[tokio::test]
async fn test_fetch_finds_provider_record() {
    let server = mock_provider().await;
    let (ctx, session) = setup(&server.uri()).await;
    let call = CallContext { session: &session, auth: None };

    let out = FetchTool.execute(&ctx, &call, json!({"id": "mock_003"})).await.unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(parsed["resource"]["merchant"], "Pizza Express");
    assert_eq!(parsed["resource"]["category"], "eating_out");
}

#[tokio::test]
async fn test_summary_for_fixed_date() {
    let server = mock_provider().await;
    let (ctx, session) = setup(&server.uri()).await;
    let call = CallContext { session: &session, auth: None };

    let out =
        SummaryTodayTool.execute(&ctx, &call, json!({"date": "2025-01-15"})).await.unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
    let summary = &parsed["summary"];

    assert!((summary["total_spent"].as_f64().unwrap() - 110.20).abs() < 0.001);
    assert_eq!(summary["transaction_count"], 2);
    assert!((summary["categories"]["groceries"].as_f64().unwrap() - 45.20).abs() < 0.001);
    assert!((summary["categories"]["eating_out"].as_f64().unwrap() - 65.00).abs() < 0.001);
    // 110.20 spent against a 100.00 daily budget.
    assert_eq!(summary["vs_budget"]["status"], "over");
}

#[tokio::test]
async fn test_projection_for_fixed_date() {
    let server = mock_provider().await;
    let (ctx, session) = setup(&server.uri()).await;
    let call = CallContext { session: &session, auth: None };

    let out =
        ProjectionMonthTool.execute(&ctx, &call, json!({"date": "2025-01-15"})).await.unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
    let projection = &parsed["projection"];

    // Spent 1200.00 + 45.20 + 65.00 by Jan 15; projected over 31 days.
    assert!((projection["current_spend"].as_f64().unwrap() - 1310.20).abs() < 0.001);
    let expected = 1310.20 * 31.0 / 15.0;
    assert!((projection["projected_spend"].as_f64().unwrap() - expected).abs() < 0.01);
    assert_eq!(projection["month"], "2025-01");
    assert_eq!(projection["days_remaining"], 16);
    // Projection is below the 3500.00 monthly budget.
    assert_eq!(projection["pace"], "under");
}

#[tokio::test]
async fn test_provider_failure_surfaces_as_tool_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/accounts"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let (ctx, session) = setup(&server.uri()).await;
    let call = CallContext { session: &session, auth: None };

    let err = TransactionsQueryTool.execute(&ctx, &call, json!({})).await.unwrap_err();
    assert!(matches!(err, ToolError::Provider(_)));

    // The client-facing message must not leak the provider URL.
    assert!(!err.to_user_message().contains(&server.uri()));
}

#[tokio::test]
async fn test_registry_exposes_expected_tool_set() {
    let registered = tools::register_all_tools();
    let names: Vec<&str> = registered.iter().map(|t| t.name()).collect();

    assert_eq!(
        names,
        vec![
            "echo",
            "search",
            "fetch",
            "transactions.query",
            "transactions.sync",
            "summary.today",
            "projection.month",
        ]
    );

    // Exactly one public tool; everything touching ledger data is gated.
    let public: Vec<&str> =
        registered.iter().filter(|t| !t.requires_auth()).map(|t| t.name()).collect();
    assert_eq!(public, vec!["echo"]);
}
