//! Financial-data provider client.
//!
//! Provides async HTTP access to the upstream open-banking provider with:
//! - Connection pooling via reqwest
//! - Retry middleware with exponential backoff
//! - Response caching with 5-minute TTL
//!
//! When no provider URL is configured the client serves a deterministic
//! sandbox ledger so the server is fully exercisable offline. Failures never
//! escape as panics; everything surfaces as [`ProviderError`].

use std::time::Duration;

use chrono::{Datelike, NaiveDate, Utc};
use moka::future::Cache;
use reqwest::Client;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use serde::Deserialize;

use crate::config::Config;
use crate::error::{ProviderError, ProviderResult};
use crate::models::{Account, Transaction};

const TRANSACTIONS_CACHE_KEY: &str = "transactions";

/// Client for the household's ledger data.
#[derive(Clone)]
pub struct LedgerClient {
    /// HTTP client with middleware.
    client: ClientWithMiddleware,

    /// Response cache.
    cache: Cache<String, Vec<Transaction>>,

    /// Upstream provider base URL; `None` = sandbox ledger.
    provider_url: Option<String>,

    /// Per-request time box.
    request_timeout: Duration,
}

impl LedgerClient {
    /// Create a new client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns error if HTTP client initialization fails.
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .gzip(true)
            .build()?;

        let retry_policy = ExponentialBackoff::builder()
            .retry_bounds(Duration::from_secs(1), Duration::from_secs(10))
            .build_with_max_retries(2);

        let client = ClientBuilder::new(client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        let cache = Cache::builder()
            .max_capacity(config.cache_max_size)
            .time_to_live(config.cache_ttl.max(Duration::from_millis(1)))
            .build();

        Ok(Self {
            client,
            cache,
            provider_url: config.provider_url.clone(),
            request_timeout: config.request_timeout,
        })
    }

    /// Check whether an upstream provider is configured.
    #[must_use]
    pub const fn has_provider(&self) -> bool {
        self.provider_url.is_some()
    }

    /// List accounts.
    ///
    /// # Errors
    ///
    /// Returns error on provider failure.
    pub async fn accounts(&self) -> ProviderResult<Vec<Account>> {
        let Some(ref base) = self.provider_url else {
            return Ok(vec![Account {
                id: "sandbox-account".to_string(),
                name: Some("Sandbox Current Account".to_string()),
                currency: "GBP".to_string(),
            }]);
        };

        #[derive(Deserialize)]
        struct AccountsPayload {
            accounts: Vec<Account>,
        }

        let url = format!("{base}/accounts");
        let payload: AccountsPayload = self.get_json(&url).await?;
        Ok(payload.accounts)
    }

    /// All known transactions, newest first, served from cache when warm.
    ///
    /// # Errors
    ///
    /// Returns error on provider failure.
    pub async fn transactions(&self) -> ProviderResult<Vec<Transaction>> {
        if let Some(cached) = self.cache.get(TRANSACTIONS_CACHE_KEY).await {
            return Ok(cached);
        }

        let transactions = self.fetch_transactions().await?;
        self.cache.insert(TRANSACTIONS_CACHE_KEY.to_string(), transactions.clone()).await;
        Ok(transactions)
    }

    /// Drop the cache and refetch from the provider.
    ///
    /// Returns the number of transactions now in the ledger.
    ///
    /// # Errors
    ///
    /// Returns error on provider failure.
    pub async fn sync(&self) -> ProviderResult<usize> {
        self.cache.invalidate(TRANSACTIONS_CACHE_KEY).await;
        let transactions = self.transactions().await?;
        Ok(transactions.len())
    }

    async fn fetch_transactions(&self) -> ProviderResult<Vec<Transaction>> {
        let Some(ref base) = self.provider_url else {
            return Ok(sandbox_ledger());
        };

        let mut all = Vec::new();
        for account in self.accounts().await? {
            let url = format!("{base}/accounts/{}/transactions", account.id);
            let payload: TransactionsPayload = self.get_json(&url).await?;
            all.extend(payload.transactions.into_iter().filter_map(|t| t.normalize(&account.id)));
        }

        all.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(all)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> ProviderResult<T> {
        let response = self.client.get(url).send().await.map_err(|e| match &e {
            reqwest_middleware::Error::Reqwest(inner) if inner.is_timeout() => {
                ProviderError::Timeout(self.request_timeout)
            }
            _ => ProviderError::Middleware(e),
        })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::unexpected_status(status.as_u16(), message));
        }

        let body = response.text().await.map_err(ProviderError::Http)?;
        serde_json::from_str(&body).map_err(ProviderError::Parse)
    }
}

impl std::fmt::Debug for LedgerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerClient").field("provider_url", &self.provider_url).finish()
    }
}

/// Upstream transaction wire format.
#[derive(Debug, Deserialize)]
struct WireTransaction {
    #[serde(rename = "transactionId")]
    transaction_id: Option<String>,
    #[serde(rename = "bookingDate")]
    booking_date: Option<NaiveDate>,
    #[serde(rename = "transactionAmount")]
    amount: Option<WireAmount>,
    #[serde(rename = "creditorName", default)]
    creditor_name: String,
    #[serde(rename = "remittanceInformationUnstructured", default)]
    remittance: String,
    #[serde(rename = "endToEndId")]
    end_to_end_id: Option<String>,
}

/// Amounts arrive as decimal strings.
#[derive(Debug, Deserialize)]
struct WireAmount {
    amount: String,
    #[serde(default = "default_currency")]
    currency: String,
}

fn default_currency() -> String {
    "GBP".to_string()
}

#[derive(Debug, Deserialize)]
struct TransactionsPayload {
    transactions: Vec<WireTransaction>,
}

impl WireTransaction {
    /// Normalize to the internal shape; records missing id, date or amount
    /// are dropped rather than failing the whole page.
    fn normalize(self, account_id: &str) -> Option<Transaction> {
        let id = self.transaction_id?;
        let date = self.booking_date?;
        let wire_amount = self.amount?;
        let amount = wire_amount.amount.parse().ok()?;

        Some(Transaction {
            reference: self.end_to_end_id.unwrap_or_else(|| id.clone()),
            id,
            date,
            amount,
            currency: wire_amount.currency,
            merchant: self.creditor_name,
            description: self.remittance,
            account_id: account_id.to_string(),
        })
    }
}

/// Deterministic ledger used when no provider is configured.
///
/// Dates are anchored to the current day so the summary and projection tools
/// always have data in the live window.
#[must_use]
pub fn sandbox_ledger() -> Vec<Transaction> {
    let today = Utc::now().date_naive();
    let month_start = today.with_day(1).unwrap_or(today);

    let entry = |id: &str, date: NaiveDate, amount: f64, merchant: &str, description: &str| {
        Transaction {
            id: id.to_string(),
            date,
            amount,
            currency: "GBP".to_string(),
            merchant: merchant.to_string(),
            description: description.to_string(),
            account_id: "sandbox-account".to_string(),
            reference: id.to_string(),
        }
    };

    let mut ledger = vec![
        entry("sbx-001", month_start, 1200.00, "Property Management Ltd", "Monthly rent"),
        entry("sbx-002", month_start, -2500.00, "Acme Payroll", "Salary"),
        entry("sbx-003", today, 45.20, "Tesco", "Groceries shopping"),
        entry("sbx-004", today, 5.80, "Starbucks", "Coffee"),
        entry("sbx-005", today, 3.20, "TFL", "Travel charge"),
        entry("sbx-006", today - chrono::Days::new(1), 65.00, "Pizza Express", "Dinner"),
        entry("sbx-007", today - chrono::Days::new(2), 15.99, "Netflix", "Subscription"),
        entry("sbx-008", today - chrono::Days::new(3), 32.50, "Amazon", "Household order"),
        entry("sbx-009", today - chrono::Days::new(4), 28.00, "Shell", "Fuel"),
        entry("sbx-010", today - chrono::Days::new(5), 52.30, "Sainsburys", "Weekly shop"),
    ];

    ledger.sort_by(|a, b| b.date.cmp(&a.date));
    ledger
}
