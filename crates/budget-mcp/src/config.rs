//! Configuration for the budget MCP server.

use std::time::Duration;

/// Server defaults and protocol constants.
pub mod defaults {
    use std::time::Duration;

    /// HTTP port the server binds when none is given.
    pub const PORT: u16 = 8081;

    /// Origins allowed to make credentialed cross-origin requests.
    ///
    /// Wildcards are rejected by design; agent front ends send credentials,
    /// which the CORS spec forbids combining with `*`.
    pub const ALLOWED_ORIGINS: &[&str] = &[
        "https://claude.ai",
        "https://www.claude.ai",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
    ];

    /// Idle timeout after which a session is closed.
    pub const SESSION_TIMEOUT: Duration = Duration::from_secs(3600);

    /// Interval of the stale-session sweep.
    pub const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

    /// Provider request timeout.
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    /// Provider connection timeout.
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Provider response cache TTL.
    pub const CACHE_TTL: Duration = Duration::from_secs(300);

    /// Maximum cached provider responses.
    pub const CACHE_MAX_SIZE: u64 = 100;

    /// Household daily spending budget (GBP).
    pub const DAILY_BUDGET: f64 = 100.0;

    /// Household monthly spending budget (GBP).
    pub const MONTHLY_BUDGET: f64 = 3500.0;
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP port to bind.
    pub port: u16,

    /// Pinned externally-visible base URL (e.g. `https://budget.example.org`).
    ///
    /// When set, discovery documents and redirect targets use it verbatim and
    /// forwarded headers are ignored. When unset, the external URL is derived
    /// per request from `X-Forwarded-Proto` / `X-Forwarded-Host`.
    pub public_url: Option<String>,

    /// Origin allow-list for CORS enforcement.
    pub allowed_origins: Vec<String>,

    /// Base URL of the upstream financial-data provider.
    ///
    /// `None` serves the deterministic sandbox ledger instead.
    pub provider_url: Option<String>,

    /// Session idle timeout.
    pub session_timeout: Duration,

    /// Provider request timeout.
    pub request_timeout: Duration,

    /// Provider connection timeout.
    pub connect_timeout: Duration,

    /// Provider cache TTL.
    pub cache_ttl: Duration,

    /// Maximum cached provider responses.
    pub cache_max_size: u64,

    /// Daily spending budget used by `summary.today`.
    pub daily_budget: f64,

    /// Monthly spending budget used by `projection.month`.
    pub monthly_budget: f64,
}

impl Config {
    /// Create a new configuration.
    #[must_use]
    pub fn new(public_url: Option<String>, provider_url: Option<String>) -> Self {
        Self {
            port: defaults::PORT,
            public_url,
            allowed_origins: defaults::ALLOWED_ORIGINS.iter().map(ToString::to_string).collect(),
            provider_url,
            session_timeout: defaults::SESSION_TIMEOUT,
            request_timeout: defaults::REQUEST_TIMEOUT,
            connect_timeout: defaults::CONNECT_TIMEOUT,
            cache_ttl: defaults::CACHE_TTL,
            cache_max_size: defaults::CACHE_MAX_SIZE,
            daily_budget: defaults::DAILY_BUDGET,
            monthly_budget: defaults::MONTHLY_BUDGET,
        }
    }

    /// Create a test configuration: fixed base URL, no caching, short timeouts.
    #[must_use]
    pub fn for_testing(base_url: &str) -> Self {
        Self {
            port: 0,
            public_url: Some(base_url.to_string()),
            allowed_origins: defaults::ALLOWED_ORIGINS.iter().map(ToString::to_string).collect(),
            provider_url: None,
            session_timeout: defaults::SESSION_TIMEOUT,
            request_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(2),
            cache_ttl: Duration::from_secs(0), // No caching in tests
            cache_max_size: 0,
            daily_budget: defaults::DAILY_BUDGET,
            monthly_budget: defaults::MONTHLY_BUDGET,
        }
    }

    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns error if environment variables are invalid.
    pub fn from_env() -> anyhow::Result<Self> {
        let public_url = std::env::var("PUBLIC_URL").ok();
        let provider_url = std::env::var("PROVIDER_URL").ok();
        let mut config = Self::new(public_url, provider_url);

        if let Ok(port) = std::env::var("MCP_PORT") {
            config.port = port.parse()?;
        }
        if let Ok(origins) = std::env::var("ALLOWED_ORIGINS") {
            config.allowed_origins =
                origins.split(',').map(|o| o.trim().to_string()).filter(|o| !o.is_empty()).collect();
        }
        if let Ok(budget) = std::env::var("MONTHLY_BUDGET") {
            config.monthly_budget = budget.parse()?;
        }
        if let Ok(budget) = std::env::var("DAILY_BUDGET") {
            config.daily_budget = budget.parse()?;
        }

        Ok(config)
    }

    /// Check whether an upstream provider is configured.
    #[must_use]
    pub const fn has_provider(&self) -> bool {
        self.provider_url.is_some()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(None, None)
    }
}
