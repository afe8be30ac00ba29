//! Budget MCP Server - Entry Point

use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use budget_mcp::{config::Config, server::McpServer};

#[derive(Parser, Debug)]
#[command(name = "budget-mcp")]
#[command(about = "Remote MCP server for household budget tools")]
#[command(version)]
struct Cli {
    /// HTTP server port
    #[arg(long, default_value = "8081", env = "MCP_PORT")]
    port: u16,

    /// Pinned public base URL (e.g., https://budget.example.org); bypasses
    /// forwarded-header trust for discovery documents
    #[arg(long, env = "PUBLIC_URL")]
    public_url: Option<String>,

    /// Upstream financial-data provider base URL (sandbox ledger when unset)
    #[arg(long, env = "PROVIDER_URL")]
    provider_url: Option<String>,

    /// Comma-separated origin allow-list override
    #[arg(long, env = "ALLOWED_ORIGINS", value_delimiter = ',')]
    allowed_origins: Option<Vec<String>>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long)]
    json_logs: bool,
}

fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if json {
        subscriber.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        subscriber.with(tracing_subscriber::fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    init_tracing(&cli.log_level, cli.json_logs);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        port = cli.port,
        "Starting budget MCP server"
    );

    let mut config = Config::new(cli.public_url, cli.provider_url);
    config.port = cli.port;
    if let Some(origins) = cli.allowed_origins {
        config.allowed_origins = origins;
    }

    McpServer::new(config)?.run_http().await
}
