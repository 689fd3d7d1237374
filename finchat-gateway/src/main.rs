//! finchat Gateway - Main entry point.

use anyhow::Result;
use finchat_common::config::Config;
use finchat_common::logging::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    // Load and validate configuration
    let (config, report) = Config::load_with_env()?;

    // Initialize logging, then report what loading found
    init_logging(&config.observability);
    report.log();

    tracing::info!("finchat gateway v{}", env!("CARGO_PKG_VERSION"));

    finchat_gateway::start_server(&config).await
}
