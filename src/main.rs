use anyhow::Result;
use clap::Parser;

use dws_test_driver::cli::{commands, Cli};
use dws_test_driver::config::DriverConfig;
use dws_test_driver::telemetry::{init_telemetry, shutdown_telemetry};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    DriverConfig::load_env_file()?;
    let mut config = DriverConfig::load(cli.config.as_deref())?;
    if let Some(driver_id) = cli.driver_id {
        config.driver.driver_id = driver_id;
        config.validate()?;
    }

    init_telemetry(&config.observability)?;
    tracing::info!(driver_id = %config.driver.driver_id, "Configuration loaded successfully");

    let result = commands::execute(cli.command, &config).await;

    shutdown_telemetry();
    result
}
