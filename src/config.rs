use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::reconciler::DEFAULT_DRIVER_ID;

/// Default configuration file, looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "dws-test-driver.toml";

/// Main configuration structure for the test driver
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DriverConfig {
    /// Driver identity settings
    pub driver: DriverSettings,
    /// Control loop settings
    pub controller: ControllerConfig,
    /// Logging and metrics settings
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DriverSettings {
    /// Identity matched against `driverID` on workflow driver status entries
    pub driver_id: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ControllerConfig {
    /// Maximum number of workflows reconciled concurrently
    pub workers: usize,
    /// Delay before the first retry of a failed reconcile
    pub requeue_base_delay_ms: u64,
    /// Upper bound on the retry delay
    pub requeue_max_delay_ms: u64,
    /// Randomize retry delays to spread out retries
    pub jitter: bool,
}

impl ControllerConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.requeue_base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.requeue_max_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level used when RUST_LOG is not set
    pub log_level: String,
    /// Emit JSON structured logs instead of human readable output
    pub json_logs: bool,
    /// Log reconcile counters on shutdown
    pub metrics_enabled: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            requeue_base_delay_ms: 100,
            requeue_max_delay_ms: 30_000,
            jitter: true,
        }
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            driver: DriverSettings {
                driver_id: DEFAULT_DRIVER_ID.to_string(),
            },
            controller: ControllerConfig::default(),
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                json_logs: false,
                metrics_enabled: true,
            },
        }
    }
}

impl DriverConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration file (`path`, or dws-test-driver.toml if present)
    /// 3. Environment variables (prefixed with DWS_TEST_DRIVER_, `__` between sections)
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        match path {
            Some(path) => {
                builder = builder.add_source(File::from(path).required(true));
            }
            None => {
                if Path::new(DEFAULT_CONFIG_FILE).exists() {
                    builder = builder.add_source(File::with_name(DEFAULT_CONFIG_FILE));
                }
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("DWS_TEST_DRIVER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: DriverConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.driver.driver_id.trim().is_empty() {
            anyhow::bail!("driver.driver_id must not be empty");
        }
        if self.controller.workers == 0 {
            anyhow::bail!("controller.workers must be at least 1");
        }
        if self.controller.requeue_base_delay_ms == 0 {
            anyhow::bail!("controller.requeue_base_delay_ms must be at least 1");
        }
        if self.controller.requeue_base_delay_ms > self.controller.requeue_max_delay_ms {
            anyhow::bail!(
                "controller.requeue_base_delay_ms ({}) exceeds controller.requeue_max_delay_ms ({})",
                self.controller.requeue_base_delay_ms,
                self.controller.requeue_max_delay_ms
            );
        }
        Ok(())
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}
