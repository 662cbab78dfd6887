use crate::enrichment::{EnrichConfig, PollEnrichConfig};
use crate::error::Result;
use serde::{Deserialize, Serialize};

const DEFAULTS: &str = include_str!("../config/default.toml");

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Defaults for active enrichers
    #[serde(default)]
    pub enrich: EnrichConfig,

    /// Defaults for poll enrichers
    #[serde(default)]
    pub poll_enrich: PollEnrichConfig,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// The file is read from `ENRICHER_CONFIG_PATH`, defaulting to
    /// `config/enricher.toml`, and may be absent.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("ENRICHER_CONFIG_PATH")
            .unwrap_or_else(|_| "config/enricher.toml".to_string());
        Self::load_from(&config_path)
    }

    /// Load configuration layering the defaults, the file at `path` and the environment
    pub fn load_from(path: &str) -> Result<Self> {
        let config: Config = config::Config::builder()
            // Start with default values
            .add_source(config::File::from_str(DEFAULTS, config::FileFormat::Toml))
            // Override with config file if it exists
            .add_source(config::File::with_name(path).required(false))
            // Override with environment variables (prefix: ENRICHER_)
            .add_source(
                config::Environment::with_prefix("ENRICHER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML text on top of the defaults, ignoring the environment
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let config: Config = config::Config::builder()
            .add_source(config::File::from_str(DEFAULTS, config::FileFormat::Toml))
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.enrich.validate()?;
        self.poll_enrich.validate()?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logs: bool,

    /// Service name
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Enable Prometheus metrics
    #[serde(default = "default_true")]
    pub prometheus_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
            service_name: default_service_name(),
            prometheus_enabled: true,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_service_name() -> String {
    "content-enricher".to_string()
}

fn default_true() -> bool {
    true
}
