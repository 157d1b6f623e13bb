use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::catalog::MAX_IDS_PER_REQUEST;
use crate::validation::InputValidator;

/// Application configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Root directory of every pipeline artifact
    pub data_dir: PathBuf,
    /// Catalog API settings
    pub catalog: CatalogConfig,
    /// Enrichment scheduling settings
    pub enrichment: EnrichmentConfig,
    /// Logging settings
    pub logging: LoggingConfig,
}

/// Catalog API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// API root, without trailing slash
    pub base_url: String,
    /// API key; falls back to the key stored by `setup`
    #[serde(default)]
    pub api_key: Option<String>,
    /// Region whose category names are used
    pub region_code: String,
    /// Identifiers per batch-by-id request (1..=50)
    pub max_ids_per_request: usize,
    /// Minimum spacing between requests
    pub request_interval_ms: u64,
    /// Per-request timeout
    pub timeout_secs: u64,
}

/// Enrichment scheduling settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    /// Rows enriched per scheduled invocation
    pub batch_size: usize,
    /// Only enrich rows watched in this year
    #[serde(default)]
    pub year_filter: Option<i32>,
    /// Pause between scheduled invocations
    pub poll_interval_secs: u64,
    /// Failed invocations in a row before the run loop gives up
    pub max_consecutive_failures: u32,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    pub level: String,
    /// Optional rolling log file
    #[serde(default)]
    pub file_path: Option<String>,
    /// "json" or "text"
    pub format: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            catalog: CatalogConfig {
                base_url: "https://www.googleapis.com/youtube/v3".to_string(),
                api_key: None,
                region_code: "US".to_string(),
                max_ids_per_request: MAX_IDS_PER_REQUEST,
                request_interval_ms: 100,
                timeout_secs: 30,
            },
            enrichment: EnrichmentConfig {
                batch_size: 500,
                year_filter: None,
                poll_interval_secs: 1,
                max_consecutive_failures: 5,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file_path: None,
                format: "text".to_string(),
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources with precedence
    pub fn load() -> Result<Self> {
        let config = Config::builder()
            // Start with default values
            .add_source(Config::try_from(&Self::default())?)
            // Add config file if it exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(File::with_name("watch-wrapped").required(false))
            // Add environment variables with prefix
            .add_source(
                Environment::with_prefix("WATCH_WRAPPED")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| anyhow::anyhow!("Failed to deserialize configuration: {}", e))?;

        // Validate configuration
        app_config.validate()?;

        Ok(app_config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        // Validate catalog config
        if !(1..=MAX_IDS_PER_REQUEST).contains(&self.catalog.max_ids_per_request) {
            return Err(anyhow::anyhow!(
                "max_ids_per_request must be between 1 and {}",
                MAX_IDS_PER_REQUEST
            ));
        }
        if self.catalog.timeout_secs == 0 {
            return Err(anyhow::anyhow!("timeout_secs must be greater than 0"));
        }
        if self.catalog.base_url.trim().is_empty() {
            return Err(anyhow::anyhow!("base_url must not be empty"));
        }
        InputValidator::validate_region_code(&self.catalog.region_code)?;
        if let Some(key) = &self.catalog.api_key {
            InputValidator::validate_api_key(key)?;
        }

        // Validate enrichment config
        InputValidator::validate_batch_size(self.enrichment.batch_size)?;
        if let Some(year) = self.enrichment.year_filter {
            InputValidator::validate_year(year)?;
        }
        if self.enrichment.max_consecutive_failures == 0 {
            return Err(anyhow::anyhow!("max_consecutive_failures must be greater than 0"));
        }

        // Validate logging config
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log level: {}. Must be one of: {:?}",
                self.logging.level,
                valid_levels
            ));
        }

        let valid_formats = ["text", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log format: {}. Must be one of: {:?}",
                self.logging.format,
                valid_formats
            ));
        }

        Ok(())
    }

    /// Get log level from environment or config
    #[must_use]
    pub fn get_log_level(&self) -> String {
        std::env::var("RUST_LOG").unwrap_or_else(|_| self.logging.level.clone())
    }
}
