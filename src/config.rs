//! Scanner configuration
//!
//! Provides the probing engine's tunables with support for:
//! - Programmatic construction via builder-style setters
//! - TOML configuration files
//! - Environment variable overrides (prefixed with `VSCAN_`)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::{debug, info};

/// Configuration of a [`Scanner`](crate::scanner::Scanner).
///
/// Copied into each scanner at construction and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Connection (dial) timeout in seconds
    pub conn_timeout_secs: u64,
    /// Payload write timeout in seconds
    pub send_timeout_secs: u64,
    /// Response read timeout in seconds
    pub read_timeout_secs: u64,
    /// Try every probe matching the target protocol, ignoring port lists
    pub use_all_probes: bool,
    /// Send only the NULL probe and rely on unsolicited banners
    pub use_null_probe_only: bool,
    /// Retry a failed plaintext exchange over TLS
    pub ssl_always_try: bool,
    /// Probes rarer than this ceiling are skipped
    pub rarity: u32,
    /// Logging configuration (consumed by [`crate::logging`])
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error)
    pub level: String,
    /// Console output format (json, pretty)
    pub format: String,
    /// Log file path (None for console only)
    pub file_path: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            conn_timeout_secs: 10,
            send_timeout_secs: 10,
            read_timeout_secs: 10,
            use_all_probes: false,
            use_null_probe_only: false,
            ssl_always_try: false,
            rarity: 10,
            logging: LoggingConfig::default(),
        }
    }
}

impl ScanConfig {
    /// Set the connection timeout.
    pub fn with_conn_timeout(mut self, timeout: Duration) -> Self {
        self.conn_timeout_secs = timeout.as_secs();
        self
    }

    /// Set the payload write timeout.
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout_secs = timeout.as_secs();
        self
    }

    /// Set the response read timeout.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout_secs = timeout.as_secs();
        self
    }

    /// Select every probe matching the target protocol.
    pub fn with_all_probes(mut self, enabled: bool) -> Self {
        self.use_all_probes = enabled;
        self
    }

    /// Select only the NULL probe.
    pub fn with_null_probe_only(mut self, enabled: bool) -> Self {
        self.use_null_probe_only = enabled;
        self
    }

    /// Retry failed plaintext exchanges over TLS.
    pub fn with_ssl_always_try(mut self, enabled: bool) -> Self {
        self.ssl_always_try = enabled;
        self
    }

    /// Set the rarity ceiling.
    pub fn with_rarity(mut self, rarity: u32) -> Self {
        self.rarity = rarity;
        self
    }

    /// Load configuration from a TOML file with environment variable
    /// overrides. A missing file is created with the defaults.
    pub async fn load<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let config_path = config_path.as_ref();

        info!("Loading configuration from: {}", config_path.display());

        let mut settings = config::Config::builder();

        // Start with default configuration
        settings = settings.add_source(config::Config::try_from(&Self::default())?);

        // Load from config file if it exists
        if config_path.exists() {
            debug!("Found configuration file, loading settings");
            settings = settings.add_source(config::File::from(config_path));
        } else {
            info!("No configuration file found, using defaults");
            Self::create_default_config(config_path).await?;
        }

        // Override with environment variables (prefixed with VSCAN_)
        settings = settings.add_source(
            config::Environment::with_prefix("VSCAN").try_parsing(true),
        );

        let config: ScanConfig = settings
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;

        info!("Configuration loaded successfully");
        Ok(config)
    }

    /// Create a default configuration file
    async fn create_default_config<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create config directory")?;
        }

        let config_content = toml::to_string_pretty(&Self::default())
            .context("Failed to serialize default configuration")?;

        tokio::fs::write(path, config_content)
            .await
            .context("Failed to write default configuration file")?;

        info!("Created default configuration file: {}", path.display());
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.conn_timeout_secs == 0
            || self.send_timeout_secs == 0
            || self.read_timeout_secs == 0
        {
            return Err(anyhow::anyhow!("timeouts must be greater than 0"));
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(anyhow::anyhow!(
                    "Invalid logging level: {}",
                    self.logging.level
                ))
            }
        }

        debug!("Configuration validation passed");
        Ok(())
    }

    /// Get the connection timeout as a Duration
    pub fn conn_timeout(&self) -> Duration {
        Duration::from_secs(self.conn_timeout_secs)
    }

    /// Get the send timeout as a Duration
    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }

    /// Get the read timeout as a Duration
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}
