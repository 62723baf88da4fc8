//! CLI configuration.
//!
//! Configuration can be loaded from:
//! - Environment variables (TALLY_*)
//! - TOML configuration file
//! - `--config <path>` on the command line

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tally_core::sink::DEFAULT_SINK_CAPACITY;
use tally_core::RouterConfig;

/// CLI configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Default tracing filter when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Sink configuration.
    #[serde(default)]
    pub sinks: SinkConfig,

    /// Routing options.
    #[serde(default)]
    pub router: RouterSection,

    /// Names to subscribe to before reading envelopes.
    #[serde(default)]
    pub subscribe: SubscribeConfig,
}

/// Sink configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Buffered deliveries per sink.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

/// Routing options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterSection {
    /// Emit status events for presence channels.
    #[serde(default = "default_true")]
    pub presence_events: bool,
}

/// Subscriptions to register.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubscribeConfig {
    /// Channels and wildcard patterns.
    #[serde(default)]
    pub channels: Vec<String>,

    /// Channel groups.
    #[serde(default)]
    pub groups: Vec<String>,
}

fn default_log_level() -> String {
    std::env::var("TALLY_LOG")
        .unwrap_or_else(|_| "tally=info,tally_core=info,tally_protocol=info".to_string())
}

fn default_capacity() -> usize {
    DEFAULT_SINK_CAPACITY
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            sinks: SinkConfig::default(),
            router: RouterSection::default(),
            subscribe: SubscribeConfig::default(),
        }
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
        }
    }
}

impl Default for RouterSection {
    fn default() -> Self {
        Self {
            presence_events: true,
        }
    }
}

impl From<&RouterSection> for RouterConfig {
    fn from(section: &RouterSection) -> Self {
        RouterConfig {
            presence_events: section.presence_events,
        }
    }
}

impl Config {
    /// Load configuration from the default paths or fall back to defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        let config_paths = [
            "tally.toml",
            "/etc/tally/tally.toml",
            "~/.config/tally/tally.toml",
        ];

        for path in &config_paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::from_file(expanded.as_ref());
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }
}
