//! Configuration management for the decision core.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::metrics::MonitorConfig;
use crate::multipath::{ConnectionConfig, DuplicationConfig, StrategyConfig};
use crate::types::FrequencyBand;
use crate::{MAX_FLOWS, MAX_LINKS};

/// Channel widths accepted by the PHY layer, in MHz.
pub const VALID_CHANNEL_WIDTHS: [u16; 5] = [20, 40, 80, 160, 320];

/// Highest supported MCS index.
pub const MAX_MCS: u8 = 13;

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Flow population and tier counts.
    #[serde(default)]
    pub traffic: TrafficConfig,

    /// Links, one entry per frequency band.
    #[serde(default)]
    pub links: LinksConfig,

    /// Link quality monitor tuning.
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Link mapping strategy.
    #[serde(default)]
    pub strategy: StrategyConfig,

    /// Sticky connection policy.
    #[serde(default)]
    pub connections: ConnectionConfig,

    /// Packet duplication policy.
    #[serde(default)]
    pub duplication: DuplicationConfig,

    /// PHY parameters. Validated only.
    #[serde(default)]
    pub phy: PhyConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Config(format!("Failed to read config: {e}")))?;

        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path.as_ref(), content)
            .map_err(|e| Error::Config(format!("Failed to write config: {e}")))?;

        Ok(())
    }

    /// Validate configuration.
    ///
    /// Any failure here means the run cannot start.
    pub fn validate(&self) -> Result<()> {
        self.traffic.validate()?;

        if self.links.bands.is_empty() {
            return Err(Error::InvalidConfig("At least one link is required".into()));
        }
        if self.links.bands.len() > MAX_LINKS {
            return Err(Error::InvalidConfig(format!(
                "{} links configured, at most {MAX_LINKS} supported",
                self.links.bands.len()
            )));
        }

        let threshold = self.monitor.pdr_failure_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(Error::InvalidConfig(format!(
                "PDR failure threshold {threshold} must be in (0, 1]"
            )));
        }
        if self.monitor.outcome_window == 0 || self.monitor.delay_window == 0 {
            return Err(Error::InvalidConfig("Monitor windows must not be empty".into()));
        }
        if self.monitor.throughput_window.is_zero() {
            return Err(Error::InvalidConfig(
                "Throughput window must be positive".into(),
            ));
        }

        let alpha = self.strategy.sla_alpha;
        if !(0.0..=1.0).contains(&alpha) {
            return Err(Error::InvalidConfig(format!(
                "SLA-aware smoothing factor {alpha} must be in [0, 1]"
            )));
        }

        self.phy.validate()
    }

    /// Number of configured links.
    pub fn num_links(&self) -> usize {
        self.links.bands.len()
    }

    /// Get default config file path.
    pub fn default_path() -> PathBuf {
        PathBuf::from("mlo-core.toml")
    }
}

/// Flow population.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrafficConfig {
    /// Number of traffic identifiers in use.
    #[serde(default = "default_tid_count")]
    pub tid_count: u32,

    /// TIDs `[0, emergency_tids)` are Emergency.
    #[serde(default)]
    pub emergency_tids: u32,

    /// The next `critical_tids` TIDs are Critical.
    #[serde(default)]
    pub critical_tids: u32,
}

fn default_tid_count() -> u32 {
    4
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            tid_count: default_tid_count(),
            emergency_tids: 0,
            critical_tids: 0,
        }
    }
}

impl TrafficConfig {
    fn validate(&self) -> Result<()> {
        if self.tid_count == 0 || self.tid_count as usize > MAX_FLOWS {
            return Err(Error::InvalidConfig(format!(
                "TID count {} must be in [1, {MAX_FLOWS}]",
                self.tid_count
            )));
        }
        if self.emergency_tids > self.tid_count {
            return Err(Error::InvalidConfig(format!(
                "Emergency TIDs ({}) exceed TID count ({})",
                self.emergency_tids, self.tid_count
            )));
        }
        if self.critical_tids > self.tid_count {
            return Err(Error::InvalidConfig(format!(
                "Critical TIDs ({}) exceed TID count ({})",
                self.critical_tids, self.tid_count
            )));
        }
        if self.emergency_tids + self.critical_tids > self.tid_count {
            return Err(Error::InvalidConfig(format!(
                "Emergency + critical TIDs ({}) exceed TID count ({})",
                self.emergency_tids + self.critical_tids,
                self.tid_count
            )));
        }
        Ok(())
    }
}

/// Link set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinksConfig {
    /// Band of each link, indexed by link id.
    #[serde(default = "default_bands")]
    pub bands: Vec<FrequencyBand>,
}

fn default_bands() -> Vec<FrequencyBand> {
    vec![
        FrequencyBand::Ghz2_4,
        FrequencyBand::Ghz5,
        FrequencyBand::Ghz6,
    ]
}

impl Default for LinksConfig {
    fn default() -> Self {
        Self {
            bands: default_bands(),
        }
    }
}

/// PHY parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhyConfig {
    /// Modulation and coding scheme index.
    #[serde(default = "default_mcs")]
    pub mcs: u8,

    /// Channel width in MHz.
    #[serde(default = "default_channel_width")]
    pub channel_width_mhz: u16,
}

fn default_mcs() -> u8 {
    3
}
fn default_channel_width() -> u16 {
    80
}

impl Default for PhyConfig {
    fn default() -> Self {
        Self {
            mcs: default_mcs(),
            channel_width_mhz: default_channel_width(),
        }
    }
}

impl PhyConfig {
    fn validate(&self) -> Result<()> {
        if self.mcs > MAX_MCS {
            return Err(Error::InvalidConfig(format!(
                "MCS {} out of range [0, {MAX_MCS}]",
                self.mcs
            )));
        }
        if !VALID_CHANNEL_WIDTHS.contains(&self.channel_width_mhz) {
            return Err(Error::InvalidConfig(format!(
                "Channel width {}MHz not one of {VALID_CHANNEL_WIDTHS:?}",
                self.channel_width_mhz
            )));
        }
        Ok(())
    }
}

/// Verbosity of core diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Warnings and errors only.
    Quiet,
    /// Failure/recovery edges and contract assignment.
    #[default]
    Info,
    /// Selection decisions.
    Debug,
    /// Per-packet scores and SLA windows.
    Trace,
}

impl LogLevel {
    /// Directive understood by `EnvFilter`.
    pub fn as_directive(self) -> &'static str {
        match self {
            Self::Quiet => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level.
    #[serde(default)]
    pub level: LogLevel,

    /// Log format (text or json).
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Enable colored output.
    #[serde(default = "default_color")]
    pub color: bool,
}

fn default_log_format() -> String {
    "text".into()
}
fn default_color() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            format: default_log_format(),
            color: default_color(),
        }
    }
}

/// Initialize logging.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_directive()));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.format == "json" {
        subscriber
            .with(fmt::layer().json())
            .try_init()
            .map_err(|e| Error::Config(format!("Failed to init logging: {e}")))?;
    } else {
        subscriber
            .with(fmt::layer().with_ansi(config.color))
            .try_init()
            .map_err(|e| Error::Config(format!("Failed to init logging: {e}")))?;
    }

    Ok(())
}
