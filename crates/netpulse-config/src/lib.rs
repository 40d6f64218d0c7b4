//! Configuration for netpulse.
//!
//! One TOML file plus `NETPULSE_*` environment overrides, validated and
//! translated into `netpulse_core::EngineConfig`. The core never reads
//! files or the environment itself.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use netpulse_core::{
    EngineConfig, MonitorConfig, ProbeConfig, ScanConfig, StatusConfig, SubnetPrefix,
    parse_address,
};

/// Environment variable prefix; nested keys are split on `__`.
pub const ENV_PREFIX: &str = "NETPULSE_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

impl ConfigError {
    fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// Output preferences for the command line.
    #[serde(default)]
    pub defaults: Defaults,

    #[serde(default)]
    pub monitor: MonitorSection,

    #[serde(default)]
    pub probe: ProbeSection,

    #[serde(default)]
    pub scan: ScanSection,

    #[serde(default)]
    pub camera: CameraSection,

    #[serde(default)]
    pub status: StatusSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}

/// `[monitor]`: sweep cadence and debounce.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitorSection {
    pub sweep_interval_ms: u64,
    pub offline_threshold_secs: u64,
    pub status_interval_ms: u64,
    pub combined_interval_ms: u64,
}

impl Default for MonitorSection {
    fn default() -> Self {
        let monitor = MonitorConfig::default();
        let status = StatusConfig::default();
        Self {
            sweep_interval_ms: millis(monitor.sweep_interval),
            offline_threshold_secs: monitor.offline_threshold.as_secs(),
            status_interval_ms: millis(status.status_interval),
            combined_interval_ms: millis(status.combined_interval),
        }
    }
}

/// `[probe]`: reachability check layers.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ProbeSection {
    pub icmp: bool,
    pub fallback_ports: Vec<u16>,
    pub timeout_ms: u64,
    pub fast_timeout_ms: u64,
    pub refused_is_alive: bool,
}

impl Default for ProbeSection {
    fn default() -> Self {
        let probe = ProbeConfig::default();
        Self {
            icmp: probe.icmp,
            fallback_ports: probe.fallback_ports,
            timeout_ms: millis(probe.timeout),
            fast_timeout_ms: millis(probe.fast_timeout),
            refused_is_alive: probe.refused_is_alive,
        }
    }
}

/// `[scan]`: service discovery sweep.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ScanSection {
    pub enabled: bool,
    /// `192.168.1`, `192.168.1.` or `192.168.1.0/24`; unset = detect.
    pub subnet: Option<String>,
    pub port: u16,
    pub connect_timeout_ms: u64,
    pub workers: usize,
    pub scan_budget_secs: u64,
    pub offline_rescan_cooldown_secs: u64,
    pub check_interval_ms: u64,
}

impl Default for ScanSection {
    fn default() -> Self {
        let scan = ScanConfig::default();
        Self {
            enabled: scan.enabled,
            subnet: None,
            port: scan.port,
            connect_timeout_ms: millis(scan.connect_timeout),
            workers: scan.workers,
            scan_budget_secs: scan.scan_budget.as_secs(),
            offline_rescan_cooldown_secs: scan.offline_rescan_cooldown.as_secs(),
            check_interval_ms: millis(scan.check_interval),
        }
    }
}

/// `[camera]`: a known device address adopted instead of scanning.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct CameraSection {
    pub address: Option<String>,
}

/// `[status]`: enrichment and subscriber tuning.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct StatusSection {
    pub enrichment_timeout_ms: u64,
    pub subscription_ttl_secs: Option<u64>,
    pub channel_capacity: usize,
}

impl Default for StatusSection {
    fn default() -> Self {
        let status = StatusConfig::default();
        Self {
            enrichment_timeout_ms: millis(status.enrichment_timeout),
            subscription_ttl_secs: status.subscription_ttl.map(|ttl| ttl.as_secs()),
            channel_capacity: status.channel_capacity,
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ── Translation to the engine ───────────────────────────────────────

fn positive(field: &str, value: u64) -> Result<u64, ConfigError> {
    if value == 0 {
        return Err(ConfigError::invalid(field, "must be greater than zero"));
    }
    Ok(value)
}

fn positive_ms(field: &str, value: u64) -> Result<Duration, ConfigError> {
    positive(field, value).map(Duration::from_millis)
}

fn positive_secs(field: &str, value: u64) -> Result<Duration, ConfigError> {
    positive(field, value).map(Duration::from_secs)
}

impl Config {
    /// Validate and build the engine's runtime configuration.
    pub fn to_engine_config(&self) -> Result<EngineConfig, ConfigError> {
        let monitor = MonitorConfig {
            sweep_interval: positive_ms("monitor.sweep_interval_ms", self.monitor.sweep_interval_ms)?,
            offline_threshold: positive_secs(
                "monitor.offline_threshold_secs",
                self.monitor.offline_threshold_secs,
            )?,
        };

        let probe = ProbeConfig {
            icmp: self.probe.icmp,
            fallback_ports: self.probe.fallback_ports.clone(),
            timeout: positive_ms("probe.timeout_ms", self.probe.timeout_ms)?,
            fast_timeout: positive_ms("probe.fast_timeout_ms", self.probe.fast_timeout_ms)?,
            refused_is_alive: self.probe.refused_is_alive,
        };
        if probe.fallback_ports.contains(&0) {
            return Err(ConfigError::invalid("probe.fallback_ports", "port 0 is not a port"));
        }

        let scan = ScanConfig {
            enabled: self.scan.enabled,
            subnet: self.subnet()?,
            port: self.scan_port()?,
            connect_timeout: positive_ms("scan.connect_timeout_ms", self.scan.connect_timeout_ms)?,
            workers: self.workers()?,
            scan_budget: positive_secs("scan.scan_budget_secs", self.scan.scan_budget_secs)?,
            offline_rescan_cooldown: Duration::from_secs(self.scan.offline_rescan_cooldown_secs),
            check_interval: positive_ms("scan.check_interval_ms", self.scan.check_interval_ms)?,
            pinned: self.camera_address()?,
            ..ScanConfig::default()
        };

        let status = StatusConfig {
            status_interval: positive_ms("monitor.status_interval_ms", self.monitor.status_interval_ms)?,
            combined_interval: positive_ms(
                "monitor.combined_interval_ms",
                self.monitor.combined_interval_ms,
            )?,
            enrichment_timeout: positive_ms(
                "status.enrichment_timeout_ms",
                self.status.enrichment_timeout_ms,
            )?,
            subscription_ttl: self
                .status
                .subscription_ttl_secs
                .map(|secs| positive_secs("status.subscription_ttl_secs", secs))
                .transpose()?,
            channel_capacity: self.channel_capacity()?,
        };

        Ok(EngineConfig {
            probe,
            monitor,
            scan,
            status,
        })
    }

    fn subnet(&self) -> Result<Option<SubnetPrefix>, ConfigError> {
        self.scan
            .subnet
            .as_deref()
            .map(|raw| {
                raw.parse::<SubnetPrefix>()
                    .map_err(|e| ConfigError::invalid("scan.subnet", e.to_string()))
            })
            .transpose()
    }

    fn scan_port(&self) -> Result<u16, ConfigError> {
        if self.scan.port == 0 {
            return Err(ConfigError::invalid("scan.port", "port 0 is not a port"));
        }
        Ok(self.scan.port)
    }

    fn workers(&self) -> Result<usize, ConfigError> {
        if self.scan.workers == 0 {
            return Err(ConfigError::invalid("scan.workers", "need at least one worker"));
        }
        Ok(self.scan.workers)
    }

    fn channel_capacity(&self) -> Result<usize, ConfigError> {
        if self.status.channel_capacity == 0 {
            return Err(ConfigError::invalid(
                "status.channel_capacity",
                "must be greater than zero",
            ));
        }
        Ok(self.status.channel_capacity)
    }

    fn camera_address(&self) -> Result<Option<IpAddr>, ConfigError> {
        self.camera
            .address
            .as_deref()
            .map(|raw| {
                parse_address(raw).map_err(|e| ConfigError::invalid("camera.address", e.to_string()))
            })
            .transpose()
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("dev", "netpulse", "netpulse").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("netpulse");
    p
}

// ── Config loading ──────────────────────────────────────────────────

// NETPULSE_CONFIG and NETPULSE_OUTPUT are command-line flags, not keys.
fn figment_for(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(
            Env::prefixed(ENV_PREFIX)
                .ignore(&["config", "output"])
                .split("__"),
        )
}

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from an explicit file + environment. A missing file is not an
/// error; defaults and environment still apply.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let config: Config = figment_for(path).extract()?;
    Ok(config)
}

/// Load config, returning a default if it cannot be read.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(cfg, &path)?;
    Ok(path)
}

/// Serialize config to TOML and write it to `path`, creating parents.
pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}
