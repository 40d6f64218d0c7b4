//! CLI configuration: a thin wrapper around `netpulse_config`.
//!
//! Resolves the file location from `--config` and picks output preferences
//! with CLI flags taking priority over the `[defaults]` table.

use std::path::PathBuf;

use netpulse_config::ConfigError;

use crate::cli::{ColorMode, GlobalOpts, OutputFormat};
use crate::error::CliError;

pub use netpulse_config::{Config, load_config_from, save_config_to};

/// `--config` / `NETPULSE_CONFIG`, else the platform location.
pub fn resolve_path(global: &GlobalOpts) -> PathBuf {
    global
        .config
        .clone()
        .unwrap_or_else(netpulse_config::config_path)
}

/// Load the effective config (defaults, file, environment).
pub fn load(global: &GlobalOpts) -> Result<Config, CliError> {
    let path = resolve_path(global);
    load_config_from(&path).map_err(|e| config_error(e, &path))
}

/// Validate the loaded config into the engine's runtime config.
pub fn engine_config(
    global: &GlobalOpts,
    cfg: &Config,
) -> Result<netpulse_core::EngineConfig, CliError> {
    cfg.to_engine_config()
        .map_err(|e| config_error(e, &resolve_path(global)))
}

pub fn config_error(err: ConfigError, path: &std::path::Path) -> CliError {
    match err {
        ConfigError::Io(e) => CliError::Io(e),
        other => CliError::Config {
            message: other.to_string(),
            path: path.display().to_string(),
        },
    }
}

// ── Output preferences ──────────────────────────────────────────────

pub fn output_format(global: &GlobalOpts, cfg: &Config) -> OutputFormat {
    global.output.unwrap_or(match cfg.defaults.output.as_str() {
        "json" => OutputFormat::Json,
        "json-compact" => OutputFormat::JsonCompact,
        "plain" => OutputFormat::Plain,
        _ => OutputFormat::Table,
    })
}

pub fn color_mode(global: &GlobalOpts, cfg: &Config) -> ColorMode {
    global.color.unwrap_or(match cfg.defaults.color.as_str() {
        "always" => ColorMode::Always,
        "never" => ColorMode::Never,
        _ => ColorMode::Auto,
    })
}
