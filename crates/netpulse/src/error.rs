//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` into user-facing errors with help text
//! and a stable exit code.

use miette::Diagnostic;
use thiserror::Error;

use netpulse_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const CONFIG: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const NETWORK: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Input ────────────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(netpulse::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    #[diagnostic(
        code(netpulse::config),
        help(
            "Check the file at {path}\n\
             Run: netpulse config show"
        )
    )]
    Config { message: String, path: String },

    #[error("Configuration file already exists at {path}")]
    #[diagnostic(
        code(netpulse::config_exists),
        help("Use --force (-f) to overwrite it.")
    )]
    ConfigExists { path: String },

    // ── Discovery / reachability ─────────────────────────────────────
    #[error("No device answered the {protocol} handshake on {subnet}")]
    #[diagnostic(
        code(netpulse::not_found),
        help(
            "Check that the device is powered and on the same /24.\n\
             Try another subnet with: netpulse discover --subnet <PREFIX>"
        )
    )]
    NotFound { protocol: String, subnet: String },

    #[error("{count} of {total} target(s) unreachable")]
    #[diagnostic(
        code(netpulse::unreachable),
        help("Try a longer budget (drop --fast) or add TCP ports with --port.")
    )]
    Unreachable { count: usize, total: usize },

    #[error("Network error: {message}")]
    #[diagnostic(code(netpulse::network))]
    Network { message: String },

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize output: {0}")]
    #[diagnostic(code(netpulse::json))]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    #[diagnostic(code(netpulse::internal))]
    Internal(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Validation { .. } | Self::ConfigExists { .. } => exit_code::USAGE,
            Self::Config { .. } => exit_code::CONFIG,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Unreachable { .. } | Self::Network { .. } => exit_code::NETWORK,
            Self::Io(_) | Self::Json(_) | Self::Internal(_) => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidAddress { input, reason } => CliError::Validation {
                field: "address".into(),
                reason: format!("'{input}': {reason}"),
            },
            CoreError::InvalidSubnet { input, reason } => CliError::Validation {
                field: "subnet".into(),
                reason: format!("'{input}': {reason}"),
            },
            err @ (CoreError::NoLocalSubnet | CoreError::Interfaces { .. }) => {
                CliError::Network {
                    message: err.to_string(),
                }
            }
        }
    }
}
