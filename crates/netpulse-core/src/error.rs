// ── Core error types ──
//
// Liveness answers are never errors: an unreachable target is a normal
// `false`. These variants cover input validation and local interface
// enumeration only.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Input errors ─────────────────────────────────────────────────
    #[error("Invalid address '{input}': {reason}")]
    InvalidAddress { input: String, reason: String },

    #[error("Invalid subnet prefix '{input}': {reason}")]
    InvalidSubnet { input: String, reason: String },

    // ── Local network errors ─────────────────────────────────────────
    #[error("No private IPv4 subnet found on any active interface")]
    NoLocalSubnet,

    #[error("Failed to enumerate network interfaces: {message}")]
    Interfaces { message: String },
}

impl CoreError {
    pub(crate) fn invalid_address(input: &str, reason: impl Into<String>) -> Self {
        Self::InvalidAddress {
            input: input.to_owned(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_subnet(input: &str, reason: impl Into<String>) -> Self {
        Self::InvalidSubnet {
            input: input.to_owned(),
            reason: reason.into(),
        }
    }
}
