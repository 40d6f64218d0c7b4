// ── Monitored target identity ──

use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// What a target is, which decides how it is probed and enriched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TargetKind {
    /// A general host (workstation, server). Probed by echo plus fallback ports.
    Host,
    /// A device discovered by the scanner through a known service port.
    Service { port: u16 },
}

/// A monitored address. Identity is the address alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    pub address: IpAddr,
    #[serde(flatten)]
    pub kind: TargetKind,
}

impl Target {
    pub fn host(address: IpAddr) -> Self {
        Self {
            address,
            kind: TargetKind::Host,
        }
    }

    pub fn service(address: IpAddr, port: u16) -> Self {
        Self {
            address,
            kind: TargetKind::Service { port },
        }
    }

    /// Parse a textual address into a Host target.
    pub fn parse_host(input: &str) -> Result<Self, CoreError> {
        parse_address(input).map(Self::host)
    }

    pub fn is_service(&self) -> bool {
        matches!(self.kind, TargetKind::Service { .. })
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TargetKind::Host => write!(f, "{}", self.address),
            TargetKind::Service { port } => write!(f, "{}:{port}", self.address),
        }
    }
}

/// Parse an IP address, trimming surrounding whitespace.
pub fn parse_address(input: &str) -> Result<IpAddr, CoreError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(CoreError::invalid_address(input, "address is empty"));
    }
    trimmed
        .parse::<IpAddr>()
        .map_err(|e| CoreError::invalid_address(input, e.to_string()))
}
