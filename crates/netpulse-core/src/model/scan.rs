// ── Discovery result types ──

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The authoritative discovered device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    pub address: IpAddr,
    pub port: u16,
    pub confirmed_at: DateTime<Utc>,
}

impl ScanResult {
    pub fn new(address: IpAddr, port: u16) -> Self {
        Self {
            address,
            port,
            confirmed_at: Utc::now(),
        }
    }
}

/// What a discovery request did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// A device confirmed the protocol; it is now the current device.
    Found(ScanResult),
    /// The sweep finished (or ran out of budget) without a confirmation.
    /// The previous device, if any, is kept.
    NotFound,
    /// Another sweep is in flight; nothing was started.
    AlreadyRunning,
    /// An offline-triggered rescan ran too recently; nothing was started.
    CoolingDown,
}

impl ScanOutcome {
    pub fn address(&self) -> Option<IpAddr> {
        match self {
            Self::Found(result) => Some(result.address),
            Self::NotFound | Self::AlreadyRunning | Self::CoolingDown => None,
        }
    }

    /// Whether a worker pool actually ran for this request.
    pub fn did_scan(&self) -> bool {
        matches!(self, Self::Found(_) | Self::NotFound)
    }
}
