// ── Liveness domain types ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use tokio::time::Instant;

use super::target::Target;

/// Reported reachability of a target.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LivenessState {
    /// Registered, no probe has completed yet.
    Unknown,
    Online,
    Offline,
}

impl LivenessState {
    pub fn is_online(self) -> bool {
        matches!(self, Self::Online)
    }
}

/// Why a transition happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "kebab-case")]
pub enum TransitionCause {
    Sweep,
    CheckNow,
    Forced,
}

/// Edge-triggered state change for one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LivenessEvent {
    pub address: IpAddr,
    pub from: LivenessState,
    pub to: LivenessState,
    pub cause: TransitionCause,
    pub at: DateTime<Utc>,
}

/// Per-target liveness state. Owned by the monitor; consumers get clones.
#[derive(Debug, Clone)]
pub struct LivenessRecord {
    pub target: Target,
    pub state: LivenessState,
    pub last_success_at: Option<Instant>,
    pub last_checked_at: Option<Instant>,
    pub registered_at: Instant,
    pub forced_offline: bool,
    pub forced_reason: Option<String>,
    /// Probe outcomes from probes started before this instant are stale.
    pub forced_at: Option<Instant>,
}

impl LivenessRecord {
    pub(crate) fn new(target: Target, now: Instant) -> Self {
        Self {
            target,
            state: LivenessState::Unknown,
            last_success_at: None,
            last_checked_at: None,
            registered_at: now,
            forced_offline: false,
            forced_reason: None,
            forced_at: None,
        }
    }

    pub fn is_online(&self) -> bool {
        self.state.is_online()
    }
}
