// ── Runtime engine configuration ──
//
// These types describe *how* the engine probes, scans and publishes.
// They never touch disk. The config crate (or an embedding binary)
// constructs an `EngineConfig` and hands it in.

use std::net::IpAddr;
use std::time::Duration;

use crate::scan::SubnetPrefix;

/// Timeouts and fallback ports used by the network prober.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeConfig {
    /// Send one echo request through the system `ping` utility first.
    pub icmp: bool,
    /// TCP ports raced when the echo request gets no answer (Host targets).
    pub fallback_ports: Vec<u16>,
    /// Echo and connect timeout for the regular sweep.
    pub timeout: Duration,
    /// Echo and connect timeout for fast recovery checks.
    pub fast_timeout: Duration,
    /// A refused TCP connection means the host answered.
    pub refused_is_alive: bool,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            icmp: true,
            fallback_ports: vec![22, 135, 445],
            timeout: Duration::from_millis(2_000),
            fast_timeout: Duration::from_millis(300),
            refused_is_alive: true,
        }
    }
}

/// Liveness state machine tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Delay between two liveness sweeps.
    pub sweep_interval: Duration,
    /// How long a target may go without a successful probe before it is
    /// reported offline.
    pub offline_threshold: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(2),
            offline_threshold: Duration::from_secs(10),
        }
    }
}

/// Subnet sweep tuning for service discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    /// Run the periodic discovery check at all.
    pub enabled: bool,
    /// Subnet to sweep. `None` = detect from local interfaces.
    pub subnet: Option<SubnetPrefix>,
    /// Service port probed on every candidate.
    pub port: u16,
    /// TCP connect (and handshake read) timeout per candidate.
    pub connect_timeout: Duration,
    /// Multiplier on `connect_timeout` giving each candidate task its budget.
    pub task_budget_factor: u32,
    /// Concurrent candidate tasks.
    pub workers: usize,
    /// Wall-clock budget for one whole sweep.
    pub scan_budget: Duration,
    /// Minimum delay between two rescans triggered by "device offline".
    pub offline_rescan_cooldown: Duration,
    /// Delay between two discovery/camera checks.
    pub check_interval: Duration,
    /// Known device address; adopted at start instead of scanning.
    pub pinned: Option<IpAddr>,
}

impl ScanConfig {
    /// Budget for one candidate task.
    pub fn task_budget(&self) -> Duration {
        self.connect_timeout.saturating_mul(self.task_budget_factor.max(1))
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            subnet: None,
            port: 554,
            connect_timeout: Duration::from_millis(500),
            task_budget_factor: 2,
            workers: 50,
            scan_budget: Duration::from_secs(30),
            offline_rescan_cooldown: Duration::from_secs(20 * 60),
            check_interval: Duration::from_secs(3),
            pinned: None,
        }
    }
}

/// Snapshot evaluation and fan-out tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusConfig {
    /// Delay between two per-target status evaluations.
    pub status_interval: Duration,
    /// Delay between two combined (host + camera) evaluations.
    pub combined_interval: Duration,
    /// Upper bound on one enrichment call.
    pub enrichment_timeout: Duration,
    /// Maximum subscription lifetime. `None` = until the subscriber leaves.
    pub subscription_ttl: Option<Duration>,
    /// Buffered events per channel subscriber before it counts as stalled.
    pub channel_capacity: usize,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            status_interval: Duration::from_secs(2),
            combined_interval: Duration::from_secs(2),
            enrichment_timeout: Duration::from_secs(3),
            subscription_ttl: None,
            channel_capacity: 64,
        }
    }
}

/// Full configuration handed to [`Engine`](crate::Engine).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineConfig {
    pub probe: ProbeConfig,
    pub monitor: MonitorConfig,
    pub scan: ScanConfig,
    pub status: StatusConfig,
}
