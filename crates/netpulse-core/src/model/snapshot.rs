// ── Status snapshot types ──
//
// Immutable payloads built fresh on every evaluation and pushed to
// subscribers. Change detection compares every field except the
// evaluation timestamp.

use std::collections::BTreeMap;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Auxiliary metadata attached to an online target.
pub type Enrichment = BTreeMap<String, String>;

/// Placeholder shown for host details that could not be fetched.
pub const NOT_AVAILABLE: &str = "N/A";

/// Status of one target at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub target: IpAddr,
    pub timestamp: DateTime<Utc>,
    pub online: bool,
    #[serde(default)]
    pub enrichment: Enrichment,
    pub error: Option<String>,
    #[serde(default)]
    pub forced_offline: bool,
    pub reason: Option<String>,
}

impl StatusSnapshot {
    /// A bare snapshot with no metadata.
    pub fn new(target: IpAddr, online: bool) -> Self {
        Self {
            target,
            timestamp: Utc::now(),
            online,
            enrichment: Enrichment::new(),
            error: None,
            forced_offline: false,
            reason: None,
        }
    }

    /// Snapshot published right after an administrative override.
    pub fn forced_offline(target: IpAddr, reason: impl Into<String>) -> Self {
        Self {
            forced_offline: true,
            reason: Some(reason.into()),
            ..Self::new(target, false)
        }
    }

    /// Structural equality ignoring `timestamp`.
    pub fn same_status_as(&self, other: &Self) -> bool {
        self.target == other.target
            && self.online == other.online
            && self.enrichment == other.enrichment
            && self.error == other.error
            && self.forced_offline == other.forced_offline
            && self.reason == other.reason
    }
}

/// Host half of the combined payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostSection {
    pub address: Option<IpAddr>,
    pub online: bool,
    pub hostname: String,
    pub os: String,
    pub uptime: String,
    pub error: Option<String>,
}

impl HostSection {
    pub fn unavailable(address: Option<IpAddr>, error: impl Into<String>) -> Self {
        Self {
            address,
            online: false,
            hostname: NOT_AVAILABLE.into(),
            os: NOT_AVAILABLE.into(),
            uptime: NOT_AVAILABLE.into(),
            error: Some(error.into()),
        }
    }
}

/// Camera half of the combined payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraSection {
    pub address: Option<IpAddr>,
    pub online: bool,
    pub stream_url: Option<String>,
    pub error: Option<String>,
}

/// Host and camera merged into one payload per tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinedSnapshot {
    pub timestamp: DateTime<Utc>,
    pub host: HostSection,
    pub camera: CameraSection,
}

impl CombinedSnapshot {
    /// Structural equality ignoring `timestamp`.
    pub fn same_status_as(&self, other: &Self) -> bool {
        self.host == other.host && self.camera == other.camera
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn ip() -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(192, 168, 1, 50))
    }

    #[test]
    fn same_status_ignores_timestamp() {
        let a = StatusSnapshot::new(ip(), true);
        let mut b = a.clone();
        b.timestamp = a.timestamp + chrono::Duration::seconds(30);
        assert!(a.same_status_as(&b));
        assert_ne!(a, b);
    }

    #[test]
    fn same_status_sees_enrichment_changes() {
        let a = StatusSnapshot::new(ip(), true);
        let mut b = a.clone();
        b.enrichment.insert("uptime".into(), "2 days".into());
        assert!(!a.same_status_as(&b));
    }

    #[test]
    fn forced_offline_carries_reason() {
        let snap = StatusSnapshot::forced_offline(ip(), "shutdown issued");
        assert!(!snap.online);
        assert!(snap.forced_offline);
        assert_eq!(snap.reason.as_deref(), Some("shutdown issued"));

        let json = serde_json::to_value(&snap).unwrap_or_default();
        assert_eq!(json["forcedOffline"], serde_json::json!(true));
        assert_eq!(json["target"], serde_json::json!("192.168.1.50"));
    }

    #[test]
    fn unavailable_host_uses_placeholders() {
        let host = HostSection::unavailable(Some(ip()), "host offline");
        assert_eq!(host.hostname, NOT_AVAILABLE);
        assert_eq!(host.os, NOT_AVAILABLE);
        assert_eq!(host.uptime, NOT_AVAILABLE);
        assert!(!host.online);
    }
}
