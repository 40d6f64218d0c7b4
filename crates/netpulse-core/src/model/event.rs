// ── Push event types ──

use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use super::snapshot::{CombinedSnapshot, StatusSnapshot};

/// One named event delivered to a subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum PushEvent {
    #[serde(rename = "status")]
    Status(Arc<StatusSnapshot>),
    #[serde(rename = "systemStatus")]
    SystemStatus(Arc<CombinedSnapshot>),
}

impl PushEvent {
    /// Event name as seen on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Status(_) => "status",
            Self::SystemStatus(_) => "systemStatus",
        }
    }

    pub fn as_status(&self) -> Option<&StatusSnapshot> {
        match self {
            Self::Status(snap) => Some(snap),
            Self::SystemStatus(_) => None,
        }
    }

    pub fn as_system_status(&self) -> Option<&CombinedSnapshot> {
        match self {
            Self::SystemStatus(snap) => Some(snap),
            Self::Status(_) => None,
        }
    }

    /// Same published payload (identity, not value).
    pub(crate) fn same_payload(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Status(a), Self::Status(b)) => Arc::ptr_eq(a, b),
            (Self::SystemStatus(a), Self::SystemStatus(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// What a subscription listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Status events for one address.
    Target(IpAddr),
    /// Every status event plus the combined system status.
    All,
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Target(ip) => write!(f, "{ip}"),
            Self::All => f.write_str("*"),
        }
    }
}

/// Opaque handle identifying one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn status_event_serializes_with_name_and_payload() {
        let ip = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 50));
        let event = PushEvent::Status(Arc::new(StatusSnapshot::new(ip, true)));
        let json = serde_json::to_value(&event).unwrap_or_default();

        assert_eq!(event.name(), "status");
        assert_eq!(json["event"], serde_json::json!("status"));
        assert_eq!(json["data"]["online"], serde_json::json!(true));
        assert_eq!(json["data"]["target"], serde_json::json!("192.168.1.50"));
    }
}
