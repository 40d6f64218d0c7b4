// ── Status aggregation ──
//
// Turns the monitor's boolean into a full snapshot. Online hosts are
// enriched through an external provider; an enrichment failure lands in
// the snapshot's `error`, and only an "unreachable" failure downgrades
// `online`.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use chrono::Utc;
use futures_util::future::BoxFuture;
use thiserror::Error;
use tokio::time::timeout;
use tracing::debug;

use crate::config::StatusConfig;
use crate::model::{
    CameraSection, CombinedSnapshot, Enrichment, HostSection, NOT_AVAILABLE, ScanResult,
    StatusSnapshot, TargetKind,
};
use crate::monitor::LivenessMonitor;
use crate::scan::ServiceProtocol;

/// Why an enrichment fetch produced no metadata.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnrichmentError {
    /// The target went dark between the liveness check and the fetch.
    #[error("{0}")]
    Unreachable(String),
    /// Any other failure; says nothing about liveness.
    #[error("{0}")]
    Failed(String),
}

impl EnrichmentError {
    /// Classify a free-text failure from a provider that cannot report
    /// structured errors. Timeout- and connect-shaped messages mean the
    /// target is unreachable.
    pub fn from_message(message: impl Into<String>) -> Self {
        const UNREACHABLE_MARKERS: [&str; 4] =
            ["timeout", "timed out", "connectexception", "offline"];

        let message = message.into();
        let lowered = message.to_lowercase();
        if UNREACHABLE_MARKERS
            .iter()
            .any(|marker| lowered.contains(marker))
        {
            Self::Unreachable(message)
        } else {
            Self::Failed(message)
        }
    }

    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Unreachable(_))
    }
}

/// Fetches auxiliary metadata (hostname, OS, uptime, ...) for an online host.
pub trait EnrichmentProvider: Send + Sync {
    fn fetch(&self, address: IpAddr) -> BoxFuture<'_, Result<Enrichment, EnrichmentError>>;
}

/// Provider that attaches nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEnrichment;

impl EnrichmentProvider for NoEnrichment {
    fn fetch(&self, _address: IpAddr) -> BoxFuture<'_, Result<Enrichment, EnrichmentError>> {
        Box::pin(async { Ok(Enrichment::new()) })
    }
}

/// Builds per-target and combined snapshots.
pub struct StatusAggregator {
    monitor: Arc<LivenessMonitor>,
    provider: Arc<dyn EnrichmentProvider>,
    protocol: Arc<dyn ServiceProtocol>,
    config: StatusConfig,
}

impl StatusAggregator {
    pub fn new(
        monitor: Arc<LivenessMonitor>,
        provider: Arc<dyn EnrichmentProvider>,
        protocol: Arc<dyn ServiceProtocol>,
        config: StatusConfig,
    ) -> Self {
        Self {
            monitor,
            provider,
            protocol,
            config,
        }
    }

    /// Evaluate one address. Unregistered addresses read offline.
    pub async fn evaluate(&self, address: IpAddr) -> StatusSnapshot {
        let Some(record) = self.monitor.record(address) else {
            return StatusSnapshot::new(address, false);
        };

        if record.forced_offline {
            let reason = record.forced_reason.unwrap_or_default();
            return StatusSnapshot::forced_offline(address, reason);
        }

        let mut snapshot = StatusSnapshot::new(address, record.is_online());
        match record.target.kind {
            TargetKind::Service { port } => {
                snapshot.enrichment.insert("port".into(), port.to_string());
                let url = snapshot
                    .online
                    .then(|| self.protocol.service_url(SocketAddr::new(address, port)))
                    .flatten();
                if let Some(url) = url {
                    snapshot.enrichment.insert("url".into(), url);
                }
            }
            TargetKind::Host if snapshot.online => self.enrich(&mut snapshot).await,
            TargetKind::Host => {}
        }
        snapshot
    }

    async fn enrich(&self, snapshot: &mut StatusSnapshot) {
        let limit = self.config.enrichment_timeout;
        let fetched = match timeout(limit, self.provider.fetch(snapshot.target)).await {
            Ok(result) => result,
            Err(_) => Err(EnrichmentError::Unreachable(format!(
                "enrichment timed out after {}ms",
                limit.as_millis()
            ))),
        };

        match fetched {
            Ok(metadata) => snapshot.enrichment = metadata,
            Err(e) => {
                if e.is_unreachable() {
                    debug!(address = %snapshot.target, error = %e, "enrichment says target went dark");
                    snapshot.online = false;
                } else {
                    debug!(address = %snapshot.target, error = %e, "enrichment failed");
                }
                snapshot.error = Some(e.to_string());
            }
        }
    }

    /// Host plus camera in one payload.
    ///
    /// The host is `pinned` when given, otherwise the earliest registered
    /// Host target that is not the camera.
    pub async fn evaluate_combined(
        &self,
        pinned: Option<IpAddr>,
        camera: Option<&ScanResult>,
    ) -> CombinedSnapshot {
        let camera_address = camera.map(|result| result.address);
        let host_address = pinned.or_else(|| self.monitor.primary_host(camera_address));

        let host = match host_address {
            Some(address) => host_section(&self.evaluate(address).await),
            None => HostSection::unavailable(None, "no host registered"),
        };

        CombinedSnapshot {
            timestamp: Utc::now(),
            host,
            camera: self.camera_section(camera),
        }
    }

    fn camera_section(&self, camera: Option<&ScanResult>) -> CameraSection {
        let Some(result) = camera else {
            return CameraSection {
                address: None,
                online: false,
                stream_url: None,
                error: Some("camera not discovered yet".into()),
            };
        };

        let online = self.monitor.is_online(result.address);
        CameraSection {
            address: Some(result.address),
            online,
            stream_url: self
                .protocol
                .service_url(SocketAddr::new(result.address, result.port)),
            error: (!online).then(|| "camera offline".to_owned()),
        }
    }
}

fn host_section(snapshot: &StatusSnapshot) -> HostSection {
    if !snapshot.online {
        let error = snapshot
            .error
            .clone()
            .or_else(|| snapshot.reason.clone())
            .unwrap_or_else(|| "host offline".into());
        return HostSection::unavailable(Some(snapshot.target), error);
    }

    let field = |key: &str| {
        snapshot
            .enrichment
            .get(key)
            .cloned()
            .unwrap_or_else(|| NOT_AVAILABLE.into())
    };
    HostSection {
        address: Some(snapshot.target),
        online: true,
        hostname: field("hostname"),
        os: field("os"),
        uptime: field("uptime"),
        error: snapshot.error.clone(),
    }
}
