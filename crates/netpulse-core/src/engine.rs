// ── Engine facade ──
//
// Wires prober, monitor, scanner, aggregator and broadcaster together and
// owns the background schedule: liveness sweep, status sweep, combined
// sweep and discovery check, plus any delayed re-checks. Every task runs
// on one tracker under one cancellation token so shutdown is uniform.

use std::future::Future;
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use futures_util::future::join_all;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

use crate::broadcast::{Broadcaster, EventSink};
use crate::config::EngineConfig;
use crate::error::CoreError;
use crate::model::{
    CombinedSnapshot, LivenessEvent, ScanOutcome, StatusSnapshot, SubscriptionId, Target, Topic,
};
use crate::monitor::LivenessMonitor;
use crate::probe::{NetworkProber, Prober};
use crate::scan::{RtspProtocol, Scanner, ServiceProtocol, SubnetPrefix};
use crate::status::{EnrichmentProvider, NoEnrichment, StatusAggregator};

/// External collaborators the engine talks through.
pub struct EngineParts {
    pub prober: Arc<dyn Prober>,
    pub enrichment: Arc<dyn EnrichmentProvider>,
    pub protocol: Arc<dyn ServiceProtocol>,
}

/// The main entry point for consumers.
///
/// Cheaply cloneable. Construct with [`Engine::new`] (real network) or
/// [`Engine::with_parts`] (injected collaborators), then [`start`](Self::start)
/// the background schedule and [`shutdown`](Self::shutdown) when done.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: EngineConfig,
    monitor: Arc<LivenessMonitor>,
    scanner: Scanner,
    aggregator: StatusAggregator,
    broadcaster: Broadcaster,
    /// Host shown in the combined payload, when a global subscriber pinned one.
    pinned_host: ArcSwapOption<IpAddr>,
    cancel: CancellationToken,
    tasks: TaskTracker,
    started: AtomicBool,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let parts = EngineParts {
            prober: Arc::new(NetworkProber::new(config.probe.clone())),
            enrichment: Arc::new(NoEnrichment),
            protocol: Arc::new(RtspProtocol),
        };
        Self::with_parts(config, parts)
    }

    pub fn with_parts(config: EngineConfig, parts: EngineParts) -> Self {
        let monitor = Arc::new(LivenessMonitor::new(parts.prober, config.monitor.clone()));
        let scanner = Scanner::new(
            config.scan.clone(),
            Arc::clone(&parts.protocol),
            Arc::clone(&monitor),
        );
        let aggregator = StatusAggregator::new(
            Arc::clone(&monitor),
            parts.enrichment,
            parts.protocol,
            config.status.clone(),
        );
        let broadcaster = Broadcaster::new(config.status.subscription_ttl);

        Self {
            inner: Arc::new(EngineInner {
                config,
                monitor,
                scanner,
                aggregator,
                broadcaster,
                pinned_host: ArcSwapOption::empty(),
                cancel: CancellationToken::new(),
                tasks: TaskTracker::new(),
                started: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn monitor(&self) -> &LivenessMonitor {
        &self.inner.monitor
    }

    pub fn scanner(&self) -> &Scanner {
        &self.inner.scanner
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.inner.broadcaster
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Adopt a pinned device, then spawn the periodic tasks. Calling it
    /// again is a no-op.
    pub async fn start(&self) {
        if self.inner.started.swap(true, Ordering::AcqRel) {
            debug!("engine already started");
            return;
        }

        if let Some(address) = self.inner.config.scan.pinned {
            self.inner.scanner.adopt(address).await;
        }

        let monitor_cfg = &self.inner.config.monitor;
        let status_cfg = &self.inner.config.status;
        let scan_cfg = &self.inner.config.scan;

        self.spawn_periodic("liveness", monitor_cfg.sweep_interval, true, |engine| async move {
            engine.inner.monitor.sweep().await;
        });
        self.spawn_periodic("status", status_cfg.status_interval, false, |engine| async move {
            engine.publish_statuses().await;
        });
        self.spawn_periodic("combined", status_cfg.combined_interval, false, |engine| async move {
            engine.publish_combined().await;
        });
        self.spawn_periodic("discovery", scan_cfg.check_interval, false, |engine| async move {
            engine.discovery_check().await;
        });

        info!(
            sweep_ms = monitor_cfg.sweep_interval.as_millis(),
            threshold_ms = monitor_cfg.offline_threshold.as_millis(),
            discovery = scan_cfg.enabled,
            "engine started"
        );
    }

    /// Cancel every periodic and scheduled task and wait for them.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        self.inner.tasks.close();
        self.inner.tasks.wait().await;
        info!("engine stopped");
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    fn spawn_periodic<F, Fut>(&self, name: &'static str, period: Duration, skip_first: bool, work: F)
    where
        F: Fn(Engine) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let engine = self.clone();
        let cancel = self.inner.cancel.clone();
        self.inner.tasks.spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            if skip_first {
                interval.tick().await;
            }

            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    _ = interval.tick() => work(engine.clone()).await,
                }
            }
            debug!(task = name, "periodic task stopped");
        });
    }

    // ── Request-driven operations ────────────────────────────────────

    /// Start monitoring a host. Returns `true` when it was new.
    pub async fn register(&self, address: IpAddr) -> bool {
        self.inner.monitor.register(Target::host(address)).await
    }

    /// Subscribe to status events for one address (registering it).
    pub async fn subscribe(
        &self,
        address: IpAddr,
        sink: Box<dyn EventSink>,
    ) -> Option<SubscriptionId> {
        self.register(address).await;
        self.inner
            .broadcaster
            .subscribe(Topic::Target(address), sink)
    }

    /// Subscribe to every status event plus the combined system status.
    /// `pinned` selects the host shown in the combined payload.
    pub async fn subscribe_all(
        &self,
        pinned: Option<IpAddr>,
        sink: Box<dyn EventSink>,
    ) -> Option<SubscriptionId> {
        if let Some(address) = pinned {
            self.register(address).await;
            self.inner.pinned_host.store(Some(Arc::new(address)));
        }
        self.inner.broadcaster.subscribe(Topic::All, sink)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.broadcaster.unsubscribe(id)
    }

    /// Probe now, re-evaluate, and push the result to subscribers even if
    /// nothing changed.
    pub async fn check_now(&self, address: IpAddr) -> bool {
        let online = self.inner.monitor.check_now(address).await;
        let snapshot = self.inner.aggregator.evaluate(address).await;
        self.inner.broadcaster.force_publish(snapshot);
        online
    }

    /// Administrative override, published immediately to target and
    /// global subscribers.
    pub async fn mark_offline(&self, address: IpAddr, reason: &str) {
        self.inner.monitor.mark_offline(address, reason);
        self.inner
            .broadcaster
            .force_publish(StatusSnapshot::forced_offline(address, reason));

        if self.inner.broadcaster.has_global_subscribers() {
            let combined = self.evaluate_combined().await;
            self.inner.broadcaster.force_publish_combined(combined);
        }
    }

    /// Re-check `address` after `delay`, unless the engine shuts down first.
    pub fn schedule_check(&self, address: IpAddr, delay: Duration) {
        let engine = self.clone();
        let cancel = self.inner.cancel.clone();
        self.inner.tasks.spawn(async move {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {}
                () = tokio::time::sleep(delay) => {
                    let online = engine.check_now(address).await;
                    debug!(address = %address, online, "scheduled check finished");
                }
            }
        });
    }

    pub fn is_online(&self, address: IpAddr) -> bool {
        self.inner.monitor.is_online(address)
    }

    pub async fn discover(&self, prefix: SubnetPrefix) -> ScanOutcome {
        self.inner.scanner.discover(prefix).await
    }

    pub async fn force_scan(&self) -> Result<ScanOutcome, CoreError> {
        self.inner.scanner.force_scan().await
    }

    pub fn current_address(&self) -> Option<IpAddr> {
        self.inner.scanner.current_address()
    }

    pub fn liveness_events(&self) -> broadcast::Receiver<LivenessEvent> {
        self.inner.monitor.events()
    }

    // ── Periodic work ────────────────────────────────────────────────

    /// Evaluate watched targets (every target when someone listens to all)
    /// and publish the ones that changed.
    async fn publish_statuses(&self) {
        let broadcaster = &self.inner.broadcaster;
        let addresses: Vec<IpAddr> = if broadcaster.has_global_subscribers() {
            self.inner
                .monitor
                .targets()
                .into_iter()
                .map(|target| target.address)
                .collect()
        } else {
            broadcaster.watched_targets()
        };
        if addresses.is_empty() {
            return;
        }

        let snapshots = join_all(
            addresses
                .into_iter()
                .map(|address| self.inner.aggregator.evaluate(address)),
        )
        .await;
        for snapshot in snapshots {
            broadcaster.publish(snapshot);
        }
    }

    async fn publish_combined(&self) {
        if !self.inner.broadcaster.has_global_subscribers() {
            return;
        }
        let combined = self.evaluate_combined().await;
        self.inner.broadcaster.publish_combined(combined);
    }

    async fn evaluate_combined(&self) -> CombinedSnapshot {
        let pinned = self.inner.pinned_host.load().as_deref().copied();
        let camera = self.inner.scanner.current();
        self.inner
            .aggregator
            .evaluate_combined(pinned, camera.as_deref())
            .await
    }

    /// Rescan when needed, then publish the device's own status.
    async fn discovery_check(&self) {
        if self.inner.config.scan.enabled {
            match self.inner.scanner.discover_if_needed().await {
                Ok(Some(outcome)) => debug!(?outcome, "discovery check ran"),
                Ok(None) => {}
                Err(e) => debug!(error = %e, "discovery check skipped"),
            }
        }

        if let Some(address) = self.inner.scanner.current_address() {
            let snapshot = self.inner.aggregator.evaluate(address).await;
            self.inner.broadcaster.publish(snapshot);
        }
    }
}
