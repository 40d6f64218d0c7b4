// ── Liveness monitor ──
//
// Owns one `LivenessRecord` per registered address. Probes run outside
// any map lock; their outcome is applied under the record's shard lock,
// which keeps transitions for one address totally ordered. An outcome
// from a probe that started before a newer applied probe, or before an
// administrative override, is stale and dropped.

use std::net::IpAddr;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures_util::future::join_all;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info, trace};

use crate::config::MonitorConfig;
use crate::model::{
    LivenessEvent, LivenessRecord, LivenessState, Target, TargetKind, TransitionCause,
};
use crate::probe::{ProbeBudget, Prober};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Per-target online/offline state machines with debounced sweeps.
pub struct LivenessMonitor {
    prober: Arc<dyn Prober>,
    config: MonitorConfig,
    records: DashMap<IpAddr, LivenessRecord>,
    events: broadcast::Sender<LivenessEvent>,
}

impl LivenessMonitor {
    pub fn new(prober: Arc<dyn Prober>, config: MonitorConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            prober,
            config,
            records: DashMap::new(),
            events,
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Add `target` and check it once right away.
    ///
    /// Returns `true` when the address was not registered before. An
    /// existing Host record is upgraded to a Service target; a Service
    /// record is never downgraded.
    pub async fn register(&self, target: Target) -> bool {
        let newly = match self.records.entry(target.address) {
            Entry::Occupied(mut slot) => {
                if target.is_service() && slot.get().target.kind != target.kind {
                    slot.get_mut().target = target;
                }
                false
            }
            Entry::Vacant(slot) => {
                slot.insert(LivenessRecord::new(target, Instant::now()));
                true
            }
        };

        if newly {
            info!(target = %target, "target registered");
            self.check(target, ProbeBudget::Full, TransitionCause::CheckNow)
                .await;
        }
        newly
    }

    /// Probe every registered target concurrently and apply the results.
    pub async fn sweep(&self) -> Vec<LivenessEvent> {
        let checks = self
            .targets()
            .into_iter()
            .map(|target| self.check(target, ProbeBudget::Full, TransitionCause::Sweep));
        join_all(checks).await.into_iter().flatten().collect()
    }

    /// Out-of-band probe with an immediate state update. A failure marks
    /// the target offline without waiting for the threshold.
    pub async fn check_now(&self, address: IpAddr) -> bool {
        self.check_with(address, ProbeBudget::Full).await
    }

    /// [`check_now`](Self::check_now) with the fast probe budget.
    pub async fn check_now_fast(&self, address: IpAddr) -> bool {
        self.check_with(address, ProbeBudget::Fast).await
    }

    async fn check_with(&self, address: IpAddr, budget: ProbeBudget) -> bool {
        let existing = self.records.get(&address).map(|record| record.target);
        match existing {
            Some(target) => {
                self.check(target, budget, TransitionCause::CheckNow).await;
            }
            None => {
                self.register(Target::host(address)).await;
            }
        }
        self.is_online(address)
    }

    /// Administrative override: offline now, and a probe that starts after
    /// this call must succeed before the target reads online again.
    pub fn mark_offline(&self, address: IpAddr, reason: &str) -> Option<LivenessEvent> {
        let now = Instant::now();
        let from = {
            let mut record = self
                .records
                .entry(address)
                .or_insert_with(|| LivenessRecord::new(Target::host(address), now));
            let from = record.state;
            record.state = LivenessState::Offline;
            record.forced_offline = true;
            record.forced_reason = Some(reason.to_owned());
            record.last_success_at = None;
            record.forced_at = Some(now);
            from
        };

        info!(address = %address, reason, "target forced offline");
        self.emit(address, from, LivenessState::Offline, TransitionCause::Forced)
    }

    /// Current answer for `address`. Never performs I/O; unknown
    /// addresses are offline.
    pub fn is_online(&self, address: IpAddr) -> bool {
        self.records
            .get(&address)
            .is_some_and(|record| record.is_online())
    }

    pub fn record(&self, address: IpAddr) -> Option<LivenessRecord> {
        self.records.get(&address).map(|record| record.clone())
    }

    pub fn targets(&self) -> Vec<Target> {
        self.records.iter().map(|record| record.target).collect()
    }

    /// Earliest registered Host target other than `excluding`.
    pub fn primary_host(&self, excluding: Option<IpAddr>) -> Option<IpAddr> {
        self.records
            .iter()
            .filter(|record| record.target.kind == TargetKind::Host)
            .filter(|record| Some(record.target.address) != excluding)
            .map(|record| (record.registered_at, record.target.address))
            .min()
            .map(|(_, address)| address)
    }

    /// Edge-triggered transitions from here on.
    pub fn events(&self) -> broadcast::Receiver<LivenessEvent> {
        self.events.subscribe()
    }

    // ── Internals ────────────────────────────────────────────────────

    async fn check(
        &self,
        target: Target,
        budget: ProbeBudget,
        cause: TransitionCause,
    ) -> Option<LivenessEvent> {
        let started = Instant::now();
        let reachable = self.prober.probe(target, budget).await;
        trace!(target = %target, reachable, ?budget, "probe applied");
        self.apply(target.address, started, reachable, cause)
    }

    fn apply(
        &self,
        address: IpAddr,
        started: Instant,
        reachable: bool,
        cause: TransitionCause,
    ) -> Option<LivenessEvent> {
        let (from, to) = {
            let mut record = self.records.get_mut(&address)?;

            if record.forced_at.is_some_and(|forced| started < forced) {
                debug!(address = %address, "dropping probe that started before override");
                return None;
            }
            if record.last_checked_at.is_some_and(|checked| started < checked) {
                trace!(address = %address, "dropping probe overtaken by a newer one");
                return None;
            }

            let now = Instant::now();
            record.last_checked_at = Some(started);
            let from = record.state;
            let to = if reachable {
                record.last_success_at = Some(now);
                record.forced_offline = false;
                record.forced_reason = None;
                LivenessState::Online
            } else {
                self.failure_state(&record, cause, now)
            };
            record.state = to;
            (from, to)
        };

        self.emit(address, from, to, cause)
    }

    /// State after a failed probe. Sweeps hold the current state until the
    /// last success is older than the threshold.
    fn failure_state(
        &self,
        record: &LivenessRecord,
        cause: TransitionCause,
        now: Instant,
    ) -> LivenessState {
        match (cause, record.last_success_at) {
            (TransitionCause::Sweep, Some(last))
                if now.duration_since(last) <= self.config.offline_threshold =>
            {
                record.state
            }
            _ => LivenessState::Offline,
        }
    }

    fn emit(
        &self,
        address: IpAddr,
        from: LivenessState,
        to: LivenessState,
        cause: TransitionCause,
    ) -> Option<LivenessEvent> {
        if from == to {
            return None;
        }
        info!(address = %address, %from, %to, %cause, "liveness changed");
        let event = LivenessEvent {
            address,
            from,
            to,
            cause,
            at: Utc::now(),
        };
        // No receivers is fine.
        let _ = self.events.send(event.clone());
        Some(event)
    }
}
