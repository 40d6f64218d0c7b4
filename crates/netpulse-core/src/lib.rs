//! Liveness monitoring, service discovery and status fan-out.
//!
//! This crate owns the cooperating loops behind `netpulse`:
//!
//! - **[`Engine`]**: Central facade. [`start()`](Engine::start) spawns the
//!   liveness sweep, status sweep, combined sweep and discovery check on one
//!   task tracker; [`shutdown()`](Engine::shutdown) cancels and joins them.
//!
//! - **[`LivenessMonitor`]**: Per-target online/offline state machines with
//!   a debounce threshold, `check_now` and `mark_offline` overrides, and
//!   edge-triggered [`LivenessEvent`]s.
//!
//! - **[`Scanner`]**: Bounded-concurrency /24 sweep with a protocol
//!   handshake ([`RtspProtocol`] by default). Keeps the last confirmed
//!   device and registers it with the monitor.
//!
//! - **[`StatusAggregator`]**: Builds [`StatusSnapshot`]s and the combined
//!   host + camera [`CombinedSnapshot`], folding enrichment failures into the
//!   snapshot.
//!
//! - **[`Broadcaster`]**: Per-target and global subscriber sets behind the
//!   [`EventSink`] abstraction, with change detection and drop-on-failure.
//!
//! Network access goes through the [`Prober`], [`ServiceProtocol`] and
//! [`EnrichmentProvider`] traits so every loop can run against fakes.

pub mod broadcast;
pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod monitor;
pub mod netif;
pub mod probe;
pub mod scan;
pub mod status;

// ── Primary re-exports ──────────────────────────────────────────────
pub use broadcast::{Broadcaster, ChannelSink, EventSink, SinkError, SubscriptionStream, channel};
pub use config::{EngineConfig, MonitorConfig, ProbeConfig, ScanConfig, StatusConfig};
pub use engine::{Engine, EngineParts};
pub use error::CoreError;
pub use monitor::LivenessMonitor;
pub use probe::{NetworkProber, ProbeBudget, ProbeMethod, Prober};
pub use scan::{RtspProtocol, Scanner, ServiceProtocol, SubnetPrefix};
pub use status::{EnrichmentError, EnrichmentProvider, NoEnrichment, StatusAggregator};

// Re-export model types at the crate root for ergonomics.
pub use model::{
    CameraSection, CombinedSnapshot, Enrichment, HostSection, LivenessEvent, LivenessRecord,
    LivenessState, NOT_AVAILABLE, PushEvent, ScanOutcome, ScanResult, StatusSnapshot,
    SubscriptionId, Target, TargetKind, Topic, TransitionCause, parse_address,
};
