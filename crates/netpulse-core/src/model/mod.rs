// ── Domain model ──

pub mod event;
pub mod liveness;
pub mod scan;
pub mod snapshot;
pub mod target;

pub use event::{PushEvent, SubscriptionId, Topic};
pub use liveness::{LivenessEvent, LivenessRecord, LivenessState, TransitionCause};
pub use scan::{ScanOutcome, ScanResult};
pub use snapshot::{
    CameraSection, CombinedSnapshot, Enrichment, HostSection, NOT_AVAILABLE, StatusSnapshot,
};
pub use target::{Target, TargetKind, parse_address};
