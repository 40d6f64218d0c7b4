#![allow(clippy::unwrap_used)]

// End-to-end engine tests against scripted collaborators. Time is paused,
// so periodic tasks advance as fast as the test awaits.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::future::BoxFuture;
use pretty_assertions::assert_eq;
use tokio::time::timeout;

use netpulse_core::{
    Engine, EngineConfig, EngineParts, NoEnrichment, ProbeBudget, Prober, PushEvent,
    RtspProtocol, ScanConfig, SubscriptionStream, Target, channel,
};

#[derive(Default)]
struct Switch {
    up: AtomicBool,
    calls: AtomicUsize,
}

impl Switch {
    fn up() -> Arc<Self> {
        let switch = Arc::new(Self::default());
        switch.set(true);
        switch
    }

    fn set(&self, up: bool) {
        self.up.store(up, Ordering::SeqCst);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Prober for Switch {
    fn probe(&self, _target: Target, _budget: ProbeBudget) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.up.load(Ordering::SeqCst)
        })
    }
}

fn pc() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(192, 168, 1, 50))
}

fn camera() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(192, 168, 1, 5))
}

fn config() -> EngineConfig {
    EngineConfig {
        scan: ScanConfig {
            enabled: false,
            ..ScanConfig::default()
        },
        ..EngineConfig::default()
    }
}

fn engine(config: EngineConfig, switch: &Arc<Switch>) -> Engine {
    Engine::with_parts(
        config,
        EngineParts {
            prober: Arc::clone(switch) as Arc<dyn Prober>,
            enrichment: Arc::new(NoEnrichment),
            protocol: Arc::new(RtspProtocol),
        },
    )
}

async fn next(stream: &mut SubscriptionStream) -> PushEvent {
    timeout(Duration::from_secs(60), stream.recv())
        .await
        .unwrap()
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn subscriber_gets_one_push_per_change() {
    let switch = Switch::up();
    let engine = engine(config(), &switch);
    let (sink, mut stream) = channel(16);

    engine.subscribe(pc(), Box::new(sink)).await.unwrap();
    assert!(stream.try_recv().is_none());

    engine.start().await;
    let first = next(&mut stream).await;
    assert!(first.as_status().unwrap().online);

    // Several sweeps with nothing changing.
    tokio::time::sleep(Duration::from_secs(9)).await;
    assert!(stream.try_recv().is_none());

    switch.set(false);
    let second = next(&mut stream).await;
    let snap = second.as_status().unwrap();
    assert!(!snap.online);
    assert_eq!(snap.target, pc());
    assert!(!engine.is_online(pc()));

    engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn mark_offline_reaches_target_and_global_subscribers() {
    let switch = Switch::up();
    let engine = engine(config(), &switch);
    let (target_sink, mut target_stream) = channel(16);
    let (global_sink, mut global_stream) = channel(16);

    engine.subscribe(pc(), Box::new(target_sink)).await.unwrap();
    engine
        .subscribe_all(Some(pc()), Box::new(global_sink))
        .await
        .unwrap();

    engine.mark_offline(pc(), "shutdown issued").await;

    let forced = target_stream.try_recv().unwrap();
    let snap = forced.as_status().unwrap();
    assert!(snap.forced_offline);
    assert_eq!(snap.reason.as_deref(), Some("shutdown issued"));

    let names: Vec<&str> = [global_stream.try_recv(), global_stream.try_recv()]
        .iter()
        .flatten()
        .map(PushEvent::name)
        .collect();
    assert_eq!(names, vec!["status", "systemStatus"]);
    assert!(!engine.is_online(pc()));
}

#[tokio::test(start_paused = true)]
async fn check_now_publishes_even_without_change() {
    let switch = Switch::up();
    let engine = engine(config(), &switch);
    let (sink, mut stream) = channel(16);
    engine.subscribe(pc(), Box::new(sink)).await.unwrap();

    assert!(engine.check_now(pc()).await);
    assert!(engine.check_now(pc()).await);
    assert!(stream.try_recv().is_some());
    assert!(stream.try_recv().is_some());
    assert!(stream.try_recv().is_none());
}

#[tokio::test(start_paused = true)]
async fn scheduled_check_runs_after_delay() {
    let switch = Switch::up();
    let engine = engine(config(), &switch);
    let (sink, mut stream) = channel(16);
    engine.subscribe(pc(), Box::new(sink)).await.unwrap();

    switch.set(false);
    engine.schedule_check(pc(), Duration::from_secs(5));
    assert!(engine.is_online(pc()));

    let event = next(&mut stream).await;
    assert!(!event.as_status().unwrap().online);
    assert!(!engine.is_online(pc()));
}

#[tokio::test(start_paused = true)]
async fn shutdown_cancels_pending_checks() {
    let switch = Switch::up();
    let engine = engine(config(), &switch);
    engine.register(pc()).await;
    let calls = switch.calls();

    engine.schedule_check(pc(), Duration::from_secs(600));
    timeout(Duration::from_secs(1), engine.shutdown())
        .await
        .unwrap();

    assert!(engine.is_shut_down());
    assert_eq!(switch.calls(), calls);
}

#[tokio::test(start_paused = true)]
async fn pinned_camera_is_adopted_and_reported() {
    let switch = Switch::up();
    let mut config = config();
    config.scan.pinned = Some(camera());
    let engine = engine(config, &switch);

    let (sink, mut stream) = channel(16);
    engine
        .subscribe_all(Some(pc()), Box::new(sink))
        .await
        .unwrap();
    engine.start().await;
    engine.start().await;

    assert_eq!(engine.current_address(), Some(camera()));
    assert!(engine.monitor().record(camera()).unwrap().target.is_service());

    let system = loop {
        if let PushEvent::SystemStatus(snap) = next(&mut stream).await {
            break snap;
        }
    };
    assert_eq!(system.host.address, Some(pc()));
    assert!(system.camera.online);
    assert_eq!(
        system.camera.stream_url.as_deref(),
        Some("rtsp://192.168.1.5:554/")
    );

    engine.shutdown().await;
}
