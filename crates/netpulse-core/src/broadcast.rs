// ── Subscriber fan-out ──
//
// Subscribers are grouped per target plus one global set. Every delivery
// goes through an abstract `EventSink`; the first failed delivery (closed,
// full, expired) removes exactly that subscription and never blocks the
// others. The last snapshot per topic is cached so a new subscriber gets
// data immediately.

use std::net::IpAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use dashmap::DashMap;
use futures_core::Stream;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::Instant;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, trace};

use crate::model::{CombinedSnapshot, PushEvent, StatusSnapshot, SubscriptionId, Topic};

// ── Sinks ────────────────────────────────────────────────────────────

/// Why a delivery failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SinkError {
    #[error("subscriber went away")]
    Closed,
    #[error("subscriber is not keeping up")]
    Full,
}

/// Push one named event to one long-lived client connection.
pub trait EventSink: Send + Sync {
    fn send(&self, event: &PushEvent) -> Result<(), SinkError>;
}

/// Bounded in-process sink; pairs with a [`SubscriptionStream`].
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<PushEvent>,
}

impl EventSink for ChannelSink {
    fn send(&self, event: &PushEvent) -> Result<(), SinkError> {
        self.tx.try_send(event.clone()).map_err(|e| match e {
            TrySendError::Full(_) => SinkError::Full,
            TrySendError::Closed(_) => SinkError::Closed,
        })
    }
}

/// Receiving half of a channel subscription. Dropping it closes the sink.
pub struct SubscriptionStream {
    inner: ReceiverStream<PushEvent>,
}

impl SubscriptionStream {
    /// Next event, or `None` once the broadcaster dropped the sink.
    pub async fn recv(&mut self) -> Option<PushEvent> {
        self.inner.next().await
    }

    /// Next buffered event without waiting.
    pub fn try_recv(&mut self) -> Option<PushEvent> {
        self.inner.as_mut().try_recv().ok()
    }
}

impl Stream for SubscriptionStream {
    type Item = PushEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// A sink/stream pair buffering up to `capacity` events.
pub fn channel(capacity: usize) -> (ChannelSink, SubscriptionStream) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        ChannelSink { tx },
        SubscriptionStream {
            inner: ReceiverStream::new(rx),
        },
    )
}

// ── Broadcaster ──────────────────────────────────────────────────────

struct Subscription {
    id: SubscriptionId,
    sink: Arc<dyn EventSink>,
    created_at: Instant,
}

impl Subscription {
    fn new(sink: Arc<dyn EventSink>) -> Self {
        Self {
            id: SubscriptionId::new(),
            sink,
            created_at: Instant::now(),
        }
    }

    /// Deliver, or report why this subscription must go.
    fn deliver(&self, event: &PushEvent, ttl: Option<Duration>, now: Instant) -> bool {
        if ttl.is_some_and(|ttl| now.duration_since(self.created_at) >= ttl) {
            debug!(subscription = %self.id, "subscription expired");
            return false;
        }
        match self.sink.send(event) {
            Ok(()) => true,
            Err(e) => {
                debug!(subscription = %self.id, event = event.name(), error = %e, "dropping subscriber");
                false
            }
        }
    }
}

/// Owns every subscription and the last published snapshots.
pub struct Broadcaster {
    per_target: DashMap<IpAddr, Vec<Subscription>>,
    global: DashMap<SubscriptionId, Subscription>,
    topics: DashMap<SubscriptionId, Topic>,
    last_status: DashMap<IpAddr, Arc<StatusSnapshot>>,
    last_combined: ArcSwapOption<CombinedSnapshot>,
    ttl: Option<Duration>,
}

impl Broadcaster {
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            per_target: DashMap::new(),
            global: DashMap::new(),
            topics: DashMap::new(),
            last_status: DashMap::new(),
            last_combined: ArcSwapOption::empty(),
            ttl,
        }
    }

    /// Register `sink` for `topic`, then push the cached snapshot.
    ///
    /// The subscription is visible to publishers before the cache is read,
    /// so a publish racing with this call reaches the new sink either way.
    /// Returns `None` and registers nothing when the initial push fails.
    pub fn subscribe(&self, topic: Topic, sink: Box<dyn EventSink>) -> Option<SubscriptionId> {
        let sink: Arc<dyn EventSink> = Arc::from(sink);
        let subscription = Subscription::new(Arc::clone(&sink));
        let id = subscription.id;

        self.topics.insert(id, topic);
        match topic {
            Topic::Target(address) => self.per_target.entry(address).or_default().push(subscription),
            Topic::All => {
                self.global.insert(id, subscription);
            }
        }

        if let Err(e) = self.push_cached(topic, sink.as_ref()) {
            debug!(%topic, error = %e, "initial push failed, not subscribing");
            self.unsubscribe(id);
            return None;
        }
        debug!(subscription = %id, %topic, "subscribed");
        Some(id)
    }

    /// Send the cached snapshot for `topic` until the cache stops moving
    /// underneath the send. No map guard is held while the sink runs.
    fn push_cached(&self, topic: Topic, sink: &dyn EventSink) -> Result<(), SinkError> {
        let mut sent: Option<PushEvent> = None;
        loop {
            let cached = self.cached(topic);
            let settled = match (&cached, &sent) {
                (None, _) => true,
                (Some(now), Some(prev)) => now.same_payload(prev),
                (Some(_), None) => false,
            };
            if settled {
                return Ok(());
            }
            if let Some(event) = cached {
                sink.send(&event)?;
                sent = Some(event);
            }
        }
    }

    fn cached(&self, topic: Topic) -> Option<PushEvent> {
        match topic {
            Topic::Target(address) => self
                .last_status
                .get(&address)
                .map(|snap| PushEvent::Status(Arc::clone(&snap))),
            Topic::All => self.last_combined.load_full().map(PushEvent::SystemStatus),
        }
    }

    /// Remove a subscription. Returns `false` when it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let Some((_, topic)) = self.topics.remove(&id) else {
            return false;
        };
        match topic {
            Topic::All => {
                self.global.remove(&id);
            }
            Topic::Target(address) => {
                if let Some(mut bucket) = self.per_target.get_mut(&address) {
                    bucket.retain(|sub| sub.id != id);
                }
                self.per_target.remove_if(&address, |_, subs| subs.is_empty());
            }
        }
        debug!(subscription = %id, "unsubscribed");
        true
    }

    /// Publish when the snapshot differs from the last one for its target.
    pub fn publish(&self, snapshot: StatusSnapshot) -> bool {
        let unchanged = self
            .last_status
            .get(&snapshot.target)
            .is_some_and(|prev| prev.same_status_as(&snapshot));
        if unchanged {
            trace!(address = %snapshot.target, "status unchanged");
            return false;
        }
        self.force_publish(snapshot);
        true
    }

    /// Publish unconditionally; returns how many subscribers got it.
    pub fn force_publish(&self, snapshot: StatusSnapshot) -> usize {
        let address = snapshot.target;
        let snapshot = Arc::new(snapshot);
        self.last_status.insert(address, Arc::clone(&snapshot));

        let event = PushEvent::Status(snapshot);
        let delivered = self.deliver_to_target(address, &event) + self.deliver_to_global(&event);
        debug!(address = %address, delivered, "status published");
        delivered
    }

    /// Publish when the combined payload differs from the last one.
    pub fn publish_combined(&self, snapshot: CombinedSnapshot) -> bool {
        let unchanged = self
            .last_combined
            .load()
            .as_ref()
            .is_some_and(|prev| prev.same_status_as(&snapshot));
        if unchanged {
            trace!("system status unchanged");
            return false;
        }
        self.force_publish_combined(snapshot);
        true
    }

    pub fn force_publish_combined(&self, snapshot: CombinedSnapshot) -> usize {
        let snapshot = Arc::new(snapshot);
        self.last_combined.store(Some(Arc::clone(&snapshot)));

        let delivered = self.deliver_to_global(&PushEvent::SystemStatus(snapshot));
        debug!(delivered, "system status published");
        delivered
    }

    pub fn subscriber_count(&self, topic: &Topic) -> usize {
        match topic {
            Topic::Target(address) => self.per_target.get(address).map_or(0, |subs| subs.len()),
            Topic::All => self.global.len(),
        }
    }

    /// Addresses with at least one per-target subscriber.
    pub fn watched_targets(&self) -> Vec<IpAddr> {
        self.per_target.iter().map(|entry| *entry.key()).collect()
    }

    pub fn has_global_subscribers(&self) -> bool {
        !self.global.is_empty()
    }

    pub fn last_snapshot(&self, address: IpAddr) -> Option<Arc<StatusSnapshot>> {
        self.last_status.get(&address).map(|snap| Arc::clone(&snap))
    }

    pub fn last_combined(&self) -> Option<Arc<CombinedSnapshot>> {
        self.last_combined.load_full()
    }

    // ── Delivery ─────────────────────────────────────────────────────

    fn deliver_to_target(&self, address: IpAddr, event: &PushEvent) -> usize {
        let now = Instant::now();
        let mut delivered = 0;
        if let Some(mut bucket) = self.per_target.get_mut(&address) {
            bucket.retain(|sub| {
                let kept = sub.deliver(event, self.ttl, now);
                if kept {
                    delivered += 1;
                } else {
                    self.topics.remove(&sub.id);
                }
                kept
            });
        }
        self.per_target.remove_if(&address, |_, subs| subs.is_empty());
        delivered
    }

    fn deliver_to_global(&self, event: &PushEvent) -> usize {
        let now = Instant::now();
        let mut delivered = 0;
        self.global.retain(|id, sub| {
            let kept = sub.deliver(event, self.ttl, now);
            if kept {
                delivered += 1;
            } else {
                self.topics.remove(id);
            }
            kept
        });
        delivered
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{CameraSection, HostSection};
    use chrono::Utc;
    use std::net::Ipv4Addr;
    use std::sync::Mutex;

    /// Records every event; can be told to fail.
    #[derive(Clone, Default)]
    struct Recorder {
        events: Arc<Mutex<Vec<PushEvent>>>,
        fail_with: Option<SinkError>,
    }

    impl Recorder {
        fn failing(error: SinkError) -> Self {
            Self {
                fail_with: Some(error),
                ..Self::default()
            }
        }

        fn names(&self) -> Vec<&'static str> {
            self.events.lock().unwrap().iter().map(PushEvent::name).collect()
        }

        fn len(&self) -> usize {
            self.events.lock().unwrap().len()
        }
    }

    impl EventSink for Recorder {
        fn send(&self, event: &PushEvent) -> Result<(), SinkError> {
            if let Some(error) = self.fail_with {
                return Err(error);
            }
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(192, 168, 1, last))
    }

    fn combined(online: bool) -> CombinedSnapshot {
        CombinedSnapshot {
            timestamp: Utc::now(),
            host: HostSection::unavailable(Some(ip(50)), "host offline"),
            camera: CameraSection {
                address: Some(ip(5)),
                online,
                stream_url: None,
                error: None,
            },
        }
    }

    #[test]
    fn no_prior_snapshot_means_no_initial_push() {
        let broadcaster = Broadcaster::new(None);
        let sink = Recorder::default();
        broadcaster.subscribe(Topic::Target(ip(50)), Box::new(sink.clone())).unwrap();
        assert_eq!(sink.len(), 0);

        assert!(broadcaster.publish(StatusSnapshot::new(ip(50), true)));
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn late_subscriber_gets_cached_snapshot() {
        let broadcaster = Broadcaster::new(None);
        broadcaster.publish(StatusSnapshot::new(ip(50), true));

        let sink = Recorder::default();
        broadcaster.subscribe(Topic::Target(ip(50)), Box::new(sink.clone())).unwrap();
        assert_eq!(sink.names(), vec!["status"]);
    }

    #[test]
    fn unchanged_snapshot_is_published_once() {
        let broadcaster = Broadcaster::new(None);
        let sink = Recorder::default();
        broadcaster.subscribe(Topic::Target(ip(50)), Box::new(sink.clone()));

        assert!(broadcaster.publish(StatusSnapshot::new(ip(50), true)));
        assert!(!broadcaster.publish(StatusSnapshot::new(ip(50), true)));
        assert_eq!(sink.len(), 1);

        assert!(broadcaster.publish(StatusSnapshot::new(ip(50), false)));
        assert_eq!(sink.len(), 2);
    }

    #[test]
    fn failed_sink_is_dropped_without_blocking_others() {
        let broadcaster = Broadcaster::new(None);
        let healthy = Recorder::default();
        let topic = Topic::Target(ip(50));
        broadcaster.subscribe(topic, Box::new(Recorder::failing(SinkError::Closed)));
        broadcaster.subscribe(topic, Box::new(healthy.clone()));
        assert_eq!(broadcaster.subscriber_count(&topic), 2);

        assert_eq!(broadcaster.force_publish(StatusSnapshot::new(ip(50), true)), 1);
        assert_eq!(broadcaster.subscriber_count(&topic), 1);
        assert_eq!(healthy.len(), 1);
    }

    #[test]
    fn failing_initial_push_registers_nothing() {
        let broadcaster = Broadcaster::new(None);
        broadcaster.publish(StatusSnapshot::new(ip(50), true));

        let id = broadcaster.subscribe(
            Topic::Target(ip(50)),
            Box::new(Recorder::failing(SinkError::Full)),
        );
        assert_eq!(id, None);
        assert_eq!(broadcaster.subscriber_count(&Topic::Target(ip(50))), 0);
    }

    /// Publishes `offline` from inside its first delivery, the way a
    /// concurrent sweep can land between registration and the cached push.
    struct Interleaved {
        broadcaster: Arc<Broadcaster>,
        seen: Arc<Mutex<Vec<bool>>>,
        fired: std::sync::atomic::AtomicBool,
    }

    impl EventSink for Interleaved {
        fn send(&self, event: &PushEvent) -> Result<(), SinkError> {
            let online = event.as_status().is_some_and(|snap| snap.online);
            self.seen.lock().unwrap().push(online);
            if !self.fired.swap(true, std::sync::atomic::Ordering::SeqCst) {
                self.broadcaster.publish(StatusSnapshot::new(ip(50), false));
            }
            Ok(())
        }
    }

    #[test]
    fn publish_during_initial_push_reaches_new_subscriber() {
        let broadcaster = Arc::new(Broadcaster::new(None));
        broadcaster.publish(StatusSnapshot::new(ip(50), true));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Interleaved {
            broadcaster: Arc::clone(&broadcaster),
            seen: Arc::clone(&seen),
            fired: std::sync::atomic::AtomicBool::new(false),
        };
        let id = broadcaster.subscribe(Topic::Target(ip(50)), Box::new(sink));
        assert!(id.is_some());

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen.first(), Some(&true));
        assert_eq!(seen.last(), Some(&false));
        assert!(!broadcaster.last_snapshot(ip(50)).unwrap().online);
        assert!(!broadcaster.publish(StatusSnapshot::new(ip(50), false)));
    }

    #[test]
    fn publish_during_initial_combined_push_reaches_new_subscriber() {
        struct Global {
            broadcaster: Arc<Broadcaster>,
            seen: Arc<Mutex<Vec<bool>>>,
        }

        impl EventSink for Global {
            fn send(&self, event: &PushEvent) -> Result<(), SinkError> {
                let online = event.as_system_status().is_some_and(|snap| snap.camera.online);
                let first = {
                    let mut seen = self.seen.lock().unwrap();
                    seen.push(online);
                    seen.len() == 1
                };
                if first {
                    self.broadcaster.publish_combined(combined(false));
                }
                Ok(())
            }
        }

        let broadcaster = Arc::new(Broadcaster::new(None));
        broadcaster.publish_combined(combined(true));

        let seen = Arc::new(Mutex::new(Vec::new()));
        broadcaster
            .subscribe(
                Topic::All,
                Box::new(Global {
                    broadcaster: Arc::clone(&broadcaster),
                    seen: Arc::clone(&seen),
                }),
            )
            .unwrap();

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen.first(), Some(&true));
        assert_eq!(seen.last(), Some(&false));
    }

    #[test]
    fn failed_initial_push_leaves_no_topic_behind() {
        let broadcaster = Broadcaster::new(None);
        broadcaster.publish(StatusSnapshot::new(ip(50), true));

        let id = broadcaster.subscribe(
            Topic::Target(ip(50)),
            Box::new(Recorder::failing(SinkError::Closed)),
        );
        assert_eq!(id, None);
        assert!(broadcaster.topics.is_empty());
        assert!(broadcaster.watched_targets().is_empty());
    }

    #[test]
    fn global_subscribers_see_status_and_system_status() {
        let broadcaster = Broadcaster::new(None);
        let sink = Recorder::default();
        broadcaster.subscribe(Topic::All, Box::new(sink.clone()));

        broadcaster.publish(StatusSnapshot::new(ip(50), true));
        assert!(broadcaster.publish_combined(combined(true)));
        assert!(!broadcaster.publish_combined(combined(true)));
        assert!(broadcaster.publish_combined(combined(false)));

        assert_eq!(sink.names(), vec!["status", "systemStatus", "systemStatus"]);
    }

    #[test]
    fn empty_bucket_is_removed() {
        let broadcaster = Broadcaster::new(None);
        let id = broadcaster
            .subscribe(Topic::Target(ip(50)), Box::new(Recorder::default()))
            .unwrap();
        assert_eq!(broadcaster.watched_targets(), vec![ip(50)]);

        assert!(broadcaster.unsubscribe(id));
        assert!(!broadcaster.unsubscribe(id));
        assert!(broadcaster.watched_targets().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn expired_subscription_is_dropped_on_next_delivery() {
        let broadcaster = Broadcaster::new(Some(Duration::from_secs(60)));
        let sink = Recorder::default();
        broadcaster.subscribe(Topic::All, Box::new(sink.clone()));

        broadcaster.publish_combined(combined(true));
        tokio::time::advance(Duration::from_secs(61)).await;
        broadcaster.publish_combined(combined(false));

        assert_eq!(sink.len(), 1);
        assert!(!broadcaster.has_global_subscribers());
    }

    #[tokio::test]
    async fn channel_subscription_streams_events() {
        let broadcaster = Broadcaster::new(None);
        let (sink, mut stream) = channel(4);
        broadcaster.subscribe(Topic::Target(ip(50)), Box::new(sink));

        broadcaster.publish(StatusSnapshot::new(ip(50), true));
        let event = stream.recv().await.unwrap();
        assert!(event.as_status().unwrap().online);
        assert!(stream.try_recv().is_none());
    }

    #[tokio::test]
    async fn stalled_channel_counts_as_failure() {
        let broadcaster = Broadcaster::new(None);
        let (sink, _stream) = channel(1);
        let topic = Topic::Target(ip(50));
        broadcaster.subscribe(topic, Box::new(sink));

        broadcaster.publish(StatusSnapshot::new(ip(50), true));
        broadcaster.publish(StatusSnapshot::new(ip(50), false));
        assert_eq!(broadcaster.subscriber_count(&topic), 0);
    }

    #[tokio::test]
    async fn dropped_stream_closes_the_sink() {
        let broadcaster = Broadcaster::new(None);
        let (sink, stream) = channel(4);
        let topic = Topic::Target(ip(50));
        broadcaster.subscribe(topic, Box::new(sink));
        drop(stream);

        assert_eq!(broadcaster.force_publish(StatusSnapshot::new(ip(50), true)), 0);
        assert_eq!(broadcaster.subscriber_count(&topic), 0);
    }
}
