// ── Service discovery scanner ──
//
// Sweeps one /24 for the single device that speaks a known protocol on a
// known port. Candidates run in a bounded worker pool; a TCP connect is
// followed by a protocol handshake so unrelated services squatting on the
// port are rejected. The first confirmed address wins and becomes the
// current device until a later scan confirms another one.

use std::collections::HashSet;
use std::fmt;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use futures_util::future::BoxFuture;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{Instant, timeout};
use tracing::{debug, info, trace, warn};

use crate::config::ScanConfig;
use crate::error::CoreError;
use crate::model::{ScanOutcome, ScanResult, Target};
use crate::monitor::LivenessMonitor;
use crate::netif;

// ── Subnet prefix ────────────────────────────────────────────────────

/// The first three octets of an IPv4 /24.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubnetPrefix([u8; 3]);

impl SubnetPrefix {
    pub fn new(a: u8, b: u8, c: u8) -> Self {
        Self([a, b, c])
    }

    /// The /24 containing `ip`.
    pub fn of(ip: Ipv4Addr) -> Self {
        let [a, b, c, _] = ip.octets();
        Self([a, b, c])
    }

    /// Host addresses `.1` through `.254`.
    pub fn candidates(self) -> impl Iterator<Item = Ipv4Addr> {
        let [a, b, c] = self.0;
        (1..=254).map(move |d| Ipv4Addr::new(a, b, c, d))
    }

    pub fn contains(self, ip: IpAddr) -> bool {
        match ip {
            IpAddr::V4(v4) => Self::of(v4) == self,
            IpAddr::V6(_) => false,
        }
    }
}

impl fmt::Display for SubnetPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c] = self.0;
        write!(f, "{a}.{b}.{c}.0/24")
    }
}

impl FromStr for SubnetPrefix {
    type Err = CoreError;

    /// Accepts `192.168.1`, `192.168.1.` and `192.168.1.0/24`.
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        let (base, masked) = match trimmed.split_once('/') {
            Some((base, "24")) => (base, true),
            Some(_) => {
                return Err(CoreError::invalid_subnet(
                    input,
                    "only /24 prefixes are supported",
                ));
            }
            None => (trimmed.trim_end_matches('.'), false),
        };

        let parts: Vec<&str> = base.split('.').collect();
        let octets = match (parts.as_slice(), masked) {
            ([a, b, c], _) | ([a, b, c, _], true) => [*a, *b, *c],
            _ => {
                return Err(CoreError::invalid_subnet(
                    input,
                    "expected three octets, e.g. 192.168.1",
                ));
            }
        };

        let mut parsed = [0_u8; 3];
        for (slot, text) in parsed.iter_mut().zip(octets) {
            *slot = text
                .parse()
                .map_err(|_| CoreError::invalid_subnet(input, format!("'{text}' is not an octet")))?;
        }
        Ok(Self(parsed))
    }
}

/// Candidates of `prefix` minus any local address.
fn candidate_addresses(prefix: SubnetPrefix, excluded: &HashSet<IpAddr>) -> Vec<IpAddr> {
    prefix
        .candidates()
        .map(IpAddr::V4)
        .filter(|ip| !excluded.contains(ip))
        .collect()
}

// ── Protocol confirmation ────────────────────────────────────────────

/// The protocol step that separates the wanted device from port squatters.
pub trait ServiceProtocol: Send + Sync {
    fn name(&self) -> &'static str;

    /// Talk to a freshly connected peer; `Ok(true)` confirms the service.
    fn handshake<'a>(
        &'a self,
        stream: &'a mut TcpStream,
        peer: SocketAddr,
    ) -> BoxFuture<'a, io::Result<bool>>;

    /// Client-facing URL of a confirmed device, when the protocol has one.
    fn service_url(&self, peer: SocketAddr) -> Option<String>;
}

/// RTSP: `OPTIONS` request, status line must carry `RTSP/1.0`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RtspProtocol;

impl RtspProtocol {
    pub const DEFAULT_PORT: u16 = 554;
    const BANNER: &'static str = "RTSP/1.0";
    const MAX_STATUS_LINE: u64 = 256;
}

impl ServiceProtocol for RtspProtocol {
    fn name(&self) -> &'static str {
        "rtsp"
    }

    fn handshake<'a>(
        &'a self,
        stream: &'a mut TcpStream,
        peer: SocketAddr,
    ) -> BoxFuture<'a, io::Result<bool>> {
        Box::pin(async move {
            let request = format!(
                "OPTIONS rtsp://{}:{}/ RTSP/1.0\r\nCSeq: 1\r\nUser-Agent: netpulse\r\n\r\n",
                peer.ip(),
                peer.port()
            );
            stream.write_all(request.as_bytes()).await?;

            let mut line = String::new();
            let mut reader = BufReader::new(&mut *stream).take(Self::MAX_STATUS_LINE);
            reader.read_line(&mut line).await?;
            Ok(line.contains(Self::BANNER))
        })
    }

    fn service_url(&self, peer: SocketAddr) -> Option<String> {
        Some(format!("rtsp://{}:{}/", peer.ip(), peer.port()))
    }
}

// ── Scanner ──────────────────────────────────────────────────────────

/// Clears the in-flight flag when a scan ends, however it ends.
struct ScanGuard<'a>(&'a AtomicBool);

impl<'a> ScanGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for ScanGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Discovers the device and keeps the last confirmed result.
pub struct Scanner {
    config: ScanConfig,
    protocol: Arc<dyn ServiceProtocol>,
    monitor: Arc<LivenessMonitor>,
    current: ArcSwapOption<ScanResult>,
    in_flight: AtomicBool,
    last_offline_rescan: ArcSwapOption<Instant>,
    scans_started: AtomicU64,
}

impl Scanner {
    pub fn new(
        config: ScanConfig,
        protocol: Arc<dyn ServiceProtocol>,
        monitor: Arc<LivenessMonitor>,
    ) -> Self {
        Self {
            config,
            protocol,
            monitor,
            current: ArcSwapOption::empty(),
            in_flight: AtomicBool::new(false),
            last_offline_rescan: ArcSwapOption::empty(),
            scans_started: AtomicU64::new(0),
        }
    }

    pub fn protocol(&self) -> &Arc<dyn ServiceProtocol> {
        &self.protocol
    }

    pub fn current(&self) -> Option<Arc<ScanResult>> {
        self.current.load_full()
    }

    pub fn current_address(&self) -> Option<IpAddr> {
        self.current.load().as_ref().map(|result| result.address)
    }

    /// Number of sweeps that actually started a worker pool.
    pub fn scans_started(&self) -> u64 {
        self.scans_started.load(Ordering::Relaxed)
    }

    pub fn is_scanning(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Sweep `prefix`. A second caller while a sweep runs gets
    /// [`ScanOutcome::AlreadyRunning`] and starts nothing.
    pub async fn discover(&self, prefix: SubnetPrefix) -> ScanOutcome {
        let Some(_guard) = ScanGuard::acquire(&self.in_flight) else {
            debug!(subnet = %prefix, "scan already in flight, skipping");
            return ScanOutcome::AlreadyRunning;
        };
        self.scans_started.fetch_add(1, Ordering::Relaxed);

        let candidates = candidate_addresses(prefix, &netif::local_addresses());
        info!(
            subnet = %prefix,
            port = self.config.port,
            protocol = self.protocol.name(),
            candidates = candidates.len(),
            "starting service scan"
        );

        let started = Instant::now();
        let found = match timeout(self.config.scan_budget, self.sweep(candidates)).await {
            Ok(found) => found,
            Err(_) => {
                warn!(
                    subnet = %prefix,
                    budget_ms = self.config.scan_budget.as_millis(),
                    "scan budget exhausted"
                );
                None
            }
        };

        match found {
            Some(address) => {
                let result = ScanResult::new(address, self.config.port);
                info!(
                    address = %address,
                    elapsed_ms = started.elapsed().as_millis(),
                    "service device confirmed"
                );
                self.install(result.clone()).await;
                ScanOutcome::Found(result)
            }
            None => {
                info!(
                    subnet = %prefix,
                    elapsed_ms = started.elapsed().as_millis(),
                    kept = ?self.current_address(),
                    "no service device confirmed"
                );
                ScanOutcome::NotFound
            }
        }
    }

    /// Sweep the configured subnet, or the local one when none is set.
    pub async fn discover_local(&self) -> Result<ScanOutcome, CoreError> {
        let prefix = match self.config.subnet {
            Some(prefix) => prefix,
            None => netif::local_subnet()?,
        };
        Ok(self.discover(prefix).await)
    }

    /// Operator-requested rescan. Ignores the offline cooldown, still
    /// serialized with any running sweep.
    pub async fn force_scan(&self) -> Result<ScanOutcome, CoreError> {
        self.discover_local().await
    }

    /// Periodic discovery decision.
    ///
    /// No device known: scan. Known but offline: scan at most once per
    /// cooldown window. Known and online: nothing to do (`None`).
    pub async fn discover_if_needed(&self) -> Result<Option<ScanOutcome>, CoreError> {
        let Some(address) = self.current_address() else {
            return self.discover_local().await.map(Some);
        };
        if self.monitor.is_online(address) {
            return Ok(None);
        }

        let cooldown = self.config.offline_rescan_cooldown;
        let cooling = self
            .last_offline_rescan
            .load()
            .as_ref()
            .is_some_and(|last| last.elapsed() < cooldown);
        if cooling {
            trace!(address = %address, "device offline, rescan cooling down");
            return Ok(Some(ScanOutcome::CoolingDown));
        }

        info!(address = %address, "device offline, rescanning");
        let outcome = self.discover_local().await?;
        if outcome.did_scan() {
            self.last_offline_rescan.store(Some(Arc::new(Instant::now())));
        }
        Ok(Some(outcome))
    }

    /// Install a known address without scanning.
    pub async fn adopt(&self, address: IpAddr) -> ScanResult {
        let result = ScanResult::new(address, self.config.port);
        info!(address = %address, "adopting known service device");
        self.install(result.clone()).await;
        result
    }

    async fn install(&self, result: ScanResult) {
        let target = Target::service(result.address, result.port);
        self.current.store(Some(Arc::new(result)));
        self.monitor.register(target).await;
    }

    /// Run every candidate through the worker pool. Returns the first
    /// confirmed address; dropping the set aborts the stragglers.
    async fn sweep(&self, candidates: Vec<IpAddr>) -> Option<IpAddr> {
        let permits = Arc::new(Semaphore::new(self.config.workers.max(1)));
        let task_budget = self.config.task_budget();
        let connect_timeout = self.config.connect_timeout;
        let port = self.config.port;

        let mut tasks = JoinSet::new();
        for address in candidates {
            let permits = Arc::clone(&permits);
            let protocol = Arc::clone(&self.protocol);
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await.ok()?;
                let peer = SocketAddr::new(address, port);
                match timeout(task_budget, confirm(protocol.as_ref(), peer, connect_timeout)).await
                {
                    Ok(true) => Some(address),
                    Ok(false) => None,
                    Err(_) => {
                        trace!(peer = %peer, "candidate exceeded its budget");
                        None
                    }
                }
            });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Ok(Some(address)) = joined {
                return Some(address);
            }
        }
        None
    }
}

/// Connect, then handshake. Anything short of a confirmation is `false`.
async fn confirm(protocol: &dyn ServiceProtocol, peer: SocketAddr, limit: Duration) -> bool {
    let mut stream = match timeout(limit, TcpStream::connect(peer)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(_)) | Err(_) => return false,
    };
    match timeout(limit, protocol.handshake(&mut stream, peer)).await {
        Ok(Ok(confirmed)) => {
            if !confirmed {
                debug!(peer = %peer, protocol = protocol.name(), "port open but protocol not confirmed");
            }
            confirmed
        }
        Ok(Err(e)) => {
            trace!(peer = %peer, error = %e, "handshake failed");
            false
        }
        Err(_) => false,
    }
}
