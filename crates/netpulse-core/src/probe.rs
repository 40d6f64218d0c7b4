// ── Reachability prober ──
//
// One liveness check against one address, layered: an echo request
// through the system `ping` utility, then TCP connects raced across the
// fallback ports. Unreachability is a normal answer, never an error.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::process::Stdio;
use std::time::Duration;

use futures_util::StreamExt;
use futures_util::future::BoxFuture;
use futures_util::stream::FuturesUnordered;
use tokio::net::TcpStream;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::trace;

use crate::config::ProbeConfig;
use crate::model::{Target, TargetKind};

/// How much time a probe may spend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProbeBudget {
    /// Regular sweep budget.
    #[default]
    Full,
    /// Short budget for recovery checks that must not hold up a sweep.
    Fast,
}

/// The probe method that got an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeMethod {
    Icmp,
    Tcp(u16),
}

impl std::fmt::Display for ProbeMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Icmp => f.write_str("icmp"),
            Self::Tcp(port) => write!(f, "tcp/{port}"),
        }
    }
}

/// Answers "is this target reachable right now?".
///
/// Implementations must bound their own latency and must not fail:
/// every problem maps to `false`.
pub trait Prober: Send + Sync {
    fn probe(&self, target: Target, budget: ProbeBudget) -> BoxFuture<'_, bool>;
}

/// Prober backed by real network calls.
#[derive(Debug, Clone)]
pub struct NetworkProber {
    config: ProbeConfig,
}

impl NetworkProber {
    pub fn new(config: ProbeConfig) -> Self {
        Self { config }
    }

    fn timeout_for(&self, budget: ProbeBudget) -> Duration {
        match budget {
            ProbeBudget::Full => self.config.timeout,
            ProbeBudget::Fast => self.config.fast_timeout,
        }
    }

    /// Run the layered check and report which method answered.
    pub async fn reach(&self, target: Target, budget: ProbeBudget) -> Option<ProbeMethod> {
        let limit = self.timeout_for(budget);

        if self.config.icmp && echo(target.address, limit).await {
            return Some(ProbeMethod::Icmp);
        }

        // A service is up only when its own port accepts.
        let (ports, refused_is_alive): (&[u16], bool) = match &target.kind {
            TargetKind::Host => (&self.config.fallback_ports, self.config.refused_is_alive),
            TargetKind::Service { port } => (std::slice::from_ref(port), false),
        };
        connect_any(target.address, ports, limit, refused_is_alive)
            .await
            .map(ProbeMethod::Tcp)
    }
}

impl Prober for NetworkProber {
    fn probe(&self, target: Target, budget: ProbeBudget) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            let method = self.reach(target, budget).await;
            trace!(target = %target, ?budget, method = ?method, "probe finished");
            method.is_some()
        })
    }
}

// ── Echo request ─────────────────────────────────────────────────────

async fn echo(address: IpAddr, limit: Duration) -> bool {
    let mut cmd = ping_command(address, limit);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    let child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            trace!(error = %e, "ping unavailable");
            return false;
        }
    };

    match timeout(limit, child.wait_with_output()).await {
        Ok(Ok(output)) => output.status.success(),
        Ok(Err(e)) => {
            trace!(address = %address, error = %e, "ping failed");
            false
        }
        // Dropping the future kills the child.
        Err(_) => false,
    }
}

/// Whole seconds for utilities that take a second-granular wait, at least 1.
fn wait_secs(limit: Duration) -> u64 {
    limit.as_secs() + u64::from(limit.subsec_nanos() > 0)
}

fn ping_command(address: IpAddr, limit: Duration) -> Command {
    let mut cmd = Command::new("ping");
    if cfg!(target_os = "windows") {
        cmd.args(["-n", "1", "-w"]).arg(limit.as_millis().to_string());
    } else if cfg!(target_os = "macos") {
        cmd.args(["-c", "1", "-t"])
            .arg(wait_secs(limit).max(1).to_string());
    } else {
        cmd.args(["-c", "1", "-W"])
            .arg(wait_secs(limit).max(1).to_string());
    }
    cmd.arg(address.to_string());
    cmd
}

// ── TCP fallback ─────────────────────────────────────────────────────

/// Race a connect to every port; the first port that answers wins.
async fn connect_any(
    address: IpAddr,
    ports: &[u16],
    limit: Duration,
    refused_is_alive: bool,
) -> Option<u16> {
    let mut attempts: FuturesUnordered<_> = ports
        .iter()
        .map(|&port| async move {
            let outcome = timeout(limit, TcpStream::connect(SocketAddr::new(address, port))).await;
            answered(outcome, refused_is_alive).then_some(port)
        })
        .collect();

    while let Some(result) = attempts.next().await {
        if result.is_some() {
            return result;
        }
    }
    None
}

fn answered<T>(
    outcome: Result<io::Result<T>, tokio::time::error::Elapsed>,
    refused_is_alive: bool,
) -> bool {
    match outcome {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => refused_is_alive && e.kind() == io::ErrorKind::ConnectionRefused,
        Err(_) => false,
    }
}
