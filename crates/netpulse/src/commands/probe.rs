//! `netpulse probe`: one-shot reachability check.

use std::net::IpAddr;
use std::time::Instant;

use futures_util::future::join_all;
use serde::Serialize;
use tabled::Tabled;

use netpulse_core::{NetworkProber, ProbeBudget, Target};

use crate::cli::{GlobalOpts, ProbeArgs};
use crate::config;
use crate::error::CliError;
use crate::output;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProbeReport {
    address: IpAddr,
    online: bool,
    method: Option<String>,
    elapsed_ms: u64,
}

#[derive(Tabled)]
struct ProbeRow {
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Method")]
    method: String,
    #[tabled(rename = "Time")]
    elapsed: String,
}

pub async fn handle(args: ProbeArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = config::load(global)?;
    let mut probe_config = config::engine_config(global, &cfg)?.probe;
    if args.no_icmp {
        probe_config.icmp = false;
    }
    if !args.ports.is_empty() {
        if args.ports.contains(&0) {
            return Err(CliError::Validation {
                field: "port".into(),
                reason: "port 0 is not a port".into(),
            });
        }
        probe_config.fallback_ports = args.ports;
    }
    let budget = if args.fast {
        ProbeBudget::Fast
    } else {
        ProbeBudget::Full
    };

    let prober = NetworkProber::new(probe_config);
    let reports: Vec<ProbeReport> = join_all(args.addresses.iter().map(|&address| {
        let prober = &prober;
        async move {
            let started = Instant::now();
            let method = prober.reach(Target::host(address), budget).await;
            ProbeReport {
                address,
                online: method.is_some(),
                method: method.as_ref().map(ToString::to_string),
                elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            }
        }
    }))
    .await;

    let color = output::should_color(config::color_mode(global, &cfg));
    let rendered = output::render_list(
        config::output_format(global, &cfg),
        &reports,
        |r| ProbeRow {
            address: r.address.to_string(),
            state: output::state_label(r.online, color),
            method: r.method.clone().unwrap_or_else(|| "-".into()),
            elapsed: format!("{} ms", r.elapsed_ms),
        },
        |r| format!("{} {}", r.address, if r.online { "online" } else { "offline" }),
    )?;
    output::print_output(&rendered, global.quiet);

    let count = reports.iter().filter(|r| !r.online).count();
    if count > 0 {
        return Err(CliError::Unreachable {
            count,
            total: reports.len(),
        });
    }
    Ok(())
}
