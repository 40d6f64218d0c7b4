//! `netpulse discover`: sweep a /24 for the service device.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use netpulse_core::{Engine, ScanOutcome, ScanResult, SubnetPrefix, netif};

use crate::cli::{DiscoverArgs, GlobalOpts};
use crate::config;
use crate::error::CliError;
use crate::output;

fn spinner(quiet: bool, message: String) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.blue} {msg} {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn detail(result: &ScanResult, url: Option<&str>) -> String {
    let mut lines = vec![
        format!("Address:    {}", result.address),
        format!("Port:       {}", result.port),
        format!("Confirmed:  {}", result.confirmed_at.to_rfc3339()),
    ];
    if let Some(url) = url {
        lines.push(format!("Stream:     {url}"));
    }
    lines.join("\n")
}

pub async fn handle(args: DiscoverArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = config::load(global)?;
    let mut engine_config = config::engine_config(global, &cfg)?;
    if let Some(port) = args.port {
        if port == 0 {
            return Err(CliError::Validation {
                field: "port".into(),
                reason: "port 0 is not a port".into(),
            });
        }
        engine_config.scan.port = port;
    }
    if let Some(workers) = args.workers {
        if workers == 0 {
            return Err(CliError::Validation {
                field: "workers".into(),
                reason: "need at least one worker".into(),
            });
        }
        engine_config.scan.workers = workers;
    }

    let prefix = match args.subnet.as_deref() {
        Some(raw) => raw.parse::<SubnetPrefix>()?,
        None => match engine_config.scan.subnet {
            Some(prefix) => prefix,
            None => netif::local_subnet()?,
        },
    };

    let engine = Engine::new(engine_config);
    let protocol = engine.scanner().protocol().name().to_owned();

    let pb = spinner(global.quiet, format!("Sweeping {prefix} for {protocol}..."));
    let outcome = engine.discover(prefix).await;
    pb.finish_and_clear();
    engine.shutdown().await;

    let result = match outcome {
        ScanOutcome::Found(result) => result,
        ScanOutcome::NotFound => {
            return Err(CliError::NotFound {
                protocol,
                subnet: prefix.to_string(),
            });
        }
        ScanOutcome::AlreadyRunning | ScanOutcome::CoolingDown => {
            return Err(CliError::Internal(
                "fresh scanner refused to sweep".into(),
            ));
        }
    };

    let url = engine
        .scanner()
        .protocol()
        .service_url(std::net::SocketAddr::new(result.address, result.port));
    let rendered = output::render_single(
        config::output_format(global, &cfg),
        &result,
        |r| detail(r, url.as_deref()),
        |r| r.address.to_string(),
    )?;
    output::print_output(&rendered, global.quiet);
    Ok(())
}
