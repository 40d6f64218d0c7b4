//! `netpulse watch`: run the engine and stream pushes as JSON lines.
//!
//! Output is always one compact JSON object per line, whatever `--output`
//! says, so the stream can be piped straight into `jq`.

use std::io::Write;

use futures_util::StreamExt;
use futures_util::stream::select_all;
use tracing::{debug, info};

use netpulse_core::{Engine, PushEvent, SubscriptionStream, channel};

use crate::cli::{GlobalOpts, WatchArgs};
use crate::config;
use crate::error::CliError;

fn write_line(event: &PushEvent) -> Result<(), CliError> {
    let line = serde_json::to_string(event)?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{line}")?;
    stdout.flush()?;
    Ok(())
}

pub async fn handle(args: WatchArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let global_topic = args.all || args.pin.is_some();
    if args.addresses.is_empty() && !global_topic {
        return Err(CliError::Validation {
            field: "addresses".into(),
            reason: "give at least one address, or --all / --pin".into(),
        });
    }

    let cfg = config::load(global)?;
    let mut engine_config = config::engine_config(global, &cfg)?;
    if let Some(camera) = args.camera {
        engine_config.scan.pinned = Some(camera);
    }
    if args.no_discovery {
        engine_config.scan.enabled = false;
    }
    let capacity = engine_config.status.channel_capacity;

    let engine = Engine::new(engine_config);
    let mut streams: Vec<SubscriptionStream> = Vec::new();

    for &address in &args.addresses {
        let (sink, stream) = channel(capacity);
        if engine.subscribe(address, Box::new(sink)).await.is_some() {
            streams.push(stream);
        }
    }
    if global_topic {
        let (sink, stream) = channel(capacity);
        if engine.subscribe_all(args.pin, Box::new(sink)).await.is_some() {
            streams.push(stream);
        }
    }

    engine.start().await;
    info!(
        targets = args.addresses.len(),
        all = global_topic,
        "watching"
    );

    let deadline = async {
        match args.duration {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    let mut events = select_all(streams);
    let result = loop {
        tokio::select! {
            biased;
            _ = tokio::signal::ctrl_c() => {
                debug!("interrupted");
                break Ok(());
            }
            () = &mut deadline => break Ok(()),
            event = events.next() => match event {
                Some(event) => {
                    if let Err(e) = write_line(&event) {
                        break Err(e);
                    }
                }
                None => break Ok(()),
            },
        }
    };

    engine.shutdown().await;
    result
}
