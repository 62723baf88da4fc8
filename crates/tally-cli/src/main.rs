//! # Tally
//!
//! Reference orchestrator for the Tally subscribe core: registers the
//! configured subscriptions, feeds envelope files through the router and
//! prints what every sink received.
//!
//! ## Usage
//!
//! ```bash
//! # Route envelopes with the default config search path
//! tally envelope1.json envelope2.json
//!
//! # Use a specific config file
//! tally --config /path/to/tally.toml envelope.json
//!
//! # Adjust logging
//! RUST_LOG=tally_core=debug tally envelope.json
//! ```

mod config;

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use tally_core::{subscription_channels, Router, RouterConfig, SubscriptionReceivers};
use tally_protocol::{codec, ConnectionAction};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

struct Args {
    config: Option<PathBuf>,
    envelopes: Vec<PathBuf>,
}

fn parse_args() -> Result<Args> {
    let mut config = None;
    let mut envelopes = Vec::new();
    let mut args = std::env::args().skip(1);

    while let Some(arg) = args.next() {
        if arg == "--config" {
            let Some(path) = args.next() else {
                bail!("--config requires a path");
            };
            config = Some(PathBuf::from(path));
        } else {
            envelopes.push(PathBuf::from(arg));
        }
    }

    Ok(Args { config, envelopes })
}

fn print_received(receivers: &mut [(String, SubscriptionReceivers)]) {
    for (name, rx) in receivers.iter_mut() {
        for data in rx.drain_success() {
            println!("{name}: {}", String::from_utf8_lossy(&data));
        }
        for data in rx.drain_error() {
            println!("{name} (error): {}", String::from_utf8_lossy(&data));
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args()?;

    // Load configuration
    let config = match &args.config {
        Some(path) => config::Config::from_file(path)?,
        None => config::Config::load()?,
    };

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tally_core::metrics::describe_metrics();

    let router = Router::with_config(RouterConfig::from(&config.router));
    let mut receivers = Vec::new();

    for name in &config.subscribe.channels {
        let (sinks, rx) = subscription_channels(config.sinks.capacity);
        if router.subscribe_channel(name, sinks) {
            receivers.push((name.clone(), rx));
        }
    }
    for name in &config.subscribe.groups {
        let (sinks, rx) = subscription_channels(config.sinks.capacity);
        if router.subscribe_group(name, sinks) {
            receivers.push((name.clone(), rx));
        }
    }

    info!(
        channels = %router.channels().names_string(),
        groups = %router.groups().names_string(),
        "Subscribed"
    );

    router.announce_connected(ConnectionAction::Connected);
    print_received(&mut receivers);

    for path in &args.envelopes {
        router.apply_abort();

        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read envelope: {}", path.display()))?;

        let envelope = match codec::decode(&data) {
            Ok(envelope) => envelope,
            Err(e) => {
                error!(path = %path.display(), error = %e, "Skipping envelope");
                continue;
            }
        };

        let activity = envelope.activity();
        info!(
            path = %path.display(),
            timetoken = %envelope.timetoken.timetoken,
            channels = %activity.channels.join(","),
            groups = %activity.channel_groups.join(","),
            "Envelope activity"
        );

        let report = router.route(&envelope);
        info!(
            delivered = report.delivered,
            dropped = report.dropped,
            unmatched = report.unmatched,
            "Routed"
        );
        print_received(&mut receivers);
    }

    Ok(())
}
