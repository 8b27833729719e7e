//! relay-door: forwards every accepted TCP connection to one destination.
//!
//! ```text
//!   client ──▶ Listener ──▶ Door ──▶ DirectDispatcher ──▶ destination
//!                            │              ▲
//!                            └── relay ─────┘ (request / response pipes)
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::Instrument;

use relay_core::config::load_config;
use relay_core::inbound::Door;
use relay_core::lifecycle::{shutdown_signal, Shutdown};
use relay_core::net::listener::{Listener, ListenerError};
use relay_core::net::{ConnectionTracker, Network};
use relay_core::observability::{logging, metrics};
use relay_core::policy::LevelPolicies;
use relay_core::routing::DirectDispatcher;

/// Time in-flight relays get to finish after shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(name = "relay-door", version, about = "Forward TCP connections to a fixed destination")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "relay-door.toml")]
    config: PathBuf,

    /// Log level, overriding the configured one.
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config(&args.config)?;

    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.observability.log_level);
    logging::init_logging(log_level);

    tracing::info!("relay-door v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        destination = ?config.door.address,
        port = config.door.port,
        follow_redirect = config.door.follow_redirect,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let policies = Arc::new(LevelPolicies::from_config(&config.policy));
    let door = Arc::new(Door::new(config.door.clone(), policies)?);
    if !door.networks().contains(&Network::Tcp) {
        return Err("relay-door only accepts tcp; add \"tcp\" to door.networks".into());
    }
    let dispatcher =
        Arc::new(DirectDispatcher::new(&config.dispatcher).with_buffer(door.policy().buffer));

    let listener = Listener::bind(&config.listener).await?;
    let tracker = ConnectionTracker::new();
    let shutdown = Shutdown::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            shutdown.trigger();
        });
    }

    loop {
        let accepted = tokio::select! {
            _ = shutdown.triggered() => break,
            accepted = listener.accept() => accepted,
        };
        let (stream, peer, permit) = match accepted {
            Ok(accepted) => accepted,
            Err(ListenerError::Accept(e)) => {
                tracing::warn!(error = %e, "Accept failed");
                continue;
            }
            Err(e) => {
                tracing::error!(error = %e, "Listener stopped");
                break;
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(error = %e, "Failed to set TCP_NODELAY");
        }

        let guard = tracker.track();
        let token = shutdown.subscribe();
        let door = door.clone();
        let dispatcher = dispatcher.clone();
        let span = tracing::info_span!("connection", id = %guard.id(), peer = %peer);

        tokio::spawn(
            async move {
                let _permit = permit;
                let _guard = guard;
                match door
                    .process(&token, Network::Tcp, stream, dispatcher.as_ref())
                    .await
                {
                    Ok(()) => tracing::debug!("Connection finished"),
                    Err(e) if e.is_cancelled() => tracing::debug!(error = %e, "Connection cancelled"),
                    Err(e) => tracing::warn!(error = %e, "Connection failed"),
                }
            }
            .instrument(span),
        );
    }

    tracing::info!(active = tracker.active_count(), "Draining connections");
    if tokio::time::timeout(DRAIN_TIMEOUT, tracker.drained()).await.is_err() {
        tracing::warn!(active = tracker.active_count(), "Drain timed out");
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
