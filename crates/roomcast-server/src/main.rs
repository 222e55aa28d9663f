//! Roomcast server binary.
//!
//! # Usage
//!
//! ```bash
//! # Default: listen on 0.0.0.0:8765
//! roomcast-server
//!
//! # Tighter heartbeat and a strict slow-consumer policy
//! roomcast-server --bind 127.0.0.1:9000 --idle-timeout-secs 30 --slow-consumer disconnect
//! ```

use std::time::Duration;

use clap::Parser;
use roomcast_core::{ConnectionConfig, Limits};
use roomcast_server::{
    DEFAULT_ROOM, DriverConfig, Server, ServerRuntimeConfig, SlowConsumerPolicy,
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Roomcast chat relay
#[derive(Parser, Debug)]
#[command(name = "roomcast-server")]
#[command(about = "Presence-aware multi-room chat relay over WebSocket")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "0.0.0.0:8765")]
    bind: String,

    /// Maximum concurrent connections
    #[arg(long, default_value = "10000")]
    max_connections: usize,

    /// Seconds a registered connection may go without a heartbeat
    #[arg(long, default_value = "60")]
    idle_timeout_secs: u64,

    /// Seconds a new connection has to register
    #[arg(long, default_value = "60")]
    registration_timeout_secs: u64,

    /// Seconds between heartbeat sweeps
    #[arg(long, default_value = "10")]
    sweep_interval_secs: u64,

    /// Frames buffered per connection before the slow-consumer policy applies
    #[arg(long, default_value = "256")]
    outbound_capacity: usize,

    /// What to do with a client that can't keep up (drop-oldest, disconnect)
    #[arg(long, default_value = "drop-oldest")]
    slow_consumer: SlowConsumerPolicy,

    /// Room new users are placed in
    #[arg(long, default_value = DEFAULT_ROOM)]
    default_room: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("Roomcast server starting");
    tracing::info!("Binding to {}", args.bind);

    let limits = Limits::default();
    let default_room = limits.room_name(&args.default_room)?.to_string();

    let config = ServerRuntimeConfig {
        bind_address: args.bind,
        outbound_capacity: args.outbound_capacity,
        slow_consumer: args.slow_consumer,
        sweep_interval: Duration::from_secs(args.sweep_interval_secs),
        driver: DriverConfig {
            connection: ConnectionConfig {
                registration_timeout: Duration::from_secs(args.registration_timeout_secs),
                idle_timeout: Duration::from_secs(args.idle_timeout_secs),
            },
            max_connections: args.max_connections,
            limits,
            default_room,
        },
    };

    let server = Server::bind(config).await?;

    tracing::info!("Server listening on {}", server.local_addr()?);

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutdown signal received");
        })
        .await?;

    Ok(())
}
