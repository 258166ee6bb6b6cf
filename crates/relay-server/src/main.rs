//! Relay server binary.
//!
//! # Usage
//!
//! ```bash
//! # Listen on 0.0.0.0:9000
//! relay-server 9000
//!
//! # Loopback only, with two identity workers
//! relay-server 9000 --host 127.0.0.1 --workers 2
//! ```

use clap::Parser;
use relay_server::{Server, ServerRuntimeConfig};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Relay chat server
#[derive(Parser, Debug)]
#[command(name = "relay-server")]
#[command(about = "Id-addressed TCP chat relay")]
#[command(version)]
struct Args {
    /// TCP port to listen on
    #[arg(value_parser = clap::value_parser!(u16).range(1..))]
    port: u16,

    /// Interface address to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Number of identity workers
    #[arg(long, default_value = "1")]
    workers: usize,

    /// Capacity of the event queue
    #[arg(long, default_value = "1024")]
    queue_capacity: usize,

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

    let bind_address = if args.host.contains(':') {
        format!("[{}]:{}", args.host, args.port)
    } else {
        format!("{}:{}", args.host, args.port)
    };

    let config = ServerRuntimeConfig {
        bind_address,
        identity_workers: args.workers,
        queue_capacity: args.queue_capacity,
        ..Default::default()
    };

    let server = match Server::bind(config).await {
        Ok(server) => server,
        Err(e) => {
            tracing::error!("{}", e);
            return Err(e.into());
        },
    };

    server.run().await?;

    Ok(())
}
