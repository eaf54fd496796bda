//! Collector - accepts framed image payloads from edge nodes over TCP,
//! decodes them, and acknowledges receipt.
//!
//! ## Configuration
//!
//! Configuration is loaded from environment variables:
//!
//! - `EDGE_RELAY_BIND_HOST`: bind address (default: 0.0.0.0)
//! - `EDGE_RELAY_PORT`: listen port (default: 12345)
//! - `EDGE_RELAY_MAX_FRAME_BYTES`: frame size cap, 0 = unbounded (default: 16 MiB)
//! - `EDGE_RELAY_READ_TIMEOUT_SECS`: per-connection read deadline, 0 = disabled (default: 30)
//! - `EDGE_RELAY_OUTPUT_DIR`: decoded-image directory (default: ./output)
//! - `EDGE_RELAY_DEBUG_DUMP_DIR`: raw-dump directory (default: ./debug)
//! - `RUST_LOG`: logging level filter (default: info)

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use edge_image_relay::collector::{ensure_dirs, Collector};
use edge_image_relay::config::Config;

#[tokio::main]
async fn main() {
    init_tracing();

    info!("Starting collector...");

    let config = match Config::from_env() {
        Ok(config) => {
            info!(
                bind = %config.bind_addr(),
                max_frame_bytes = config.max_frame_bytes,
                read_timeout = ?config.read_timeout,
                output_dir = %config.output_dir.display(),
                "Configuration loaded"
            );
            config
        }
        Err(e) => {
            error!(error = %e, "Failed to load configuration");
            std::process::exit(1);
        }
    };

    if let Err(e) = ensure_dirs(&config).await {
        error!(error = %e, "Failed to create output directories");
        std::process::exit(1);
    }

    // Bind failure (port in use, privileged port) is fatal at startup.
    let collector = match Collector::bind(&config).await {
        Ok(collector) => collector,
        Err(e) => {
            error!(error = %e, addr = %config.bind_addr(), "Failed to bind listener");
            std::process::exit(1);
        }
    };

    let accept_task = tokio::spawn(collector.run());

    info!("Collector running. Press Ctrl+C to stop.");
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("Shutdown signal received, stopping...");
        }
        Err(e) => {
            error!(error = %e, "Failed to listen for shutdown signal");
        }
    }

    // In-flight handlers run on their own tasks; aborting the accept loop
    // stops new connections while the runtime winds down.
    accept_task.abort();
    info!("Collector stopped");
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();
}
