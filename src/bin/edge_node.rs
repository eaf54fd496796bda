//! Edge node - captures images on a fixed interval and relays them to the
//! collector over TCP.
//!
//! ## Configuration
//!
//! Configuration is loaded from environment variables:
//!
//! - `EDGE_RELAY_COLLECTOR_HOST`: collector host (default: 127.0.0.1)
//! - `EDGE_RELAY_PORT`: collector port (default: 12345)
//! - `EDGE_RELAY_SEND_INTERVAL_SECS`: seconds between sends (default: 5)
//! - `EDGE_RELAY_CAPTURE_PATH`: capture image file; unset generates a
//!   synthetic test pattern
//! - `RUST_LOG`: logging level filter (default: info)

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use edge_image_relay::config::Config;
use edge_image_relay::image_source::ImageSource;
use edge_image_relay::scan::{LogEntry, ScanResult, ScanState};
use edge_image_relay::sender::EdgeSender;

/// Synthetic test-pattern dimensions used when no capture file is set
const SYNTHETIC_WIDTH: u32 = 640;
const SYNTHETIC_HEIGHT: u32 = 480;

/// Brightness lift applied to every captured image before encoding
const BRIGHTNESS_LIFT: i32 = 100;

#[tokio::main]
async fn main() {
    init_tracing();

    info!("Starting edge node...");

    let config = match Config::from_env() {
        Ok(config) => {
            info!(
                collector = %config.collector_addr(),
                interval_secs = config.send_interval.as_secs(),
                capture_path = ?config.capture_path,
                "Configuration loaded"
            );
            config
        }
        Err(e) => {
            error!(error = %e, "Failed to load configuration");
            std::process::exit(1);
        }
    };

    // Seed the shared scan state so the demo pipeline sends immediately;
    // a real deployment replaces this through the same handle.
    let state = ScanState::new();
    state.set_scan_results(vec![ScanResult::new(
        "Hub_1234",
        vec![LogEntry::new("Server_1", 12345).with_timestamp(1_673_968_254)],
    )]);
    info!(hubs = state.len(), "Scan state seeded");

    let source = match &config.capture_path {
        Some(path) => ImageSource::from_file(path),
        None => ImageSource::synthetic(SYNTHETIC_WIDTH, SYNTHETIC_HEIGHT),
    }
    .with_transform(Box::new(|img| img.brighten(BRIGHTNESS_LIFT)));
    info!(source = %source.describe(), "Image source initialized");

    let handle = EdgeSender::new(&config, state, source).start();

    info!("Edge node running. Press Ctrl+C to stop.");
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("Shutdown signal received, stopping...");
        }
        Err(e) => {
            error!(error = %e, "Failed to listen for shutdown signal");
        }
    }

    // Stop joins the send loop: no send is in flight once it returns.
    handle.stop().await;
    info!("Edge node stopped");
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
