//! Edge Image Relay Library
//!
//! This library provides both ends of an image-transport pipeline over TCP:
//!
//! - **framing**: length-prefixed frame codec shared by both sides
//! - **scan**: scan-result data model and the shared state handle
//! - **image_source**: image acquisition with a pluggable transform
//! - **sender**: edge client with a periodic send loop
//! - **collector**: server accepting concurrent connections
//! - **config**: environment-based configuration
//!
//! # Example
//!
//! ```no_run
//! use edge_image_relay::collector::Collector;
//! use edge_image_relay::config::Config;
//! use edge_image_relay::image_source::ImageSource;
//! use edge_image_relay::scan::{LogEntry, ScanResult, ScanState};
//! use edge_image_relay::sender::EdgeSender;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::from_env().expect("Failed to load config");
//!
//!     // Receiving side
//!     let collector = Collector::bind(&config).await.expect("Failed to bind");
//!     tokio::spawn(collector.run());
//!
//!     // Sending side
//!     let state = ScanState::new();
//!     state.set_scan_results(vec![ScanResult::new(
//!         "Hub_1234",
//!         vec![LogEntry::new("Server_1", 12345)],
//!     )]);
//!     let source = ImageSource::synthetic(640, 480);
//!     let handle = EdgeSender::new(&config, state, source).start();
//!
//!     tokio::signal::ctrl_c().await.ok();
//!     handle.stop().await;
//! }
//! ```

// Module declarations
pub mod collector;
pub mod config;
pub mod framing;
pub mod image_source;
pub mod scan;
pub mod sender;

// Re-export commonly used types at crate root for convenience
pub use collector::Collector;
pub use config::{Config, ConfigError};
pub use framing::{encode, read_frame, write_frame, FrameError, ACK, LENGTH_PREFIX_BYTES};
pub use image_source::{ImageSource, SourceError, Transform};
pub use scan::{LogEntry, ScanResult, ScanState};
pub use sender::{EdgeSender, SendError, SenderHandle, TickOutcome};
