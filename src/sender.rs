//! Edge client: the periodic send loop.
//!
//! One background task wakes on a fixed interval and attempts a single send:
//! snapshot the scan state, capture an image blob, connect to the collector,
//! write one frame, read back the fixed acknowledgment. Every failure is
//! logged and contained to its tick; the next scheduled tick is the retry
//! policy. There is no backoff.

use std::fmt;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::framing::{self, FrameError};
use crate::image_source::{ImageSource, SourceError};
use crate::scan::ScanState;

/// Errors that can occur during one send tick.
#[derive(Debug)]
pub enum SendError {
    /// The image source produced no usable blob
    Capture(SourceError),

    /// Resolving or connecting to the collector failed
    Connect(std::io::Error),

    /// Writing the frame failed
    Frame(FrameError),

    /// Reading the acknowledgment failed
    Ack(std::io::Error),
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::Capture(e) => write!(f, "image capture failed: {}", e),
            SendError::Connect(e) => write!(f, "failed to connect to collector: {}", e),
            SendError::Frame(e) => write!(f, "failed to write frame: {}", e),
            SendError::Ack(e) => write!(f, "failed to read acknowledgment: {}", e),
        }
    }
}

impl std::error::Error for SendError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SendError::Capture(e) => Some(e),
            SendError::Connect(e) => Some(e),
            SendError::Frame(e) => Some(e),
            SendError::Ack(e) => Some(e),
        }
    }
}

/// Outcome of one send tick.
#[derive(Debug)]
pub enum TickOutcome {
    /// A frame was written and the exchange completed
    Sent { bytes: usize },

    /// The scan collection was empty; no connection was attempted
    SkippedEmpty,
}

/// The edge client. Owns the scan-state handle and the image source; one
/// instance drives one background send loop.
pub struct EdgeSender {
    collector_addr: String,
    send_interval: Duration,
    state: ScanState,
    source: ImageSource,
}

impl EdgeSender {
    /// Create a sender from configuration, a shared scan-state handle, and
    /// an image source.
    pub fn new(config: &Config, state: ScanState, source: ImageSource) -> Self {
        Self {
            collector_addr: config.collector_addr(),
            send_interval: config.send_interval,
            state,
            source,
        }
    }

    /// Spawn the background send loop.
    ///
    /// The returned handle stops the loop; dropping it instead leaves the
    /// loop running detached for the lifetime of the runtime.
    pub fn start(self) -> SenderHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(shutdown_rx));
        SenderHandle { shutdown_tx, task }
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.send_interval);
        // The first interval tick fires immediately; skip it so the first
        // send happens one full interval after start.
        ticker.tick().await;

        info!(
            collector = %self.collector_addr,
            interval_secs = self.send_interval.as_secs(),
            source = %self.source.describe(),
            "Send loop started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.send_tick().await {
                        Ok(TickOutcome::Sent { bytes }) => {
                            debug!(bytes = bytes, "Send tick completed");
                        }
                        Ok(TickOutcome::SkippedEmpty) => {}
                        Err(e) => {
                            error!(error = %e, "Send tick failed");
                        }
                    }
                }
                _ = shutdown.changed() => {
                    info!("Stop signal received, send loop exiting");
                    break;
                }
            }
        }
    }

    /// Attempt one send.
    ///
    /// The scan collection is snapshotted under its lock and the lock is
    /// released before any network I/O, so a concurrent
    /// `set_scan_results` is never blocked by a slow exchange.
    async fn send_tick(&self) -> Result<TickOutcome, SendError> {
        let snapshot = self.state.snapshot();
        if snapshot.is_empty() {
            warn!("No scan results available to send; was set_scan_results called?");
            return Ok(TickOutcome::SkippedEmpty);
        }

        let hubs = snapshot.len();
        let entries: usize = snapshot.iter().map(|r| r.log_entries.len()).sum();

        let blob = self.source.capture().map_err(SendError::Capture)?;
        debug!(bytes = blob.len(), hubs = hubs, entries = entries, "Captured image blob");

        let mut stream = TcpStream::connect(&self.collector_addr)
            .await
            .map_err(SendError::Connect)?;

        framing::write_frame(&mut stream, &blob)
            .await
            .map_err(SendError::Frame)?;

        let mut ack = [0u8; framing::ACK.len()];
        stream.read_exact(&mut ack).await.map_err(SendError::Ack)?;

        if &ack[..] == framing::ACK {
            info!(
                collector = %self.collector_addr,
                bytes = blob.len(),
                hubs = hubs,
                "Image sent and acknowledged"
            );
        } else {
            warn!(
                received = %String::from_utf8_lossy(&ack),
                "Unexpected acknowledgment from collector"
            );
        }

        Ok(TickOutcome::Sent { bytes: blob.len() })
    }
}

/// Handle to a running send loop.
pub struct SenderHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SenderHandle {
    /// Signal the loop to stop and wait for the background task to finish.
    ///
    /// Cancellation is cooperative, checked once per loop iteration: an
    /// in-flight exchange completes or fails before the loop observes the
    /// signal. After this returns, no send is in flight.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Sender task terminated abnormally");
        }
    }

    /// Whether the background task has already finished.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
