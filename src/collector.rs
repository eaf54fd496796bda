//! Collector server: accepts concurrent connections, reconstructs framed
//! payloads, interprets them as images, and acknowledges receipt.
//!
//! One task runs the accept loop; every accepted connection is handled on
//! its own spawned task so a slow peer blocks only its handler, never the
//! loop. Handlers share no mutable state. Receipt is acknowledged once a
//! frame has arrived in full, whether or not the payload decodes as an
//! image; an undecodable payload is dumped raw for postmortem inspection.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use image::GenericImageView;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::framing;

/// Bytes of an undecodable payload rendered as hex in the failure log.
const PREVIEW_BYTES: usize = 16;

/// Per-connection settings handed to each handler task.
#[derive(Debug, Clone)]
struct HandlerContext {
    max_frame_bytes: u32,
    read_timeout: Option<Duration>,
    output_dir: PathBuf,
    debug_dump_dir: PathBuf,
}

/// The collector server. Binding and running are split so callers can treat
/// a bind failure as fatal at startup while the accept loop itself never
/// returns.
pub struct Collector {
    listener: TcpListener,
    ctx: HandlerContext,
}

impl Collector {
    /// Bind the listener.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if the address cannot be bound;
    /// callers treat this as fatal at startup.
    pub async fn bind(config: &Config) -> std::io::Result<Self> {
        let listener = TcpListener::bind(config.bind_addr()).await?;
        info!(addr = %config.bind_addr(), "Collector listening");

        Ok(Self {
            listener,
            ctx: HandlerContext {
                max_frame_bytes: config.max_frame_bytes,
                read_timeout: config.read_timeout,
                output_dir: config.output_dir.clone(),
                debug_dump_dir: config.debug_dump_dir.clone(),
            },
        })
    }

    /// The address the listener actually bound (useful with port 0).
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Run the accept loop.
    ///
    /// Each accepted connection is handled on its own task and the loop
    /// resumes accepting immediately. Transient accept errors are logged
    /// and the loop continues; it only ends when the surrounding task is
    /// aborted.
    pub async fn run(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    debug!(peer = %peer, "Client connected");
                    let ctx = self.ctx.clone();
                    tokio::spawn(async move {
                        handle_connection(stream, peer, ctx).await;
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }
}

/// Create the output and debug-dump directories if they are missing.
///
/// Called once at startup so handler tasks can assume the paths exist.
pub async fn ensure_dirs(config: &Config) -> std::io::Result<()> {
    for dir in [&config.output_dir, &config.debug_dump_dir] {
        tokio::fs::create_dir_all(dir).await?;
        debug!(dir = %dir.display(), "Directory ready");
    }
    Ok(())
}

/// Handle one connection: decode a single frame, interpret the payload,
/// acknowledge, close.
async fn handle_connection(mut stream: TcpStream, peer: SocketAddr, ctx: HandlerContext) {
    let conn_id = Uuid::new_v4();

    let decode = framing::read_frame(&mut stream, ctx.max_frame_bytes);
    let frame = match ctx.read_timeout {
        Some(deadline) => match timeout(deadline, decode).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    peer = %peer,
                    conn_id = %conn_id,
                    deadline_secs = deadline.as_secs(),
                    "Read deadline exceeded, dropping connection"
                );
                return;
            }
        },
        None => decode.await,
    };

    let payload = match frame {
        Ok(payload) => payload,
        Err(e) => {
            // Transport-level failure: drop without acknowledging.
            warn!(
                peer = %peer,
                conn_id = %conn_id,
                error = %e,
                "Frame decode failed, dropping connection"
            );
            return;
        }
    };

    info!(peer = %peer, conn_id = %conn_id, bytes = payload.len(), "Frame received");

    // Receipt succeeded; an interpretation failure below does not withhold
    // the acknowledgment.
    process_payload(&payload, peer, conn_id, &ctx).await;

    if let Err(e) = stream.write_all(framing::ACK).await {
        warn!(peer = %peer, conn_id = %conn_id, error = %e, "Failed to send acknowledgment");
        return;
    }
    debug!(peer = %peer, conn_id = %conn_id, "Acknowledgment sent");
}

/// Interpret the payload as an image. Success persists the decoded image to
/// the output directory; failure logs a hex preview and dumps the raw bytes.
async fn process_payload(payload: &[u8], peer: SocketAddr, conn_id: Uuid, ctx: &HandlerContext) {
    match image::load_from_memory(payload) {
        Ok(img) => {
            let (width, height) = img.dimensions();
            let path = ctx.output_dir.join(format!("received-{}.png", conn_id));

            let encoded = {
                let mut buf = std::io::Cursor::new(Vec::new());
                img.write_to(&mut buf, image::ImageFormat::Png)
                    .map(|_| buf.into_inner())
            };

            match encoded {
                Ok(png) => match tokio::fs::write(&path, png).await {
                    Ok(()) => {
                        info!(
                            peer = %peer,
                            conn_id = %conn_id,
                            width = width,
                            height = height,
                            path = %path.display(),
                            "Image decoded and saved"
                        );
                    }
                    Err(e) => {
                        error!(
                            peer = %peer,
                            conn_id = %conn_id,
                            error = %e,
                            path = %path.display(),
                            "Failed to write decoded image"
                        );
                    }
                },
                Err(e) => {
                    error!(peer = %peer, conn_id = %conn_id, error = %e, "Failed to re-encode image");
                }
            }
        }
        Err(e) => {
            error!(
                peer = %peer,
                conn_id = %conn_id,
                error = %e,
                bytes = payload.len(),
                preview = %hex_preview(payload),
                "Failed to decode payload as image"
            );
            dump_debug(payload, peer, conn_id, &ctx.debug_dump_dir).await;
        }
    }
}

/// Persist an undecodable payload for postmortem inspection: the raw bytes
/// plus a small JSON manifest recording where they came from.
async fn dump_debug(payload: &[u8], peer: SocketAddr, conn_id: Uuid, dir: &Path) {
    let stamp = Utc::now().format("%Y%m%dT%H%M%SZ");
    let raw_path = dir.join(format!("frame-{}-{}.raw", stamp, conn_id));

    if let Err(e) = tokio::fs::write(&raw_path, payload).await {
        error!(error = %e, path = %raw_path.display(), "Failed to save debug dump");
        return;
    }
    info!(
        path = %raw_path.display(),
        bytes = payload.len(),
        "Raw payload saved for inspection"
    );

    let manifest = serde_json::json!({
        "peer": peer.to_string(),
        "bytes": payload.len(),
        "received_at": Utc::now().to_rfc3339(),
        "raw_file": raw_path.file_name().and_then(|n| n.to_str()),
    });

    let manifest_path = raw_path.with_extension("json");
    match serde_json::to_vec_pretty(&manifest) {
        Ok(body) => {
            if let Err(e) = tokio::fs::write(&manifest_path, body).await {
                warn!(error = %e, path = %manifest_path.display(), "Failed to write dump manifest");
            }
        }
        Err(e) => {
            warn!(error = %e, "Failed to serialize dump manifest");
        }
    }
}

/// Hex rendering of the leading payload bytes for decode-failure logs.
fn hex_preview(bytes: &[u8]) -> String {
    let mut out = bytes
        .iter()
        .take(PREVIEW_BYTES)
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ");
    if bytes.len() > PREVIEW_BYTES {
        out.push_str(" ..");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    fn test_config() -> Config {
        let base = std::env::temp_dir().join(format!("edge-relay-test-{}", Uuid::new_v4()));
        Config {
            bind_host: "127.0.0.1".to_string(),
            port: 0,
            output_dir: base.join("output"),
            debug_dump_dir: base.join("debug"),
            read_timeout: Some(Duration::from_secs(5)),
            ..Config::default()
        }
    }

    async fn spawn_collector(config: &Config) -> SocketAddr {
        ensure_dirs(config).await.unwrap();
        let collector = Collector::bind(config).await.unwrap();
        let addr = collector.local_addr().unwrap();
        tokio::spawn(collector.run());
        addr
    }

    fn tiny_png() -> Vec<u8> {
        let img = image::DynamicImage::ImageRgb8(image::RgbImage::new(1, 1));
        let mut buf = std::io::Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    async fn dir_filenames(dir: &Path) -> Vec<String> {
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names
    }

    #[tokio::test]
    async fn test_valid_payload_is_decoded_and_acknowledged() {
        let config = test_config();
        let addr = spawn_collector(&config).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        framing::write_frame(&mut stream, &tiny_png()).await.unwrap();

        let mut ack = [0u8; framing::ACK.len()];
        stream.read_exact(&mut ack).await.unwrap();
        assert_eq!(&ack[..], framing::ACK);

        // The handler persists before acknowledging, so the file exists now.
        let names = dir_filenames(&config.output_dir).await;
        assert_eq!(names.len(), 1);
        assert!(names[0].starts_with("received-"));
        assert!(names[0].ends_with(".png"));
    }

    #[tokio::test]
    async fn test_corrupt_payload_is_dumped_and_still_acknowledged() {
        let config = test_config();
        let addr = spawn_collector(&config).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        framing::write_frame(&mut stream, b"definitely not an image")
            .await
            .unwrap();

        let mut ack = [0u8; framing::ACK.len()];
        stream.read_exact(&mut ack).await.unwrap();
        assert_eq!(&ack[..], framing::ACK);

        let names = dir_filenames(&config.debug_dump_dir).await;
        assert!(names.iter().any(|n| n.ends_with(".raw")));
        assert!(names.iter().any(|n| n.ends_with(".json")));
        assert!(dir_filenames(&config.output_dir).await.is_empty());
    }

    #[tokio::test]
    async fn test_zero_length_frame_is_dropped_without_ack() {
        let config = test_config();
        let addr = spawn_collector(&config).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(&[0, 0, 0, 0]).await.unwrap();

        let mut buf = [0u8; 1];
        let n = stream.read(&mut buf).await.unwrap();
        assert_eq!(n, 0, "connection should close with no acknowledgment");
    }

    #[tokio::test]
    async fn test_truncated_frame_is_dropped_without_ack() {
        let config = test_config();
        let addr = spawn_collector(&config).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(&(100u32).to_be_bytes()).await.unwrap();
        stream.write_all(&[0x55; 10]).await.unwrap();
        stream.shutdown().await.unwrap();

        let mut buf = [0u8; 1];
        let n = stream.read(&mut buf).await.unwrap();
        assert_eq!(n, 0, "connection should close with no acknowledgment");
    }

    #[tokio::test]
    async fn test_oversize_frame_is_dropped_without_ack() {
        let mut config = test_config();
        config.max_frame_bytes = 8;
        let addr = spawn_collector(&config).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        framing::write_frame(&mut stream, &[0xAA; 100]).await.unwrap();

        let mut buf = [0u8; 1];
        let closed = matches!(stream.read(&mut buf).await, Ok(0) | Err(_));
        assert!(closed, "connection should close with no acknowledgment");
    }

    #[tokio::test]
    async fn test_slow_peer_hits_read_deadline() {
        let mut config = test_config();
        config.read_timeout = Some(Duration::from_millis(100));
        let addr = spawn_collector(&config).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        // Header only; the payload never arrives.
        stream.write_all(&(10u32).to_be_bytes()).await.unwrap();

        let mut buf = [0u8; 1];
        let read = timeout(Duration::from_secs(5), stream.read(&mut buf))
            .await
            .expect("collector should drop the connection at the deadline");
        assert!(matches!(read, Ok(0) | Err(_)));
    }

    #[tokio::test]
    async fn test_concurrent_connections_are_isolated() {
        let config = test_config();
        let addr = spawn_collector(&config).await;

        // One client sends a truncated frame and gets dropped.
        let corrupt = tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            stream.write_all(&(50u32).to_be_bytes()).await.unwrap();
            stream.write_all(&[9; 5]).await.unwrap();
            stream.shutdown().await.unwrap();

            let mut buf = [0u8; 1];
            matches!(stream.read(&mut buf).await, Ok(0) | Err(_))
        });

        // The other completes a normal exchange at the same time.
        let valid = tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            framing::write_frame(&mut stream, &tiny_png()).await.unwrap();

            let mut ack = [0u8; framing::ACK.len()];
            stream.read_exact(&mut ack).await.unwrap();
            ack
        });

        assert!(corrupt.await.unwrap(), "corrupt connection must see no ack");
        assert_eq!(&valid.await.unwrap()[..], framing::ACK);

        let names = dir_filenames(&config.output_dir).await;
        assert_eq!(names.len(), 1, "valid connection must still persist its image");
    }

    #[tokio::test]
    async fn test_ensure_dirs_is_idempotent() {
        let config = test_config();
        ensure_dirs(&config).await.unwrap();
        ensure_dirs(&config).await.unwrap();
        assert!(config.output_dir.is_dir());
        assert!(config.debug_dump_dir.is_dir());
    }

    #[test]
    fn test_hex_preview() {
        assert_eq!(hex_preview(&[0x89, 0x50, 0x4e, 0x47]), "89 50 4e 47");

        let long = [0u8; 32];
        let preview = hex_preview(&long);
        assert!(preview.ends_with(".."));
        assert_eq!(preview.matches("00").count(), PREVIEW_BYTES);
    }

    #[test]
    fn test_hex_preview_empty() {
        assert_eq!(hex_preview(&[]), "");
    }
}
