//! Length-prefixed frame codec shared by the edge node and the collector.
//!
//! Each frame on the wire is a 4-byte big-endian (network byte order) payload
//! length followed by exactly that many payload bytes:
//!
//! ```text
//! byte 0-3:      payload length N, unsigned 32-bit, big-endian
//! byte 4..4+N-1: payload (opaque image bytes)
//! ```
//!
//! The collector's response is the fixed [`ACK`] literal with no length
//! prefix. A declared length of zero is a protocol error, not an empty-image
//! signal.

use std::fmt;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Size of the length prefix in bytes.
pub const LENGTH_PREFIX_BYTES: usize = 4;

/// Fixed acknowledgment written by the collector once a frame has been
/// fully received, regardless of whether the payload decoded as an image.
pub const ACK: &[u8] = b"Acknowledged";

/// Errors that can occur while encoding or decoding a frame.
#[derive(Debug)]
pub enum FrameError {
    /// The declared (or provided) payload length was zero
    EmptyFrame,

    /// The payload length exceeds the configured or representable maximum
    TooLarge {
        declared: u64,
        max: u64,
    },

    /// The stream closed before the declared byte count arrived
    Truncated {
        expected: usize,
        received: usize,
    },

    /// Underlying read/write failure
    Io(std::io::Error),
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::EmptyFrame => write!(f, "zero-length frame is a protocol error"),
            FrameError::TooLarge { declared, max } => {
                write!(f, "declared frame length {} exceeds maximum {}", declared, max)
            }
            FrameError::Truncated { expected, received } => {
                write!(
                    f,
                    "stream closed after {} of {} expected bytes",
                    received, expected
                )
            }
            FrameError::Io(e) => write!(f, "frame I/O failed: {}", e),
        }
    }
}

impl std::error::Error for FrameError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FrameError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for FrameError {
    fn from(err: std::io::Error) -> Self {
        FrameError::Io(err)
    }
}

/// Encode a payload into a complete frame.
///
/// Prepends the big-endian 4-byte length of `payload`.
///
/// # Errors
///
/// Returns `FrameError::EmptyFrame` for an empty payload and
/// `FrameError::TooLarge` for a payload whose length does not fit in a u32.
pub fn encode(payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    if payload.is_empty() {
        return Err(FrameError::EmptyFrame);
    }

    let len = u32::try_from(payload.len()).map_err(|_| FrameError::TooLarge {
        declared: payload.len() as u64,
        max: u64::from(u32::MAX),
    })?;

    let mut frame = Vec::with_capacity(LENGTH_PREFIX_BYTES + payload.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Write one complete frame to the stream.
pub async fn write_frame<W>(stream: &mut W, payload: &[u8]) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode(payload)?;
    stream.write_all(&frame).await?;
    stream.flush().await?;
    Ok(())
}

/// Read one complete frame from the stream and return its payload.
///
/// Reads exactly [`LENGTH_PREFIX_BYTES`] header bytes, then reads until the
/// cumulative payload count equals the declared length, retrying partial
/// reads. `max_frame_bytes` bounds the declared length; `0` disables the cap.
///
/// # Errors
///
/// - `FrameError::EmptyFrame` if the declared length is zero
/// - `FrameError::TooLarge` if the declared length exceeds `max_frame_bytes`
/// - `FrameError::Truncated` if the stream closes before the declared byte
///   count arrives (the partial count is reported; a close mid-header is
///   reported the same way with `expected == 4`)
/// - `FrameError::Io` for any other read failure
pub async fn read_frame<R>(stream: &mut R, max_frame_bytes: u32) -> Result<Vec<u8>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; LENGTH_PREFIX_BYTES];
    read_all(stream, &mut header).await?;

    let declared = u32::from_be_bytes(header);
    if declared == 0 {
        return Err(FrameError::EmptyFrame);
    }
    if max_frame_bytes != 0 && declared > max_frame_bytes {
        return Err(FrameError::TooLarge {
            declared: u64::from(declared),
            max: u64::from(max_frame_bytes),
        });
    }

    let mut payload = vec![0u8; declared as usize];
    read_all(stream, &mut payload).await?;
    Ok(payload)
}

/// Fill `buf` completely, retrying partial reads.
///
/// A single read may return fewer bytes than requested; a read of zero bytes
/// means the peer closed the stream.
async fn read_all<R>(stream: &mut R, buf: &mut [u8]) -> Result<(), FrameError>
where
    R: AsyncRead + Unpin,
{
    let expected = buf.len();
    let mut received = 0;

    while received < expected {
        let n = stream.read(&mut buf[received..]).await?;
        if n == 0 {
            return Err(FrameError::Truncated { expected, received });
        }
        received += n;
    }

    Ok(())
}
