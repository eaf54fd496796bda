//! Image acquisition for the edge node.
//!
//! The send loop treats the image as an opaque byte blob; this module is the
//! collaborator that produces it. A source either reads a capture file from
//! disk or generates a synthetic test pattern, applies an optional pluggable
//! transform, and returns the result PNG-encoded.

use std::fmt;
use std::io::Cursor;
use std::path::PathBuf;

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use rand::Rng;

/// Pluggable image transform applied between load and encode.
pub type Transform = Box<dyn Fn(DynamicImage) -> DynamicImage + Send + Sync>;

/// Errors that can occur while producing an image blob.
#[derive(Debug)]
pub enum SourceError {
    /// The capture file could not be read or decoded as an image
    Decode(image::ImageError),

    /// The produced image could not be encoded to PNG
    Encode(image::ImageError),
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceError::Decode(e) => write!(f, "failed to load capture image: {}", e),
            SourceError::Encode(e) => write!(f, "failed to encode image: {}", e),
        }
    }
}

impl std::error::Error for SourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SourceError::Decode(e) | SourceError::Encode(e) => Some(e),
        }
    }
}

enum SourceKind {
    /// Read and decode a capture file on every tick
    File(PathBuf),

    /// Generate a gradient test pattern with per-pixel noise
    Synthetic { width: u32, height: u32 },
}

/// Produces PNG-encoded image blobs for the send loop.
pub struct ImageSource {
    kind: SourceKind,
    transform: Option<Transform>,
}

impl ImageSource {
    /// Source that reads `path` on every capture.
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: SourceKind::File(path.into()),
            transform: None,
        }
    }

    /// Source that generates a synthetic test pattern of the given size,
    /// for running the edge node without a capture file on disk.
    pub fn synthetic(width: u32, height: u32) -> Self {
        Self {
            kind: SourceKind::Synthetic { width, height },
            transform: None,
        }
    }

    /// Install a transform applied to every captured image before encoding.
    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = Some(transform);
        self
    }

    /// Capture one image and return it PNG-encoded.
    ///
    /// # Errors
    ///
    /// Returns `SourceError::Decode` if a capture file cannot be read or is
    /// not a valid image, and `SourceError::Encode` if PNG encoding fails.
    pub fn capture(&self) -> Result<Vec<u8>, SourceError> {
        let img = match &self.kind {
            SourceKind::File(path) => image::open(path).map_err(SourceError::Decode)?,
            SourceKind::Synthetic { width, height } => synthesize(*width, *height),
        };

        let img = match &self.transform {
            Some(transform) => transform(img),
            None => img,
        };

        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png)
            .map_err(SourceError::Encode)?;
        Ok(buf.into_inner())
    }

    /// Short description of the source for log fields.
    pub fn describe(&self) -> String {
        match &self.kind {
            SourceKind::File(path) => format!("file:{}", path.display()),
            SourceKind::Synthetic { width, height } => {
                format!("synthetic:{}x{}", width, height)
            }
        }
    }
}

/// Diagonal gradient with a little noise so consecutive captures differ.
fn synthesize(width: u32, height: u32) -> DynamicImage {
    let mut rng = rand::thread_rng();
    let mut img = RgbImage::new(width.max(1), height.max(1));

    for (x, y, pixel) in img.enumerate_pixels_mut() {
        let base = ((x + y) % 256) as u8;
        let noise: u8 = rng.gen_range(0..16);
        *pixel = Rgb([
            base.saturating_add(noise),
            base.saturating_sub(noise),
            base,
        ]);
    }

    DynamicImage::ImageRgb8(img)
}
