//! Thumbnail generation.
//!
//! Produces the [`Entries`] a container is written from: one segment per
//! (format × size) variant, keyed `DATA.<w>x<h>x<fmt>`, and one scalar per
//! size, keyed `r<w>x<h>`, holding the dimensions actually produced.
//!
//! Decoding and encoding sit behind [`ThumbnailBackend`] so the pipeline
//! (limits, variant fan-out, key naming) can be exercised without real
//! images. [`ImageBackend`] is the production implementation.
//!
//! # Parallelism
//! Every variant is rendered independently from the same decoded source.
//! With the `parallel` feature they are rendered on the Rayon pool; the
//! complete set is collected before anything is returned, because the
//! writer needs every segment length up front.

pub mod image_backend;

pub use image_backend::ImageBackend;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::writer::{Entries, SEGMENT_PREFIX};

/// Default JPEG quality.
pub const DEFAULT_QUALITY: u8 = 75;
/// Largest accepted width or height.
pub const DEFAULT_MAX_DIMENSION: u32 = 15_000;
/// Largest accepted pixel count (100 "megapixels").
pub const DEFAULT_MAX_PIXELS: u64 = 100 * 1024 * 1024;

// ── Errors ──────────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Could not read image: {0}")]
    UnreadableImage(String),
    #[error("Image too large: {width}x{height} exceeds {limit}")]
    ImageTooLarge { width: u32, height: u32, limit: String },
    #[error("Could not encode thumbnail: {0}")]
    Encode(String),
    #[error("Invalid thumbnail configuration: {0}")]
    InvalidConfig(String),
}

// ── ThumbnailFormat ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThumbnailFormat {
    Jpg,
    Gif,
    Png,
}

impl ThumbnailFormat {
    /// Name used in segment keys.
    pub fn name(self) -> &'static str {
        match self {
            ThumbnailFormat::Jpg => "jpg",
            ThumbnailFormat::Gif => "gif",
            ThumbnailFormat::Png => "png",
        }
    }

    /// Parse from a CLI string. `jpeg` is accepted as `jpg`.
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "jpg" | "jpeg" => Some(ThumbnailFormat::Jpg),
            "gif"          => Some(ThumbnailFormat::Gif),
            "png"          => Some(ThumbnailFormat::Png),
            _              => None,
        }
    }
}

// ── Limits ──────────────────────────────────────────────────────────────────

/// Source size limits, checked before the image is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_dimension: u32,
    pub max_pixels:    u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_dimension: DEFAULT_MAX_DIMENSION,
            max_pixels:    DEFAULT_MAX_PIXELS,
        }
    }
}

impl Limits {
    pub fn check(&self, width: u32, height: u32) -> Result<(), GenerationError> {
        if width > self.max_dimension || height > self.max_dimension {
            return Err(GenerationError::ImageTooLarge {
                width,
                height,
                limit: format!("maximum dimension {}", self.max_dimension),
            });
        }
        if width as u64 * height as u64 > self.max_pixels {
            return Err(GenerationError::ImageTooLarge {
                width,
                height,
                limit: format!("maximum pixel count {}", self.max_pixels),
            });
        }
        Ok(())
    }
}

// ── ThumbnailConfig ─────────────────────────────────────────────────────────

/// Immutable generation settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThumbnailConfig {
    /// Bounding boxes, `(width, height)`.
    pub sizes:   Vec<(u32, u32)>,
    pub formats: Vec<ThumbnailFormat>,
    /// JPEG quality, 1..=100. Ignored by lossless formats.
    pub quality: u8,
    pub limits:  Limits,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            sizes:   vec![(128, 128), (64, 64), (32, 32)],
            formats: vec![ThumbnailFormat::Jpg, ThumbnailFormat::Gif, ThumbnailFormat::Png],
            quality: DEFAULT_QUALITY,
            limits:  Limits::default(),
        }
    }
}

impl ThumbnailConfig {
    pub fn validate(&self) -> Result<(), GenerationError> {
        if self.sizes.is_empty() {
            return Err(GenerationError::InvalidConfig("no thumbnail sizes".into()));
        }
        if self.formats.is_empty() {
            return Err(GenerationError::InvalidConfig("no output formats".into()));
        }
        if let Some((w, h)) = self.sizes.iter().find(|(w, h)| *w == 0 || *h == 0) {
            return Err(GenerationError::InvalidConfig(format!("empty bounding box {w}x{h}")));
        }
        if !(1..=100).contains(&self.quality) {
            return Err(GenerationError::InvalidConfig(format!(
                "quality {} outside 1..=100", self.quality
            )));
        }
        Ok(())
    }
}

// ── Backend ─────────────────────────────────────────────────────────────────

/// One encoded variant and the dimensions it was rendered at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub bytes:  Vec<u8>,
    pub width:  u32,
    pub height: u32,
}

/// Decode/resize/encode capability.
///
/// Implementations must be safe to call concurrently: `render` is invoked
/// from several threads on the same `Source` when `parallel` is enabled.
pub trait ThumbnailBackend: Send + Sync {
    type Source: Send + Sync;

    /// Dimensions of the encoded image without decoding pixel data.
    fn identify(&self, data: &[u8]) -> Result<(u32, u32), GenerationError>;

    /// Decode and orient the source image.
    fn decode(&self, data: &[u8]) -> Result<Self::Source, GenerationError>;

    fn render(
        &self,
        source:  &Self::Source,
        bounds:  (u32, u32),
        format:  ThumbnailFormat,
        quality: u8,
    ) -> Result<Rendered, GenerationError>;
}

/// Size of `source` shrunk to fit inside `bounds`, aspect ratio preserved.
/// A source that already fits keeps its size; images are never enlarged.
pub fn fit_within(source: (u32, u32), bounds: (u32, u32)) -> (u32, u32) {
    let (mut w, mut h) = (source.0 as u64, source.1 as u64);
    let (bw, bh) = (bounds.0 as u64, bounds.1 as u64);
    if w > bw {
        h = ((h * bw + w / 2) / w).max(1);
        w = bw;
    }
    if h > bh {
        w = ((w * bh + h / 2) / h).max(1);
        h = bh;
    }
    (w as u32, h as u32)
}

// ── Pipeline ────────────────────────────────────────────────────────────────

/// Run the full generation pipeline over `data`.
pub fn generate<B: ThumbnailBackend>(
    backend: &B,
    config:  &ThumbnailConfig,
    data:    &[u8],
) -> Result<Entries, GenerationError> {
    config.validate()?;

    let (width, height) = backend.identify(data)?;
    config.limits.check(width, height)?;
    info!(width, height, "generating thumbnails");

    let source = backend.decode(data)?;

    let variants: Vec<(ThumbnailFormat, (u32, u32))> = config
        .formats
        .iter()
        .flat_map(|&format| config.sizes.iter().map(move |&size| (format, size)))
        .collect();
    let rendered = render_variants(backend, &source, &variants, config.quality)?;

    let mut entries = Entries::new();
    for ((format, (bw, bh)), r) in variants.into_iter().zip(rendered) {
        debug!(format = format.name(), bw, bh, width = r.width, height = r.height, bytes = r.bytes.len(), "rendered variant");
        entries.insert_scalar(format!("r{bw}x{bh}"), Value::String(format!("{}x{}", r.width, r.height)));
        entries.insert_segment(format!("{SEGMENT_PREFIX}{bw}x{bh}x{}", format.name()), r.bytes);
    }
    Ok(entries)
}

fn render_variants<B: ThumbnailBackend>(
    backend:  &B,
    source:   &B::Source,
    variants: &[(ThumbnailFormat, (u32, u32))],
    quality:  u8,
) -> Result<Vec<Rendered>, GenerationError> {
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;

        variants
            .par_iter()
            .map(|&(format, bounds)| backend.render(source, bounds, format, quality))
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    {
        variants
            .iter()
            .map(|&(format, bounds)| backend.render(source, bounds, format, quality))
            .collect()
    }
}
