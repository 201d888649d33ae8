//! High-level [`Thumber`] API — generation plus container I/O.
//!
//! ```no_run
//! use thumber::{Thumber, ThumbnailConfig};
//!
//! let thumber = Thumber::new(ThumbnailConfig::default());
//! let source = std::fs::read("photo.jpg")?;
//! let blob = thumber.create_thumbs_and_index(&source, None)?;
//! let small = thumber.read(&blob, "64x64xjpg")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::info;

use crate::error::{ContainerError, ThumberError};
use crate::prologue::DecodeMode;
use crate::reader::{Container, Item};
use crate::thumbnail::{generate, GenerationError, ImageBackend, ThumbnailBackend, ThumbnailConfig};
use crate::writer::{write, Entries};

pub struct Thumber<B: ThumbnailBackend = ImageBackend> {
    config:  ThumbnailConfig,
    backend: B,
    mode:    DecodeMode,
}

impl Thumber<ImageBackend> {
    pub fn new(config: ThumbnailConfig) -> Self {
        Self::with_backend(config, ImageBackend::default())
    }
}

impl Default for Thumber<ImageBackend> {
    fn default() -> Self {
        Self::new(ThumbnailConfig::default())
    }
}

impl<B: ThumbnailBackend> Thumber<B> {
    pub fn with_backend(config: ThumbnailConfig, backend: B) -> Self {
        Self { config, backend, mode: DecodeMode::Canonical }
    }

    /// Read containers with `mode` instead of the canonical rules.
    pub fn with_decode_mode(mut self, mode: DecodeMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn config(&self) -> &ThumbnailConfig {
        &self.config
    }

    pub fn decode_mode(&self) -> &DecodeMode {
        &self.mode
    }

    /// Every configured variant of `source`, ready for the writer.
    pub fn create_thumbnails(&self, source: &[u8]) -> Result<Entries, GenerationError> {
        generate(&self.backend, &self.config, source)
    }

    /// Generate thumbnails, merge `extra` scalars over them and write one
    /// canonical container. Nothing is produced if any step fails.
    pub fn create_thumbs_and_index(
        &self,
        source: &[u8],
        extra:  Option<&Map<String, Value>>,
    ) -> Result<Vec<u8>, ThumberError> {
        let mut entries = self.create_thumbnails(source)?;
        if let Some(extra) = extra {
            entries.extend_scalars(extra);
        }
        Ok(write(&entries)?)
    }

    /// `store` command: image file in, container file out. Returns the
    /// container size.
    pub fn store(
        &self,
        input:  &Path,
        output: &Path,
        extra:  Option<&Map<String, Value>>,
    ) -> Result<usize, ThumberError> {
        let source = fs::read(input)?;
        let blob = self.create_thumbs_and_index(&source, extra)?;
        fs::write(output, &blob)?;
        info!(input = %input.display(), output = %output.display(), bytes = blob.len(), "stored container");
        Ok(blob.len())
    }

    /// One thumbnail out of a container. `key` may carry the `DATA.` prefix.
    pub fn read<'a>(&self, blob: &'a [u8], key: &str) -> Result<&'a [u8], ContainerError> {
        Container::parse(blob, &self.mode)?.segment(key)
    }

    /// Every thumbnail and scalar of a container.
    pub fn read_all<'a>(&self, blob: &'a [u8]) -> Result<BTreeMap<String, Item<'a>>, ContainerError> {
        Container::parse(blob, &self.mode)?.read_all()
    }
}

/// `load` command: copy one segment of a container file verbatim into
/// `output`. Returns the segment size.
pub fn load(input: &Path, key: &str, output: &Path, mode: &DecodeMode) -> Result<usize, ThumberError> {
    let blob = fs::read(input)?;
    let segment = Container::parse(&blob, mode)?.segment(key)?;
    fs::write(output, segment)?;
    info!(input = %input.display(), key, bytes = segment.len(), "loaded segment");
    Ok(segment.len())
}
