//! Fixed-layout prefix of every container, and the per-version rules for
//! interpreting what follows it.
//!
//! # Layout
//!
//! | Revision  | Bytes | Fields                                   |
//! |-----------|-------|------------------------------------------|
//! | Canonical | 4     | `u16 version (= 2)`, `u16 header_length` |
//! | V1        | 4     | `u16 version (= 1)`, `u16 header_length` |
//! | Legacy    | 2     | `u16 header_length`                      |
//!
//! All fields are little-endian. The tagged and untagged shapes are not
//! distinguishable from content, so the caller always names the shape it
//! expects through [`DecodeMode`]; nothing here sniffs. Within the tagged
//! shape the version field selects the rules.

use byteorder::{ByteOrder, LittleEndian};
use std::collections::HashSet;

use crate::error::ContainerError;
use crate::header::SegmentRange;

/// Version tag written by every writer in this crate.
pub const CANONICAL_VERSION: u16 = 2;
/// Older tagged revision: header-relative `[start, end]` arrays.
pub const V1_VERSION: u16 = 1;
pub const CANONICAL_PROLOGUE_SIZE: usize = 4;
pub const LEGACY_PROLOGUE_SIZE: usize = 2;

// ── FormatVersion ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatVersion {
    /// Untagged prologue, header-relative `[start, end]` arrays, scalar keys
    /// supplied by the caller.
    Legacy,
    /// Tagged prologue (version 1), header-relative `[start, end]` arrays;
    /// any other value is a scalar.
    V1,
    /// Tagged prologue, absolute `"start-end"` strings, self-describing.
    Canonical,
}

impl FormatVersion {
    pub fn prologue_size(self) -> usize {
        match self {
            FormatVersion::Legacy => LEGACY_PROLOGUE_SIZE,
            FormatVersion::V1 | FormatVersion::Canonical => CANONICAL_PROLOGUE_SIZE,
        }
    }

    /// Map an on-disk version tag to its decode rules.
    pub fn from_tag(tag: u16) -> Result<Self, ContainerError> {
        match tag {
            CANONICAL_VERSION => Ok(FormatVersion::Canonical),
            V1_VERSION        => Ok(FormatVersion::V1),
            other             => Err(ContainerError::UnsupportedVersion(other)),
        }
    }

    /// Turn a range as recorded in the header into an absolute range within
    /// the container. `header_end` is the offset of the first byte after the
    /// header text.
    pub fn resolve(self, recorded: SegmentRange, header_end: usize) -> Result<SegmentRange, ContainerError> {
        match self {
            FormatVersion::Canonical => Ok(recorded),
            FormatVersion::Legacy | FormatVersion::V1 => {
                let base = header_end as u64;
                let start = recorded.start.checked_add(base);
                let end   = recorded.end.checked_add(base);
                match (start, end) {
                    (Some(start), Some(end)) => Ok(SegmentRange { start, end }),
                    _ => Err(ContainerError::MalformedHeader(format!(
                        "range {recorded} overflows when rebased on {base}"
                    ))),
                }
            }
        }
    }
}

// ── DecodeMode ──────────────────────────────────────────────────────────────

/// Which revision the caller expects to read. Selected once per decode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DecodeMode {
    /// Tagged prologue; the recorded version picks the rules.
    #[default]
    Canonical,
    /// Legacy archives do not record which keys are scalars; the caller must.
    Legacy { reserved_keys: HashSet<String> },
}

impl DecodeMode {
    pub fn legacy<I, S>(reserved_keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        DecodeMode::Legacy {
            reserved_keys: reserved_keys.into_iter().map(Into::into).collect(),
        }
    }
}

// ── Prologue ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prologue {
    pub version:    FormatVersion,
    pub header_len: u16,
}

impl Prologue {
    pub fn canonical(header_len: u16) -> Self {
        Self { version: FormatVersion::Canonical, header_len }
    }

    pub fn size(&self) -> usize {
        self.version.prologue_size()
    }

    /// Offset of the first byte after the header text.
    pub fn header_end(&self) -> usize {
        self.size() + self.header_len as usize
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![0u8; self.size()];
        match self.version {
            FormatVersion::Canonical => {
                LittleEndian::write_u16(&mut buf[0..2], CANONICAL_VERSION);
                LittleEndian::write_u16(&mut buf[2..4], self.header_len);
            }
            FormatVersion::V1 => {
                LittleEndian::write_u16(&mut buf[0..2], V1_VERSION);
                LittleEndian::write_u16(&mut buf[2..4], self.header_len);
            }
            FormatVersion::Legacy => {
                LittleEndian::write_u16(&mut buf[0..2], self.header_len);
            }
        }
        buf
    }

    /// Read the prologue from the front of `bytes`. Does not check that the
    /// declared header is actually present; see `Container::parse`.
    pub fn read(bytes: &[u8], mode: &DecodeMode) -> Result<Self, ContainerError> {
        match mode {
            DecodeMode::Canonical => {
                if bytes.len() < CANONICAL_PROLOGUE_SIZE {
                    return Err(ContainerError::truncated(CANONICAL_PROLOGUE_SIZE, bytes.len()));
                }
                let version = FormatVersion::from_tag(LittleEndian::read_u16(&bytes[0..2]))?;
                let header_len = LittleEndian::read_u16(&bytes[2..4]);
                Ok(Self { version, header_len })
            }
            DecodeMode::Legacy { .. } => {
                if bytes.len() < LEGACY_PROLOGUE_SIZE {
                    return Err(ContainerError::truncated(LEGACY_PROLOGUE_SIZE, bytes.len()));
                }
                Ok(Self {
                    version:    FormatVersion::Legacy,
                    header_len: LittleEndian::read_u16(&bytes[0..2]),
                })
            }
        }
    }
}
