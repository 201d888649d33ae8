//! Container writer.
//!
//! A container is built in one shot from a complete [`Entries`] map:
//!
//! ```text
//! u16 version | u16 header_len | header JSON | zero padding | segment bytes...
//! ```
//!
//! Segment ranges in the header are absolute offsets from byte 0, which is
//! why the header region is sized up front by [`crate::alloc`] before the
//! header itself is serialized.
//!
//! ```
//! use thumber::writer::{write, Entries};
//! use thumber::reader::read_one;
//!
//! let mut entries = Entries::new();
//! entries.insert_segment("DATA.64x64xjpg", vec![0xAA, 0xBB]);
//! entries.insert_scalar("note", "hello".into());
//! let blob = write(&entries)?;
//! assert_eq!(read_one(&blob, "64x64xjpg")?, &[0xAA, 0xBB]);
//! # Ok::<(), thumber::ContainerError>(())
//! ```

use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

use crate::alloc::{self, Layout};
use crate::error::ContainerError;
use crate::header::{Header, HeaderEntry, SegmentRange};
use crate::prologue::Prologue;

/// Keys carrying this prefix name a segment; the prefix never reaches disk.
pub const SEGMENT_PREFIX: &str = "DATA.";

// ── Entry ───────────────────────────────────────────────────────────────────

/// Writer input: either payload bytes for the data region or a value stored
/// inline in the header.
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    Segment(Vec<u8>),
    Scalar(Value),
}

impl From<Vec<u8>> for Entry {
    fn from(bytes: Vec<u8>) -> Self {
        Entry::Segment(bytes)
    }
}

impl From<Value> for Entry {
    fn from(value: Value) -> Self {
        Entry::Scalar(value)
    }
}

// ── Entries ─────────────────────────────────────────────────────────────────

/// The unified mapping handed to [`write`]. Iteration is in key order, which
/// is also the order segments are laid out in the data region.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Entries {
    entries: BTreeMap<String, Entry>,
}

impl Entries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry. A segment key may carry [`SEGMENT_PREFIX`], which is
    /// stripped; scalar keys are kept verbatim and a prefixed one is refused
    /// by [`write`]. A later insert under the same stored key replaces the
    /// earlier one.
    pub fn insert(&mut self, key: impl Into<String>, entry: Entry) {
        let key = key.into();
        let key = match (&entry, key.strip_prefix(SEGMENT_PREFIX)) {
            (Entry::Segment(_), Some(stripped)) => stripped.to_owned(),
            _ => key,
        };
        self.entries.insert(key, entry);
    }

    pub fn insert_segment(&mut self, key: impl Into<String>, bytes: Vec<u8>) {
        self.insert(key, Entry::Segment(bytes));
    }

    pub fn insert_scalar(&mut self, key: impl Into<String>, value: Value) {
        self.insert(key, Entry::Scalar(value));
    }

    /// Merge caller metadata; each member becomes a scalar.
    pub fn extend_scalars(&mut self, extra: &serde_json::Map<String, Value>) {
        for (key, value) in extra {
            self.insert_scalar(key.clone(), value.clone());
        }
    }

    pub fn get(&self, key: &str) -> Option<&Entry> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Entry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn segments(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.entries.iter().filter_map(|(k, v)| match v {
            Entry::Segment(bytes) => Some((k.as_str(), bytes.as_slice())),
            Entry::Scalar(_) => None,
        })
    }

    pub fn scalars(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().filter_map(|(k, v)| match v {
            Entry::Scalar(value) => Some((k.as_str(), value)),
            Entry::Segment(_) => None,
        })
    }

    /// A scalar string shaped like `"12-34"` would read back as a segment,
    /// and a `DATA.` key always names one.
    fn check_scalars(&self) -> Result<(), ContainerError> {
        for (key, value) in self.scalars() {
            if key.starts_with(SEGMENT_PREFIX) {
                return Err(ContainerError::PrefixedScalar(key.to_owned()));
            }
            if let Value::String(s) = value {
                if SegmentRange::is_range_str(s) {
                    return Err(ContainerError::AmbiguousScalar(key.to_owned()));
                }
            }
        }
        Ok(())
    }
}

impl<K: Into<String>> FromIterator<(K, Entry)> for Entries {
    fn from_iter<I: IntoIterator<Item = (K, Entry)>>(iter: I) -> Self {
        let mut entries = Entries::new();
        for (k, v) in iter {
            entries.insert(k, v);
        }
        entries
    }
}

// ── Write ───────────────────────────────────────────────────────────────────

/// What [`write_with_report`] decided about the header region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReport {
    pub header_len: usize,
    pub allocation: usize,
    pub padding:    usize,
    pub layout:     Layout,
}

/// Build a canonical container from `entries`.
pub fn write(entries: &Entries) -> Result<Vec<u8>, ContainerError> {
    write_with_report(entries).map(|(bytes, _)| bytes)
}

/// Build a container from separate segment and scalar maps.
pub fn write_parts<S, M>(segments: S, scalars: M) -> Result<Vec<u8>, ContainerError>
where
    S: IntoIterator<Item = (String, Vec<u8>)>,
    M: IntoIterator<Item = (String, Value)>,
{
    let mut entries = Entries::new();
    for (key, bytes) in segments {
        entries.insert_segment(key, bytes);
    }
    for (key, value) in scalars {
        entries.insert_scalar(key, value);
    }
    write(&entries)
}

/// Like [`write`], also returning the header sizing that was used.
pub fn write_with_report(entries: &Entries) -> Result<(Vec<u8>, WriteReport), ContainerError> {
    entries.check_scalars()?;
    let layout = alloc::plan(entries)?;

    let mut header = Header::new();
    for (key, value) in entries.scalars() {
        header.insert(key, HeaderEntry::Scalar(value.clone()));
    }
    for (key, range) in &layout.segments {
        header.insert(key.as_str(), HeaderEntry::Segment(*range));
    }

    let header_bytes = header.to_bytes()?;
    let padding = alloc::padding(layout.allocation, header_bytes.len())?;
    let header_len = u16::try_from(header_bytes.len())
        .map_err(|_| ContainerError::HeaderTooLarge(header_bytes.len()))?;

    debug!(
        segments   = layout.segments.len(),
        scalars    = entries.len() - layout.segments.len(),
        header_len,
        allocation = layout.allocation,
        padding,
        total      = layout.total_len,
        "writing container"
    );

    let mut out = Vec::with_capacity(layout.total_len);
    out.extend_from_slice(&Prologue::canonical(header_len).to_bytes());
    out.extend_from_slice(&header_bytes);
    out.resize(out.len() + padding, 0);
    for (_, bytes) in entries.segments() {
        out.extend_from_slice(bytes);
    }
    debug_assert_eq!(out.len(), layout.total_len);

    let report = WriteReport {
        header_len: header_bytes.len(),
        allocation: layout.allocation,
        padding,
        layout,
    };
    Ok((out, report))
}
