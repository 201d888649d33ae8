//! Container reader.
//!
//! [`Container::parse`] reads the prologue and header once; individual
//! segments are then borrowed straight out of the input without copying.
//! Offsets are resolved through the [`FormatVersion`] recorded (or, for
//! legacy data, asserted by the caller) so the rest of the reader never
//! branches on revision.

use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::ContainerError;
use crate::header::{Header, HeaderEntry, SegmentRange};
use crate::prologue::{DecodeMode, FormatVersion, Prologue};
use crate::writer::SEGMENT_PREFIX;

/// A resolved header member.
#[derive(Debug, Clone, PartialEq)]
pub enum Item<'a> {
    Scalar(Value),
    Segment(&'a [u8]),
}

impl<'a> Item<'a> {
    pub fn as_bytes(&self) -> Option<&'a [u8]> {
        match self {
            Item::Segment(bytes) => Some(*bytes),
            Item::Scalar(_)      => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            Item::Scalar(value) => Some(value),
            Item::Segment(_)    => None,
        }
    }
}

// ── Container ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Container<'a> {
    bytes:    &'a [u8],
    prologue: Prologue,
    header:   Header,
}

impl<'a> Container<'a> {
    pub fn parse(bytes: &'a [u8], mode: &DecodeMode) -> Result<Self, ContainerError> {
        let prologue = Prologue::read(bytes, mode)?;
        let header_end = prologue.header_end();
        if header_end > bytes.len() {
            return Err(ContainerError::truncated(header_end, bytes.len()));
        }

        let text = &bytes[prologue.size()..header_end];
        let header = match (prologue.version, mode) {
            (_, DecodeMode::Legacy { reserved_keys }) => Header::from_legacy_bytes(text, reserved_keys)?,
            (FormatVersion::V1, _) => Header::from_v1_bytes(text)?,
            _ => Header::from_bytes(text)?,
        };
        debug!(
            version = ?prologue.version,
            header_len = prologue.header_len,
            entries = header.len(),
            "parsed container header"
        );

        Ok(Self { bytes, prologue, header })
    }

    pub fn version(&self) -> FormatVersion {
        self.prologue.version
    }

    pub fn header_len(&self) -> usize {
        self.prologue.header_len as usize
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.header.keys()
    }

    /// Absolute, bounds-checked range of the segment stored under `key`.
    pub fn range(&self, key: &str) -> Result<SegmentRange, ContainerError> {
        let (stored, entry) = self.lookup(key)?;
        match entry {
            HeaderEntry::Segment(recorded) => self.resolve(*recorded),
            HeaderEntry::Scalar(_) => Err(ContainerError::NotASegment(stored.to_owned())),
        }
    }

    /// Bytes of one segment. `key` may carry the `DATA.` prefix.
    pub fn segment(&self, key: &str) -> Result<&'a [u8], ContainerError> {
        let range = self.range(key)?;
        Ok(self.slice(range))
    }

    pub fn get(&self, key: &str) -> Result<Item<'a>, ContainerError> {
        let (_, entry) = self.lookup(key)?;
        self.item(entry)
    }

    /// Every segment with its absolute range, in header key order. Ranges
    /// must be pairwise disjoint.
    pub fn segments(&self) -> Result<Vec<(&str, SegmentRange)>, ContainerError> {
        let segments = self
            .header
            .iter()
            .filter_map(|(key, entry)| entry.as_segment().map(|r| (key, r)))
            .map(|(key, recorded)| Ok::<_, ContainerError>((key, self.resolve(recorded)?)))
            .collect::<Result<Vec<_>, _>>()?;
        check_disjoint(&segments)?;
        Ok(segments)
    }

    /// Resolve the whole header. Fails on the first bad entry.
    pub fn read_all(&self) -> Result<BTreeMap<String, Item<'a>>, ContainerError> {
        self.segments()?;
        self.header
            .iter()
            .map(|(key, entry)| Ok::<_, ContainerError>((key.to_owned(), self.item(entry)?)))
            .collect()
    }

    /// A `DATA.`-prefixed key names the stripped segment first; the
    /// verbatim key is only a fallback.
    fn lookup<'k>(&self, key: &'k str) -> Result<(&'k str, &HeaderEntry), ContainerError> {
        let stripped = key.strip_prefix(SEGMENT_PREFIX);
        stripped
            .into_iter()
            .chain(std::iter::once(key))
            .find_map(|candidate| self.header.get(candidate).map(|entry| (candidate, entry)))
            .ok_or_else(|| ContainerError::UnknownKey(key.to_owned()))
    }

    fn item(&self, entry: &HeaderEntry) -> Result<Item<'a>, ContainerError> {
        match entry {
            HeaderEntry::Scalar(value) => Ok(Item::Scalar(value.clone())),
            HeaderEntry::Segment(recorded) => {
                let range = self.resolve(*recorded)?;
                Ok(Item::Segment(self.slice(range)))
            }
        }
    }

    fn slice(&self, range: SegmentRange) -> &'a [u8] {
        let bytes: &'a [u8] = self.bytes;
        &bytes[range.start as usize..range.end as usize]
    }

    fn resolve(&self, recorded: SegmentRange) -> Result<SegmentRange, ContainerError> {
        let header_end = self.prologue.header_end();
        let range = self.prologue.version.resolve(recorded, header_end)?;
        if range.start > range.end {
            return Err(ContainerError::MalformedHeader(format!("inverted range {range}")));
        }
        if range.start < header_end as u64 {
            return Err(ContainerError::MalformedHeader(format!(
                "range {range} overlaps the header ending at {header_end}"
            )));
        }
        if range.end > self.bytes.len() as u64 {
            let needed = usize::try_from(range.end).unwrap_or(usize::MAX);
            return Err(ContainerError::truncated(needed, self.bytes.len()));
        }
        Ok(range)
    }
}

fn check_disjoint(segments: &[(&str, SegmentRange)]) -> Result<(), ContainerError> {
    let mut sorted: Vec<_> = segments.iter().filter(|(_, r)| !r.is_empty()).collect();
    sorted.sort_by_key(|(_, r)| *r);
    for pair in sorted.windows(2) {
        let ((a, ra), (b, rb)) = (pair[0], pair[1]);
        if rb.start < ra.end {
            return Err(ContainerError::MalformedHeader(format!(
                "segments '{a}' ({ra}) and '{b}' ({rb}) overlap"
            )));
        }
    }
    Ok(())
}

// ── Convenience ─────────────────────────────────────────────────────────────

/// Every entry of a canonical container: scalars as stored, segments as
/// slices of `bytes`.
pub fn read_all(bytes: &[u8]) -> Result<BTreeMap<String, Item<'_>>, ContainerError> {
    Container::parse(bytes, &DecodeMode::Canonical)?.read_all()
}

/// One segment of a canonical container.
pub fn read_one<'a>(bytes: &'a [u8], key: &str) -> Result<&'a [u8], ContainerError> {
    Container::parse(bytes, &DecodeMode::Canonical)?.segment(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::{write, Entries};
    use serde_json::json;

    fn sample() -> Vec<u8> {
        let mut entries = Entries::new();
        entries.insert_segment("DATA.128x128xjpg", vec![0x01, 0x02, 0x03]);
        entries.insert_segment("DATA.64x64xjpg", vec![0xAA, 0xBB]);
        entries.insert_scalar("note", json!("hello"));
        write(&entries).unwrap()
    }

    /// Hand-built legacy blob: untagged prologue, header-relative arrays.
    fn legacy_sample() -> Vec<u8> {
        let header = serde_json::to_vec(&json!({
            "64x64xjpg": [0, 2],
            "32x32xjpg": [2, 5],
            "owner": "alice",
        }))
        .unwrap();
        let mut out = (header.len() as u16).to_le_bytes().to_vec();
        out.extend_from_slice(&header);
        out.extend_from_slice(&[0xAA, 0xBB, 0x01, 0x02, 0x03]);
        out
    }

    #[test]
    fn scalars_and_segments_resolve() {
        let blob = sample();
        let c = Container::parse(&blob, &DecodeMode::Canonical).unwrap();
        assert_eq!(c.version(), FormatVersion::Canonical);
        assert_eq!(c.segment("128x128xjpg").unwrap(), &[0x01, 0x02, 0x03]);
        assert_eq!(c.segment("DATA.64x64xjpg").unwrap(), &[0xAA, 0xBB]);
        assert_eq!(c.get("note").unwrap(), Item::Scalar(json!("hello")));
        assert_eq!(c.keys().collect::<Vec<_>>(), vec!["128x128xjpg", "64x64xjpg", "note"]);
    }

    #[test]
    fn lookup_errors() {
        let blob = sample();
        assert!(matches!(read_one(&blob, "does-not-exist"), Err(ContainerError::UnknownKey(k)) if k == "does-not-exist"));
        assert!(matches!(read_one(&blob, "note"), Err(ContainerError::NotASegment(k)) if k == "note"));
    }

    #[test]
    fn legacy_offsets_are_header_relative() {
        let blob = legacy_sample();
        let c = Container::parse(&blob, &DecodeMode::legacy(["owner"])).unwrap();
        assert_eq!(c.version(), FormatVersion::Legacy);
        assert_eq!(c.segment("64x64xjpg").unwrap(), &[0xAA, 0xBB]);
        assert_eq!(c.segment("32x32xjpg").unwrap(), &[0x01, 0x02, 0x03]);

        let all = c.read_all().unwrap();
        assert_eq!(all["owner"], Item::Scalar(json!("alice")));
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn legacy_blob_is_not_canonical() {
        let blob = legacy_sample();
        // The header length's low byte is read as a version tag.
        assert!(Container::parse(&blob, &DecodeMode::Canonical).is_err());
    }

    #[test]
    fn range_inside_header_is_malformed() {
        let header = br#"{"a":"0-2"}"#;
        let mut blob = vec![0x02, 0x00, header.len() as u8, 0x00];
        blob.extend_from_slice(header);
        let c = Container::parse(&blob, &DecodeMode::Canonical).unwrap();
        assert!(matches!(c.segment("a"), Err(ContainerError::MalformedHeader(_))));
        assert!(matches!(c.read_all(), Err(ContainerError::MalformedHeader(_))));
    }

    #[test]
    fn v1_container_is_read_by_tag() {
        let header = br#"{"32x32xjpg":[2,5],"64x64xjpg":[0,2],"r64x64":"64x48"}"#;
        let mut blob = vec![0x01, 0x00, header.len() as u8, 0x00];
        blob.extend_from_slice(header);
        blob.extend_from_slice(&[0xAA, 0xBB, 0x01, 0x02, 0x03]);

        let c = Container::parse(&blob, &DecodeMode::Canonical).unwrap();
        assert_eq!(c.version(), FormatVersion::V1);
        assert_eq!(c.segment("64x64xjpg").unwrap(), &[0xAA, 0xBB]);
        assert_eq!(c.segment("DATA.32x32xjpg").unwrap(), &[0x01, 0x02, 0x03]);

        let all = read_all(&blob).unwrap();
        assert_eq!(all["r64x64"], Item::Scalar(json!("64x48")));
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn prefixed_key_prefers_the_segment() {
        let header = br#"{"DATA.x":"v","x":"30-32"}"#;
        let mut blob = vec![0x02, 0x00, header.len() as u8, 0x00];
        blob.extend_from_slice(header);
        blob.extend_from_slice(&[1, 2]);
        assert_eq!(read_one(&blob, "DATA.x").unwrap(), &[1, 2]);

        let c = Container::parse(&blob, &DecodeMode::Canonical).unwrap();
        assert_eq!(c.get("DATA.x").unwrap(), Item::Segment(&[1, 2]));
    }

    #[test]
    fn overlapping_segments_are_malformed() {
        let header = br#"{"a":"41-45","b":"43-47","e":"42-42"}"#;
        let mut blob = vec![0x02, 0x00, header.len() as u8, 0x00];
        blob.extend_from_slice(header);
        blob.extend_from_slice(&[0; 6]);
        let c = Container::parse(&blob, &DecodeMode::Canonical).unwrap();
        assert_eq!(c.header_len(), 37);

        assert!(matches!(c.segments(), Err(ContainerError::MalformedHeader(m)) if m.contains("overlap")));
        assert!(matches!(c.read_all(), Err(ContainerError::MalformedHeader(_))));
        // A single lookup still resolves.
        assert_eq!(c.segment("a").unwrap(), &[0; 4]);
    }

    #[test]
    fn range_past_the_end_is_truncated() {
        let header = br#"{"a":"29-99","b":"29-30"}"#;
        let mut blob = vec![0x02, 0x00, header.len() as u8, 0x00];
        blob.extend_from_slice(header);
        blob.extend_from_slice(&[7; 8]);
        let c = Container::parse(&blob, &DecodeMode::Canonical).unwrap();
        assert_eq!(c.header_len(), 25);
        assert_eq!(c.segment("b").unwrap(), &[7]);
        assert!(matches!(c.segment("a"), Err(ContainerError::TruncatedInput { needed: 99, .. })));
        // read_all is all-or-nothing.
        assert!(c.read_all().is_err());
    }
}
