//! Offset allocator.
//!
//! Segment ranges are absolute, so the writer has to know where the data
//! region begins before it can serialize the header that describes it. The
//! allocator breaks that cycle by reserving an upper bound for the header:
//!
//! ```text
//! allocation = Σ_segments (SEGMENT_ENTRY_OVERHEAD + len(json(key)))
//!            + len(json({scalars}))
//! ```
//!
//! `SEGMENT_ENTRY_OVERHEAD` covers a `"start-end"` value with two 20-digit
//! offsets plus the quotes, colon and separator around it, so the bound
//! holds for any key set. The gap between the bound and the real header is
//! written as zero padding.

use serde_json::Value;
use std::collections::BTreeMap;
use tracing::warn;

use crate::error::ContainerError;
use crate::header::SegmentRange;
use crate::prologue::CANONICAL_PROLOGUE_SIZE;
use crate::writer::Entries;

/// Reserved header bytes per segment, on top of its serialized key.
pub const SEGMENT_ENTRY_OVERHEAD: usize = 16 * 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    /// Bytes reserved for header text plus padding.
    pub allocation: usize,
    /// Offset of the first segment byte.
    pub data_start: usize,
    /// Absolute range of every segment, in write order.
    pub segments:   Vec<(String, SegmentRange)>,
    pub total_len:  usize,
}

/// Upper bound on the serialized header for `entries`.
pub fn header_allocation(entries: &Entries) -> Result<usize, ContainerError> {
    let scalars: BTreeMap<&str, &Value> = entries.scalars().collect();
    let mut allocation = serde_json::to_vec(&scalars)?.len();
    for (key, _) in entries.segments() {
        allocation += SEGMENT_ENTRY_OVERHEAD + serde_json::to_string(key)?.len();
    }
    Ok(allocation)
}

/// Reserve the header region and lay segments out back to back after it.
pub fn plan(entries: &Entries) -> Result<Layout, ContainerError> {
    let allocation = header_allocation(entries)?;
    let data_start = CANONICAL_PROLOGUE_SIZE + allocation;

    let mut offset = data_start as u64;
    let mut segments = Vec::new();
    for (key, bytes) in entries.segments() {
        let end = offset + bytes.len() as u64;
        segments.push((key.to_owned(), SegmentRange { start: offset, end }));
        offset = end;
    }

    Ok(Layout {
        allocation,
        data_start,
        segments,
        total_len: offset as usize,
    })
}

/// Zero bytes needed after a header of `actual` bytes. A header larger than
/// its allocation means the estimate above is wrong.
pub fn padding(allocation: usize, actual: usize) -> Result<usize, ContainerError> {
    allocation.checked_sub(actual).ok_or_else(|| {
        warn!(allocation, actual, "header outgrew its allocation");
        ContainerError::HeaderAllocationExceeded { allocated: allocation, actual }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_entries_reserve_an_empty_object() {
        let layout = plan(&Entries::new()).unwrap();
        assert_eq!(layout.allocation, 2);
        assert_eq!(layout.data_start, 6);
        assert_eq!(layout.total_len, 6);
        assert!(layout.segments.is_empty());
    }

    #[test]
    fn segments_tile_the_data_region() {
        let mut entries = Entries::new();
        entries.insert_segment("a", vec![0; 5]);
        entries.insert_segment("b", vec![]);
        entries.insert_segment("c", vec![0; 7]);
        entries.insert_scalar("note", json!("hello"));

        let layout = plan(&entries).unwrap();
        let expected = 3 * SEGMENT_ENTRY_OVERHEAD + 3 * 3 + r#"{"note":"hello"}"#.len();
        assert_eq!(layout.allocation, expected);

        let ranges: Vec<SegmentRange> = layout.segments.iter().map(|(_, r)| *r).collect();
        let start = layout.data_start as u64;
        assert_eq!(ranges, vec![
            SegmentRange { start,          end: start + 5 },
            SegmentRange { start: start + 5, end: start + 5 },
            SegmentRange { start: start + 5, end: start + 12 },
        ]);
        assert_eq!(layout.total_len as u64, start + 12);
    }

    #[test]
    fn under_allocation_is_an_error() {
        assert_eq!(padding(10, 10).unwrap(), 0);
        assert_eq!(padding(10, 4).unwrap(), 6);
        assert!(matches!(
            padding(10, 11),
            Err(ContainerError::HeaderAllocationExceeded { allocated: 10, actual: 11 })
        ));
    }
}
