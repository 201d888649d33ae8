use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;

use crate::error::ContainerError;

// ── SegmentRange ────────────────────────────────────────────────────────────

/// Half-open byte range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SegmentRange {
    pub start: u64,
    pub end:   u64,
}

impl SegmentRange {
    pub fn new(start: u64, end: u64) -> Result<Self, ContainerError> {
        if start > end {
            return Err(ContainerError::MalformedHeader(format!(
                "range start {start} is past its end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// True for strings of the exact shape `<digits>-<digits>`.
    pub fn is_range_str(s: &str) -> bool {
        match s.split_once('-') {
            Some((a, b)) => is_digits(a) && is_digits(b),
            None => false,
        }
    }
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

impl fmt::Display for SegmentRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

impl FromStr for SegmentRange {
    type Err = ContainerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || ContainerError::MalformedHeader(format!("bad segment range '{s}'"));
        if !Self::is_range_str(s) {
            return Err(malformed());
        }
        let (a, b) = s.split_once('-').ok_or_else(malformed)?;
        let start = a.parse::<u64>().map_err(|_| malformed())?;
        let end   = b.parse::<u64>().map_err(|_| malformed())?;
        Self::new(start, end)
    }
}

// ── HeaderEntry ─────────────────────────────────────────────────────────────

/// One member of the header object.
///
/// On the wire a segment is the string `"start-end"`; any other JSON value
/// is a scalar and is stored untouched.
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderEntry {
    Scalar(Value),
    Segment(SegmentRange),
}

impl HeaderEntry {
    pub fn as_segment(&self) -> Option<SegmentRange> {
        match self {
            HeaderEntry::Segment(r) => Some(*r),
            HeaderEntry::Scalar(_)  => None,
        }
    }
}

impl Serialize for HeaderEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            HeaderEntry::Scalar(v)  => v.serialize(serializer),
            HeaderEntry::Segment(r) => serializer.collect_str(r),
        }
    }
}

impl<'de> Deserialize<'de> for HeaderEntry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::String(s) if SegmentRange::is_range_str(&s) => s
                .parse()
                .map(HeaderEntry::Segment)
                .map_err(serde::de::Error::custom),
            other => Ok(HeaderEntry::Scalar(other)),
        }
    }
}

// ── Header ──────────────────────────────────────────────────────────────────

/// The decoded header object. Ranges are kept exactly as recorded; turning
/// them into absolute offsets is the version's job (see `FormatVersion::resolve`).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Header {
    entries: BTreeMap<String, HeaderEntry>,
}

impl<'de> Deserialize<'de> for Header {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let UniqueMap(entries) = UniqueMap::deserialize(deserializer)?;
        Ok(Header { entries })
    }
}

/// A JSON object that refuses repeated member names instead of keeping the
/// last one.
struct UniqueMap<V>(BTreeMap<String, V>);

impl<'de, V: Deserialize<'de>> Deserialize<'de> for UniqueMap<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct UniqueMapVisitor<V>(PhantomData<V>);

        impl<'de, V: Deserialize<'de>> Visitor<'de> for UniqueMapVisitor<V> {
            type Value = UniqueMap<V>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a JSON object")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut entries = BTreeMap::new();
                while let Some(key) = map.next_key::<String>()? {
                    let value = map.next_value()?;
                    if entries.contains_key(&key) {
                        return Err(de::Error::custom(format_args!("duplicate key '{key}'")));
                    }
                    entries.insert(key, value);
                }
                Ok(UniqueMap(entries))
            }
        }

        deserializer.deserialize_map(UniqueMapVisitor(PhantomData))
    }
}

impl Header {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, entry: HeaderEntry) {
        self.entries.insert(key.into(), entry);
    }

    pub fn get(&self, key: &str) -> Option<&HeaderEntry> {
        self.entries.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &HeaderEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Compact JSON, the form written to disk.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Parse a canonical header.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ContainerError> {
        serde_json::from_slice(bytes).map_err(|e| ContainerError::MalformedHeader(e.to_string()))
    }

    /// Parse a legacy header: keys listed in `reserved_keys` are scalars,
    /// everything else must be a header-relative `[start, end]` pair.
    pub fn from_legacy_bytes(bytes: &[u8], reserved_keys: &HashSet<String>) -> Result<Self, ContainerError> {
        let mut header = Header::new();
        for (key, value) in relative_object(bytes)? {
            let entry = if reserved_keys.contains(&key) {
                HeaderEntry::Scalar(value)
            } else {
                HeaderEntry::Segment(legacy_range(&key, &value)?)
            };
            header.entries.insert(key, entry);
        }
        Ok(header)
    }

    /// Parse a version-1 header: a two-integer array is a header-relative
    /// `[start, end]` pair, anything else is a scalar.
    pub fn from_v1_bytes(bytes: &[u8]) -> Result<Self, ContainerError> {
        let mut header = Header::new();
        for (key, value) in relative_object(bytes)? {
            let entry = if is_range_pair(&value) {
                HeaderEntry::Segment(legacy_range(&key, &value)?)
            } else {
                HeaderEntry::Scalar(value)
            };
            header.entries.insert(key, entry);
        }
        Ok(header)
    }
}

fn relative_object(bytes: &[u8]) -> Result<BTreeMap<String, Value>, ContainerError> {
    serde_json::from_slice::<UniqueMap<Value>>(bytes)
        .map(|UniqueMap(object)| object)
        .map_err(|e| ContainerError::MalformedHeader(e.to_string()))
}

fn is_range_pair(value: &Value) -> bool {
    matches!(value.as_array(), Some(items) if items.len() == 2 && items.iter().all(Value::is_u64))
}

fn legacy_range(key: &str, value: &Value) -> Result<SegmentRange, ContainerError> {
    let pair = match value.as_array() {
        Some(items) if items.len() == 2 => (items[0].as_u64(), items[1].as_u64()),
        _ => (None, None),
    };
    match pair {
        (Some(start), Some(end)) => SegmentRange::new(start, end),
        _ => Err(ContainerError::MalformedHeader(format!(
            "'{key}' is not a reserved key and not a [start, end] pair: {value}"
        ))),
    }
}
