pub mod error;
pub mod prologue;
pub mod header;
pub mod alloc;
pub mod writer;
pub mod reader;
pub mod thumbnail;
pub mod thumber;

pub use error::{ContainerError, ThumberError};
pub use prologue::{DecodeMode, FormatVersion, Prologue};
pub use header::{Header, HeaderEntry, SegmentRange};
pub use writer::{write, write_parts, Entries, Entry, SEGMENT_PREFIX};
pub use reader::{read_all, read_one, Container, Item};
pub use thumbnail::{GenerationError, ImageBackend, Limits, ThumbnailBackend, ThumbnailConfig, ThumbnailFormat};
pub use thumber::{load, Thumber};
