//! Segmentation of biographical dictionary text into per-author entries.
//!
//! A tabaqat/tarajim book lists its entries behind an ordinal marker, most
//! commonly an entry number, a dash, then the author heading. The marker
//! convention varies across editions, so the pattern is a parameter rather
//! than a constant; [`EntryPattern::default_numbered`] covers the common
//! `N - heading` layout.

mod segment;

pub use segment::{AuthorChunk, EntryPattern, PatternError, segment_text};
