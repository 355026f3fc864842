//! Term dictionaries
//!
//! Ordered name → (id, postings) maps in two forms:
//! - [`MemoryDictionary`]: mutable, hash-based, used while indexing
//! - [`DiskDictionary`]: immutable, front-coded, memory-mapped
//!
//! ## File layout
//! ```text
//! ┌────────────────────────────┐
//! │ DictionaryHeader           │  magic rewritten last
//! ├────────────────────────────┤
//! │ names (front-coded)        │
//! │ name offsets (per anchor)  │
//! │ entry info                 │
//! │ entry info offsets         │
//! │ id → position (optional)   │
//! │ postings channels          │
//! └────────────────────────────┘
//! ```

mod cached;
mod disk;
mod entry;
pub mod header;
mod iter;
pub mod lookup;
mod memory;
mod merge;
pub mod name_codec;
mod pattern;
pub mod postings;
mod search_tree;
mod spill;
mod writer;

/// Every 4th name is stored uncompressed (an anchor)
pub const ANCHOR_INTERVAL: usize = 4;

pub use cached::{CacheStats, CachedDiskDictionary};
pub use disk::{DictionaryStats, DiskDictionary};
pub use entry::{DiskEntry, Entry};
pub use header::{DictionaryHeader, MAGIC_GOOD};
pub use iter::DictIter;
pub use lookup::{insertion_point, LookupState};
pub use memory::{IdMapKind, MemoryDictionary, SortedEntries};
pub use merge::{EntryIdMapper, MergeHook, MergeOutcome, MergeParams};
pub use name_codec::{DateKey, F64Key, KeyKind, NameCodec};
pub use pattern::{levenshtein_distance, wildcard_match, MatchResult, SearchLimits};
pub use postings::{ChannelOutput, EntryInfo, FreqPostings, IdMap, IdPostings, Postings, TermStats, DELETED};
pub use search_tree::{BinarySearchTree, Narrowed};
pub use writer::DictionaryWriter;
