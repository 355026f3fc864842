//! Term Dictionary Storage Engine
//!
//! 倒排索引的词典层：有序的 name → (id, postings) 映射
//!
//! ## 核心特性
//! - Front-coded names with an uncompressed anchor every 4 entries
//! - Memory-mapped disk dictionaries, lock-free concurrent lookups
//! - Two-pass header write: interrupted writes are detected on open
//! - K-way segment merge with old→new id translation tables
//! - Bigram dictionaries for wildcard / substring / stem / spelling lookups
//!
//! ## 架构
//! - `dictionary`: MemoryDictionary → DictionaryWriter → DiskDictionary, merge
//! - `bigram`: candidate generation for pattern lookups
//! - `config`: one explicit `DictConfig` for buffer, tree and cache sizes

pub mod bigram;
pub mod config;
pub mod dictionary;
pub mod encoding;

mod error;

pub use config::{DictConfig, CLEAR_RETAIN_THRESHOLD};
pub use error::{Result, StorageError};

pub use bigram::{DiskBiGramDictionary, MemoryBiGramDictionary};
pub use dictionary::{
    CachedDiskDictionary, DictionaryHeader, DictionaryStats, DictionaryWriter, DiskDictionary, DiskEntry, Entry,
    FreqPostings, IdMap, IdMapKind, IdPostings, MatchResult, MemoryDictionary, MergeOutcome, MergeParams, NameCodec,
    Postings, SearchLimits, TermStats,
};
