//! Dictionary configuration
//!
//! All buffer-size and cache-size knobs live in one explicit value that is
//! passed to writers, disk dictionaries and the merge engine.

use crate::{Result, StorageError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Entries whose postings count is at or below this are dropped by
/// `MemoryDictionary::clear`; larger entries keep their map slot.
///
/// Tuning value carried over from earlier indexers, not a correctness requirement.
pub const CLEAR_RETAIN_THRESHOLD: usize = 3;

/// 字典配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DictConfig {
    /// BufWriter 容量（字节），用于 dump / merge 输出
    pub io_buffer_size: usize,

    /// 内存二分搜索树的最大深度
    ///
    /// Depth d keeps at most 2^d - 1 decoded anchors in memory:
    /// - 10 ≈ 1K anchors (default)
    /// - 14 ≈ 16K anchors (large segments)
    pub search_tree_depth: usize,

    /// LRU capacity (entries) of `CachedDiskDictionary`
    pub cache_capacity: usize,

    /// See [`CLEAR_RETAIN_THRESHOLD`]
    pub clear_retain_threshold: usize,

    /// When set, writer streams spill to temp files in this directory
    /// instead of growing in memory. Temp files never outlive the writer.
    pub temp_dir: Option<PathBuf>,

    /// fsync the output after a dictionary has been completely written
    pub sync_on_finish: bool,
}

impl Default for DictConfig {
    fn default() -> Self {
        Self {
            io_buffer_size: 64 * 1024, // 64KB
            search_tree_depth: 10,
            cache_capacity: 4096,
            clear_retain_threshold: CLEAR_RETAIN_THRESHOLD,
            temp_dir: None,
            sync_on_finish: true,
        }
    }
}

impl DictConfig {
    /// 测试用配置（最快，不刷盘）
    pub fn for_testing() -> Self {
        Self {
            io_buffer_size: 4 * 1024,
            search_tree_depth: 4,
            cache_capacity: 64,
            sync_on_finish: false,
            ..Default::default()
        }
    }

    /// 大段合并配置：更深的搜索树，写入流落盘
    pub fn for_large_segments(temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            io_buffer_size: 1024 * 1024,
            search_tree_depth: 14,
            cache_capacity: 64 * 1024,
            temp_dir: Some(temp_dir.into()),
            ..Default::default()
        }
    }

    /// Load a configuration from a JSON file; missing fields take defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read(path.as_ref())?;
        let config: DictConfig = serde_json::from_slice(&data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.io_buffer_size == 0 {
            return Err(StorageError::InvalidArgument("io_buffer_size must be > 0".into()));
        }
        if self.search_tree_depth == 0 || self.search_tree_depth > 24 {
            return Err(StorageError::InvalidArgument(format!(
                "search_tree_depth must be in 1..=24, got {}",
                self.search_tree_depth
            )));
        }
        Ok(())
    }
}
