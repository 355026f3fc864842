//! 🚀 K-way dictionary merge
//!
//! Merges N source dictionaries (segments) into one new dictionary:
//!
//! - BinaryHeap (min-heap) keyed by (name, source index) drives the merge
//! - Every distinct name pops all sources holding it, their postings are
//!   translated into the new document id space and combined
//! - The merged entry gets its new id before it is written; the old→new entry
//!   id of every contributing source is recorded speculatively and rolled back
//!   to `DELETED` when nothing survives translation
//!
//! Output is written in ascending name order, so the result satisfies the
//! same layout invariants as a plain dump.

use super::disk::DiskDictionary;
use super::entry::{DiskEntry, Entry};
use super::header::DictionaryHeader;
use super::iter::DictIter;
use super::name_codec::NameCodec;
use super::postings::{IdMap, Postings};
use super::writer::DictionaryWriter;
use crate::config::DictConfig;
use crate::{Result, StorageError};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::fs::OpenOptions;
use std::io::{Seek, Write};
use std::path::Path;

/// Assigns the merged entry id for a name (output keeps an id→position map)
pub type EntryIdMapper<'a, K> = Box<dyn FnMut(&K) -> Result<u64> + 'a>;

/// Adjusts one source's postings (source index, name, postings) before combining
pub type MergeHook<'a, K, P> = Box<dyn FnMut(usize, &K, &mut P) -> Result<()> + 'a>;

/// Optional inputs of a merge
pub struct MergeParams<'a, K, P> {
    /// Ids decided by the caller instead of sorted position
    pub entry_id_mapper: Option<EntryIdMapper<'a, K>>,
    /// First new document id of each source (append mode)
    pub doc_starts: Option<Vec<u32>>,
    /// Per-source old→new document id maps; empty means no translation
    pub doc_maps: Vec<Option<IdMap>>,
    pub merge_hook: Option<MergeHook<'a, K, P>>,
}

impl<K, P> Default for MergeParams<'_, K, P> {
    fn default() -> Self {
        Self {
            entry_id_mapper: None,
            doc_starts: None,
            doc_maps: Vec::new(),
            merge_hook: None,
        }
    }
}

impl<'a, K, P> MergeParams<'a, K, P> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry_ids(mut self, mapper: impl FnMut(&K) -> Result<u64> + 'a) -> Self {
        self.entry_id_mapper = Some(Box::new(mapper));
        self
    }

    pub fn with_doc_starts(mut self, starts: Vec<u32>) -> Self {
        self.doc_starts = Some(starts);
        self
    }

    pub fn with_doc_maps(mut self, maps: Vec<Option<IdMap>>) -> Self {
        self.doc_maps = maps;
        self
    }

    pub fn with_merge_hook(mut self, hook: impl FnMut(usize, &K, &mut P) -> Result<()> + 'a) -> Self {
        self.merge_hook = Some(Box::new(hook));
        self
    }
}

/// Result of a merge
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub header: DictionaryHeader,
    /// Per source: old entry id → merged entry id (`DELETED` when dropped).
    /// Empty for absent sources.
    pub id_maps: Vec<IdMap>,
    pub max_entry_id: u64,
    pub entries_written: u64,
    /// Names whose postings were all deleted
    pub entries_dropped: u64,
}

/// 堆元素：按 (name, source) 升序
struct HeapItem<K> {
    entry: DiskEntry<K>,
    source: usize,
}

impl<K: Ord> PartialEq for HeapItem<K> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<K: Ord> Eq for HeapItem<K> {}

impl<K: Ord> PartialOrd for HeapItem<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K: Ord> Ord for HeapItem<K> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.entry
            .name
            .cmp(&other.entry.name)
            .then(self.source.cmp(&other.source))
    }
}

struct Merger<'d, K: NameCodec, P: Postings> {
    sources: Vec<Option<&'d DiskDictionary<K, P>>>,
    iters: Vec<Option<DictIter<'d, K, P>>>,
    heap: BinaryHeap<Reverse<HeapItem<K>>>,
}

impl<'d, K: NameCodec, P: Postings> Merger<'d, K, P> {
    fn new(sources: &[Option<&'d DiskDictionary<K, P>>]) -> Result<Self> {
        let mut merger = Self {
            sources: sources.to_vec(),
            iters: Vec::with_capacity(sources.len()),
            heap: BinaryHeap::with_capacity(sources.len()),
        };
        for source in sources {
            merger.iters.push(match source {
                Some(dict) => Some(dict.iter()?),
                None => None,
            });
        }
        for source in 0..merger.iters.len() {
            merger.refill(source)?;
        }
        Ok(merger)
    }

    fn refill(&mut self, source: usize) -> Result<()> {
        if let Some(Some(iter)) = self.iters.get_mut(source) {
            if let Some(entry) = iter.next() {
                self.heap.push(Reverse(HeapItem { entry: entry?, source }));
            }
        }
        Ok(())
    }

    /// All entries sharing the smallest name, in source order
    fn next_group(&mut self) -> Result<Option<Vec<HeapItem<K>>>> {
        let Some(Reverse(first)) = self.heap.pop() else {
            return Ok(None);
        };
        self.refill(first.source)?;
        let mut group = vec![first];
        while let Some(Reverse(top)) = self.heap.peek() {
            if top.entry.name != group[0].entry.name {
                break;
            }
            if let Some(Reverse(item)) = self.heap.pop() {
                self.refill(item.source)?;
                group.push(item);
            }
        }
        Ok(Some(group))
    }
}

impl<K: NameCodec, P: Postings> DiskDictionary<K, P> {
    /// Merge `sources` into a new dictionary written at the current position of `out`.
    ///
    /// `None` sources stand for segments without this dictionary.
    pub fn merge<W: Write + Seek>(
        sources: &[Option<&DiskDictionary<K, P>>],
        mut params: MergeParams<'_, K, P>,
        config: &DictConfig,
        out: &mut W,
    ) -> Result<MergeOutcome> {
        if let Some(starts) = &params.doc_starts {
            if starts.len() != sources.len() {
                return Err(StorageError::InvalidArgument(format!(
                    "{} document starts for {} sources",
                    starts.len(),
                    sources.len()
                )));
            }
        }
        if !params.doc_maps.is_empty() && params.doc_maps.len() != sources.len() {
            return Err(StorageError::InvalidArgument(format!(
                "{} document id maps for {} sources",
                params.doc_maps.len(),
                sources.len()
            )));
        }

        let mut writer: DictionaryWriter<K, P> = DictionaryWriter::new(config, params.entry_id_mapper.is_some())?;
        let mut id_maps: Vec<IdMap> = sources
            .iter()
            .map(|s| s.map_or_else(IdMap::default, |d| IdMap::all_deleted(d.max_entry_id() as usize + 1)))
            .collect();
        let mut merger = Merger::new(sources)?;
        let mut written = 0u64;
        let mut dropped = 0u64;

        while let Some(group) = merger.next_group()? {
            let name = group[0].entry.name.clone();
            let mut merged = P::default();
            let mut contributors = Vec::with_capacity(group.len());

            for item in &group {
                let Some(dict) = merger.sources[item.source] else {
                    continue;
                };
                let mut postings = dict.read_postings(&item.entry)?;
                if let Some(hook) = params.merge_hook.as_mut() {
                    hook(item.source, &name, &mut postings)?;
                }
                let doc_map = params.doc_maps.get(item.source).and_then(|m| m.as_ref());
                let combined = match &params.doc_starts {
                    Some(starts) => merged.append(&postings, starts[item.source], doc_map),
                    None => merged.merge(&postings, doc_map),
                };
                combined.map_err(|e| e.with_entry_name(format!("{:?}", name)))?;
                contributors.push((item.source, item.entry.id));
            }

            let new_id = match params.entry_id_mapper.as_mut() {
                Some(mapper) => mapper(&name)?,
                None => writer.next_position_id(),
            };
            // 先记录映射，没有 postings 留存时回滚为 DELETED
            for &(source, old_id) in &contributors {
                id_maps[source].set(old_id, new_id);
            }

            let mut entry = Entry::with_postings(name, new_id, merged);
            if writer.write(&mut entry)? {
                written += 1;
            } else {
                for &(source, old_id) in &contributors {
                    id_maps[source].mark_deleted(old_id);
                }
                dropped += 1;
            }
        }

        let header = writer.finish(out)?;
        log::info!(
            "merged {} sources ({} present): {} entries written, {} dropped, max id {}",
            sources.len(),
            sources.iter().filter(|s| s.is_some()).count(),
            written,
            dropped,
            header.max_entry_id
        );
        Ok(MergeOutcome {
            max_entry_id: header.max_entry_id,
            header,
            id_maps,
            entries_written: written,
            entries_dropped: dropped,
        })
    }

    /// [`merge`](Self::merge) into a new file at `path`
    pub fn merge_to_path(
        sources: &[Option<&DiskDictionary<K, P>>],
        params: MergeParams<'_, K, P>,
        config: &DictConfig,
        path: impl AsRef<Path>,
    ) -> Result<MergeOutcome> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path.as_ref())?;
        let outcome = Self::merge(sources, params, config, &mut file)?;
        if config.sync_on_finish {
            file.sync_data()?;
        }
        Ok(outcome)
    }
}
