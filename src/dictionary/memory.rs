//! In-memory dictionary used while a segment is being built
//!
//! Design:
//! - name → entry hash map (ahash), ids assigned monotonically from 1
//! - Sorted (and optionally renumbered) only once, at dump time
//! - `clear()` keeps the map slots of busy entries so the next indexing run
//!   does not reallocate them

use super::entry::Entry;
use super::name_codec::NameCodec;
use super::postings::{IdMap, Postings, TermStats};
use super::writer::DictionaryWriter;
use crate::config::{DictConfig, CLEAR_RETAIN_THRESHOLD};
use crate::Result;
use ahash::AHashMap;
use std::io::{Seek, Write};

/// Which id translation table `sort_for_dump` keeps when renumbering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdMapKind {
    #[default]
    None,
    /// slot[old_id] = new_id
    OldToNew,
    /// slot[new_id] = old_id
    NewToOld,
}

/// Entries in dump order plus the optional id translation table
pub struct SortedEntries<'a, K: NameCodec, P: Postings> {
    pub entries: Vec<&'a mut Entry<K, P>>,
    pub id_map: Option<IdMap>,
    pub renumbered: bool,
}

/// Mutable name → entry map
pub struct MemoryDictionary<K: NameCodec, P: Postings> {
    entries: AHashMap<K, Entry<K, P>>,
    next_id: u64,
    retain_threshold: usize,
}

impl<K: NameCodec, P: Postings> Default for MemoryDictionary<K, P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: NameCodec, P: Postings> MemoryDictionary<K, P> {
    pub fn new() -> Self {
        Self {
            entries: AHashMap::new(),
            next_id: 1,
            retain_threshold: CLEAR_RETAIN_THRESHOLD,
        }
    }

    pub fn with_config(config: &DictConfig) -> Self {
        Self {
            retain_threshold: config.clear_retain_threshold,
            ..Self::new()
        }
    }

    /// Existing entry for `name`, or a new one with the next id
    pub fn put(&mut self, name: K) -> &mut Entry<K, P> {
        let next_id = &mut self.next_id;
        self.entries.entry(name).or_insert_with_key(|name| {
            let id = *next_id;
            *next_id += 1;
            Entry::new(name.clone(), id)
        })
    }

    /// Shortcut for indexing: `put(name)` then record `doc`
    pub fn add(&mut self, name: K, doc: u32) -> u64 {
        let entry = self.put(name);
        entry.postings.add(doc);
        entry.id()
    }

    pub fn get(&self, name: &K) -> Option<&Entry<K, P>> {
        self.entries.get(name)
    }

    pub fn get_mut(&mut self, name: &K) -> Option<&mut Entry<K, P>> {
        self.entries.get_mut(name)
    }

    pub fn term_stats(&self, name: &K) -> Option<TermStats> {
        self.entries.get(name).map(|e| e.term_stats())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Largest id assigned so far
    pub fn max_id(&self) -> u64 {
        self.next_id - 1
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entry<K, P>> {
        self.entries.values()
    }

    /// Sort entries by name for dumping.
    ///
    /// Only entries with postings are returned. With `renumber`, ids are
    /// reassigned to sorted position (1-based); entries left out of the dump are
    /// numbered after them so ids stay unique, and map to `DELETED`.
    pub fn sort_for_dump(&mut self, renumber: bool, kind: IdMapKind) -> SortedEntries<'_, K, P> {
        let old_max = self.next_id - 1;
        let mut all: Vec<&mut Entry<K, P>> = self.entries.values_mut().collect();
        all.sort_by(|a, b| {
            a.postings
                .is_empty()
                .cmp(&b.postings.is_empty())
                .then_with(|| a.name().cmp(b.name()))
        });
        let dumpable = all.iter().take_while(|e| !e.postings.is_empty()).count();

        let mut id_map = None;
        if renumber {
            let mut map = match kind {
                IdMapKind::None => None,
                IdMapKind::OldToNew => Some(IdMap::all_deleted(old_max as usize + 1)),
                IdMapKind::NewToOld => Some(IdMap::all_deleted(dumpable + 1)),
            };
            for (pos, entry) in all.iter_mut().enumerate() {
                let new_id = pos as u64 + 1;
                if pos < dumpable {
                    match (&mut map, kind) {
                        (Some(m), IdMapKind::OldToNew) => m.set(entry.id(), new_id),
                        (Some(m), IdMapKind::NewToOld) => m.set(new_id, entry.id()),
                        _ => {}
                    }
                }
                entry.set_id(new_id);
            }
            self.next_id = all.len() as u64 + 1;
            id_map = map;
        }

        all.truncate(dumpable);
        SortedEntries {
            entries: all,
            id_map,
            renumbered: renumber,
        }
    }

    /// Sort and stream every entry into `writer`, then finish it into `out`.
    ///
    /// Returns the id translation table requested by `kind`, if any.
    pub fn dump<W: Write + Seek>(
        &mut self,
        mut writer: DictionaryWriter<K, P>,
        renumber: bool,
        kind: IdMapKind,
        out: &mut W,
    ) -> Result<Option<IdMap>> {
        let sorted = self.sort_for_dump(renumber, kind);
        let count = sorted.entries.len();
        for entry in sorted.entries {
            writer.write(entry)?;
        }
        let header = writer.finish(out)?;
        log::debug!(
            "dumped memory dictionary: {} entries, max id {}, id map {}",
            count,
            header.max_entry_id,
            header.id_to_posn_size > 0
        );
        Ok(sorted.id_map)
    }

    /// Reset for the next indexing run.
    ///
    /// Entries with at most `retain_threshold` postings are dropped; larger ones
    /// keep their slot (and id) with cleared postings.
    pub fn clear(&mut self) {
        let threshold = self.retain_threshold as u64;
        self.entries.retain(|_, entry| {
            if entry.postings.doc_count() <= threshold {
                false
            } else {
                entry.postings.clear();
                true
            }
        });
    }
}
