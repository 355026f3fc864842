//! Read-only disk dictionary
//!
//! The file is memory-mapped once and shared (`Arc<Mmap>`); every lookup
//! session gets its own [`LookupState`] over those shared bytes, so queries
//! never take a lock.
//!
//! ## Lookup pipeline
//! 1. walk the in-memory [`BinarySearchTree`] down to an anchor range
//! 2. binary search the uncompressed anchors inside that range
//! 3. decode the (up to 4 entry) run after the last anchor <= key

use super::entry::DiskEntry;
use super::header::DictionaryHeader;
use super::iter::DictIter;
use super::lookup::{insertion_point, LookupState};
use super::name_codec::NameCodec;
use super::postings::{EntryInfo, Postings, TermStats};
use super::search_tree::{BinarySearchTree, Narrowed};
use super::ANCHOR_INTERVAL;
use crate::config::DictConfig;
use crate::encoding::{read_fixed_slot, ByteReader};
use crate::{Result, StorageError};
use memmap2::{Mmap, MmapOptions};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::marker::PhantomData;
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Size and shape summary of an open dictionary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DictionaryStats {
    pub entries: u64,
    pub max_entry_id: u64,
    pub anchors: u64,
    pub tree_nodes: usize,
    pub tree_depth: usize,
    pub has_id_map: bool,
    pub names_bytes: u64,
    pub name_offsets_bytes: u64,
    pub entry_info_bytes: u64,
    pub entry_info_offsets_bytes: u64,
    pub id_map_bytes: u64,
    pub postings_bytes: u64,
    /// Header plus every stream
    pub total_bytes: u64,
}

/// Immutable dictionary backed by a memory-mapped file
pub struct DiskDictionary<K: NameCodec, P: Postings> {
    mmap: Arc<Mmap>,
    path: PathBuf,
    /// file offset of the header
    base: u64,
    header: DictionaryHeader,
    tree: BinarySearchTree<K>,
    _postings: PhantomData<P>,
}

impl<K: NameCodec, P: Postings> std::fmt::Debug for DiskDictionary<K, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskDictionary")
            .field("path", &self.path)
            .field("base", &self.base)
            .field("size", &self.header.size)
            .field("tree_nodes", &self.tree.len())
            .finish()
    }
}

impl<K: NameCodec, P: Postings> DiskDictionary<K, P> {
    /// Open the dictionary at the start of `path`
    pub fn open(path: impl AsRef<Path>, config: &DictConfig) -> Result<Self> {
        Self::open_at(path, 0, config)
    }

    /// Open a dictionary starting at byte `offset` of `path`
    pub fn open_at(path: impl AsRef<Path>, offset: u64, config: &DictConfig) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        // SAFETY: dictionary files are immutable once written
        let mmap = unsafe { MmapOptions::new().map(&file)? };
        Self::from_shared(Arc::new(mmap), path, offset, config)
    }

    /// Open a dictionary inside an already mapped file
    pub fn from_shared(mmap: Arc<Mmap>, path: impl AsRef<Path>, offset: u64, config: &DictConfig) -> Result<Self> {
        config.validate()?;
        let path = path.as_ref().to_path_buf();
        let file_len = mmap.len() as u64;
        if offset >= file_len {
            return Err(StorageError::Corruption(format!(
                "dictionary offset {} past end of {} ({} bytes)",
                offset,
                path.display(),
                file_len
            )));
        }

        let header = DictionaryHeader::decode(&mmap[offset as usize..])?;
        header.validate_ranges(file_len)?;
        if header.postings.len() != P::CHANNELS {
            return Err(StorageError::Corruption(format!(
                "dictionary has {} postings channels, expected {}",
                header.postings.len(),
                P::CHANNELS
            )));
        }

        let tree = {
            let names = section(&mmap, header.names_pos, header.names_size);
            let offsets = section(&mmap, header.name_offsets_pos, header.name_offsets_size);
            let mut state = LookupState::new(names, offsets, &header);
            BinarySearchTree::build(&mut state, config.search_tree_depth)?
        };

        log::debug!(
            "opened {:?} dictionary {} @{}: {} entries, {} anchors, {} tree nodes",
            K::KIND,
            path.display(),
            offset,
            header.size,
            header.anchor_count(),
            tree.len()
        );

        Ok(Self {
            mmap,
            path,
            base: offset,
            header,
            tree,
            _postings: PhantomData,
        })
    }

    pub fn header(&self) -> &DictionaryHeader {
        &self.header
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File offset this dictionary starts at
    pub fn base_offset(&self) -> u64 {
        self.base
    }

    pub fn len(&self) -> u64 {
        self.header.size
    }

    pub fn is_empty(&self) -> bool {
        self.header.size == 0
    }

    pub fn max_entry_id(&self) -> u64 {
        self.header.max_entry_id
    }

    pub fn has_id_map(&self) -> bool {
        self.header.has_id_map()
    }

    fn names(&self) -> &[u8] {
        section(&self.mmap, self.header.names_pos, self.header.names_size)
    }

    fn name_offsets(&self) -> &[u8] {
        section(&self.mmap, self.header.name_offsets_pos, self.header.name_offsets_size)
    }

    /// Start a lookup session with its own cursors
    pub fn session(&self) -> LookupState<'_, K> {
        LookupState::new(self.names(), self.name_offsets(), &self.header)
    }

    pub(crate) fn anchor_offset(&self, anchor: u64) -> Result<usize> {
        let width = self.header.name_offset_width();
        let offset = read_fixed_slot(self.name_offsets(), anchor as usize, width)? as usize;
        if offset >= self.names().len() {
            return Err(StorageError::Corruption(format!("anchor {} offset {} out of range", anchor, offset)));
        }
        Ok(offset)
    }

    pub(crate) fn names_reader(&self) -> ByteReader<'_> {
        ByteReader::new(self.names())
    }

    /// Raw bytes of every postings channel
    pub fn channels(&self) -> Vec<&[u8]> {
        self.header
            .postings
            .iter()
            .map(|(start, end)| section(&self.mmap, *start, end - start))
            .collect()
    }

    /// Position of `name`, or `-(insertion)-1` when absent
    pub fn find_pos(&self, name: &K) -> Result<i64> {
        let mut state = self.session();
        self.find_pos_with(&mut state, name)
    }

    /// [`find_pos`](Self::find_pos) reusing an existing session
    pub fn find_pos_with(&self, state: &mut LookupState<'_, K>, name: &K) -> Result<i64> {
        match self.tree.narrow(name) {
            Narrowed::Anchor(anchor) => Ok((anchor * ANCHOR_INTERVAL as u64) as i64),
            Narrowed::Range { lo, hi } => state.find_pos_in(name, lo, hi),
        }
    }

    /// Entry id and postings summary stored at `pos`
    pub fn entry_info(&self, pos: u64) -> Result<(u64, EntryInfo)> {
        if pos >= self.header.size {
            return Err(StorageError::InvalidArgument(format!(
                "position {} outside dictionary of {} entries",
                pos, self.header.size
            )));
        }
        let offsets = section(
            &self.mmap,
            self.header.entry_info_offsets_pos,
            self.header.entry_info_offsets_size,
        );
        let offset = read_fixed_slot(offsets, pos as usize, self.header.entry_info_offset_width())? as usize;
        let data = section(&self.mmap, self.header.entry_info_pos, self.header.entry_info_size);
        if offset >= data.len() {
            return Err(StorageError::Corruption(format!(
                "entry info offset {} for position {} out of range",
                offset, pos
            )));
        }

        let mut reader = ByteReader::at(data, offset);
        let id = if self.has_id_map() { reader.read_varint()? } else { pos + 1 };
        let info = EntryInfo::decode(&mut reader)?;
        Ok((id, info))
    }

    /// Entry id stored at position `pos`
    pub fn id_at(&self, pos: u64) -> Result<u64> {
        if self.has_id_map() {
            Ok(self.entry_info(pos)?.0)
        } else if pos < self.header.size {
            Ok(pos + 1)
        } else {
            Err(StorageError::InvalidArgument(format!("position {} out of range", pos)))
        }
    }

    pub(crate) fn entry_at(&self, pos: u64, name: K) -> Result<DiskEntry<K>> {
        let (id, info) = self.entry_info(pos)?;
        Ok(DiskEntry {
            name,
            id,
            position: pos,
            info,
        })
    }

    /// Exact lookup by name
    pub fn get(&self, name: &K) -> Result<Option<DiskEntry<K>>> {
        let pos = self.find_pos(name)?;
        if pos < 0 {
            return Ok(None);
        }
        self.entry_at(pos as u64, name.clone()).map(Some)
    }

    /// Entry at sorted position `pos`; `None` past the end
    pub fn get_by_position(&self, pos: u64) -> Result<Option<DiskEntry<K>>> {
        let mut state = self.session();
        match state.name_at(pos)? {
            Some(name) => self.entry_at(pos, name).map(Some),
            None => Ok(None),
        }
    }

    /// Sorted position of entry `id`, through the id map when present
    pub fn position_of_id(&self, id: u64) -> Result<Option<u64>> {
        if id == 0 || id > self.header.max_entry_id {
            return Ok(None);
        }
        if !self.has_id_map() {
            return Ok(Some(id - 1).filter(|pos| *pos < self.header.size));
        }
        let table = section(&self.mmap, self.header.id_to_posn_pos, self.header.id_to_posn_size);
        let slot = read_fixed_slot(table, id as usize, self.header.id_to_posn_width())?;
        match slot {
            0 => Ok(None),
            p if p > self.header.size => Err(StorageError::Corruption(format!(
                "id {} maps to position {} past {} entries",
                id,
                p - 1,
                self.header.size
            ))),
            p => Ok(Some(p - 1)),
        }
    }

    /// Lookup by entry id
    pub fn get_by_id(&self, id: u64) -> Result<Option<DiskEntry<K>>> {
        match self.position_of_id(id)? {
            Some(pos) => self.get_by_position(pos),
            None => Ok(None),
        }
    }

    /// Iterate every entry in name order
    pub fn iter(&self) -> Result<DictIter<'_, K, P>> {
        DictIter::new(self, 0, self.header.size)
    }

    /// Iterate entries whose names fall within the bounds.
    ///
    /// Yields nothing when the lower bound sorts after the upper bound.
    pub fn range(&self, lower: Bound<&K>, upper: Bound<&K>) -> Result<DictIter<'_, K, P>> {
        let mut state = self.session();
        let start = match lower {
            Bound::Unbounded => 0,
            Bound::Included(name) => match self.find_pos_with(&mut state, name)? {
                p if p >= 0 => p as u64,
                p => insertion_point(p),
            },
            Bound::Excluded(name) => match self.find_pos_with(&mut state, name)? {
                p if p >= 0 => p as u64 + 1,
                p => insertion_point(p),
            },
        };
        let end = match upper {
            Bound::Unbounded => self.header.size,
            Bound::Included(name) => match self.find_pos_with(&mut state, name)? {
                p if p >= 0 => p as u64 + 1,
                p => insertion_point(p),
            },
            Bound::Excluded(name) => match self.find_pos_with(&mut state, name)? {
                p if p >= 0 => p as u64,
                p => insertion_point(p),
            },
        };
        DictIter::new(self, start, end.max(start))
    }

    /// Entries whose names start with `prefix`, in name order
    pub fn prefixed<'a>(&'a self, prefix: &K) -> Result<impl Iterator<Item = Result<DiskEntry<K>>> + 'a> {
        let prefix = prefix.clone();
        let iter = self.range(Bound::Included(&prefix), Bound::Unbounded)?;
        Ok(iter.take_while(move |entry| match entry {
            Ok(entry) => K::starts_with(&prefix, &entry.name),
            Err(_) => true,
        }))
    }

    /// Materialise the postings of an entry read from this dictionary
    pub fn read_postings(&self, entry: &DiskEntry<K>) -> Result<P> {
        P::read_postings(&entry.info, &self.channels())
    }

    /// Postings for `name`, `None` when absent
    pub fn postings(&self, name: &K) -> Result<Option<P>> {
        match self.get(name)? {
            Some(entry) => self.read_postings(&entry).map(Some),
            None => Ok(None),
        }
    }

    pub fn term_stats(&self, name: &K) -> Result<Option<TermStats>> {
        Ok(self.get(name)?.map(|e| e.term_stats()))
    }

    pub fn stats(&self) -> DictionaryStats {
        let h = &self.header;
        let postings_bytes: u64 = h.postings.iter().map(|(s, e)| e - s).sum();
        let streams = h.names_size
            + h.name_offsets_size
            + h.entry_info_size
            + h.entry_info_offsets_size
            + h.id_to_posn_size
            + postings_bytes;
        DictionaryStats {
            entries: h.size,
            max_entry_id: h.max_entry_id,
            anchors: h.anchor_count(),
            tree_nodes: self.tree.len(),
            tree_depth: self.tree.depth(),
            has_id_map: h.has_id_map(),
            names_bytes: h.names_size,
            name_offsets_bytes: h.name_offsets_size,
            entry_info_bytes: h.entry_info_size,
            entry_info_offsets_bytes: h.entry_info_offsets_size,
            id_map_bytes: h.id_to_posn_size,
            postings_bytes,
            total_bytes: h.len() as u64 + streams,
        }
    }
}

/// Sub-slice of a validated stream
fn section(mmap: &Mmap, pos: u64, size: u64) -> &[u8] {
    &mmap[pos as usize..(pos + size) as usize]
}
