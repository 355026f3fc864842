//! Lookup sessions over a disk dictionary's name streams
//!
//! A [`LookupState`] is a set of cursors over the shared (mmapped) names and
//! name-offset streams. It is cheap to create, so every lookup session gets
//! its own and no cursor is ever shared between threads.
//!
//! ## findPos
//! ```text
//! anchors:   apple            bandana
//!              │                 │
//! positions: 0 apple  1 apply  2 banana  3 band  4 bandana
//!
//! find_pos("band")    = 3
//! find_pos("apricot") = -(2) - 1 = -3     // insertion index 2
//! ```

use super::header::DictionaryHeader;
use super::name_codec::NameCodec;
use super::ANCHOR_INTERVAL;
use crate::encoding::{read_fixed_slot, ByteReader};
use crate::{Result, StorageError};
use std::cmp::Ordering;

const INTERVAL: u64 = ANCHOR_INTERVAL as u64;

/// Encode a miss at insertion index `ins` the way `find_pos` reports it
#[inline]
pub fn encode_insertion(ins: u64) -> i64 {
    -(ins as i64) - 1
}

/// Recover the insertion index from a negative `find_pos` result
#[inline]
pub fn insertion_point(pos: i64) -> u64 {
    debug_assert!(pos < 0);
    (-(pos + 1)) as u64
}

/// Independent cursors over one dictionary's names
pub struct LookupState<'a, K: NameCodec> {
    names: &'a [u8],
    name_offsets: &'a [u8],
    offset_width: usize,
    size: u64,
    /// anchor index of the cached run
    run_anchor: Option<u64>,
    /// decoded names of that run, in order
    run: Vec<K>,
    /// byte position in `names` right after `run.last()`
    cursor: usize,
}

impl<'a, K: NameCodec> LookupState<'a, K> {
    pub fn new(names: &'a [u8], name_offsets: &'a [u8], header: &DictionaryHeader) -> Self {
        Self {
            names,
            name_offsets,
            offset_width: header.name_offset_width(),
            size: header.size,
            run_anchor: None,
            run: Vec::with_capacity(ANCHOR_INTERVAL),
            cursor: 0,
        }
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn anchor_count(&self) -> u64 {
        self.size.div_ceil(INTERVAL)
    }

    /// Byte offset of anchor `anchor` inside the names stream
    pub fn anchor_offset(&self, anchor: u64) -> Result<usize> {
        let offset = read_fixed_slot(self.name_offsets, anchor as usize, self.offset_width)? as usize;
        if offset >= self.names.len() {
            return Err(StorageError::Corruption(format!(
                "anchor {} points at {} past names stream ({} bytes)",
                anchor,
                offset,
                self.names.len()
            )));
        }
        Ok(offset)
    }

    /// Decode the uncompressed name of anchor `anchor`
    pub fn anchor_name(&mut self, anchor: u64) -> Result<K> {
        if self.run_anchor == Some(anchor) {
            if let Some(first) = self.run.first() {
                return Ok(first.clone());
            }
        }
        let mut reader = ByteReader::at(self.names, self.anchor_offset(anchor)?);
        K::decode(None, &mut reader)
    }

    /// Number of entries in the run starting at `anchor`
    fn run_len(&self, anchor: u64) -> usize {
        (self.size - anchor * INTERVAL).min(INTERVAL) as usize
    }

    /// Decode the first `count` names of the run at `anchor`
    fn ensure_run(&mut self, anchor: u64, count: usize) -> Result<()> {
        if self.run_anchor != Some(anchor) {
            self.run.clear();
            self.cursor = self.anchor_offset(anchor)?;
            self.run_anchor = Some(anchor);
        }
        while self.run.len() < count {
            let mut reader = ByteReader::at(self.names, self.cursor);
            let name = K::decode(self.run.last(), &mut reader)?;
            self.cursor = reader.position();
            self.run.push(name);
        }
        Ok(())
    }

    /// Name stored at sorted position `pos`; `None` past the end
    pub fn name_at(&mut self, pos: u64) -> Result<Option<K>> {
        if pos >= self.size {
            return Ok(None);
        }
        let anchor = pos / INTERVAL;
        let idx = (pos % INTERVAL) as usize;
        self.ensure_run(anchor, idx + 1)?;
        Ok(self.run.get(idx).cloned())
    }

    /// Position of `name`, or `-(insertion)-1` when absent.
    ///
    /// Only anchors in `[lo, hi)` are binary searched; callers narrow the
    /// range with the search tree first.
    pub fn find_pos_in(&mut self, name: &K, lo: u64, hi: u64) -> Result<i64> {
        // 1. first anchor in [lo, hi) greater than name
        let (mut l, mut h) = (lo, hi.min(self.anchor_count()));
        while l < h {
            let mid = l + (h - l) / 2;
            match self.anchor_name(mid)?.cmp(name) {
                Ordering::Greater => h = mid,
                Ordering::Equal => return Ok((mid * INTERVAL) as i64),
                Ordering::Less => l = mid + 1,
            }
        }
        if l == 0 {
            return Ok(encode_insertion(0));
        }

        // 2. scan the run following the last anchor <= name
        let anchor = l - 1;
        let base = anchor * INTERVAL;
        let run_len = self.run_len(anchor);
        for i in 1..run_len {
            self.ensure_run(anchor, i + 1)?;
            match self.run[i].cmp(name) {
                Ordering::Equal => return Ok((base + i as u64) as i64),
                Ordering::Greater => return Ok(encode_insertion(base + i as u64)),
                Ordering::Less => {}
            }
        }
        Ok(encode_insertion(base + run_len as u64))
    }

    /// [`find_pos_in`](Self::find_pos_in) over every anchor
    pub fn find_pos(&mut self, name: &K) -> Result<i64> {
        let hi = self.anchor_count();
        self.find_pos_in(name, 0, hi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::{bytes_required, write_fixed};

    /// Hand-build the names + name-offsets streams for sorted `names`
    fn streams(names: &[&str]) -> (Vec<u8>, Vec<u8>, DictionaryHeader) {
        let mut data = Vec::new();
        let mut offsets = Vec::new();
        let mut prev: Option<String> = None;
        for (i, name) in names.iter().enumerate() {
            let name = name.to_string();
            if i % ANCHOR_INTERVAL == 0 {
                offsets.push(data.len() as u64);
                String::encode(None, &name, &mut data);
            } else {
                String::encode(prev.as_ref(), &name, &mut data);
            }
            prev = Some(name);
        }
        let width = bytes_required(data.len() as u64);
        let mut table = Vec::new();
        for off in offsets {
            write_fixed(&mut table, off, width);
        }
        let header = DictionaryHeader {
            size: names.len() as u64,
            max_entry_id: names.len() as u64,
            names_size: data.len() as u64,
            ..Default::default()
        };
        (data, table, header)
    }

    const WORDS: [&str; 5] = ["apple", "apply", "banana", "band", "bandana"];

    #[test]
    fn test_name_at_decodes_deltas_from_anchor() {
        let (names, offsets, header) = streams(&WORDS);
        let mut state: LookupState<String> = LookupState::new(&names, &offsets, &header);
        assert_eq!(state.anchor_count(), 2);
        assert_eq!(state.name_at(2).unwrap().as_deref(), Some("banana"));
        assert_eq!(state.name_at(4).unwrap().as_deref(), Some("bandana"));
        assert_eq!(state.name_at(0).unwrap().as_deref(), Some("apple"));
        assert_eq!(state.name_at(5).unwrap(), None);
    }

    #[test]
    fn test_find_pos_hits_and_misses() {
        let (names, offsets, header) = streams(&WORDS);
        let mut state: LookupState<String> = LookupState::new(&names, &offsets, &header);

        for (i, word) in WORDS.iter().enumerate() {
            assert_eq!(state.find_pos(&word.to_string()).unwrap(), i as i64);
        }
        assert_eq!(state.find_pos(&"band".to_string()).unwrap(), 3);

        let miss = state.find_pos(&"apricot".to_string()).unwrap();
        assert_eq!(miss, -3);
        assert_eq!(insertion_point(miss), 2);

        assert_eq!(insertion_point(state.find_pos(&"aardvark".to_string()).unwrap()), 0);
        assert_eq!(insertion_point(state.find_pos(&"bandit".to_string()).unwrap()), 5);
        assert_eq!(insertion_point(state.find_pos(&"bananas".to_string()).unwrap()), 3);
    }

    #[test]
    fn test_empty_dictionary() {
        let (names, offsets, header) = streams(&[]);
        let mut state: LookupState<String> = LookupState::new(&names, &offsets, &header);
        assert_eq!(state.find_pos(&"x".to_string()).unwrap(), -1);
        assert_eq!(state.name_at(0).unwrap(), None);
    }

    #[test]
    fn test_corrupt_anchor_offset() {
        let (names, _, header) = streams(&WORDS);
        let bad_offsets = vec![0u8, 200];
        let mut state: LookupState<String> = LookupState::new(&names, &bad_offsets, &header);
        assert!(state.name_at(4).unwrap_err().is_corruption());
    }
}
