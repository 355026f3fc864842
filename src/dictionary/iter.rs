//! Forward iteration over a position range
//!
//! Each `next()` decodes one delta from the previous name; at every anchor
//! position the cursor jumps to the anchor's offset and decodes it standalone.

use super::disk::DiskDictionary;
use super::entry::DiskEntry;
use super::name_codec::NameCodec;
use super::postings::Postings;
use super::ANCHOR_INTERVAL;
use crate::encoding::ByteReader;
use crate::Result;

const INTERVAL: u64 = ANCHOR_INTERVAL as u64;

/// Iterator over the entries at positions `[start, end)`
pub struct DictIter<'a, K: NameCodec, P: Postings> {
    dict: &'a DiskDictionary<K, P>,
    names: ByteReader<'a>,
    next_pos: u64,
    end: u64,
    prev: Option<K>,
}

impl<'a, K: NameCodec, P: Postings> DictIter<'a, K, P> {
    pub(crate) fn new(dict: &'a DiskDictionary<K, P>, start: u64, end: u64) -> Result<Self> {
        let end = end.min(dict.len());
        let mut iter = Self {
            dict,
            names: dict.names_reader(),
            next_pos: start - start % INTERVAL,
            end,
            prev: None,
        };
        // 从锚点解码到起始位置
        if start < end {
            while iter.next_pos < start {
                iter.decode_next()?;
            }
        } else {
            iter.next_pos = end;
        }
        Ok(iter)
    }

    /// Position of the entry the next call to `next()` returns
    pub fn position(&self) -> u64 {
        self.next_pos
    }

    /// Entries left
    pub fn remaining(&self) -> u64 {
        self.end.saturating_sub(self.next_pos)
    }

    fn decode_next(&mut self) -> Result<K> {
        let pos = self.next_pos;
        let name = if pos % INTERVAL == 0 {
            let offset = self.dict.anchor_offset(pos / INTERVAL)?;
            self.names.seek(offset);
            K::decode(None, &mut self.names)?
        } else {
            K::decode(self.prev.as_ref(), &mut self.names)?
        };
        self.prev = Some(name.clone());
        self.next_pos += 1;
        Ok(name)
    }

    fn next_entry(&mut self) -> Result<DiskEntry<K>> {
        let pos = self.next_pos;
        let name = self.decode_next()?;
        self.dict.entry_at(pos, name)
    }
}

impl<K: NameCodec, P: Postings> Iterator for DictIter<'_, K, P> {
    type Item = Result<DiskEntry<K>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next_pos >= self.end {
            return None;
        }
        let result = self.next_entry();
        if result.is_err() {
            // 出错后终止迭代
            self.next_pos = self.end;
        }
        Some(result)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.remaining() as usize;
        (left, Some(left))
    }
}
