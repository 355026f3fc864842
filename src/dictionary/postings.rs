//! Postings-bearing entry contract
//!
//! The dictionary never looks inside postings. It only drives them through
//! [`Postings`]: write to the output channels, encode an entry-info summary,
//! read back, merge and append under an id translation table.
//!
//! Two kinds are provided:
//! - [`IdPostings`]: document-id set (Roaring Bitmap), 1 channel
//! - [`FreqPostings`]: document-id + term frequency, 2 channels
//!
//! ## Entry info format
//! ```text
//! [doc_count: varint][total_freq: varint][n_channels: varint]
//! ([offset: varint][len: varint]) × n_channels     // relative to channel start
//! ```

use crate::encoding::{write_varint, ByteReader};
use crate::{Result, StorageError};
use roaring::RoaringBitmap;
use std::collections::BTreeMap;
use std::fmt::Debug;

/// Sentinel for a deleted / dropped id in an [`IdMap`]
pub const DELETED: i64 = -1;

/// old id → new id translation table (`DELETED` marks removed ids)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IdMap {
    slots: Vec<i64>,
}

impl IdMap {
    /// All `len` slots start out deleted
    pub fn all_deleted(len: usize) -> Self {
        Self { slots: vec![DELETED; len] }
    }

    pub fn identity(len: usize) -> Self {
        Self { slots: (0..len as i64).collect() }
    }

    pub fn from_vec(slots: Vec<i64>) -> Self {
        Self { slots }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn as_slice(&self) -> &[i64] {
        &self.slots
    }

    /// New id for `old`, `None` when deleted or out of range
    pub fn get(&self, old: u64) -> Option<u64> {
        match self.slots.get(old as usize) {
            Some(&v) if v >= 0 => Some(v as u64),
            _ => None,
        }
    }

    /// Like [`IdMap::get`] but an out-of-range id is an error
    pub fn lookup(&self, old: u64) -> Result<Option<u64>> {
        match self.slots.get(old as usize) {
            Some(&v) if v >= 0 => Ok(Some(v as u64)),
            Some(_) => Ok(None),
            None => Err(StorageError::InvalidData(format!(
                "id {} outside translation table of {} slots",
                old,
                self.slots.len()
            ))),
        }
    }

    pub fn is_deleted(&self, old: u64) -> bool {
        self.get(old).is_none()
    }

    pub fn set(&mut self, old: u64, new: u64) {
        let idx = old as usize;
        if idx >= self.slots.len() {
            self.slots.resize(idx + 1, DELETED);
        }
        self.slots[idx] = new as i64;
    }

    pub fn mark_deleted(&mut self, old: u64) {
        if let Some(slot) = self.slots.get_mut(old as usize) {
            *slot = DELETED;
        }
    }
}

/// Byte range of one entry's postings inside a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelRange {
    pub offset: u64,
    pub len: u64,
}

/// One entry's bytes for a postings channel, positioned at `base` in that channel
#[derive(Debug, Clone, Default)]
pub struct ChannelOutput {
    pub base: u64,
    pub buf: Vec<u8>,
}

impl ChannelOutput {
    pub fn at(base: u64) -> Self {
        Self { base, buf: Vec::new() }
    }

    /// Channel offset of the next byte written
    pub fn position(&self) -> u64 {
        self.base + self.buf.len() as u64
    }
}

/// Decoded postings summary stored in the entry-info stream
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EntryInfo {
    pub doc_count: u64,
    pub total_freq: u64,
    pub channels: Vec<ChannelRange>,
}

impl EntryInfo {
    pub fn encode(&self, out: &mut Vec<u8>) {
        write_varint(out, self.doc_count);
        write_varint(out, self.total_freq);
        write_varint(out, self.channels.len() as u64);
        for range in &self.channels {
            write_varint(out, range.offset);
            write_varint(out, range.len);
        }
    }

    pub fn decode(input: &mut ByteReader<'_>) -> Result<Self> {
        let doc_count = input.read_varint()?;
        let total_freq = input.read_varint()?;
        let n = input.read_varint()? as usize;
        if n > 16 {
            return Err(StorageError::Corruption(format!("entry info claims {} channels", n)));
        }
        let mut channels = Vec::with_capacity(n);
        for _ in 0..n {
            let offset = input.read_varint()?;
            let len = input.read_varint()?;
            channels.push(ChannelRange { offset, len });
        }
        Ok(Self { doc_count, total_freq, channels })
    }

    /// Slice of channel `idx` holding this entry's bytes
    pub(crate) fn channel_bytes<'a>(&self, channels: &[&'a [u8]], idx: usize) -> Result<&'a [u8]> {
        let range = self.channels.get(idx).ok_or_else(|| {
            StorageError::Corruption(format!("entry info has no range for channel {}", idx))
        })?;
        let data = channels
            .get(idx)
            .ok_or_else(|| StorageError::Corruption(format!("missing postings channel {}", idx)))?;
        let start = range.offset as usize;
        let end = start.saturating_add(range.len as usize);
        if end > data.len() {
            return Err(StorageError::Corruption(format!(
                "postings range {}..{} outside channel {} ({} bytes)",
                start,
                end,
                idx,
                data.len()
            )));
        }
        Ok(&data[start..end])
    }
}

/// Translate one document id into the merged id space
///
/// `Ok(None)` means the document was deleted.
pub fn translate_doc(doc: u32, start: u32, id_map: Option<&IdMap>) -> Result<Option<u32>> {
    let mapped = match id_map {
        Some(map) => match map.lookup(doc as u64)? {
            Some(new) => new,
            None => return Ok(None),
        },
        None => doc as u64,
    };
    let shifted = mapped
        .checked_add(start as u64)
        .filter(|v| *v <= u32::MAX as u64)
        .ok_or_else(|| StorageError::Overflow {
            name: String::new(),
            detail: format!("document {} + start {} exceeds u32 id space", mapped, start),
        })?;
    Ok(Some(shifted as u32))
}

/// Postings collaborator contract
pub trait Postings: Clone + Default + Debug + Send + Sync + 'static {
    /// Number of output channels written by `write_postings`
    const CHANNELS: usize;

    /// Record one occurrence in `doc` (indexing time)
    fn add(&mut self, doc: u32);

    fn doc_count(&self) -> u64;

    fn total_freq(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.doc_count() == 0
    }

    fn clear(&mut self);

    /// Write postings to `outputs` translating documents through `id_map`.
    /// Recorded channel ranges are relative to each output's `base`.
    ///
    /// Returns false when nothing survives translation; such an entry must not be written.
    fn write_postings(&mut self, outputs: &mut [ChannelOutput], id_map: Option<&IdMap>) -> Result<bool>;

    /// Encode the summary recorded by the last `write_postings`
    fn encode_info(&self, out: &mut Vec<u8>);

    /// Materialise postings from the channel data of a written dictionary
    fn read_postings(info: &EntryInfo, channels: &[&[u8]]) -> Result<Self>;

    /// Union `other` into `self`
    fn merge(&mut self, other: &Self, id_map: Option<&IdMap>) -> Result<()>;

    /// Add `other`'s documents shifted by `start`
    fn append(&mut self, other: &Self, start: u32, id_map: Option<&IdMap>) -> Result<()>;
}

/// Document-id postings
#[derive(Debug, Clone, Default)]
pub struct IdPostings {
    docs: RoaringBitmap,
    written: Option<EntryInfo>,
}

impl PartialEq for IdPostings {
    fn eq(&self, other: &Self) -> bool {
        self.docs == other.docs
    }
}

impl IdPostings {
    pub fn from_docs(docs: impl IntoIterator<Item = u32>) -> Self {
        Self {
            docs: docs.into_iter().collect(),
            written: None,
        }
    }

    pub fn docs(&self) -> &RoaringBitmap {
        &self.docs
    }

    pub fn into_docs(self) -> RoaringBitmap {
        self.docs
    }

    pub fn contains(&self, doc: u32) -> bool {
        self.docs.contains(doc)
    }

    fn union_translated(&mut self, other: &Self, start: u32, id_map: Option<&IdMap>) -> Result<()> {
        if start == 0 && id_map.is_none() {
            self.docs |= &other.docs;
            return Ok(());
        }
        for doc in other.docs.iter() {
            if let Some(new) = translate_doc(doc, start, id_map)? {
                self.docs.insert(new);
            }
        }
        Ok(())
    }
}

impl Postings for IdPostings {
    const CHANNELS: usize = 1;

    fn add(&mut self, doc: u32) {
        self.docs.insert(doc);
    }

    fn doc_count(&self) -> u64 {
        self.docs.len()
    }

    fn total_freq(&self) -> u64 {
        self.docs.len()
    }

    fn clear(&mut self) {
        self.docs.clear();
        self.written = None;
    }

    fn write_postings(&mut self, outputs: &mut [ChannelOutput], id_map: Option<&IdMap>) -> Result<bool> {
        self.written = None;
        let translated;
        let docs = match id_map {
            Some(_) => {
                let mut t = IdPostings::default();
                t.union_translated(self, 0, id_map)?;
                translated = t.docs;
                &translated
            }
            None => &self.docs,
        };
        if docs.is_empty() {
            return Ok(false);
        }

        let out = outputs
            .get_mut(0)
            .ok_or_else(|| StorageError::InvalidArgument("IdPostings needs 1 output channel".into()))?;
        let offset = out.position();
        docs.serialize_into(&mut out.buf)?;
        let len = out.position() - offset;

        self.written = Some(EntryInfo {
            doc_count: docs.len(),
            total_freq: docs.len(),
            channels: vec![ChannelRange { offset, len }],
        });
        Ok(true)
    }

    fn encode_info(&self, out: &mut Vec<u8>) {
        match &self.written {
            Some(info) => info.encode(out),
            None => EntryInfo {
                doc_count: self.doc_count(),
                total_freq: self.total_freq(),
                channels: Vec::new(),
            }
            .encode(out),
        }
    }

    fn read_postings(info: &EntryInfo, channels: &[&[u8]]) -> Result<Self> {
        let bytes = info.channel_bytes(channels, 0)?;
        let docs = RoaringBitmap::deserialize_from(bytes)
            .map_err(|e| StorageError::Corruption(format!("bad roaring postings: {}", e)))?;
        if docs.len() != info.doc_count {
            return Err(StorageError::Corruption(format!(
                "postings hold {} docs, entry info says {}",
                docs.len(),
                info.doc_count
            )));
        }
        Ok(Self { docs, written: None })
    }

    fn merge(&mut self, other: &Self, id_map: Option<&IdMap>) -> Result<()> {
        self.union_translated(other, 0, id_map)
    }

    fn append(&mut self, other: &Self, start: u32, id_map: Option<&IdMap>) -> Result<()> {
        self.union_translated(other, start, id_map)
    }
}

/// Document-id + within-document frequency postings
#[derive(Debug, Clone, Default)]
pub struct FreqPostings {
    freqs: BTreeMap<u32, u32>,
    written: Option<EntryInfo>,
}

impl PartialEq for FreqPostings {
    fn eq(&self, other: &Self) -> bool {
        self.freqs == other.freqs
    }
}

impl FreqPostings {
    pub fn from_pairs(pairs: impl IntoIterator<Item = (u32, u32)>) -> Self {
        Self {
            freqs: pairs.into_iter().filter(|(_, f)| *f > 0).collect(),
            written: None,
        }
    }

    pub fn freq(&self, doc: u32) -> u32 {
        self.freqs.get(&doc).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.freqs.iter().map(|(d, f)| (*d, *f))
    }

    fn add_freq(&mut self, doc: u32, freq: u32) -> Result<()> {
        let slot = self.freqs.entry(doc).or_insert(0);
        *slot = slot.checked_add(freq).ok_or_else(|| StorageError::Overflow {
            name: String::new(),
            detail: format!("frequency of document {} exceeds u32", doc),
        })?;
        Ok(())
    }

    fn combine(&mut self, other: &Self, start: u32, id_map: Option<&IdMap>) -> Result<()> {
        for (&doc, &freq) in &other.freqs {
            if let Some(new) = translate_doc(doc, start, id_map)? {
                self.add_freq(new, freq)?;
            }
        }
        Ok(())
    }
}

impl Postings for FreqPostings {
    const CHANNELS: usize = 2;

    fn add(&mut self, doc: u32) {
        let slot = self.freqs.entry(doc).or_insert(0);
        *slot = slot.saturating_add(1);
    }

    fn doc_count(&self) -> u64 {
        self.freqs.len() as u64
    }

    fn total_freq(&self) -> u64 {
        self.freqs.values().map(|f| *f as u64).sum()
    }

    fn clear(&mut self) {
        self.freqs.clear();
        self.written = None;
    }

    fn write_postings(&mut self, outputs: &mut [ChannelOutput], id_map: Option<&IdMap>) -> Result<bool> {
        self.written = None;
        let translated;
        let freqs = match id_map {
            Some(_) => {
                let mut t = FreqPostings::default();
                t.combine(self, 0, id_map)?;
                translated = t.freqs;
                &translated
            }
            None => &self.freqs,
        };
        if freqs.is_empty() {
            return Ok(false);
        }
        if outputs.len() < 2 {
            return Err(StorageError::InvalidArgument("FreqPostings needs 2 output channels".into()));
        }

        // channel 0: delta-encoded doc ids, channel 1: frequencies
        let (ids_out, rest) = outputs.split_at_mut(1);
        let ids_out = &mut ids_out[0];
        let freq_out = &mut rest[0];
        let ids_offset = ids_out.position();
        let freq_offset = freq_out.position();

        let mut prev_doc = 0u32;
        let mut total = 0u64;
        for (i, (&doc, &freq)) in freqs.iter().enumerate() {
            let delta = if i == 0 { doc } else { doc - prev_doc };
            write_varint(&mut ids_out.buf, delta as u64);
            write_varint(&mut freq_out.buf, freq as u64);
            prev_doc = doc;
            total += freq as u64;
        }

        self.written = Some(EntryInfo {
            doc_count: freqs.len() as u64,
            total_freq: total,
            channels: vec![
                ChannelRange { offset: ids_offset, len: ids_out.position() - ids_offset },
                ChannelRange { offset: freq_offset, len: freq_out.position() - freq_offset },
            ],
        });
        Ok(true)
    }

    fn encode_info(&self, out: &mut Vec<u8>) {
        match &self.written {
            Some(info) => info.encode(out),
            None => EntryInfo {
                doc_count: self.doc_count(),
                total_freq: self.total_freq(),
                channels: Vec::new(),
            }
            .encode(out),
        }
    }

    fn read_postings(info: &EntryInfo, channels: &[&[u8]]) -> Result<Self> {
        let mut ids = ByteReader::new(info.channel_bytes(channels, 0)?);
        let mut freqs_in = ByteReader::new(info.channel_bytes(channels, 1)?);

        let mut freqs = BTreeMap::new();
        let mut prev_doc = 0u64;
        for i in 0..info.doc_count {
            let delta = ids.read_varint()?;
            let doc = if i == 0 { delta } else { prev_doc + delta };
            if doc > u32::MAX as u64 {
                return Err(StorageError::Corruption(format!("document id {} exceeds u32", doc)));
            }
            let freq = freqs_in.read_varint()?;
            freqs.insert(doc as u32, freq.min(u32::MAX as u64) as u32);
            prev_doc = doc;
        }
        Ok(Self { freqs, written: None })
    }

    fn merge(&mut self, other: &Self, id_map: Option<&IdMap>) -> Result<()> {
        self.combine(other, 0, id_map)
    }

    fn append(&mut self, other: &Self, start: u32, id_map: Option<&IdMap>) -> Result<()> {
        self.combine(other, start, id_map)
    }
}

/// Per-term statistics derived from an entry's postings summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TermStats {
    pub doc_freq: u64,
    pub total_freq: u64,
}

impl From<&EntryInfo> for TermStats {
    fn from(info: &EntryInfo) -> Self {
        Self {
            doc_freq: info.doc_count,
            total_freq: info.total_freq,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channels<P: Postings>() -> Vec<ChannelOutput> {
        vec![ChannelOutput::default(); P::CHANNELS]
    }

    #[test]
    fn test_id_postings_write_read() {
        // two bytes of a preceding entry already in the channel
        let mut out = vec![ChannelOutput::at(2)];

        let mut postings = IdPostings::from_docs([3, 7, 100_000]);
        assert!(postings.write_postings(&mut out, None).unwrap());

        let mut info_buf = Vec::new();
        postings.encode_info(&mut info_buf);
        let info = EntryInfo::decode(&mut ByteReader::new(&info_buf)).unwrap();
        assert_eq!(info.doc_count, 3);
        assert_eq!(info.channels[0].offset, 2);

        let mut channel = b"xx".to_vec();
        channel.extend_from_slice(&out[0].buf);
        let read = IdPostings::read_postings(&info, &[channel.as_slice()]).unwrap();
        assert_eq!(read, postings);
    }

    #[test]
    fn test_write_postings_all_deleted() {
        let mut out = channels::<IdPostings>();
        let mut postings = IdPostings::from_docs([0, 1]);
        let map = IdMap::all_deleted(2);
        assert!(!postings.write_postings(&mut out, Some(&map)).unwrap());
        assert!(out[0].buf.is_empty());
    }

    #[test]
    fn test_append_with_start_and_map() {
        let mut acc = IdPostings::from_docs([1]);
        let other = IdPostings::from_docs([0, 1, 2]);
        // doc 1 deleted, doc 2 compacts to 1
        let map = IdMap::from_vec(vec![0, DELETED, 1]);
        acc.append(&other, 10, Some(&map)).unwrap();
        assert_eq!(acc.docs().iter().collect::<Vec<_>>(), vec![1, 10, 11]);
    }

    #[test]
    fn test_append_overflow() {
        let mut acc = IdPostings::default();
        let other = IdPostings::from_docs([u32::MAX - 1]);
        let err = acc.append(&other, 5, None).unwrap_err();
        assert!(matches!(err, StorageError::Overflow { .. }));
        let named = err.with_entry_name("apple");
        assert!(named.to_string().contains("apple"));
    }

    #[test]
    fn test_freq_postings_roundtrip_and_merge() {
        let mut postings = FreqPostings::default();
        postings.add(5);
        postings.add(5);
        postings.add(9);
        assert_eq!(postings.doc_count(), 2);
        assert_eq!(postings.total_freq(), 3);

        let mut out = channels::<FreqPostings>();
        assert!(postings.write_postings(&mut out, None).unwrap());
        let mut info_buf = Vec::new();
        postings.encode_info(&mut info_buf);
        let info = EntryInfo::decode(&mut ByteReader::new(&info_buf)).unwrap();
        assert_eq!(TermStats::from(&info), TermStats { doc_freq: 2, total_freq: 3 });

        let slices: Vec<&[u8]> = out.iter().map(|c| c.buf.as_slice()).collect();
        let read = FreqPostings::read_postings(&info, &slices).unwrap();
        assert_eq!(read.freq(5), 2);
        assert_eq!(read.freq(9), 1);

        let mut merged = read.clone();
        merged.merge(&FreqPostings::from_pairs([(5, 4), (6, 1)]), None).unwrap();
        assert_eq!(merged.freq(5), 6);
        assert_eq!(merged.freq(6), 1);
    }

    #[test]
    fn test_id_map_lookup() {
        let mut map = IdMap::all_deleted(3);
        map.set(1, 7);
        assert_eq!(map.get(1), Some(7));
        assert!(map.is_deleted(0));
        assert!(map.lookup(5).is_err());
        map.mark_deleted(1);
        assert_eq!(map.lookup(1).unwrap(), None);
        map.set(4, 2);
        assert_eq!(map.len(), 5);
    }
}
