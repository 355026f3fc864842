//! Dictionary writer
//!
//! Streams entries (in ascending name order) into four parallel streams:
//!
//! ```text
//! names               front-coded, an uncompressed anchor every 4th entry
//! name offsets        one fixed-width slot per anchor
//! entry info          postings summaries (id-prefixed when an id map is kept)
//! entry info offsets  one fixed-width slot per entry
//! ```
//!
//! plus the optional id→position map and the postings channels. `finish`
//! writes a placeholder header, the streams, then rewinds and rewrites the
//! header with the good magic.

use super::entry::Entry;
use super::header::{DictionaryHeader, MAGIC_GOOD, MAGIC_PENDING};
use super::name_codec::NameCodec;
use super::postings::{ChannelOutput, IdMap, Postings};
use super::spill::SpillBuffer;
use super::ANCHOR_INTERVAL;
use crate::config::DictConfig;
use crate::encoding::{bytes_required, write_fixed, write_varint};
use crate::{Result, StorageError};
use std::fs::OpenOptions;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::marker::PhantomData;
use std::path::Path;

/// Serializer for one dictionary
pub struct DictionaryWriter<K: NameCodec, P: Postings> {
    config: DictConfig,
    names: SpillBuffer,
    entry_info: SpillBuffer,
    name_offsets: Vec<u64>,
    entry_info_offsets: Vec<u64>,
    /// id → position + 1 (0 = absent); `None` when entries are renumbered
    id_to_posn: Option<Vec<u64>>,
    channels: Vec<SpillBuffer>,
    /// per-entry postings bytes, appended to `channels` once the entry is accepted
    channel_scratch: Vec<ChannelOutput>,
    size: u64,
    max_entry_id: u64,
    last_name: Option<K>,
    scratch: Vec<u8>,
    _postings: PhantomData<P>,
}

impl<K: NameCodec, P: Postings> DictionaryWriter<K, P> {
    /// Create a writer. With `keep_id_map` entry ids are kept as-is and an
    /// id→position map is written; otherwise ids must equal position + 1.
    pub fn new(config: &DictConfig, keep_id_map: bool) -> Result<Self> {
        config.validate()?;
        let temp_dir = config.temp_dir.as_deref();
        let channels = (0..P::CHANNELS)
            .map(|i| SpillBuffer::new(temp_dir, config.io_buffer_size, &format!("postings-{}", i)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            names: SpillBuffer::new(temp_dir, config.io_buffer_size, "names")?,
            entry_info: SpillBuffer::new(temp_dir, config.io_buffer_size, "entry-info")?,
            config: config.clone(),
            name_offsets: Vec::new(),
            entry_info_offsets: Vec::new(),
            id_to_posn: keep_id_map.then(Vec::new),
            channels,
            channel_scratch: vec![ChannelOutput::default(); P::CHANNELS],
            size: 0,
            max_entry_id: 0,
            last_name: None,
            scratch: Vec::with_capacity(64),
            _postings: PhantomData,
        })
    }

    pub fn keeps_id_map(&self) -> bool {
        self.id_to_posn.is_some()
    }

    /// Entries written so far
    pub fn len(&self) -> u64 {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Id the next renumbered entry must carry
    pub fn next_position_id(&self) -> u64 {
        self.size + 1
    }

    pub fn max_entry_id(&self) -> u64 {
        self.max_entry_id
    }

    /// Write one entry. Returns false (and writes nothing) when the entry has
    /// no postings.
    pub fn write(&mut self, entry: &mut Entry<K, P>) -> Result<bool> {
        self.write_translated(entry, None)
    }

    /// Like [`write`](Self::write), translating document ids through `doc_map`
    pub fn write_translated(&mut self, entry: &mut Entry<K, P>, doc_map: Option<&IdMap>) -> Result<bool> {
        if let Some(last) = &self.last_name {
            if entry.name() <= last {
                return Err(StorageError::InvalidArgument(format!(
                    "names must be strictly ascending: {:?} after {:?}",
                    entry.name(),
                    last
                )));
            }
        }
        let id = entry.id();
        if id == 0 {
            return Err(StorageError::InvalidArgument(format!("entry {:?} has id 0", entry.name())));
        }
        if self.id_to_posn.is_none() && id != self.size + 1 {
            return Err(StorageError::InvalidArgument(format!(
                "entry {:?} has id {} at position {}; renumber or keep an id map",
                entry.name(),
                id,
                self.size
            )));
        }

        if let Some(map) = &self.id_to_posn {
            if map.get(id as usize).is_some_and(|&slot| slot != 0) {
                return Err(StorageError::InvalidArgument(format!("duplicate entry id {}", id)));
            }
        }

        for (out, channel) in self.channel_scratch.iter_mut().zip(&self.channels) {
            out.base = channel.len();
            out.buf.clear();
        }
        let written = entry
            .postings
            .write_postings(&mut self.channel_scratch, doc_map)
            .map_err(|e| e.with_entry_name(format!("{:?}", entry.name())))?;
        if !written {
            return Ok(false);
        }
        for (out, channel) in self.channel_scratch.iter().zip(self.channels.iter_mut()) {
            channel.write_all(&out.buf)?;
        }

        let pos = self.size;

        // 1. name: anchor every ANCHOR_INTERVAL entries, delta otherwise
        self.scratch.clear();
        if pos % ANCHOR_INTERVAL as u64 == 0 {
            self.name_offsets.push(self.names.len());
            K::encode(None, entry.name(), &mut self.scratch);
        } else {
            K::encode(self.last_name.as_ref(), entry.name(), &mut self.scratch);
        }
        self.names.write_all(&self.scratch)?;

        // 2. entry info
        self.entry_info_offsets.push(self.entry_info.len());
        self.scratch.clear();
        if self.id_to_posn.is_some() {
            write_varint(&mut self.scratch, id);
        }
        entry.postings.encode_info(&mut self.scratch);
        self.entry_info.write_all(&self.scratch)?;

        // 3. id → position
        if let Some(map) = &mut self.id_to_posn {
            let idx = id as usize;
            if idx >= map.len() {
                map.resize(idx + 1, 0);
            }
            map[idx] = pos + 1;
        }

        self.max_entry_id = self.max_entry_id.max(id);
        self.size += 1;
        self.last_name = Some(entry.name().clone());
        Ok(true)
    }

    /// Write the dictionary at the current position of `out`.
    ///
    /// On return `out` is positioned right after the written region, so
    /// several dictionaries can be concatenated into one file.
    pub fn finish<W: Write + Seek>(mut self, out: &mut W) -> Result<DictionaryHeader> {
        let base = out.stream_position()?;
        let mut header = DictionaryHeader {
            size: self.size,
            max_entry_id: self.max_entry_id,
            postings: vec![(0, 0); P::CHANNELS],
            magic: MAGIC_PENDING,
            ..Default::default()
        };

        let mut pos = base;
        {
            let mut buf = BufWriter::with_capacity(self.config.io_buffer_size, &mut *out);

            // 占位 header
            let mut header_bytes = Vec::with_capacity(header.len());
            header.encode(&mut header_bytes);
            buf.write_all(&header_bytes)?;
            pos += header_bytes.len() as u64;

            // names
            header.names_pos = pos;
            header.names_size = self.names.copy_to(&mut buf)?;
            pos += header.names_size;

            // name offsets
            let width = bytes_required(header.names_size);
            let mut table = Vec::with_capacity(self.name_offsets.len() * width);
            for &offset in &self.name_offsets {
                write_fixed(&mut table, offset, width);
            }
            header.name_offsets_pos = pos;
            header.name_offsets_size = table.len() as u64;
            buf.write_all(&table)?;
            pos += table.len() as u64;

            // entry info
            header.entry_info_pos = pos;
            header.entry_info_size = self.entry_info.copy_to(&mut buf)?;
            pos += header.entry_info_size;

            // entry info offsets
            let width = bytes_required(header.entry_info_size);
            table.clear();
            for &offset in &self.entry_info_offsets {
                write_fixed(&mut table, offset, width);
            }
            header.entry_info_offsets_pos = pos;
            header.entry_info_offsets_size = table.len() as u64;
            buf.write_all(&table)?;
            pos += table.len() as u64;

            // id → position map
            header.id_to_posn_pos = pos;
            if let Some(map) = &self.id_to_posn {
                let width = bytes_required(self.size);
                table.clear();
                for slot in 0..=self.max_entry_id as usize {
                    write_fixed(&mut table, map.get(slot).copied().unwrap_or(0), width);
                }
                header.id_to_posn_size = table.len() as u64;
                buf.write_all(&table)?;
                pos += table.len() as u64;
            }

            // postings channels
            for (i, channel) in self.channels.iter_mut().enumerate() {
                let len = channel.copy_to(&mut buf)?;
                header.postings[i] = (pos, pos + len);
                pos += len;
            }

            buf.flush()?;
        }

        // 回写 header
        header.magic = MAGIC_GOOD;
        let mut header_bytes = Vec::with_capacity(header.len());
        header.encode(&mut header_bytes);
        out.seek(SeekFrom::Start(base))?;
        out.write_all(&header_bytes)?;
        out.seek(SeekFrom::Start(pos))?;
        out.flush()?;

        log::debug!(
            "wrote dictionary: {} entries, {} anchors, {} bytes at offset {} (spilled: {})",
            header.size,
            self.name_offsets.len(),
            pos - base,
            base,
            self.names.is_spilled()
        );
        Ok(header)
    }

    /// Create (truncate) `path` and write the dictionary there
    pub fn finish_to_path(self, path: impl AsRef<Path>) -> Result<DictionaryHeader> {
        let sync = self.config.sync_on_finish;
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path.as_ref())?;
        let header = self.finish(&mut file)?;
        if sync {
            file.sync_data()?;
        }
        Ok(header)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::postings::IdPostings;
    use crate::encoding::read_fixed_slot;
    use std::io::Cursor;

    fn entry(name: &str, id: u64, docs: &[u32]) -> Entry<String, IdPostings> {
        Entry::with_postings(name.to_string(), id, IdPostings::from_docs(docs.iter().copied()))
    }

    #[test]
    fn test_anchor_every_fourth_entry() {
        let config = DictConfig::for_testing();
        let mut writer: DictionaryWriter<String, IdPostings> = DictionaryWriter::new(&config, false).unwrap();
        for (i, name) in ["apple", "apply", "banana", "band", "bandana"].iter().enumerate() {
            assert!(writer.write(&mut entry(name, i as u64 + 1, &[1])).unwrap());
        }
        assert_eq!(writer.name_offsets.len(), 2);

        let mut out = Cursor::new(Vec::new());
        let header = writer.finish(&mut out).unwrap();
        assert_eq!(header.size, 5);
        assert_eq!(header.max_entry_id, 5);
        assert_eq!(header.anchor_count(), 2);
        assert!(!header.has_id_map());

        let bytes = out.into_inner();
        let decoded = DictionaryHeader::decode(&bytes).unwrap();
        assert_eq!(decoded, header);

        // second anchor "bandana" is stored uncompressed
        let offsets = &bytes[header.name_offsets_pos as usize..][..header.name_offsets_size as usize];
        let second = read_fixed_slot(offsets, 1, header.name_offset_width()).unwrap();
        let anchor = &bytes[(header.names_pos + second) as usize..];
        assert_eq!(&anchor[..2], &[0, 7]);
        assert_eq!(&anchor[2..9], b"bandana");
    }

    #[test]
    fn test_rejects_unsorted_names() {
        let config = DictConfig::for_testing();
        let mut writer: DictionaryWriter<String, IdPostings> = DictionaryWriter::new(&config, false).unwrap();
        writer.write(&mut entry("b", 1, &[1])).unwrap();
        assert!(writer.write(&mut entry("a", 2, &[1])).is_err());
        assert!(writer.write(&mut entry("b", 2, &[1])).is_err());
    }

    #[test]
    fn test_renumbered_writer_checks_ids() {
        let config = DictConfig::for_testing();
        let mut writer: DictionaryWriter<String, IdPostings> = DictionaryWriter::new(&config, false).unwrap();
        assert!(writer.write(&mut entry("a", 7, &[1])).is_err());
    }

    #[test]
    fn test_duplicate_id_leaves_writer_unchanged() {
        let config = DictConfig::for_testing();
        let mut writer: DictionaryWriter<String, IdPostings> = DictionaryWriter::new(&config, true).unwrap();
        writer.write(&mut entry("a", 5, &[1])).unwrap();
        let err = writer.write(&mut entry("b", 5, &[2])).unwrap_err();
        assert!(matches!(err, StorageError::InvalidArgument(_)));
        assert_eq!(writer.len(), 1);
        assert!(writer.write(&mut entry("c", 6, &[3])).unwrap());

        let mut out = Cursor::new(Vec::new());
        let header = writer.finish(&mut out).unwrap();
        assert_eq!(header.size, 2);
        // one anchor, one info offset per written entry
        assert_eq!(header.name_offsets_size, bytes_required(header.names_size) as u64);
        assert_eq!(header.entry_info_offsets_size, 2 * bytes_required(header.entry_info_size) as u64);
        let channel = header.postings[0];
        assert!(channel.1 > channel.0);
    }

    #[test]
    fn test_empty_postings_not_written() {
        let config = DictConfig::for_testing();
        let mut writer: DictionaryWriter<String, IdPostings> = DictionaryWriter::new(&config, true).unwrap();
        assert!(!writer.write(&mut entry("ghost", 3, &[])).unwrap());
        assert!(writer.is_empty());
        assert!(writer.write(&mut entry("real", 9, &[4])).unwrap());

        let mut out = Cursor::new(Vec::new());
        let header = writer.finish(&mut out).unwrap();
        assert_eq!(header.size, 1);
        assert_eq!(header.max_entry_id, 9);
        assert!(header.has_id_map());
        assert_eq!(header.id_to_posn_size, 10);
    }

    #[test]
    fn test_concatenated_dictionaries() {
        let config = DictConfig::for_testing();
        let mut out = Cursor::new(Vec::new());

        let mut first: DictionaryWriter<String, IdPostings> = DictionaryWriter::new(&config, false).unwrap();
        first.write(&mut entry("x", 1, &[1])).unwrap();
        first.finish(&mut out).unwrap();
        let second_start = out.position();

        let mut second: DictionaryWriter<String, IdPostings> = DictionaryWriter::new(&config, false).unwrap();
        second.write(&mut entry("y", 1, &[2])).unwrap();
        let header = second.finish(&mut out).unwrap();

        assert_eq!(out.position(), out.get_ref().len() as u64);
        assert_eq!(header.names_pos, second_start + header.len() as u64);
        let decoded = DictionaryHeader::decode(&out.get_ref()[second_start as usize..]).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn test_spilled_streams_match_memory() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let spill_config = DictConfig {
            temp_dir: Some(temp_dir.path().to_path_buf()),
            ..DictConfig::for_testing()
        };

        let mut outputs = Vec::new();
        for config in [DictConfig::for_testing(), spill_config] {
            let mut writer: DictionaryWriter<String, IdPostings> = DictionaryWriter::new(&config, false).unwrap();
            for i in 0..50u32 {
                writer.write(&mut entry(&format!("term{:03}", i), i as u64 + 1, &[i])).unwrap();
            }
            if config.temp_dir.is_some() {
                // names, entry info and the postings channel
                assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 3);
            }
            let mut out = Cursor::new(Vec::new());
            writer.finish(&mut out).unwrap();
            outputs.push(out.into_inner());
        }
        assert_eq!(outputs[0], outputs[1]);
        assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }
}
