//! Dictionary header
//!
//! ## Layout (all integers big-endian)
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ size: i64                                   │
//! │ maxEntryID: i64                             │
//! │ idToPosnPos: i64       idToPosnSize: i64    │
//! │ nameOffsetsPos: i64    nameOffsetsSize: i64 │
//! │ namesPos: i64          namesSize: i64       │
//! │ entryInfoOffsetsPos: i64                    │
//! │ entryInfoOffsetsSize: i64                   │
//! │ entryInfoPos: i64      entryInfoSize: i64   │
//! │ nPostingsChannels: i32                      │
//! │ (postStart: i64, postEnd: i64) × n          │
//! │ magic: i32                                  │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! The header is first written with [`MAGIC_PENDING`] and rewritten with
//! [`MAGIC_GOOD`] once every stream is on disk, so an interrupted write is
//! detectable by the missing magic.

use crate::encoding::{bytes_required, ByteReader};
use crate::{Result, StorageError};

/// Trailing magic of a completely written dictionary ("TDIC")
pub const MAGIC_GOOD: i32 = 0x5444_4943;

/// Placeholder magic written before the streams
pub const MAGIC_PENDING: i32 = 0;

/// Upper bound on postings channels accepted when reading a header
pub const MAX_POSTINGS_CHANNELS: usize = 16;

const FIXED_FIELDS: usize = 12;

/// Serialized dictionary descriptor. All positions are absolute file offsets.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DictionaryHeader {
    pub size: u64,
    pub max_entry_id: u64,
    pub id_to_posn_pos: u64,
    pub id_to_posn_size: u64,
    pub name_offsets_pos: u64,
    pub name_offsets_size: u64,
    pub names_pos: u64,
    pub names_size: u64,
    pub entry_info_offsets_pos: u64,
    pub entry_info_offsets_size: u64,
    pub entry_info_pos: u64,
    pub entry_info_size: u64,
    /// (start, end) byte range of each postings channel
    pub postings: Vec<(u64, u64)>,
    pub magic: i32,
}

impl DictionaryHeader {
    /// Encoded length for `channels` postings channels
    pub fn encoded_len(channels: usize) -> usize {
        FIXED_FIELDS * 8 + 4 + channels * 16 + 4
    }

    pub fn len(&self) -> usize {
        Self::encoded_len(self.postings.len())
    }

    pub fn is_complete(&self) -> bool {
        self.magic == MAGIC_GOOD
    }

    pub fn has_id_map(&self) -> bool {
        self.id_to_posn_size > 0
    }

    /// Number of anchors (uncompressed names) in the name stream
    pub fn anchor_count(&self) -> u64 {
        self.size.div_ceil(super::ANCHOR_INTERVAL as u64)
    }

    /// Width of one name-offset slot
    pub fn name_offset_width(&self) -> usize {
        bytes_required(self.names_size)
    }

    /// Width of one entry-info-offset slot
    pub fn entry_info_offset_width(&self) -> usize {
        bytes_required(self.entry_info_size)
    }

    /// Width of one id→position slot (positions are stored +1, 0 = absent)
    pub fn id_to_posn_width(&self) -> usize {
        bytes_required(self.size)
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        let fields = [
            self.size,
            self.max_entry_id,
            self.id_to_posn_pos,
            self.id_to_posn_size,
            self.name_offsets_pos,
            self.name_offsets_size,
            self.names_pos,
            self.names_size,
            self.entry_info_offsets_pos,
            self.entry_info_offsets_size,
            self.entry_info_pos,
            self.entry_info_size,
        ];
        for field in fields {
            out.extend_from_slice(&(field as i64).to_be_bytes());
        }
        out.extend_from_slice(&(self.postings.len() as i32).to_be_bytes());
        for (start, end) in &self.postings {
            out.extend_from_slice(&(*start as i64).to_be_bytes());
            out.extend_from_slice(&(*end as i64).to_be_bytes());
        }
        out.extend_from_slice(&self.magic.to_be_bytes());
    }

    /// Parse a header and reject it unless it carries [`MAGIC_GOOD`]
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(data);
        let mut fields = [0u64; FIXED_FIELDS];
        for field in fields.iter_mut() {
            let value = reader.read_i64_be()?;
            if value < 0 {
                return Err(StorageError::Corruption(format!("negative header field {}", value)));
            }
            *field = value as u64;
        }

        let channels = reader.read_i32_be()?;
        if channels < 0 || channels as usize > MAX_POSTINGS_CHANNELS {
            return Err(StorageError::Corruption(format!("invalid postings channel count {}", channels)));
        }
        let mut postings = Vec::with_capacity(channels as usize);
        for _ in 0..channels {
            let start = reader.read_i64_be()?;
            let end = reader.read_i64_be()?;
            if start < 0 || end < start {
                return Err(StorageError::Corruption(format!(
                    "invalid postings range {}..{}",
                    start, end
                )));
            }
            postings.push((start as u64, end as u64));
        }
        let magic = reader.read_i32_be()?;
        if magic != MAGIC_GOOD {
            return Err(StorageError::Corruption(format!(
                "bad dictionary magic {:#x} (interrupted write?)",
                magic
            )));
        }

        let header = Self {
            size: fields[0],
            max_entry_id: fields[1],
            id_to_posn_pos: fields[2],
            id_to_posn_size: fields[3],
            name_offsets_pos: fields[4],
            name_offsets_size: fields[5],
            names_pos: fields[6],
            names_size: fields[7],
            entry_info_offsets_pos: fields[8],
            entry_info_offsets_size: fields[9],
            entry_info_pos: fields[10],
            entry_info_size: fields[11],
            postings,
            magic,
        };
        if header.max_entry_id < header.size {
            return Err(StorageError::Corruption(format!(
                "maxEntryID {} < size {}",
                header.max_entry_id, header.size
            )));
        }
        Ok(header)
    }

    /// Check every stream lies inside a file of `file_len` bytes and that the
    /// offset tables have the expected number of slots.
    pub fn validate_ranges(&self, file_len: u64) -> Result<()> {
        let mut ranges = vec![
            ("names", self.names_pos, self.names_size),
            ("name offsets", self.name_offsets_pos, self.name_offsets_size),
            ("entry info", self.entry_info_pos, self.entry_info_size),
            ("entry info offsets", self.entry_info_offsets_pos, self.entry_info_offsets_size),
            ("id map", self.id_to_posn_pos, self.id_to_posn_size),
        ];
        for (start, end) in &self.postings {
            let size = end.checked_sub(*start).ok_or_else(|| {
                StorageError::Corruption(format!("invalid postings range {}..{}", start, end))
            })?;
            ranges.push(("postings", *start, size));
        }
        for (what, pos, size) in ranges {
            let end = pos.checked_add(size);
            if end.map_or(true, |end| end > file_len) {
                return Err(StorageError::Corruption(format!(
                    "{} stream {}+{} outside file of {} bytes",
                    what, pos, size, file_len
                )));
            }
        }

        let expect_name_offsets = table_len("name offsets", Some(self.anchor_count()), self.name_offset_width())?;
        if self.name_offsets_size != expect_name_offsets {
            return Err(StorageError::Corruption(format!(
                "name offsets hold {} bytes, expected {}",
                self.name_offsets_size, expect_name_offsets
            )));
        }
        let expect_info_offsets = table_len("entry info offsets", Some(self.size), self.entry_info_offset_width())?;
        if self.entry_info_offsets_size != expect_info_offsets {
            return Err(StorageError::Corruption(format!(
                "entry info offsets hold {} bytes, expected {}",
                self.entry_info_offsets_size, expect_info_offsets
            )));
        }
        if self.has_id_map() {
            let expect = table_len("id map", self.max_entry_id.checked_add(1), self.id_to_posn_width())?;
            if self.id_to_posn_size != expect {
                return Err(StorageError::Corruption(format!(
                    "id map holds {} bytes, expected {}",
                    self.id_to_posn_size, expect
                )));
            }
        }
        Ok(())
    }
}

/// Byte length of a fixed-width table, or `Corruption` when it cannot exist
fn table_len(what: &str, slots: Option<u64>, width: usize) -> Result<u64> {
    slots
        .and_then(|slots| slots.checked_mul(width as u64))
        .ok_or_else(|| StorageError::Corruption(format!("{} table size overflows", what)))
}
