//! Front-coded name codecs
//!
//! Every dictionary key type knows how to encode itself against the previous
//! key of the same run:
//!
//! ```text
//! String:        [shared_bytes: varint][rest_len: varint][rest: utf8]
//! Fixed-width:   [shared_bytes: u8 (0-8)][rest: 8 - shared_bytes bytes, big-endian]
//! ```
//!
//! With `prev = None` zero bytes are shared, so anchors are self-delimiting and
//! a run can always be decoded starting from its anchor.

use crate::encoding::{write_varint, ByteReader};
use crate::{Result, StorageError};
use std::cmp::Ordering;
use std::fmt::Debug;
use std::hash::{Hash, Hasher};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Key type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    String,
    Int64,
    Double,
    Date,
}

/// Per-type incremental (front-coded) key encoding
pub trait NameCodec: Ord + Clone + Debug + Hash + Send + Sync + 'static {
    const KIND: KeyKind;

    /// Encode `curr` against `prev`
    fn encode(prev: Option<&Self>, curr: &Self, out: &mut Vec<u8>);

    /// Decode the key following `prev` from `input`
    fn decode(prev: Option<&Self>, input: &mut ByteReader<'_>) -> Result<Self>;

    /// Prefix test. Degenerates to equality for fixed-width keys.
    fn starts_with(prefix: &Self, key: &Self) -> bool;
}

/// Byte length of the longest common *character* prefix of `a` and `b`
pub fn common_char_prefix_len(a: &str, b: &str) -> usize {
    let mut shared = 0;
    for ((i, ca), cb) in a.char_indices().zip(b.chars()) {
        if ca != cb {
            return i;
        }
        shared = i + ca.len_utf8();
    }
    shared
}

impl NameCodec for String {
    const KIND: KeyKind = KeyKind::String;

    fn encode(prev: Option<&Self>, curr: &Self, out: &mut Vec<u8>) {
        let shared = prev.map_or(0, |p| common_char_prefix_len(p, curr));
        let rest = &curr.as_bytes()[shared..];
        write_varint(out, shared as u64);
        write_varint(out, rest.len() as u64);
        out.extend_from_slice(rest);
    }

    fn decode(prev: Option<&Self>, input: &mut ByteReader<'_>) -> Result<Self> {
        let shared = input.read_varint()? as usize;
        let rest_len = input.read_varint()? as usize;
        let rest = input.read_bytes(rest_len)?;

        let mut name = String::with_capacity(shared + rest_len);
        if shared > 0 {
            let prev = prev.ok_or_else(|| {
                StorageError::Corruption(format!("delta with {} shared bytes but no previous name", shared))
            })?;
            if shared > prev.len() || !prev.is_char_boundary(shared) {
                return Err(StorageError::Corruption(format!(
                    "shared prefix {} does not fit previous name {:?}",
                    shared, prev
                )));
            }
            name.push_str(&prev[..shared]);
        }
        let rest = std::str::from_utf8(rest)
            .map_err(|e| StorageError::Corruption(format!("name is not utf-8: {}", e)))?;
        name.push_str(rest);
        Ok(name)
    }

    fn starts_with(prefix: &Self, key: &Self) -> bool {
        key.starts_with(prefix.as_str())
    }
}

fn encode_fixed(prev: Option<[u8; 8]>, curr: [u8; 8], out: &mut Vec<u8>) {
    // big-endian XOR 扫描：前导零字节数 = 共享字节数
    let shared = prev.map_or(0, |p| {
        let diff = u64::from_be_bytes(p) ^ u64::from_be_bytes(curr);
        (diff.leading_zeros() / 8) as usize
    });
    out.push(shared as u8);
    out.extend_from_slice(&curr[shared..]);
}

fn decode_fixed(prev: Option<[u8; 8]>, input: &mut ByteReader<'_>) -> Result<[u8; 8]> {
    let shared = input.read_u8()? as usize;
    if shared > 8 {
        return Err(StorageError::Corruption(format!("invalid shared byte count {}", shared)));
    }
    let mut bytes = [0u8; 8];
    if shared > 0 {
        let prev = prev.ok_or_else(|| {
            StorageError::Corruption(format!("delta with {} shared bytes but no previous key", shared))
        })?;
        bytes[..shared].copy_from_slice(&prev[..shared]);
    }
    bytes[shared..].copy_from_slice(input.read_bytes(8 - shared)?);
    Ok(bytes)
}

impl NameCodec for i64 {
    const KIND: KeyKind = KeyKind::Int64;

    fn encode(prev: Option<&Self>, curr: &Self, out: &mut Vec<u8>) {
        encode_fixed(prev.map(|p| p.to_be_bytes()), curr.to_be_bytes(), out);
    }

    fn decode(prev: Option<&Self>, input: &mut ByteReader<'_>) -> Result<Self> {
        decode_fixed(prev.map(|p| p.to_be_bytes()), input).map(i64::from_be_bytes)
    }

    fn starts_with(prefix: &Self, key: &Self) -> bool {
        prefix == key
    }
}

/// Double key with a total order (`f64::total_cmp`), stored as its IEEE bit pattern
#[derive(Debug, Clone, Copy)]
pub struct F64Key(pub f64);

impl PartialEq for F64Key {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0) == Ordering::Equal
    }
}

impl Eq for F64Key {}

impl PartialOrd for F64Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for F64Key {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl Hash for F64Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl From<f64> for F64Key {
    fn from(value: f64) -> Self {
        F64Key(value)
    }
}

impl NameCodec for F64Key {
    const KIND: KeyKind = KeyKind::Double;

    fn encode(prev: Option<&Self>, curr: &Self, out: &mut Vec<u8>) {
        encode_fixed(
            prev.map(|p| p.0.to_bits().to_be_bytes()),
            curr.0.to_bits().to_be_bytes(),
            out,
        );
    }

    fn decode(prev: Option<&Self>, input: &mut ByteReader<'_>) -> Result<Self> {
        let bytes = decode_fixed(prev.map(|p| p.0.to_bits().to_be_bytes()), input)?;
        Ok(F64Key(f64::from_bits(u64::from_be_bytes(bytes))))
    }

    fn starts_with(prefix: &Self, key: &Self) -> bool {
        prefix == key
    }
}

/// Date key stored as milliseconds since the Unix epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DateKey(pub i64);

impl DateKey {
    pub fn from_millis(millis: i64) -> Self {
        DateKey(millis)
    }

    pub fn millis(&self) -> i64 {
        self.0
    }

    pub fn to_system_time(&self) -> SystemTime {
        if self.0 >= 0 {
            UNIX_EPOCH + Duration::from_millis(self.0 as u64)
        } else {
            UNIX_EPOCH - Duration::from_millis(self.0.unsigned_abs())
        }
    }
}

impl From<SystemTime> for DateKey {
    fn from(time: SystemTime) -> Self {
        match time.duration_since(UNIX_EPOCH) {
            Ok(after) => DateKey(after.as_millis() as i64),
            Err(before) => DateKey(-(before.duration().as_millis() as i64)),
        }
    }
}

impl NameCodec for DateKey {
    const KIND: KeyKind = KeyKind::Date;

    fn encode(prev: Option<&Self>, curr: &Self, out: &mut Vec<u8>) {
        encode_fixed(prev.map(|p| p.0.to_be_bytes()), curr.0.to_be_bytes(), out);
    }

    fn decode(prev: Option<&Self>, input: &mut ByteReader<'_>) -> Result<Self> {
        decode_fixed(prev.map(|p| p.0.to_be_bytes()), input).map(|b| DateKey(i64::from_be_bytes(b)))
    }

    fn starts_with(prefix: &Self, key: &Self) -> bool {
        prefix == key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_chain<K: NameCodec>(keys: &[K]) -> Vec<K> {
        let mut buf = Vec::new();
        let mut prev: Option<&K> = None;
        for key in keys {
            K::encode(prev, key, &mut buf);
            prev = Some(key);
        }

        let mut reader = ByteReader::new(&buf);
        let mut decoded: Vec<K> = Vec::new();
        for _ in keys {
            let key = K::decode(decoded.last(), &mut reader).unwrap();
            decoded.push(key);
        }
        assert!(reader.is_empty());
        decoded
    }

    #[test]
    fn test_string_front_coding() {
        let mut buf = Vec::new();
        let prev = "apple".to_string();
        String::encode(Some(&prev), &"apply".to_string(), &mut buf);
        // shared=4, rest_len=1, "y"
        assert_eq!(buf, vec![4, 1, b'y']);

        let mut reader = ByteReader::new(&buf);
        assert_eq!(String::decode(Some(&prev), &mut reader).unwrap(), "apply");
    }

    #[test]
    fn test_string_shares_whole_characters() {
        // "é" and "è" share their first utf-8 byte but not the character
        assert_eq!(common_char_prefix_len("caté", "catè"), 3);
        assert_eq!(common_char_prefix_len("日本語", "日本人"), 6);
        assert_eq!(common_char_prefix_len("abc", "abcdef"), 3);
        assert_eq!(common_char_prefix_len("", "abc"), 0);

        let keys: Vec<String> = ["catè", "caté", "日本人", "日本語"].iter().map(|s| s.to_string()).collect();
        assert_eq!(decode_chain(&keys), keys);
    }

    #[test]
    fn test_anchor_is_self_delimiting() {
        let mut buf = Vec::new();
        String::encode(None, &"banana".to_string(), &mut buf);
        i64::encode(None, &42, &mut buf);

        let mut reader = ByteReader::new(&buf);
        assert_eq!(String::decode(None, &mut reader).unwrap(), "banana");
        assert_eq!(i64::decode(None, &mut reader).unwrap(), 42);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_fixed_width_shared_bytes() {
        let mut buf = Vec::new();
        i64::encode(Some(&0x0102_0304_0506_0700), &0x0102_0304_0506_07FF, &mut buf);
        assert_eq!(buf, vec![7, 0xFF]);

        buf.clear();
        i64::encode(Some(&5), &5, &mut buf);
        assert_eq!(buf, vec![8]);

        buf.clear();
        i64::encode(Some(&-1), &1, &mut buf);
        assert_eq!(buf.len(), 9);
    }

    #[test]
    fn test_numeric_chains() {
        let ints = vec![i64::MIN, -1_000_000, -1, 0, 1, 255, 256, 1 << 40, i64::MAX];
        assert_eq!(decode_chain(&ints), ints);

        let doubles: Vec<F64Key> = [-3.5, -0.0, 0.0, 1.0e-9, 2.5, 1.0e300]
            .iter()
            .map(|v| F64Key(*v))
            .collect();
        assert_eq!(decode_chain(&doubles), doubles);

        let dates = vec![DateKey(-86_400_000), DateKey(0), DateKey(1_700_000_000_000), DateKey(1_700_000_000_001)];
        assert_eq!(decode_chain(&dates), dates);
    }

    #[test]
    fn test_f64_total_order() {
        assert!(F64Key(-0.0) < F64Key(0.0));
        assert!(F64Key(-1.0) < F64Key(-0.5));
        assert!(F64Key(1.0) < F64Key(f64::INFINITY));
        assert_eq!(F64Key(f64::NAN), F64Key(f64::NAN));
    }

    #[test]
    fn test_date_system_time() {
        let key = DateKey::from_millis(1_234_567);
        assert_eq!(DateKey::from(key.to_system_time()), key);

        let before_epoch = DateKey::from_millis(-5_000);
        assert_eq!(DateKey::from(before_epoch.to_system_time()), before_epoch);
    }

    #[test]
    fn test_starts_with() {
        assert!(String::starts_with(&"ban".to_string(), &"banana".to_string()));
        assert!(!String::starts_with(&"band".to_string(), &"banana".to_string()));
        assert!(i64::starts_with(&7, &7));
        assert!(!i64::starts_with(&7, &70));
    }

    #[test]
    fn test_corrupt_delta_without_prev() {
        let mut buf = Vec::new();
        String::encode(Some(&"apple".to_string()), &"apply".to_string(), &mut buf);
        let mut reader = ByteReader::new(&buf);
        assert!(String::decode(None, &mut reader).is_err());
    }
}
