//! Dictionary entries

use super::name_codec::NameCodec;
use super::postings::{EntryInfo, Postings, TermStats};

/// The unit stored in a dictionary: (name, id, postings)
#[derive(Debug, Clone)]
pub struct Entry<K: NameCodec, P: Postings> {
    name: K,
    id: u64,
    pub postings: P,
}

impl<K: NameCodec, P: Postings> Entry<K, P> {
    pub fn new(name: K, id: u64) -> Self {
        Self {
            name,
            id,
            postings: P::default(),
        }
    }

    pub fn with_postings(name: K, id: u64, postings: P) -> Self {
        Self { name, id, postings }
    }

    pub fn name(&self) -> &K {
        &self.name
    }

    pub fn set_name(&mut self, name: K) {
        self.name = name;
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn set_id(&mut self, id: u64) {
        self.id = id;
    }

    pub fn postings(&self) -> &P {
        &self.postings
    }

    pub fn postings_mut(&mut self) -> &mut P {
        &mut self.postings
    }

    pub fn term_stats(&self) -> TermStats {
        TermStats {
            doc_freq: self.postings.doc_count(),
            total_freq: self.postings.total_freq(),
        }
    }
}

/// An entry read back from a [`DiskDictionary`](super::DiskDictionary)
#[derive(Debug, Clone, PartialEq)]
pub struct DiskEntry<K> {
    pub name: K,
    pub id: u64,
    /// Sorted position inside the dictionary
    pub position: u64,
    pub info: EntryInfo,
}

impl<K> DiskEntry<K> {
    pub fn term_stats(&self) -> TermStats {
        TermStats::from(&self.info)
    }
}
