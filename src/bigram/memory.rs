//! Bigram dictionary under construction

use super::term_bigrams;
use crate::config::DictConfig;
use crate::dictionary::{DictionaryWriter, DiskDictionary, IdMapKind, IdPostings, MemoryDictionary, Postings};
use crate::{Result, StorageError};
use std::fs::OpenOptions;
use std::io::{Seek, Write};
use std::path::Path;

/// bigram → ids of the terms containing it
pub struct MemoryBiGramDictionary {
    grams: MemoryDictionary<String, IdPostings>,
    config: DictConfig,
    terms: u64,
}

impl MemoryBiGramDictionary {
    pub fn new(config: &DictConfig) -> Self {
        Self {
            grams: MemoryDictionary::with_config(config),
            config: config.clone(),
            terms: 0,
        }
    }

    /// Index every term of a string dictionary under its entry id
    pub fn build_from<P: Postings>(source: &DiskDictionary<String, P>, config: &DictConfig) -> Result<Self> {
        let mut bigrams = Self::new(config);
        for entry in source.iter()? {
            let entry = entry?;
            bigrams.add_term(&entry.name, entry.id)?;
        }
        log::debug!(
            "built bigram dictionary: {} terms, {} bigrams",
            bigrams.terms,
            bigrams.grams.len()
        );
        Ok(bigrams)
    }

    /// Record every bigram of `term` for term id `id`
    pub fn add_term(&mut self, term: &str, id: u64) -> Result<()> {
        let id = u32::try_from(id).map_err(|_| StorageError::Overflow {
            name: term.to_string(),
            detail: format!("term id {} exceeds the u32 bigram postings space", id),
        })?;
        for gram in term_bigrams(term) {
            self.grams.add(gram, id);
        }
        self.terms += 1;
        Ok(())
    }

    /// Terms added so far
    pub fn term_count(&self) -> u64 {
        self.terms
    }

    /// Distinct bigrams
    pub fn len(&self) -> usize {
        self.grams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grams.is_empty()
    }

    /// Term ids recorded under `gram`
    pub fn term_ids(&self, gram: &str) -> Option<Vec<u32>> {
        self.grams
            .get(&gram.to_string())
            .map(|e| e.postings.docs().iter().collect())
    }

    /// Write the bigrams (renumbered, no id map) at the current position of `out`
    pub fn dump<W: Write + Seek>(&mut self, out: &mut W) -> Result<()> {
        let writer = DictionaryWriter::new(&self.config, false)?;
        self.grams.dump(writer, true, IdMapKind::None, out)?;
        Ok(())
    }

    pub fn dump_to_path(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path.as_ref())?;
        self.dump(&mut file)?;
        if self.config.sync_on_finish {
            file.sync_data()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_terms() {
        let mut bigrams = MemoryBiGramDictionary::new(&DictConfig::for_testing());
        bigrams.add_term("band", 1).unwrap();
        bigrams.add_term("banana", 2).unwrap();

        assert_eq!(bigrams.term_count(), 2);
        assert_eq!(bigrams.term_ids("ba"), Some(vec![1, 2]));
        assert_eq!(bigrams.term_ids("na"), Some(vec![2]));
        assert_eq!(bigrams.term_ids("\u{2}b"), Some(vec![1, 2]));
        assert_eq!(bigrams.term_ids("zz"), None);
    }

    #[test]
    fn test_term_id_overflow() {
        let mut bigrams = MemoryBiGramDictionary::new(&DictConfig::for_testing());
        let err = bigrams.add_term("big", u32::MAX as u64 + 1).unwrap_err();
        assert!(matches!(err, StorageError::Overflow { .. }));
    }
}
