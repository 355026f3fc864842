//! On-disk bigram dictionary: candidate generation for pattern lookups

use super::{pattern_grams, term_bigrams};
use crate::config::DictConfig;
use crate::dictionary::{DiskDictionary, IdPostings};
use crate::Result;
use ahash::AHashMap;
use roaring::RoaringBitmap;
use std::ops::Bound;
use std::path::Path;

/// Read-only bigram → term ids dictionary
#[derive(Debug)]
pub struct DiskBiGramDictionary {
    grams: DiskDictionary<String, IdPostings>,
}

impl DiskBiGramDictionary {
    pub fn open(path: impl AsRef<Path>, config: &DictConfig) -> Result<Self> {
        Ok(Self::from_dictionary(DiskDictionary::open(path, config)?))
    }

    pub fn open_at(path: impl AsRef<Path>, offset: u64, config: &DictConfig) -> Result<Self> {
        Ok(Self::from_dictionary(DiskDictionary::open_at(path, offset, config)?))
    }

    pub fn from_dictionary(grams: DiskDictionary<String, IdPostings>) -> Self {
        Self { grams }
    }

    pub fn dictionary(&self) -> &DiskDictionary<String, IdPostings> {
        &self.grams
    }

    /// Distinct bigrams
    pub fn len(&self) -> u64 {
        self.grams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grams.is_empty()
    }

    /// Term ids containing `gram`, `None` when the bigram is unknown
    pub fn lookup(&self, gram: &str) -> Result<Option<RoaringBitmap>> {
        Ok(self
            .grams
            .postings(&gram.to_string())?
            .map(IdPostings::into_docs))
    }

    /// Union of every bigram starting with `c`
    fn starting_with(&self, c: char) -> Result<RoaringBitmap> {
        let prefix = c.to_string();
        let mut ids = RoaringBitmap::new();
        for entry in self.grams.range(Bound::Included(&prefix), Bound::Unbounded)? {
            let entry = entry?;
            if !entry.name.starts_with(c) {
                break;
            }
            ids |= self.grams.read_postings(&entry)?.docs();
        }
        Ok(ids)
    }

    /// Ids of every indexed term
    pub fn all_terms(&self) -> Result<RoaringBitmap> {
        self.starting_with(super::BIGRAM_START)
    }

    /// Candidate term ids for a wildcard pattern.
    ///
    /// `None` means provably no term matches. The result is a superset of the
    /// real matches.
    pub fn matching(&self, pattern: &str, anchored_start: bool, anchored_end: bool) -> Result<Option<RoaringBitmap>> {
        let grams = pattern_grams(pattern, anchored_start, anchored_end);
        if grams.bigrams.is_empty() && grams.singles.is_empty() {
            let all = self.all_terms()?;
            return Ok(Some(all).filter(|ids| !ids.is_empty()));
        }

        let mut sets = Vec::with_capacity(grams.bigrams.len() + grams.singles.len());
        for gram in &grams.bigrams {
            match self.lookup(gram)? {
                Some(ids) => sets.push(ids),
                None => return Ok(None),
            }
        }
        // 单字符退化：扫描以该字符开头的所有 bigram
        for &c in &grams.singles {
            let ids = self.starting_with(c)?;
            if ids.is_empty() {
                return Ok(None);
            }
            sets.push(ids);
        }

        // smallest first
        sets.sort_by_key(|ids| ids.len());
        let mut iter = sets.into_iter();
        let Some(mut result) = iter.next() else {
            return Ok(None);
        };
        for ids in iter {
            if result.is_empty() {
                break;
            }
            result &= ids;
        }
        Ok(Some(result).filter(|ids| !ids.is_empty()))
    }

    /// Terms sharing bigrams with `term`, scored by the number of shared bigrams.
    ///
    /// Sorted by score (descending) then id. Returns `None` when a bigram of
    /// `term` is unknown and `allow_partial` is false.
    pub fn all_variants(&self, term: &str, allow_partial: bool) -> Result<Option<Vec<(u64, u32)>>> {
        let mut grams = term_bigrams(term);
        grams.sort();
        grams.dedup();

        let mut scores: AHashMap<u32, u32> = AHashMap::new();
        for gram in &grams {
            match self.lookup(gram)? {
                Some(ids) => {
                    for id in ids.iter() {
                        *scores.entry(id).or_insert(0) += 1;
                    }
                }
                None if allow_partial => {}
                None => return Ok(None),
            }
        }

        let mut variants: Vec<(u64, u32)> = scores.into_iter().map(|(id, score)| (id as u64, score)).collect();
        variants.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        Ok(Some(variants))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bigram::MemoryBiGramDictionary;
    use crate::dictionary::{DictionaryWriter, Entry};
    use tempfile::TempDir;

    const TERMS: [&str; 6] = ["banana", "band", "bandana", "cabana", "nab", "zebra"];

    fn build(dir: &TempDir) -> DiskBiGramDictionary {
        let config = DictConfig::for_testing();
        let terms_path = dir.path().join("terms.dict");
        let mut writer = DictionaryWriter::new(&config, false).unwrap();
        for (i, term) in TERMS.iter().enumerate() {
            let mut entry = Entry::with_postings(term.to_string(), i as u64 + 1, IdPostings::from_docs([0]));
            writer.write(&mut entry).unwrap();
        }
        writer.finish_to_path(&terms_path).unwrap();
        let terms: DiskDictionary<String, IdPostings> = DiskDictionary::open(&terms_path, &config).unwrap();

        let grams_path = dir.path().join("terms.bigrams");
        let mut memory = MemoryBiGramDictionary::build_from(&terms, &config).unwrap();
        memory.dump_to_path(&grams_path).unwrap();
        DiskBiGramDictionary::open(&grams_path, &config).unwrap()
    }

    fn ids(set: Option<RoaringBitmap>) -> Vec<u32> {
        set.map(|s| s.iter().collect()).unwrap_or_default()
    }

    #[test]
    fn test_substring_candidates_are_superset() {
        let dir = TempDir::new().unwrap();
        let bigrams = build(&dir);

        for needle in ["ana", "ban", "nd", "a", "ra", "b"] {
            let candidates = ids(bigrams.matching(needle, false, false).unwrap());
            for (i, term) in TERMS.iter().enumerate() {
                if term.contains(needle) {
                    assert!(candidates.contains(&(i as u32 + 1)), "{} missing for {}", term, needle);
                }
            }
        }
    }

    #[test]
    fn test_anchored_matching() {
        let dir = TempDir::new().unwrap();
        let bigrams = build(&dir);

        // prefix "ba": banana, band, bandana
        assert_eq!(ids(bigrams.matching("ba", true, false).unwrap()), vec![1, 2, 3]);
        // suffix "ana": banana, bandana, cabana
        assert_eq!(ids(bigrams.matching("ana", false, true).unwrap()), vec![1, 3, 4]);
        // whole word
        assert_eq!(ids(bigrams.matching("nab", true, true).unwrap()), vec![5]);
    }

    #[test]
    fn test_miss_is_none() {
        let dir = TempDir::new().unwrap();
        let bigrams = build(&dir);
        assert!(bigrams.matching("qq", false, false).unwrap().is_none());
        assert!(bigrams.matching("*x*", false, false).unwrap().is_none());
        assert!(bigrams.matching("zb", false, false).unwrap().is_none());
    }

    #[test]
    fn test_wildcard_only_returns_every_term() {
        let dir = TempDir::new().unwrap();
        let bigrams = build(&dir);
        assert_eq!(ids(bigrams.matching("*", false, false).unwrap()), vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_all_variants() {
        let dir = TempDir::new().unwrap();
        let bigrams = build(&dir);

        let variants = bigrams.all_variants("bend", true).unwrap().unwrap();
        // "band" shares ^b, nd, d$
        assert_eq!(variants[0], (2, 3));

        assert!(bigrams.all_variants("bend", false).unwrap().is_none());
        assert!(!bigrams.all_variants("band", false).unwrap().unwrap().is_empty());
    }
}
