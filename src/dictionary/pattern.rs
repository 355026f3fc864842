//! Pattern lookups over string dictionaries
//!
//! Candidate generation is delegated to a paired [`DiskBiGramDictionary`];
//! every candidate is then re-checked against the real pattern (wildcard match,
//! prefix test or edit distance). Time budget and result cap are enforced in
//! that validation loop only.
//!
//! ## Result states
//! - `NoMatches`: provably empty
//! - `Found(..)`: validated entries
//! - `Inconclusive`: time budget ran out; try a broader or exhaustive path

use super::disk::DiskDictionary;
use super::entry::DiskEntry;
use super::postings::Postings;
use crate::bigram::{is_wildcard, term_bigrams, DiskBiGramDictionary, WILDCARD_ANY, WILDCARD_ONE};
use crate::Result;
use std::cmp::{min, Reverse};
use std::time::{Duration, Instant};

/// Outcome of a pattern lookup
#[derive(Debug, Clone, PartialEq)]
pub enum MatchResult<K> {
    NoMatches,
    Found(Vec<DiskEntry<K>>),
    Inconclusive,
}

impl<K> MatchResult<K> {
    fn from_entries(entries: Vec<DiskEntry<K>>) -> Self {
        if entries.is_empty() {
            MatchResult::NoMatches
        } else {
            MatchResult::Found(entries)
        }
    }

    pub fn is_inconclusive(&self) -> bool {
        matches!(self, MatchResult::Inconclusive)
    }

    pub fn entries(&self) -> &[DiskEntry<K>] {
        match self {
            MatchResult::Found(entries) => entries,
            _ => &[],
        }
    }

    pub fn into_entries(self) -> Vec<DiskEntry<K>> {
        match self {
            MatchResult::Found(entries) => entries,
            _ => Vec::new(),
        }
    }
}

/// Cooperative limits for pattern lookups
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchLimits {
    pub time_budget: Option<Duration>,
    pub max_results: Option<usize>,
}

impl SearchLimits {
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn with_time_budget(mut self, budget: Duration) -> Self {
        self.time_budget = Some(budget);
        self
    }

    pub fn with_max_results(mut self, max: usize) -> Self {
        self.max_results = Some(max);
        self
    }

    fn deadline(&self) -> Option<Instant> {
        self.time_budget.map(|budget| Instant::now() + budget)
    }

    fn is_full(&self, found: usize) -> bool {
        self.max_results.is_some_and(|max| found >= max)
    }
}

fn expired(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|d| Instant::now() >= d)
}

/// `*` matches any run (possibly empty), `?` exactly one character
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    // 最近一个 '*' 的位置及其匹配起点，用于回溯
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == WILDCARD_ONE || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == WILDCARD_ANY {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((star_pi, star_ti)) = star {
            pi = star_pi + 1;
            ti = star_ti + 1;
            star = Some((star_pi, star_ti + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|&c| c == WILDCARD_ANY)
}

/// Edit distance (insert, delete, substitute) over characters
pub fn levenshtein_distance(s1: &str, s2: &str) -> u32 {
    let chars1: Vec<char> = s1.chars().collect();
    let chars2: Vec<char> = s2.chars().collect();
    if chars1.is_empty() {
        return chars2.len() as u32;
    }
    if chars2.is_empty() {
        return chars1.len() as u32;
    }

    // rolling rows
    let mut prev_row: Vec<u32> = (0..=chars2.len() as u32).collect();
    let mut curr_row: Vec<u32> = vec![0; chars2.len() + 1];
    for (i, c1) in chars1.iter().enumerate() {
        curr_row[0] = i as u32 + 1;
        for (j, c2) in chars2.iter().enumerate() {
            let cost = u32::from(c1 != c2);
            curr_row[j + 1] = min(min(prev_row[j + 1] + 1, curr_row[j] + 1), prev_row[j] + cost);
        }
        std::mem::swap(&mut prev_row, &mut curr_row);
    }
    prev_row[chars2.len()]
}

impl<P: Postings> DiskDictionary<String, P> {
    fn validate_candidates(
        &self,
        candidates: impl Iterator<Item = u64>,
        limits: &SearchLimits,
        what: &str,
        mut accept: impl FnMut(&str) -> bool,
    ) -> Result<MatchResult<String>> {
        let deadline = limits.deadline();
        let mut found = Vec::new();
        for id in candidates {
            if expired(deadline) {
                log::warn!(
                    "pattern lookup {:?} timed out after {:?} ({} matches so far)",
                    what,
                    limits.time_budget,
                    found.len()
                );
                return Ok(MatchResult::Inconclusive);
            }
            if let Some(entry) = self.get_by_id(id)? {
                if accept(&entry.name) {
                    found.push(entry);
                    if limits.is_full(found.len()) {
                        break;
                    }
                }
            }
        }
        found.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(MatchResult::from_entries(found))
    }

    /// Entries whose names match a wildcard pattern
    pub fn get_matching(
        &self,
        bigrams: &DiskBiGramDictionary,
        pattern: &str,
        limits: &SearchLimits,
    ) -> Result<MatchResult<String>> {
        if !pattern.chars().any(is_wildcard) {
            return Ok(match self.get(&pattern.to_string())? {
                Some(entry) => MatchResult::Found(vec![entry]),
                None => MatchResult::NoMatches,
            });
        }
        let anchored_start = !pattern.starts_with(is_wildcard);
        let anchored_end = !pattern.ends_with(is_wildcard);
        let Some(candidates) = bigrams.matching(pattern, anchored_start, anchored_end)? else {
            return Ok(MatchResult::NoMatches);
        };
        self.validate_candidates(candidates.iter().map(u64::from), limits, pattern, |name| {
            wildcard_match(pattern, name)
        })
    }

    /// Entries containing `substring` anywhere in their name
    pub fn get_substring(
        &self,
        bigrams: &DiskBiGramDictionary,
        substring: &str,
        limits: &SearchLimits,
    ) -> Result<MatchResult<String>> {
        let pattern = format!("{}{}{}", WILDCARD_ANY, substring, WILDCARD_ANY);
        self.get_matching(bigrams, &pattern, limits)
    }

    /// Entries whose names start with `stem`
    pub fn get_stem_matches(
        &self,
        bigrams: &DiskBiGramDictionary,
        stem: &str,
        limits: &SearchLimits,
    ) -> Result<MatchResult<String>> {
        let Some(candidates) = bigrams.matching(stem, true, false)? else {
            return Ok(MatchResult::NoMatches);
        };
        self.validate_candidates(candidates.iter().map(u64::from), limits, stem, |name| {
            name.starts_with(stem)
        })
    }

    /// Entries within `max_distance` edits of `term`, closest first
    /// (ties broken by shared-bigram score, then name).
    pub fn get_spelling_variants(
        &self,
        bigrams: &DiskBiGramDictionary,
        term: &str,
        max_distance: u32,
        limits: &SearchLimits,
    ) -> Result<MatchResult<String>> {
        let Some(variants) = bigrams.all_variants(term, true)? else {
            return Ok(MatchResult::NoMatches);
        };

        // each edit destroys at most two bigrams
        let mut grams = term_bigrams(term);
        grams.sort();
        grams.dedup();
        let min_shared = grams.len().saturating_sub(2 * max_distance as usize) as u32;
        let term_len = term.chars().count();

        let deadline = limits.deadline();
        let mut hits = Vec::new();
        for (id, score) in variants {
            if score < min_shared {
                break; // sorted by score
            }
            if expired(deadline) {
                log::warn!(
                    "spelling lookup {:?} timed out after {:?} ({} matches so far)",
                    term,
                    limits.time_budget,
                    hits.len()
                );
                return Ok(MatchResult::Inconclusive);
            }
            let Some(entry) = self.get_by_id(id)? else {
                continue;
            };
            if entry.name.chars().count().abs_diff(term_len) > max_distance as usize {
                continue;
            }
            let distance = levenshtein_distance(term, &entry.name);
            if distance <= max_distance {
                hits.push((distance, score, entry));
            }
        }

        hits.sort_by(|a, b| {
            (a.0, Reverse(a.1))
                .cmp(&(b.0, Reverse(b.1)))
                .then_with(|| a.2.name.cmp(&b.2.name))
        });
        if let Some(max) = limits.max_results {
            hits.truncate(max);
        }
        Ok(MatchResult::from_entries(hits.into_iter().map(|(_, _, e)| e).collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bigram::MemoryBiGramDictionary;
    use crate::config::DictConfig;
    use crate::dictionary::{DictionaryWriter, Entry, IdPostings};
    use tempfile::TempDir;

    const TERMS: [&str; 8] = ["apple", "apply", "banana", "band", "bandana", "bend", "bond", "cabana"];

    fn build(dir: &TempDir) -> (DiskDictionary<String, IdPostings>, DiskBiGramDictionary) {
        let config = DictConfig::for_testing();
        let path = dir.path().join("terms.dict");
        let mut writer = DictionaryWriter::new(&config, false).unwrap();
        for (i, term) in TERMS.iter().enumerate() {
            let mut entry = Entry::with_postings(term.to_string(), i as u64 + 1, IdPostings::from_docs([i as u32]));
            writer.write(&mut entry).unwrap();
        }
        writer.finish_to_path(&path).unwrap();
        let terms = DiskDictionary::open(&path, &config).unwrap();

        let gram_path = dir.path().join("terms.bigrams");
        MemoryBiGramDictionary::build_from(&terms, &config)
            .unwrap()
            .dump_to_path(&gram_path)
            .unwrap();
        let grams = DiskBiGramDictionary::open(&gram_path, &config).unwrap();
        (terms, grams)
    }

    fn names(result: MatchResult<String>) -> Vec<String> {
        result.into_entries().into_iter().map(|e| e.name).collect()
    }

    #[test]
    fn test_wildcard_match() {
        assert!(wildcard_match("b*d", "band"));
        assert!(wildcard_match("b*d", "bd"));
        assert!(wildcard_match("b?nd", "bend"));
        assert!(!wildcard_match("b?nd", "bnd"));
        assert!(wildcard_match("*ana", "bandana"));
        assert!(wildcard_match("*an*an*", "banana"));
        assert!(!wildcard_match("*ana", "band"));
        assert!(wildcard_match("*", ""));
        assert!(!wildcard_match("a", "ab"));
    }

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein_distance("band", "bend"), 1);
        assert_eq!(levenshtein_distance("band", "bandana"), 3);
        assert_eq!(levenshtein_distance("", "abc"), 3);
        assert_eq!(levenshtein_distance("kitten", "sitting"), 3);
    }

    #[test]
    fn test_get_matching() {
        let dir = TempDir::new().unwrap();
        let (terms, grams) = build(&dir);
        let limits = SearchLimits::unlimited();

        assert_eq!(names(terms.get_matching(&grams, "b?nd", &limits).unwrap()), vec!["band", "bend", "bond"]);
        assert_eq!(names(terms.get_matching(&grams, "*ana", &limits).unwrap()), vec!["banana", "bandana", "cabana"]);
        assert_eq!(names(terms.get_matching(&grams, "appl?", &limits).unwrap()), vec!["apple", "apply"]);
        assert_eq!(names(terms.get_matching(&grams, "band", &limits).unwrap()), vec!["band"]);
        assert_eq!(terms.get_matching(&grams, "x*", &limits).unwrap(), MatchResult::NoMatches);
        // bigrams present but no real match
        assert_eq!(terms.get_matching(&grams, "ban*nd", &limits).unwrap(), MatchResult::NoMatches);
    }

    #[test]
    fn test_substring_and_stem() {
        let dir = TempDir::new().unwrap();
        let (terms, grams) = build(&dir);
        let limits = SearchLimits::unlimited();

        assert_eq!(
            names(terms.get_substring(&grams, "ana", &limits).unwrap()),
            vec!["banana", "bandana", "cabana"]
        );
        assert_eq!(names(terms.get_substring(&grams, "n", &limits).unwrap()).len(), 6);
        assert_eq!(names(terms.get_stem_matches(&grams, "ban", &limits).unwrap()), vec!["banana", "band", "bandana"]);
        assert_eq!(terms.get_stem_matches(&grams, "zz", &limits).unwrap(), MatchResult::NoMatches);
    }

    #[test]
    fn test_spelling_variants() {
        let dir = TempDir::new().unwrap();
        let (terms, grams) = build(&dir);
        let limits = SearchLimits::unlimited();

        let found = names(terms.get_spelling_variants(&grams, "bind", 1, &limits).unwrap());
        assert_eq!(found, vec!["band", "bend", "bond"]);

        let found = names(terms.get_spelling_variants(&grams, "band", 1, &limits).unwrap());
        assert_eq!(found[0], "band");

        let capped = terms
            .get_spelling_variants(&grams, "bind", 1, &SearchLimits::unlimited().with_max_results(2))
            .unwrap();
        assert_eq!(capped.entries().len(), 2);
    }

    #[test]
    fn test_time_budget_is_inconclusive() {
        let dir = TempDir::new().unwrap();
        let (terms, grams) = build(&dir);
        let limits = SearchLimits::unlimited().with_time_budget(Duration::ZERO);

        let result = terms.get_matching(&grams, "*an*", &limits).unwrap();
        assert!(result.is_inconclusive());
        assert!(result.entries().is_empty());
        assert_ne!(result, MatchResult::NoMatches);
    }

    #[test]
    fn test_max_results() {
        let dir = TempDir::new().unwrap();
        let (terms, grams) = build(&dir);
        let limits = SearchLimits::unlimited().with_max_results(1);
        assert_eq!(terms.get_matching(&grams, "b*", &limits).unwrap().entries().len(), 1);
    }
}
