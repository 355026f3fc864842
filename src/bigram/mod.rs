//! Bigram dictionaries for wildcard, substring, stem and spelling lookups
//!
//! Every term of a string dictionary is decomposed into overlapping
//! two-character windows, with boundary markers on both ends:
//!
//! ```text
//! "band"  →  \u{2}b  ba  an  nd  d\u{3}
//! ```
//!
//! Each bigram maps to the set of term ids that contain it. Lookups only
//! generate candidates; callers re-validate every candidate against the real
//! pattern.

mod disk;
mod memory;

pub use disk::DiskBiGramDictionary;
pub use memory::MemoryBiGramDictionary;

/// Marks the start of a term
pub const BIGRAM_START: char = '\u{2}';

/// Marks the end of a term
pub const BIGRAM_END: char = '\u{3}';

/// Matches any run of characters (possibly empty)
pub const WILDCARD_ANY: char = '*';

/// Matches exactly one character
pub const WILDCARD_ONE: char = '?';

pub fn is_wildcard(c: char) -> bool {
    c == WILDCARD_ANY || c == WILDCARD_ONE
}

/// All bigrams of `term` including both boundary bigrams, in order
pub fn term_bigrams(term: &str) -> Vec<String> {
    let chars: Vec<char> = std::iter::once(BIGRAM_START)
        .chain(term.chars())
        .chain(std::iter::once(BIGRAM_END))
        .collect();
    chars.windows(2).map(|w| w.iter().collect()).collect()
}

/// Literal fragments a pattern query needs
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct PatternGrams {
    /// Two-character windows inside literal segments
    pub bigrams: Vec<String>,
    /// Literal segments of a single character (no window possible)
    pub singles: Vec<char>,
}

/// Split `pattern` on wildcards and collect the bigrams its literal parts imply
pub(crate) fn pattern_grams(pattern: &str, anchored_start: bool, anchored_end: bool) -> PatternGrams {
    let mut marked = String::with_capacity(pattern.len() + 2);
    if anchored_start {
        marked.push(BIGRAM_START);
    }
    marked.push_str(pattern);
    if anchored_end {
        marked.push(BIGRAM_END);
    }

    let mut grams = PatternGrams::default();
    for segment in marked.split(is_wildcard).filter(|s| !s.is_empty()) {
        let chars: Vec<char> = segment.chars().collect();
        if chars.len() == 1 {
            if chars[0] != BIGRAM_START && chars[0] != BIGRAM_END && !grams.singles.contains(&chars[0]) {
                grams.singles.push(chars[0]);
            }
            continue;
        }
        for window in chars.windows(2) {
            let gram: String = window.iter().collect();
            if !grams.bigrams.contains(&gram) {
                grams.bigrams.push(gram);
            }
        }
    }
    grams
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_term_bigrams() {
        assert_eq!(term_bigrams("band"), vec!["\u{2}b", "ba", "an", "nd", "d\u{3}"]);
        assert_eq!(term_bigrams("x"), vec!["\u{2}x", "x\u{3}"]);
        assert_eq!(term_bigrams("é"), vec!["\u{2}é", "é\u{3}"]);
    }

    #[test]
    fn test_pattern_grams() {
        let grams = pattern_grams("ba*d", true, true);
        assert_eq!(grams.bigrams, vec!["\u{2}b", "ba", "d\u{3}"]);
        assert!(grams.singles.is_empty());

        let grams = pattern_grams("*n*", false, false);
        assert!(grams.bigrams.is_empty());
        assert_eq!(grams.singles, vec!['n']);

        let grams = pattern_grams("a?c", false, false);
        assert_eq!(grams.singles, vec!['a', 'c']);

        assert_eq!(pattern_grams("*", false, false), PatternGrams::default());
    }
}
