//! Lexicon (C1): the static word set, per-word frequency, and the
//! precomputed prime-signature anagram index.

use std::path::Path;

use ahash::AHashMap;
use serde::Deserialize;
use unicode_normalization::UnicodeNormalization;

use crate::error::{Error, Result};

/// Prime assigned to each of the 26 lowercase letters, fixed to the
/// scheme used by the original package-file generator so that
/// `anagrams.json`'s signature keys remain valid against this table.
pub const LETTER_PRIMES: [u64; 26] = [
    2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47, 53, 59, 61, 67, 71, 73, 79, 83, 89,
    97, 101,
];

/// Product of the letter primes for every character in `word`.
/// Words containing non `a..=z` bytes are rejected by the caller before
/// this is invoked; any non-letter byte is simply skipped here.
pub fn prime_signature(word: &str) -> u64 {
    let mut sig: u64 = 1;
    for b in word.bytes() {
        if b.is_ascii_lowercase() {
            sig = sig.wrapping_mul(LETTER_PRIMES[(b - b'a') as usize]);
        }
    }
    sig
}

#[derive(Deserialize)]
#[serde(transparent)]
struct FrequencyMap(AHashMap<String, f64>);

#[derive(Deserialize)]
#[serde(transparent)]
struct AnagramMap(AHashMap<String, Vec<String>>);

/// The static word set plus frequencies and the anagram-signature index.
/// Immutable once loaded.
pub struct Lexicon {
    words: AHashMap<String, f64>,
    /// signature (as decimal string, matching the package file key format)
    /// -> words sharing that signature.
    anagram_groups: AHashMap<String, Vec<String>>,
    min_len: usize,
    max_len: usize,
}

impl Lexicon {
    /// Load the three package files. Fails with `ResourceMissing` if any
    /// is absent.
    pub fn load(
        words_path: impl AsRef<Path>,
        frequencies_path: impl AsRef<Path>,
        anagrams_path: impl AsRef<Path>,
        min_len: usize,
        max_len: usize,
    ) -> Result<Self> {
        let words_path = words_path.as_ref();
        let frequencies_path = frequencies_path.as_ref();
        let anagrams_path = anagrams_path.as_ref();

        let words_text = std::fs::read_to_string(words_path)
            .map_err(|_| Error::ResourceMissing(words_path.to_path_buf()))?;
        let freq_text = std::fs::read_to_string(frequencies_path)
            .map_err(|_| Error::ResourceMissing(frequencies_path.to_path_buf()))?;
        let ana_text = std::fs::read_to_string(anagrams_path)
            .map_err(|_| Error::ResourceMissing(anagrams_path.to_path_buf()))?;

        let frequencies: FrequencyMap = serde_json::from_str(&freq_text)
            .map_err(|e| Error::Serialization(format!("frequencies.json: {e}")))?;
        let anagram_groups: AnagramMap = serde_json::from_str(&ana_text)
            .map_err(|e| Error::Serialization(format!("anagrams.json: {e}")))?;

        let mut words = AHashMap::default();
        for line in words_text.lines() {
            let normalized: String = line.trim().nfc().collect();
            if normalized.is_empty() {
                continue;
            }
            if !is_valid_word(&normalized, min_len, max_len) {
                continue;
            }
            let freq = frequencies.0.get(&normalized).copied().unwrap_or(0.0);
            words.insert(normalized, freq);
        }

        tracing::info!(
            word_count = words.len(),
            anagram_groups = anagram_groups.0.len(),
            "lexicon loaded"
        );

        Ok(Lexicon {
            words,
            anagram_groups: anagram_groups.0,
            min_len,
            max_len,
        })
    }

    /// Build a lexicon directly from in-memory data, useful for tests and
    /// for callers that assemble the package files themselves.
    pub fn from_parts(
        words: AHashMap<String, f64>,
        anagram_groups: AHashMap<String, Vec<String>>,
        min_len: usize,
        max_len: usize,
    ) -> Self {
        Lexicon {
            words,
            anagram_groups,
            min_len,
            max_len,
        }
    }

    pub fn contains(&self, w: &str) -> bool {
        self.words.contains_key(w)
    }

    pub fn frequency(&self, w: &str) -> f64 {
        self.words.get(w).copied().unwrap_or(0.0)
    }

    pub fn min_len(&self) -> usize {
        self.min_len
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn iter_words(&self) -> impl Iterator<Item = &str> {
        self.words.keys().map(|s| s.as_str())
    }

    /// Words sharing `w`'s prime signature, per the anagram index built
    /// offline, with `w` itself removed. Empty if `w`'s signature has no
    /// group (singleton groups are omitted from the package file).
    pub fn anagram_group(&self, w: &str) -> Vec<String> {
        let sig = prime_signature(w).to_string();
        match self.anagram_groups.get(&sig) {
            Some(group) => group
                .iter()
                .filter(|cand| cand.as_str() != w)
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }
}

/// `^[a-z]{min,max}$`
pub fn is_valid_word(w: &str, min_len: usize, max_len: usize) -> bool {
    let len = w.len();
    if len < min_len || len > max_len {
        return false;
    }
    w.bytes().all(|b| b.is_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prime_signature_is_order_independent() {
        assert_eq!(prime_signature("cat"), prime_signature("act"));
        assert_eq!(prime_signature("cat"), prime_signature("tac"));
    }

    #[test]
    fn prime_signature_distinguishes_different_multisets() {
        assert_ne!(prime_signature("cat"), prime_signature("cot"));
    }

    #[test]
    fn anagram_group_excludes_self() {
        let mut words = AHashMap::default();
        words.insert("cat".to_string(), 0.5);
        words.insert("act".to_string(), 0.3);
        let mut groups = AHashMap::default();
        groups.insert(
            prime_signature("cat").to_string(),
            vec!["cat".to_string(), "act".to_string()],
        );
        let lex = Lexicon::from_parts(words, groups, 3, 8);
        assert_eq!(lex.anagram_group("cat"), vec!["act".to_string()]);
    }

    #[test]
    fn valid_word_regex_bounds() {
        assert!(is_valid_word("cat", 3, 8));
        assert!(!is_valid_word("ca", 3, 8));
        assert!(!is_valid_word("Cat", 3, 8));
        assert!(!is_valid_word("cat1", 3, 8));
        assert!(!is_valid_word("toolongaword", 3, 8));
    }
}
