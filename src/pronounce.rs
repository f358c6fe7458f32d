//! Pronounceables (C2): a read-only CMU-style phone dictionary.
//!
//! Loads a standard CMUdict-formatted text file: one entry per line,
//! `WORD  PH0 PH1 ...` or `WORD(n)  PH0 PH1 ...` for the n-th alternate
//! pronunciation of a word, phonemes upper-case ARPABET optionally
//! suffixed with a stress digit (0 = unstressed, 1 = primary, 2 =
//! secondary). Lines starting with `;;;` are comments.

use ahash::AHashMap;

/// A single phoneme, e.g. "K" or "AE1".
pub type Phone = String;

/// Vowel phonemes (ARPABET), used by assonance/consonance classification.
pub const VOWELS: [&str; 15] = [
    "AA", "AE", "AH", "AO", "AW", "AY", "EH", "ER", "EY", "IH", "IY", "OW", "OY", "UH", "UW",
];

fn base_phone(p: &str) -> &str {
    p.trim_end_matches(|c: char| c.is_ascii_digit())
}

fn is_vowel(p: &str) -> bool {
    VOWELS.contains(&base_phone(p))
}

fn has_stress(p: &str) -> bool {
    p.ends_with('1') || p.ends_with('2')
}

/// Return the suffix of `phones` starting at the last phoneme carrying
/// primary (1) or secondary (2) stress, to the end. Empty if no stressed
/// phoneme is present.
pub fn rhyming_part(phones: &[Phone]) -> &[Phone] {
    for i in (0..phones.len()).rev() {
        if has_stress(&phones[i]) {
            return &phones[i..];
        }
    }
    &[]
}

/// Count syllables as the number of vowel phonemes.
pub fn syllable_count(phones: &[Phone]) -> usize {
    phones.iter().filter(|p| is_vowel(p)).count()
}

/// Stress pattern string, e.g. "010", one digit per vowel phoneme.
pub fn stress_pattern(phones: &[Phone]) -> String {
    phones
        .iter()
        .filter(|p| is_vowel(p))
        .map(|p| p.chars().last().filter(|c| c.is_ascii_digit()).unwrap_or('0'))
        .collect()
}

pub struct Pronounceables {
    dict: AHashMap<String, Vec<Vec<Phone>>>,
}

impl Pronounceables {
    pub fn empty() -> Self {
        Pronounceables {
            dict: AHashMap::default(),
        }
    }

    pub fn from_parts(dict: AHashMap<String, Vec<Vec<Phone>>>) -> Self {
        Pronounceables { dict }
    }

    /// Parse a CMUdict-formatted string.
    pub fn parse(text: &str) -> Self {
        let mut dict: AHashMap<String, Vec<Vec<Phone>>> = AHashMap::default();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with(";;;") {
                continue;
            }
            let mut parts = line.split_whitespace();
            let Some(raw_word) = parts.next() else {
                continue;
            };
            let phones: Vec<Phone> = parts.map(|s| s.to_string()).collect();
            if phones.is_empty() {
                continue;
            }
            let word = raw_word
                .split('(')
                .next()
                .unwrap_or(raw_word)
                .to_lowercase();
            dict.entry(word).or_default().push(phones);
        }
        Pronounceables { dict }
    }

    pub fn phones_for(&self, w: &str) -> &[Vec<Phone>] {
        self.dict.get(w).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn is_pronounceable(&self, w: &str) -> bool {
        !self.phones_for(w).is_empty()
    }

    pub fn syllable_count(&self, w: &str) -> usize {
        self.phones_for(w)
            .first()
            .map(|p| syllable_count(p))
            .unwrap_or(0)
    }

    pub fn stress_pattern(&self, w: &str) -> String {
        self.phones_for(w)
            .first()
            .map(|p| stress_pattern(p))
            .unwrap_or_default()
    }

    /// All distinct rhyming parts (as phone-sequence tuples) across every
    /// pronunciation of `w`.
    pub fn all_rhyming_parts(&self, w: &str) -> Vec<Vec<Phone>> {
        let mut out = Vec::new();
        for phones in self.phones_for(w) {
            let rp = rhyming_part(phones);
            if !rp.is_empty() && !out.iter().any(|existing: &Vec<Phone>| existing == rp) {
                out.push(rp.to_vec());
            }
        }
        out
    }
}

impl Default for Pronounceables {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phones(s: &str) -> Vec<Phone> {
        s.split_whitespace().map(|x| x.to_string()).collect()
    }

    #[test]
    fn parses_basic_entries() {
        let text = "CAT  K AE1 T\nHAT  HH AE1 T\n";
        let dict = Pronounceables::parse(text);
        assert!(dict.is_pronounceable("cat"));
        assert_eq!(dict.phones_for("cat")[0], phones("K AE1 T"));
    }

    #[test]
    fn parses_alternate_pronunciations() {
        let text = "READ  R IY1 D\nREAD(1)  R EH1 D\n";
        let dict = Pronounceables::parse(text);
        assert_eq!(dict.phones_for("read").len(), 2);
    }

    #[test]
    fn rhyming_part_starts_at_last_stressed_vowel() {
        let p = phones("K AE1 T");
        assert_eq!(rhyming_part(&p), phones("AE1 T"));
    }

    #[test]
    fn rhyming_part_empty_when_no_stress() {
        let p = phones("K AH T");
        assert!(rhyming_part(&p).is_empty());
    }

    #[test]
    fn unknown_word_yields_empty_slice() {
        let dict = Pronounceables::empty();
        assert_eq!(dict.phones_for("zzzznotaword"), &[] as &[Vec<Phone>]);
        assert!(!dict.is_pronounceable("zzzznotaword"));
    }
}
