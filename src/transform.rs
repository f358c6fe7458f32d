//! Transformation Engine (C3): enumerates anagrams, one-letter-off (OLO)
//! neighbours, and rhyme classes for an anchor word.

use ahash::{AHashMap, AHashSet};

use crate::error::{Error, Result};
use crate::lexicon::Lexicon;
use crate::pronounce::{self, Phone, Pronounceables};
use crate::trie::TrieNode;

/// Closed category enumeration, spec §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Prf,
    Rch,
    Sln,
    Ana,
    Ola,
    Olr,
    Olx,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Prf,
        Category::Rch,
        Category::Sln,
        Category::Ana,
        Category::Ola,
        Category::Olr,
        Category::Olx,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Prf => "Prf",
            Category::Rch => "Rch",
            Category::Sln => "Sln",
            Category::Ana => "Ana",
            Category::Ola => "Ola",
            Category::Olr => "Olr",
            Category::Olx => "Olx",
        }
    }
}

/// Top-level grouping used to select a `ProbabilityNode` subtree (spec §3's
/// `ana`/`olo`/`rhy` record fields).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MainCategory {
    Ana,
    Olo,
    Rhy,
}

impl Category {
    pub fn main(self) -> MainCategory {
        match self {
            Category::Ana => MainCategory::Ana,
            Category::Ola | Category::Olr | Category::Olx => MainCategory::Olo,
            Category::Prf | Category::Rch | Category::Sln => MainCategory::Rhy,
        }
    }
}

/// Curated homophone table for rich-rhyme classification, grounded on
/// `efficient_word_engine.py::HOMOPHONE_PAIRS`.
pub const HOMOPHONE_PAIRS: &[(&str, &str)] = &[
    ("there", "their"),
    ("there", "theyre"),
    ("their", "theyre"),
    ("here", "hear"),
    ("where", "wear"),
    ("to", "too"),
    ("to", "two"),
    ("too", "two"),
    ("for", "four"),
    ("by", "buy"),
    ("see", "sea"),
    ("meet", "meat"),
    ("right", "write"),
    ("knight", "night"),
    ("know", "no"),
    ("new", "knew"),
    ("one", "won"),
    ("ate", "eight"),
    ("break", "brake"),
    ("flower", "flour"),
    ("peace", "piece"),
    ("plain", "plane"),
    ("rain", "reign"),
    ("road", "rode"),
    ("sail", "sale"),
    ("son", "sun"),
    ("tail", "tale"),
    ("wait", "weight"),
    ("way", "weigh"),
    ("weak", "week"),
    ("weather", "whether"),
    ("wood", "would"),
];

fn is_curated_homophone(a: &str, b: &str) -> bool {
    HOMOPHONE_PAIRS
        .iter()
        .any(|&(x, y)| (x == a && y == b) || (x == b && y == a))
}

/// Three consecutive identical letters disqualifies a candidate.
pub fn has_excessive_repeats(word: &str) -> bool {
    let bytes = word.as_bytes();
    bytes.windows(3).any(|w| w[0] == w[1] && w[1] == w[2])
}

/// Every entry present in a category list must satisfy these, per spec §4.3.
fn is_eligible_candidate(
    w: &str,
    anchor: &str,
    lexicon: &Lexicon,
    pronounceables: &Pronounceables,
) -> bool {
    w != anchor
        && lexicon.contains(w)
        && pronounceables.is_pronounceable(w)
        && w.len() >= lexicon.min_len()
        && w.len() <= lexicon.max_len()
        && w.bytes().all(|b| b.is_ascii_lowercase())
        && !has_excessive_repeats(w)
}

/// Seven ordered, deduplicated lists for one anchor, excluding the anchor.
#[derive(Debug, Clone, Default)]
pub struct TransformationSet {
    pub prf: Vec<String>,
    pub rch: Vec<String>,
    pub sln: Vec<String>,
    pub ana: Vec<String>,
    pub ola: Vec<String>,
    pub olr: Vec<String>,
    pub olx: Vec<String>,
}

impl TransformationSet {
    pub fn get(&self, category: Category) -> &[String] {
        match category {
            Category::Prf => &self.prf,
            Category::Rch => &self.rch,
            Category::Sln => &self.sln,
            Category::Ana => &self.ana,
            Category::Ola => &self.ola,
            Category::Olr => &self.olr,
            Category::Olx => &self.olx,
        }
    }

    /// Every category that classifies `candidate` as a transformation of
    /// the anchor this set was built for.
    pub fn categories_for(&self, candidate: &str) -> Vec<Category> {
        Category::ALL
            .into_iter()
            .filter(|&c| self.get(c).iter().any(|w| w == candidate))
            .collect()
    }

    pub fn is_empty_category(&self, category: Category) -> bool {
        self.get(category).is_empty()
    }
}

pub struct TransformationEngine<'a> {
    lexicon: &'a Lexicon,
    pronounceables: &'a Pronounceables,
    trie: &'a TrieNode,
}

impl<'a> TransformationEngine<'a> {
    pub fn new(
        lexicon: &'a Lexicon,
        pronounceables: &'a Pronounceables,
        trie: &'a TrieNode,
    ) -> Self {
        TransformationEngine {
            lexicon,
            pronounceables,
            trie,
        }
    }

    /// Build the compressed-prefix trie over every word in `lexicon`.
    pub fn build_trie(lexicon: &Lexicon) -> TrieNode {
        let mut root = TrieNode::new();
        for w in lexicon.iter_words() {
            root.insert(w);
        }
        root
    }

    pub fn transform(&self, anchor: &str) -> Result<TransformationSet> {
        if !self.lexicon.contains(anchor) {
            return Err(Error::UnknownWord(anchor.to_string()));
        }

        let ana = self.anagrams(anchor);
        let (ola, olr, olx) = self.one_letter_off(anchor);
        let (prf, rch, sln) = self.rhymes(anchor);

        Ok(TransformationSet {
            prf,
            rch,
            sln,
            ana,
            ola,
            olr,
            olx,
        })
    }

    fn filter_eligible(&self, anchor: &str, candidates: impl IntoIterator<Item = String>) -> Vec<String> {
        let mut seen = AHashSet::default();
        let mut out = Vec::new();
        for c in candidates {
            if is_eligible_candidate(&c, anchor, self.lexicon, self.pronounceables) && seen.insert(c.clone()) {
                out.push(c);
            }
        }
        out
    }

    fn anagrams(&self, anchor: &str) -> Vec<String> {
        self.filter_eligible(anchor, self.lexicon.anagram_group(anchor))
    }

    fn one_letter_off(&self, anchor: &str) -> (Vec<String>, Vec<String>, Vec<String>) {
        let chars: Vec<char> = anchor.chars().collect();
        let n = chars.len();

        let mut added = Vec::new();
        let mut removed = Vec::new();
        let mut changed = Vec::new();

        for i in 0..=n {
            let prefix = &chars[..i];
            let Some(node) = self.trie.find_node(prefix) else {
                continue;
            };
            // Add: insert a letter between position i and the rest.
            let suffix = &chars[i..];
            for (c, _) in node.children() {
                let mut candidate: String = prefix.iter().collect();
                candidate.push(c);
                candidate.extend(suffix.iter());
                if self.trie.contains_word(&candidate) {
                    added.push(candidate);
                }
            }

            if i < n {
                // Remove: drop the letter at position i.
                let mut candidate: String = prefix.iter().collect();
                candidate.extend(chars[i + 1..].iter());
                if !candidate.is_empty() && self.trie.contains_word(&candidate) {
                    removed.push(candidate);
                }

                // Change: substitute the letter at position i.
                for (c, _) in node.children() {
                    if c == chars[i] {
                        continue;
                    }
                    let mut candidate: String = prefix.iter().collect();
                    candidate.push(c);
                    candidate.extend(chars[i + 1..].iter());
                    if self.trie.contains_word(&candidate) {
                        changed.push(candidate);
                    }
                }
            }
        }

        (
            self.filter_eligible(anchor, added),
            self.filter_eligible(anchor, removed),
            self.filter_eligible(anchor, changed),
        )
    }

    /// Rhyme candidate pool: any word sharing at least one rhyming part
    /// with any pronunciation of the anchor.
    fn rhyme_candidate_pool(&self, anchor: &str) -> Vec<String> {
        let anchor_parts = self.pronounceables.all_rhyming_parts(anchor);
        if anchor_parts.is_empty() {
            return Vec::new();
        }
        let anchor_part_set: AHashSet<&Vec<Phone>> = anchor_parts.iter().collect();

        let mut out = Vec::new();
        for w in self.lexicon.iter_words() {
            if w == anchor {
                continue;
            }
            let parts = self.pronounceables.all_rhyming_parts(w);
            if parts.iter().any(|p| anchor_part_set.contains(p)) {
                out.push(w.to_string());
            }
        }
        out
    }

    fn rhymes(&self, anchor: &str) -> (Vec<String>, Vec<String>, Vec<String>) {
        let mut prf = Vec::new();
        let mut rch = Vec::new();
        let mut sln = Vec::new();

        let anchor_phones = self.pronounceables.phones_for(anchor);
        if anchor_phones.is_empty() {
            return (prf, rch, sln);
        }

        for candidate in self.rhyme_candidate_pool(anchor) {
            if !is_eligible_candidate(&candidate, anchor, self.lexicon, self.pronounceables) {
                continue;
            }
            let candidate_phones = self.pronounceables.phones_for(&candidate);

            let mut best: Option<Category> = None;
            for ap in anchor_phones {
                for cp in candidate_phones {
                    if let Some(class) = classify_pronunciation_pair(anchor, &candidate, ap, cp) {
                        best = Some(match best {
                            None => class,
                            Some(prev) => higher_precedence(prev, class),
                        });
                    }
                }
            }

            match best {
                Some(Category::Prf) => prf.push(candidate),
                Some(Category::Rch) => rch.push(candidate),
                Some(Category::Sln) => sln.push(candidate),
                _ => {}
            }
        }

        (prf, rch, sln)
    }
}

fn higher_precedence(a: Category, b: Category) -> Category {
    // Prf > Rch > Sln
    fn rank(c: Category) -> u8 {
        match c {
            Category::Prf => 2,
            Category::Rch => 1,
            Category::Sln => 0,
            _ => 0,
        }
    }
    if rank(a) >= rank(b) {
        a
    } else {
        b
    }
}

fn classify_pronunciation_pair(
    anchor_word: &str,
    candidate_word: &str,
    anchor_phones: &[Phone],
    candidate_phones: &[Phone],
) -> Option<Category> {
    let rp_a = pronounce::rhyming_part(anchor_phones);
    let rp_c = pronounce::rhyming_part(candidate_phones);
    if rp_a.is_empty() || rp_c.is_empty() {
        return None;
    }

    if rp_a == rp_c {
        return Some(Category::Prf);
    }

    if anchor_phones == candidate_phones || is_curated_homophone(anchor_word, candidate_word) {
        return Some(Category::Rch);
    }

    if has_assonance(rp_a, rp_c) || has_consonance(rp_a, rp_c) || has_half_rhyme(rp_a, rp_c) {
        return Some(Category::Sln);
    }

    None
}

fn vowels_with_stress(phones: &[Phone]) -> Vec<&str> {
    phones
        .iter()
        .filter(|p| pronounce::VOWELS.contains(&p.trim_end_matches(|c: char| c.is_ascii_digit())))
        .map(|p| p.as_str())
        .collect()
}

fn consonants_only(phones: &[Phone]) -> Vec<&str> {
    phones
        .iter()
        .filter(|p| !pronounce::VOWELS.contains(&p.trim_end_matches(|c: char| c.is_ascii_digit())))
        .map(|p| p.as_str())
        .collect()
}

fn has_assonance(rp_a: &[Phone], rp_c: &[Phone]) -> bool {
    let a = vowels_with_stress(rp_a);
    let c = vowels_with_stress(rp_c);
    !a.is_empty() && a == c
}

fn has_consonance(rp_a: &[Phone], rp_c: &[Phone]) -> bool {
    let a = consonants_only(rp_a);
    let c = consonants_only(rp_c);
    if a.len() < 2 || c.len() < 2 {
        return false;
    }
    a[a.len() - 2..] == c[c.len() - 2..]
}

fn has_half_rhyme(rp_a: &[Phone], rp_c: &[Phone]) -> bool {
    if rp_a == rp_c {
        return false;
    }
    let min_len = rp_a.len().min(rp_c.len());
    if min_len == 0 {
        return false;
    }
    let shared = rp_a
        .iter()
        .zip(rp_c.iter())
        .filter(|(x, y)| x == y)
        .count();
    shared >= 2 && (shared as f64) / (min_len as f64) >= 0.5
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(words: &[&str], phones: &[(&str, &str)]) -> (Lexicon, Pronounceables, TrieNode) {
        let mut w = AHashMap::default();
        for word in words {
            w.insert(word.to_string(), 0.1);
        }
        let mut groups: AHashMap<String, Vec<String>> = AHashMap::default();
        for word in words {
            groups
                .entry(crate::lexicon::prime_signature(word).to_string())
                .or_default()
                .push(word.to_string());
        }
        let lexicon = Lexicon::from_parts(w, groups, 3, 8);
        let mut dict = AHashMap::default();
        for (word, phone_str) in phones {
            dict.entry(word.to_string())
                .or_insert_with(Vec::new)
                .push(phone_str.split_whitespace().map(|s| s.to_string()).collect());
        }
        let pron = Pronounceables::from_parts(dict);
        let trie = TransformationEngine::build_trie(&lexicon);
        (lexicon, pron, trie)
    }

    #[test]
    fn anagram_of_cat_is_act() {
        let (lex, pron, trie) = build(
            &["cat", "act", "dog"],
            &[("cat", "K AE1 T"), ("act", "AE1 K T"), ("dog", "D AO1 G")],
        );
        let engine = TransformationEngine::new(&lex, &pron, &trie);
        let set = engine.transform("cat").unwrap();
        assert_eq!(set.ana, vec!["act".to_string()]);
        assert!(!set.ana.contains(&"cat".to_string()));
    }

    #[test]
    fn one_letter_off_change_cat_to_hat() {
        let (lex, pron, trie) = build(
            &["cat", "hat", "bat"],
            &[
                ("cat", "K AE1 T"),
                ("hat", "HH AE1 T"),
                ("bat", "B AE1 T"),
            ],
        );
        let engine = TransformationEngine::new(&lex, &pron, &trie);
        let set = engine.transform("cat").unwrap();
        assert!(set.olx.contains(&"hat".to_string()));
        assert!(set.olx.contains(&"bat".to_string()));
    }

    #[test]
    fn one_letter_off_remove_and_add() {
        let (lex, pron, trie) = build(
            &["cat", "at", "cart"],
            &[
                ("cat", "K AE1 T"),
                ("at", "AE1 T"),
                ("cart", "K AA1 R T"),
            ],
        );
        let engine = TransformationEngine::new(&lex, &pron, &trie);
        let set = engine.transform("cat").unwrap();
        // "at" has length 2, below the min word length, so should not appear.
        assert!(!set.olr.contains(&"at".to_string()));
        assert!(set.ola.contains(&"cart".to_string()));
    }

    #[test]
    fn perfect_rhyme_classification() {
        let (lex, pron, trie) = build(
            &["cat", "hat"],
            &[("cat", "K AE1 T"), ("hat", "HH AE1 T")],
        );
        let engine = TransformationEngine::new(&lex, &pron, &trie);
        let set = engine.transform("cat").unwrap();
        assert!(set.prf.contains(&"hat".to_string()));
        assert!(!set.sln.contains(&"hat".to_string()));
    }

    #[test]
    fn excessive_repeats_disqualifies() {
        assert!(has_excessive_repeats("aaabc"));
        assert!(!has_excessive_repeats("aabbc"));
    }
}
