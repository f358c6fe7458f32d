//! Scorer (C9): combines C7's creativity with category/length BASE tables
//! to produce the final per-transformation score.

use std::sync::{Arc, Mutex};

use ahash::AHashMap;
use lru::LruCache;

use crate::builder::TreeBuilder;
use crate::config::{Config, CreativityScheme};
use crate::error::{Error, Result};
use crate::lexicon::Lexicon;
use crate::lookup;
use crate::model::{ModelAdapter, TokenId};
use crate::pronounce::Pronounceables;
use crate::storage::Storage;
use crate::transform::{Category, TransformationEngine, TransformationSet};
use crate::trie::TrieNode;

/// BASE[category][length], word lengths 3..=7; length 8 reuses length 7
/// (spec §9's explicit conservative choice for the unspecified case).
fn base_value(category: Category, len: usize) -> f64 {
    let idx = len.clamp(3, 8).min(7) - 3;
    let table: [f64; 5] = match category {
        Category::Prf => [50.0, 100.0, 150.0, 200.0, 250.0],
        Category::Rch => [150.0, 300.0, 450.0, 600.0, 750.0],
        Category::Sln => [75.0, 150.0, 225.0, 300.0, 375.0],
        Category::Ana => [100.0, 300.0, 500.0, 700.0, 900.0],
        Category::Ola | Category::Olr | Category::Olx => [100.0, 200.0, 300.0, 400.0, 500.0],
    };
    table[idx]
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CategoryScore {
    pub category: Category,
    pub base: f64,
    pub creativity: f64,
    pub bonus: f64,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoringResult {
    pub anchor: String,
    pub candidate: String,
    pub per_category: Vec<CategoryScore>,
    pub total_score: f64,
    pub mean_creativity: f64,
    pub using_probability_tree: bool,
}

fn round_to_milli(x: f64) -> i64 {
    (x * 1000.0).round() as i64
}

#[derive(Hash, PartialEq, Eq, Clone)]
struct BonusKey {
    category: u8,
    len: usize,
    creativity_milli: i64,
}

fn category_tag(c: Category) -> u8 {
    match c {
        Category::Prf => 0,
        Category::Rch => 1,
        Category::Sln => 2,
        Category::Ana => 3,
        Category::Ola => 4,
        Category::Olr => 5,
        Category::Olx => 6,
    }
}

pub struct Scorer<'a> {
    lexicon: &'a Lexicon,
    pronounceables: &'a Pronounceables,
    transform_sets: Mutex<AHashMap<String, Arc<TransformationSet>>>,
    builder: TreeBuilder,
    storage: Storage,
    model: &'a dyn ModelAdapter,
    trie: &'a TrieNode,
    bonus_cache: Mutex<LruCache<BonusKey, f64>>,
    creativity_scheme: CreativityScheme,
}

impl<'a> Scorer<'a> {
    pub fn new(
        lexicon: &'a Lexicon,
        pronounceables: &'a Pronounceables,
        trie: &'a TrieNode,
        model: &'a dyn ModelAdapter,
        storage: Storage,
        config: &Config,
    ) -> Self {
        Scorer {
            lexicon,
            pronounceables,
            transform_sets: Mutex::new(AHashMap::default()),
            builder: TreeBuilder::new(),
            storage,
            model,
            trie,
            bonus_cache: Mutex::new(LruCache::new(
                std::num::NonZeroUsize::new(config.bonus_cache_capacity.max(1)).unwrap(),
            )),
            creativity_scheme: config.creativity_scheme,
        }
    }

    fn transformation_set(&self, anchor: &str) -> Result<Arc<TransformationSet>> {
        if let Some(set) = self.transform_sets.lock().unwrap().get(anchor) {
            return Ok(set.clone());
        }
        let engine = TransformationEngine::new(self.lexicon, self.pronounceables, self.trie);
        let set = Arc::new(engine.transform(anchor)?);
        self.transform_sets
            .lock()
            .unwrap()
            .insert(anchor.to_string(), set.clone());
        Ok(set)
    }

    fn bonus_for(&self, category: Category, len: usize, creativity: f64) -> f64 {
        let base = base_value(category, len);
        let key = BonusKey {
            category: category_tag(category),
            len,
            creativity_milli: round_to_milli(creativity),
        };
        if let Some(&cached) = self.bonus_cache.lock().unwrap().peek(&key) {
            return cached;
        }
        let bonus = base * 0.5 * creativity;
        self.bonus_cache.lock().unwrap().put(key, bonus);
        bonus
    }

    /// `score(anchor, candidate)`, spec §4.9.
    pub fn score(&self, anchor: &str, candidate: &str) -> Result<ScoringResult> {
        if !self.lexicon.contains(anchor) {
            return Err(Error::UnknownWord(anchor.to_string()));
        }

        let set = self.transformation_set(anchor)?;
        let categories = set.categories_for(candidate);
        if categories.is_empty() {
            return Err(Error::NotATransformation(
                anchor.to_string(),
                candidate.to_string(),
            ));
        }

        let tokens = self.model.encode(candidate);
        if tokens.is_empty() {
            return Err(Error::TokenizationEmpty(candidate.to_string()));
        }

        let tree_result = self.obtain_tree(anchor, &set);
        let len = candidate.len();

        let (per_category, using_probability_tree) = match tree_result {
            Ok(tree) => {
                let mut scores = Vec::with_capacity(categories.len());
                for category in &categories {
                    let (p, c) =
                        lookup::score_sequence(&tree, *category, &tokens, self.creativity_scheme);
                    let base = base_value(*category, len);
                    let bonus = if p > 0.0 {
                        self.bonus_for(*category, len, c)
                    } else {
                        0.0
                    };
                    scores.push(CategoryScore {
                        category: *category,
                        base,
                        creativity: c,
                        bonus,
                        total: base + bonus,
                    });
                }
                (scores, true)
            }
            Err(e) => {
                tracing::warn!(anchor, error = %e, "tree build failed, using ML-direct fallback scorer");
                let scores = self.score_fallback(anchor, &set, &categories, &tokens, len);
                (scores, false)
            }
        };

        let total_score: f64 = per_category.iter().map(|c| c.total).sum();
        let mean_creativity = if per_category.is_empty() {
            0.0
        } else {
            per_category.iter().map(|c| c.creativity).sum::<f64>() / per_category.len() as f64
        };

        Ok(ScoringResult {
            anchor: anchor.to_string(),
            candidate: candidate.to_string(),
            per_category,
            total_score,
            mean_creativity,
            using_probability_tree,
        })
    }

    fn obtain_tree(
        &self,
        anchor: &str,
        set: &TransformationSet,
    ) -> Result<Arc<crate::tree::WordProbabilityTree>> {
        if let Some(tree) = self.storage.get(anchor)? {
            return Ok(tree);
        }
        let frq = self.lexicon.frequency(anchor);
        let tree = self.builder.build(anchor, frq, set, self.model)?;
        self.storage.put(anchor, tree.clone())?;
        Ok(tree)
    }

    /// ML-direct fallback: walks each candidate token in turn, normalising
    /// at every step by the same fixed pool (the union of every token of
    /// every candidate word in the category, built once). Creativity
    /// follows whichever scheme is configured, matching the tree path: the
    /// two schemes are never blended within one scoring call.
    fn score_fallback(
        &self,
        anchor: &str,
        set: &TransformationSet,
        categories: &[Category],
        candidate_tokens: &[TokenId],
        len: usize,
    ) -> Vec<CategoryScore> {
        let mut out = Vec::with_capacity(categories.len());
        for &category in categories {
            let pool = set.get(category);
            let pool_tokens: Vec<Vec<TokenId>> =
                pool.iter().map(|w| self.model.encode(w)).collect();

            let (p, raw_token_probs) =
                self.fallback_sequence_probability(anchor, category, candidate_tokens, &pool_tokens);
            let base = base_value(category, len);
            let creativity = if p > 0.0 {
                match self.creativity_scheme {
                    CreativityScheme::Product => lookup::product_fallback_creativity(p),
                    CreativityScheme::LayerRms => lookup::layer_rms_creativity(&raw_token_probs),
                }
            } else {
                0.0
            };
            let bonus = if p > 0.0 {
                self.bonus_for(category, len, creativity)
            } else {
                0.0
            };
            out.push(CategoryScore {
                category,
                base,
                creativity,
                bonus,
                total: base + bonus,
            });
        }
        out
    }

    /// Normalises against a single fixed pool built once from every token
    /// of every candidate word in the category, reused unchanged at every
    /// recursion depth. This mirrors the original's `valid_tokens` set
    /// (built once, not narrowed as tokens are consumed) rather than the
    /// per-step first-token narrowing an earlier draft of this fallback
    /// used.
    fn fallback_sequence_probability(
        &self,
        anchor: &str,
        category: Category,
        candidate_tokens: &[TokenId],
        pool_tokens: &[Vec<TokenId>],
    ) -> (f64, Vec<f32>) {
        let mut context = crate::builder::prompt_template(category, anchor);
        let mut probability = 1.0f64;
        let mut raw_probs = Vec::with_capacity(candidate_tokens.len());

        let valid_tokens: std::collections::HashSet<TokenId> =
            pool_tokens.iter().flatten().copied().collect();

        for &tok in candidate_tokens {
            let (dist, _) = self.model.next_token_distribution(&context);
            let raw_p = *dist.get(tok as usize).unwrap_or(&0.0);
            raw_probs.push(raw_p);

            let denom: f64 = valid_tokens
                .iter()
                .map(|&t| *dist.get(t as usize).unwrap_or(&0.0) as f64)
                .sum();
            if denom <= 0.0 {
                return (0.0, raw_probs);
            }
            probability *= raw_p as f64 / denom;

            context.push_str(&self.model.decode(&[tok]));
            context.push(' ');
        }

        (probability, raw_probs)
    }
}
