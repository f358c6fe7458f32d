//! Game Coordinator (C10): interface-only consumer of the Transformation
//! Engine and Scorer. Not part of the scored core; present so the chain
//! and suggestion contracts line up with what C3/C9 expose.

use ahash::AHashSet;

use crate::error::Result;
use crate::scorer::{ScoringResult, Scorer};
use crate::transform::{Category, TransformationSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Player {
    You,
    Umi,
}

#[derive(Debug, Clone)]
pub struct ChainEntry {
    pub word: String,
    pub score: f64,
}

/// Maintains two independent word chains over a shared anchor, plus
/// per-chain suggestions and per-turn scores (spec §4.10).
pub struct GameCoordinator<'a> {
    scorer: &'a Scorer<'a>,
    anchor: String,
    you_chain: Vec<ChainEntry>,
    umi_chain: Vec<ChainEntry>,
}

impl<'a> GameCoordinator<'a> {
    pub fn new(scorer: &'a Scorer<'a>, anchor: impl Into<String>) -> Self {
        GameCoordinator {
            scorer,
            anchor: anchor.into(),
            you_chain: Vec::new(),
            umi_chain: Vec::new(),
        }
    }

    pub fn anchor(&self) -> &str {
        &self.anchor
    }

    pub fn chain(&self, player: Player) -> &[ChainEntry] {
        match player {
            Player::You => &self.you_chain,
            Player::Umi => &self.umi_chain,
        }
    }

    fn used_words(&self) -> AHashSet<&str> {
        self.you_chain
            .iter()
            .chain(self.umi_chain.iter())
            .map(|e| e.word.as_str())
            .collect()
    }

    /// Score and record `word` as the next play for `player`.
    pub fn play(&mut self, player: Player, word: &str) -> Result<ScoringResult> {
        let result = self.scorer.score(&self.anchor, word)?;
        let entry = ChainEntry {
            word: word.to_string(),
            score: result.total_score,
        };
        match player {
            Player::You => self.you_chain.push(entry),
            Player::Umi => self.umi_chain.push(entry),
        }
        Ok(result)
    }

    /// Best candidate per category by frequency, excluding words already
    /// used on either chain.
    pub fn suggestions(
        &self,
        lexicon: &crate::lexicon::Lexicon,
        set: &TransformationSet,
    ) -> Vec<(Category, String)> {
        let used = self.used_words();
        let mut out = Vec::new();
        for category in Category::ALL {
            let best = set
                .get(category)
                .iter()
                .filter(|w| !used.contains(w.as_str()))
                .max_by(|a, b| {
                    lexicon
                        .frequency(a)
                        .partial_cmp(&lexicon.frequency(b))
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
            if let Some(word) = best {
                out.push((category, word.clone()));
            }
        }
        out
    }
}
