//! Creative-word-transformation scoring engine.
//!
//! Given an anchor word, enumerates every valid one-step transformation
//! (rhymes, anagrams, one-letter-off neighbours) and scores candidates
//! against a causal language model's conditional token probabilities via
//! a cached probability tree. See `Engine` for the top-level entry point
//! that wires the components together.

pub mod builder;
pub mod config;
pub mod error;
pub mod game;
pub mod lexicon;
pub mod lookup;
pub mod model;
pub mod pronounce;
pub mod scorer;
pub mod storage;
pub mod transform;
pub mod trie;
pub mod tree;

pub use config::Config;
pub use error::{Error, Result};
pub use lexicon::Lexicon;
pub use model::{DeterministicModelAdapter, ModelAdapter};
pub use pronounce::Pronounceables;
pub use scorer::{CategoryScore, Scorer, ScoringResult};
pub use transform::{Category, TransformationEngine, TransformationSet};
pub use trie::TrieNode;
pub use tree::WordProbabilityTree;

use std::path::Path;

/// Top-level facade: owns every read-mostly component (Lexicon,
/// Pronounceables, trie) and the Model Adapter, and exposes a `Scorer`
/// over them. Initialisation order follows spec §9: Lexicon ->
/// Pronounceables -> Trie build -> Model -> Storage -> Builder -> Scorer.
pub struct Engine {
    pub config: Config,
    pub lexicon: Lexicon,
    pub pronounceables: Pronounceables,
    pub trie: TrieNode,
    pub model: Box<dyn ModelAdapter>,
}

impl Engine {
    /// Load the Lexicon from the configured `game_data_dir`, parse a
    /// CMUdict-formatted pronunciation file, build the transformation
    /// trie, and initialise the given model adapter. `ModelUnavailable`
    /// at this stage is fatal, per spec §7.
    pub fn initialize(
        config: Config,
        cmudict_path: impl AsRef<Path>,
        model: Box<dyn ModelAdapter>,
    ) -> Result<Self> {
        let lexicon = Lexicon::load(
            config.words_path(),
            config.frequencies_path(),
            config.anagrams_path(),
            config.min_word_len,
            config.max_word_len,
        )?;

        let cmudict_path = cmudict_path.as_ref();
        let text = std::fs::read_to_string(cmudict_path)
            .map_err(|_| Error::ResourceMissing(cmudict_path.to_path_buf()))?;
        let pronounceables = Pronounceables::parse(&text);

        let trie = TransformationEngine::build_trie(&lexicon);

        tracing::info!("engine initialised");

        Ok(Engine {
            config,
            lexicon,
            pronounceables,
            trie,
            model,
        })
    }

    pub fn transformation_engine(&self) -> TransformationEngine<'_> {
        TransformationEngine::new(&self.lexicon, &self.pronounceables, &self.trie)
    }

    /// Build a fresh `Scorer` bound to this engine's resources and a
    /// newly opened storage stack per the engine's configured storage
    /// mode.
    pub fn scorer(&self) -> Result<Scorer<'_>> {
        let storage = storage::Storage::open(&self.config.storage)?;
        Ok(Scorer::new(
            &self.lexicon,
            &self.pronounceables,
            &self.trie,
            self.model.as_ref(),
            storage,
            &self.config,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn engine_initializes_from_package_files() {
        let dir = tempfile::tempdir().unwrap();
        let game_data = dir.path().join("game_data");
        std::fs::create_dir_all(&game_data).unwrap();
        std::fs::write(game_data.join("words.txt"), "cat\nhat\n").unwrap();
        std::fs::write(game_data.join("frequencies.json"), r#"{"cat":0.5,"hat":0.3}"#).unwrap();
        std::fs::write(game_data.join("anagrams.json"), "{}").unwrap();

        let cmudict_path = dir.path().join("cmudict.txt");
        let mut f = std::fs::File::create(&cmudict_path).unwrap();
        writeln!(f, "CAT  K AE1 T").unwrap();
        writeln!(f, "HAT  HH AE1 T").unwrap();

        let mut config = Config::default();
        config.game_data_dir = game_data;
        config.storage.mode = config::StorageMode::MemoryOnly;

        let model = Box::new(DeterministicModelAdapter::new(128));
        let engine = Engine::initialize(config, &cmudict_path, model).unwrap();
        assert!(engine.lexicon.contains("cat"));
        assert!(engine.pronounceables.is_pronounceable("hat"));

        let scorer = engine.scorer().unwrap();
        let result = scorer.score("cat", "hat").unwrap();
        assert!(result.total_score > 0.0);
    }
}
