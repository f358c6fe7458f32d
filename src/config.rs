//! Runtime configuration, loaded from an optional TOML file.
//!
//! Mirrors the load/save/default pattern of the teacher's top-level
//! `Config`: every field has a sane default so the crate runs with zero
//! configuration, and the file format is plain TOML.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Which creativity formula `Scorer`/`lookup` use. The two must never be
/// mixed within a single scoring call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CreativityScheme {
    #[default]
    Product,
    LayerRms,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StorageMode {
    MemoryOnly,
    Kv,
    Json,
    #[default]
    Hybrid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub mode: StorageMode,
    pub lru_capacity: usize,
    pub kv_path: Option<PathBuf>,
    pub json_fallback_path: Option<PathBuf>,
    pub compression: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            mode: StorageMode::Hybrid,
            lru_capacity: 1000,
            kv_path: Some(PathBuf::from("game_data/probability_trees.redb")),
            json_fallback_path: Some(PathBuf::from("game_data/probability_trees.json")),
            compression: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub game_data_dir: PathBuf,
    pub min_word_len: usize,
    pub max_word_len: usize,
    pub creativity_scheme: CreativityScheme,
    pub storage: StorageConfig,
    pub bonus_cache_capacity: usize,
    pub tree_build_timeout_ms: Option<u64>,
    pub model_vocab_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            game_data_dir: PathBuf::from("game_data"),
            min_word_len: 3,
            max_word_len: 8,
            creativity_scheme: CreativityScheme::Product,
            storage: StorageConfig::default(),
            bonus_cache_capacity: 1000,
            tree_build_timeout_ms: None,
            model_vocab_size: 50_257,
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|_| Error::ResourceMissing(path.as_ref().to_path_buf()))?;
        toml::from_str(&text).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let text = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(path, text)?;
        Ok(())
    }

    pub fn words_path(&self) -> PathBuf {
        self.game_data_dir.join("words.txt")
    }

    pub fn frequencies_path(&self) -> PathBuf {
        self.game_data_dir.join("frequencies.json")
    }

    pub fn anagrams_path(&self) -> PathBuf {
        self.game_data_dir.join("anagrams.json")
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.game_data_dir.join("metadata.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_roundtrips_through_toml() {
        let cfg = Config::default();
        let text = toml::to_string_pretty(&cfg).unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back.min_word_len, cfg.min_word_len);
        assert_eq!(back.creativity_scheme, cfg.creativity_scheme);
    }

    #[test]
    fn load_missing_file_is_resource_missing() {
        let err = Config::load("/nonexistent/path/config.toml").unwrap_err();
        assert!(matches!(err, Error::ResourceMissing(_)));
    }
}
