//! Model Adapter (C4): the uniform interface over a black-box causal
//! language model's next-token distribution, plus a byte-level tokenizer
//! and a deterministic reference adapter for tests.

use ahash::AHasher;
use std::hash::{Hash, Hasher};

use crate::error::{Error, Result};

pub type TokenId = u32;

/// Capability set the core consumes from whatever language-model runtime
/// backs it. Implementations must be pure with respect to `context`: the
/// same string must always yield the same distribution, since the Tree
/// Builder's per-build cache relies on that.
pub trait ModelAdapter: Send + Sync {
    fn encode(&self, text: &str) -> Vec<TokenId>;
    fn decode(&self, tokens: &[TokenId]) -> String;
    /// Returns the full-vocabulary distribution (summing to 1.0 ± 1e-4)
    /// and its max value.
    fn next_token_distribution(&self, context: &str) -> (Vec<f32>, f32);
    fn vocab_size(&self) -> usize;
}

/// A minimal byte-level tokenizer: every byte of the UTF-8 input becomes
/// one token, offset so that token ids stay below the adapter's declared
/// vocabulary size. No whitespace is injected at the start of the text.
/// This is the crate's reference tokenizer, usable standalone wherever a
/// `ModelAdapter` implementation needs byte-level encode/decode without
/// pulling in an external BPE vocabulary.
pub struct ByteLevelTokenizer {
    vocab_size: usize,
}

impl ByteLevelTokenizer {
    pub fn new(vocab_size: usize) -> Self {
        ByteLevelTokenizer { vocab_size }
    }

    pub fn encode(&self, text: &str) -> Vec<TokenId> {
        text.bytes().map(|b| b as TokenId).collect()
    }

    pub fn decode(&self, tokens: &[TokenId]) -> String {
        let bytes: Vec<u8> = tokens
            .iter()
            .filter(|&&t| t < 256)
            .map(|&t| t as u8)
            .collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }
}

/// A reference `ModelAdapter` that derives a reproducible, hash-based
/// distribution from the context string. It is not a language model: it
/// exists so the rest of the pipeline (tree building, lookup, scoring) has
/// a concrete, fully deterministic adapter to run against in tests and in
/// absence of a real model binding.
pub struct DeterministicModelAdapter {
    tokenizer: ByteLevelTokenizer,
    vocab_size: usize,
}

impl DeterministicModelAdapter {
    pub fn new(vocab_size: usize) -> Self {
        DeterministicModelAdapter {
            tokenizer: ByteLevelTokenizer::new(vocab_size),
            vocab_size,
        }
    }

    pub fn try_init(vocab_size: usize) -> Result<Self> {
        if vocab_size == 0 {
            return Err(Error::ModelUnavailable(
                "vocab_size must be positive".to_string(),
            ));
        }
        Ok(Self::new(vocab_size))
    }
}

impl ModelAdapter for DeterministicModelAdapter {
    fn encode(&self, text: &str) -> Vec<TokenId> {
        self.tokenizer.encode(text)
    }

    fn decode(&self, tokens: &[TokenId]) -> String {
        self.tokenizer.decode(tokens)
    }

    fn next_token_distribution(&self, context: &str) -> (Vec<f32>, f32) {
        let mut weights = vec![0f32; self.vocab_size];
        let mut total = 0f64;
        // A small number of "live" tokens derived from the context hash
        // carry most of the mass; everything else gets a tiny uniform
        // residual so probabilities are never exactly zero for arbitrary
        // tokens (mirrors a real softmax's long tail).
        let live = 32.min(self.vocab_size);
        for i in 0..live {
            let mut hasher = AHasher::default();
            context.hash(&mut hasher);
            i.hash(&mut hasher);
            let h = hasher.finish();
            let token = (h % self.vocab_size as u64) as usize;
            // Geometric-ish decay so there is a clear argmax.
            let weight = 1.0f64 / (i as f64 + 1.0).powf(1.5);
            weights[token] += weight as f32;
            total += weight;
        }
        let residual = (total * 0.01).max(1e-9) / self.vocab_size as f64;
        for w in weights.iter_mut() {
            *w += residual as f32;
        }
        total += residual * self.vocab_size as f64;

        let mut max = 0f32;
        for w in weights.iter_mut() {
            *w = (*w as f64 / total) as f32;
            if *w > max {
                max = *w;
            }
        }
        (weights, max)
    }

    fn vocab_size(&self) -> usize {
        self.vocab_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_level_tokenizer_roundtrips_ascii() {
        let tok = ByteLevelTokenizer::new(300);
        let ids = tok.encode("hat");
        assert_eq!(tok.decode(&ids), "hat");
    }

    #[test]
    fn deterministic_adapter_is_pure() {
        let model = DeterministicModelAdapter::new(512);
        let (d1, m1) = model.next_token_distribution("cat is a word that rhymes with ");
        let (d2, m2) = model.next_token_distribution("cat is a word that rhymes with ");
        assert_eq!(d1, d2);
        assert_eq!(m1, m2);
    }

    #[test]
    fn deterministic_adapter_distribution_sums_to_one() {
        let model = DeterministicModelAdapter::new(256);
        let (dist, max) = model.next_token_distribution("some context");
        let sum: f64 = dist.iter().map(|&p| p as f64).sum();
        assert!((sum - 1.0).abs() < 1e-3, "sum={sum}");
        let actual_max = dist.iter().cloned().fold(0f32, f32::max);
        assert!((actual_max - max).abs() < 1e-6);
    }

    #[test]
    fn different_contexts_diverge() {
        let model = DeterministicModelAdapter::new(512);
        let (d1, _) = model.next_token_distribution("cat");
        let (d2, _) = model.next_token_distribution("dog");
        assert_ne!(d1, d2);
    }
}
