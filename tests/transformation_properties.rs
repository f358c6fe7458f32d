//! Property-based checks for the invariants that should hold for every
//! input, not just the handful of fixtures exercised by the unit tests.

use proptest::prelude::*;
use wurdo_core::lexicon::prime_signature;
use wurdo_core::lookup::layer_rms_creativity;
use wurdo_core::transform::has_excessive_repeats;

fn lowercase_word() -> impl Strategy<Value = String> {
    proptest::collection::vec(proptest::char::range('a', 'z'), 3..10)
        .prop_map(|chars| chars.into_iter().collect())
}

proptest! {
    /// Permuting a word's letters never changes its prime signature, the
    /// invariant the anagram grouping is built on.
    #[test]
    fn prime_signature_is_invariant_under_permutation(word in lowercase_word(), seed in any::<u64>()) {
        let mut chars: Vec<char> = word.chars().collect();
        // Deterministic shuffle keyed off the proptest-generated seed.
        let n = chars.len();
        for i in (1..n).rev() {
            let j = (seed.wrapping_add(i as u64) as usize) % (i + 1);
            chars.swap(i, j);
        }
        let permuted: String = chars.into_iter().collect();
        prop_assert_eq!(prime_signature(&word), prime_signature(&permuted));
    }

    /// Prime signatures distinguish words whose letter multisets differ by
    /// at least one character.
    #[test]
    fn prime_signature_distinguishes_disjoint_letters(word in lowercase_word()) {
        let bumped: String = word
            .chars()
            .map(|c| {
                let shifted = ((c as u8 - b'a' + 1) % 26) + b'a';
                shifted as char
            })
            .collect();
        if bumped != word {
            prop_assert_ne!(prime_signature(&word), prime_signature(&bumped));
        }
    }

    /// Any word containing three consecutive identical letters is flagged,
    /// regardless of what surrounds the run.
    #[test]
    fn excessive_repeats_detects_any_run_of_three(
        prefix in lowercase_word(),
        c in proptest::char::range('a', 'z'),
        suffix in lowercase_word(),
    ) {
        let word = format!("{prefix}{c}{c}{c}{suffix}");
        prop_assert!(has_excessive_repeats(&word));
    }

    /// The layer-RMS creativity score is always clamped into [0, 1]
    /// regardless of the raw per-token probabilities fed into it.
    #[test]
    fn layer_rms_creativity_is_always_bounded(
        probs in proptest::collection::vec(0.0f32..=1.0f32, 1..12)
    ) {
        let c = layer_rms_creativity(&probs);
        prop_assert!((0.0..=1.0).contains(&c));
    }
}
