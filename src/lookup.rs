//! Tree Lookup (C7): read-only traversal of a built tree yielding sequence
//! probability and the "product" creativity score.

use crate::config::CreativityScheme;
use crate::model::TokenId;
use crate::tree::{ProbEntry, ProbabilityNode, WordProbabilityTree};

/// Multiply-and-descend the stored probabilities along `seq`. Returns 0
/// if `seq` is absent, extends past a terminal, or is a strict prefix of
/// a stored longer sequence. An empty `seq` always yields 1.
pub fn sequence_probability(node: &ProbabilityNode, seq: &[TokenId]) -> f64 {
    if seq.is_empty() {
        return 1.0;
    }
    if node.is_empty {
        return 0.0;
    }
    traverse(node, seq)
}

fn traverse(node: &ProbabilityNode, seq: &[TokenId]) -> f64 {
    let Some((&t, rest)) = seq.split_first() else {
        return 0.0;
    };
    match node.prb.get(&t) {
        None => 0.0,
        Some(ProbEntry::Terminal(p)) => {
            if rest.is_empty() {
                *p as f64
            } else {
                0.0
            }
        }
        Some(ProbEntry::Branch { p, child }) => {
            if rest.is_empty() {
                // seq ends exactly where stored sequences continue past t.
                0.0
            } else {
                (*p as f64) * traverse(child, rest)
            }
        }
    }
}

/// Product of every visited node's pre-renormalisation `val_prb_sum`
/// along the traversal path of `seq`, plus the path's terminal/branch
/// probabilities collapsed via `sequence_probability`'s own multiply, but
/// here we only need the `val_prb_sum` renormalisation factor.
fn renorm_factor_along_path(node: &ProbabilityNode, seq: &[TokenId]) -> f64 {
    if node.is_empty || seq.is_empty() {
        return 1.0;
    }
    let mut factor = node.meta.val_prb_sum as f64;
    if factor == 0.0 {
        factor = 1.0;
    }
    let Some((&t, rest)) = seq.split_first() else {
        return factor;
    };
    match node.prb.get(&t) {
        Some(ProbEntry::Branch { child, .. }) if !rest.is_empty() => {
            factor * renorm_factor_along_path(child, rest)
        }
        _ => factor,
    }
}

/// `(seq_p * R) / M` clamped to [0,1], where R is the product of visited
/// nodes' pre-renormalisation `val_prb_sum` and M is the root's `org_max`.
pub fn creativity_score(node: &ProbabilityNode, seq: &[TokenId]) -> f64 {
    let seq_p = sequence_probability(node, seq);
    if seq_p == 0.0 {
        return 0.0;
    }
    let m = node.meta.org_max as f64;
    if m <= 0.0 {
        return 0.0;
    }
    let r = renorm_factor_along_path(node, seq);
    (seq_p * r / m).clamp(0.0, 1.0)
}

/// The stored (post-renormalisation) probability at each step of the
/// traversal of `seq`, in order, or `None` if `seq` is absent, extends
/// past a terminal, or is a strict prefix of a stored longer sequence.
/// Used by the `LayerRms` creativity scheme, which is defined over a
/// per-step probability sequence rather than the `Product` scheme's
/// `val_prb_sum`/`org_max` metadata.
pub fn sequence_token_probs(node: &ProbabilityNode, seq: &[TokenId]) -> Option<Vec<f32>> {
    if seq.is_empty() {
        return Some(Vec::new());
    }
    if node.is_empty {
        return None;
    }
    collect_probs(node, seq)
}

fn collect_probs(node: &ProbabilityNode, seq: &[TokenId]) -> Option<Vec<f32>> {
    let (&t, rest) = seq.split_first()?;
    match node.prb.get(&t) {
        None => None,
        Some(ProbEntry::Terminal(p)) => {
            if rest.is_empty() {
                Some(vec![*p])
            } else {
                None
            }
        }
        Some(ProbEntry::Branch { p, child }) => {
            if rest.is_empty() {
                None
            } else {
                let mut tail = collect_probs(child, rest)?;
                let mut out = Vec::with_capacity(tail.len() + 1);
                out.push(*p);
                out.append(&mut tail);
                Some(out)
            }
        }
    }
}

/// Experimental layer-RMS alternative creativity scheme (spec §4.9's
/// "length normalisation of creativity"). Operates directly on the raw
/// per-token probabilities returned by a model for the sequence, not on a
/// built tree, since it is defined independently of the renormalised
/// sparse structure.
pub fn layer_rms_creativity(raw_token_probs: &[f32]) -> f64 {
    if raw_token_probs.is_empty() {
        return 0.0;
    }
    let mut rms = 0f64;
    for (i, &p) in raw_token_probs.iter().enumerate() {
        let n = (i + 1) as f64;
        let p = p as f64;
        rms = (((rms * rms) * (n - 1.0)) + p * p) / n;
        rms = rms.sqrt();
    }
    let n = raw_token_probs.len() as f64;
    let full_probability = rms / n;
    smooth(1.0 - full_probability)
}

fn smooth(x: f64) -> f64 {
    let z = 3.0 * (x - 0.5);
    1.0 / (1.0 + (-z).exp())
}

/// The `Product` scheme's fallback creativity, used when no probability
/// tree is available: the inverse of the fixed-pool-normalised sequence
/// probability, clamped to [0,1]. Distinct from the tree-path `Product`
/// formula (which needs `val_prb_sum`/`org_max`, unavailable without a
/// built tree) but still a product-style measure, never blended with
/// `layer_rms_creativity`.
pub fn product_fallback_creativity(full_probability: f64) -> f64 {
    (1.0 - full_probability).clamp(0.0, 1.0)
}

/// Look up a category's node on the tree and return `(sequence_probability,
/// creativity)`, computing creativity with whichever scheme is configured.
/// The two schemes are never blended: `Product` uses the tree's
/// `val_prb_sum`/`org_max` metadata exclusively, `LayerRms` uses only the
/// per-step stored probabilities along the path.
pub fn score_sequence(
    tree: &WordProbabilityTree,
    category: crate::transform::Category,
    seq: &[TokenId],
    scheme: CreativityScheme,
) -> (f64, f64) {
    let node = tree.node(category);
    let p = sequence_probability(node, seq);
    if p == 0.0 {
        return (0.0, 0.0);
    }
    let creativity = match scheme {
        CreativityScheme::Product => creativity_score(node, seq),
        CreativityScheme::LayerRms => sequence_token_probs(node, seq)
            .map(|probs| layer_rms_creativity(&probs))
            .unwrap_or(0.0),
    };
    (p, creativity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::NodeMeta;
    use ahash::AHashMap;

    fn leaf(p: f32) -> ProbabilityNode {
        let mut prb = AHashMap::default();
        prb.insert(1u32, ProbEntry::Terminal(p));
        ProbabilityNode::new(
            prb,
            NodeMeta {
                org_max: 0.5,
                val_prb_sum: p,
                max_dep: 1,
            },
        )
    }

    #[test]
    fn empty_sequence_has_probability_one() {
        let node = leaf(1.0);
        assert_eq!(sequence_probability(&node, &[]), 1.0);
    }

    #[test]
    fn missing_token_is_zero() {
        let node = leaf(1.0);
        assert_eq!(sequence_probability(&node, &[99]), 0.0);
    }

    #[test]
    fn terminal_hit_returns_its_probability() {
        let node = leaf(0.7);
        assert_eq!(sequence_probability(&node, &[1]), 0.7);
    }

    #[test]
    fn creativity_score_is_bounded() {
        let node = leaf(0.7);
        let c = creativity_score(&node, &[1]);
        assert!((0.0..=1.0).contains(&c));
    }

    #[test]
    fn branch_extends_past_terminal_returns_zero() {
        let node = leaf(0.7);
        assert_eq!(sequence_probability(&node, &[1, 2]), 0.0);
    }

    #[test]
    fn layer_rms_in_bounds() {
        let c = layer_rms_creativity(&[0.1, 0.2, 0.05]);
        assert!((0.0..=1.0).contains(&c));
    }

    #[test]
    fn product_fallback_creativity_is_bounded_and_inverted() {
        assert_eq!(product_fallback_creativity(0.0), 1.0);
        assert_eq!(product_fallback_creativity(1.0), 0.0);
        assert!((0.0..=1.0).contains(&product_fallback_creativity(2.0)));
    }

    #[test]
    fn sequence_token_probs_collects_each_step() {
        let mut child_prb = AHashMap::default();
        child_prb.insert(2u32, ProbEntry::Terminal(0.3));
        let child = ProbabilityNode::new(
            child_prb,
            NodeMeta {
                org_max: 0.5,
                val_prb_sum: 0.3,
                max_dep: 1,
            },
        );
        let mut prb = AHashMap::default();
        prb.insert(
            1u32,
            ProbEntry::Branch {
                p: 0.6,
                child: Box::new(child),
            },
        );
        let node = ProbabilityNode::new(prb, NodeMeta::zero());
        assert_eq!(sequence_token_probs(&node, &[1, 2]), Some(vec![0.6, 0.3]));
        assert_eq!(sequence_token_probs(&node, &[99]), None);
    }

    #[test]
    fn score_sequence_does_not_blend_schemes() {
        let node = leaf(0.7);
        let tree = WordProbabilityTree {
            anchor: "cat".to_string(),
            frq: 0.1,
            ana: node,
            ola: ProbabilityNode::empty(),
            olr: ProbabilityNode::empty(),
            olx: ProbabilityNode::empty(),
            prf: ProbabilityNode::empty(),
            rch: ProbabilityNode::empty(),
            sln: ProbabilityNode::empty(),
        };
        let (p_product, c_product) =
            score_sequence(&tree, crate::transform::Category::Ana, &[1], CreativityScheme::Product);
        let (p_rms, c_rms) =
            score_sequence(&tree, crate::transform::Category::Ana, &[1], CreativityScheme::LayerRms);
        assert_eq!(p_product, p_rms);
        // The two schemes use different formulas; for this single-token
        // path layer-RMS reduces to `smooth(1 - p)` while product uses
        // `val_prb_sum`/`org_max`, so the results need not agree.
        assert!((0.0..=1.0).contains(&c_product));
        assert!((0.0..=1.0).contains(&c_rms));
    }
}
