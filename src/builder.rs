//! Tree Builder (C6): constructs a `WordProbabilityTree` from a
//! `TransformationSet` and a `ModelAdapter`, with a per-build context
//! cache and single-flight coalescing across concurrent callers for the
//! same anchor.

use std::sync::{Arc, Condvar, Mutex};

use ahash::AHashMap;

use crate::error::{Error, Result};
use crate::model::{ModelAdapter, TokenId};
use crate::transform::{Category, TransformationSet};
use crate::tree::{visit_nodes, NodeMeta, ProbEntry, ProbabilityNode, WordProbabilityTree};

const RENORM_TOLERANCE: f64 = 1e-3;

pub(crate) fn prompt_template(category: Category, anchor: &str) -> String {
    match category {
        Category::Prf => format!("{anchor} is a word that rhymes perfectly with words like "),
        Category::Rch => format!("{anchor} is a word whose homophones are words like "),
        Category::Sln => format!("{anchor} is a word that rhymes partially with words like "),
        Category::Ana => {
            format!("{anchor} is a word whose letters can be rearranged to form anagrams like ")
        }
        Category::Ola => format!(
            "{anchor} is a word which with the addition of one letter can become words like "
        ),
        Category::Olr => {
            format!("{anchor} is a word which with one letter removed can become words like ")
        }
        Category::Olx => format!(
            "{anchor} is a word which with the change of a single letter can become words like "
        ),
    }
}

/// Ephemeral map from context string to raw distribution, alive only
/// during one tree's construction and shared across all seven category
/// builds for that anchor.
type ContextCache = AHashMap<String, (Vec<f32>, f32)>;

fn group_by_first_token(
    sequences: Vec<Vec<TokenId>>,
) -> AHashMap<TokenId, Vec<Vec<TokenId>>> {
    let mut groups: AHashMap<TokenId, Vec<Vec<TokenId>>> = AHashMap::default();
    for seq in sequences {
        if let Some((&first, rest)) = seq.split_first() {
            groups.entry(first).or_default().push(rest.to_vec());
        }
    }
    groups
}

fn build_node(
    anchor: &str,
    category: Category,
    sequences: Vec<Vec<TokenId>>,
    consumed: &[TokenId],
    model: &dyn ModelAdapter,
    cache: &mut ContextCache,
) -> ProbabilityNode {
    if sequences.is_empty() {
        return ProbabilityNode::empty();
    }

    let max_dep = sequences.iter().map(|s| s.len() as u32).max().unwrap_or(0);
    let groups = group_by_first_token(sequences);

    let mut context = prompt_template(category, anchor);
    for &tok in consumed {
        context.push_str(&model.decode(&[tok]));
        context.push(' ');
    }

    let (probs, org_max) = cache
        .entry(context.clone())
        .or_insert_with(|| model.next_token_distribution(&context))
        .clone();

    let val_prb_sum: f64 = groups
        .keys()
        .map(|&t| *probs.get(t as usize).unwrap_or(&0.0) as f64)
        .sum();

    let mut prb: AHashMap<TokenId, ProbEntry> = AHashMap::default();
    for (t, tails) in groups {
        let p = *probs.get(t as usize).unwrap_or(&0.0);
        if p <= 0.0 {
            continue;
        }
        let non_empty_tails: Vec<Vec<TokenId>> =
            tails.into_iter().filter(|tail| !tail.is_empty()).collect();
        if non_empty_tails.is_empty() {
            prb.insert(t, ProbEntry::Terminal(p));
        } else {
            let mut new_consumed = consumed.to_vec();
            new_consumed.push(t);
            let child = build_node(anchor, category, non_empty_tails, &new_consumed, model, cache);
            prb.insert(
                t,
                ProbEntry::Branch {
                    p,
                    child: Box::new(child),
                },
            );
        }
    }

    let sum: f64 = prb.values().map(|e| e.probability() as f64).sum();
    if sum > 0.0 {
        for entry in prb.values_mut() {
            match entry {
                ProbEntry::Terminal(p) => *p = (*p as f64 / sum) as f32,
                ProbEntry::Branch { p, .. } => *p = (*p as f64 / sum) as f32,
            }
        }
    }

    ProbabilityNode::new(
        prb,
        NodeMeta {
            org_max,
            val_prb_sum: val_prb_sum as f32,
            max_dep,
        },
    )
}

fn validate_node(node: &ProbabilityNode) -> Result<()> {
    let mut failure: Option<String> = None;
    visit_nodes(node, &mut |n| {
        if failure.is_some() || n.is_empty {
            return;
        }
        for entry in n.prb.values() {
            let p = entry.probability();
            if !p.is_finite() || !(0.0..=1.0).contains(&p) {
                failure = Some(format!("probability {p} out of [0,1] or NaN"));
                return;
            }
        }
        let sum = n.local_sum();
        if (sum - 1.0).abs() > RENORM_TOLERANCE {
            failure = Some(format!("node sum {sum} deviates from 1.0 beyond tolerance"));
        }
    });
    match failure {
        Some(msg) => Err(Error::TreeInvalid(msg)),
        None => Ok(()),
    }
}

fn build_tree_uncached(
    anchor: &str,
    frq: f64,
    set: &TransformationSet,
    model: &dyn ModelAdapter,
) -> Result<WordProbabilityTree> {
    let mut cache: ContextCache = AHashMap::default();

    let mut node_for = |category: Category| -> ProbabilityNode {
        let sequences: Vec<Vec<TokenId>> = set
            .get(category)
            .iter()
            .map(|w| model.encode(w))
            .filter(|seq| !seq.is_empty())
            .collect();
        build_node(anchor, category, sequences, &[], model, &mut cache)
    };

    let tree = WordProbabilityTree {
        anchor: anchor.to_string(),
        frq,
        ana: node_for(Category::Ana),
        ola: node_for(Category::Ola),
        olr: node_for(Category::Olr),
        olx: node_for(Category::Olx),
        prf: node_for(Category::Prf),
        rch: node_for(Category::Rch),
        sln: node_for(Category::Sln),
    };

    for category in Category::ALL {
        validate_node(tree.node(category))?;
    }

    Ok(tree)
}

type BuildOutcome = std::result::Result<Arc<WordProbabilityTree>, String>;

struct BuildSlot {
    done: Mutex<Option<BuildOutcome>>,
    cv: Condvar,
}

/// Coalesces concurrent builds for the same anchor; builds for different
/// anchors proceed independently, each with its own per-build context
/// cache.
pub struct TreeBuilder {
    in_flight: Mutex<AHashMap<String, Arc<BuildSlot>>>,
}

impl TreeBuilder {
    pub fn new() -> Self {
        TreeBuilder {
            in_flight: Mutex::new(AHashMap::default()),
        }
    }

    pub fn build(
        &self,
        anchor: &str,
        frq: f64,
        set: &TransformationSet,
        model: &dyn ModelAdapter,
    ) -> Result<Arc<WordProbabilityTree>> {
        let (slot, is_leader) = {
            let mut map = self.in_flight.lock().unwrap();
            if let Some(existing) = map.get(anchor) {
                (existing.clone(), false)
            } else {
                let slot = Arc::new(BuildSlot {
                    done: Mutex::new(None),
                    cv: Condvar::new(),
                });
                map.insert(anchor.to_string(), slot.clone());
                (slot, true)
            }
        };

        if is_leader {
            tracing::debug!(anchor, "starting tree build");
            let result = build_tree_uncached(anchor, frq, set, model);
            let (outcome, to_return) = match result {
                Ok(tree) => {
                    let arc = Arc::new(tree);
                    (Ok(arc.clone()), Ok(arc))
                }
                Err(e) => (Err(e.to_string()), Err(e)),
            };
            *slot.done.lock().unwrap() = Some(outcome);
            slot.cv.notify_all();
            self.in_flight.lock().unwrap().remove(anchor);
            to_return
        } else {
            tracing::debug!(anchor, "joining in-flight tree build");
            let mut guard = slot.done.lock().unwrap();
            while guard.is_none() {
                guard = slot.cv.wait(guard).unwrap();
            }
            match guard.clone().unwrap() {
                Ok(arc) => Ok(arc),
                Err(msg) => Err(Error::TreeInvalid(msg)),
            }
        }
    }
}

impl Default for TreeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
