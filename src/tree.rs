//! Probability Tree (C5): the sparse, depth-nested conditional-probability
//! structure built per (anchor, category).

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::model::TokenId;
use crate::transform::{Category, MainCategory};

/// Metadata captured for a node, all from *before* local renormalisation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodeMeta {
    /// Raw max probability returned by the model over the full vocabulary
    /// at this prefix.
    pub org_max: f32,
    /// Sum of raw model probabilities over the restricted valid token set
    /// at this prefix, captured before renormalisation to sum 1.
    pub val_prb_sum: f32,
    /// Maximum remaining sequence length under this node.
    pub max_dep: u32,
}

impl NodeMeta {
    pub fn zero() -> Self {
        NodeMeta {
            org_max: 0.0,
            val_prb_sum: 0.0,
            max_dep: 0,
        }
    }
}

/// A sparse mapping entry: either a terminal probability, or a branch that
/// continues into a child node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ProbEntry {
    Terminal(f32),
    Branch { p: f32, child: Box<ProbabilityNode> },
}

impl ProbEntry {
    pub fn probability(&self) -> f32 {
        match self {
            ProbEntry::Terminal(p) => *p,
            ProbEntry::Branch { p, .. } => *p,
        }
    }
}

/// One node of the tree at some prefix depth for one (anchor, category)
/// pair. An empty category is represented by `ProbabilityNode::empty()`
/// (spec's "empty sentinel"), never by a node with meaningless metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbabilityNode {
    /// `true` for the empty-category sentinel: no model call was made to
    /// build this node and `prb` is always empty.
    pub is_empty: bool,
    pub prb: AHashMap<TokenId, ProbEntry>,
    pub meta: NodeMeta,
}

impl ProbabilityNode {
    pub fn empty() -> Self {
        ProbabilityNode {
            is_empty: true,
            prb: AHashMap::default(),
            meta: NodeMeta::zero(),
        }
    }

    pub fn new(prb: AHashMap<TokenId, ProbEntry>, meta: NodeMeta) -> Self {
        ProbabilityNode {
            is_empty: false,
            prb,
            meta,
        }
    }

    /// Sum of stored probabilities at this node (should be 1 ± 1e-3 for a
    /// non-empty, validated node).
    pub fn local_sum(&self) -> f64 {
        self.prb.values().map(|e| e.probability() as f64).sum()
    }
}

/// `{frq, ana, olo: {ola, olr, olx}, rhy: {prf, rch, sln}}`, spec §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WordProbabilityTree {
    pub anchor: String,
    pub frq: f64,
    pub ana: ProbabilityNode,
    pub ola: ProbabilityNode,
    pub olr: ProbabilityNode,
    pub olx: ProbabilityNode,
    pub prf: ProbabilityNode,
    pub rch: ProbabilityNode,
    pub sln: ProbabilityNode,
}

impl WordProbabilityTree {
    pub fn node(&self, category: Category) -> &ProbabilityNode {
        match category {
            Category::Ana => &self.ana,
            Category::Ola => &self.ola,
            Category::Olr => &self.olr,
            Category::Olx => &self.olx,
            Category::Prf => &self.prf,
            Category::Rch => &self.rch,
            Category::Sln => &self.sln,
        }
    }

    /// Root node for a main category grouping; spec §4.7's "main" key
    /// selector only distinguishes ana/olo/rhy, but since each subcategory
    /// has its own independently-built node, `node(category)` above is
    /// what traversal actually uses. This accessor exists to mirror the
    /// `{main, sub}` addressing scheme spec §4.7 describes.
    pub fn main_categories(&self, main: MainCategory) -> Vec<Category> {
        match main {
            MainCategory::Ana => vec![Category::Ana],
            MainCategory::Olo => vec![Category::Ola, Category::Olr, Category::Olx],
            MainCategory::Rhy => vec![Category::Prf, Category::Rch, Category::Sln],
        }
    }
}

/// Walk every node transitively and invoke `f` with each one. Used by
/// validation and by round-trip equality checks.
pub fn visit_nodes<'a>(node: &'a ProbabilityNode, f: &mut impl FnMut(&'a ProbabilityNode)) {
    f(node);
    for entry in node.prb.values() {
        if let ProbEntry::Branch { child, .. } = entry {
            visit_nodes(child, f);
        }
    }
}
