//! Query Evaluator
//!
//! Evaluates a [`QueryNode`] tree against the label bitmaps and the
//! timestamp store, producing a bitmap of matching record ids.
//!
//! # Evaluation
//!
//! ```text
//! AND(l, r)   l ∩ r
//! OR(l, r)    l ∪ r
//! NOT(c)      every id in 0..=max(c) not in c
//! label       copy of the label bitmap (empty if unknown)
//! ID=n        {n}
//! <t  <=t     ids with timestamp before / at or before t
//! >t  >=t     ids with timestamp after / at or after t
//! UNLABELED   universe minus every label
//! EMPTY       universe
//! ```
//!
//! The universe is the set of ids that have a timestamp.

use crate::query::ast::QueryNode;
use crate::query::error::QueryResult;
use crate::query::parser::parse_query;
use crate::storage::{SparseBitmap, SparseLongStore};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Ids matching a query, with how many of them carry each label
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MatchResults {
    /// Matching ids, ascending
    pub ids: Vec<u32>,
    /// Matches per label; labels without matches are left out
    pub counts_per_label: BTreeMap<String, u64>,
}

impl MatchResults {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Evaluates queries over borrowed index state
pub struct QueryEvaluator<'a> {
    labels: &'a HashMap<String, SparseBitmap>,
    timestamps: &'a SparseLongStore,
}

impl<'a> QueryEvaluator<'a> {
    pub fn new(labels: &'a HashMap<String, SparseBitmap>, timestamps: &'a SparseLongStore) -> Self {
        Self { labels, timestamps }
    }

    /// Parse and evaluate `query`
    pub fn matching(&self, query: &str) -> QueryResult<SparseBitmap> {
        let node = parse_query(query)?;
        Ok(self.evaluate(&node))
    }

    /// Parse and evaluate `query`, returning ids and per-label counts
    pub fn find(&self, query: &str) -> QueryResult<MatchResults> {
        let bits = self.matching(query)?;
        Ok(self.results_for(&bits))
    }

    /// Ids of `bits` plus the overlap with every known label
    pub fn results_for(&self, bits: &SparseBitmap) -> MatchResults {
        let counts_per_label = self
            .labels
            .iter()
            .filter_map(|(name, label)| {
                let count = label.count_overlap_with(bits);
                (count > 0).then(|| (name.clone(), count))
            })
            .collect();

        MatchResults {
            ids: bits.get_indices(),
            counts_per_label,
        }
    }

    /// Evaluate a parsed query
    pub fn evaluate(&self, node: &QueryNode) -> SparseBitmap {
        match node {
            QueryNode::And(..) => {
                let operands = node.operands();
                let mut bits = self.evaluate(operands[0]);
                for operand in &operands[1..] {
                    if bits.is_empty() {
                        break;
                    }
                    bits.retain_overlap_with(&self.evaluate(operand));
                }
                bits
            }
            QueryNode::Or(..) => {
                let operands = node.operands();
                let mut bits = self.evaluate(operands[0]);
                for operand in &operands[1..] {
                    bits.join_with(&self.evaluate(operand));
                }
                bits
            }
            QueryNode::Not(child) => {
                let mut bits = self.evaluate(child);
                bits.reverse();
                bits
            }
            QueryNode::Label(name) => self
                .labels
                .get(name)
                .map(SparseBitmap::copy)
                .unwrap_or_default(),
            QueryNode::Id(id) => SparseBitmap::from_indices(&[*id]),
            QueryNode::DateLt(t) => self.timestamps.as_bitmap(i64::MIN, t.saturating_sub(1)),
            QueryNode::DateLte(t) => self.timestamps.as_bitmap(i64::MIN, *t),
            QueryNode::DateGt(t) => self.timestamps.as_bitmap(t.saturating_add(1), i64::MAX),
            QueryNode::DateGte(t) => self.timestamps.as_bitmap(*t, i64::MAX),
            QueryNode::Unlabeled => {
                let mut bits = self.timestamps.all_set();
                for label in self.labels.values() {
                    bits.remove_overlap_with(label);
                }
                bits
            }
            QueryNode::Empty => self.timestamps.all_set(),
        }
    }
}
