use crate::data::Value;
use serde::{Deserialize, Serialize};

/// Comparison applied by a binary split test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestKind {
    /// Numeric threshold test, rows with `value < threshold` go left.
    Less,
    /// Exact-match test on a symbol value, matching rows go left.
    Equal,
}

/// A node of a binary decision tree.
///
/// A leaf normally carries a single label; it carries more than one
/// only when no separating split remained for the rows it covers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SplitNode {
    /// Terminal node holding the remaining target labels.
    Leaf {
        /// Remaining distinct target labels, first-seen order.
        labels: Vec<String>,
    },
    /// A binary test with two subtrees.
    Internal {
        /// Column the test reads.
        attribute: String,
        /// Comparison kind of the test.
        test: TestKind,
        /// Threshold for numeric tests, matched value for symbol tests.
        value: Value,
        /// Subtree for rows passing the test.
        left: Box<SplitNode>,
        /// Subtree for the remaining rows.
        right: Box<SplitNode>,
    },
}

impl SplitNode {
    /// Whether this node is terminal.
    pub fn is_leaf(&self) -> bool {
        matches!(self, SplitNode::Leaf { .. })
    }

    /// Number of edges on the longest path below this node.
    pub fn depth(&self) -> usize {
        match self {
            SplitNode::Leaf { .. } => 0,
            SplitNode::Internal { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }

    /// Number of leaves below (and including) this node.
    pub fn n_leaves(&self) -> usize {
        match self {
            SplitNode::Leaf { .. } => 1,
            SplitNode::Internal { left, right, .. } => left.n_leaves() + right.n_leaves(),
        }
    }
}

/// A node of a multi-way decision tree: one child per distinct value
/// of the branching attribute, in first-seen value order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BranchNode {
    /// Terminal node holding the remaining target labels.
    Leaf {
        /// Remaining distinct target labels, first-seen order.
        labels: Vec<String>,
    },
    /// A multi-way branch on one attribute.
    Branch {
        /// Column the branch reads.
        attribute: String,
        /// One `(value, subtree)` pair per distinct attribute value.
        children: Vec<(Value, BranchNode)>,
    },
}

impl BranchNode {
    /// Whether this node is terminal.
    pub fn is_leaf(&self) -> bool {
        matches!(self, BranchNode::Leaf { .. })
    }

    /// Every attribute used by at least one branch below this node,
    /// in depth-first encounter order, without duplicates.
    pub fn used_attributes(&self) -> Vec<String> {
        let mut used = Vec::new();
        self.collect_attributes(&mut used);
        used
    }

    fn collect_attributes(&self, used: &mut Vec<String>) {
        if let BranchNode::Branch { attribute, children } = self {
            if !used.iter().any(|u| u == attribute) {
                used.push(attribute.clone());
            }
            for (_, child) in children {
                child.collect_attributes(used);
            }
        }
    }
}
