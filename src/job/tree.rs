//! # Hierarchical results.
//!
//! A [`ResultTree`] mirrors the chain structure: a job's own results plus
//! one subtree per chained job, in attachment order.
//!
//! ```text
//! square {1,4,9}
//!   ├── negate {-1,-4,-9}
//!   └── halve  {0.5,2,4.5}
//!         └── ...
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Results of one job and, recursively, of its chained jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultTree {
    /// Job name.
    pub name: String,
    /// Produced values, in delivery order.
    pub results: Vec<Value>,
    /// Subtrees of chained jobs, in attachment order.
    pub chains: Vec<ResultTree>,
}

impl ResultTree {
    pub fn new(name: impl Into<String>, results: Vec<Value>, chains: Vec<ResultTree>) -> Self {
        Self {
            name: name.into(),
            results,
            chains,
        }
    }

    /// A tree without chained jobs.
    pub fn leaf(name: impl Into<String>, results: Vec<Value>) -> Self {
        Self::new(name, results, Vec::new())
    }

    /// Depth-first, pre-order walk yielding `(depth, node)`; the root has depth 0.
    pub fn walk(&self) -> Walk<'_> {
        Walk {
            stack: vec![(0, self)],
        }
    }

    /// First node (pre-order) named `name`.
    pub fn find(&self, name: &str) -> Option<&ResultTree> {
        self.walk().map(|(_, node)| node).find(|node| node.name == name)
    }

    /// Number of values across the whole tree.
    pub fn total_results(&self) -> usize {
        self.walk().map(|(_, node)| node.results.len()).sum()
    }

    /// Depth of the deepest chain (a leaf has depth 0).
    pub fn depth(&self) -> usize {
        self.walk().map(|(d, _)| d).max().unwrap_or(0)
    }
}

/// Iterator returned by [`ResultTree::walk`].
pub struct Walk<'a> {
    stack: Vec<(usize, &'a ResultTree)>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = (usize, &'a ResultTree);

    fn next(&mut self) -> Option<Self::Item> {
        let (depth, node) = self.stack.pop()?;
        self.stack
            .extend(node.chains.iter().rev().map(|child| (depth + 1, child)));
        Some((depth, node))
    }
}
