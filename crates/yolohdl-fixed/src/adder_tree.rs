//! Adder trees with arbitrary fan-in
//!
//! A tree is described as a list of stages. Each stage holds one node per
//! output lane, and each node either sums two lanes of the previous stage or
//! passes one lane through unchanged. Unmatched leaves are always passed
//! through, so every leaf contributes exactly once to the root.
//!
//! Two pairing shapes are used by the datapath:
//! - `Balanced`: adjacent lanes are paired (`2k`, `2k+1`), the odd lane
//!   passes through. Used inside the multiplier and convolution units.
//! - `Mirrored`: the first stage pairs lane `i` with `k-1-i` where `k` is the
//!   fan-in rounded up to a power of two, then every later stage pairs
//!   `i` with `len-1-i`. Used for the channel accumulation.

use serde::{Deserialize, Serialize};

/// Pairing strategy of an adder tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TreeShape {
    Balanced,
    Mirrored,
}

/// One lane of a tree stage, indexing lanes of the previous stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TreeNode {
    Sum(usize, usize),
    Pass(usize),
}

/// Precomputed structure of an adder tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdderTree {
    shape: TreeShape,
    leaves: usize,
    stages: Vec<Vec<TreeNode>>,
}

impl AdderTree {
    pub fn new(shape: TreeShape, leaves: usize) -> Self {
        let stages = match shape {
            TreeShape::Balanced => balanced_stages(leaves),
            TreeShape::Mirrored => mirrored_stages(leaves),
        };
        Self {
            shape,
            leaves,
            stages,
        }
    }

    pub fn balanced(leaves: usize) -> Self {
        Self::new(TreeShape::Balanced, leaves)
    }

    pub fn mirrored(leaves: usize) -> Self {
        Self::new(TreeShape::Mirrored, leaves)
    }

    pub fn shape(&self) -> TreeShape {
        self.shape
    }

    pub fn leaves(&self) -> usize {
        self.leaves
    }

    /// Number of adder levels between the leaves and the root
    pub fn depth(&self) -> usize {
        self.stages.len()
    }

    pub fn stages(&self) -> &[Vec<TreeNode>] {
        &self.stages
    }

    /// Number of two-input adders in the tree
    pub fn adder_count(&self) -> usize {
        self.stages
            .iter()
            .flatten()
            .filter(|node| matches!(node, TreeNode::Sum(..)))
            .count()
    }

    /// Fold `leaves` through the tree with an arbitrary combining function
    ///
    /// Returns `None` when the leaf count does not match the tree or the tree
    /// has no leaves.
    pub fn reduce_with<T, F>(&self, leaves: &[T], mut add: F) -> Option<T>
    where
        T: Clone,
        F: FnMut(&T, &T) -> T,
    {
        if leaves.len() != self.leaves || self.leaves == 0 {
            return None;
        }

        let mut lanes = leaves.to_vec();
        for stage in &self.stages {
            lanes = stage
                .iter()
                .map(|node| match *node {
                    TreeNode::Sum(a, b) => add(&lanes[a], &lanes[b]),
                    TreeNode::Pass(a) => lanes[a].clone(),
                })
                .collect();
        }
        lanes.into_iter().next()
    }

    /// Exact integer sum of `leaves` through the tree
    pub fn sum(&self, leaves: &[i64]) -> Option<i64> {
        self.reduce_with(leaves, |a, b| a + b)
    }
}

fn balanced_stages(leaves: usize) -> Vec<Vec<TreeNode>> {
    let mut stages = Vec::new();
    let mut len = leaves;
    while len > 1 {
        let mut stage: Vec<TreeNode> = (0..len / 2)
            .map(|k| TreeNode::Sum(2 * k, 2 * k + 1))
            .collect();
        if len % 2 == 1 {
            stage.push(TreeNode::Pass(len - 1));
        }
        len = stage.len();
        stages.push(stage);
    }
    stages
}

fn mirrored_stages(leaves: usize) -> Vec<Vec<TreeNode>> {
    let mut stages = Vec::new();
    if leaves <= 1 {
        return stages;
    }

    let span = leaves.next_power_of_two();
    let half = span / 2;
    let first = (0..half)
        .map(|i| {
            let mirror = span - 1 - i;
            if mirror < leaves {
                TreeNode::Sum(i, mirror)
            } else {
                TreeNode::Pass(i)
            }
        })
        .collect();
    stages.push(first);

    let mut len = half;
    while len > 1 {
        stages.push((0..len / 2).map(|i| TreeNode::Sum(i, len - 1 - i)).collect());
        len /= 2;
    }
    stages
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Count how often each leaf reaches the root
    fn leaf_multiplicity(tree: &AdderTree) -> Vec<usize> {
        let leaves: Vec<Vec<usize>> = (0..tree.leaves()).map(|i| vec![i]).collect();
        let root = tree
            .reduce_with(&leaves, |a, b| a.iter().chain(b.iter()).copied().collect())
            .unwrap();
        let mut counts = vec![0; tree.leaves()];
        for leaf in root {
            counts[leaf] += 1;
        }
        counts
    }

    #[test]
    fn test_mirrored_tree_counts_every_channel_once() {
        for channels in [1usize, 2, 3, 4, 5, 8, 9, 16, 32, 64] {
            let tree = AdderTree::mirrored(channels);
            assert_eq!(leaf_multiplicity(&tree), vec![1; channels], "channels={channels}");

            let markers: Vec<i64> = (0..channels as i64).map(|i| 1000 + 7 * i).collect();
            assert_eq!(tree.sum(&markers), Some(markers.iter().sum()));
        }
    }

    #[test]
    fn test_balanced_tree_counts_every_leaf_once() {
        for leaves in 1..=40 {
            let tree = AdderTree::balanced(leaves);
            assert_eq!(leaf_multiplicity(&tree), vec![1; leaves]);
            assert_eq!(tree.adder_count(), leaves - 1);
        }
    }

    #[test]
    fn test_tree_depths() {
        assert_eq!(AdderTree::balanced(1).depth(), 0);
        assert_eq!(AdderTree::balanced(9).depth(), 4);
        assert_eq!(AdderTree::balanced(15).depth(), 4);
        assert_eq!(AdderTree::mirrored(1).depth(), 0);
        assert_eq!(AdderTree::mirrored(3).depth(), 2);
        assert_eq!(AdderTree::mirrored(64).depth(), 6);
    }

    #[test]
    fn test_mirrored_first_stage_pairing() {
        let tree = AdderTree::mirrored(5);
        assert_eq!(
            tree.stages()[0],
            vec![
                TreeNode::Pass(0),
                TreeNode::Pass(1),
                TreeNode::Pass(2),
                TreeNode::Sum(3, 4),
            ]
        );
    }

    #[test]
    fn test_leaf_count_mismatch() {
        let tree = AdderTree::balanced(4);
        assert_eq!(tree.sum(&[1, 2, 3]), None);
        assert_eq!(AdderTree::balanced(0).sum(&[]), None);
    }
}
