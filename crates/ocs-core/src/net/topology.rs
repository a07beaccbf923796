//! Fixed communication tree

use crate::types::NodeIndex;
use crate::{Error, Result};

/// Immutable parent/children index over nodes `0..len`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    parents: Vec<Option<NodeIndex>>,
    children: Vec<Vec<NodeIndex>>,
    heights: Vec<usize>,
    root: NodeIndex,
}

impl Topology {
    /// Build a tree from each node's parent; exactly one node has none.
    pub fn from_parents(parents: Vec<Option<NodeIndex>>) -> Result<Self> {
        let n = parents.len();
        if n == 0 {
            return Err(Error::InvalidConfig("topology needs at least one node".into()));
        }

        let roots: Vec<NodeIndex> = (0..n).filter(|&i| parents[i].is_none()).collect();
        let root = match roots.as_slice() {
            [root] => *root,
            _ => {
                return Err(Error::InvalidConfig(format!(
                    "topology needs exactly one root, found {}",
                    roots.len()
                )))
            }
        };

        let mut children = vec![Vec::new(); n];
        for (node, parent) in parents.iter().enumerate() {
            if let Some(parent) = *parent {
                if parent >= n || parent == node {
                    return Err(Error::InvalidConfig(format!(
                        "node {} has invalid parent {}",
                        node, parent
                    )));
                }
                children[parent].push(node);
            }
        }

        // Depth by walking to the root; a walk longer than n is a cycle
        let mut depths = vec![0usize; n];
        for (node, depth) in depths.iter_mut().enumerate() {
            let mut current = node;
            while let Some(parent) = parents[current] {
                *depth += 1;
                if *depth >= n {
                    return Err(Error::InvalidConfig(format!(
                        "node {} is part of a cycle",
                        node
                    )));
                }
                current = parent;
            }
        }

        let mut order: Vec<NodeIndex> = (0..n).collect();
        order.sort_by(|a, b| depths[*b].cmp(&depths[*a]));
        let mut heights = vec![0usize; n];
        for node in order {
            heights[node] = children[node]
                .iter()
                .map(|&child| heights[child] + 1)
                .max()
                .unwrap_or(0);
        }

        Ok(Self {
            parents,
            children,
            heights,
            root,
        })
    }

    /// Node 0 is the root and every other node is its direct child
    pub fn star(n: usize) -> Result<Self> {
        Self::with_branching(n, n.saturating_sub(1).max(1))
    }

    /// Complete tree rooted at 0 where each node has up to `branching` children
    pub fn with_branching(n: usize, branching: usize) -> Result<Self> {
        if branching == 0 {
            return Err(Error::InvalidConfig("branching factor must be at least 1".into()));
        }
        let parents = (0..n)
            .map(|i| if i == 0 { None } else { Some((i - 1) / branching) })
            .collect();
        Self::from_parents(parents)
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.parents.len()
    }

    /// Always false for a validated topology
    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }

    /// Root node
    pub fn root(&self) -> NodeIndex {
        self.root
    }

    /// Parent of `node`, `None` for the root or unknown nodes
    pub fn parent(&self, node: NodeIndex) -> Option<NodeIndex> {
        self.parents.get(node).copied().flatten()
    }

    /// Direct children of `node`
    pub fn children(&self, node: NodeIndex) -> &[NodeIndex] {
        self.children.get(node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Length of the longest path from `node` down to a leaf
    pub fn height(&self, node: NodeIndex) -> usize {
        self.heights.get(node).copied().unwrap_or(0)
    }

    pub fn contains(&self, node: NodeIndex) -> bool {
        node < self.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_star() {
        let topology = Topology::star(4).unwrap();
        assert_eq!(topology.root(), 0);
        assert_eq!(topology.children(0), &[1, 2, 3]);
        assert_eq!(topology.parent(3), Some(0));
        assert_eq!(topology.height(0), 1);
        assert_eq!(topology.height(2), 0);
    }

    #[test]
    fn test_single_node() {
        let topology = Topology::star(1).unwrap();
        assert_eq!(topology.len(), 1);
        assert!(topology.children(0).is_empty());
        assert_eq!(topology.height(0), 0);
    }

    #[test]
    fn test_binary_tree() {
        let topology = Topology::with_branching(7, 2).unwrap();
        assert_eq!(topology.children(0), &[1, 2]);
        assert_eq!(topology.children(1), &[3, 4]);
        assert_eq!(topology.children(2), &[5, 6]);
        assert_eq!(topology.parent(6), Some(2));
        assert_eq!(topology.height(0), 2);
        assert_eq!(topology.height(1), 1);
    }

    #[test]
    fn test_non_zero_root() {
        let topology = Topology::from_parents(vec![Some(2), Some(2), None]).unwrap();
        assert_eq!(topology.root(), 2);
        assert_eq!(topology.children(2), &[0, 1]);
    }

    #[test]
    fn test_invalid_topologies() {
        assert!(Topology::from_parents(vec![]).is_err());
        assert!(Topology::from_parents(vec![None, None]).is_err());
        assert!(Topology::from_parents(vec![None, Some(5)]).is_err());
        assert!(Topology::from_parents(vec![None, Some(1)]).is_err());
        assert!(Topology::from_parents(vec![None, Some(2), Some(1)]).is_err());
        assert!(Topology::with_branching(3, 0).is_err());
    }
}
