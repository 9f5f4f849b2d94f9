//! Element adjacency graph.
//!
//! Both the node set and each neighbor set keep insertion order, so every
//! traversal (and therefore every partition) is reproducible.

use indexmap::{IndexMap, IndexSet};

use crate::types::ElementIndex;

/// Mapping from element to its face neighbors.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AdjacencyGraph {
    nodes: IndexMap<ElementIndex, IndexSet<ElementIndex>>,
}

impl AdjacencyGraph {
    /// Empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Graph with `n` isolated nodes `0..n`.
    pub fn with_nodes(n: usize) -> Self {
        let mut graph = Self::new();
        for el in ElementIndex::iter(n) {
            graph.add_node(el);
        }
        graph
    }

    /// Build from an explicit neighbor list (`neighbors[i]` lists node i's neighbors).
    ///
    /// Edges are inserted in both directions, so the result is symmetric
    /// even if the input lists only one direction.
    pub fn from_neighbor_lists(neighbors: &[Vec<usize>]) -> Self {
        let mut graph = Self::with_nodes(neighbors.len());
        for (a, list) in neighbors.iter().enumerate() {
            for &b in list {
                graph.add_edge(ElementIndex::new(a), ElementIndex::new(b));
            }
        }
        graph
    }

    /// Path graph 0 - 1 - ... - (n-1).
    pub fn path(n: usize) -> Self {
        let mut graph = Self::with_nodes(n);
        for i in 1..n {
            graph.add_edge(ElementIndex::new(i - 1), ElementIndex::new(i));
        }
        graph
    }

    /// Add a node without edges (no-op if present).
    pub fn add_node(&mut self, el: ElementIndex) {
        self.nodes.entry(el).or_default();
    }

    /// Add an undirected edge. Self loops are ignored.
    pub fn add_edge(&mut self, a: ElementIndex, b: ElementIndex) {
        if a == b {
            self.add_node(a);
            return;
        }
        self.nodes.entry(a).or_default().insert(b);
        self.nodes.entry(b).or_default().insert(a);
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True if the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = ElementIndex> + '_ {
        self.nodes.keys().copied()
    }

    /// Neighbors of `el` in insertion order (empty for unknown nodes).
    pub fn neighbors(&self, el: ElementIndex) -> impl Iterator<Item = ElementIndex> + '_ {
        self.nodes.get(&el).into_iter().flat_map(|set| set.iter().copied())
    }

    /// Number of neighbors of `el`.
    pub fn degree(&self, el: ElementIndex) -> usize {
        self.nodes.get(&el).map_or(0, IndexSet::len)
    }

    /// Is `b` a neighbor of `a`?
    pub fn contains_edge(&self, a: ElementIndex, b: ElementIndex) -> bool {
        self.nodes.get(&a).is_some_and(|set| set.contains(&b))
    }

    /// Check the symmetry invariant.
    pub fn is_symmetric(&self) -> bool {
        self.nodes
            .iter()
            .all(|(&a, set)| set.iter().all(|&b| self.contains_edge(b, a)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_graph() {
        let g = AdjacencyGraph::path(4);
        assert_eq!(g.len(), 4);
        assert_eq!(g.degree(ElementIndex::new(0)), 1);
        assert_eq!(g.degree(ElementIndex::new(1)), 2);
        assert!(g.is_symmetric());
    }

    #[test]
    fn test_one_sided_lists_become_symmetric() {
        let g = AdjacencyGraph::from_neighbor_lists(&[vec![1, 2], vec![], vec![]]);
        assert!(g.contains_edge(ElementIndex::new(2), ElementIndex::new(0)));
        assert!(g.is_symmetric());
    }

    #[test]
    fn test_neighbor_order_is_insertion_order() {
        let g = AdjacencyGraph::from_neighbor_lists(&[vec![3, 1, 2], vec![], vec![], vec![]]);
        let n: Vec<usize> = g.neighbors(ElementIndex::new(0)).map(|e| e.get()).collect();
        assert_eq!(n, vec![3, 1, 2]);
    }

    #[test]
    fn test_self_loop_ignored() {
        let mut g = AdjacencyGraph::new();
        g.add_edge(ElementIndex::new(0), ElementIndex::new(0));
        assert_eq!(g.len(), 1);
        assert_eq!(g.degree(ElementIndex::new(0)), 0);
    }
}
