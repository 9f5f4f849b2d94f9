//! Greedy breadth-first clustering of elements into blocks.
//!
//! Each block grows from a seed through a frontier queue. At every step the
//! frontier element with the most edges into the growing block joins it
//! (earliest queue entry wins ties). When the frontier runs dry before the
//! block is full, growth reseeds from the first unassigned element and keeps
//! filling the same block.
//!
//! All containers keep insertion order, so the result depends only on the
//! graph and `max_block_size`.

use indexmap::IndexSet;
use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::mesh::AdjacencyGraph;
use crate::types::{BlockIndex, ElementIndex};

/// Element-to-block assignment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Partition {
    /// Block of each element, indexed by element.
    pub assignment: Vec<BlockIndex>,
    /// Elements of each block, in the order they joined it.
    pub blocks: Vec<Vec<ElementIndex>>,
}

impl Partition {
    /// Number of blocks.
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Block holding `el`.
    pub fn block_of(&self, el: ElementIndex) -> BlockIndex {
        self.assignment[el]
    }

    /// Size of the largest block.
    pub fn max_block_len(&self) -> usize {
        self.blocks.iter().map(Vec::len).max().unwrap_or(0)
    }
}

/// Partition `graph` into blocks of at most `max_block_size` elements.
pub fn partition_greedy(
    graph: &AdjacencyGraph,
    max_block_size: usize,
) -> Result<Partition, ConfigError> {
    if max_block_size == 0 {
        return Err(ConfigError::ZeroBlockSize);
    }

    let mut avail: IndexSet<ElementIndex> = graph.nodes().collect();
    let mut assignment = vec![BlockIndex::ZERO; graph.len()];
    let mut blocks: Vec<Vec<ElementIndex>> = Vec::new();
    let mut next_seed: Option<ElementIndex> = None;

    while !avail.is_empty() {
        let seed = match next_seed.take() {
            Some(seed) => seed,
            None => max_degree_node(graph, &avail),
        };

        let (block, leftover) = grow_block(graph, &mut avail, seed, max_block_size);
        let number = BlockIndex::new(blocks.len());
        for &el in &block {
            if el.get() >= assignment.len() {
                assignment.resize(el.get() + 1, BlockIndex::ZERO);
            }
            assignment[el] = number;
        }
        trace!(block = %number, size = block.len(), "emitted block");
        blocks.push(block.into_iter().collect());
        next_seed = leftover;
    }

    debug!(
        elements = graph.len(),
        blocks = blocks.len(),
        max_block_size,
        "greedy partition done"
    );

    Ok(Partition { assignment, blocks })
}

/// First available node of maximum degree.
fn max_degree_node(graph: &AdjacencyGraph, avail: &IndexSet<ElementIndex>) -> ElementIndex {
    let mut best = avail[0];
    let mut best_degree = graph.degree(best);
    for &node in avail.iter().skip(1) {
        let degree = graph.degree(node);
        if degree > best_degree {
            best = node;
            best_degree = degree;
        }
    }
    best
}

/// Grow one block from `seed`. Returns the block and, if the block filled
/// up, the first frontier node that is still unassigned.
fn grow_block(
    graph: &AdjacencyGraph,
    avail: &mut IndexSet<ElementIndex>,
    seed: ElementIndex,
    max_block_size: usize,
) -> (IndexSet<ElementIndex>, Option<ElementIndex>) {
    let mut queue = vec![seed];
    let mut result: IndexSet<ElementIndex> = IndexSet::new();

    loop {
        if let Some(idx) = most_connected(graph, &queue, &result) {
            let current = queue.remove(idx);

            if avail.shift_remove(&current) {
                result.insert(current);
                if result.len() == max_block_size {
                    let leftover = queue.iter().copied().find(|n| avail.contains(n));
                    return (result, leftover);
                }
                queue.extend(graph.neighbors(current).filter(|n| avail.contains(n)));
            }
        }

        if queue.is_empty() {
            // Ran out of nodes in the immediate vicinity; continue elsewhere.
            match avail.first() {
                Some(&node) => queue.push(node),
                None => return (result, None),
            }
        }
    }
}

/// Queue position of the node with most edges into `result`; first wins ties.
fn most_connected(
    graph: &AdjacencyGraph,
    queue: &[ElementIndex],
    result: &IndexSet<ElementIndex>,
) -> Option<usize> {
    let mut best: Option<(usize, usize)> = None;
    for (i, &node) in queue.iter().enumerate() {
        let connections = graph.neighbors(node).filter(|n| result.contains(n)).count();
        match best {
            Some((_, c)) if connections <= c => {}
            _ => best = Some((i, connections)),
        }
    }
    best.map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check_partition(graph: &AdjacencyGraph, p: &Partition, max: usize) {
        let mut seen = vec![0usize; graph.len()];
        for (b, block) in p.blocks.iter().enumerate() {
            assert!(!block.is_empty());
            assert!(block.len() <= max);
            for &el in block {
                seen[el.get()] += 1;
                assert_eq!(p.assignment[el], BlockIndex::new(b));
            }
        }
        assert!(seen.iter().all(|&n| n == 1));
    }

    #[test]
    fn test_path_of_six() {
        let graph = AdjacencyGraph::path(6);
        let p = partition_greedy(&graph, 3).unwrap();
        assert_eq!(p.block_count(), 2);
        check_partition(&graph, &p, 3);

        let mut first: Vec<usize> = p.blocks[0].iter().map(|e| e.get()).collect();
        first.sort_unstable();
        assert_eq!(first, vec![0, 1, 2]);
    }

    #[test]
    fn test_isolated_nodes_form_blocks() {
        let graph = AdjacencyGraph::with_nodes(5);
        let p = partition_greedy(&graph, 2).unwrap();
        check_partition(&graph, &p, 2);
        assert_eq!(p.block_count(), 3);
    }

    #[test]
    fn test_reseed_fills_same_block() {
        // two disconnected pairs fit one block of four
        let graph = AdjacencyGraph::from_neighbor_lists(&[vec![1], vec![], vec![3], vec![]]);
        let p = partition_greedy(&graph, 4).unwrap();
        assert_eq!(p.block_count(), 1);
        check_partition(&graph, &p, 4);
    }

    #[test]
    fn test_zero_block_size() {
        let graph = AdjacencyGraph::path(3);
        assert_eq!(
            partition_greedy(&graph, 0).unwrap_err(),
            ConfigError::ZeroBlockSize
        );
    }

    #[test]
    fn test_deterministic() {
        let lists: Vec<Vec<usize>> = (0..20)
            .map(|i| vec![(i + 1) % 20, (i + 7) % 20, (i * 3) % 20])
            .collect();
        let graph = AdjacencyGraph::from_neighbor_lists(&lists);
        let a = partition_greedy(&graph, 4).unwrap();
        let b = partition_greedy(&graph, 4).unwrap();
        assert_eq!(a, b);
        check_partition(&graph, &a, 4);
    }
}
