//! Join order that avoids cross joins while staying close to the written order.

use crate::join_graph::JoinGraph;
use std::collections::BTreeSet;

/// Order in which to join the nodes of `graph`.
///
/// If every node of the written order is connected to some earlier node, that order
/// is kept. Otherwise nodes are visited greedily: the next node is the lowest
/// unvisited node connected to any visited node, and when none is connected the
/// lowest unvisited node starts a new component. A cross join is produced only
/// where the graph is genuinely disconnected.
pub fn get_join_order(graph: &JoinGraph) -> Vec<usize> {
    solve(&graph.adjacency())
}

/// Whether `order` is the identity permutation.
pub fn is_original_order(order: &[usize]) -> bool {
    order.iter().enumerate().all(|(position, &node)| position == node)
}

/// Same as [`get_join_order`], for a graph given as neighbor sets.
pub fn solve(adjacency: &[BTreeSet<usize>]) -> Vec<usize> {
    let size = adjacency.len();
    if is_prefix_connected(adjacency) {
        return (0..size).collect();
    }

    let mut visited = vec![false; size];
    let mut frontier: BTreeSet<usize> = BTreeSet::new();
    let mut order = Vec::with_capacity(size);
    while order.len() < size {
        let next = match frontier.pop_first() {
            Some(node) => node,
            None => match visited.iter().position(|v| !v) {
                Some(node) => node,
                None => break,
            },
        };
        visited[next] = true;
        order.push(next);
        frontier.extend(adjacency[next].iter().copied().filter(|&n| !visited[n]));
    }
    debug_assert_eq!(order.len(), size);
    order
}

/// Whether each node after the first has a neighbor among the nodes before it.
fn is_prefix_connected(adjacency: &[BTreeSet<usize>]) -> bool {
    adjacency
        .iter()
        .enumerate()
        .skip(1)
        .all(|(node, neighbors)| neighbors.iter().any(|&n| n < node))
}
