use std::collections::VecDeque;

use petgraph::{Graph, graph::NodeIndex, visit::EdgeRef};
use rustc_hash::FxHashSet as HashSet;

use crate::{EdgeType, Vertex};

/// Check whether any path leads from `from` to `to`, by breadth-first
/// search.
///
/// `visit` is called once for each node other than `from` that the search
/// discovers, whether or not a path is found, so that callers can keep the
/// reachability information that the search uncovers.
pub fn path_exists<N, E>(
    graph: &Graph<N, E>,
    from: NodeIndex,
    to: NodeIndex,
    mut visit: impl FnMut(NodeIndex),
) -> bool {
    let mut discovered = HashSet::default();
    discovered.insert(from);

    let mut queue = VecDeque::from([from]);

    while let Some(current) = queue.pop_front() {
        for next in graph.neighbors(current) {
            if discovered.insert(next) {
                visit(next);

                if next == to {
                    return true;
                }

                queue.push_back(next);
            }
        }
    }

    false
}

/// The targets of a node's outgoing edges, in the order that the edges were
/// added to the graph.
///
/// Petgraph iterates a node's edges most-recently-added first, but results
/// should stay stable as rules add edges, so the order is flipped back.
pub fn edge_targets<N, E>(graph: &Graph<N, E>, node: NodeIndex) -> Vec<NodeIndex> {
    let mut targets: Vec<_> = graph.edges(node).map(|e| e.target()).collect();
    targets.reverse();

    targets
}

/// Search the graph for a cycle, returning the vertices of the first one
/// found, or `None` if the graph is acyclic.
///
/// Each vertex in the returned cycle carries the type of its edge to the
/// next vertex, with the last vertex's edge leading back to the first, so
/// that the report names the rule behind every step of the cycle.
pub fn find_cycle<N>(
    graph: &Graph<N, EdgeType>,
    mut node_name: impl FnMut(&N) -> String,
) -> Option<Vec<Vertex>> {
    let mut visited = HashSet::default();

    for start in graph.node_indices() {
        if !visited.insert(start) {
            continue;
        }

        // Depth-first, keeping the path from `start` to the current node on
        // a stack. An edge that leads back to a node on the path closes a
        // cycle, which can then be read straight off the stack.
        let mut path = vec![PathFrame::new(graph, start)];
        let mut on_path = HashSet::default();
        on_path.insert(start);

        while let Some(frame) = path.last_mut() {
            let Some(target) = frame.next_edge_target() else {
                on_path.remove(&frame.node);
                path.pop();
                continue;
            };

            if on_path.contains(&target) {
                return Some(cycle_from_path(graph, &path, target, &mut node_name));
            }

            if visited.insert(target) {
                on_path.insert(target);
                path.push(PathFrame::new(graph, target));
            }
        }
    }

    None
}

// A node on the search path and its outgoing edges in insertion order.
// edges[cursor - 1] is the edge that the search is currently exploring.
struct PathFrame {
    node: NodeIndex,
    edges: Vec<(NodeIndex, EdgeType)>,
    cursor: usize,
}

impl PathFrame {
    fn new<N>(graph: &Graph<N, EdgeType>, node: NodeIndex) -> Self {
        let mut edges: Vec<_> = graph
            .edges(node)
            .map(|e| (e.target(), *e.weight()))
            .collect();
        edges.reverse();

        Self {
            node,
            edges,
            cursor: 0,
        }
    }

    fn next_edge_target(&mut self) -> Option<NodeIndex> {
        let target = self.edges.get(self.cursor).map(|e| e.0);
        if target.is_some() {
            self.cursor += 1;
        }

        target
    }

    fn current_edge_type(&self) -> Option<EdgeType> {
        self.cursor
            .checked_sub(1)
            .and_then(|i| self.edges.get(i))
            .map(|e| e.1)
    }
}

fn cycle_from_path<N>(
    graph: &Graph<N, EdgeType>,
    path: &[PathFrame],
    repeated: NodeIndex,
    node_name: &mut impl FnMut(&N) -> String,
) -> Vec<Vertex> {
    // Everything before the repeated node leads into the cycle without being
    // part of it.
    let first = path.iter().position(|f| f.node == repeated).unwrap_or(0);

    path.get(first..)
        .unwrap_or_default()
        .iter()
        .filter_map(|frame| {
            frame.current_edge_type().map(|edge_type| {
                Vertex::new(node_name(&graph[frame.node])).with_out_edge_type(edge_type)
            })
        })
        .collect()
}
