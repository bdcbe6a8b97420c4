//! Delay-graph data model.
//!
//! A [`DelayGraph`] is a directed graph whose vertices are [`DelayNode`]s
//! lowered from a synthesis netlist and whose edges carry combinational
//! propagation delays in picoseconds. Edges marked [`DelayEdge::is_feedback`]
//! close cycles in an otherwise forward DAG; they are excluded from forward
//! traversals but participate in cycle analysis.
//!
//! Vertices and edges enumerate in insertion order. Several downstream
//! algorithms break ties by that order, so the per-vertex edge queries below
//! sort by edge index rather than relying on adjacency-list direction.

pub mod graphml;

use petgraph::{
    graph::{EdgeIndex, NodeIndex},
    prelude::*,
    stable_graph::StableGraph,
    visit::EdgeRef,
};
use std::collections::{hash_map::Entry, HashMap, HashSet};
use std::fmt;

/// Role a vertex plays in the netlist it was lowered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeType {
    FeedbackInput,
    Border,
    LeftShiftRegister,
    RightShiftRegister,
    Other,
    Unknown,
}

impl NodeType {
    /// Map the serialized ordinal to a node type. Out-of-range ordinals are
    /// treated as [`NodeType::Unknown`].
    pub fn from_ordinal(ordinal: i64) -> Self {
        match ordinal {
            0 => NodeType::FeedbackInput,
            1 => NodeType::Border,
            2 => NodeType::LeftShiftRegister,
            3 => NodeType::RightShiftRegister,
            4 => NodeType::Other,
            _ => NodeType::Unknown,
        }
    }
}

/// A vertex of the delay graph.
///
/// The three `*_cost` fields are charged only when the vertex ends up
/// registered in the final solution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelayNode {
    pub vertex_id: i64,
    pub node_type: NodeType,
    /// Vertices sharing a nonnegative `node_unique_id` originate from the
    /// same synthesis node and must be registered together.
    pub node_unique_id: i64,
    pub throughput_cost: u64,
    pub latency_cost: u64,
    pub register_cost: u64,
    /// The vertex already carries a register in the input graph. Immutable.
    pub is_registered: bool,
    pub is_input_terminal: bool,
    pub is_output_terminal: bool,
    /// Inserting a register at this vertex is forbidden.
    pub disallow_register: bool,
}

impl DelayNode {
    pub fn is_terminal(&self) -> bool {
        self.is_input_terminal || self.is_output_terminal
    }
}

impl fmt::Display for DelayNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.vertex_id)
    }
}

/// A directed combinational connection with its propagation delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayEdge {
    /// Propagation delay in picoseconds.
    pub delay: u64,
    pub is_feedback: bool,
}

impl fmt::Display for DelayEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_feedback {
            write!(f, "{}ps (feedback)", self.delay)
        } else {
            write!(f, "{}ps", self.delay)
        }
    }
}

pub type DelayGraph = StableGraph<DelayNode, DelayEdge>;

/// The solver's working state: vertices chosen to carry a register.
pub type RegisteredSet = HashSet<NodeIndex>;

/// A vertex counts as registered if it came in registered or the solver
/// picked it.
pub fn is_effectively_registered(g: &DelayGraph, v: NodeIndex, registered: &RegisteredSet) -> bool {
    g[v].is_registered || registered.contains(&v)
}

fn directed_edges(g: &DelayGraph, v: NodeIndex, dir: Direction) -> Vec<EdgeIndex> {
    let mut edges: Vec<EdgeIndex> = g.edges_directed(v, dir).map(|e| e.id()).collect();
    // edges_directed walks adjacency lists newest-first; index order is
    // insertion order
    edges.sort_unstable();
    edges
}

pub fn in_edges(g: &DelayGraph, v: NodeIndex) -> Vec<EdgeIndex> {
    directed_edges(g, v, Direction::Incoming)
}

pub fn out_edges(g: &DelayGraph, v: NodeIndex) -> Vec<EdgeIndex> {
    directed_edges(g, v, Direction::Outgoing)
}

pub fn forward_in_edges(g: &DelayGraph, v: NodeIndex) -> Vec<EdgeIndex> {
    in_edges(g, v).into_iter().filter(|&e| !g[e].is_feedback).collect()
}

pub fn forward_out_edges(g: &DelayGraph, v: NodeIndex) -> Vec<EdgeIndex> {
    out_edges(g, v).into_iter().filter(|&e| !g[e].is_feedback).collect()
}

pub fn feedback_in_edges(g: &DelayGraph, v: NodeIndex) -> Vec<EdgeIndex> {
    in_edges(g, v).into_iter().filter(|&e| g[e].is_feedback).collect()
}

pub fn feedback_out_edges(g: &DelayGraph, v: NodeIndex) -> Vec<EdgeIndex> {
    out_edges(g, v).into_iter().filter(|&e| g[e].is_feedback).collect()
}

/// Largest single-edge delay in the graph. The target clock period can never
/// be met below this value, so callers use it as a floor.
pub fn max_edge_delay(g: &DelayGraph) -> u64 {
    g.edge_indices().map(|e| g[e].delay).max().unwrap_or(0)
}

/// Collapse parallel edges: for every (source, target) pair keep only the
/// edge with the largest delay. First-inserted wins on equal delay. Returns
/// whether anything was removed.
pub fn prune_parallel_edges(g: &mut DelayGraph) -> bool {
    let mut changed = false;
    let vertices: Vec<NodeIndex> = g.node_indices().collect();
    for v in vertices {
        let mut kept: HashMap<NodeIndex, EdgeIndex> = HashMap::new();
        let mut doomed = Vec::new();
        for e in out_edges(g, v) {
            let (_, target) = g.edge_endpoints(e).unwrap();
            match kept.entry(target) {
                Entry::Vacant(slot) => {
                    slot.insert(e);
                }
                Entry::Occupied(mut slot) => {
                    let best = *slot.get();
                    if g[e].delay > g[best].delay {
                        slot.insert(e);
                        doomed.push(best);
                    } else {
                        doomed.push(e);
                    }
                }
            }
        }
        for e in doomed {
            g.remove_edge(e);
            changed = true;
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_node(vertex_id: i64) -> DelayNode {
        DelayNode {
            vertex_id,
            node_type: NodeType::Other,
            node_unique_id: -1,
            throughput_cost: 0,
            latency_cost: 0,
            register_cost: 0,
            is_registered: false,
            is_input_terminal: false,
            is_output_terminal: false,
            disallow_register: false,
        }
    }

    fn edge(delay: u64) -> DelayEdge {
        DelayEdge {
            delay,
            is_feedback: false,
        }
    }

    fn feedback(delay: u64) -> DelayEdge {
        DelayEdge {
            delay,
            is_feedback: true,
        }
    }

    #[test]
    fn edge_queries_split_forward_and_feedback() {
        let mut g = DelayGraph::new();
        let a = g.add_node(test_node(0));
        let b = g.add_node(test_node(1));
        let e0 = g.add_edge(a, b, edge(10));
        let e1 = g.add_edge(b, a, feedback(20));

        assert_eq!(forward_out_edges(&g, a), vec![e0]);
        assert_eq!(forward_in_edges(&g, b), vec![e0]);
        assert_eq!(feedback_out_edges(&g, b), vec![e1]);
        assert_eq!(feedback_in_edges(&g, a), vec![e1]);
        assert!(forward_in_edges(&g, a).is_empty());
        assert!(feedback_out_edges(&g, a).is_empty());
    }

    #[test]
    fn edge_queries_preserve_insertion_order() {
        let mut g = DelayGraph::new();
        let a = g.add_node(test_node(0));
        let b = g.add_node(test_node(1));
        let c = g.add_node(test_node(2));
        let e0 = g.add_edge(a, b, edge(1));
        let e1 = g.add_edge(a, c, edge(2));
        let e2 = g.add_edge(a, b, edge(3));

        assert_eq!(out_edges(&g, a), vec![e0, e1, e2]);
        assert_eq!(in_edges(&g, b), vec![e0, e2]);
    }

    #[test]
    fn prune_keeps_largest_parallel_delay() {
        let mut g = DelayGraph::new();
        let a = g.add_node(test_node(0));
        let b = g.add_node(test_node(1));
        g.add_edge(a, b, edge(40));
        g.add_edge(a, b, edge(90));

        assert!(prune_parallel_edges(&mut g));
        assert_eq!(g.edge_count(), 1);
        let e = out_edges(&g, a)[0];
        assert_eq!(g[e].delay, 90);
    }

    #[test]
    fn prune_is_idempotent() {
        let mut g = DelayGraph::new();
        let a = g.add_node(test_node(0));
        let b = g.add_node(test_node(1));
        let c = g.add_node(test_node(2));
        g.add_edge(a, b, edge(40));
        g.add_edge(a, b, edge(90));
        g.add_edge(a, c, edge(10));
        g.add_edge(b, c, edge(5));

        assert!(prune_parallel_edges(&mut g));
        assert!(!prune_parallel_edges(&mut g));
        assert_eq!(g.edge_count(), 3);
    }

    #[test]
    fn prune_leaves_distinct_targets_alone() {
        let mut g = DelayGraph::new();
        let a = g.add_node(test_node(0));
        let b = g.add_node(test_node(1));
        let c = g.add_node(test_node(2));
        g.add_edge(a, b, edge(40));
        g.add_edge(a, c, edge(90));

        assert!(!prune_parallel_edges(&mut g));
        assert_eq!(g.edge_count(), 2);
    }

    #[test]
    fn max_edge_delay_scans_all_edges() {
        let mut g = DelayGraph::new();
        let a = g.add_node(test_node(0));
        let b = g.add_node(test_node(1));
        assert_eq!(max_edge_delay(&g), 0);
        g.add_edge(a, b, edge(40));
        g.add_edge(b, a, feedback(120));
        assert_eq!(max_edge_delay(&g), 120);
    }

    #[test]
    fn node_type_ordinals() {
        assert_eq!(NodeType::from_ordinal(0), NodeType::FeedbackInput);
        assert_eq!(NodeType::from_ordinal(3), NodeType::RightShiftRegister);
        assert_eq!(NodeType::from_ordinal(5), NodeType::Unknown);
        assert_eq!(NodeType::from_ordinal(42), NodeType::Unknown);
        assert_eq!(NodeType::from_ordinal(-1), NodeType::Unknown);
    }
}
