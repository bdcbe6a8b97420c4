//! Helpers for building delay graphs in tests.

use crate::delay_graph::{DelayEdge, DelayGraph, DelayNode, NodeType};
use petgraph::graph::{EdgeIndex, NodeIndex};

/// A plain non-terminal vertex with zero costs.
pub fn node(vertex_id: i64) -> DelayNode {
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

/// A vertex with the given costs (throughput, latency, register).
pub fn costed_node(vertex_id: i64, costs: (u64, u64, u64)) -> DelayNode {
    let mut n = node(vertex_id);
    n.throughput_cost = costs.0;
    n.latency_cost = costs.1;
    n.register_cost = costs.2;
    n
}

pub fn forward(g: &mut DelayGraph, a: NodeIndex, b: NodeIndex, delay: u64) -> EdgeIndex {
    g.add_edge(
        a,
        b,
        DelayEdge {
            delay,
            is_feedback: false,
        },
    )
}

pub fn feedback(g: &mut DelayGraph, a: NodeIndex, b: NodeIndex, delay: u64) -> EdgeIndex {
    g.add_edge(
        a,
        b,
        DelayEdge {
            delay,
            is_feedback: true,
        },
    )
}

/// A linear chain `v0 -> v1 -> ...` with the given forward edge delays.
pub fn chain(delays: &[u64]) -> (DelayGraph, Vec<NodeIndex>) {
    let mut g = DelayGraph::new();
    let nodes: Vec<NodeIndex> = (0..=delays.len())
        .map(|i| g.add_node(node(i as i64)))
        .collect();
    for (i, &d) in delays.iter().enumerate() {
        forward(&mut g, nodes[i], nodes[i + 1], d);
    }
    (g, nodes)
}
