//! Clock-period estimation.
//!
//! The achieved period of a solution is the longest combinational delay
//! between register boundaries, where graph inputs and outputs count as
//! implicit boundaries. The walk goes downstream over all edges, feedback
//! included, since a feedback connection is as combinational as any other.
//! It stops at effectively-registered vertices, charging the crossing edge
//! but descending no further.

use crate::algo::VisitState;
use crate::delay_graph::{
    in_edges, is_effectively_registered, out_edges, DelayGraph, RegisteredSet,
};
use petgraph::graph::{EdgeIndex, NodeIndex};
use std::collections::HashMap;

/// Longest combinational delay between registers, and whether an
/// unregistered cycle was met along the way.
///
/// Roots are the effectively-registered vertices and the graph sources; a
/// second sweep covers anything those roots cannot reach (purely cyclic
/// subgraphs). Per-vertex results are memoized across roots, so each vertex
/// is expanded once.
pub fn estimate_period(g: &DelayGraph, registered: &RegisteredSet) -> (u64, bool) {
    let mut computed_delays: HashMap<NodeIndex, u64> = HashMap::new();
    let mut visit_state: HashMap<NodeIndex, VisitState> = HashMap::new();
    let mut found_cycle = false;
    let mut max_period = 0u64;

    let roots: Vec<NodeIndex> = g
        .node_indices()
        .filter(|&v| is_effectively_registered(g, v, registered) || in_edges(g, v).is_empty())
        .collect();
    for &root in &roots {
        let delay = longest_delay_from(
            g,
            root,
            registered,
            &mut computed_delays,
            &mut visit_state,
            &mut found_cycle,
        );
        max_period = max_period.max(delay);
    }

    // anything still unvisited sits behind (or on) a register-free cycle
    let stragglers: Vec<NodeIndex> = g
        .node_indices()
        .filter(|v| !computed_delays.contains_key(v))
        .collect();
    for root in stragglers {
        if computed_delays.contains_key(&root) {
            continue;
        }
        let delay = longest_delay_from(
            g,
            root,
            registered,
            &mut computed_delays,
            &mut visit_state,
            &mut found_cycle,
        );
        max_period = max_period.max(delay);
    }

    (max_period, found_cycle)
}

/// Iterative DFS for the longest delay from `root` to the next register
/// boundary. Encountering a vertex already on the stack flags a cycle and
/// terminates that path at the crossing edge.
fn longest_delay_from(
    g: &DelayGraph,
    root: NodeIndex,
    registered: &RegisteredSet,
    computed_delays: &mut HashMap<NodeIndex, u64>,
    visit_state: &mut HashMap<NodeIndex, VisitState>,
    found_cycle: &mut bool,
) -> u64 {
    if let Some(&delay) = computed_delays.get(&root) {
        return delay;
    }

    struct Frame {
        node: NodeIndex,
        edges: Vec<EdgeIndex>,
        cursor: usize,
        best: u64,
        // edge whose target's memoized delay is folded in on resume
        pending: Option<EdgeIndex>,
    }

    visit_state.insert(root, VisitState::Visiting);
    let mut stack = vec![Frame {
        node: root,
        edges: out_edges(g, root),
        cursor: 0,
        best: 0,
        pending: None,
    }];

    while !stack.is_empty() {
        let descend: Option<NodeIndex> = {
            let frame = stack.last_mut().unwrap();
            if let Some(e) = frame.pending.take() {
                let (_, child) = g.edge_endpoints(e).unwrap();
                frame.best = frame.best.max(g[e].delay + computed_delays[&child]);
            }

            let mut descend = None;
            while frame.cursor < frame.edges.len() {
                let e = frame.edges[frame.cursor];
                frame.cursor += 1;
                let (_, child) = g.edge_endpoints(e).unwrap();

                if is_effectively_registered(g, child, registered) {
                    // register boundary: charge the edge, stop
                    frame.best = frame.best.max(g[e].delay);
                } else if let Some(&delay) = computed_delays.get(&child) {
                    frame.best = frame.best.max(g[e].delay + delay);
                } else if visit_state.get(&child) == Some(&VisitState::Visiting) {
                    *found_cycle = true;
                    frame.best = frame.best.max(g[e].delay);
                } else {
                    frame.pending = Some(e);
                    descend = Some(child);
                    break;
                }
            }
            descend
        };

        match descend {
            Some(child) => {
                visit_state.insert(child, VisitState::Visiting);
                stack.push(Frame {
                    node: child,
                    edges: out_edges(g, child),
                    cursor: 0,
                    best: 0,
                    pending: None,
                });
            }
            None => {
                let done = stack.pop().unwrap();
                visit_state.insert(done.node, VisitState::Visited);
                computed_delays.insert(done.node, done.best);
            }
        }
    }

    computed_delays[&root]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{chain, feedback, forward, node};

    #[test]
    fn single_edge_period_is_edge_delay() {
        let (g, _) = chain(&[100]);
        let (period, cycle) = estimate_period(&g, &RegisteredSet::new());
        assert_eq!(period, 100);
        assert!(!cycle);
    }

    #[test]
    fn chain_sums_delays_between_boundaries() {
        let (g, _) = chain(&[100, 50, 25]);
        let (period, cycle) = estimate_period(&g, &RegisteredSet::new());
        assert_eq!(period, 175);
        assert!(!cycle);
    }

    #[test]
    fn register_splits_the_path() {
        let (g, nodes) = chain(&[100, 50, 25]);
        let registered: RegisteredSet = [nodes[1]].into_iter().collect();
        let (period, cycle) = estimate_period(&g, &registered);
        // input -> reg is 100, reg -> output is 75
        assert_eq!(period, 100);
        assert!(!cycle);
    }

    #[test]
    fn initially_registered_vertices_are_boundaries() {
        let (mut g, nodes) = chain(&[100, 50, 25]);
        g[nodes[2]].is_registered = true;
        let (period, cycle) = estimate_period(&g, &RegisteredSet::new());
        assert_eq!(period, 150);
        assert!(!cycle);
    }

    #[test]
    fn unregistered_feedback_cycle_is_flagged() {
        let mut g = DelayGraph::new();
        let a = g.add_node(node(0));
        let b = g.add_node(node(1));
        forward(&mut g, a, b, 50);
        feedback(&mut g, b, a, 50);

        let (_, cycle) = estimate_period(&g, &RegisteredSet::new());
        assert!(cycle);
    }

    #[test]
    fn registering_any_cycle_vertex_clears_the_flag() {
        let mut g = DelayGraph::new();
        let a = g.add_node(node(0));
        let b = g.add_node(node(1));
        forward(&mut g, a, b, 50);
        feedback(&mut g, b, a, 50);

        let registered: RegisteredSet = [a].into_iter().collect();
        let (period, cycle) = estimate_period(&g, &registered);
        assert!(!cycle);
        // a -> b -> back to a, truncated at the register: 50 + 50
        assert_eq!(period, 100);
    }

    #[test]
    fn diamond_takes_the_slower_arm() {
        let mut g = DelayGraph::new();
        let a = g.add_node(node(0));
        let b = g.add_node(node(1));
        let c = g.add_node(node(2));
        let d = g.add_node(node(3));
        forward(&mut g, a, b, 10);
        forward(&mut g, a, c, 80);
        forward(&mut g, b, d, 10);
        forward(&mut g, c, d, 80);

        let (period, cycle) = estimate_period(&g, &RegisteredSet::new());
        assert_eq!(period, 160);
        assert!(!cycle);
    }

    #[test]
    fn deep_chain_does_not_overflow_stack() {
        let (g, _) = chain(&vec![1; 50_000]);
        let (period, cycle) = estimate_period(&g, &RegisteredSet::new());
        assert_eq!(period, 50_000);
        assert!(!cycle);
    }
}
