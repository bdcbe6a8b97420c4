//! Graph algorithms over delay graphs.
//!
//! Everything here is iterative with explicit work stacks. Input graphs
//! routinely put tens of thousands of vertices on a single combinational
//! path, which overflows the native stack under recursion. The generic
//! algorithms in `petgraph::algo` are not used because they have no notion
//! of the forward/feedback edge split these passes depend on.

use crate::delay_graph::{
    feedback_in_edges, feedback_out_edges, forward_in_edges, forward_out_edges,
    is_effectively_registered, DelayGraph, RegisteredSet,
};
use itertools::Itertools;
use petgraph::graph::NodeIndex;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum VisitState {
    Queued,
    Visiting,
    Visited,
}

fn forward_successors(g: &DelayGraph, v: NodeIndex) -> Vec<NodeIndex> {
    forward_out_edges(g, v)
        .into_iter()
        .map(|e| g.edge_endpoints(e).unwrap().1)
        .collect()
}

fn all_successors(g: &DelayGraph, v: NodeIndex) -> Vec<NodeIndex> {
    crate::delay_graph::out_edges(g, v)
        .into_iter()
        .map(|e| g.edge_endpoints(e).unwrap().1)
        .collect()
}

/// Topological sort over forward edges only.
///
/// Seeds are the vertices without forward in-edges, taken in insertion
/// order. Returns `None` when a cycle exists among forward edges, which on
/// well-formed inputs (feedback properly tagged) never happens.
pub fn topological_sort(g: &DelayGraph) -> Option<Vec<NodeIndex>> {
    struct Frame {
        node: NodeIndex,
        successors: Vec<NodeIndex>,
        cursor: usize,
    }

    let mut state: HashMap<NodeIndex, VisitState> = HashMap::new();
    let mut postorder: Vec<NodeIndex> = Vec::with_capacity(g.node_count());

    let seeds: Vec<NodeIndex> = g
        .node_indices()
        .filter(|&v| forward_in_edges(g, v).is_empty())
        .collect();
    for &seed in &seeds {
        state.insert(seed, VisitState::Queued);
    }

    for seed in seeds {
        if state[&seed] == VisitState::Visited {
            continue;
        }
        state.insert(seed, VisitState::Visiting);
        let mut stack = vec![Frame {
            node: seed,
            successors: forward_successors(g, seed),
            cursor: 0,
        }];

        while !stack.is_empty() {
            let next = {
                let frame = stack.last_mut().unwrap();
                if frame.cursor < frame.successors.len() {
                    let child = frame.successors[frame.cursor];
                    frame.cursor += 1;
                    Some(child)
                } else {
                    None
                }
            };

            match next {
                Some(child) => match state.get(&child) {
                    Some(VisitState::Visiting) => return None,
                    Some(VisitState::Visited) => {}
                    _ => {
                        state.insert(child, VisitState::Visiting);
                        stack.push(Frame {
                            node: child,
                            successors: forward_successors(g, child),
                            cursor: 0,
                        });
                    }
                },
                None => {
                    let frame = stack.pop().unwrap();
                    state.insert(frame.node, VisitState::Visited);
                    postorder.push(frame.node);
                }
            }
        }
    }

    // a vertex no seed reaches sits on a forward cycle
    if postorder.len() != g.node_count() {
        return None;
    }

    postorder.reverse();
    Some(postorder)
}

/// Tarjan strongly-connected components over all edges, feedback included.
///
/// Components are returned in the order they are popped; singletons are
/// included. A component of size > 1 (or a self-loop) implies a cycle.
pub fn tarjan_scc(g: &DelayGraph) -> Vec<Vec<NodeIndex>> {
    struct NodeData {
        index: usize,
        lowlink: usize,
        on_stack: bool,
    }
    struct Frame {
        node: NodeIndex,
        successors: Vec<NodeIndex>,
        cursor: usize,
        // child whose lowlink must be folded in once its subtree is done
        pending_child: Option<NodeIndex>,
    }

    let mut data: HashMap<NodeIndex, NodeData> = HashMap::new();
    let mut next_index = 0usize;
    let mut component_stack: Vec<NodeIndex> = Vec::new();
    let mut components: Vec<Vec<NodeIndex>> = Vec::new();

    for root in g.node_indices() {
        if data.contains_key(&root) {
            continue;
        }

        data.insert(
            root,
            NodeData {
                index: next_index,
                lowlink: next_index,
                on_stack: true,
            },
        );
        next_index += 1;
        component_stack.push(root);
        let mut work = vec![Frame {
            node: root,
            successors: all_successors(g, root),
            cursor: 0,
            pending_child: None,
        }];

        while !work.is_empty() {
            enum Step {
                Recurse(NodeIndex),
                Retire(NodeIndex),
            }

            let step = {
                let frame = work.last_mut().unwrap();
                if let Some(child) = frame.pending_child.take() {
                    let child_lowlink = data[&child].lowlink;
                    let entry = data.get_mut(&frame.node).unwrap();
                    entry.lowlink = entry.lowlink.min(child_lowlink);
                }

                let mut step = Step::Retire(frame.node);
                while frame.cursor < frame.successors.len() {
                    let child = frame.successors[frame.cursor];
                    frame.cursor += 1;
                    match data.get(&child) {
                        None => {
                            frame.pending_child = Some(child);
                            step = Step::Recurse(child);
                            break;
                        }
                        Some(d) if d.on_stack => {
                            let child_index = d.index;
                            let entry = data.get_mut(&frame.node).unwrap();
                            entry.lowlink = entry.lowlink.min(child_index);
                        }
                        Some(_) => {}
                    }
                }
                step
            };

            match step {
                Step::Recurse(child) => {
                    data.insert(
                        child,
                        NodeData {
                            index: next_index,
                            lowlink: next_index,
                            on_stack: true,
                        },
                    );
                    next_index += 1;
                    component_stack.push(child);
                    work.push(Frame {
                        node: child,
                        successors: all_successors(g, child),
                        cursor: 0,
                        pending_child: None,
                    });
                }
                Step::Retire(node) => {
                    work.pop();
                    let entry = &data[&node];
                    if entry.lowlink == entry.index {
                        let mut component = Vec::new();
                        loop {
                            let member = component_stack.pop().unwrap();
                            data.get_mut(&member).unwrap().on_stack = false;
                            component.push(member);
                            if member == node {
                                break;
                            }
                        }
                        components.push(component);
                    }
                }
            }
        }
    }

    components
}

/// Per-origin cost dictionary of one wavefront vertex.
struct ThroughputEntry {
    costs: HashMap<NodeIndex, u64>,
    ref_count: usize,
}

/// Maximum summed throughput cost over every cycle closed by a feedback
/// edge, counting only effectively-registered vertices on the cyclic
/// combinational path.
///
/// Walks the forward topological order once, carrying for each wavefront
/// vertex a map from cycle origin (a vertex with feedback in-edges) to the
/// largest registered cost accumulated since that origin. A feedback edge
/// v -> p closes the cycle that began at p; the entry for p at v, if any, is
/// a candidate result. Reference counts drop entries as soon as their last
/// forward consumer has merged them, bounding memory to the sort frontier.
pub fn max_cyclic_throughput(
    g: &DelayGraph,
    sort: &[NodeIndex],
    registered: &RegisteredSet,
) -> u64 {
    let mut table: HashMap<NodeIndex, ThroughputEntry> = HashMap::new();
    let mut max_cycle_cost = 0u64;

    for &v in sort {
        let mut my_data: HashMap<NodeIndex, u64> = HashMap::new();
        for e in forward_in_edges(g, v) {
            let (pred, _) = g.edge_endpoints(e).unwrap();
            if let Some(entry) = table.get(&pred) {
                for (&origin, &cost) in &entry.costs {
                    my_data
                        .entry(origin)
                        .and_modify(|c| *c = (*c).max(cost))
                        .or_insert(cost);
                }
            }
        }

        let own_cost = if is_effectively_registered(g, v, registered) {
            g[v].throughput_cost
        } else {
            0
        };
        if own_cost > 0 {
            for cost in my_data.values_mut() {
                *cost += own_cost;
            }
        }

        // a feedback in-edge makes v the origin of a cycle
        if !feedback_in_edges(g, v).is_empty() {
            my_data.insert(v, own_cost);
        }

        for e in feedback_out_edges(g, v) {
            let (_, closer) = g.edge_endpoints(e).unwrap();
            if let Some(&cost) = my_data.get(&closer) {
                max_cycle_cost = max_cycle_cost.max(cost);
            }
        }

        let ref_count = forward_out_edges(g, v).len();
        if ref_count > 0 && !my_data.is_empty() {
            table.insert(
                v,
                ThroughputEntry {
                    costs: my_data,
                    ref_count,
                },
            );
        }

        for e in forward_in_edges(g, v) {
            let (pred, _) = g.edge_endpoints(e).unwrap();
            if let Some(entry) = table.get_mut(&pred) {
                entry.ref_count -= 1;
                if entry.ref_count == 0 {
                    table.remove(&pred);
                }
            }
        }
    }

    max_cycle_cost
}

/// Maximum summed latency cost over forward paths, measured at the sinks.
pub fn max_forward_latency(g: &DelayGraph, sort: &[NodeIndex], registered: &RegisteredSet) -> u64 {
    struct LatencyEntry {
        cost: u64,
        ref_count: usize,
    }

    let mut table: HashMap<NodeIndex, LatencyEntry> = HashMap::new();
    let mut max_latency = 0u64;

    for &v in sort {
        let mut my_cost = 0u64;
        for e in forward_in_edges(g, v) {
            let (pred, _) = g.edge_endpoints(e).unwrap();
            if let Some(entry) = table.get(&pred) {
                my_cost = my_cost.max(entry.cost);
            }
        }
        if is_effectively_registered(g, v, registered) {
            my_cost += g[v].latency_cost;
        }

        let ref_count = forward_out_edges(g, v).len();
        if ref_count == 0 {
            max_latency = max_latency.max(my_cost);
        } else {
            table.insert(
                v,
                LatencyEntry {
                    cost: my_cost,
                    ref_count,
                },
            );
        }

        for e in forward_in_edges(g, v) {
            let (pred, _) = g.edge_endpoints(e).unwrap();
            if let Some(entry) = table.get_mut(&pred) {
                entry.ref_count -= 1;
                if entry.ref_count == 0 {
                    table.remove(&pred);
                }
            }
        }
    }

    max_latency
}

/// Sibling groups: non-initially-registered vertices partitioned by
/// (`node_unique_id`, input-terminal side). Only groups of two or more with
/// a valid (nonnegative) id are returned, members and groups in insertion
/// order.
pub fn vertex_groups(g: &DelayGraph) -> Vec<Vec<NodeIndex>> {
    let groups = g
        .node_indices()
        .filter(|&v| !g[v].is_registered && g[v].node_unique_id >= 0)
        .map(|v| ((g[v].node_unique_id, g[v].is_input_terminal), v))
        .into_group_map();

    groups
        .into_values()
        .filter(|members| members.len() >= 2)
        .sorted_by_key(|members| members[0])
        .collect()
}
