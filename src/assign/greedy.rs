//! Greedy assignment: start from the maximally-registered solution (every
//! vertex carries a register, so no combinational path spans more than one
//! edge) and peel registers off, most expensive first, while the merged
//! register-to-register delays stay within the target.

use super::LatencyAssigner;
use crate::delay_graph::{in_edges, out_edges, DelayGraph, RegisteredSet};
use crate::period::estimate_period;
use log::warn;
use petgraph::graph::NodeIndex;
use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};

pub struct GreedyAssigner;

struct DeRegisterState {
    registered: RegisteredSet,
    /// Longest delay from any upstream register into the vertex.
    input_delay: HashMap<NodeIndex, u64>,
    /// Longest delay from the vertex to any downstream register.
    output_delay: HashMap<NodeIndex, u64>,
    /// Currently-registered upstream neighbors.
    fanin_regs: HashMap<NodeIndex, HashSet<NodeIndex>>,
    /// Currently-registered downstream neighbors.
    fanout_regs: HashMap<NodeIndex, HashSet<NodeIndex>>,
    /// Longest combinational delay between two currently-registered
    /// vertices. Invariant: `a ∈ fanin_regs[b]` implies `(a, b)` is present.
    reg_reg_delay: HashMap<(NodeIndex, NodeIndex), u64>,
}

impl DeRegisterState {
    fn new(g: &DelayGraph) -> Self {
        let mut state = DeRegisterState {
            registered: g.node_indices().collect(),
            input_delay: HashMap::new(),
            output_delay: HashMap::new(),
            fanin_regs: HashMap::new(),
            fanout_regs: HashMap::new(),
            reg_reg_delay: HashMap::new(),
        };

        for v in g.node_indices() {
            let mut input = 0;
            let mut fanin = HashSet::new();
            for e in in_edges(g, v) {
                let (source, _) = g.edge_endpoints(e).unwrap();
                input = input.max(g[e].delay);
                fanin.insert(source);
            }
            let mut output = 0;
            let mut fanout = HashSet::new();
            for e in out_edges(g, v) {
                let (_, target) = g.edge_endpoints(e).unwrap();
                output = output.max(g[e].delay);
                fanout.insert(target);
                let slot = state.reg_reg_delay.entry((v, target)).or_insert(0);
                *slot = (*slot).max(g[e].delay);
            }
            state.input_delay.insert(v, input);
            state.output_delay.insert(v, output);
            state.fanin_regs.insert(v, fanin);
            state.fanout_regs.insert(v, fanout);
        }

        state
    }

    fn is_safe_to_de_register(&self, g: &DelayGraph, v: NodeIndex, target_ps: u64) -> bool {
        if g[v].is_registered {
            return false;
        }
        if self.input_delay[&v] + self.output_delay[&v] > target_ps {
            return false;
        }
        // a registered self-neighbor means de-registering would close a
        // combinational loop on the spot
        if self.fanin_regs[&v].contains(&v) || self.fanout_regs[&v].contains(&v) {
            return false;
        }
        true
    }

    /// Remove v's register, splicing its fanin and fanout register
    /// frontiers together and extending the merged delays.
    fn de_register(&mut self, v: NodeIndex) {
        let mut fanin: Vec<NodeIndex> = self.fanin_regs[&v].iter().copied().collect();
        fanin.sort_unstable();
        let mut fanout: Vec<NodeIndex> = self.fanout_regs[&v].iter().copied().collect();
        fanout.sort_unstable();

        for &fi in &fanin {
            for &fo in &fanout {
                let merged = self.reg_reg_delay[&(fi, v)] + self.reg_reg_delay[&(v, fo)];
                let slot = self.reg_reg_delay.entry((fi, fo)).or_insert(0);
                *slot = (*slot).max(merged);
            }
        }

        for &fi in &fanin {
            let through = self.reg_reg_delay[&(fi, v)] + self.output_delay[&v];
            let slot = self.output_delay.get_mut(&fi).unwrap();
            *slot = (*slot).max(through);
        }
        for &fo in &fanout {
            let through = self.input_delay[&v] + self.reg_reg_delay[&(v, fo)];
            let slot = self.input_delay.get_mut(&fo).unwrap();
            *slot = (*slot).max(through);
        }

        for &fi in &fanin {
            let set = self.fanout_regs.get_mut(&fi).unwrap();
            set.remove(&v);
            set.extend(fanout.iter().copied());
        }
        for &fo in &fanout {
            let set = self.fanin_regs.get_mut(&fo).unwrap();
            set.remove(&v);
            set.extend(fanin.iter().copied());
        }

        self.input_delay.remove(&v);
        self.output_delay.remove(&v);
        self.fanin_regs.remove(&v);
        self.fanout_regs.remove(&v);
        self.registered.remove(&v);
    }
}

impl LatencyAssigner for GreedyAssigner {
    fn name(&self) -> &'static str {
        "greedy"
    }

    fn assign(&self, g: &DelayGraph, target_ps: u64) -> RegisteredSet {
        let mut state = DeRegisterState::new(g);

        loop {
            let mut candidates: Vec<NodeIndex> = state
                .registered
                .iter()
                .copied()
                .filter(|&v| !g[v].is_registered)
                .collect();
            candidates.sort_unstable_by_key(|&v| {
                (
                    Reverse(g[v].throughput_cost),
                    Reverse(g[v].latency_cost),
                    Reverse(g[v].register_cost),
                    v,
                )
            });

            let mut changed = false;
            for v in candidates {
                if state.is_safe_to_de_register(g, v, target_ps) {
                    state.de_register(v);
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }

        let (period, cycle) = estimate_period(g, &state.registered);
        if cycle {
            warn!("greedy left a residual combinational cycle");
        }
        if period > target_ps {
            warn!(
                "greedy result misses timing: period {} ps exceeds target {} ps",
                period, target_ps
            );
        }

        state.registered
    }
}
