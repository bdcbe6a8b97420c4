//! ASAP assignment: a forward sweep that registers a vertex as soon as the
//! accumulated delay through it would overshoot the target, or when every
//! downstream neighbor would be a more expensive place to break the path.

use super::LatencyAssigner;
use crate::delay_graph::{in_edges, out_edges, DelayGraph, RegisteredSet};
use petgraph::graph::NodeIndex;
use std::collections::HashMap;

pub struct AsapAssigner;

impl LatencyAssigner for AsapAssigner {
    fn name(&self) -> &'static str {
        "asap"
    }

    fn assign(&self, g: &DelayGraph, target_ps: u64) -> RegisteredSet {
        let mut delay_map: HashMap<NodeIndex, u64> = g
            .node_indices()
            .filter(|&v| g[v].is_registered)
            .map(|v| (v, 0))
            .collect();
        let mut registered = RegisteredSet::new();

        // the second pass propagates delays through feedback paths that were
        // still undetermined on the first
        for _ in 0..2 {
            for v in g.node_indices() {
                let node = &g[v];
                if node.is_registered {
                    continue;
                }

                let max_delay_in = in_edges(g, v)
                    .into_iter()
                    .map(|e| {
                        let (source, _) = g.edge_endpoints(e).unwrap();
                        g[e].delay + delay_map.get(&source).copied().unwrap_or(0)
                    })
                    .max()
                    .unwrap_or(0);
                let max_delay_out = out_edges(g, v)
                    .into_iter()
                    .map(|e| g[e].delay)
                    .max()
                    .unwrap_or(0);

                let mut max_throughput_out = 0;
                let mut max_latency_out = 0;
                let mut max_register_out = 0;
                for e in out_edges(g, v) {
                    let (_, target) = g.edge_endpoints(e).unwrap();
                    max_throughput_out = max_throughput_out.max(g[target].throughput_cost);
                    max_latency_out = max_latency_out.max(g[target].latency_cost);
                    max_register_out = max_register_out.max(g[target].register_cost);
                }

                let over_budget = max_delay_in + max_delay_out > target_ps;
                let cheaper_than_downstream = max_delay_in > 0
                    && (max_throughput_out > node.throughput_cost
                        || (max_throughput_out == node.throughput_cost
                            && max_latency_out > node.latency_cost)
                        || (max_throughput_out == node.throughput_cost
                            && max_latency_out == node.latency_cost
                            && max_register_out > node.register_cost));

                if over_budget || cheaper_than_downstream {
                    delay_map.insert(v, 0);
                    registered.insert(v);
                } else {
                    delay_map.insert(v, max_delay_in);
                    registered.remove(&v);
                }
            }
        }

        registered
    }
}
