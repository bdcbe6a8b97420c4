//! Solution evaluation: invariant fixups, scoring, and comparison.

use crate::algo::{max_cyclic_throughput, max_forward_latency, topological_sort, vertex_groups};
use crate::assign::LatencyAssigner;
use crate::delay_graph::{
    feedback_out_edges, forward_in_edges, forward_out_edges, is_effectively_registered,
    DelayGraph, RegisteredSet,
};
use crate::period::estimate_period;
use crate::AppError;
use anyhow::Result;
use petgraph::graph::NodeIndex;
use std::collections::HashSet;
use std::fmt;

use crate::delay_graph::NodeType;

/// Three-tier cost of a solution. Derived ordering is lexicographic, which
/// is exactly the comparison discipline: throughput, then latency, then
/// register count, lower is better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct ScoreCard {
    pub throughput: u64,
    pub latency: u64,
    pub registers: u64,
}

impl fmt::Display for ScoreCard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(throughput {}, latency {}, registers {})",
            self.throughput, self.latency, self.registers
        )
    }
}

/// A scored register assignment, frozen after construction.
#[derive(Debug, Clone)]
pub struct Solution {
    pub name: String,
    pub registered: RegisteredSet,
    pub score: ScoreCard,
    /// Achieved period in picoseconds.
    pub period: u64,
    /// `target - period`; negative on a timing violation.
    pub slack: i64,
    /// A combinational cycle survived repair. Such a solution ranks below
    /// any cycle-free one.
    pub found_combo_cycle: bool,
}

impl Solution {
    /// Evaluate a raw registered set against the graph: close sibling
    /// groups, repair combinational cycles, then score.
    pub fn evaluate(
        name: impl Into<String>,
        g: &DelayGraph,
        mut registered: RegisteredSet,
        target_ps: u64,
    ) -> Result<Solution> {
        fixup_sibling_groups(g, &mut registered);

        let (mut period, mut cycle) = estimate_period(g, &registered);
        if cycle {
            repair_cycles(g, &mut registered);
            let estimate = estimate_period(g, &registered);
            period = estimate.0;
            cycle = estimate.1;
        }

        let sort = topological_sort(g).ok_or(AppError::BadTopologicalSeed)?;
        let score = ScoreCard {
            throughput: max_cyclic_throughput(g, &sort, &registered),
            latency: max_forward_latency(g, &sort, &registered),
            registers: g
                .node_indices()
                .filter(|&v| is_effectively_registered(g, v, &registered))
                .map(|v| g[v].register_cost)
                .sum(),
        };

        Ok(Solution {
            name: name.into(),
            registered,
            score,
            period,
            slack: target_ps as i64 - period as i64,
            found_combo_cycle: cycle,
        })
    }

    /// Total order over candidate solutions: a cycle-free solution beats a
    /// cycle-carrying one, then scorecards compare lexicographically.
    pub fn is_better(&self, other: &Solution) -> bool {
        if self.found_combo_cycle != other.found_combo_cycle {
            return !self.found_combo_cycle;
        }
        // if self.slack >= 0 && other.slack < 0 {
        //     return true;
        // }
        // if other.slack >= 0 && self.slack < 0 {
        //     return false;
        // }
        self.score < other.score
    }
}

/// Run one assigner and evaluate its output.
pub fn solve(
    g: &DelayGraph,
    target_ps: u64,
    assigner: &dyn LatencyAssigner,
) -> Result<Solution> {
    let registered = assigner.assign(g, target_ps);
    Solution::evaluate(assigner.name(), g, registered, target_ps)
}

/// If any member of a sibling group is registered, register them all.
/// Grouping comes from the source netlist, so `disallow_register` is not
/// consulted here.
fn fixup_sibling_groups(g: &DelayGraph, registered: &mut RegisteredSet) {
    for group in vertex_groups(g) {
        if group
            .iter()
            .any(|&v| is_effectively_registered(g, v, registered))
        {
            for v in group {
                registered.insert(v);
            }
        }
    }
}

/// Break combinational cycles at feedback boundaries.
///
/// Candidate vertices are unregistered terminals that mark a feedback
/// boundary: feedback-input vertices, and right-shift-register output
/// terminals. For each feedback out-edge whose cycle is still fully
/// combinational, the vertex itself is registered; when that is forbidden a
/// feedback-input vertex falls back to registering its forward-edge
/// sources. One repair per vertex.
fn repair_cycles(g: &DelayGraph, registered: &mut RegisteredSet) {
    for v in g.node_indices() {
        let node = &g[v];
        if !node.is_terminal() || is_effectively_registered(g, v, registered) {
            continue;
        }
        let repairs_here = node.node_type == NodeType::FeedbackInput
            || (node.node_type == NodeType::RightShiftRegister && node.is_output_terminal);
        if !repairs_here {
            continue;
        }

        for e in feedback_out_edges(g, v) {
            let (_, next) = g.edge_endpoints(e).unwrap();
            if is_effectively_registered(g, next, registered) {
                continue;
            }
            if !unregistered_forward_path_exists(g, next, v, registered) {
                continue;
            }

            let mut repaired = false;
            if !node.disallow_register {
                registered.insert(v);
                repaired = true;
            } else if node.node_type == NodeType::FeedbackInput {
                for fe in forward_in_edges(g, v) {
                    let (source, _) = g.edge_endpoints(fe).unwrap();
                    if !g[source].disallow_register
                        && !is_effectively_registered(g, source, registered)
                    {
                        registered.insert(source);
                        repaired = true;
                    }
                }
            }
            if repaired {
                break;
            }
        }
    }
}

/// Is there a forward-edge path `from ~> to` visiting only unregistered
/// vertices? Iterative worklist; `to` itself may be reached through any
/// unregistered predecessor.
fn unregistered_forward_path_exists(
    g: &DelayGraph,
    from: NodeIndex,
    to: NodeIndex,
    registered: &RegisteredSet,
) -> bool {
    if from == to {
        return true;
    }
    if is_effectively_registered(g, from, registered) {
        return false;
    }

    let mut visited: HashSet<NodeIndex> = HashSet::new();
    let mut work = vec![from];
    visited.insert(from);

    while let Some(v) = work.pop() {
        for e in forward_out_edges(g, v) {
            let (_, next) = g.edge_endpoints(e).unwrap();
            if next == to {
                return true;
            }
            if !is_effectively_registered(g, next, registered) && visited.insert(next) {
                work.push(next);
            }
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{costed_node, feedback, forward, node};

    fn evaluate(g: &DelayGraph, registered: RegisteredSet, target: u64) -> Solution {
        Solution::evaluate("test", g, registered, target).expect("evaluation succeeds")
    }

    #[test]
    fn empty_set_on_relaxed_chain_scores_zero() {
        let mut g = DelayGraph::new();
        let a = g.add_node(node(0));
        let b = g.add_node(node(1));
        forward(&mut g, a, b, 100);

        let s = evaluate(&g, RegisteredSet::new(), 200);
        assert!(s.registered.is_empty());
        assert_eq!(s.period, 100);
        assert_eq!(s.slack, 100);
        assert!(!s.found_combo_cycle);
        assert_eq!(s.score, ScoreCard::default());
    }

    #[test]
    fn sibling_groups_close_under_registration() {
        let mut g = DelayGraph::new();
        let source = g.add_node(node(0));
        let mut s1 = costed_node(1, (0, 0, 3));
        s1.node_unique_id = 7;
        s1.is_input_terminal = true;
        let mut s2 = costed_node(2, (0, 0, 5));
        s2.node_unique_id = 7;
        s2.is_input_terminal = true;
        let v1 = g.add_node(s1);
        let v2 = g.add_node(s2);
        forward(&mut g, source, v1, 10);
        forward(&mut g, source, v2, 10);

        let s = evaluate(&g, [v1].into_iter().collect(), 1000);
        assert!(s.registered.contains(&v1));
        assert!(s.registered.contains(&v2));
        assert_eq!(s.score.registers, 8);
    }

    #[test]
    fn cycle_repair_registers_feedback_input() {
        let mut g = DelayGraph::new();
        let mut fb = node(0);
        fb.node_type = NodeType::FeedbackInput;
        fb.is_input_terminal = true;
        let v0 = g.add_node(fb);
        let v1 = g.add_node(node(1));
        // state-carrying edge leaves the feedback input; the forward path
        // closes the loop
        feedback(&mut g, v0, v1, 50);
        forward(&mut g, v1, v0, 50);

        let s = evaluate(&g, RegisteredSet::new(), 200);
        assert!(!s.found_combo_cycle);
        assert!(s.registered.contains(&v0));
    }

    #[test]
    fn cycle_repair_falls_back_to_forward_sources() {
        let mut g = DelayGraph::new();
        let feeder = g.add_node(node(0));
        let mut fb = node(1);
        fb.node_type = NodeType::FeedbackInput;
        fb.is_input_terminal = true;
        fb.disallow_register = true;
        let v = g.add_node(fb);
        let next = g.add_node(node(2));
        forward(&mut g, feeder, v, 10);
        feedback(&mut g, v, next, 20);
        forward(&mut g, next, v, 30);

        let s = evaluate(&g, RegisteredSet::new(), 200);
        assert!(!s.registered.contains(&v));
        assert!(s.registered.contains(&feeder));
        // the loop-closing source is swept up too, so the cycle is gone
        assert!(s.registered.contains(&next));
        assert!(!s.found_combo_cycle);
    }

    #[test]
    fn unrepairable_cycle_is_reported_not_fatal() {
        let mut g = DelayGraph::new();
        let a = g.add_node(node(0));
        let b = g.add_node(node(1));
        // plain vertices: repair has no boundary to work at
        forward(&mut g, a, b, 50);
        feedback(&mut g, b, a, 50);

        let s = evaluate(&g, RegisteredSet::new(), 200);
        assert!(s.found_combo_cycle);
    }

    #[test]
    fn cycle_free_beats_cycle_carrying() {
        let mut g = DelayGraph::new();
        let a = g.add_node(node(0));
        let b = g.add_node(node(1));
        forward(&mut g, a, b, 50);
        feedback(&mut g, b, a, 50);

        let broken = evaluate(&g, RegisteredSet::new(), 200);
        let clean = evaluate(&g, [a].into_iter().collect(), 200);
        assert!(broken.found_combo_cycle);
        assert!(!clean.found_combo_cycle);
        assert!(clean.is_better(&broken));
        assert!(!broken.is_better(&clean));
    }

    #[test]
    fn scorecards_compare_lexicographically() {
        let base = Solution {
            name: "a".into(),
            registered: RegisteredSet::new(),
            score: ScoreCard {
                throughput: 1,
                latency: 2,
                registers: 3,
            },
            period: 0,
            slack: 0,
            found_combo_cycle: false,
        };
        let mut better_registers = base.clone();
        better_registers.score.registers = 2;
        assert!(better_registers.is_better(&base));
        assert!(!base.is_better(&better_registers));

        let mut worse_throughput = base.clone();
        worse_throughput.score.throughput = 2;
        worse_throughput.score.latency = 0;
        worse_throughput.score.registers = 0;
        assert!(base.is_better(&worse_throughput));

        // equal scores: neither side wins
        assert!(!base.is_better(&base.clone()));
    }

    #[test]
    fn register_cost_counts_initially_registered_vertices() {
        let mut g = DelayGraph::new();
        let mut pre = costed_node(0, (0, 0, 11));
        pre.is_registered = true;
        let a = g.add_node(pre);
        let b = g.add_node(costed_node(1, (0, 0, 7)));
        forward(&mut g, a, b, 10);

        let s = evaluate(&g, [b].into_iter().collect(), 100);
        assert_eq!(s.score.registers, 18);
    }

    #[test]
    fn mistagged_forward_cycle_is_an_error() {
        let mut g = DelayGraph::new();
        let a = g.add_node(node(0));
        let b = g.add_node(node(1));
        forward(&mut g, a, b, 10);
        forward(&mut g, b, a, 10);

        let result = Solution::evaluate("bad", &g, RegisteredSet::new(), 100);
        assert!(result.is_err());
    }
}
