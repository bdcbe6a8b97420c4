//! Latency assignment strategies.
//!
//! An assigner proposes the set of vertices to register; evaluation and
//! invariant fixups happen afterwards in [`crate::solution`]. Both built-in
//! strategies are deterministic: identical graphs and targets produce
//! identical sets.

mod asap;
mod greedy;

pub use asap::AsapAssigner;
pub use greedy::GreedyAssigner;

use crate::delay_graph::{DelayGraph, RegisteredSet};

pub trait LatencyAssigner {
    fn name(&self) -> &'static str;

    /// Choose the vertices to register so that no combinational path
    /// between registers exceeds `target_ps`.
    fn assign(&self, g: &DelayGraph, target_ps: u64) -> RegisteredSet;
}

/// The strategies a solve run arbitrates between, in evaluation order.
pub fn builtin_assigners() -> Vec<Box<dyn LatencyAssigner>> {
    vec![Box::new(AsapAssigner), Box::new(GreedyAssigner)]
}
