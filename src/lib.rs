//! Register assignment for pipelined dataflow delay graphs.
//!
//! This library solves the register (latency) assignment problem from
//! high-level synthesis: given a dataflow graph whose edges carry
//! combinational propagation delays in picoseconds, choose the vertices at
//! which to insert pipeline registers so that no combinational path between
//! registers exceeds a target clock period, no combinational cycle
//! survives, and the (throughput, latency, register) cost triple is as
//! small as possible, in that order.
//!
//! # Main Workflows
//!
//! 1. **Batch solving** ([`place_main`]): walk a dataset tree, solve every
//!    graph with all built-in assigners, emit a scorecard CSV.
//! 2. **Single-graph analysis** ([`analyse_main`]): solve one graph and
//!    print a per-assigner comparison.
//! 3. **Library use** ([`solve`]): run one [`LatencyAssigner`] over a
//!    [`DelayGraph`] and get back a scored, invariant-repaired
//!    [`Solution`].
//!
//! # Usage Example
//!
//! ```no_run
//! # fn main() -> anyhow::Result<()> {
//! use register_placer::{read_graph_file, read_goal_file, solve, GreedyAssigner};
//! use register_placer::delay_graph::prune_parallel_edges;
//! use std::path::Path;
//!
//! let mut graph = read_graph_file(Path::new("graph.graphml"))?;
//! prune_parallel_edges(&mut graph);
//! let target_ps = read_goal_file(Path::new("goal.xml"))?;
//!
//! let solution = solve(&graph, target_ps, &GreedyAssigner)?;
//! println!("{}: slack {} ps", solution.name, solution.slack);
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - **[`delay_graph`]**: the graph data model, edge queries, pruning, and
//!   the GraphML importer
//! - **[`algo`]**: topological sort, Tarjan SCC, and the wavefront cost
//!   passes
//! - **[`period`]**: clock-period estimation and combinational-cycle
//!   detection
//! - **[`assign`]**: the ASAP and Greedy latency assigners
//! - **[`solution`]**: sibling/cycle fixups, scoring, and comparison
//! - **[`place`]**: dataset walker, scorecard emitter, DOT export

use anyhow::Result;
use clap::Parser;
use std::{error::Error, fmt, fs, path::Path};

pub mod algo;
pub mod assign;
pub mod delay_graph;
pub mod period;
pub mod place;
pub mod solution;
#[cfg(test)]
pub(crate) mod test_util;

// Re-export the main types and entry points for easy access
pub use assign::{builtin_assigners, AsapAssigner, GreedyAssigner, LatencyAssigner};
pub use delay_graph::{DelayEdge, DelayGraph, DelayNode, NodeType, RegisteredSet};
pub use place::{analyse_main, place_main, AnalyseArgs, PlaceArgs};
pub use solution::{solve, ScoreCard, Solution};

/// Application-level errors that can occur while solving.
#[derive(Debug, PartialEq, Eq)]
pub enum AppError {
    /// The forward subgraph has a cycle, so no topological order exists;
    /// a feedback edge was not tagged as such.
    BadTopologicalSeed,
    /// The dataset root contains no graph/goal pairs.
    EmptyDataset(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::BadTopologicalSeed => {
                write!(f, "Unexpected bad topological seed: forward edges form a cycle")
            }
            AppError::EmptyDataset(root) => write!(f, "No datasets found under {}", root),
        }
    }
}

impl Error for AppError {}

/// Reads and parses a delay graph from a GraphML file.
pub fn read_graph_file(file_name: &Path) -> Result<DelayGraph> {
    let file = fs::read_to_string(file_name)?;
    Ok(delay_graph::graphml::parse(&file)?)
}

/// Reads a goal file and returns the target clock period in picoseconds.
pub fn read_goal_file(file_name: &Path) -> Result<u64> {
    let file = fs::read_to_string(file_name)?;
    Ok(delay_graph::graphml::parse_goal(&file)?)
}

/// Command-line interface of the register placer.
#[derive(Debug, Parser)]
#[clap(
    name = "register-placer",
    about = "Register assignment for pipelined dataflow delay graphs"
)]
pub enum CLIArguments {
    /// Solve every dataset under a root directory and emit a scorecard
    Place(PlaceArgs),
    /// Solve a single delay graph and report every assigner's score
    Analyse(AnalyseArgs),
}
