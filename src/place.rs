//! Batch driver and single-graph report.
//!
//! `place` walks a dataset tree, solves every delay graph it finds with all
//! built-in assigners, and writes the winning scores to a scorecard CSV.
//! `analyse` solves one graph and prints a per-assigner comparison.

use std::{
    cmp,
    fs,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use petgraph::dot;
use prettytable::*;
use rayon::prelude::*;

use crate::{
    algo::tarjan_scc,
    assign::builtin_assigners,
    delay_graph::{is_effectively_registered, max_edge_delay, prune_parallel_edges, DelayGraph},
    read_goal_file, read_graph_file,
    solution::{solve, Solution},
    AppError,
};

const GRAPH_FILE: &str = "graph.graphml";
const GOAL_FILE: &str = "goal.xml";

#[derive(Parser, Debug)]
pub struct PlaceArgs {
    /// Dataset root, scanned recursively for graph.graphml/goal.xml pairs
    pub dataset_root: PathBuf,

    /// Directory receiving the scorecard CSV
    pub scorecard_dir: PathBuf,

    /// Directory receiving a DOT rendering of each winning solution
    #[clap(long)]
    pub dot: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct AnalyseArgs {
    /// Delay graph input file (GraphML)
    pub input: PathBuf,

    /// Goal file with the target clock period
    pub goal: PathBuf,

    /// DOT file displaying the winning solution
    #[clap(long)]
    pub dot: Option<PathBuf>,
}

struct Dataset {
    name: String,
    graph: PathBuf,
    goal: PathBuf,
}

/// Directories below `root` holding both a graph and a goal file, named by
/// their path relative to the root. Iterative walk, sorted output.
fn discover_datasets(root: &Path) -> Result<Vec<Dataset>> {
    let mut datasets = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let graph = dir.join(GRAPH_FILE);
        let goal = dir.join(GOAL_FILE);
        if graph.is_file() && goal.is_file() {
            let name = dir
                .strip_prefix(root)
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default();
            datasets.push(Dataset {
                name: if name.is_empty() { ".".to_owned() } else { name },
                graph,
                goal,
            });
        }

        for entry in fs::read_dir(&dir).with_context(|| format!("reading {}", dir.display()))? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            }
        }
    }

    datasets.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(datasets)
}

/// Parse and prune a graph, and settle the effective target period. A
/// single edge can never be split, so its delay floors the target.
fn prepare(graph_path: &Path, goal_path: &Path) -> Result<(DelayGraph, u64)> {
    let mut g = read_graph_file(graph_path)?;
    prune_parallel_edges(&mut g);

    let goal = read_goal_file(goal_path)?;
    let floor = max_edge_delay(&g);
    let target = cmp::max(goal, floor);
    if target > goal {
        info!(
            "{}: goal {} ps is below the largest edge delay, using {} ps",
            graph_path.display(),
            goal,
            target
        );
    }
    Ok((g, target))
}

fn solve_all(g: &DelayGraph, target_ps: u64) -> Result<Vec<Solution>> {
    builtin_assigners()
        .iter()
        .map(|assigner| solve(g, target_ps, assigner.as_ref()))
        .collect()
}

fn pick_winner(solutions: Vec<Solution>) -> Solution {
    solutions
        .into_iter()
        .reduce(|best, candidate| {
            if candidate.is_better(&best) {
                candidate
            } else {
                best
            }
        })
        .expect("at least one built-in assigner")
}

fn write_dot(path: &Path, g: &DelayGraph, solution: &Solution) -> Result<()> {
    let rendered = g.map(
        |ix, node| {
            if is_effectively_registered(g, ix, &solution.registered) {
                format!("{} [reg]", node)
            } else {
                node.to_string()
            }
        },
        |_, e| e.delay,
    );
    fs::write(path, format!("{:?}", dot::Dot::new(&rendered)))?;
    Ok(())
}

pub fn place_main(args: PlaceArgs) -> Result<()> {
    let PlaceArgs {
        dataset_root,
        scorecard_dir,
        dot,
    } = args;

    let datasets = discover_datasets(&dataset_root)?;
    if datasets.is_empty() {
        return Err(AppError::EmptyDataset(dataset_root.display().to_string()).into());
    }
    info!("solving {} datasets", datasets.len());

    let results: Vec<(String, DelayGraph, Solution)> = datasets
        .par_iter()
        .map(|ds| {
            let (g, target) =
                prepare(&ds.graph, &ds.goal).with_context(|| format!("dataset {}", ds.name))?;
            let best = pick_winner(solve_all(&g, target)?);
            info!("{}: {} wins with {}", ds.name, best.name, best.score);
            Ok((ds.name.clone(), g, best))
        })
        .collect::<Result<Vec<_>>>()?;

    fs::create_dir_all(&scorecard_dir)?;
    let mut csv = BufWriter::new(fs::File::create(scorecard_dir.join("scorecard.csv"))?);
    writeln!(
        csv,
        "dataset,assigner,throughput,latency,registers,period_ps,slack_ps,combo_cycle"
    )?;
    for (name, _, best) in &results {
        writeln!(
            csv,
            "{},{},{},{},{},{},{},{}",
            name,
            best.name,
            best.score.throughput,
            best.score.latency,
            best.score.registers,
            best.period,
            best.slack,
            best.found_combo_cycle
        )?;
    }

    if let Some(dot_dir) = dot {
        fs::create_dir_all(&dot_dir)?;
        for (name, g, best) in &results {
            let file_name = format!("{}.dot", name.replace(['/', '\\'], "_"));
            write_dot(&dot_dir.join(file_name), g, best)?;
        }
    }

    Ok(())
}

pub fn analyse_main(args: AnalyseArgs) -> Result<()> {
    let AnalyseArgs { input, goal, dot } = args;

    let (g, target) = prepare(&input, &goal)?;
    let solutions = solve_all(&g, target)?;

    let loops = tarjan_scc(&g)
        .into_iter()
        .filter(|scc| scc.len() > 1 || g.find_edge(scc[0], scc[0]).is_some())
        .count();

    println!("Target clock period: {} ps", target);
    println!("Feedback loops: {}", loops);

    let mut table = Table::new();
    table.set_titles(row![
        "Assigner",
        "Throughput",
        "Latency",
        "Registers",
        "Period (ps)",
        "Slack (ps)",
        "Cycle",
        "Registered",
    ]);
    table.set_format(*format::consts::FORMAT_NO_LINESEP_WITH_TITLE);
    for s in &solutions {
        table.add_row(row![
            s.name,
            s.score.throughput,
            s.score.latency,
            s.score.registers,
            s.period,
            s.slack,
            if s.found_combo_cycle { "yes" } else { "no" },
            s.registered.len(),
        ]);
    }
    table.printstd();

    let winner = pick_winner(solutions);
    println!("\nBest: {} with {}", winner.name, winner.score);

    if let Some(path) = dot {
        write_dot(&path, &g, &winner)?;
    }

    Ok(())
}
