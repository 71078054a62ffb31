/*
 * SPDX-FileCopyrightText: 2026 The filigree authors
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Clean bubbles out of a graph and write the result.

use anyhow::Result;
use clap::Args;
use log::info;

use crate::graph::{Graph, GraphBuilder, TourBus};
use crate::utils::PhysicalFileFactory;

#[derive(Args, Debug)]
#[command(about = "Remove bubbles from a graph", long_about = None)]
pub struct CliArgs {
    /// The graph to clean.
    #[arg(short, long)]
    pub graph: String,

    /// The base name for the cleaned graph.
    #[arg(short, long)]
    pub out: String,

    /// Maximum bubble arm length, in edges (default 2k+12).
    #[arg(long)]
    pub max_sequence_length: Option<u64>,

    /// Maximum edit distance between bubble arms.
    #[arg(long, default_value_t = 3)]
    pub max_edit_distance: u64,

    /// Maximum edit distance relative to arm length.
    #[arg(long, default_value_t = 0.2)]
    pub max_relative_errors: f64,

    /// Absolute coverage cutoff for the weaker arm.
    #[arg(long, default_value_t = 1)]
    pub coverage_cutoff: u64,

    /// Coverage cutoff relative to the stronger arm.
    #[arg(long, default_value_t = 0.2)]
    pub relative_cutoff: f64,

    /// Worker threads.
    #[arg(short = 't', long, default_value_t = num_cpus::get())]
    pub threads: usize,
}

pub fn main(args: CliArgs) -> Result<()> {
    let factory = PhysicalFileFactory::new();
    let mut graph = Graph::open(&args.graph, &factory)?;
    let k = graph.k();
    let before = graph.count();

    let mut tour_bus = TourBus::new(&mut graph);
    tour_bus
        .set_num_threads(args.threads)
        .set_maximum_edit_distance(args.max_edit_distance)
        .set_maximum_relative_errors(args.max_relative_errors)
        .set_coverage_cutoff(args.coverage_cutoff)
        .set_coverage_relative_cutoff(args.relative_cutoff);
    if let Some(len) = args.max_sequence_length {
        tour_bus.set_maximum_sequence_length(len);
    }

    let removed = tour_bus.run()?;
    info!("removed {} of {} edges", removed, before);

    let mut builder = GraphBuilder::new(k, &args.out, &factory, before - removed, false)?;
    tour_bus.write_modified_graph(&mut builder)?;
    builder.end()
}
