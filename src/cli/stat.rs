/*
 * SPDX-FileCopyrightText: 2026 The filigree authors
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Summarize a persisted graph.

use anyhow::Result;
use clap::Args;
use std::io::Write;

use crate::graph::Graph;
use crate::utils::PhysicalFileFactory;

#[derive(Args, Debug)]
#[command(about = "Print graph statistics", long_about = None)]
pub struct CliArgs {
    /// The graph to inspect.
    #[arg(short, long)]
    pub graph: String,

    /// Also dump the multiplicity histogram.
    #[arg(long)]
    pub hist: bool,
}

pub fn main(args: CliArgs) -> Result<()> {
    let factory = PhysicalFileFactory::new();
    let graph = Graph::open(&args.graph, &factory)?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    writeln!(out, "K\t{}", graph.k())?;
    writeln!(out, "edges\t{}", graph.count())?;
    writeln!(out, "asymmetric\t{}", graph.asymmetric())?;
    if args.hist {
        for (count, freq) in Graph::hist(&args.graph, &factory)? {
            writeln!(out, "{}\t{}", count, freq)?;
        }
    }
    Ok(())
}
