/*
 * SPDX-FileCopyrightText: 2026 The filigree authors
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Walk and print the maximal linear segments of a graph.

use anyhow::Result;
use clap::Args;
use std::io::Write;

use crate::graph::{ContigWalker, Graph};
use crate::utils::PhysicalFileFactory;

#[derive(Args, Debug)]
#[command(about = "Print contigs as FASTA", long_about = None)]
pub struct CliArgs {
    /// The graph to walk.
    #[arg(short, long)]
    pub graph: String,

    /// Minimum contig length to report, in bases.
    #[arg(short, long, default_value_t = 0)]
    pub min_length: usize,
}

pub fn main(args: CliArgs) -> Result<()> {
    let factory = PhysicalFileFactory::new();
    let graph = Graph::open(&args.graph, &factory)?;
    let walker = ContigWalker::new(&graph, args.min_length);
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for (i, contig) in walker.contigs()?.iter().enumerate() {
        writeln!(out, ">contig-{}", i)?;
        writeln!(out, "{}", contig.to_dna())?;
    }
    Ok(())
}
