/*
 * SPDX-FileCopyrightText: 2026 The filigree authors
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Build a graph from read files.

use anyhow::Result;
use clap::Args;

use crate::graph::{build_graph, BuildConfig};
use crate::utils::PhysicalFileFactory;

#[derive(Args, Debug)]
#[command(about = "Build a de Bruijn graph from FASTA/FASTQ reads", long_about = None)]
pub struct CliArgs {
    /// The k-mer size (nodes are k bases, edges k+1).
    #[arg(short, long)]
    pub k: u64,

    /// The base name for the graph artefacts.
    #[arg(short, long)]
    pub graph: String,

    /// FASTA input files.
    #[arg(long = "fasta")]
    pub fastas: Vec<String>,

    /// FASTQ input files.
    #[arg(long = "fastq")]
    pub fastqs: Vec<String>,

    /// Worker threads.
    #[arg(short = 't', long, default_value_t = num_cpus::get())]
    pub threads: usize,

    /// Per-worker sort buffer, in MiB.
    #[arg(short = 'B', long, default_value_t = 256)]
    pub buffer_mib: u64,
}

pub fn main(args: CliArgs) -> Result<()> {
    // Scratch runs live in a self-deleting directory.
    let scratch = tempfile::Builder::new().prefix("filigree-build-").tempdir()?;
    let factory = PhysicalFileFactory::with_tmp_dir(scratch.path());
    let config = BuildConfig {
        k: args.k,
        graph_name: args.graph,
        fastas: args.fastas,
        fastqs: args.fastqs,
        num_threads: args.threads,
        buffer_bytes: args.buffer_mib << 20,
    };
    build_graph(&config, &factory)
}
