/*
 * SPDX-FileCopyrightText: 2026 The filigree authors
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Building graphs: the streaming builder and the end-to-end pipeline.
//!
//! The builder accepts a sorted (edge, count) stream and writes the edge
//! bitmap and the multiplicity tiers through background block consumers,
//! accumulating the count histogram on the pushing thread. The pipeline
//! wires readers → per-worker extractor and sorter (spilling aggregated,
//! delta-coded runs under a byte budget) → [`AsyncMerge`] → builder.

use anyhow::Result;
use dsi_progress_logger::prelude::*;
use log::info;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Mutex;

use super::{check_k, GraphFlags, Header};
use crate::arrays::{SparseArrayBuilder, VariableByteArray, VariableByteArrayBuilder};
use crate::kmer::{FastaReads, FastqReads, KmerExtractor, ReadSource};
use crate::sort::{AsyncMerge, EdgeAndCount, EdgeAndCountWriter};
use crate::utils::{run_batch_task, BackgroundConsumer, FileFactory, Sink, WorkerToken};

struct EdgeSink(SparseArrayBuilder);

impl Sink<u128> for EdgeSink {
    fn push_back(&mut self, edge: u128) -> Result<()> {
        self.0.push_back(edge)
    }
}

struct CountSink(VariableByteArrayBuilder);

impl Sink<u32> for CountSink {
    fn push_back(&mut self, count: u32) -> Result<()> {
        self.0.push_back(count)
    }
}

/// Streaming graph builder over a sorted edge stream.
pub struct GraphBuilder<'a> {
    base_name: String,
    factory: &'a dyn FileFactory,
    k: u64,
    edges_bg: BackgroundConsumer<u128, EdgeSink>,
    counts_bg: BackgroundConsumer<u32, CountSink>,
    hist: BTreeMap<u64, u64>,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(
        k: u64,
        base_name: &str,
        factory: &'a dyn FileFactory,
        num_edges: u64,
        asymmetric: bool,
    ) -> Result<Self> {
        check_k(k)?;
        let rho = k + 1;
        Header {
            k,
            flags: if asymmetric {
                GraphFlags::ASYMMETRIC
            } else {
                GraphFlags::empty()
            },
        }
        .write(base_name, factory)?;

        let edges_builder = crate::arrays::SparseArray::builder(
            &format!("{}-edges", base_name),
            factory,
            1u128 << (2 * rho),
            num_edges,
        )?;
        let counts_builder = VariableByteArray::builder(
            &format!("{}-counts", base_name),
            factory,
            num_edges,
            1.0 / 1024.0,
        )?;
        Ok(GraphBuilder {
            base_name: base_name.to_owned(),
            factory,
            k,
            edges_bg: BackgroundConsumer::new(EdgeSink(edges_builder)),
            counts_bg: BackgroundConsumer::new(CountSink(counts_builder)),
            hist: BTreeMap::new(),
        })
    }

    /// Push the next edge in strictly ascending order.
    pub fn push_back(&mut self, edge: u128, count: u64) -> Result<()> {
        self.edges_bg.push_back(edge)?;
        let clamped = count.min(crate::arrays::MAX_COUNT as u64) as u32;
        self.counts_bg.push_back(clamped)?;
        *self.hist.entry(clamped as u64).or_insert(0) += 1;
        Ok(())
    }

    pub fn end(self) -> Result<()> {
        let rho = self.k + 1;
        let edges = self.edges_bg.end()?;
        edges.0.end(1u128 << (2 * rho))?;
        let counts = self.counts_bg.end()?;
        counts.0.end()?;

        let mut out = self
            .factory
            .open_out(&format!("{}-counts-hist.txt", self.base_name))?;
        for (count, freq) in &self.hist {
            writeln!(out, "{}\t{}", count, freq)?;
        }
        out.flush()?;
        Ok(())
    }
}

/// Configuration for the end-to-end build.
pub struct BuildConfig {
    pub k: u64,
    pub graph_name: String,
    pub fastas: Vec<String>,
    pub fastqs: Vec<String>,
    pub num_threads: usize,
    /// Per-worker in-memory edge budget, in bytes.
    pub buffer_bytes: u64,
}

enum ReadFile {
    Fasta(String),
    Fastq(String),
}

impl ReadFile {
    fn open(&self, factory: &dyn FileFactory) -> Result<Box<dyn ReadSource + Send>> {
        Ok(match self {
            ReadFile::Fasta(name) => Box::new(FastaReads::open(name, factory)?),
            ReadFile::Fastq(name) => Box::new(FastqReads::open(name, factory)?),
        })
    }
}

impl ReadSource for Box<dyn ReadSource + Send> {
    fn next_read(&mut self) -> Result<Option<String>> {
        (**self).next_read()
    }
}

/// Sorts a worker's edges in memory and spills aggregated runs.
struct RunSpiller<'a> {
    factory: &'a dyn FileFactory,
    max_items: usize,
    buf: Vec<u128>,
    runs: Vec<(String, u64)>,
}

impl<'a> RunSpiller<'a> {
    fn new(factory: &'a dyn FileFactory, buffer_bytes: u64) -> Self {
        let max_items = ((buffer_bytes as usize) / std::mem::size_of::<u128>()).max(1024);
        RunSpiller {
            factory,
            max_items,
            buf: Vec::with_capacity(max_items),
            runs: Vec::new(),
        }
    }

    fn push(&mut self, edge: u128) -> Result<()> {
        self.buf.push(edge);
        if self.buf.len() >= self.max_items {
            self.spill()?;
        }
        Ok(())
    }

    fn spill(&mut self) -> Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        self.buf.par_sort_unstable();
        let name = self.factory.tmp_name();
        let mut writer = EdgeAndCountWriter::new(self.factory.open_out(&name)?);
        let mut i = 0;
        while i < self.buf.len() {
            let edge = self.buf[i];
            let mut count = 0u64;
            while i < self.buf.len() && self.buf[i] == edge {
                count += 1;
                i += 1;
            }
            writer.push_back(&EdgeAndCount::new(edge, count))?;
        }
        let len = writer.end()?;
        info!("spilled a run of {} distinct edges", len);
        self.runs.push((name, len));
        self.buf.clear();
        Ok(())
    }

    fn finish(mut self) -> Result<Vec<(String, u64)>> {
        self.spill()?;
        Ok(self.runs)
    }
}

/// Build a graph from read files; see the module docs for the dataflow.
pub fn build_graph(config: &BuildConfig, factory: &dyn FileFactory) -> Result<()> {
    check_k(config.k)?;
    let files: Vec<ReadFile> = config
        .fastas
        .iter()
        .cloned()
        .map(ReadFile::Fasta)
        .chain(config.fastqs.iter().cloned().map(ReadFile::Fastq))
        .collect();

    let num_workers = config.num_threads.max(1).min(files.len().max(1));
    let all_runs: Mutex<Vec<(String, u64)>> = Mutex::new(Vec::new());

    let mut pl = progress_logger!(item_name = "read");
    pl.start(format!(
        "Extracting {}-mers from {} files...",
        config.k + 1,
        files.len()
    ));

    {
        let all_runs = &all_runs;
        let mut assignments: Vec<Vec<&ReadFile>> = (0..num_workers).map(|_| Vec::new()).collect();
        for (i, file) in files.iter().enumerate() {
            assignments[i % num_workers].push(file);
        }
        let workers: Vec<_> = assignments
            .into_iter()
            .map(|files| {
                move |token: &WorkerToken| -> Result<()> {
                    let mut spiller = RunSpiller::new(factory, config.buffer_bytes);
                    for file in files {
                        let mut extractor =
                            KmerExtractor::new(config.k, file.open(factory)?);
                        while let Some(edge) = extractor.next_edge()? {
                            spiller.push(edge)?;
                            if !token.report_work_done(1) {
                                return Ok(());
                            }
                        }
                    }
                    let runs = spiller.finish()?;
                    all_runs.lock().unwrap().extend(runs);
                    Ok(())
                }
            })
            .collect();
        run_batch_task(workers, None)?;
    }
    pl.done();

    let runs = all_runs.into_inner().unwrap();
    let (parts, sizes): (Vec<String>, Vec<u64>) = runs.into_iter().unzip();
    let total: u64 = sizes.iter().sum();
    info!("merging {} runs ({} records)", parts.len(), total);

    let result = AsyncMerge::merge(
        &parts,
        &sizes,
        &config.graph_name,
        config.k,
        total.max(1),
        config.num_threads.max(1),
        4096,
        factory,
    );

    for part in &parts {
        // Scratch runs are not part of the artefact set.
        let _ = factory.remove(part);
    }
    result
}
