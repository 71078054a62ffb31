/*
 * SPDX-FileCopyrightText: 2026 The filigree authors
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Merging sorted edge-run files into a single graph.
//!
//! A quaternary tournament heap merges the delta-coded runs, summing the
//! counts of equal edges. With several threads the edge space is cut into
//! key ranges at sampled splitter edges (each file contributes samples in
//! proportion to its record count, so the ranges carry similar load); one
//! worker merges each range and a feeder drains their block queues in
//! worker order into the single graph builder. An error in any worker
//! cancels the others and re-raises once all have exited.

use anyhow::Result;
use crossbeam_channel::bounded;
use dary_heap::QuaternaryHeap;
use itertools::Itertools;
use log::info;

use super::edge_count::{EdgeAndCount, EdgeAndCountReader};
use crate::graph::GraphBuilder;
use crate::utils::{run_batch_task, FileFactory, WorkerToken};

/// Records per hand-off block.
const BLOCK_RECORDS: usize = 4096;
/// Blocks in flight per worker.
const MAX_BLOCKS: usize = 64;

struct Head {
    item: EdgeAndCount,
    reader: usize,
}

impl PartialEq for Head {
    fn eq(&self, other: &Self) -> bool {
        self.item.edge == other.item.edge
    }
}

impl Eq for Head {}

impl PartialOrd for Head {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Head {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Reversed: the heap is a max-heap.
        other.item.edge.cmp(&self.item.edge)
    }
}

/// Tournament merge over open readers, coalescing equal edges.
struct MergedStream {
    readers: Vec<EdgeAndCountReader>,
    heap: QuaternaryHeap<Head>,
}

impl MergedStream {
    fn new(mut readers: Vec<EdgeAndCountReader>) -> Self {
        let mut heap = QuaternaryHeap::with_capacity(readers.len());
        for (i, reader) in readers.iter_mut().enumerate() {
            if reader.valid() {
                heap.push(Head {
                    item: reader.current(),
                    reader: i,
                });
            }
        }
        MergedStream { readers, heap }
    }

    fn pop_raw(&mut self) -> Result<Option<EdgeAndCount>> {
        let head = match self.heap.pop() {
            None => return Ok(None),
            Some(head) => head,
        };
        let reader = &mut self.readers[head.reader];
        reader.advance()?;
        if reader.valid() {
            self.heap.push(Head {
                item: reader.current(),
                reader: head.reader,
            });
        }
        Ok(Some(head.item))
    }

    /// The next distinct edge with its summed (saturating) count.
    fn next_merged(&mut self) -> Result<Option<EdgeAndCount>> {
        let mut curr = match self.pop_raw()? {
            None => return Ok(None),
            Some(item) => item,
        };
        while let Some(head) = self.heap.peek() {
            if head.item.edge != curr.edge {
                break;
            }
            let next = self.pop_raw()?.expect("peeked head vanished");
            curr.count = curr.count.saturating_add(next.count);
        }
        Ok(Some(curr))
    }
}

pub struct AsyncMerge;

impl AsyncMerge {
    /// Merge `parts` (with per-file record counts `sizes`) into the graph
    /// artefacts at `graph_name`.
    #[allow(clippy::too_many_arguments)]
    pub fn merge<'a>(
        parts: &[String],
        sizes: &[u64],
        graph_name: &str,
        k: u64,
        num_edges: u64,
        num_threads: usize,
        buffer_size: usize,
        factory: &'a dyn FileFactory,
    ) -> Result<()> {
        debug_assert_eq!(parts.len(), sizes.len());
        let mut builder = GraphBuilder::new(k, graph_name, factory, num_edges, false)?;
        let total: u64 = sizes.iter().sum();

        let open_all = || -> Result<Vec<EdgeAndCountReader>> {
            parts
                .iter()
                .zip(sizes)
                .map(|(name, &len)| EdgeAndCountReader::new(factory.open_in(name)?, len))
                .collect()
        };

        if num_threads <= 1 || total < (num_threads as u64) * BLOCK_RECORDS as u64 {
            let mut stream = MergedStream::new(open_all()?);
            while let Some(item) = stream.next_merged()? {
                builder.push_back(item.edge, item.count)?;
            }
            return builder.end();
        }

        let splitters = sample_splitters(open_all()?, sizes, num_threads)?;
        info!(
            "merging {} runs ({} records) across {} workers",
            parts.len(),
            total,
            splitters.len() + 1
        );

        let block_cap = buffer_size.clamp(1, BLOCK_RECORDS * 16);
        let mut senders = Vec::new();
        let mut receivers = Vec::new();
        for _ in 0..=splitters.len() {
            let (tx, rx) = bounded::<Vec<EdgeAndCount>>(MAX_BLOCKS);
            senders.push(tx);
            receivers.push(rx);
        }

        let mut workers: Vec<Box<dyn FnOnce(&WorkerToken) -> Result<()> + Send + 'a>> = Vec::new();
        for (w, tx) in senders.into_iter().enumerate() {
            let lo = if w == 0 { 0 } else { splitters[w - 1] };
            let hi = splitters.get(w).copied();
            let readers = open_all()?;
            workers.push(Box::new(move |token: &WorkerToken| -> Result<()> {
                let mut stream = MergedStream::new(readers);
                let mut block = Vec::with_capacity(block_cap);
                while let Some(item) = stream.next_merged()? {
                    if item.edge < lo {
                        continue;
                    }
                    if let Some(hi) = hi {
                        if item.edge >= hi {
                            break;
                        }
                    }
                    block.push(item);
                    if block.len() >= block_cap {
                        if !token.report_work_done(block.len() as u64) {
                            return Ok(());
                        }
                        if tx.send(std::mem::replace(
                            &mut block,
                            Vec::with_capacity(block_cap),
                        ))
                        .is_err()
                        {
                            return Ok(()); // the feeder died; it reports
                        }
                    }
                }
                if !block.is_empty() && tx.send(block).is_err() {
                    return Ok(());
                }
                Ok(())
            }));
        }

        workers.push(Box::new(move |token: &WorkerToken| -> Result<()> {
            let mut builder = builder;
            for rx in receivers {
                for block in rx {
                    for item in &block {
                        builder.push_back(item.edge, item.count)?;
                    }
                    if !token.report_work_done(block.len() as u64) {
                        return Ok(());
                    }
                }
            }
            builder.end()
        }));

        run_batch_task(workers, Some("edge"))
    }
}

/// Pick `threads - 1` splitter edges from proportional per-file samples.
fn sample_splitters(
    readers: Vec<EdgeAndCountReader>,
    sizes: &[u64],
    num_threads: usize,
) -> Result<Vec<u128>> {
    let samples_per_thread = 8u64;
    let mut samples: Vec<u128> = Vec::new();
    for (mut reader, &len) in readers.into_iter().zip(sizes) {
        let stride = (len / (samples_per_thread * num_threads as u64)).max(1);
        let mut i = 0u64;
        while reader.valid() {
            if i % stride == 0 {
                samples.push(reader.current().edge);
            }
            reader.advance()?;
            i += 1;
        }
    }
    samples.sort_unstable();
    let take = num_threads - 1;
    let splitters: Vec<u128> = (1..=take)
        .map(|t| samples[t * samples.len() / num_threads])
        .dedup()
        .collect();
    Ok(splitters)
}
