/*
 * SPDX-FileCopyrightText: 2026 The filigree authors
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Bubble removal.
//!
//! From every node with more than one outgoing edge a bounded
//! breadth-first search runs forward, recording for each discovered node
//! its predecessor edge and path length. When the search rediscovers a
//! node along a second path, the two predecessor chains are reconstructed
//! and compared: if their lengths and banded edit distance stay within
//! the configured tolerances the pair is a bubble, the path with the
//! lower mean multiplicity loses, and its unshared edges are marked in a
//! per-worker deletion bitmap. Bitmaps are OR-reduced at the end of the
//! pass, paired with reverse complements on symmetric graphs, and applied
//! through the deletion overlay. Passes repeat until nothing is removed.
//!
//! Workers never touch shared mutable graph state; the only
//! synchronization is the final bitmap reduction.

use anyhow::Result;
use log::info;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use super::{Edge, Graph, Node};
use crate::kmer::Rank;
use crate::utils::{run_batch_task, WorkerToken};

pub struct TourBus<'a> {
    graph: &'a mut Graph,
    max_sequence_length: u64,
    max_edit_distance: u64,
    max_relative_errors: f64,
    coverage_cutoff: u64,
    coverage_relative_cutoff: f64,
    num_threads: usize,
    max_passes: usize,
    removed_edges: u64,
}

#[derive(Clone, Copy)]
struct NodeInfo {
    pred_edge: Edge,
    pred_rank: Rank,
    pred_node: Node,
    length: u64,
}

impl<'a> TourBus<'a> {
    pub fn new(graph: &'a mut Graph) -> Self {
        let k = graph.k();
        TourBus {
            graph,
            max_sequence_length: 2 * k + 12,
            max_edit_distance: 3,
            max_relative_errors: 0.2,
            coverage_cutoff: 1,
            coverage_relative_cutoff: 0.2,
            num_threads: num_cpus::get(),
            max_passes: 100,
            removed_edges: 0,
        }
    }

    pub fn set_num_threads(&mut self, threads: usize) -> &mut Self {
        self.num_threads = threads.max(1);
        self
    }

    pub fn set_maximum_sequence_length(&mut self, len: u64) -> &mut Self {
        self.max_sequence_length = len;
        self
    }

    pub fn set_maximum_edit_distance(&mut self, dist: u64) -> &mut Self {
        self.max_edit_distance = dist;
        self
    }

    pub fn set_maximum_relative_errors(&mut self, eps: f64) -> &mut Self {
        self.max_relative_errors = eps;
        self
    }

    pub fn set_coverage_cutoff(&mut self, cutoff: u64) -> &mut Self {
        self.coverage_cutoff = cutoff;
        self
    }

    pub fn set_coverage_relative_cutoff(&mut self, cutoff: f64) -> &mut Self {
        self.coverage_relative_cutoff = cutoff;
        self
    }

    pub fn set_max_passes(&mut self, passes: usize) -> &mut Self {
        self.max_passes = passes;
        self
    }

    pub fn removed_edges_count(&self) -> u64 {
        self.removed_edges
    }

    /// Run passes to a fixpoint (or the pass budget). Returns the total
    /// number of edges removed.
    pub fn run(&mut self) -> Result<u64> {
        for p in 0..self.max_passes {
            if !self.pass()? {
                info!("tour bus converged after {} passes", p);
                break;
            }
        }
        Ok(self.removed_edges)
    }

    /// One pass over every branching node. Returns whether any edge was
    /// removed.
    pub fn pass(&mut self) -> Result<bool> {
        let count = self.graph.count();
        if count == 0 {
            return Ok(false);
        }
        let words = (count as usize).div_ceil(64);
        let num_workers = self.num_threads.max(1);
        let chunk = count.div_ceil(num_workers as u64).max(1);

        let bitmaps: Mutex<Vec<Vec<u64>>> = Mutex::new(Vec::new());
        {
            let graph: &Graph = self.graph;
            let bitmaps = &bitmaps;
            let this: &TourBus = self;
            let workers: Vec<_> = (0..num_workers as u64)
                .map(|w| {
                    move |token: &WorkerToken| -> Result<()> {
                        let lo = w * chunk;
                        let hi = ((w + 1) * chunk).min(count);
                        let mut bitmap = vec![0u64; words];
                        let mut rank = lo;
                        while rank < hi {
                            if !token.report_work_done(1) {
                                return Ok(());
                            }
                            let edge = graph.select(rank)?;
                            let node = graph.from(edge);
                            let (begin, end) = graph.begin_end_rank(node)?;
                            if rank == begin && end - begin > 1 {
                                this.visit_source(graph, node, &mut bitmap)?;
                            }
                            // Step to the next node's first edge.
                            rank = rank.max(end.max(rank + 1));
                        }
                        if bitmap.iter().any(|&w| w != 0) {
                            bitmaps.lock().unwrap().push(bitmap);
                        }
                        Ok(())
                    }
                })
                .collect();
            run_batch_task(workers, None)?;
        }

        let mut merged = vec![0u64; words];
        for bitmap in bitmaps.into_inner().unwrap() {
            for (m, w) in merged.iter_mut().zip(bitmap) {
                *m |= w;
            }
        }

        // Keep symmetric graphs symmetric.
        if !self.graph.asymmetric() {
            let snapshot: Vec<Rank> = iter_bits(&merged).collect();
            for rank in snapshot {
                let edge = self.graph.select(rank)?;
                let rc = self.graph.reverse_complement(edge);
                let (present, rc_rank) = self.graph.access_and_rank(rc)?;
                if present {
                    merged[(rc_rank / 64) as usize] |= 1 << (rc_rank % 64);
                }
            }
        }

        let removed: u64 = merged.iter().map(|w| w.count_ones() as u64).sum();
        if removed == 0 {
            return Ok(false);
        }
        self.graph.remove(iter_bits(&merged))?;
        self.removed_edges += removed;
        info!("tour bus pass removed {} edges", removed);
        Ok(true)
    }

    /// Clean the bubbles reachable from a single branching node.
    pub fn single_node(&mut self, node: Node) -> Result<bool> {
        let count = self.graph.count();
        let mut bitmap = vec![0u64; (count as usize).div_ceil(64)];
        self.visit_source(self.graph, node, &mut bitmap)?;
        let removed: u64 = bitmap.iter().map(|w| w.count_ones() as u64).sum();
        if removed == 0 {
            return Ok(false);
        }
        self.graph.remove(iter_bits(&bitmap))?;
        self.removed_edges += removed;
        Ok(true)
    }

    /// Rebuild the cleaned graph through a fresh builder.
    pub fn write_modified_graph(&self, builder: &mut super::GraphBuilder) -> Result<()> {
        for pair in self.graph.iter() {
            let (edge, count) = pair?;
            builder.push_back(edge.0 .0, count as u64)?;
        }
        Ok(())
    }

    fn visit_source(&self, graph: &Graph, source: Node, bitmap: &mut [u64]) -> Result<()> {
        let mut info: HashMap<Node, NodeInfo> = HashMap::new();
        let mut frontier: VecDeque<(Node, u64)> = VecDeque::new();
        frontier.push_back((source, 0));

        while let Some((node, length)) = frontier.pop_front() {
            if length >= self.max_sequence_length {
                continue;
            }
            let (begin, end) = graph.begin_end_rank(node)?;
            for rank in begin..end {
                if get_bit(bitmap, rank) {
                    continue; // already condemned in this pass
                }
                let edge = graph.select(rank)?;
                let next = graph.to(edge);
                if next == source {
                    continue;
                }
                if info.contains_key(&next) {
                    self.consider_bubble(graph, source, &mut info, next, node, edge, rank, bitmap)?;
                } else {
                    info.insert(
                        next,
                        NodeInfo {
                            pred_edge: edge,
                            pred_rank: rank,
                            pred_node: node,
                            length: length + 1,
                        },
                    );
                    frontier.push_back((next, length + 1));
                }
            }
        }
        Ok(())
    }

    /// `next` was rediscovered from `node` via `edge`: compare the
    /// incumbent path to the new one and maybe condemn the weaker.
    #[allow(clippy::too_many_arguments)]
    fn consider_bubble(
        &self,
        graph: &Graph,
        source: Node,
        info: &mut HashMap<Node, NodeInfo>,
        next: Node,
        node: Node,
        edge: Edge,
        rank: Rank,
        bitmap: &mut [u64],
    ) -> Result<()> {
        let incumbent = reconstruct(source, info, next);
        let mut challenger = reconstruct(source, info, node);
        challenger.push((rank, edge));

        // The challenger must not run through the rediscovered node.
        if challenger.iter().any(|&(_, e)| graph.to(e) == next && e != edge) {
            return Ok(());
        }

        let len1 = info[&next].length;
        debug_assert_eq!(len1, incumbent.len() as u64);
        let len2 = challenger.len() as u64;
        if len1.abs_diff(len2) > self.max_edit_distance {
            return Ok(());
        }

        let seq1: Vec<u8> = incumbent.iter().map(|&(_, e)| (e.0 .0 & 3) as u8).collect();
        let seq2: Vec<u8> = challenger.iter().map(|&(_, e)| (e.0 .0 & 3) as u8).collect();
        let dist = edit_distance(&seq1, &seq2, self.max_edit_distance);
        let max_len = len1.max(len2);
        if dist > self.max_edit_distance
            || dist as f64 > self.max_relative_errors * max_len as f64
        {
            return Ok(());
        }

        let mean1 = mean_multiplicity(graph, &incumbent)?;
        let mean2 = mean_multiplicity(graph, &challenger)?;

        // The incumbent wins ties.
        let incumbent_weaker = mean2 > mean1;
        let (weaker, stronger, weaker_mean, stronger_mean) = if incumbent_weaker {
            (&incumbent, &challenger, mean1, mean2)
        } else {
            (&challenger, &incumbent, mean2, mean1)
        };

        if weaker_mean > self.coverage_cutoff as f64
            && weaker_mean > self.coverage_relative_cutoff * stronger_mean
        {
            return Ok(());
        }

        let shared: std::collections::HashSet<Rank> =
            stronger.iter().map(|&(r, _)| r).collect();
        for &(r, _) in weaker.iter() {
            if !shared.contains(&r) {
                set_bit(bitmap, r);
            }
        }

        if incumbent_weaker {
            // Future paths through the join must follow the survivor.
            info.insert(
                next,
                NodeInfo {
                    pred_edge: edge,
                    pred_rank: rank,
                    pred_node: node,
                    length: len2,
                },
            );
        }
        Ok(())
    }
}

fn get_bit(bitmap: &[u64], rank: Rank) -> bool {
    bitmap[(rank / 64) as usize] & (1 << (rank % 64)) != 0
}

fn set_bit(bitmap: &mut [u64], rank: Rank) {
    bitmap[(rank / 64) as usize] |= 1 << (rank % 64);
}

fn iter_bits(bitmap: &[u64]) -> impl Iterator<Item = Rank> + '_ {
    bitmap.iter().enumerate().flat_map(|(i, &word)| {
        let mut w = word;
        std::iter::from_fn(move || {
            if w == 0 {
                return None;
            }
            let bit = w.trailing_zeros() as u64;
            w &= w - 1;
            Some(i as u64 * 64 + bit)
        })
    })
}

/// The predecessor chain from the source to `target`, in path order.
fn reconstruct(source: Node, info: &HashMap<Node, NodeInfo>, target: Node) -> Vec<(Rank, Edge)> {
    let mut path = Vec::new();
    let mut node = target;
    while node != source {
        let entry = &info[&node];
        path.push((entry.pred_rank, entry.pred_edge));
        node = entry.pred_node;
    }
    path.reverse();
    path
}

fn mean_multiplicity(graph: &Graph, path: &[(Rank, Edge)]) -> Result<f64> {
    if path.is_empty() {
        return Ok(0.0);
    }
    let mut total = 0u64;
    for &(r, _) in path {
        total += graph.multiplicity_at(r)? as u64;
    }
    Ok(total as f64 / path.len() as f64)
}

/// Banded edit distance; anything beyond `max` comes back as `max + 1`.
fn edit_distance(a: &[u8], b: &[u8], max: u64) -> u64 {
    let n = a.len();
    let m = b.len();
    let mut prev: Vec<u64> = (0..=m as u64).collect();
    let mut curr = vec![0u64; m + 1];
    for i in 1..=n {
        curr[0] = i as u64;
        let mut row_min = curr[0];
        for j in 1..=m {
            let sub = prev[j - 1] + (a[i - 1] != b[j - 1]) as u64;
            curr[j] = sub.min(prev[j] + 1).min(curr[j - 1] + 1);
            row_min = row_min.min(curr[j]);
        }
        if row_min > max {
            return max + 1;
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[m].min(max + 1)
}
