/*
 * SPDX-FileCopyrightText: 2026 The filigree authors
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Walking maximal linear segments.
//!
//! Each unvisited edge is pushed back to the start of its unbranched
//! segment, the segment is traced forward once, and both orientations of
//! every traversed edge are marked so a contig is reported exactly once
//! regardless of the orientation met first.

use anyhow::Result;

use super::{Edge, Graph};
use crate::kmer::BaseVector;

pub struct ContigWalker<'a> {
    graph: &'a Graph,
    min_length: usize,
}

impl<'a> ContigWalker<'a> {
    pub fn new(graph: &'a Graph, min_length: usize) -> Self {
        ContigWalker { graph, min_length }
    }

    /// All contigs of at least the minimum length, in edge-rank order of
    /// their first-met edge.
    pub fn contigs(&self) -> Result<Vec<BaseVector>> {
        let g = self.graph;
        let count = g.count();
        let mut seen = vec![false; count as usize];
        let mut out = Vec::new();

        for r in 0..count {
            if seen[r as usize] {
                continue;
            }
            let e = g.select(r)?;
            let start = self.segment_start(e)?;
            let seq = self.trace(start, &mut seen)?;
            if seq.len() >= self.min_length {
                out.push(seq);
            }
        }
        Ok(out)
    }

    /// Walk back to the first edge of the unbranched segment holding `e`.
    fn segment_start(&self, e: Edge) -> Result<Edge> {
        let g = self.graph;
        let mut start = e;
        loop {
            let n = g.from(start);
            if g.in_degree(n)? != 1 || g.out_degree(n)? != 1 {
                return Ok(start);
            }
            let prev = g.only_in_edge(n)?;
            if prev == e {
                return Ok(start); // a cycle
            }
            start = prev;
        }
    }

    /// Trace the segment forward, marking both orientations.
    fn trace(&self, start: Edge, seen: &mut [bool]) -> Result<BaseVector> {
        let g = self.graph;
        let mut seq = BaseVector::new();
        g.node_seq(g.from(start), &mut seq);

        let mut e = start;
        loop {
            seen[g.rank(e)? as usize] = true;
            let rc = g.reverse_complement(e);
            let (present, rc_rank) = g.access_and_rank(rc)?;
            if present {
                seen[rc_rank as usize] = true;
            }
            seq.push((e.0 .0 & 3) as u8);

            let n = g.to(e);
            if g.out_degree(n)? != 1 || g.in_degree(n)? != 1 {
                return Ok(seq);
            }
            let next = g.only_out_edge(n)?;
            if next == start || seen[g.rank(next)? as usize] {
                return Ok(seq);
            }
            e = next;
        }
    }
}
