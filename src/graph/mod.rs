/*
 * SPDX-FileCopyrightText: 2026 The filigree authors
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! The de Bruijn graph.
//!
//! An edge is a (k+1)-mer present in the read set; by definition it
//! connects the nodes implied by its first and last k bases. Nodes are
//! never stored: the outgoing edges of node `n` are whichever of the four
//! positions `n<<2 .. n<<2|3` exist in the edge bitmap, so the whole
//! graph algebra reduces to rank and select on a [`SparseArrayView`].
//! Multiplicities sit in a [`VariableByteArray`] indexed by original edge
//! rank, and logical deletion goes through the view's overlay.

use anyhow::{bail, Context, Result};
use bitflags::bitflags;
use std::collections::BTreeMap;
use std::io::{BufRead, Read, Write};

use crate::arrays::{SparseArray, SparseArrayLazyIter, SparseArrayView, VariableByteArray,
    VariableByteLazyIter};
use crate::error::Error;
use crate::kmer::{BaseVector, Kmer, Rank};
use crate::utils::{read_u64_le, FileFactory};

mod build;
pub use build::{build_graph, BuildConfig, GraphBuilder};

mod contigs;
pub use contigs::ContigWalker;

mod tour_bus;
pub use tour_bus::TourBus;

pub const VERSION: u64 = 2011101014;

/// Largest k that fits the 128-bit edge space, one value reserved.
pub const MAX_K: u64 = 62;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct GraphFlags: u64 {
        const ASYMMETRIC = 1 << 0;
    }
}

/// An edge: a (k+1)-mer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Edge(pub Kmer);

/// A node: a k-mer, implied by the edges touching it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Node(pub Kmer);

pub(crate) struct Header {
    pub k: u64,
    pub flags: GraphFlags,
}

impl Header {
    pub(crate) fn read(base_name: &str, factory: &dyn FileFactory) -> Result<Header> {
        let name = format!("{}.header", base_name);
        let mut buf = [0u8; 24];
        factory
            .open_in(&name)?
            .read_exact(&mut buf)
            .with_context(|| format!("reading {}", name))?;
        let version = read_u64_le(&buf, 0);
        if version != VERSION {
            return Err(Error::VersionMismatch {
                expected: VERSION,
                found: version,
            })
            .with_context(|| format!("opening graph {}", base_name));
        }
        let flags = read_u64_le(&buf, 16);
        let flags = GraphFlags::from_bits(flags).ok_or_else(|| {
            Error::CorruptIndex(format!("{}: unknown graph flags {:#x}", name, flags))
        })?;
        Ok(Header {
            k: read_u64_le(&buf, 8),
            flags,
        })
    }

    pub(crate) fn write(&self, base_name: &str, factory: &dyn FileFactory) -> Result<()> {
        let mut out = factory.open_out(&format!("{}.header", base_name))?;
        out.write_all(&VERSION.to_le_bytes())?;
        out.write_all(&self.k.to_le_bytes())?;
        out.write_all(&self.flags.bits().to_le_bytes())?;
        out.flush()?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct Graph {
    k: u64,
    flags: GraphFlags,
    /// Mask selecting the low 2k bits (a node).
    m: u128,
    edges: SparseArrayView,
    counts: VariableByteArray,
}

impl Graph {
    pub fn open(base_name: &str, factory: &dyn FileFactory) -> Result<Graph> {
        let header = Header::read(base_name, factory)
            .with_context(|| format!("opening graph {}", base_name))?;
        let edges = SparseArray::new(&format!("{}-edges", base_name), factory)?;
        let counts = VariableByteArray::new(&format!("{}-counts", base_name), factory)?;
        Ok(Graph {
            k: header.k,
            flags: header.flags,
            m: (1u128 << (2 * header.k)) - 1,
            edges: SparseArrayView::new(edges),
            counts,
        })
    }

    /// The k-mer size the graph was built with.
    pub fn k(&self) -> u64 {
        self.k
    }

    pub fn asymmetric(&self) -> bool {
        self.flags.contains(GraphFlags::ASYMMETRIC)
    }

    /// The number of (undeleted) edges.
    pub fn count(&self) -> Rank {
        self.edges.count()
    }

    pub fn edges(&self) -> &SparseArrayView {
        &self.edges
    }

    pub fn counts(&self) -> &VariableByteArray {
        &self.counts
    }

    pub fn rank(&self, edge: Edge) -> Result<Rank> {
        self.edges.rank(edge.0 .0)
    }

    pub fn rank2(&self, lhs: Edge, rhs: Edge) -> Result<(Rank, Rank)> {
        self.edges.rank2(lhs.0 .0, rhs.0 .0)
    }

    pub fn select(&self, rank: Rank) -> Result<Edge> {
        Ok(Edge(Kmer(self.edges.select(rank)?)))
    }

    pub fn access(&self, edge: Edge) -> Result<bool> {
        self.edges.access(edge.0 .0)
    }

    pub fn access_and_rank(&self, edge: Edge) -> Result<(bool, Rank)> {
        self.edges.access_and_rank(edge.0 .0)
    }

    /// Multiplicity of the edge at the given (view) rank.
    pub fn multiplicity_at(&self, rank: Rank) -> Result<u32> {
        self.counts.get(self.edges.original_rank(rank)?)
    }

    pub fn multiplicity(&self, edge: Edge) -> Result<u32> {
        let rank = self.rank(edge)?;
        self.multiplicity_at(rank)
    }

    /// The node an edge proceeds from.
    #[inline]
    pub fn from(&self, edge: Edge) -> Node {
        Node(Kmer(edge.0 .0 >> 2))
    }

    /// The node an edge points to.
    #[inline]
    pub fn to(&self, edge: Edge) -> Node {
        Node(Kmer(edge.0 .0 & self.m))
    }

    /// Ranks of the first edge of `node` and of the first edge past it.
    pub fn begin_end_rank(&self, node: Node) -> Result<(Rank, Rank)> {
        let v = node.0 .0 << 2;
        self.edges.rank2(v, v + 4)
    }

    pub fn out_degree(&self, node: Node) -> Result<u64> {
        let (begin, end) = self.begin_end_rank(node)?;
        Ok(end - begin)
    }

    pub fn in_degree(&self, node: Node) -> Result<u64> {
        self.out_degree(self.reverse_complement_node(node))
    }

    pub fn reverse_complement_node(&self, node: Node) -> Node {
        Node(node.0.reverse_complement(self.k))
    }

    pub fn reverse_complement(&self, edge: Edge) -> Edge {
        Edge(edge.0.reverse_complement(self.k + 1))
    }

    pub fn normalize(&self, edge: Edge) -> Edge {
        Edge(edge.0.normalize(self.k + 1))
    }

    pub fn canonical(&self, edge: Edge) -> bool {
        edge.0.is_normal(self.k + 1)
    }

    /// The sole outgoing edge of `node`.
    pub fn only_out_edge(&self, node: Node) -> Result<Edge> {
        debug_assert_eq!(self.out_degree(node)?, 1);
        let (begin, _) = self.begin_end_rank(node)?;
        self.select(begin)
    }

    /// The sole incoming edge of `node`.
    pub fn only_in_edge(&self, node: Node) -> Result<Edge> {
        let e = self.only_out_edge(self.reverse_complement_node(node))?;
        Ok(self.reverse_complement(e))
    }

    /// The lowest outgoing edge of `node` with maximal multiplicity.
    pub fn majority_edge(&self, node: Node) -> Result<Edge> {
        let (begin, end) = self.begin_end_rank(node)?;
        debug_assert!(begin < end);
        let mut best = begin;
        let mut best_count = self.multiplicity_at(begin)?;
        for r in begin + 1..end {
            let c = self.multiplicity_at(r)?;
            if c > best_count {
                best = r;
                best_count = c;
            }
        }
        self.select(best)
    }

    /// Sum of multiplicities along the linear run starting at `edge`.
    pub fn weight(&self, edge: Edge) -> Result<u64> {
        let mut total = 0u64;
        let mut e = edge;
        loop {
            total += self.multiplicity(e)? as u64;
            let n = self.to(e);
            if self.out_degree(n)? != 1 || self.in_degree(n)? != 1 {
                return Ok(total);
            }
            e = self.only_out_edge(n)?;
            if e == edge {
                return Ok(total); // a cycle
            }
        }
    }

    /// Append the bases of `node` to `seq`.
    pub fn node_seq(&self, node: Node, seq: &mut BaseVector) {
        for i in 0..self.k {
            seq.push(node.0.base(self.k, i));
        }
    }

    /// Append the bases of `edge` (k+1 of them) to `seq`.
    pub fn edge_seq(&self, edge: Edge, seq: &mut BaseVector) {
        self.node_seq(self.from(edge), seq);
        seq.push((edge.0 .0 & 3) as u8);
    }

    /// Follow out-edges while both endpoints are unbranched; returns the
    /// terminating edge.
    pub fn linear_path(&self, begin: Edge) -> Result<Edge> {
        let mut e = begin;
        loop {
            let n = self.to(e);
            if self.out_degree(n)? != 1 || self.in_degree(n)? != 1 {
                return Ok(e);
            }
            let next = self.only_out_edge(n)?;
            if next == begin {
                return Ok(e); // a cycle
            }
            e = next;
        }
    }

    /// Call `visitor` with every edge (and its rank) on the unbranched run
    /// from `begin` to `end` inclusive.
    pub fn visit_path<V: FnMut(Edge, Rank) -> Result<()>>(
        &self,
        begin: Edge,
        end: Edge,
        mut visitor: V,
    ) -> Result<()> {
        let mut e = begin;
        loop {
            visitor(e, self.rank(e)?)?;
            if e == end {
                return Ok(());
            }
            e = self.only_out_edge(self.to(e))?;
        }
    }

    pub fn path_length(&self, begin: Edge, end: Edge) -> Result<u64> {
        let mut n = 0;
        self.visit_path(begin, end, |_, _| {
            n += 1;
            Ok(())
        })?;
        Ok(n)
    }

    /// Sum of multiplicities from `begin` to `end` inclusive.
    pub fn path_weight(&self, begin: Edge, end: Edge) -> Result<u64> {
        let mut total = 0u64;
        self.visit_path(begin, end, |_, r| {
            total += self.multiplicity_at(r)? as u64;
            Ok(())
        })?;
        Ok(total)
    }

    /// The base sequence spelled by the run from `begin` to `end`.
    pub fn trace_path(&self, begin: Edge, end: Edge, seq: &mut BaseVector) -> Result<()> {
        self.node_seq(self.from(begin), seq);
        self.visit_path(begin, end, |e, _| {
            seq.push((e.0 .0 & 3) as u8);
            Ok(())
        })
    }

    /// The edges of the run from `begin` to `end`.
    pub fn trace_path_edges(&self, begin: Edge, end: Edge) -> Result<Vec<Edge>> {
        let mut edges = Vec::new();
        self.visit_path(begin, end, |e, _| {
            edges.push(e);
            Ok(())
        })?;
        Ok(edges)
    }

    /// Greedily follow the heaviest out-edge from `begin` for up to
    /// `length` bases, appending the spelled sequence.
    pub fn trace_majority_path(
        &self,
        begin: Node,
        length: usize,
        seq: &mut BaseVector,
    ) -> Result<()> {
        let mut n = begin;
        self.node_seq(n, seq);
        while self.out_degree(n)? > 0 && seq.len() < length {
            let e = self.majority_edge(n)?;
            seq.push((e.0 .0 & 3) as u8);
            n = self.to(e);
        }
        Ok(())
    }

    /// Iterate the distinct nodes with outgoing edges, in node order.
    pub fn iter_nodes(&self) -> NodeIter<'_> {
        NodeIter {
            graph: self,
            rank: 0,
        }
    }

    /// Iterate `(edge, multiplicity)` in edge order.
    pub fn iter(&self) -> GraphIter<'_> {
        GraphIter {
            graph: self,
            rank: 0,
        }
    }

    /// Mark the edges at the given view ranks (ascending) deleted.
    pub fn remove<I: Iterator<Item = Rank>>(&mut self, ranks: I) -> Result<()> {
        self.edges.remove(ranks)
    }

    /// The count histogram side file, the canonical size probe.
    pub fn hist(base_name: &str, factory: &dyn FileFactory) -> Result<BTreeMap<u64, u64>> {
        let name = format!("{}-counts-hist.txt", base_name);
        let input = factory.open_in(&name)?;
        let mut hist = BTreeMap::new();
        for line in input.lines() {
            let line = line.with_context(|| format!("reading {}", name))?;
            if line.is_empty() {
                continue;
            }
            let mut fields = line.split('\t');
            let parse = |s: Option<&str>| -> Result<u64> {
                s.and_then(|x| x.parse().ok())
                    .ok_or_else(|| Error::Parse(format!("{}: bad histogram line: {}", name, line)))
                    .map_err(Into::into)
            };
            let count = parse(fields.next())?;
            let freq = parse(fields.next())?;
            hist.insert(count, freq);
        }
        Ok(hist)
    }

    pub fn lazy_iter(base_name: &str, factory: &dyn FileFactory) -> Result<GraphLazyIter> {
        let header = Header::read(base_name, factory)?;
        let count = Self::hist(base_name, factory)?.values().sum();
        Ok(GraphLazyIter {
            k: header.k,
            asymmetric: header.flags.contains(GraphFlags::ASYMMETRIC),
            count,
            edges: SparseArray::lazy_iter(&format!("{}-edges", base_name), factory)?,
            counts: VariableByteArray::lazy_iter(&format!("{}-counts", base_name), factory)?,
        })
    }

    /// Remove every file of the persisted graph.
    pub fn remove_files(base_name: &str, factory: &dyn FileFactory) -> Result<()> {
        factory.remove(&format!("{}.header", base_name))?;
        factory.remove(&format!("{}-counts-hist.txt", base_name))?;
        SparseArray::remove(&format!("{}-edges", base_name), factory)?;
        VariableByteArray::remove(&format!("{}-counts", base_name), factory)
    }
}

pub struct GraphIter<'a> {
    graph: &'a Graph,
    rank: Rank,
}

impl Iterator for GraphIter<'_> {
    type Item = Result<(Edge, u32)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rank >= self.graph.count() {
            return None;
        }
        let r = self.rank;
        self.rank += 1;
        let pair = (|| -> Result<(Edge, u32)> {
            Ok((self.graph.select(r)?, self.graph.multiplicity_at(r)?))
        })();
        Some(pair)
    }
}

/// Iterates the distinct from-nodes of the edge list.
///
/// Nodes with only incoming edges are not returned, though their reverse
/// complements are.
pub struct NodeIter<'a> {
    graph: &'a Graph,
    rank: Rank,
}

impl Iterator for NodeIter<'_> {
    type Item = Result<Node>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rank >= self.graph.count() {
            return None;
        }
        let step = (|| -> Result<Node> {
            let edge = self.graph.select(self.rank)?;
            let node = self.graph.from(edge);
            // Skip the rest of this node's edges.
            let (_, end) = self.graph.begin_end_rank(node)?;
            self.rank = end.max(self.rank + 1);
            Ok(node)
        })();
        Some(step)
    }
}

/// Streaming access to a persisted graph without opening its indexes.
pub struct GraphLazyIter {
    k: u64,
    asymmetric: bool,
    count: u64,
    edges: SparseArrayLazyIter,
    counts: VariableByteLazyIter,
}

impl GraphLazyIter {
    pub fn k(&self) -> u64 {
        self.k
    }

    pub fn asymmetric(&self) -> bool {
        self.asymmetric
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn valid(&self) -> bool {
        self.edges.valid() && self.counts.valid()
    }

    pub fn current(&self) -> (Edge, u32) {
        (Edge(Kmer(self.edges.current())), self.counts.current())
    }

    pub fn advance(&mut self) -> Result<()> {
        self.edges.advance()?;
        self.counts.advance()
    }
}

/// Guard the k range once, at construction sites.
pub(crate) fn check_k(k: u64) -> Result<()> {
    if k > MAX_K {
        bail!(Error::General(format!(
            "unable to build a graph with k={} (maximum {})",
            k, MAX_K
        )));
    }
    Ok(())
}
