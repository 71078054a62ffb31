/*
 * SPDX-FileCopyrightText: 2026 The filigree authors
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! End-to-end graph construction from reads.

use filigree::graph::{build_graph, BuildConfig, ContigWalker, Edge, Graph, GraphBuilder};
use filigree::kmer::{BaseVector, Kmer};
use filigree::utils::MemFileFactory;
use std::collections::BTreeMap;

fn build(k: u64, fasta: &str, threads: usize) -> (MemFileFactory, Graph) {
    let fac = MemFileFactory::new();
    fac.add_file("reads.fa", fasta.as_bytes().to_vec());
    let config = BuildConfig {
        k,
        graph_name: "graph".to_owned(),
        fastas: vec!["reads.fa".to_owned()],
        fastqs: Vec::new(),
        num_threads: threads,
        buffer_bytes: 1 << 16,
    };
    build_graph(&config, &fac).unwrap();
    let graph = Graph::open("graph", &fac).unwrap();
    (fac, graph)
}

fn rc_str(s: &str) -> String {
    let k = s.len() as u64;
    Kmer::from_dna(s).unwrap().reverse_complement(k).to_dna(k)
}

#[test]
fn tiny_poly_a() {
    // A single 28-base poly-A read at K=27 yields exactly the A-run
    // (k+1)-mer and its reverse complement, symmetrically counted.
    let (_fac, g) = build(27, ">\nAAAAAAAAAAAAAAAAAAAAAAAAAAAA\n", 1);
    assert_eq!(g.count(), 2);
    let e = g.select(0).unwrap();
    let e_rc = g.reverse_complement(e);
    assert_eq!(g.rank(e_rc).unwrap(), 1);
    assert_eq!(g.multiplicity(e).unwrap(), g.multiplicity(e_rc).unwrap());
}

#[test]
fn contig_walk_reproduces_reads() {
    let reads = ["AAGCCCAATAAAC", "CACTCTGACTGGC", "CGAATAGGGATAT"];
    let fasta: String = reads.iter().map(|r| format!(">\n{}\n", r)).collect();
    let (_fac, g) = build(5, &fasta, 1);

    // With no minimum length every read comes back (in one orientation).
    let contigs = ContigWalker::new(&g, 0).contigs().unwrap();
    assert_eq!(contigs.len(), reads.len());
    for read in &reads {
        assert!(
            contigs
                .iter()
                .any(|c| c.to_dna() == *read || c.to_dna() == rc_str(read)),
            "missing {}",
            read
        );
    }

    // A high minimum suppresses everything.
    assert!(ContigWalker::new(&g, 100).contigs().unwrap().is_empty());
}

#[test]
fn iterator_returns_the_pushed_pairs() {
    // Build(graph) then open(): the iterator yields exactly the pushed
    // (edge, count) sequence, sorted.
    let fac = MemFileFactory::new();
    let pairs: Vec<(u128, u64)> = (0..5000u128)
        .map(|i| (i * i * 131 + (i << 64), (i as u64 % 9) + 1))
        .collect();
    {
        let mut b = GraphBuilder::new(40, "g", &fac, pairs.len() as u64, true).unwrap();
        for &(e, c) in &pairs {
            b.push_back(e, c).unwrap();
        }
        b.end().unwrap();
    }
    let g = Graph::open("g", &fac).unwrap();
    assert!(g.asymmetric());
    assert_eq!(g.count(), pairs.len() as u64);
    for (item, &(e, c)) in g.iter().zip(&pairs) {
        let (edge, count) = item.unwrap();
        assert_eq!(edge.0 .0, e);
        assert_eq!(count as u64, c);
    }
}

#[test]
fn empty_removal_leaves_the_graph_unchanged() {
    let (_fac, mut g) = build(7, ">\nGTTCTGGAACGCGCTTCTATTAGG\n", 1);
    let before: Vec<(Edge, u32)> = g.iter().map(|p| p.unwrap()).collect();
    g.remove(std::iter::empty()).unwrap();
    assert_eq!(g.count(), before.len() as u64);
    for (i, item) in g.iter().enumerate() {
        let (e, c) = item.unwrap();
        assert_eq!((e, c), before[i]);
        assert_eq!(g.rank(e).unwrap(), i as u64);
    }
}

#[test]
fn graph_edges_match_a_reference_count() {
    // Cross-check the whole pipeline against a naive map.
    let read = "GTTCTGGAACGCGCTTCTATTAGGTAGTGCATCTATTTACATCTCTTAGTG";
    let k = 9u64;
    let rho = (k + 1) as usize;
    let (_fac, g) = build(k, &format!(">\n{}\n", read), 2);

    let v = BaseVector::from_dna(read);
    let mut expected: BTreeMap<u128, u64> = BTreeMap::new();
    for j in 0..=v.len() - rho {
        let x = v.kmer(rho, j);
        *expected.entry(x.0).or_insert(0) += 1;
        *expected.entry(x.reverse_complement(rho as u64).0).or_insert(0) += 1;
    }
    assert_eq!(g.count(), expected.len() as u64);
    for (&e, &c) in &expected {
        let edge = Edge(Kmer(e));
        assert!(g.access(edge).unwrap());
        assert_eq!(g.multiplicity(edge).unwrap() as u64, c);
    }
}

#[test]
fn fastq_input_builds_the_same_graph() {
    let read = "GTTCTGGAACGCGCTTCTATTAGG";
    let (_fac_a, g_fasta) = build(7, &format!(">\n{}\n", read), 1);

    let fac = MemFileFactory::new();
    fac.add_file(
        "reads.fq",
        format!("@r\n{}\n+\n{}\n", read, "I".repeat(read.len())).into_bytes(),
    );
    let config = BuildConfig {
        k: 7,
        graph_name: "graph".to_owned(),
        fastas: Vec::new(),
        fastqs: vec!["reads.fq".to_owned()],
        num_threads: 1,
        buffer_bytes: 1 << 16,
    };
    build_graph(&config, &fac).unwrap();
    let g_fastq = Graph::open("graph", &fac).unwrap();

    assert_eq!(g_fasta.count(), g_fastq.count());
    for (a, b) in g_fasta.iter().zip(g_fastq.iter()) {
        assert_eq!(a.unwrap(), b.unwrap());
    }
}
