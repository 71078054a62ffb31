/*
 * SPDX-FileCopyrightText: 2026 The filigree authors
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Bubble removal scenarios: error reads against a known genome.

use filigree::graph::{Edge, Graph, GraphBuilder, TourBus};
use filigree::kmer::BaseVector;
use filigree::utils::MemFileFactory;
use std::collections::BTreeMap;

const K: u64 = 7;
const RHO: usize = K as usize + 1;

const GENOME: &str = "GTTCTGGAACGCGCTTCTATTAGGTAGTGCATCTATTTACATCTCTTAGTGCCTAGGGAGTCCTGCATCCCGGCATTAGGCGTGCACAAATGTTTATATT";

const CLEAN_READS: [&str; 3] = [
    "GTTCTGGAACGCGCTTCTATTAGGTAGTGCATCTATTTACATCTCTTAGTGCCTAGGGAGTCCTGCATCCCGGCA",
    "GCGCTTCTATTAGGTAGTGCATCTATTTACATCTCTTAGTGCCTAGGGAGTCCTGCATCCCGGCATTAGGCGTGC",
    "AGTGCATCTATTTACATCTCTTAGTGCCTAGGGAGTCCTGCATCCCGGCATTAGGCGTGCACAAATGTTTATATT",
];

// Reads with a single mid-read substitution each.
const ERROR_READ_1: &str =
    "CTTCTATTAGGTAGTGCATCTATTTACATCTCTTAGTGCCTCGGGAGTCCTGCATCCCGGCATTAGGCGTGCACA";
const ERROR_READ_2: &str =
    "CTTCTATTAGGTAGTGCATCTATTTACATCTCTTATTGCCTAGGGAGTCCTGCATCCCGGCATTAGGCGTGCACA";

fn build(reads: &[&str], fac: &MemFileFactory, name: &str) -> Graph {
    let mut map: BTreeMap<u128, u64> = BTreeMap::new();
    for read in reads {
        let v = BaseVector::from_dna(read);
        for j in 0..=v.len() - RHO {
            let x = v.kmer(RHO, j);
            *map.entry(x.0).or_insert(0) += 1;
            *map.entry(x.reverse_complement(RHO as u64).0).or_insert(0) += 1;
        }
    }
    let mut b = GraphBuilder::new(K, name, fac, map.len() as u64, false).unwrap();
    for (&e, &c) in &map {
        b.push_back(e, c).unwrap();
    }
    b.end().unwrap();
    Graph::open(name, fac).unwrap()
}

fn genome_survives(g: &Graph) {
    let v = BaseVector::from_dna(GENOME);
    for j in 0..=v.len() - RHO {
        assert!(
            g.access(Edge(v.kmer(RHO, j))).unwrap(),
            "genome edge at offset {} was removed",
            j
        );
    }
}

fn clean_and_rebuild(reads: &[&str]) -> (MemFileFactory, Graph, u64) {
    let fac = MemFileFactory::new();
    let mut g = build(reads, &fac, "x");
    let before = g.count();
    let mut tb = TourBus::new(&mut g);
    tb.set_num_threads(1);
    let removed = tb.run().unwrap();
    {
        let mut b = GraphBuilder::new(K, "y", &fac, before - removed, false).unwrap();
        tb.write_modified_graph(&mut b).unwrap();
        b.end().unwrap();
    }
    let out = Graph::open("y", &fac).unwrap();
    (fac, out, removed)
}

#[test]
fn one_error_read() {
    let mut reads = CLEAN_READS.to_vec();
    reads.push(ERROR_READ_1);
    let (_fac, g, removed) = clean_and_rebuild(&reads);
    assert!(removed > 0);
    genome_survives(&g);
}

#[test]
fn two_error_reads() {
    let mut reads = CLEAN_READS.to_vec();
    reads.push(ERROR_READ_1);
    reads.push(ERROR_READ_2);
    let (_fac, g, _removed) = clean_and_rebuild(&reads);
    genome_survives(&g);
}

#[test]
fn variant_edges_are_gone() {
    let mut reads = CLEAN_READS.to_vec();
    reads.push(ERROR_READ_1);
    let (_fac, g, _removed) = clean_and_rebuild(&reads);

    let genome_edges: std::collections::HashSet<u128> = {
        let v = BaseVector::from_dna(GENOME);
        (0..=v.len() - RHO).map(|j| v.kmer(RHO, j).0).collect()
    };
    let v = BaseVector::from_dna(ERROR_READ_1);
    for j in 0..=v.len() - RHO {
        let e = v.kmer(RHO, j);
        if !genome_edges.contains(&e.0) {
            assert!(
                !g.access(Edge(e)).unwrap(),
                "variant edge at offset {} survived",
                j
            );
        }
    }
}

#[test]
fn bubble_free_graph_resaves_identically() {
    let fac = MemFileFactory::new();
    let mut g = build(&CLEAN_READS, &fac, "x");
    let before = g.count();

    let mut tb = TourBus::new(&mut g);
    tb.set_num_threads(2);
    assert!(!tb.pass().unwrap());
    assert_eq!(tb.removed_edges_count(), 0);

    // Re-saving yields byte-identical artefacts.
    {
        let mut b = GraphBuilder::new(K, "y", &fac, before, false).unwrap();
        tb.write_modified_graph(&mut b).unwrap();
        b.end().unwrap();
    }
    assert_eq!(g.count(), before);
    for suffix in [
        ".header",
        "-edges.header",
        "-edges.high-bits",
        "-edges.low-bits",
        "-counts.ord0",
        "-counts-hist.txt",
    ] {
        let x = fac.contents(&format!("x{}", suffix)).unwrap();
        let y = fac.contents(&format!("y{}", suffix)).unwrap();
        assert_eq!(x, y, "artefact {} changed", suffix);
    }
}

#[test]
fn removal_count_matches_the_graph() {
    let mut reads = CLEAN_READS.to_vec();
    reads.push(ERROR_READ_1);
    let fac = MemFileFactory::new();
    let mut g = build(&reads, &fac, "x");
    let before = g.count();
    let mut tb = TourBus::new(&mut g);
    tb.set_num_threads(1);
    let removed = tb.run().unwrap();
    assert_eq!(g.count(), before - removed);
}
