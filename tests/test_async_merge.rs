/*
 * SPDX-FileCopyrightText: 2026 The filigree authors
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Merging two independently generated edge streams into one graph.

use filigree::graph::Graph;
use filigree::sort::{AsyncMerge, EdgeAndCount, EdgeAndCountWriter};
use filigree::utils::{FileFactory, MemFileFactory};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;

const K: u64 = 25;
const STREAM: usize = 65_536;

fn write_run(fac: &MemFileFactory, name: &str, seed: u64) -> (Vec<EdgeAndCount>, u64) {
    let mut rng = SmallRng::seed_from_u64(seed);
    let mask = (1u128 << (2 * K + 2)) - 1;
    let mut edges: Vec<u128> = (0..STREAM)
        .map(|_| (((rng.random::<u64>() as u128) << 64) | rng.random::<u64>() as u128) & mask)
        .collect();
    edges.sort_unstable();
    edges.dedup();
    let items: Vec<EdgeAndCount> = edges
        .into_iter()
        .map(|e| EdgeAndCount::new(e, rng.random_range(1..4)))
        .collect();
    let mut writer = EdgeAndCountWriter::new(fac.open_out(name).unwrap());
    for item in &items {
        writer.push_back(item).unwrap();
    }
    let len = writer.end().unwrap();
    (items, len)
}

fn check(threads: usize) {
    let fac = MemFileFactory::new();
    let (run_a, len_a) = write_run(&fac, "part-17", 17);
    let (run_b, len_b) = write_run(&fac, "part-18", 18);

    let mut expected: BTreeMap<u128, u64> = BTreeMap::new();
    for item in run_a.iter().chain(&run_b) {
        *expected.entry(item.edge).or_insert(0) += item.count;
    }

    AsyncMerge::merge(
        &["part-17".to_owned(), "part-18".to_owned()],
        &[len_a, len_b],
        "merged",
        K,
        expected.len() as u64,
        threads,
        1024,
        &fac,
    )
    .unwrap();

    let graph = Graph::open("merged", &fac).unwrap();
    assert_eq!(graph.count(), expected.len() as u64);

    // Output is strictly ascending and counts are the per-edge sums.
    let mut prev: Option<u128> = None;
    for (item, (&edge, &count)) in graph.iter().zip(expected.iter()) {
        let (e, c) = item.unwrap();
        assert_eq!(e.0 .0, edge);
        assert_eq!(c as u64, count);
        if let Some(p) = prev {
            assert!(edge > p);
        }
        prev = Some(edge);
    }
}

#[test]
fn merge_single_threaded() {
    check(1);
}

#[test]
fn merge_four_workers() {
    check(4);
}
