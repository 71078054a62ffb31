/*
 * SPDX-FileCopyrightText: 2026 The filigree authors
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! The real filesystem path: artefacts on disk, memory mapped on read.

use filigree::arrays::SparseArray;
use filigree::graph::{build_graph, BuildConfig, Graph};
use filigree::utils::{FileFactory, PhysicalFileFactory};
use std::io::Write;

#[test]
fn sparse_array_on_disk() {
    let dir = tempfile::Builder::new()
        .prefix("filigree-test-")
        .tempdir()
        .unwrap();
    let fac = PhysicalFileFactory::with_tmp_dir(dir.path());
    let base = dir.path().join("sa");
    let base = base.to_str().unwrap();

    let positions: Vec<u128> = (0..10_000u128).map(|i| i * 331 + (i % 5)).collect();
    let n = positions.last().unwrap() + 1;
    {
        let mut b = SparseArray::builder(base, &fac, n, positions.len() as u64).unwrap();
        for &p in &positions {
            b.push_back(p).unwrap();
        }
        b.end(n).unwrap();
    }

    let a = SparseArray::new(base, &fac).unwrap();
    assert_eq!(a.count(), positions.len() as u64);
    for (i, &p) in positions.iter().enumerate().step_by(13) {
        assert!(a.access(p).unwrap());
        assert_eq!(a.rank(p).unwrap(), i as u64);
        assert_eq!(a.select(i as u64).unwrap(), p);
    }

    SparseArray::remove(base, &fac).unwrap();
    assert!(!fac.exists(&format!("{}.header", base)));
}

#[test]
fn graph_build_on_disk() {
    let dir = tempfile::Builder::new()
        .prefix("filigree-test-")
        .tempdir()
        .unwrap();
    let fac = PhysicalFileFactory::with_tmp_dir(dir.path());

    let reads_path = dir.path().join("reads.fa");
    {
        let mut f = std::fs::File::create(&reads_path).unwrap();
        writeln!(f, ">r1\nGTTCTGGAACGCGCTTCTATTAGGTAGTGCATC").unwrap();
        writeln!(f, ">r2\nGCGCTTCTATTAGGTAGTGCATCTATTTACATC").unwrap();
    }

    let graph_base = dir.path().join("graph");
    let config = BuildConfig {
        k: 9,
        graph_name: graph_base.to_str().unwrap().to_owned(),
        fastas: vec![reads_path.to_str().unwrap().to_owned()],
        fastqs: Vec::new(),
        num_threads: 2,
        buffer_bytes: 1 << 16,
    };
    build_graph(&config, &fac).unwrap();

    let g = Graph::open(graph_base.to_str().unwrap(), &fac).unwrap();
    assert!(g.count() > 0);
    assert_eq!(g.k(), 9);
    for pair in g.iter() {
        let (e, c) = pair.unwrap();
        assert!(c >= 1);
        assert!(g.access(g.reverse_complement(e)).unwrap());
    }
}
