/*
 * SPDX-FileCopyrightText: 2026 The filigree authors
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Read parsing and (k+1)-mer extraction.
//!
//! The extractor slides a window over each read and emits every window of
//! k+1 consecutive ACGT bases together with its reverse complement. Any
//! other character (N included) breaks the window; extraction resumes
//! once k+1 clean bases have accumulated again.

use anyhow::{bail, Context, Result};

use super::{base_code, Kmer};
use crate::error::Error;
use crate::utils::{FileFactory, InFile};
use std::io::BufRead;

/// A source of base sequences, one per read.
pub trait ReadSource {
    fn next_read(&mut self) -> Result<Option<String>>;
}

/// FASTA: `>` headers, sequence possibly wrapped over several lines.
pub struct FastaReads {
    name: String,
    input: Box<dyn InFile>,
    pending: Option<String>,
    line_no: u64,
}

impl FastaReads {
    pub fn open(name: &str, factory: &dyn FileFactory) -> Result<Self> {
        Ok(FastaReads {
            name: name.to_owned(),
            input: factory.open_in(name)?,
            pending: None,
            line_no: 0,
        })
    }

    fn next_line(&mut self) -> Result<Option<String>> {
        if let Some(line) = self.pending.take() {
            return Ok(Some(line));
        }
        let mut line = String::new();
        let n = self
            .input
            .read_line(&mut line)
            .with_context(|| format!("reading {}", self.name))?;
        if n == 0 {
            return Ok(None);
        }
        self.line_no += 1;
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(Some(line))
    }
}

impl ReadSource for FastaReads {
    fn next_read(&mut self) -> Result<Option<String>> {
        loop {
            let line = match self.next_line()? {
                None => return Ok(None),
                Some(line) => line,
            };
            if line.is_empty() {
                continue;
            }
            if line.starts_with('>') {
                // Collect sequence lines up to the next header.
                let mut seq = String::new();
                loop {
                    match self.next_line()? {
                        None => break,
                        Some(next) => {
                            if next.starts_with('>') {
                                self.pending = Some(next);
                                break;
                            }
                            seq.push_str(next.trim_end());
                        }
                    }
                }
                return Ok(Some(seq));
            }
            bail!(Error::Parse(format!(
                "{}:{}: expected a '>' header",
                self.name, self.line_no
            )));
        }
    }
}

/// FASTQ: four-line records.
pub struct FastqReads {
    name: String,
    input: Box<dyn InFile>,
    line_no: u64,
}

impl FastqReads {
    pub fn open(name: &str, factory: &dyn FileFactory) -> Result<Self> {
        Ok(FastqReads {
            name: name.to_owned(),
            input: factory.open_in(name)?,
            line_no: 0,
        })
    }

    fn next_line(&mut self) -> Result<Option<String>> {
        let mut line = String::new();
        let n = self
            .input
            .read_line(&mut line)
            .with_context(|| format!("reading {}", self.name))?;
        if n == 0 {
            return Ok(None);
        }
        self.line_no += 1;
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(Some(line))
    }

    fn expect_line(&mut self, what: &str) -> Result<String> {
        match self.next_line()? {
            Some(line) => Ok(line),
            None => bail!(Error::Parse(format!(
                "{}:{}: truncated record ({} missing)",
                self.name, self.line_no, what
            ))),
        }
    }
}

impl ReadSource for FastqReads {
    fn next_read(&mut self) -> Result<Option<String>> {
        let header = loop {
            match self.next_line()? {
                None => return Ok(None),
                Some(line) if line.is_empty() => continue,
                Some(line) => break line,
            }
        };
        if !header.starts_with('@') {
            bail!(Error::Parse(format!(
                "{}:{}: expected an '@' header",
                self.name, self.line_no
            )));
        }
        let seq = self.expect_line("sequence")?;
        let plus = self.expect_line("separator")?;
        if !plus.starts_with('+') {
            bail!(Error::Parse(format!(
                "{}:{}: expected a '+' separator",
                self.name, self.line_no
            )));
        }
        let qual = self.expect_line("quality")?;
        if qual.len() != seq.len() {
            bail!(Error::Parse(format!(
                "{}:{}: quality length {} does not match sequence length {}",
                self.name,
                self.line_no,
                qual.len(),
                seq.len()
            )));
        }
        Ok(Some(seq))
    }
}

/// Emits each (k+1)-mer of the reads and its reverse complement.
pub struct KmerExtractor<S: ReadSource> {
    rho: u64, // window length, k+1
    mask: u128,
    source: S,
    buf: Vec<u128>,
    idx: usize,
}

impl<S: ReadSource> KmerExtractor<S> {
    pub fn new(k: u64, source: S) -> Self {
        let rho = k + 1;
        KmerExtractor {
            rho,
            mask: if rho >= 64 {
                !0u128 >> (128 - 2 * rho)
            } else {
                (1u128 << (2 * rho)) - 1
            },
            source,
            buf: Vec::new(),
            idx: 0,
        }
    }

    /// The next edge, or `None` when the reads are exhausted.
    pub fn next_edge(&mut self) -> Result<Option<u128>> {
        loop {
            if self.idx < self.buf.len() {
                let x = self.buf[self.idx];
                self.idx += 1;
                return Ok(Some(x));
            }
            let read = match self.source.next_read()? {
                None => return Ok(None),
                Some(read) => read,
            };
            self.buf.clear();
            self.idx = 0;
            let mut window = 0u128;
            let mut run = 0u64;
            for b in read.bytes() {
                match base_code(b) {
                    None => run = 0,
                    Some(code) => {
                        window = ((window << 2) | code as u128) & self.mask;
                        run += 1;
                        if run >= self.rho {
                            self.buf.push(window);
                            self.buf.push(Kmer(window).reverse_complement(self.rho).0);
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::MemFileFactory;

    fn extract_all(k: u64, fasta: &str) -> Vec<u128> {
        let fac = MemFileFactory::new();
        fac.add_file("reads.fa", fasta.as_bytes().to_vec());
        let reads = FastaReads::open("reads.fa", &fac).unwrap();
        let mut ex = KmerExtractor::new(k, reads);
        let mut out = Vec::new();
        while let Some(x) = ex.next_edge().unwrap() {
            out.push(x);
        }
        out
    }

    #[test]
    fn both_strands_of_every_window() {
        let edges = extract_all(3, ">r\nACGTA\n");
        // Windows: ACGT, CGTA; each with its reverse complement.
        let expect = |s: &str| Kmer::from_dna(s).unwrap().0;
        assert_eq!(
            edges,
            vec![
                expect("ACGT"),
                expect("ACGT"), // its own rc
                expect("CGTA"),
                expect("TACG"),
            ]
        );
    }

    #[test]
    fn n_breaks_the_window() {
        let edges = extract_all(3, ">r\nACGTNACGT\n");
        // One window either side of the N, each with its reverse complement.
        assert_eq!(edges.len(), 4);
        let with_n = extract_all(3, ">r\nACNGT\n");
        assert!(with_n.is_empty());
    }

    #[test]
    fn short_reads_yield_nothing() {
        assert!(extract_all(27, ">r\nACGTACGT\n").is_empty());
    }

    #[test]
    fn multi_line_fasta() {
        let one = extract_all(5, ">r\nACGTACGTACGT\n");
        let two = extract_all(5, ">r\nACGTAC\nGTACGT\n");
        assert_eq!(one, two);
    }

    #[test]
    fn fastq_matches_fasta() {
        let fac = MemFileFactory::new();
        fac.add_file("reads.fq", "@r\nACGTACGT\n+\nIIIIIIII\n".as_bytes().to_vec());
        let reads = FastqReads::open("reads.fq", &fac).unwrap();
        let mut ex = KmerExtractor::new(3, reads);
        let mut fq = Vec::new();
        while let Some(x) = ex.next_edge().unwrap() {
            fq.push(x);
        }
        assert_eq!(fq, extract_all(3, ">r\nACGTACGT\n"));
    }

    #[test]
    fn malformed_fastq_is_an_error() {
        let fac = MemFileFactory::new();
        fac.add_file("reads.fq", "@r\nACGT\nIIII\n".as_bytes().to_vec());
        let reads = FastqReads::open("reads.fq", &fac).unwrap();
        let mut ex = KmerExtractor::new(3, reads);
        assert!(ex.next_edge().is_err());
    }

    #[test]
    fn poly_a_single_window() {
        // 28 As at k=27: one window, plus its reverse complement.
        let read: String = ">r\n".chars().chain("A".repeat(28).chars()).collect();
        let edges = extract_all(27, &read);
        assert_eq!(edges.len(), 2);
        assert_eq!(edges[0], 0);
        assert_eq!(edges[1], Kmer(0).reverse_complement(28).0);
        assert_ne!(edges[0], edges[1]);
    }
}
