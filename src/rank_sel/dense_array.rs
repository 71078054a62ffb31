/*
 * SPDX-FileCopyrightText: 2026 The filigree authors
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! A static bitmap with constant-time access, rank, and select, persisted
//! as four sibling files: `.header`, `.bits`, `.select`, `.rank`.

use anyhow::{Context, Result};
use std::io::{Read, Write};

use super::{DenseRank, DenseRankBuilder, DenseSelect, DenseSelectBuilder};
use crate::bits::{OnesIter, WordyBitVector, WordyBitVectorBuilder};
use crate::error::Error;
use crate::utils::{read_u64_le, FileFactory};

pub const VERSION: u64 = 2011101401;

pub struct DenseArray {
    size: u64,
    count: u64,
    bits: WordyBitVector,
    select_index: DenseSelect,
    rank_index: DenseRank,
}

impl DenseArray {
    pub fn new(base_name: &str, factory: &dyn FileFactory) -> Result<Self> {
        let header_name = format!("{}.header", base_name);
        let mut header = [0u8; 24];
        factory
            .open_in(&header_name)?
            .read_exact(&mut header)
            .with_context(|| format!("reading {}", header_name))?;
        let version = read_u64_le(&header, 0);
        if version != VERSION {
            return Err(Error::VersionMismatch {
                expected: VERSION,
                found: version,
            })
            .with_context(|| format!("opening {}", header_name));
        }
        Ok(DenseArray {
            size: read_u64_le(&header, 8),
            count: read_u64_le(&header, 16),
            bits: WordyBitVector::new(&format!("{}.bits", base_name), factory)?,
            select_index: DenseSelect::new(&format!("{}.select", base_name), factory, false)?,
            rank_index: DenseRank::new(&format!("{}.rank", base_name), factory)?,
        })
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn access(&self, pos: u64) -> bool {
        self.bits.get(pos)
    }

    pub fn access_and_rank(&self, pos: u64) -> (bool, u64) {
        self.rank_index.access_and_rank(&self.bits, pos)
    }

    pub fn rank(&self, pos: u64) -> u64 {
        self.rank_index.rank(&self.bits, pos)
    }

    pub fn rank2(&self, pos1: u64, pos2: u64) -> (u64, u64) {
        self.rank_index.rank2(&self.bits, pos1, pos2)
    }

    pub fn count_range(&self, pos1: u64, pos2: u64) -> u64 {
        self.rank_index.count_range(&self.bits, pos1, pos2)
    }

    pub fn select(&self, rank: u64) -> Result<u64> {
        self.select_index.select(&self.bits, rank)
    }

    pub fn select2(&self, rank1: u64, rank2: u64) -> Result<(u64, u64)> {
        self.select_index.select2(&self.bits, rank1, rank2)
    }

    pub fn iter(&self) -> OnesIter<'_> {
        self.bits.iter_ones()
    }

    pub fn remove(base_name: &str, factory: &dyn FileFactory) -> Result<()> {
        factory.remove(&format!("{}.header", base_name))?;
        factory.remove(&format!("{}.bits", base_name))?;
        factory.remove(&format!("{}.select", base_name))?;
        factory.remove(&format!("{}.rank", base_name))?;
        Ok(())
    }

    pub fn builder(base_name: &str, factory: &dyn FileFactory) -> Result<DenseArrayBuilder> {
        Ok(DenseArrayBuilder {
            header_out: factory.open_out(&format!("{}.header", base_name))?,
            bits: WordyBitVector::builder(&format!("{}.bits", base_name), factory)?,
            select_index: DenseSelect::builder(&format!("{}.select", base_name), factory, false)?,
            rank_index: DenseRank::builder(&format!("{}.rank", base_name), factory)?,
            count: 0,
        })
    }
}

pub struct DenseArrayBuilder {
    header_out: Box<dyn crate::utils::OutFile>,
    bits: WordyBitVectorBuilder,
    select_index: DenseSelectBuilder,
    rank_index: DenseRankBuilder,
    count: u64,
}

impl DenseArrayBuilder {
    /// Record a one bit; positions must be strictly increasing.
    pub fn push_back(&mut self, pos: u64) -> Result<()> {
        self.bits.push(pos)?;
        self.select_index.push_back(pos)?;
        self.rank_index.push_back(pos)?;
        self.count += 1;
        Ok(())
    }

    pub fn end(self, size: u64) -> Result<()> {
        let mut bits = self.bits;
        if size > 0 {
            bits.pad(size - 1)?;
        }
        bits.end()?;
        self.select_index.end()?;
        self.rank_index.end(size)?;

        let mut out = self.header_out;
        out.write_all(&VERSION.to_le_bytes())?;
        out.write_all(&size.to_le_bytes())?;
        out.write_all(&self.count.to_le_bytes())?;
        out.flush()?;
        Ok(())
    }
}
