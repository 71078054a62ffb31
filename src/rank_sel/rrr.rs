/*
 * SPDX-FileCopyrightText: 2026 The filigree authors
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Compressed bitmaps with enumerative coding of 15-bit blocks.
//!
//! Each block stores its class (population, 4 bits) and its ordinal within
//! the C(15, class) enumeration (a variable number of bits). Summary words
//! every 2¹⁰ blocks hold the running class sum (rank) and offset sum (bit
//! offset into the ordinal stream). [`RRRRank`] answers access/rank;
//! [`RRRArray`] adds select through two auxiliary rank structures (`Q`
//! marks, within the cumulative one count, where each block boundary falls
//! and `R` marks the first block of every clump of non-empty blocks) plus
//! a clump array of skipped-block counts.

use anyhow::{Context, Result};
use std::io::{Read, Write};
use std::sync::OnceLock;

use crate::arrays::{MappedArray, MappedArrayBuilder};
use crate::bits::{
    FixedWidthBitArray, FixedWidthBitArrayBuilder, VariableWidthBitArray,
    VariableWidthBitArrayBuilder,
};
use crate::codes::EnumerativeCode;
use crate::error::Error;
use crate::utils::{read_u64_le, FileFactory, OutFile};

pub const RANK_VERSION: u64 = 2011032901;
pub const ARRAY_VERSION: u64 = 2011032902;

/// Block width in bits.
pub const U: u64 = 15;
/// Blocks per summary word.
const K: u64 = 1 << 10;

/// Block classes take four bits each.
type ClassList = FixedWidthBitArray<4>;
type ClassListBuilder = FixedWidthBitArrayBuilder<4>;

fn enum_code() -> &'static EnumerativeCode {
    static CODE: OnceLock<EnumerativeCode> = OnceLock::new();
    CODE.get_or_init(|| EnumerativeCode::new(U))
}

fn read_header(name: &str, factory: &dyn FileFactory, version: u64) -> Result<(u64, u64)> {
    let mut buf = [0u8; 24];
    factory
        .open_in(name)?
        .read_exact(&mut buf)
        .with_context(|| format!("reading {}", name))?;
    let found = read_u64_le(&buf, 0);
    if found != version {
        return Err(Error::VersionMismatch {
            expected: version,
            found,
        })
        .with_context(|| format!("opening {}", name));
    }
    Ok((read_u64_le(&buf, 8), read_u64_le(&buf, 16)))
}

fn write_header(
    name: &str,
    factory: &dyn FileFactory,
    version: u64,
    size: u64,
    count: u64,
) -> Result<()> {
    let mut out = factory.open_out(name)?;
    out.write_all(&version.to_le_bytes())?;
    out.write_all(&size.to_le_bytes())?;
    out.write_all(&count.to_le_bytes())?;
    out.flush()?;
    Ok(())
}

/// Rank-only compressed bitmap.
pub struct RRRRank {
    size: u64,
    count: u64,
    class_sum: MappedArray<u64>,
    offset_sum: MappedArray<u64>,
    class_list: ClassList,
    offset_list: VariableWidthBitArray,
}

impl RRRRank {
    pub fn new(base_name: &str, factory: &dyn FileFactory) -> Result<Self> {
        let (size, count) = read_header(&format!("{}.header", base_name), factory, RANK_VERSION)?;
        Ok(RRRRank {
            size,
            count,
            class_sum: MappedArray::new(&format!("{}.class-sum", base_name), factory)?,
            offset_sum: MappedArray::new(&format!("{}.offset-sum", base_name), factory)?,
            class_list: ClassList::new(&format!("{}.classes", base_name), factory)?,
            offset_list: VariableWidthBitArray::new(&format!("{}.offsets", base_name), factory)?,
        })
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Decode the block holding `blk_num`, also yielding the rank of its
    /// first position.
    fn get_block(&self, blk_num: u64) -> (u64, u64) {
        let code = enum_code();
        let sup_blk_num = blk_num / K;
        let mut bit_sum = self.class_sum.get(sup_blk_num as usize);
        let mut off_sum = self.offset_sum.get(sup_blk_num as usize);
        for i in sup_blk_num * K..blk_num {
            let c = self.class_list.get(i);
            bit_sum += c;
            off_sum += code.num_code_bits(c);
        }
        let cls = self.class_list.get(blk_num);
        let blk_sz = code.num_code_bits(cls);
        let blk_ord = self.offset_list.get(off_sum, blk_sz);
        (code.decode(cls, blk_ord), bit_sum)
    }

    pub fn access(&self, pos: u64) -> bool {
        let (blk, _) = self.get_block(pos / U);
        blk & (1 << (pos % U)) != 0
    }

    pub fn access_and_rank(&self, pos: u64) -> (bool, u64) {
        let (blk, prev_rank) = self.get_block(pos / U);
        let off = pos % U;
        let rank = prev_rank + (blk & ((1 << off) - 1)).count_ones() as u64;
        (blk & (1 << off) != 0, rank)
    }

    pub fn rank(&self, pos: u64) -> u64 {
        self.access_and_rank(pos).1
    }

    /// Ranks of two ordered positions, sharing the block decode when both
    /// fall in the same block.
    pub fn rank2(&self, lhs: u64, rhs: u64) -> (u64, u64) {
        if lhs / U != rhs / U {
            return (self.rank(lhs), self.rank(rhs));
        }
        let (blk, prev_rank) = self.get_block(lhs / U);
        let r = |p: u64| prev_rank + (blk & ((1 << (p % U)) - 1)).count_ones() as u64;
        (r(lhs), r(rhs))
    }

    pub fn builder(base_name: &str, factory: &dyn FileFactory) -> Result<RRRRankBuilder> {
        Ok(RRRRankBuilder {
            base_name: base_name.to_owned(),
            curr_file_blk_num: 0,
            curr_blk: 0,
            curr_blk_num: 0,
            class_sum: 0,
            offset_sum: 0,
            size: 0,
            count: 0,
            class_sum_builder: MappedArray::<u64>::builder(
                &format!("{}.class-sum", base_name),
                factory,
            )?,
            offset_sum_builder: MappedArray::<u64>::builder(
                &format!("{}.offset-sum", base_name),
                factory,
            )?,
            class_list_builder: ClassList::builder(
                &format!("{}.classes", base_name),
                factory,
            )?,
            offset_list_builder: VariableWidthBitArray::builder(
                &format!("{}.offsets", base_name),
                factory,
            )?,
        })
    }

    pub fn remove(base_name: &str, factory: &dyn FileFactory) -> Result<()> {
        for suffix in [".header", ".class-sum", ".offset-sum", ".classes", ".offsets"] {
            factory.remove(&format!("{}{}", base_name, suffix))?;
        }
        Ok(())
    }
}

pub struct RRRRankBuilder {
    base_name: String,
    curr_file_blk_num: u64,
    curr_blk: u64,
    curr_blk_num: u64,
    class_sum: u64,
    offset_sum: u64,
    size: u64,
    count: u64,
    class_sum_builder: MappedArrayBuilder<u64>,
    offset_sum_builder: MappedArrayBuilder<u64>,
    class_list_builder: ClassListBuilder,
    offset_list_builder: VariableWidthBitArrayBuilder,
}

impl RRRRankBuilder {
    pub fn push_back(&mut self, pos: u64) -> Result<()> {
        let blk_num = pos / U;
        let bit = pos % U;
        if blk_num != self.curr_blk_num {
            self.flush()?;
            self.curr_blk_num = blk_num;
            self.curr_blk = 0;
        }
        self.curr_blk |= 1 << bit;
        self.count += 1;
        self.size = pos + 1;
        Ok(())
    }

    pub fn end(mut self, n: u64, factory: &dyn FileFactory) -> Result<()> {
        let blk_num = n / U;
        if blk_num != self.curr_blk_num {
            self.flush()?;
            self.curr_blk_num = blk_num;
            self.curr_blk = 0;
        }
        self.flush()?;
        self.size = n;

        write_header(
            &format!("{}.header", self.base_name),
            factory,
            RANK_VERSION,
            self.size,
            self.count,
        )?;

        self.class_sum_builder.end()?;
        self.offset_sum_builder.end()?;
        self.class_list_builder.end()?;
        self.offset_list_builder.end()?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        let code = enum_code();
        while self.curr_file_blk_num < self.curr_blk_num {
            if self.curr_file_blk_num % K == 0 {
                self.class_sum_builder.push_back(self.class_sum)?;
                self.offset_sum_builder.push_back(self.offset_sum)?;
            }
            self.class_list_builder.push_back(0)?;
            self.curr_file_blk_num += 1;
        }

        if self.curr_file_blk_num % K == 0 {
            self.class_sum_builder.push_back(self.class_sum)?;
            self.offset_sum_builder.push_back(self.offset_sum)?;
        }

        let c = self.curr_blk.count_ones() as u64;
        let b = code.num_code_bits(c);
        let o = code.encode(c, self.curr_blk);

        self.class_list_builder.push_back(c)?;
        self.offset_list_builder.push_back(o, b)?;

        self.class_sum += c;
        self.offset_sum += b;
        self.curr_file_blk_num += 1;
        Ok(())
    }
}

/// Compressed bitmap with rank and select.
pub struct RRRArray {
    size: u64,
    count: u64,
    rank: RRRRank,
    rank_q: RRRRank,
    rank_r: RRRRank,
    clump_array: MappedArray<u64>,
}

impl RRRArray {
    pub fn new(base_name: &str, factory: &dyn FileFactory) -> Result<Self> {
        let (size, count) = read_header(&format!("{}.header", base_name), factory, ARRAY_VERSION)?;
        Ok(RRRArray {
            size,
            count,
            rank: RRRRank::new(&format!("{}.rnk", base_name), factory)?,
            rank_q: RRRRank::new(&format!("{}.q", base_name), factory)?,
            rank_r: RRRRank::new(&format!("{}.r", base_name), factory)?,
            clump_array: MappedArray::new(&format!("{}.clump", base_name), factory)?,
        })
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn access(&self, pos: u64) -> bool {
        self.rank.access(pos)
    }

    pub fn access_and_rank(&self, pos: u64) -> (bool, u64) {
        self.rank.access_and_rank(pos)
    }

    pub fn rank(&self, pos: u64) -> u64 {
        self.rank.rank(pos)
    }

    pub fn rank2(&self, lhs: u64, rhs: u64) -> (u64, u64) {
        self.rank.rank2(lhs, rhs)
    }

    pub fn select(&self, rnk: u64) -> u64 {
        let block_rank = self.rank_q.rank(rnk + 1);
        let clump = self.rank_r.rank(block_rank);
        let select_p = self.clump_array.get(clump as usize) + block_rank - 1;
        let (mut blk, prev_rank) = self.rank.get_block(select_p);
        let mut r = rnk - prev_rank;
        while r > 0 {
            blk &= !(blk & blk.wrapping_neg());
            r -= 1;
        }
        select_p * U + blk.trailing_zeros() as u64
    }

    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        (0..self.count).map(|r| self.select(r))
    }

    pub fn builder(base_name: &str, factory: &dyn FileFactory) -> Result<RRRArrayBuilder> {
        Ok(RRRArrayBuilder {
            base_name: base_name.to_owned(),
            start: true,
            bit_num: 0,
            prev_blk_num: !0,
            empty_blks: 0,
            size: 0,
            count: 0,
            rank_builder: RRRRank::builder(&format!("{}.rnk", base_name), factory)?,
            rank_q_builder: RRRRank::builder(&format!("{}.q", base_name), factory)?,
            rank_r_builder: RRRRank::builder(&format!("{}.r", base_name), factory)?,
            clump_array_builder: MappedArray::<u64>::builder(
                &format!("{}.clump", base_name),
                factory,
            )?,
        })
    }
}

pub struct RRRArrayBuilder {
    base_name: String,
    start: bool,
    bit_num: u64,
    prev_blk_num: u64,
    empty_blks: u64,
    size: u64,
    count: u64,
    rank_builder: RRRRankBuilder,
    rank_q_builder: RRRRankBuilder,
    rank_r_builder: RRRRankBuilder,
    clump_array_builder: MappedArrayBuilder<u64>,
}

impl RRRArrayBuilder {
    pub fn push_back(&mut self, pos: u64) -> Result<()> {
        self.count += 1;
        self.size = pos + 1;
        self.rank_builder.push_back(pos)?;
        let blk_num = pos / U;
        if self.start {
            self.clump_array_builder.push_back(blk_num)?;
            self.prev_blk_num = blk_num;
            self.empty_blks = blk_num;
            self.bit_num = 1;
            self.rank_q_builder.push_back(0)?;
            self.start = false;
            return Ok(());
        }

        if blk_num != self.prev_blk_num {
            // First bit in a new block.
            self.rank_q_builder.push_back(self.bit_num)?;

            self.empty_blks += blk_num - self.prev_blk_num - 1;

            if self.prev_blk_num + 1 != blk_num {
                // A new clump starts; record the empty blocks before it.
                self.rank_r_builder.push_back(blk_num - self.empty_blks)?;
                self.clump_array_builder.push_back(self.empty_blks)?;
            }
            self.prev_blk_num = blk_num;
        }
        self.bit_num += 1;
        Ok(())
    }

    pub fn end(mut self, n: u64, factory: &dyn FileFactory) -> Result<()> {
        let blk_num = self.size / U;
        let empty_since_last = blk_num.wrapping_sub(self.prev_blk_num).wrapping_sub(1);
        self.empty_blks = self.empty_blks.wrapping_add(empty_since_last);

        self.size = n;
        write_header(
            &format!("{}.header", self.base_name),
            factory,
            ARRAY_VERSION,
            self.size,
            self.count,
        )?;

        self.rank_builder.end(n, factory)?;
        self.rank_q_builder.end(self.bit_num + 1, factory)?;
        self.rank_r_builder
            .end(blk_num.wrapping_sub(self.empty_blks).wrapping_add(1), factory)?;
        self.clump_array_builder.end()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::MemFileFactory;

    fn build(positions: &[u64], n: u64) -> (MemFileFactory, RRRArray) {
        let fac = MemFileFactory::new();
        {
            let mut b = RRRArray::builder("rrr", &fac).unwrap();
            for &p in positions {
                b.push_back(p).unwrap();
            }
            b.end(n, &fac).unwrap();
        }
        let a = RRRArray::new("rrr", &fac).unwrap();
        (fac, a)
    }

    #[test]
    fn dense_rank_and_select() {
        let positions: Vec<u64> = (0..4000).map(|i| i * 2 + 1).collect();
        let (_fac, a) = build(&positions, 8100);
        assert_eq!(a.count(), 4000);
        for (i, &p) in positions.iter().enumerate() {
            assert!(a.access(p));
            assert!(!a.access(p - 1));
            assert_eq!(a.rank(p), i as u64);
            assert_eq!(a.select(i as u64), p, "select({})", i);
        }
    }

    #[test]
    fn clumped_select() {
        // Several clumps separated by long empty gaps.
        let mut positions = Vec::new();
        for clump in 0..7u64 {
            let base = clump * 40_000;
            for i in 0..50 {
                positions.push(base + i * 3);
            }
        }
        let n = positions.last().unwrap() + 100;
        let (_fac, a) = build(&positions, n);
        for (i, &p) in positions.iter().enumerate() {
            assert_eq!(a.select(i as u64), p, "select({})", i);
            assert_eq!(a.rank2(p, p + 1), (i as u64, i as u64 + 1));
        }
    }

    #[test]
    fn superblock_boundary() {
        // Enough blocks to cross the 2^10-block summary boundary.
        let positions: Vec<u64> = (0..2000).map(|i| i * 31).collect();
        let n = positions.last().unwrap() + 1;
        let (_fac, a) = build(&positions, n);
        for &p in positions.iter().step_by(17) {
            assert_eq!(a.select(a.rank(p)), p);
        }
    }
}
