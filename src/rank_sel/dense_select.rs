/*
 * SPDX-FileCopyrightText: 2026 The filigree authors
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Blocked select over a [`WordyBitVector`].
//!
//! One master entry per 2¹³ indexed bits. At build time each block is
//! classified by its range (position of last bit minus position of first):
//! small blocks store 16-bit sampled offsets and finish with a bit scan,
//! intermediate blocks add per-sample sub-tables whose width is chosen per
//! sub-block, and large blocks spill every position to a flat table.
//! Master entries pack a byte offset with a 3-bit type tag; sense can be
//! inverted so the same machinery answers select-on-zeros for the deletion
//! overlay.

use anyhow::{bail, Context, Result};
use std::io::{Seek, SeekFrom, Write};

use super::dense_rank::{align_file_pos, pad_to};
use crate::bits::WordyBitVector;
use crate::error::Error;
use crate::utils::{read_u16_le, read_u32_le, read_u64_le, FileFactory, MappedRegion, OutFile};

pub const VERSION: u64 = 2012092701;

/// Range below which a block is "small".
const LOG_SMALL_RANGE: u64 = 16;
const SMALL_RANGE: u64 = 1 << LOG_SMALL_RANGE;
/// Range below which a block is "intermediate".
const LOG_INTERMEDIATE_RANGE: u64 = 24;
const INTERMEDIATE_RANGE: u64 = 1 << LOG_INTERMEDIATE_RANGE;

/// Indexed bits per master block.
pub const LOG_DEF_BLOCK_SIZE: u64 = 13;
pub const DEF_BLOCK_SIZE: u64 = 1 << LOG_DEF_BLOCK_SIZE;
/// Gap between samples.
pub const LOG_DEF_SAMPLE_RATE: u64 = 6;
pub const DEF_SAMPLE_RATE: u64 = 1 << LOG_DEF_SAMPLE_RATE;

const BLOCK_TYPE_MASK: u64 = 0x7;
const MAX_HEADER_SIZE: u64 = 4096;

const FLAG_INVERT_SENSE: u64 = 1;

const T_SMALL: u64 = 0;
const T_FULL_SPILL64: u64 = 1;
const T_FULL_SPILL32: u64 = 2;
const T_FULL_SPILL16: u64 = 3;
const T_FULL_SPILL8: u64 = 4;
const T_INTERMEDIATE: u64 = 5;

#[derive(Debug)]
struct Header {
    flags: u64,
    index_array_offset: u64,
    rank_array_offset: u64,
    log_block_size: u64,
    block_size: u64,
    log_sample_rate: u64,
    sample_rate: u64,
    num_blocks: u64,
    index_size: u64,
    small_blocks: u64,
    small_blocks_size: u64,
    intermediate_blocks: u64,
    intermediate_blocks_size: u64,
    large_blocks: u64,
    large_blocks_size: u64,
}

impl Header {
    fn new(invert_sense: bool) -> Self {
        Header {
            flags: if invert_sense { FLAG_INVERT_SENSE } else { 0 },
            index_array_offset: 0,
            rank_array_offset: 0,
            log_block_size: LOG_DEF_BLOCK_SIZE,
            block_size: DEF_BLOCK_SIZE,
            log_sample_rate: LOG_DEF_SAMPLE_RATE,
            sample_rate: DEF_SAMPLE_RATE,
            num_blocks: 0,
            index_size: 0,
            small_blocks: 0,
            small_blocks_size: 0,
            intermediate_blocks: 0,
            intermediate_blocks_size: 0,
            large_blocks: 0,
            large_blocks_size: 0,
        }
    }

    fn write(&self, out: &mut dyn OutFile) -> Result<()> {
        for v in [
            VERSION,
            self.flags,
            self.index_array_offset,
            self.rank_array_offset,
            self.log_block_size,
            self.block_size,
            self.log_sample_rate,
            self.sample_rate,
            self.num_blocks,
            self.index_size,
            self.small_blocks,
            self.small_blocks_size,
            self.intermediate_blocks,
            self.intermediate_blocks_size,
            self.large_blocks,
            self.large_blocks_size,
        ] {
            out.write_all(&v.to_le_bytes())?;
        }
        Ok(())
    }

    fn read(bytes: &[u8], name: &str) -> Result<Header> {
        if bytes.len() < 128 {
            bail!(Error::CorruptIndex(format!("{}: truncated header", name)));
        }
        let version = read_u64_le(bytes, 0);
        if version != VERSION {
            return Err(Error::VersionMismatch {
                expected: VERSION,
                found: version,
            })
            .with_context(|| format!("opening select index {}", name));
        }
        let h = Header {
            flags: read_u64_le(bytes, 8),
            index_array_offset: read_u64_le(bytes, 16),
            rank_array_offset: read_u64_le(bytes, 24),
            log_block_size: read_u64_le(bytes, 32),
            block_size: read_u64_le(bytes, 40),
            log_sample_rate: read_u64_le(bytes, 48),
            sample_rate: read_u64_le(bytes, 56),
            num_blocks: read_u64_le(bytes, 64),
            index_size: read_u64_le(bytes, 72),
            small_blocks: read_u64_le(bytes, 80),
            small_blocks_size: read_u64_le(bytes, 88),
            intermediate_blocks: read_u64_le(bytes, 96),
            intermediate_blocks_size: read_u64_le(bytes, 104),
            large_blocks: read_u64_le(bytes, 112),
            large_blocks_size: read_u64_le(bytes, 120),
        };
        // The header is partly redundant; cross-check before trusting it.
        if (1u64 << h.log_block_size) != h.block_size
            || (1u64 << h.log_sample_rate) != h.sample_rate
            || h.small_blocks + h.intermediate_blocks + h.large_blocks != h.num_blocks
        {
            bail!(Error::CorruptIndex(format!("{}: inconsistent header", name)));
        }
        if h.flags & !FLAG_INVERT_SENSE != 0 {
            bail!(Error::CorruptIndex(format!(
                "{}: reserved flag set; the index was probably produced by a newer version",
                name
            )));
        }
        Ok(h)
    }
}

#[derive(Debug)]
pub struct DenseSelect {
    region: MappedRegion,
    header: Header,
}

impl DenseSelect {
    pub fn new(name: &str, factory: &dyn FileFactory, invert_sense: bool) -> Result<Self> {
        let region = factory
            .map(name)
            .with_context(|| format!("mapping select index {}", name))?;
        let header = Header::read(region.as_bytes(), name)?;
        if invert_sense != (header.flags & FLAG_INVERT_SENSE != 0) {
            bail!(Error::CorruptIndex(format!(
                "{}: select index does not have the expected sense",
                name
            )));
        }
        Ok(DenseSelect { region, header })
    }

    #[inline]
    fn invert(&self) -> bool {
        self.header.flags & FLAG_INVERT_SENSE != 0
    }

    #[inline]
    fn select_scan(&self, bits: &WordyBitVector, from: u64, k: u64) -> u64 {
        if self.invert() {
            bits.select_zeros(from, k)
        } else {
            bits.select_ones(from, k)
        }
    }

    #[inline]
    fn index_entry(&self, block_num: u64) -> u64 {
        read_u64_le(
            self.region.as_bytes(),
            (self.header.index_array_offset + block_num * 8) as usize,
        )
    }

    #[inline]
    fn anchor(&self, block_num: u64) -> u64 {
        read_u64_le(
            self.region.as_bytes(),
            (self.header.rank_array_offset + block_num * 8) as usize,
        )
    }

    fn lookup_sub_block(
        &self,
        block_off: u64,
        start_pos: u64,
        sub_block: u16,
        i: u64,
    ) -> Result<u64> {
        let bytes = self.region.as_bytes();
        let data_off = (block_off + (sub_block as u64 & !BLOCK_TYPE_MASK)) as usize;
        let r = i & (self.header.sample_rate - 1);
        match sub_block as u64 & BLOCK_TYPE_MASK {
            T_FULL_SPILL32 => Ok(start_pos + read_u32_le(bytes, data_off + 4 * r as usize) as u64),
            T_FULL_SPILL16 => Ok(start_pos + read_u16_le(bytes, data_off + 2 * r as usize) as u64),
            T_FULL_SPILL8 => Ok(start_pos + bytes[data_off + r as usize] as u64),
            _ => bail!(Error::CorruptIndex(
                "select index sub-block has an unknown type".into()
            )),
        }
    }

    /// Position of the `i`-th indexed bit.
    pub fn select(&self, bits: &WordyBitVector, i: u64) -> Result<u64> {
        let bytes = self.region.as_bytes();
        let block_num = i >> self.header.log_block_size;
        let start_anchor = self.anchor(block_num);
        let il = self.index_entry(block_num);
        let block_off = il & !BLOCK_TYPE_MASK;
        let in_block = i & (self.header.block_size - 1);
        let sub_block_offset = in_block >> self.header.log_sample_rate;

        match il & BLOCK_TYPE_MASK {
            T_SMALL => {
                let sampled = read_u16_le(
                    bytes,
                    (block_off + 2 * sub_block_offset) as usize,
                ) as u64;
                let r = i & (self.header.sample_rate - 1);
                Ok(self.select_scan(bits, start_anchor + sampled, r))
            }
            // A top-level FullSpill64 stores absolute positions.
            T_FULL_SPILL64 => Ok(read_u64_le(bytes, (block_off + 8 * in_block) as usize)),
            T_FULL_SPILL32 => {
                Ok(start_anchor + read_u32_le(bytes, (block_off + 4 * in_block) as usize) as u64)
            }
            T_FULL_SPILL16 => {
                Ok(start_anchor + read_u16_le(bytes, (block_off + 2 * in_block) as usize) as u64)
            }
            T_FULL_SPILL8 => Ok(start_anchor + bytes[(block_off + in_block) as usize] as u64),
            T_INTERMEDIATE => {
                let sub_ptrs_off =
                    block_off + (4u64 << (self.header.log_block_size - self.header.log_sample_rate));
                let sampled =
                    read_u32_le(bytes, (block_off + 4 * sub_block_offset) as usize) as u64;
                let ptr = read_u16_le(bytes, (sub_ptrs_off + 2 * sub_block_offset) as usize);
                let start_pos = start_anchor + sampled;
                if ptr == 0 {
                    let r = i & (self.header.sample_rate - 1);
                    Ok(self.select_scan(bits, start_pos, r))
                } else {
                    self.lookup_sub_block(block_off, start_pos, ptr, i)
                }
            }
            _ => bail!(Error::CorruptIndex(
                "select index block has an unknown type".into()
            )),
        }
    }

    /// Select of two ordered indices; the same-block case shares the
    /// anchor lookup and, for scanned blocks, restarts from the first hit.
    pub fn select2(&self, bits: &WordyBitVector, i: u64, j: u64) -> Result<(u64, u64)> {
        debug_assert!(i < j);
        let bytes = self.region.as_bytes();
        let idx_i = i >> self.header.log_block_size;
        let idx_j = j >> self.header.log_block_size;

        if idx_i != idx_j {
            return Ok((self.select(bits, i)?, self.select(bits, j)?));
        }

        let start_anchor = self.anchor(idx_i);
        let il = self.index_entry(idx_i);
        let block_off = il & !BLOCK_TYPE_MASK;
        let in_block_i = i & (self.header.block_size - 1);
        let in_block_j = j & (self.header.block_size - 1);
        let sbi = in_block_i >> self.header.log_sample_rate;
        let sbj = in_block_j >> self.header.log_sample_rate;

        let mut sub_block: u16 = 0;
        let mut start_pos = start_anchor;

        match il & BLOCK_TYPE_MASK {
            T_SMALL => {
                let pi = start_anchor + read_u16_le(bytes, (block_off + 2 * sbi) as usize) as u64;
                let pj = start_anchor + read_u16_le(bytes, (block_off + 2 * sbj) as usize) as u64;
                let ri = i & (self.header.sample_rate - 1);
                let rj = j & (self.header.sample_rate - 1);
                let pos_i = self.select_scan(bits, pi, ri);
                let pos_j = if pi != pj {
                    self.select_scan(bits, pj, rj)
                } else {
                    self.select_scan(bits, pos_i, rj - ri)
                };
                return Ok((pos_i, pos_j));
            }
            T_FULL_SPILL64 => {
                return Ok((
                    read_u64_le(bytes, (block_off + 8 * in_block_i) as usize),
                    read_u64_le(bytes, (block_off + 8 * in_block_j) as usize),
                ));
            }
            T_FULL_SPILL32 => {
                return Ok((
                    start_anchor + read_u32_le(bytes, (block_off + 4 * in_block_i) as usize) as u64,
                    start_anchor + read_u32_le(bytes, (block_off + 4 * in_block_j) as usize) as u64,
                ));
            }
            T_FULL_SPILL16 => {
                return Ok((
                    start_anchor + read_u16_le(bytes, (block_off + 2 * in_block_i) as usize) as u64,
                    start_anchor + read_u16_le(bytes, (block_off + 2 * in_block_j) as usize) as u64,
                ));
            }
            T_FULL_SPILL8 => {
                return Ok((
                    start_anchor + bytes[(block_off + in_block_i) as usize] as u64,
                    start_anchor + bytes[(block_off + in_block_j) as usize] as u64,
                ));
            }
            T_INTERMEDIATE => {
                let sub_ptrs_off =
                    block_off + (4u64 << (self.header.log_block_size - self.header.log_sample_rate));
                if sbi != sbj {
                    let pi = start_anchor
                        + read_u32_le(bytes, (block_off + 4 * sbi) as usize) as u64;
                    let pj = start_anchor
                        + read_u32_le(bytes, (block_off + 4 * sbj) as usize) as u64;
                    let ptr_i = read_u16_le(bytes, (sub_ptrs_off + 2 * sbi) as usize);
                    let ptr_j = read_u16_le(bytes, (sub_ptrs_off + 2 * sbj) as usize);
                    let pos_i = if ptr_i == 0 {
                        self.select_scan(bits, pi, i & (self.header.sample_rate - 1))
                    } else {
                        self.lookup_sub_block(block_off, pi, ptr_i, i)?
                    };
                    let pos_j = if ptr_j == 0 {
                        self.select_scan(bits, pj, j & (self.header.sample_rate - 1))
                    } else {
                        self.lookup_sub_block(block_off, pj, ptr_j, j)?
                    };
                    return Ok((pos_i, pos_j));
                }
                start_pos = start_anchor
                    + read_u32_le(bytes, (block_off + 4 * sbi) as usize) as u64;
                sub_block = read_u16_le(bytes, (sub_ptrs_off + 2 * sbi) as usize);
            }
            _ => bail!(Error::CorruptIndex(
                "select index block has an unknown type".into()
            )),
        }

        if sub_block == 0 {
            let ri = i & (self.header.sample_rate - 1);
            let rj = j & (self.header.sample_rate - 1);
            let pos_i = self.select_scan(bits, start_pos, ri);
            let pos_j = self.select_scan(bits, pos_i, rj - ri);
            return Ok((pos_i, pos_j));
        }

        let data_off = (block_off + (sub_block as u64 & !BLOCK_TYPE_MASK)) as usize;
        let ri = (i & (self.header.sample_rate - 1)) as usize;
        let rj = (j & (self.header.sample_rate - 1)) as usize;
        match sub_block as u64 & BLOCK_TYPE_MASK {
            T_FULL_SPILL32 => Ok((
                start_pos + read_u32_le(bytes, data_off + 4 * ri) as u64,
                start_pos + read_u32_le(bytes, data_off + 4 * rj) as u64,
            )),
            T_FULL_SPILL16 => Ok((
                start_pos + read_u16_le(bytes, data_off + 2 * ri) as u64,
                start_pos + read_u16_le(bytes, data_off + 2 * rj) as u64,
            )),
            T_FULL_SPILL8 => Ok((
                start_pos + bytes[data_off + ri] as u64,
                start_pos + bytes[data_off + rj] as u64,
            )),
            _ => bail!(Error::CorruptIndex(
                "select index sub-block has an unknown type".into()
            )),
        }
    }

    pub fn builder(
        name: &str,
        factory: &dyn FileFactory,
        invert_sense: bool,
    ) -> Result<DenseSelectBuilder> {
        let mut out = factory
            .open_out(name)
            .with_context(|| format!("creating select index {}", name))?;
        let header = Header::new(invert_sense);
        header.write(out.as_mut())?;
        pad_to(out.as_mut(), MAX_HEADER_SIZE)?;
        Ok(DenseSelectBuilder {
            out,
            header,
            curr_block: Vec::with_capacity(DEF_BLOCK_SIZE as usize),
            index: Vec::new(),
            rank: Vec::new(),
        })
    }
}

pub struct DenseSelectBuilder {
    out: Box<dyn OutFile>,
    header: Header,
    curr_block: Vec<u64>,
    index: Vec<u64>,
    rank: Vec<u64>,
}

impl DenseSelectBuilder {
    /// Record the position of the next indexed bit.
    pub fn push_back(&mut self, pos: u64) -> Result<()> {
        self.curr_block.push(pos);
        if self.curr_block.len() as u64 == self.header.block_size {
            self.flush()?;
        }
        Ok(())
    }

    pub fn end(mut self) -> Result<()> {
        self.flush()?;

        align_file_pos(self.out.as_mut(), 15)?;

        self.header.index_array_offset = self.out.stream_position()?;
        for &v in &self.index {
            self.out.write_all(&v.to_le_bytes())?;
        }
        self.header.index_size += self.index.len() as u64 * 8;

        self.header.rank_array_offset = self.out.stream_position()?;
        for &v in &self.rank {
            self.out.write_all(&v.to_le_bytes())?;
        }
        self.header.index_size += self.rank.len() as u64 * 8;

        self.out.seek(SeekFrom::Start(0))?;
        self.header.write(self.out.as_mut())?;
        self.out.flush()?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if self.curr_block.is_empty() {
            return Ok(());
        }

        let file_position = self.out.stream_position()?;
        debug_assert_eq!(file_position & BLOCK_TYPE_MASK, 0);

        let pp = self.curr_block[0];
        let p = *self.curr_block.last().unwrap();
        let block_range = p - pp;

        self.rank.push(pp);
        if block_range >= INTERMEDIATE_RANGE
            || (self.curr_block.len() as u64) < self.header.block_size
        {
            // Large block, or the final partial block.
            if block_range < 1 << 32 {
                for &pos in &self.curr_block {
                    self.out.write_all(&((pos - pp) as u32).to_le_bytes())?;
                    self.header.large_blocks_size += 4;
                }
                self.index.push(file_position | T_FULL_SPILL32);
            } else {
                for &pos in &self.curr_block {
                    // Absolute positions; FullSpill64 is not anchor-relative.
                    self.out.write_all(&pos.to_le_bytes())?;
                    self.header.large_blocks_size += 8;
                }
                self.index.push(file_position | T_FULL_SPILL64);
            }
            self.header.large_blocks += 1;
        } else if block_range >= SMALL_RANGE {
            self.flush_intermediate(file_position, pp)?;
        } else {
            // Small block: sampled 16-bit offsets, residuals by bit scan.
            let sample_rate = self.header.sample_rate as usize;
            for is in (0..self.curr_block.len()).step_by(sample_rate) {
                let s = (self.curr_block[is] - pp) as u16;
                self.out.write_all(&s.to_le_bytes())?;
                self.header.small_blocks_size += 2;
            }
            self.index.push(file_position | T_SMALL);
            self.header.small_blocks += 1;
        }
        self.curr_block.clear();
        align_file_pos(self.out.as_mut(), BLOCK_TYPE_MASK)?;
        self.header.num_blocks += 1;
        Ok(())
    }

    fn flush_intermediate(&mut self, file_position: u64, pp: u64) -> Result<()> {
        let sample_rate = self.header.sample_rate as usize;

        let mut sub_rank_start = Vec::new();
        let mut sub_block_range = Vec::new();
        let mut internal_ptr: Vec<u16> = Vec::new();

        // Sub-block anchors, 32 bits each.
        for is in (0..self.curr_block.len()).step_by(sample_rate) {
            sub_rank_start.push(self.curr_block[is]);
            sub_block_range
                .push(self.curr_block[is + sample_rate - 1] - self.curr_block[is]);
            let s = (self.curr_block[is] - pp) as u32;
            self.out.write_all(&s.to_le_bytes())?;
            self.header.intermediate_blocks_size += 4;
        }

        let mut sub_block_base = sub_rank_start.len() as u64 * (4 + 2);
        sub_block_base = (sub_block_base + BLOCK_TYPE_MASK) & !BLOCK_TYPE_MASK;

        // Choose sub-block encodings and write the tagged pointers.
        for &range in &sub_block_range {
            let ptr: u16;
            if range <= self.header.block_size >> self.header.log_sample_rate {
                // Small enough for bit scanning.
                ptr = T_SMALL as u16;
            } else if range < 1 << 8 {
                ptr = sub_block_base as u16 | T_FULL_SPILL8 as u16;
                sub_block_base += self.header.sample_rate;
            } else if range < 1 << 16 {
                ptr = sub_block_base as u16 | T_FULL_SPILL16 as u16;
                sub_block_base += self.header.sample_rate * 2;
            } else if range < 1 << 32 {
                ptr = sub_block_base as u16 | T_FULL_SPILL32 as u16;
                sub_block_base += self.header.sample_rate * 4;
            } else {
                bail!(Error::General("intermediate select block too large".into()));
            }
            internal_ptr.push(ptr);
            self.out.write_all(&ptr.to_le_bytes())?;
            self.header.intermediate_blocks_size += 2;
            sub_block_base = (sub_block_base + BLOCK_TYPE_MASK) & !BLOCK_TYPE_MASK;
        }

        if sub_block_base > 1 << 16 {
            bail!(Error::General("intermediate select sub-blocks too large".into()));
        }

        // The sub-block tables themselves.
        for (i, &ptr) in internal_ptr.iter().enumerate() {
            if ptr == 0 {
                continue;
            }
            let start_rank = sub_rank_start[i];
            align_file_pos(self.out.as_mut(), BLOCK_TYPE_MASK)?;
            let lo = i << self.header.log_sample_rate;
            let hi = (i + 1) << self.header.log_sample_rate;
            match ptr as u64 & BLOCK_TYPE_MASK {
                T_FULL_SPILL8 => {
                    for j in lo..hi {
                        let s = (self.curr_block[j] - start_rank) as u8;
                        self.out.write_all(&[s])?;
                        self.header.intermediate_blocks_size += 1;
                    }
                }
                T_FULL_SPILL16 => {
                    for j in lo..hi {
                        let s = (self.curr_block[j] - start_rank) as u16;
                        self.out.write_all(&s.to_le_bytes())?;
                        self.header.intermediate_blocks_size += 2;
                    }
                }
                T_FULL_SPILL32 => {
                    for j in lo..hi {
                        let s = (self.curr_block[j] - start_rank) as u32;
                        self.out.write_all(&s.to_le_bytes())?;
                        self.header.intermediate_blocks_size += 4;
                    }
                }
                _ => unreachable!(),
            }
        }

        self.index.push(file_position | T_INTERMEDIATE);
        self.header.intermediate_blocks += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rank_sel::DenseRank;
    use crate::utils::MemFileFactory;

    fn build(positions: &[u64], end: u64) -> (MemFileFactory, WordyBitVector, DenseSelect) {
        let fac = MemFileFactory::new();
        {
            let mut bv = WordyBitVector::builder("bits", &fac).unwrap();
            let mut sel = DenseSelect::builder("select", &fac, false).unwrap();
            for &p in positions {
                bv.push(p).unwrap();
                sel.push_back(p).unwrap();
            }
            if end > 0 {
                bv.pad(end - 1).unwrap();
            }
            bv.end().unwrap();
            sel.end().unwrap();
        }
        let bits = WordyBitVector::new("bits", &fac).unwrap();
        let sel = DenseSelect::new("select", &fac, false).unwrap();
        (fac, bits, sel)
    }

    #[test]
    fn small_blocks() {
        // A full block of 8192 ones spanning under 2^16 positions takes the
        // sampled small-block representation; the partial tail spills.
        let positions: Vec<u64> = (0..10_000).map(|i| i * 3).collect();
        let (_fac, bits, sel) = build(&positions, 30_100);
        for (i, &p) in positions.iter().enumerate() {
            assert_eq!(sel.select(&bits, i as u64).unwrap(), p, "select({})", i);
        }
    }

    #[test]
    fn sparse_blocks_spill() {
        // Density 1/70000 forces the large-block (spill) representation.
        let positions: Vec<u64> = (0..64).map(|i| i * 70_000).collect();
        let (_fac, bits, sel) = build(&positions, 64 * 70_000);
        for (i, &p) in positions.iter().enumerate() {
            assert_eq!(sel.select(&bits, i as u64).unwrap(), p);
        }
    }

    #[test]
    fn paired_select_matches_two_scalars() {
        let positions: Vec<u64> = (0..10_000u64).map(|i| i * 97 + (i % 13)).collect();
        let (_fac, bits, sel) = build(&positions, positions.last().unwrap() + 1);
        for i in (0..positions.len() as u64 - 1).step_by(509) {
            for j in 1..=196u64 {
                let j = i + j;
                if j >= positions.len() as u64 {
                    break;
                }
                let (a, b) = sel.select2(&bits, i, j).unwrap();
                assert_eq!(a, sel.select(&bits, i).unwrap());
                assert_eq!(b, sel.select(&bits, j).unwrap());
            }
        }
    }

    #[test]
    fn inverted_sense_selects_zeros() {
        let fac = MemFileFactory::new();
        let ones: Vec<u64> = (0..512).map(|i| i * 2).collect(); // evens
        {
            let mut bv = WordyBitVector::builder("bits", &fac).unwrap();
            let mut sel = DenseSelect::builder("select0", &fac, true).unwrap();
            let mut zero = 1;
            for &p in &ones {
                bv.push(p).unwrap();
                if p > 0 {
                    sel.push_back(zero).unwrap();
                    zero += 2;
                }
            }
            bv.pad(1023).unwrap();
            bv.end().unwrap();
            sel.end().unwrap();
        }
        let bits = WordyBitVector::new("bits", &fac).unwrap();
        let sel = DenseSelect::new("select0", &fac, true).unwrap();
        // The i-th zero is at 2i + 1.
        for i in 0..500u64 {
            assert_eq!(sel.select(&bits, i).unwrap(), 2 * i + 1);
        }
    }

    #[test]
    fn select_rank_inverse_on_dense_data() {
        let positions: Vec<u64> = (0..40_000u64).map(|i| i * 7 + i % 3).collect();
        let end = positions.last().unwrap() + 1;
        let fac = MemFileFactory::new();
        {
            let mut bv = WordyBitVector::builder("bits", &fac).unwrap();
            let mut sel = DenseSelect::builder("select", &fac, false).unwrap();
            let mut rk = DenseRank::builder("rank", &fac).unwrap();
            for &p in &positions {
                bv.push(p).unwrap();
                sel.push_back(p).unwrap();
                rk.push_back(p).unwrap();
            }
            bv.end().unwrap();
            sel.end().unwrap();
            rk.end(end).unwrap();
        }
        let bits = WordyBitVector::new("bits", &fac).unwrap();
        let sel = DenseSelect::new("select", &fac, false).unwrap();
        let rk = DenseRank::new("rank", &fac).unwrap();
        for &p in positions.iter().step_by(37) {
            let r = rk.rank(&bits, p);
            assert_eq!(sel.select(&bits, r).unwrap(), p);
        }
    }
}
