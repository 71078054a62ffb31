/*
 * SPDX-FileCopyrightText: 2026 The filigree authors
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Constant-time rank over a [`WordyBitVector`].
//!
//! One 64-bit running count per 2¹⁵-bit large block, one 16-bit
//! intra-block count per 2⁸-bit small block, and a popcount over the tail:
//! `rank(p) = large[p >> 15] + small[p >> 8] + popcount(small_start .. p)`.
//!
//! The index is a side file: a fixed header, the small-block table, then
//! the large-block table. It does not copy the bitmap, so queries take the
//! bitmap as an argument.

use anyhow::{bail, Context, Result};
use std::io::{Seek, SeekFrom, Write};

use crate::bits::WordyBitVector;
use crate::error::Error;
use crate::utils::{read_u16_le, read_u64_le, FileFactory, MappedRegion, OutFile};

pub const VERSION: u64 = 2011071201;

pub const LOG_SMALL_BLOCK: u64 = 8;
pub const SMALL_BLOCK: u64 = 1 << LOG_SMALL_BLOCK;
pub const LOG_LARGE_BLOCK: u64 = 15;
pub const LARGE_BLOCK: u64 = 1 << LOG_LARGE_BLOCK;

const MAX_HEADER_SIZE: u64 = 4096;
const SMALLS_PER_LARGE: usize = (LARGE_BLOCK / SMALL_BLOCK) as usize;

#[derive(Debug)]
struct Header {
    size: u64,
    count: u64,
    large_block_array_offset: u64,
    small_block_array_offset: u64,
}

impl Header {
    fn write(&self, out: &mut dyn OutFile) -> Result<()> {
        for v in [
            VERSION,
            self.size,
            self.count,
            self.large_block_array_offset,
            self.small_block_array_offset,
        ] {
            out.write_all(&v.to_le_bytes())?;
        }
        Ok(())
    }

    fn read(bytes: &[u8], name: &str) -> Result<Header> {
        if bytes.len() < 40 {
            bail!(Error::CorruptIndex(format!("{}: truncated header", name)));
        }
        let version = read_u64_le(bytes, 0);
        if version != VERSION {
            return Err(Error::VersionMismatch {
                expected: VERSION,
                found: version,
            })
            .with_context(|| format!("opening rank index {}", name));
        }
        Ok(Header {
            size: read_u64_le(bytes, 8),
            count: read_u64_le(bytes, 16),
            large_block_array_offset: read_u64_le(bytes, 24),
            small_block_array_offset: read_u64_le(bytes, 32),
        })
    }
}

#[derive(Debug)]
pub struct DenseRank {
    region: MappedRegion,
    header: Header,
    small_len: u64,
}

impl DenseRank {
    pub fn new(name: &str, factory: &dyn FileFactory) -> Result<Self> {
        let region = factory
            .map(name)
            .with_context(|| format!("mapping rank index {}", name))?;
        let header = Header::read(region.as_bytes(), name)?;
        let small_len =
            (header.large_block_array_offset - header.small_block_array_offset) / 2;
        Ok(DenseRank {
            region,
            header,
            small_len,
        })
    }

    /// Total number of one bits indexed.
    pub fn count(&self) -> u64 {
        self.header.count
    }

    /// Number of one bits strictly before `pos`.
    pub fn rank(&self, bits: &WordyBitVector, pos: u64) -> u64 {
        if pos >= self.small_len * SMALL_BLOCK {
            return self.header.count;
        }
        let bytes = self.region.as_bytes();
        let small = read_u16_le(
            bytes,
            (self.header.small_block_array_offset + (pos >> LOG_SMALL_BLOCK) * 2) as usize,
        ) as u64;
        let large = read_u64_le(
            bytes,
            (self.header.large_block_array_offset + (pos >> LOG_LARGE_BLOCK) * 8) as usize,
        );
        large + small + bits.popcount_range(pos & !(SMALL_BLOCK - 1), pos)
    }

    pub fn rank0(&self, bits: &WordyBitVector, pos: u64) -> u64 {
        pos - self.rank(bits, pos)
    }

    /// Ranks of two ordered positions; close positions share the scan.
    pub fn rank2(&self, bits: &WordyBitVector, pos1: u64, pos2: u64) -> (u64, u64) {
        debug_assert!(pos1 <= pos2);
        let r1 = self.rank(bits, pos1);
        let r2 = if pos2 - pos1 > SMALL_BLOCK * 2 {
            self.rank(bits, pos2)
        } else {
            r1 + bits.popcount_range(pos1, pos2)
        };
        (r1, r2)
    }

    pub fn count_range(&self, bits: &WordyBitVector, pos1: u64, pos2: u64) -> u64 {
        debug_assert!(pos1 <= pos2);
        if pos2 - pos1 > SMALL_BLOCK * 2 {
            self.rank(bits, pos2) - self.rank(bits, pos1)
        } else {
            bits.popcount_range(pos1, pos2)
        }
    }

    pub fn access_and_rank(&self, bits: &WordyBitVector, pos: u64) -> (bool, u64) {
        (bits.get(pos), self.rank(bits, pos))
    }

    pub fn builder(name: &str, factory: &dyn FileFactory) -> Result<DenseRankBuilder> {
        let mut out = factory
            .open_out(name)
            .with_context(|| format!("creating rank index {}", name))?;
        let header = Header {
            size: 0,
            count: 0,
            large_block_array_offset: 0,
            small_block_array_offset: MAX_HEADER_SIZE,
        };
        header.write(out.as_mut())?;
        pad_to(out.as_mut(), MAX_HEADER_SIZE)?;
        Ok(DenseRankBuilder {
            out,
            header,
            curr_large_block: 0,
            last_large_block_rank: 0,
            small_block_array: vec![0u16; SMALLS_PER_LARGE],
            large_block_array: vec![0],
        })
    }
}

pub(crate) fn pad_to(out: &mut dyn OutFile, target: u64) -> Result<()> {
    let pos = out.stream_position()?;
    debug_assert!(pos <= target);
    let zeros = [0u8; 256];
    let mut left = target - pos;
    while left > 0 {
        let n = left.min(zeros.len() as u64);
        out.write_all(&zeros[..n as usize])?;
        left -= n;
    }
    Ok(())
}

pub(crate) fn align_file_pos(out: &mut dyn OutFile, mask: u64) -> Result<u64> {
    let pos = out.stream_position()?;
    let target = (pos + mask) & !mask;
    pad_to(out, target)?;
    Ok(target)
}

pub struct DenseRankBuilder {
    out: Box<dyn OutFile>,
    header: Header,
    curr_large_block: u64,
    last_large_block_rank: u64,
    small_block_array: Vec<u16>,
    large_block_array: Vec<u64>,
}

impl DenseRankBuilder {
    /// Record a one bit; positions must arrive in increasing order.
    pub fn push_back(&mut self, pos: u64) -> Result<()> {
        while (pos >> LOG_LARGE_BLOCK) != self.curr_large_block {
            self.flush()?;
        }
        let small = ((pos & (LARGE_BLOCK - 1)) >> LOG_SMALL_BLOCK) as usize;
        self.small_block_array[small] += 1;
        Ok(())
    }

    pub fn end(mut self, end_pos: u64) -> Result<()> {
        self.flush()?;

        let last_large_block = end_pos.div_ceil(LARGE_BLOCK);
        while self.curr_large_block < last_large_block {
            self.flush()?;
        }

        align_file_pos(self.out.as_mut(), 15)?;
        self.header.large_block_array_offset = self.out.stream_position()?;
        for &v in &self.large_block_array {
            self.out.write_all(&v.to_le_bytes())?;
        }

        self.header.size = last_large_block;
        self.header.count = self.last_large_block_rank;

        self.out.seek(SeekFrom::Start(0))?;
        self.header.write(self.out.as_mut())?;
        self.out.flush()?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        let mut small_block_rank = 0u16;
        for &c in &self.small_block_array {
            self.out.write_all(&small_block_rank.to_le_bytes())?;
            small_block_rank += c;
        }
        self.last_large_block_rank += small_block_rank as u64;
        self.small_block_array.iter_mut().for_each(|c| *c = 0);
        self.large_block_array.push(self.last_large_block_rank);
        self.curr_large_block += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bits::WordyBitVector;
    use crate::utils::MemFileFactory;

    fn build(positions: &[u64], end: u64) -> (MemFileFactory, WordyBitVector, DenseRank) {
        let fac = MemFileFactory::new();
        {
            let mut bv = WordyBitVector::builder("bits", &fac).unwrap();
            let mut rk = DenseRank::builder("rank", &fac).unwrap();
            for &p in positions {
                bv.push(p).unwrap();
                rk.push_back(p).unwrap();
            }
            bv.pad(end.saturating_sub(1)).unwrap();
            bv.end().unwrap();
            rk.end(end).unwrap();
        }
        let bits = WordyBitVector::new("bits", &fac).unwrap();
        let rank = DenseRank::new("rank", &fac).unwrap();
        (fac, bits, rank)
    }

    #[test]
    fn rank_matches_scalar() {
        let positions: Vec<u64> = (0..3000).map(|i| i * 37 + (i % 5)).collect();
        let end = 3000 * 37 + 64;
        let (_fac, bits, rank) = build(&positions, end);
        assert_eq!(rank.count(), positions.len() as u64);
        for p in (0..end).step_by(61) {
            let expected = positions.iter().filter(|&&x| x < p).count() as u64;
            assert_eq!(rank.rank(&bits, p), expected, "rank({})", p);
            let (r1, r2) = rank.rank2(&bits, p, (p + 100).min(end));
            assert_eq!(r1, expected);
            assert_eq!(
                r2,
                positions
                    .iter()
                    .filter(|&&x| x < (p + 100).min(end))
                    .count() as u64
            );
        }
    }

    #[test]
    fn block_boundaries() {
        // A bitmap that straddles the 256-bit small-block and the
        // 32768-bit large-block boundaries exactly.
        let positions = [0u64, 255, 256, 257, 32767, 32768, 65535];
        let (_fac, bits, rank) = build(&positions, 65536);
        for p in [0u64, 1, 255, 256, 257, 258, 32767, 32768, 32769, 65535, 65536] {
            let expected = positions.iter().filter(|&&x| x < p).count() as u64;
            assert_eq!(rank.rank(&bits, p), expected, "rank({})", p);
        }
    }

    #[test]
    fn version_is_checked() {
        let fac = MemFileFactory::new();
        {
            let rk = DenseRank::builder("rank", &fac).unwrap();
            rk.end(0).unwrap();
        }
        let mut bytes = fac.contents("rank").unwrap().as_ref().clone();
        bytes[0] ^= 0xff;
        fac.add_file("rank", bytes);
        let err = DenseRank::new("rank", &fac).unwrap_err();
        let root = err.root_cause().to_string();
        assert!(root.contains("version mismatch"), "{}", root);
    }
}
