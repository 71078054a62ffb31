/*
 * SPDX-FileCopyrightText: 2026 The filigree authors
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! An Elias–Fano bitmap over a virtual space of up to 2¹²⁸ positions.
//!
//! Positions split into a high part (encoded unary in a bit vector: one
//! bit per element, a zero at every bucket boundary) and a `D` low bits
//! stored in an [`IntegerArray`]. `D` is chosen from the expected size and
//! population so the high-bits vector stays dense; two [`DenseSelect`]
//! companions (zeros locate buckets, ones accelerate select) complete the
//! structure. Artefacts: `.header`, `.high-bits`, `.low-bits*`, `-d0`,
//! `-d1`.

use anyhow::{bail, Context, Result};
use std::io::{Read, Write};

use super::integer::{round_up_bits, IntegerArray, IntegerArrayBuilder, IntegerLazyIter};
use crate::bits::{LazyOnesIter, WordyBitVector, WordyBitVectorBuilder};
use crate::error::Error;
use crate::rank_sel::{DenseSelect, DenseSelectBuilder};
use crate::utils::{read_u128_le, read_u64_le, FileFactory, OutFile};

pub const VERSION: u64 = 2012030501;

pub use crate::kmer::Rank;

#[derive(Debug, Clone)]
struct Header {
    d: u64,
    quantized_d: u64,
    d_mask: u128,
    size: u128,
    count: u64,
}

impl Header {
    fn with_d(d: u64) -> Self {
        Header {
            d,
            quantized_d: round_up_bits(d),
            d_mask: low_mask(d),
            size: 0,
            count: 0,
        }
    }

    fn read(name: &str, factory: &dyn FileFactory) -> Result<Header> {
        let mut buf = [0u8; 64];
        factory
            .open_in(name)?
            .read_exact(&mut buf)
            .with_context(|| format!("reading {}", name))?;
        let version = read_u64_le(&buf, 0);
        if version != VERSION {
            return Err(Error::VersionMismatch {
                expected: VERSION,
                found: version,
            })
            .with_context(|| format!("opening {}", name));
        }
        Ok(Header {
            d: read_u64_le(&buf, 8),
            quantized_d: read_u64_le(&buf, 16),
            d_mask: read_u128_le(&buf, 24),
            size: read_u128_le(&buf, 40),
            count: read_u64_le(&buf, 56),
        })
    }

    fn write(&self, out: &mut dyn OutFile) -> Result<()> {
        out.write_all(&VERSION.to_le_bytes())?;
        out.write_all(&self.d.to_le_bytes())?;
        out.write_all(&self.quantized_d.to_le_bytes())?;
        out.write_all(&self.d_mask.to_le_bytes())?;
        out.write_all(&self.size.to_le_bytes())?;
        out.write_all(&self.count.to_le_bytes())?;
        Ok(())
    }
}

#[inline]
fn low_mask(d: u64) -> u128 {
    if d >= 128 {
        !0
    } else {
        (1u128 << d) - 1
    }
}

#[derive(Debug)]
pub struct SparseArray {
    header: Header,
    high_bits: WordyBitVector,
    d0: DenseSelect,
    d1: DenseSelect,
    low_bits: IntegerArray,
}

impl SparseArray {
    pub fn new(base_name: &str, factory: &dyn FileFactory) -> Result<Self> {
        let header = Header::read(&format!("{}.header", base_name), factory)?;
        let high_bits = WordyBitVector::new(&format!("{}.high-bits", base_name), factory)?;
        let d0 = DenseSelect::new(&format!("{}-d0", base_name), factory, true)?;
        let d1 = DenseSelect::new(&format!("{}-d1", base_name), factory, false)?;
        let low_bits = IntegerArray::new(
            header.quantized_d,
            &format!("{}.low-bits", base_name),
            factory,
        )?;
        Ok(SparseArray {
            header,
            high_bits,
            d0,
            d1,
            low_bits,
        })
    }

    pub fn size(&self) -> u128 {
        self.header.size
    }

    pub fn count(&self) -> Rank {
        self.header.count
    }

    /// The bucket's element range in the low-bits array.
    fn find_low_order_group(&self, pos_d: u64) -> Result<(u64, u64)> {
        if self.header.d >= 128 {
            return Ok((0, self.low_bits.len() as u64));
        }
        if pos_d == 0 {
            return Ok((0, self.d0.select(&self.high_bits, 0)?));
        }
        let (first, second) = self.d0.select2(&self.high_bits, pos_d - 1, pos_d)?;
        let first = first + 1;
        Ok((
            first.saturating_sub(pos_d),
            second.saturating_sub(pos_d),
        ))
    }

    fn search_low_bits(&self, begin: u64, end: u64, value: u128) -> u64 {
        self.low_bits
            .lower_bound(begin as usize, end as usize, value) as u64
    }

    pub fn access(&self, pos: u128) -> Result<bool> {
        let (found, _) = self.access_and_rank(pos)?;
        Ok(found)
    }

    pub fn access_and_rank(&self, pos: u128) -> Result<(bool, Rank)> {
        let pos_d = (pos >> self.header.d) as u64;
        let (lo, hi) = self.find_low_order_group(pos_d)?;
        debug_assert!(hi <= self.low_bits.len() as u64);
        let j = pos & self.header.d_mask;
        let rank = self.search_low_bits(lo, hi, j);
        if rank >= hi {
            return Ok((false, rank));
        }
        Ok((self.low_bits.get(rank as usize) == j, rank))
    }

    pub fn rank(&self, pos: u128) -> Result<Rank> {
        if pos >= self.header.size {
            return Ok(self.header.count);
        }
        let pos_d = (pos >> self.header.d) as u64;
        let (lo, hi) = self.find_low_order_group(pos_d)?;
        debug_assert!(hi <= self.low_bits.len() as u64);
        Ok(self.search_low_bits(lo, hi, pos & self.header.d_mask))
    }

    /// Ranks of two ordered positions, sharing the bucket lookup when both
    /// land in the same bucket.
    pub fn rank2(&self, lhs: u128, rhs: u128) -> Result<(Rank, Rank)> {
        debug_assert!(lhs <= rhs);
        if lhs >= self.header.size || rhs >= self.header.size {
            return Ok((self.rank(lhs)?, self.rank(rhs)?));
        }
        let pos_d_lhs = (lhs >> self.header.d) as u64;
        let pos_d_rhs = (rhs >> self.header.d) as u64;
        if pos_d_lhs != pos_d_rhs {
            return Ok((self.rank(lhs)?, self.rank(rhs)?));
        }
        let (lo, hi) = self.find_low_order_group(pos_d_lhs)?;
        debug_assert!(hi <= self.low_bits.len() as u64);
        let first = self.search_low_bits(lo, hi, lhs & self.header.d_mask);
        let second = self.search_low_bits(first, hi, rhs & self.header.d_mask);
        Ok((first, second))
    }

    pub fn select(&self, rank: Rank) -> Result<u128> {
        debug_assert!(rank < self.header.count);
        let mut pos = 0u128;
        if self.header.d < 128 {
            let h = self.d1.select(&self.high_bits, rank)?;
            pos = ((h - rank) as u128) << self.header.d;
        }
        Ok(pos | self.low_bits.get(rank as usize))
    }

    /// Select of two ordered ranks, sharing the block lookup.
    pub fn select2(&self, rank1: Rank, rank2: Rank) -> Result<(u128, u128)> {
        debug_assert!(rank1 < rank2);
        if self.header.d >= 128 {
            return Ok((
                self.low_bits.get(rank1 as usize),
                self.low_bits.get(rank2 as usize),
            ));
        }
        let (h1, h2) = self.d1.select2(&self.high_bits, rank1, rank2)?;
        Ok((
            (((h1 - rank1) as u128) << self.header.d) | self.low_bits.get(rank1 as usize),
            (((h2 - rank2) as u128) << self.header.d) | self.low_bits.get(rank2 as usize),
        ))
    }

    pub fn iter(&self) -> SparseArrayIter<'_> {
        SparseArrayIter {
            array: self,
            hi: Box::new(self.high_bits.iter_ones()),
            index: 0,
        }
    }

    pub fn lazy_iter(base_name: &str, factory: &dyn FileFactory) -> Result<SparseArrayLazyIter> {
        let header = Header::read(&format!("{}.header", base_name), factory)?;
        let hi = WordyBitVector::lazy_iter_ones(&format!("{}.high-bits", base_name), factory)?;
        let low = IntegerArray::lazy_iter(
            header.quantized_d,
            &format!("{}.low-bits", base_name),
            factory,
        )?;
        Ok(SparseArrayLazyIter {
            d: header.d,
            count: header.count,
            index: 0,
            hi,
            low,
        })
    }

    pub fn remove(base_name: &str, factory: &dyn FileFactory) -> Result<()> {
        let header = Header::read(&format!("{}.header", base_name), factory)?;
        factory.remove(&format!("{}.header", base_name))?;
        factory.remove(&format!("{}.high-bits", base_name))?;
        factory.remove(&format!("{}-d0", base_name))?;
        factory.remove(&format!("{}-d1", base_name))?;
        IntegerArray::remove(
            header.quantized_d,
            &format!("{}.low-bits", base_name),
            factory,
        )
    }

    /// Builder sized from the expected final size `n` and population `m`.
    pub fn builder(
        base_name: &str,
        factory: &dyn FileFactory,
        n: u128,
        m: Rank,
    ) -> Result<SparseArrayBuilder> {
        Self::builder_with_d(base_name, factory, choose_d(n, m))
    }

    pub fn builder_with_d(
        base_name: &str,
        factory: &dyn FileFactory,
        d: u64,
    ) -> Result<SparseArrayBuilder> {
        let header = Header::with_d(d);
        Ok(SparseArrayBuilder {
            low_bits: IntegerArray::builder(
                header.quantized_d,
                &format!("{}.low-bits", base_name),
                factory,
            )?,
            high_bits: WordyBitVector::builder(&format!("{}.high-bits", base_name), factory)?,
            d0: DenseSelect::builder(&format!("{}-d0", base_name), factory, true)?,
            d1: DenseSelect::builder(&format!("{}-d1", base_name), factory, false)?,
            header_out: factory.open_out(&format!("{}.header", base_name))?,
            header,
            bit_num: 0,
            last_high_bit: 0,
        })
    }
}

/// D ≈ log₂(n / (m·log₂e)), clamped to the storable widths.
fn choose_d(n: u128, m: Rank) -> u64 {
    let n = n as f64;
    let m = m as f64;
    let d0 = (n / ((1.0 + m) * std::f64::consts::LOG2_E)).log2();
    (d0.ceil() as i64).clamp(8, 128) as u64
}

pub struct SparseArrayBuilder {
    header: Header,
    bit_num: u64,
    last_high_bit: u64,
    high_bits: WordyBitVectorBuilder,
    d0: DenseSelectBuilder,
    d1: DenseSelectBuilder,
    low_bits: IntegerArrayBuilder,
    header_out: Box<dyn OutFile>,
}

impl SparseArrayBuilder {
    /// Record a set bit; positions must be strictly increasing.
    pub fn push_back(&mut self, pos: u128) -> Result<()> {
        let nd = pos >> self.header.d;
        if nd > u64::MAX as u128 {
            bail!(Error::General(
                "sparse array position overflows the bucket space".into()
            ));
        }

        let h = nd as u64 + self.bit_num;
        self.bit_num += 1;

        self.high_bits.push(h)?;

        while self.last_high_bit < h {
            self.d0.push_back(self.last_high_bit)?;
            self.last_high_bit += 1;
        }
        self.d1.push_back(h)?;
        self.last_high_bit = h + 1;

        self.low_bits.push_back(pos & self.header.d_mask)?;

        debug_assert!(pos >= self.header.size);
        self.header.size = pos + 1;
        self.header.count += 1;
        Ok(())
    }

    pub fn end(mut self, n: u128) -> Result<()> {
        self.header.size = n;
        let nd = n >> self.header.d;
        if nd > u64::MAX as u128 {
            bail!(Error::General(
                "sparse array size overflows the bucket space".into()
            ));
        }

        // Guarantee a zero for every possible bucket value.
        let h = nd as u64 + self.header.count + 2;
        while self.last_high_bit < h {
            self.d0.push_back(self.last_high_bit)?;
            self.last_high_bit += 1;
        }
        self.high_bits.pad(self.last_high_bit)?;

        self.high_bits.end()?;
        self.low_bits.end()?;
        self.d0.end()?;
        self.d1.end()?;
        self.header.write(self.header_out.as_mut())?;
        self.header_out.flush()?;
        Ok(())
    }
}

pub struct SparseArrayIter<'a> {
    array: &'a SparseArray,
    hi: Box<dyn Iterator<Item = u64> + 'a>,
    index: u64,
}

impl Iterator for SparseArrayIter<'_> {
    type Item = u128;

    fn next(&mut self) -> Option<u128> {
        if self.index >= self.array.count() {
            return None;
        }
        let h = self.hi.next()?;
        let i = self.index;
        self.index += 1;
        Some((((h - i) as u128) << self.array.header.d) | self.array.low_bits.get(i as usize))
    }
}

/// Streaming cursor over a persisted sparse array.
pub struct SparseArrayLazyIter {
    d: u64,
    count: u64,
    index: u64,
    hi: LazyOnesIter,
    low: IntegerLazyIter,
}

impl SparseArrayLazyIter {
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn valid(&self) -> bool {
        self.index < self.count && self.hi.valid() && self.low.valid()
    }

    pub fn current(&self) -> u128 {
        debug_assert!(self.valid());
        (((self.hi.current() - self.index) as u128) << self.d) | self.low.current()
    }

    pub fn advance(&mut self) -> Result<()> {
        self.hi.advance()?;
        self.low.advance()?;
        self.index += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::MemFileFactory;

    fn build(positions: &[u128], n: u128, m: u64) -> (MemFileFactory, SparseArray) {
        let fac = MemFileFactory::new();
        {
            let mut b = SparseArray::builder("sa", &fac, n, m).unwrap();
            for &p in positions {
                b.push_back(p).unwrap();
            }
            b.end(n).unwrap();
        }
        let a = SparseArray::new("sa", &fac).unwrap();
        (fac, a)
    }

    #[test]
    fn rank_select_inverse() {
        let positions: Vec<u128> = (0..5000u128).map(|i| i * 1931 + (i % 11)).collect();
        let n = positions.last().unwrap() + 1;
        let (_fac, a) = build(&positions, n, positions.len() as u64);
        assert_eq!(a.count(), positions.len() as u64);
        for (i, &p) in positions.iter().enumerate() {
            assert!(a.access(p).unwrap(), "access({})", p);
            assert_eq!(a.rank(p).unwrap(), i as u64);
            assert_eq!(a.select(i as u64).unwrap(), p);
        }
        // Absent positions are rejected and rank is monotone.
        for &p in positions.iter().take(50) {
            if !positions.contains(&(p + 1)) && p + 1 < n {
                assert!(!a.access(p + 1).unwrap());
            }
        }
    }

    #[test]
    fn huge_positions() {
        // Positions beyond 2^64 exercise the wide low-bits arrays.
        let positions: Vec<u128> = (0..300u128).map(|i| (i << 70) + i * i).collect();
        let n = positions.last().unwrap() + 1;
        let (_fac, a) = build(&positions, n, 300);
        for (i, &p) in positions.iter().enumerate() {
            assert!(a.access(p).unwrap());
            assert_eq!(a.select(i as u64).unwrap(), p);
            assert_eq!(a.rank(p).unwrap(), i as u64);
        }
    }

    #[test]
    fn paired_queries() {
        let positions: Vec<u128> = (0..2000u128).map(|i| i * 53).collect();
        let n = positions.last().unwrap() + 1;
        let (_fac, a) = build(&positions, n, 2000);
        for i in (0..1999u64).step_by(13) {
            let (x, y) = a.select2(i, i + 1).unwrap();
            assert_eq!(x, a.select(i).unwrap());
            assert_eq!(y, a.select(i + 1).unwrap());
        }
        for w in positions.windows(2).step_by(17) {
            let (r1, r2) = a.rank2(w[0], w[1]).unwrap();
            assert_eq!(r1, a.rank(w[0]).unwrap());
            assert_eq!(r2, a.rank(w[1]).unwrap());
            // Same-bucket pairs share the lookup.
            let (r3, r4) = a.rank2(w[0], w[0] + 1).unwrap();
            assert_eq!(r3, a.rank(w[0]).unwrap());
            assert_eq!(r4, a.rank(w[0] + 1).unwrap());
        }
    }

    #[test]
    fn empty_array() {
        let (_fac, a) = build(&[], 0, 0);
        assert_eq!(a.count(), 0);
        assert_eq!(a.size(), 0);
        assert_eq!(a.rank(0).unwrap(), 0);
        assert_eq!(a.rank(12345).unwrap(), 0);
    }

    #[test]
    fn iterators_yield_positions() {
        let positions: Vec<u128> = (0..1000u128).map(|i| i * 700 + 3).collect();
        let n = positions.last().unwrap() + 1;
        let (fac, a) = build(&positions, n, 1000);
        let eager: Vec<u128> = a.iter().collect();
        assert_eq!(eager, positions);

        let mut it = SparseArray::lazy_iter("sa", &fac).unwrap();
        assert_eq!(it.count(), 1000);
        let mut lazy = Vec::new();
        while it.valid() {
            lazy.push(it.current());
            it.advance().unwrap();
        }
        assert_eq!(lazy, positions);
    }

    #[test]
    fn removal_deletes_all_files() {
        let positions: Vec<u128> = (0..10u128).map(|i| i * 5).collect();
        let (fac, _a) = build(&positions, 50, 10);
        SparseArray::remove("sa", &fac).unwrap();
        assert!(!fac.exists("sa.header"));
        assert!(!fac.exists("sa.high-bits"));
    }
}
