/*
 * SPDX-FileCopyrightText: 2026 The filigree authors
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Integer arrays of 8- to 128-bit items with byte-granular storage.
//!
//! A width factory rounds the requested bit width up to a multiple of
//! eight and picks either a directly mapped array (8/16/32/64) or a
//! recursive upper/lower split across two narrower arrays (`.upr`/`.lwr`
//! file suffixes). `lower_bound` on a split array first narrows the range
//! on the upper bits, then searches the equal-upper run in the lower
//! array, giving logarithmic lookups at any width.

use anyhow::{bail, Result};

use super::mapped::{LazyIterator as MappedLazyIterator, MappedArray, MappedArrayBuilder, Word};
use crate::error::Error;
use crate::utils::{tuned_lower_bound, tuned_upper_bound, FileFactory};

/// Round `bits` up to a width the factory can store.
pub fn round_up_bits(bits: u64) -> u64 {
    bits.clamp(8, 128).div_ceil(8) * 8
}

/// How a (rounded) width splits into upper and lower parts.
///
/// Widths up to 64 that are not a machine width split against the widest
/// machine width below them; wider ones put the overflow above a 64-bit
/// lower part.
fn split_bits(bits: u64) -> (u64, u64) {
    debug_assert!(bits % 8 == 0 && (8..=128).contains(&bits));
    match bits {
        24 => (8, 16),
        40 => (8, 32),
        48 => (16, 32),
        56 => (24, 32),
        72..=128 => (bits - 64, 64),
        _ => unreachable!("width {} is directly mapped", bits),
    }
}

fn is_direct(bits: u64) -> bool {
    matches!(bits, 8 | 16 | 32 | 64)
}

#[derive(Debug)]
pub enum IntegerArray {
    U8(MappedArray<u8>),
    U16(MappedArray<u16>),
    U32(MappedArray<u32>),
    U64(MappedArray<u64>),
    Stacked {
        lwr_bits: u64,
        upr: Box<IntegerArray>,
        lwr: Box<IntegerArray>,
    },
}

impl IntegerArray {
    /// Open an array of the given (rounded) width.
    pub fn new(bits: u64, base_name: &str, factory: &dyn FileFactory) -> Result<Self> {
        if bits != round_up_bits(bits) {
            bail!(Error::General(format!(
                "invalid integer array width {}",
                bits
            )));
        }
        Ok(match bits {
            8 => IntegerArray::U8(MappedArray::new(base_name, factory)?),
            16 => IntegerArray::U16(MappedArray::new(base_name, factory)?),
            32 => IntegerArray::U32(MappedArray::new(base_name, factory)?),
            64 => IntegerArray::U64(MappedArray::new(base_name, factory)?),
            _ => {
                let (upr_bits, lwr_bits) = split_bits(bits);
                IntegerArray::Stacked {
                    lwr_bits,
                    upr: Box::new(IntegerArray::new(
                        upr_bits,
                        &format!("{}.upr", base_name),
                        factory,
                    )?),
                    lwr: Box::new(IntegerArray::new(
                        lwr_bits,
                        &format!("{}.lwr", base_name),
                        factory,
                    )?),
                }
            }
        })
    }

    pub fn len(&self) -> usize {
        match self {
            IntegerArray::U8(a) => a.len(),
            IntegerArray::U16(a) => a.len(),
            IntegerArray::U32(a) => a.len(),
            IntegerArray::U64(a) => a.len(),
            IntegerArray::Stacked { upr, .. } => upr.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> u128 {
        match self {
            IntegerArray::U8(a) => a.get(index) as u128,
            IntegerArray::U16(a) => a.get(index) as u128,
            IntegerArray::U32(a) => a.get(index) as u128,
            IntegerArray::U64(a) => a.get(index) as u128,
            IntegerArray::Stacked { lwr_bits, upr, lwr } => {
                (upr.get(index) << lwr_bits) | lwr.get(index)
            }
        }
    }

    /// Least index in `[begin, end)` whose value is `>= value`, or `end`.
    pub fn lower_bound(&self, begin: usize, end: usize, value: u128) -> usize {
        fn direct<T: Word>(a: &MappedArray<T>, begin: usize, end: usize, value: u128) -> usize {
            // Values above the storable range compare greater than all.
            if value >> (8 * T::BYTES) != 0 {
                return end;
            }
            let key = T::from_u64(value as u64);
            begin + tuned_lower_bound(&a.as_slice()[begin..end], key)
        }
        match self {
            IntegerArray::U8(a) => direct(a, begin, end, value),
            IntegerArray::U16(a) => direct(a, begin, end, value),
            IntegerArray::U32(a) => direct(a, begin, end, value),
            IntegerArray::U64(a) => direct(a, begin, end, value),
            IntegerArray::Stacked { lwr_bits, upr, lwr } => {
                let upr_val = value >> lwr_bits;
                let lwr_val = value & ((1u128 << lwr_bits) - 1);
                let begin = upr.lower_bound(begin, end, upr_val);
                let end = upr.upper_bound(begin, end, upr_val);
                lwr.lower_bound(begin, end, lwr_val)
            }
        }
    }

    /// Least index in `[begin, end)` whose value is `> value`, or `end`.
    pub fn upper_bound(&self, begin: usize, end: usize, value: u128) -> usize {
        fn direct<T: Word>(a: &MappedArray<T>, begin: usize, end: usize, value: u128) -> usize {
            if value >> (8 * T::BYTES) != 0 {
                return end;
            }
            let key = T::from_u64(value as u64);
            begin + tuned_upper_bound(&a.as_slice()[begin..end], key)
        }
        match self {
            IntegerArray::U8(a) => direct(a, begin, end, value),
            IntegerArray::U16(a) => direct(a, begin, end, value),
            IntegerArray::U32(a) => direct(a, begin, end, value),
            IntegerArray::U64(a) => direct(a, begin, end, value),
            IntegerArray::Stacked { lwr_bits, upr, lwr } => {
                let upr_val = value >> lwr_bits;
                let lwr_val = value & ((1u128 << lwr_bits) - 1);
                let begin = upr.lower_bound(begin, end, upr_val);
                let end = upr.upper_bound(begin, end, upr_val);
                lwr.upper_bound(begin, end, lwr_val)
            }
        }
    }

    pub fn builder(
        bits: u64,
        base_name: &str,
        factory: &dyn FileFactory,
    ) -> Result<IntegerArrayBuilder> {
        if bits != round_up_bits(bits) {
            bail!(Error::General(format!(
                "invalid integer array width {}",
                bits
            )));
        }
        Ok(match bits {
            8 => IntegerArrayBuilder::U8(MappedArray::builder(base_name, factory)?),
            16 => IntegerArrayBuilder::U16(MappedArray::builder(base_name, factory)?),
            32 => IntegerArrayBuilder::U32(MappedArray::builder(base_name, factory)?),
            64 => IntegerArrayBuilder::U64(MappedArray::builder(base_name, factory)?),
            _ => {
                let (upr_bits, lwr_bits) = split_bits(bits);
                IntegerArrayBuilder::Stacked {
                    lwr_bits,
                    upr: Box::new(IntegerArray::builder(
                        upr_bits,
                        &format!("{}.upr", base_name),
                        factory,
                    )?),
                    lwr: Box::new(IntegerArray::builder(
                        lwr_bits,
                        &format!("{}.lwr", base_name),
                        factory,
                    )?),
                }
            }
        })
    }

    pub fn lazy_iter(
        bits: u64,
        base_name: &str,
        factory: &dyn FileFactory,
    ) -> Result<IntegerLazyIter> {
        Ok(match bits {
            8 => IntegerLazyIter::U8(MappedArray::lazy_iter(base_name, factory)?),
            16 => IntegerLazyIter::U16(MappedArray::lazy_iter(base_name, factory)?),
            32 => IntegerLazyIter::U32(MappedArray::lazy_iter(base_name, factory)?),
            64 => IntegerLazyIter::U64(MappedArray::lazy_iter(base_name, factory)?),
            _ => {
                let (upr_bits, lwr_bits) = split_bits(round_up_bits(bits));
                IntegerLazyIter::Stacked {
                    lwr_bits,
                    upr: Box::new(IntegerArray::lazy_iter(
                        upr_bits,
                        &format!("{}.upr", base_name),
                        factory,
                    )?),
                    lwr: Box::new(IntegerArray::lazy_iter(
                        lwr_bits,
                        &format!("{}.lwr", base_name),
                        factory,
                    )?),
                }
            }
        })
    }

    pub fn remove(bits: u64, base_name: &str, factory: &dyn FileFactory) -> Result<()> {
        if is_direct(bits) {
            factory.remove(base_name)
        } else {
            let (upr_bits, lwr_bits) = split_bits(bits);
            IntegerArray::remove(upr_bits, &format!("{}.upr", base_name), factory)?;
            IntegerArray::remove(lwr_bits, &format!("{}.lwr", base_name), factory)
        }
    }
}

pub enum IntegerArrayBuilder {
    U8(MappedArrayBuilder<u8>),
    U16(MappedArrayBuilder<u16>),
    U32(MappedArrayBuilder<u32>),
    U64(MappedArrayBuilder<u64>),
    Stacked {
        lwr_bits: u64,
        upr: Box<IntegerArrayBuilder>,
        lwr: Box<IntegerArrayBuilder>,
    },
}

impl IntegerArrayBuilder {
    pub fn push_back(&mut self, item: u128) -> Result<()> {
        match self {
            IntegerArrayBuilder::U8(b) => b.push_back(item as u8),
            IntegerArrayBuilder::U16(b) => b.push_back(item as u16),
            IntegerArrayBuilder::U32(b) => b.push_back(item as u32),
            IntegerArrayBuilder::U64(b) => b.push_back(item as u64),
            IntegerArrayBuilder::Stacked { lwr_bits, upr, lwr } => {
                upr.push_back(item >> *lwr_bits)?;
                lwr.push_back(item & ((1u128 << *lwr_bits) - 1))
            }
        }
    }

    pub fn end(self) -> Result<()> {
        match self {
            IntegerArrayBuilder::U8(b) => b.end(),
            IntegerArrayBuilder::U16(b) => b.end(),
            IntegerArrayBuilder::U32(b) => b.end(),
            IntegerArrayBuilder::U64(b) => b.end(),
            IntegerArrayBuilder::Stacked { upr, lwr, .. } => {
                upr.end()?;
                lwr.end()
            }
        }
    }
}

pub enum IntegerLazyIter {
    U8(MappedLazyIterator<u8>),
    U16(MappedLazyIterator<u16>),
    U32(MappedLazyIterator<u32>),
    U64(MappedLazyIterator<u64>),
    Stacked {
        lwr_bits: u64,
        upr: Box<IntegerLazyIter>,
        lwr: Box<IntegerLazyIter>,
    },
}

impl IntegerLazyIter {
    pub fn valid(&self) -> bool {
        match self {
            IntegerLazyIter::U8(it) => it.valid(),
            IntegerLazyIter::U16(it) => it.valid(),
            IntegerLazyIter::U32(it) => it.valid(),
            IntegerLazyIter::U64(it) => it.valid(),
            IntegerLazyIter::Stacked { lwr, .. } => lwr.valid(),
        }
    }

    pub fn current(&self) -> u128 {
        match self {
            IntegerLazyIter::U8(it) => it.current() as u128,
            IntegerLazyIter::U16(it) => it.current() as u128,
            IntegerLazyIter::U32(it) => it.current() as u128,
            IntegerLazyIter::U64(it) => it.current() as u128,
            IntegerLazyIter::Stacked { lwr_bits, upr, lwr } => {
                (upr.current() << lwr_bits) | lwr.current()
            }
        }
    }

    pub fn advance(&mut self) -> Result<()> {
        match self {
            IntegerLazyIter::U8(it) => it.advance(),
            IntegerLazyIter::U16(it) => it.advance(),
            IntegerLazyIter::U32(it) => it.advance(),
            IntegerLazyIter::U64(it) => it.advance(),
            IntegerLazyIter::Stacked { upr, lwr, .. } => {
                upr.advance()?;
                lwr.advance()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::MemFileFactory;

    #[test]
    fn widths_round_up() {
        assert_eq!(round_up_bits(1), 8);
        assert_eq!(round_up_bits(8), 8);
        assert_eq!(round_up_bits(9), 16);
        assert_eq!(round_up_bits(27), 32);
        assert_eq!(round_up_bits(65), 72);
        assert_eq!(round_up_bits(128), 128);
        assert_eq!(round_up_bits(200), 128);
    }

    fn check_round_trip(bits: u64, values: &[u128]) {
        let fac = MemFileFactory::new();
        {
            let mut b = IntegerArray::builder(bits, "arr", &fac).unwrap();
            for &v in values {
                b.push_back(v).unwrap();
            }
            b.end().unwrap();
        }
        let a = IntegerArray::new(bits, "arr", &fac).unwrap();
        assert_eq!(a.len(), values.len());
        for (i, &v) in values.iter().enumerate() {
            assert_eq!(a.get(i), v, "width {} index {}", bits, i);
        }
        let mut it = IntegerArray::lazy_iter(bits, "arr", &fac).unwrap();
        for &v in values {
            assert!(it.valid());
            assert_eq!(it.current(), v);
            it.advance().unwrap();
        }
        assert!(!it.valid());
    }

    #[test]
    fn all_widths_round_trip() {
        for bits in (8..=128).step_by(8) {
            let mask = if bits == 128 {
                !0u128
            } else {
                (1u128 << bits) - 1
            };
            let values: Vec<u128> = (0..200u128)
                .map(|i| (i * 0x9E3779B97F4A7C15 + (i << 90)) & mask)
                .collect();
            check_round_trip(bits, &values);
        }
    }

    #[test]
    fn lower_bound_matches_std() {
        for bits in [8u64, 24, 56, 72, 128] {
            let mask = if bits == 128 {
                !0u128
            } else {
                (1u128 << bits) - 1
            };
            let mut values: Vec<u128> = (0..500u128).map(|i| (i * i * 977) & mask).collect();
            values.sort_unstable();
            let fac = MemFileFactory::new();
            {
                let mut b = IntegerArray::builder(bits, "arr", &fac).unwrap();
                for &v in &values {
                    b.push_back(v).unwrap();
                }
                b.end().unwrap();
            }
            let a = IntegerArray::new(bits, "arr", &fac).unwrap();
            for probe in values.iter().copied().chain([0, 1, 12345, mask]) {
                let lb = a.lower_bound(0, values.len(), probe);
                let ub = a.upper_bound(0, values.len(), probe);
                assert_eq!(lb, values.partition_point(|&x| x < probe), "width {}", bits);
                assert_eq!(ub, values.partition_point(|&x| x <= probe), "width {}", bits);
                // Sub-range searches behave like the full-range ones.
                let lb2 = a.lower_bound(10, values.len() - 10, probe);
                assert_eq!(
                    lb2,
                    10 + values[10..values.len() - 10].partition_point(|&x| x < probe)
                );
            }
        }
    }
}
