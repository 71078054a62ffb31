/*
 * SPDX-FileCopyrightText: 2026 The filigree authors
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Multiplicity storage for 32-bit counts that are mostly small.
//!
//! Three stacked tiers: one byte per element, a second byte for the
//! elements flagged in a sparse "present" bitmap, and a 16-bit word for
//! the minority flagged again at the second tier. Counts saturate at
//! 2²⁴−1; the first saturated push is logged.

use anyhow::Result;
use log::warn;

use super::mapped::{LazyIterator as MappedLazyIterator, MappedArray, MappedArrayBuilder};
use super::sparse::{SparseArray, SparseArrayBuilder, SparseArrayLazyIter};
use crate::utils::FileFactory;

/// Largest storable count.
pub const MAX_COUNT: u32 = (1 << 24) - 1;

#[derive(Debug)]
pub struct VariableByteArray {
    order0: MappedArray<u8>,
    order1_present: SparseArray,
    order1: MappedArray<u8>,
    order2_present: SparseArray,
    order2: MappedArray<u16>,
}

impl VariableByteArray {
    pub fn new(base_name: &str, factory: &dyn FileFactory) -> Result<Self> {
        Ok(VariableByteArray {
            order0: MappedArray::new(&format!("{}.ord0", base_name), factory)?,
            order1_present: SparseArray::new(&format!("{}.ord1p", base_name), factory)?,
            order1: MappedArray::new(&format!("{}.ord1", base_name), factory)?,
            order2_present: SparseArray::new(&format!("{}.ord2p", base_name), factory)?,
            order2: MappedArray::new(&format!("{}.ord2", base_name), factory)?,
        })
    }

    pub fn len(&self) -> usize {
        self.order0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order0.is_empty()
    }

    pub fn get(&self, index: u64) -> Result<u32> {
        let mut result = self.order0.get(index as usize) as u32;
        let (present1, r1) = self.order1_present.access_and_rank(index as u128)?;
        if !present1 {
            return Ok(result);
        }
        result |= (self.order1.get(r1 as usize) as u32) << 8;

        let (present2, r2) = self.order2_present.access_and_rank(r1 as u128)?;
        if !present2 {
            return Ok(result);
        }
        result |= (self.order2.get(r2 as usize) as u32) << 16;
        Ok(result)
    }

    pub fn remove(base_name: &str, factory: &dyn FileFactory) -> Result<()> {
        factory.remove(&format!("{}.ord0", base_name))?;
        SparseArray::remove(&format!("{}.ord1p", base_name), factory)?;
        factory.remove(&format!("{}.ord1", base_name))?;
        SparseArray::remove(&format!("{}.ord2p", base_name), factory)?;
        factory.remove(&format!("{}.ord2", base_name))
    }

    /// `num_items` and `frac` size the present bitmaps: roughly
    /// `num_items * frac` elements are expected to need a second byte.
    pub fn builder(
        base_name: &str,
        factory: &dyn FileFactory,
        num_items: u64,
        frac: f64,
    ) -> Result<VariableByteArrayBuilder> {
        let m1 = ((num_items as f64 * frac) as u64).max(1);
        let m2 = ((m1 as f64 * frac) as u64).max(1);
        Ok(VariableByteArrayBuilder {
            position0: 0,
            position1: 0,
            saturated: false,
            order0: MappedArray::builder(&format!("{}.ord0", base_name), factory)?,
            order1_present: SparseArray::builder(
                &format!("{}.ord1p", base_name),
                factory,
                num_items.max(1) as u128,
                m1,
            )?,
            order1: MappedArray::builder(&format!("{}.ord1", base_name), factory)?,
            order2_present: SparseArray::builder(
                &format!("{}.ord2p", base_name),
                factory,
                m1 as u128,
                m2,
            )?,
            order2: MappedArray::builder(&format!("{}.ord2", base_name), factory)?,
        })
    }

    pub fn lazy_iter(base_name: &str, factory: &dyn FileFactory) -> Result<VariableByteLazyIter> {
        let mut it = VariableByteLazyIter {
            ord0: MappedArray::lazy_iter(&format!("{}.ord0", base_name), factory)?,
            ord1p: SparseArray::lazy_iter(&format!("{}.ord1p", base_name), factory)?,
            ord1: MappedArray::lazy_iter(&format!("{}.ord1", base_name), factory)?,
            ord2p: SparseArray::lazy_iter(&format!("{}.ord2p", base_name), factory)?,
            ord2: MappedArray::lazy_iter(&format!("{}.ord2", base_name), factory)?,
            pos0: 0,
            pos1: 0,
            curr: 0,
            valid: true,
        };
        it.load()?;
        Ok(it)
    }
}

pub struct VariableByteArrayBuilder {
    position0: u64,
    position1: u64,
    saturated: bool,
    order0: MappedArrayBuilder<u8>,
    order1_present: SparseArrayBuilder,
    order1: MappedArrayBuilder<u8>,
    order2_present: SparseArrayBuilder,
    order2: MappedArrayBuilder<u16>,
}

impl VariableByteArrayBuilder {
    pub fn push_back(&mut self, number: u32) -> Result<()> {
        let mut number = number;
        if number > MAX_COUNT {
            if !self.saturated {
                warn!(
                    "count {} exceeds the {} tier limit; saturating",
                    number, MAX_COUNT
                );
                self.saturated = true;
            }
            number = MAX_COUNT;
        }

        let pos = self.position0;
        self.position0 += 1;
        self.order0.push_back((number & 0xff) as u8)?;

        number >>= 8;
        if number == 0 {
            return Ok(());
        }

        self.order1_present.push_back(pos as u128)?;

        let pos = self.position1;
        self.position1 += 1;
        self.order1.push_back((number & 0xff) as u8)?;

        number >>= 8;
        if number == 0 {
            return Ok(());
        }

        self.order2_present.push_back(pos as u128)?;
        self.order2.push_back(number as u16)?;
        Ok(())
    }

    pub fn end(self) -> Result<()> {
        self.order0.end()?;
        self.order1_present.end(self.position0 as u128)?;
        self.order1.end()?;
        self.order2_present.end(self.position1 as u128)?;
        self.order2.end()?;
        Ok(())
    }
}

/// Streaming cursor over a persisted array.
pub struct VariableByteLazyIter {
    ord0: MappedLazyIterator<u8>,
    ord1p: SparseArrayLazyIter,
    ord1: MappedLazyIterator<u8>,
    ord2p: SparseArrayLazyIter,
    ord2: MappedLazyIterator<u16>,
    pos0: u64,
    pos1: u64,
    curr: u32,
    valid: bool,
}

impl VariableByteLazyIter {
    pub fn valid(&self) -> bool {
        self.valid
    }

    pub fn current(&self) -> u32 {
        debug_assert!(self.valid);
        self.curr
    }

    pub fn advance(&mut self) -> Result<()> {
        self.ord0.advance()?;
        self.pos0 += 1;
        self.load()
    }

    fn load(&mut self) -> Result<()> {
        if !self.ord0.valid() {
            self.valid = false;
            return Ok(());
        }
        self.curr = self.ord0.current() as u32;
        while self.ord1p.valid() && self.ord1p.current() < self.pos0 as u128 {
            self.ord1p.advance()?;
            self.ord1.advance()?;
            self.pos1 += 1;
        }
        if !self.ord1p.valid() || self.ord1p.current() > self.pos0 as u128 {
            return Ok(());
        }
        self.curr |= (self.ord1.current() as u32) << 8;
        while self.ord2p.valid() && self.ord2p.current() < self.pos1 as u128 {
            self.ord2p.advance()?;
            self.ord2.advance()?;
        }
        if !self.ord2p.valid() || self.ord2p.current() > self.pos1 as u128 {
            return Ok(());
        }
        self.curr |= (self.ord2.current() as u32) << 16;
        Ok(())
    }
}
