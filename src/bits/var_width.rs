/*
 * SPDX-FileCopyrightText: 2026 The filigree authors
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! A bit stream of heterogeneous-width items packed into 64-bit words;
//! items may span a word boundary.

use anyhow::Result;

use crate::arrays::{LazyIterator, MappedArray, MappedArrayBuilder};
use crate::utils::FileFactory;

const W: u64 = 64;

pub struct VariableWidthBitArray {
    words: MappedArray<u64>,
}

impl VariableWidthBitArray {
    pub fn new(name: &str, factory: &dyn FileFactory) -> Result<Self> {
        Ok(VariableWidthBitArray {
            words: MappedArray::new(name, factory)?,
        })
    }

    /// Read `width` bits starting at bit `offset`.
    pub fn get(&self, offset: u64, width: u64) -> u64 {
        if width == 0 {
            return 0;
        }
        let w = (offset / W) as usize;
        let b = offset % W;
        let mask = mask(width);
        if b + width <= W {
            return (self.words.get(w) >> b) & mask;
        }
        let j = W - b;
        ((self.words.get(w) >> b) | (self.words.get(w + 1) << j)) & mask
    }

    pub fn builder(name: &str, factory: &dyn FileFactory) -> Result<VariableWidthBitArrayBuilder> {
        Ok(VariableWidthBitArrayBuilder {
            file: MappedArray::<u64>::builder(name, factory)?,
            pos: 0,
            curr_word: 0,
        })
    }

    pub fn lazy_iter(name: &str, factory: &dyn FileFactory) -> Result<VariableWidthLazyIter> {
        let words = MappedArray::<u64>::lazy_iter(name, factory)?;
        Ok(VariableWidthLazyIter { words, pos: 0 })
    }
}

#[inline]
fn mask(width: u64) -> u64 {
    if width >= 64 {
        !0
    } else {
        (1u64 << width) - 1
    }
}

pub struct VariableWidthBitArrayBuilder {
    file: MappedArrayBuilder<u64>,
    pos: u64,
    curr_word: u64,
}

impl VariableWidthBitArrayBuilder {
    pub fn push_back(&mut self, item: u64, width: u64) -> Result<()> {
        debug_assert!(width <= 64);
        debug_assert!(width == 64 || item >> width == 0);
        if width == 0 {
            return Ok(());
        }
        let b = self.pos % W;
        self.curr_word |= item << b;
        if b + width >= W {
            self.file.push_back(self.curr_word)?;
            self.curr_word = if b == 0 { 0 } else { item >> (W - b) };
        }
        self.pos += width;
        Ok(())
    }

    pub fn end(mut self) -> Result<()> {
        if self.pos % W != 0 {
            self.file.push_back(self.curr_word)?;
        }
        self.file.end()
    }
}

/// Streaming reader; the caller supplies the width of each item.
pub struct VariableWidthLazyIter {
    words: LazyIterator<u64>,
    pos: u64,
}

impl VariableWidthLazyIter {
    /// Get and advance past the next `width` bits.
    pub fn get(&mut self, width: u64) -> Result<u64> {
        if width == 0 {
            return Ok(0);
        }
        let b = self.pos % W;
        let x = if b + width > W {
            // Crosses a word boundary.
            let bot_sz = W - b;
            let bot = (self.words.current() >> b) & mask(bot_sz);
            self.words.advance()?;
            let top = self.words.current() & mask(width - bot_sz);
            (top << bot_sz) | bot
        } else {
            let x = (self.words.current() >> b) & mask(width);
            if b + width == W {
                self.words.advance()?;
            }
            x
        };
        self.pos += width;
        Ok(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::MemFileFactory;

    #[test]
    fn mixed_widths_round_trip() {
        let fac = MemFileFactory::new();
        let items: Vec<(u64, u64)> = (1..200u64)
            .map(|i| {
                let width = 1 + (i * 7) % 37;
                (i & mask(width), width)
            })
            .collect();
        {
            let mut b = VariableWidthBitArray::builder("a", &fac).unwrap();
            for &(v, w) in &items {
                b.push_back(v, w).unwrap();
            }
            b.end().unwrap();
        }
        let a = VariableWidthBitArray::new("a", &fac).unwrap();
        let mut offset = 0;
        for &(v, w) in &items {
            assert_eq!(a.get(offset, w), v, "offset {} width {}", offset, w);
            offset += w;
        }

        let mut it = VariableWidthBitArray::lazy_iter("a", &fac).unwrap();
        for &(v, w) in &items {
            assert_eq!(it.get(w).unwrap(), v);
        }
    }
}
