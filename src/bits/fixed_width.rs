/*
 * SPDX-FileCopyrightText: 2026 The filigree authors
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! An array of `N`-bit items packed into 64-bit words; items never span a
//! word boundary, so `64 / N` items live in each word.

use anyhow::Result;

use crate::arrays::{LazyIterator, MappedArray, MappedArrayBuilder};
use crate::utils::FileFactory;

pub struct FixedWidthBitArray<const N: u64> {
    words: MappedArray<u64>,
}

impl<const N: u64> FixedWidthBitArray<N> {
    /// Items per word.
    pub const W: u64 = 64 / N;

    pub fn new(name: &str, factory: &dyn FileFactory) -> Result<Self> {
        Ok(FixedWidthBitArray {
            words: MappedArray::new(name, factory)?,
        })
    }

    pub fn get(&self, pos: u64) -> u64 {
        let w = pos / Self::W;
        let j = pos % Self::W;
        let x = self.words.get(w as usize);
        (x >> (j * N)) & ((1 << N) - 1)
    }

    pub fn builder(name: &str, factory: &dyn FileFactory) -> Result<FixedWidthBitArrayBuilder<N>> {
        Ok(FixedWidthBitArrayBuilder {
            pos: 0,
            curr_word_num: 0,
            curr_word: 0,
            file: MappedArray::<u64>::builder(name, factory)?,
        })
    }

    pub fn lazy_iter(name: &str, factory: &dyn FileFactory) -> Result<FixedWidthLazyIter<N>> {
        let words = MappedArray::<u64>::lazy_iter(name, factory)?;
        Ok(FixedWidthLazyIter { words, in_word: 0 })
    }
}

pub struct FixedWidthBitArrayBuilder<const N: u64> {
    pos: u64,
    curr_word_num: u64,
    curr_word: u64,
    file: MappedArrayBuilder<u64>,
}

impl<const N: u64> FixedWidthBitArrayBuilder<N> {
    pub fn push_back(&mut self, item: u64) -> Result<()> {
        let w = self.pos / FixedWidthBitArray::<N>::W;
        let j = self.pos % FixedWidthBitArray::<N>::W;
        if self.curr_word_num != w {
            self.flush()?;
            self.curr_word_num = w;
            self.curr_word = 0;
        }
        self.curr_word |= item << (j * N);
        self.pos += 1;
        Ok(())
    }

    pub fn end(mut self) -> Result<()> {
        self.flush()?;
        self.file.end()
    }

    fn flush(&mut self) -> Result<()> {
        self.file.push_back(self.curr_word)
    }
}

pub struct FixedWidthLazyIter<const N: u64> {
    words: LazyIterator<u64>,
    in_word: u64,
}

impl<const N: u64> FixedWidthLazyIter<N> {
    pub fn valid(&self) -> bool {
        self.words.valid()
    }

    pub fn current(&self) -> u64 {
        (self.words.current() >> (self.in_word * N)) & ((1 << N) - 1)
    }

    pub fn advance(&mut self) -> Result<()> {
        self.in_word += 1;
        if self.in_word >= FixedWidthBitArray::<N>::W {
            self.in_word = 0;
            self.words.advance()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::MemFileFactory;

    #[test]
    fn four_bit_items() {
        let fac = MemFileFactory::new();
        let values: Vec<u64> = (0..100).map(|i| i % 16).collect();
        {
            let mut b = FixedWidthBitArray::<4>::builder("a", &fac).unwrap();
            for &v in &values {
                b.push_back(v).unwrap();
            }
            b.end().unwrap();
        }
        let a = FixedWidthBitArray::<4>::new("a", &fac).unwrap();
        for (i, &v) in values.iter().enumerate() {
            assert_eq!(a.get(i as u64), v);
        }
        let mut it = FixedWidthBitArray::<4>::lazy_iter("a", &fac).unwrap();
        for &v in &values {
            assert!(it.valid());
            assert_eq!(it.current(), v);
            it.advance().unwrap();
        }
    }
}
