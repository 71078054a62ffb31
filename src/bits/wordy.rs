/*
 * SPDX-FileCopyrightText: 2026 The filigree authors
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! A flat bitmap stored as a file of 64-bit words.

use anyhow::Result;

use super::word::select_in_word;
use crate::arrays::{LazyIterator, MappedArray, MappedArrayBuilder};
use crate::utils::FileFactory;

pub const WORD_BITS: u64 = 64;

#[derive(Debug)]
pub struct WordyBitVector {
    words: MappedArray<u64>,
}

impl WordyBitVector {
    pub fn new(name: &str, factory: &dyn FileFactory) -> Result<Self> {
        Ok(WordyBitVector {
            words: MappedArray::new(name, factory)?,
        })
    }

    /// The number of words in the bitmap.
    pub fn words(&self) -> u64 {
        self.words.len() as u64
    }

    #[inline]
    fn word(&self, w: u64) -> u64 {
        if w < self.words() {
            self.words.get(w as usize)
        } else {
            0
        }
    }

    pub fn get(&self, pos: u64) -> bool {
        let w = pos / WORD_BITS;
        let b = pos % WORD_BITS;
        if w >= self.words() {
            return false;
        }
        self.words.get(w as usize) & (1 << b) != 0
    }

    /// Count the one bits in `[begin, end)`.
    pub fn popcount_range(&self, begin: u64, end: u64) -> u64 {
        let words = self.words();
        let wb = begin / WORD_BITS;
        let bb = begin % WORD_BITS;
        if begin >= end || wb >= words {
            return 0;
        }
        let (we, be) = {
            let we = end / WORD_BITS;
            let be = end % WORD_BITS;
            if we >= words {
                (words - 1, WORD_BITS)
            } else {
                (we, be)
            }
        };

        let begin_mask = !0u64 << bb;
        let end_mask = if be == 0 {
            0
        } else {
            !0u64 >> (WORD_BITS - be)
        };

        if wb == we {
            return (self.words.get(wb as usize) & begin_mask & end_mask).count_ones() as u64;
        }

        let mut rank = (self.words.get(wb as usize) & begin_mask).count_ones() as u64;
        for i in wb + 1..we {
            rank += self.words.get(i as usize).count_ones() as u64;
        }
        if be > 0 {
            rank += (self.words.get(we as usize) & end_mask).count_ones() as u64;
        }
        rank
    }

    /// Position of the `count`-th one bit (0-indexed) at or after `from`.
    pub fn select_ones(&self, from: u64, count: u64) -> u64 {
        self.select::<false>(from, count)
    }

    /// Position of the `count`-th zero bit (0-indexed) at or after `from`.
    pub fn select_zeros(&self, from: u64, count: u64) -> u64 {
        self.select::<true>(from, count)
    }

    fn select<const INVERT: bool>(&self, from: u64, count: u64) -> u64 {
        let mut w = from / WORD_BITS;
        let b = from % WORD_BITS;
        let mut remaining = count;
        let mut word = self.word(w);
        if INVERT {
            word = !word;
        }
        word &= !0u64 << b;
        loop {
            let pc = word.count_ones() as u64;
            if remaining < pc {
                return w * WORD_BITS + select_in_word(word, remaining);
            }
            remaining -= pc;
            w += 1;
            assert!(
                INVERT || w < self.words(),
                "select past the end of the bitmap"
            );
            word = self.word(w);
            if INVERT {
                word = !word;
            }
        }
    }

    /// Iterate the positions of the one bits in ascending order.
    pub fn iter_ones(&self) -> OnesIter<'_> {
        OnesIter {
            bits: self,
            word_num: 0,
            word: self.word(0),
        }
    }

    pub fn lazy_iter_ones(name: &str, factory: &dyn FileFactory) -> Result<LazyOnesIter> {
        let words = MappedArray::<u64>::lazy_iter(name, factory)?;
        let mut it = LazyOnesIter {
            words,
            word_num: 0,
            word: 0,
            pos: 0,
            valid: true,
        };
        if it.words.valid() {
            it.word = it.words.current();
        } else {
            it.valid = false;
        }
        it.seek_one()?;
        Ok(it)
    }

    pub fn builder(name: &str, factory: &dyn FileFactory) -> Result<WordyBitVectorBuilder> {
        Ok(WordyBitVectorBuilder {
            file: MappedArray::<u64>::builder(name, factory)?,
            curr_pos: 0,
            file_word_num: 0,
            curr_word_num: 0,
            curr_word: 0,
        })
    }
}

pub struct WordyBitVectorBuilder {
    file: MappedArrayBuilder<u64>,
    curr_pos: u64,
    file_word_num: u64,
    curr_word_num: u64,
    curr_word: u64,
}

impl WordyBitVectorBuilder {
    /// Pad to the position `pos`, but do not add a bit at `pos`.
    pub fn pad_to(&mut self, pos: u64) -> Result<()> {
        debug_assert!(self.curr_pos <= pos);
        let dest_word_num = pos / WORD_BITS;
        if self.curr_word_num < dest_word_num {
            self.flush()?;
            // The next flush fills in any intervening zero words.
            self.curr_word_num = dest_word_num;
            self.curr_word = 0;
        }
        self.curr_pos = pos;
        Ok(())
    }

    /// Add a one bit at `pos`; positions must be strictly increasing.
    pub fn push(&mut self, pos: u64) -> Result<()> {
        self.pad_to(pos)?;
        self.push_back_bit(true)
    }

    /// Ensure the bitmap covers position `pos`.
    pub fn pad(&mut self, pos: u64) -> Result<()> {
        self.pad_to(pos + 1)
    }

    /// Append a bit at the current position.
    pub fn push_back_bit(&mut self, bit: bool) -> Result<()> {
        let w = self.curr_pos / WORD_BITS;
        let b = self.curr_pos % WORD_BITS;
        if w != self.curr_word_num {
            self.flush()?;
            self.curr_word_num = w;
            self.curr_word = 0;
        }
        if bit {
            self.curr_word |= 1 << b;
        }
        self.curr_pos += 1;
        Ok(())
    }

    pub fn end(mut self) -> Result<()> {
        self.flush()?;
        self.file.end()
    }

    fn flush(&mut self) -> Result<()> {
        while self.file_word_num < self.curr_word_num {
            self.file.push_back(0)?;
            self.file_word_num += 1;
        }
        self.file.push_back(self.curr_word)?;
        self.file_word_num += 1;
        Ok(())
    }
}

pub struct OnesIter<'a> {
    bits: &'a WordyBitVector,
    word_num: u64,
    word: u64,
}

impl Iterator for OnesIter<'_> {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        while self.word == 0 {
            self.word_num += 1;
            if self.word_num >= self.bits.words() {
                return None;
            }
            self.word = self.bits.word(self.word_num);
        }
        let bit = self.word & self.word.wrapping_neg();
        self.word &= !bit;
        Some(self.word_num * WORD_BITS + bit.trailing_zeros() as u64)
    }
}

/// Streaming cursor over the one bits of an on-disk bitmap.
pub struct LazyOnesIter {
    words: LazyIterator<u64>,
    word_num: u64,
    word: u64,
    pos: u64,
    valid: bool,
}

impl LazyOnesIter {
    pub fn valid(&self) -> bool {
        self.valid
    }

    pub fn current(&self) -> u64 {
        debug_assert!(self.valid);
        self.pos
    }

    pub fn advance(&mut self) -> Result<()> {
        let bit = self.word & self.word.wrapping_neg();
        self.word &= !bit;
        self.seek_one()
    }

    fn seek_one(&mut self) -> Result<()> {
        if !self.valid {
            return Ok(());
        }
        while self.word == 0 {
            self.word_num += 1;
            self.words.advance()?;
            if !self.words.valid() {
                self.valid = false;
                return Ok(());
            }
            self.word = self.words.current();
        }
        self.pos = self.word_num * WORD_BITS + self.word.trailing_zeros() as u64;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::MemFileFactory;

    fn build(positions: &[u64], pad: Option<u64>) -> (MemFileFactory, WordyBitVector) {
        let fac = MemFileFactory::new();
        {
            let mut b = WordyBitVector::builder("bits", &fac).unwrap();
            for &p in positions {
                b.push(p).unwrap();
            }
            if let Some(p) = pad {
                b.pad(p).unwrap();
            }
            b.end().unwrap();
        }
        let v = WordyBitVector::new("bits", &fac).unwrap();
        (fac, v)
    }

    #[test]
    fn get_and_iterate() {
        let positions = [0u64, 1, 63, 64, 100, 1000, 4095, 4096];
        let (_fac, v) = build(&positions, None);
        for p in 0..4200 {
            assert_eq!(v.get(p), positions.contains(&p), "position {}", p);
        }
        let seen: Vec<u64> = v.iter_ones().collect();
        assert_eq!(seen, positions);
    }

    #[test]
    fn popcount_ranges() {
        let positions: Vec<u64> = (0..500).map(|i| i * 13).collect();
        let (_fac, v) = build(&positions, None);
        for (a, b) in [(0u64, 6500), (1, 6400), (13, 14), (100, 100), (600, 605)] {
            let expected = positions.iter().filter(|&&p| p >= a && p < b).count() as u64;
            assert_eq!(v.popcount_range(a, b), expected, "range [{}, {})", a, b);
        }
    }

    #[test]
    fn select_both_senses() {
        let positions = [3u64, 5, 64, 65, 66, 130, 191, 192];
        let (_fac, v) = build(&positions, Some(255));
        // select_ones from 0 enumerates the positions.
        for (i, &p) in positions.iter().enumerate() {
            assert_eq!(v.select_ones(0, i as u64), p);
        }
        // relative select: the 0th one at or after a one position is itself.
        for &p in &positions {
            assert_eq!(v.select_ones(p, 0), p);
        }
        // zeros: position of the k-th zero.
        let mut zeros = Vec::new();
        for p in 0..256 {
            if !positions.contains(&p) {
                zeros.push(p);
            }
        }
        for (i, &p) in zeros.iter().take(100).enumerate() {
            assert_eq!(v.select_zeros(0, i as u64), p);
        }
    }

    #[test]
    fn lazy_ones_match_eager() {
        let positions: Vec<u64> = (0..300).map(|i| i * i % 8191).collect();
        let mut sorted = positions.clone();
        sorted.sort_unstable();
        sorted.dedup();
        let (fac, v) = build(&sorted, None);
        let eager: Vec<u64> = v.iter_ones().collect();
        let mut lazy = Vec::new();
        let mut it = WordyBitVector::lazy_iter_ones("bits", &fac).unwrap();
        while it.valid() {
            lazy.push(it.current());
            it.advance().unwrap();
        }
        assert_eq!(eager, lazy);
    }
}
