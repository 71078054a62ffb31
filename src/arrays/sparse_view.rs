/*
 * SPDX-FileCopyrightText: 2026 The filigree authors
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! A logical-deletion overlay for [`SparseArray`].
//!
//! The overlay is a bitmap over *original ranks* (bit `r` set means the
//! element with rank `r` is deleted), indexed for rank and for select on
//! zeros, so view ranks translate to original ranks in constant time. The
//! mask is transient: it lives in an in-memory file store and is rebuilt
//! (merged with any previous mask) on every [`SparseArrayView::remove`].

use anyhow::Result;

use super::sparse::{Rank, SparseArray};
use crate::bits::{WordyBitVector, WordyBitVectorBuilder};
use crate::rank_sel::{DenseRank, DenseRankBuilder, DenseSelect, DenseSelectBuilder};
use crate::utils::MemFileFactory;

const MASK_NAME: &str = "mask";

#[derive(Debug)]
struct Mask {
    bits: WordyBitVector,
    rank_index: DenseRank,
    select0_index: DenseSelect,
}

impl Mask {
    fn open(factory: &MemFileFactory) -> Result<Mask> {
        Ok(Mask {
            bits: WordyBitVector::new(&format!("{}.bits", MASK_NAME), factory)?,
            rank_index: DenseRank::new(&format!("{}.rank-index", MASK_NAME), factory)?,
            select0_index: DenseSelect::new(
                &format!("{}.select0-index", MASK_NAME),
                factory,
                true,
            )?,
        })
    }

    fn count(&self) -> u64 {
        self.rank_index.count()
    }

    fn rank(&self, pos: u64) -> u64 {
        self.rank_index.rank(&self.bits, pos)
    }

    fn rank2(&self, pos1: u64, pos2: u64) -> (u64, u64) {
        self.rank_index.rank2(&self.bits, pos1, pos2)
    }

    fn access(&self, pos: u64) -> bool {
        self.rank(pos + 1) - self.rank(pos) != 0
    }

    fn access_and_rank(&self, pos: u64) -> (bool, u64) {
        self.rank_index.access_and_rank(&self.bits, pos)
    }

    fn select0(&self, rank: u64) -> Result<u64> {
        self.select0_index.select(&self.bits, rank)
    }
}

struct MaskBuilder {
    vec: WordyBitVectorBuilder,
    rnk: DenseRankBuilder,
    sel: DenseSelectBuilder,
    curr_pos: u64,
}

impl MaskBuilder {
    fn new(factory: &MemFileFactory) -> Result<MaskBuilder> {
        Ok(MaskBuilder {
            vec: WordyBitVector::builder(&format!("{}.bits", MASK_NAME), factory)?,
            rnk: DenseRank::builder(&format!("{}.rank-index", MASK_NAME), factory)?,
            sel: DenseSelect::builder(&format!("{}.select0-index", MASK_NAME), factory, true)?,
            curr_pos: 0,
        })
    }

    /// Mark original rank `pos` deleted; strictly increasing.
    fn push_back(&mut self, pos: u64) -> Result<()> {
        self.vec.push(pos)?;
        self.rnk.push_back(pos)?;
        while self.curr_pos < pos {
            self.sel.push_back(self.curr_pos)?;
            self.curr_pos += 1;
        }
        self.curr_pos += 1;
        Ok(())
    }

    fn end(mut self, pos: u64) -> Result<()> {
        while self.curr_pos < pos {
            self.vec.push_back_bit(false)?;
            self.sel.push_back(self.curr_pos)?;
            self.curr_pos += 1;
        }
        self.vec.end()?;
        self.rnk.end(pos)?;
        self.sel.end()
    }
}

#[derive(Debug)]
pub struct SparseArrayView {
    array: SparseArray,
    mask_factory: MemFileFactory,
    mask: Option<Mask>,
}

impl SparseArrayView {
    pub fn new(array: SparseArray) -> Self {
        SparseArrayView {
            array,
            mask_factory: MemFileFactory::new(),
            mask: None,
        }
    }

    /// The underlying array, deletions not applied.
    pub fn array(&self) -> &SparseArray {
        &self.array
    }

    pub fn size(&self) -> u128 {
        self.array.size()
    }

    pub fn count(&self) -> Rank {
        match &self.mask {
            None => self.array.count(),
            Some(mask) => self.array.count() - mask.count(),
        }
    }

    pub fn access(&self, pos: u128) -> Result<bool> {
        match &self.mask {
            None => self.array.access(pos),
            Some(mask) => {
                let (found, r) = self.array.access_and_rank(pos)?;
                Ok(found && !mask.access(r))
            }
        }
    }

    pub fn access_and_rank(&self, pos: u128) -> Result<(bool, Rank)> {
        match &self.mask {
            None => self.array.access_and_rank(pos),
            Some(mask) => {
                let (found, r) = self.array.access_and_rank(pos)?;
                let (masked, s) = mask.access_and_rank(r);
                Ok((found && !masked, r - s))
            }
        }
    }

    pub fn rank(&self, pos: u128) -> Result<Rank> {
        let a = self.array.rank(pos)?;
        match &self.mask {
            None => Ok(a),
            Some(mask) => Ok(a - mask.rank(a)),
        }
    }

    pub fn rank2(&self, lhs: u128, rhs: u128) -> Result<(Rank, Rank)> {
        let (a1, a2) = self.array.rank2(lhs, rhs)?;
        match &self.mask {
            None => Ok((a1, a2)),
            Some(mask) => {
                let (m1, m2) = mask.rank2(a1, a2);
                Ok((a1 - m1, a2 - m2))
            }
        }
    }

    /// The original rank of the `rank`-th undeleted element.
    pub fn original_rank(&self, rank: Rank) -> Result<Rank> {
        match &self.mask {
            None => Ok(rank),
            Some(mask) => mask.select0(rank),
        }
    }

    pub fn select(&self, rank: Rank) -> Result<u128> {
        self.array.select(self.original_rank(rank)?)
    }

    pub fn iter(&self) -> impl Iterator<Item = Result<u128>> + '_ {
        (0..self.count()).map(move |r| self.select(r))
    }

    /// Delete the elements whose *view ranks* the iterator yields, in
    /// ascending order; merges with any existing mask in one pass.
    pub fn remove<I: Iterator<Item = Rank>>(&mut self, removed: I) -> Result<()> {
        match self.mask.take() {
            None => {
                let mut b = MaskBuilder::new(&self.mask_factory)?;
                for r in removed {
                    b.push_back(r)?;
                }
                b.end(self.array.count())?;
            }
            Some(mask) => {
                let mut b = MaskBuilder::new(&self.mask_factory)?;
                let mut old = mask.bits.iter_ones().peekable();
                let mut removed = removed.peekable();
                loop {
                    match (old.peek().copied(), removed.peek().copied()) {
                        (Some(o), Some(r)) => {
                            let r = mask.select0(r)?;
                            debug_assert_ne!(r, o);
                            if r < o {
                                b.push_back(r)?;
                                removed.next();
                            } else {
                                b.push_back(o)?;
                                old.next();
                            }
                        }
                        (Some(o), None) => {
                            b.push_back(o)?;
                            old.next();
                        }
                        (None, Some(r)) => {
                            b.push_back(mask.select0(r)?)?;
                            removed.next();
                        }
                        (None, None) => break,
                    }
                }
                b.end(self.array.count())?;
            }
        }
        self.mask = Some(Mask::open(&self.mask_factory)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::MemFileFactory;

    fn build_view(positions: &[u128]) -> SparseArrayView {
        let fac = MemFileFactory::new();
        {
            let mut b =
                SparseArray::builder("sa", &fac, positions.last().unwrap() + 1, positions.len() as u64)
                    .unwrap();
            for &p in positions {
                b.push_back(p).unwrap();
            }
            b.end(positions.last().unwrap() + 1).unwrap();
        }
        SparseArrayView::new(SparseArray::new("sa", &fac).unwrap())
    }

    #[test]
    fn no_mask_is_transparent() {
        let positions: Vec<u128> = (0..500u128).map(|i| i * 3).collect();
        let view = build_view(&positions);
        assert_eq!(view.count(), 500);
        for (i, &p) in positions.iter().enumerate() {
            assert!(view.access(p).unwrap());
            assert_eq!(view.rank(p).unwrap(), i as u64);
            assert_eq!(view.select(i as u64).unwrap(), p);
            assert_eq!(view.original_rank(i as u64).unwrap(), i as u64);
        }
    }

    #[test]
    fn removal_skips_deleted() {
        let positions: Vec<u128> = (0..100u128).map(|i| i * 7).collect();
        let mut view = build_view(&positions);
        // Delete every third element by view rank.
        let deleted: Vec<u64> = (0..100u64).filter(|r| r % 3 == 0).collect();
        view.remove(deleted.iter().copied()).unwrap();

        let kept: Vec<u128> = positions
            .iter()
            .enumerate()
            .filter(|(i, _)| *i as u64 % 3 != 0)
            .map(|(_, &p)| p)
            .collect();
        assert_eq!(view.count(), kept.len() as u64);
        for (i, &p) in kept.iter().enumerate() {
            assert_eq!(view.select(i as u64).unwrap(), p);
            assert_eq!(view.rank(p).unwrap(), i as u64);
            assert!(view.access(p).unwrap());
        }
        for (i, &p) in positions.iter().enumerate() {
            if i % 3 == 0 {
                assert!(!view.access(p).unwrap(), "deleted {}", p);
            }
        }
    }

    #[test]
    fn removals_merge() {
        let positions: Vec<u128> = (0..60u128).map(|i| i * 2).collect();
        let mut view = build_view(&positions);
        // First pass deletes view ranks 0..10, second deletes the new
        // ranks 0..10 (original ranks 10..20).
        view.remove(0..10).unwrap();
        assert_eq!(view.count(), 50);
        view.remove(0..10).unwrap();
        assert_eq!(view.count(), 40);
        for i in 0..40u64 {
            assert_eq!(view.select(i).unwrap(), (i as u128 + 20) * 2);
        }
    }

    #[test]
    fn empty_removal_is_identity() {
        let positions: Vec<u128> = (0..50u128).map(|i| i * 5).collect();
        let mut view = build_view(&positions);
        view.remove(std::iter::empty()).unwrap();
        assert_eq!(view.count(), 50);
        for (i, &p) in positions.iter().enumerate() {
            assert_eq!(view.select(i as u64).unwrap(), p);
            assert_eq!(view.rank(p).unwrap(), i as u64);
        }
    }
}
