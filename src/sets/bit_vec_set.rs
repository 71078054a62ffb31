/*
 * SPDX-FileCopyrightText: 2026 The filigree authors
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! A dynamic table of bit vectors, and a sparse map of sets on top of it.
//!
//! [`BitVecSet`] concatenates its member vectors in one compressed data
//! bitmap and keeps their boundaries in a table-of-contents bitmap: the
//! toc holds a one for every vector followed by a zero per data bit, so
//! `select(v) - v` is the data offset of vector `v`. [`EntrySets`] layers
//! a membership bitmap over it, mapping the ranks of flagged entries to
//! member vectors.

use anyhow::Result;

use crate::bits::CompactDynamicBitVector;
use crate::utils::FileFactory;

pub struct BitVecSet {
    toc: CompactDynamicBitVector,
    bits: CompactDynamicBitVector,
}

impl Default for BitVecSet {
    fn default() -> Self {
        Self::new()
    }
}

impl BitVecSet {
    pub fn new() -> Self {
        let mut toc = CompactDynamicBitVector::new();
        toc.insert(0, true);
        BitVecSet {
            toc,
            bits: CompactDynamicBitVector::new(),
        }
    }

    /// Number of member vectors.
    pub fn size(&self) -> u64 {
        self.toc.count() - 1
    }

    fn offset(&self, vec_num: u64) -> Result<u64> {
        Ok(self.toc.select(vec_num)? - vec_num)
    }

    /// Length of vector `vec_num`.
    pub fn vec_size(&self, vec_num: u64) -> Result<u64> {
        let i = self.offset(vec_num)?;
        let j = self.toc.select(vec_num + 1)? - vec_num - 1;
        Ok(j - i)
    }

    /// One count of vector `vec_num`.
    pub fn vec_count(&self, vec_num: u64) -> Result<u64> {
        let i = self.offset(vec_num)?;
        let j = self.toc.select(vec_num + 1)? - vec_num - 1;
        Ok(self.bits.rank(j) - self.bits.rank(i))
    }

    pub fn access(&self, vec_num: u64, vec_pos: u64) -> Result<bool> {
        debug_assert!(vec_pos < self.vec_size(vec_num)?);
        let j = self.offset(vec_num)?;
        Ok(self.bits.access(j + vec_pos))
    }

    /// Insert a new, empty vector before `vec_num`.
    pub fn insert_vec(&mut self, vec_num: u64) -> Result<()> {
        debug_assert!(vec_num <= self.size());
        let p = self.toc.select(vec_num)?;
        self.toc.insert(p, true);
        Ok(())
    }

    /// Insert a bit into vector `vec_num` at `vec_pos`.
    pub fn insert(&mut self, vec_num: u64, vec_pos: u64, val: bool) -> Result<()> {
        debug_assert!(vec_num < self.size());
        debug_assert!(vec_pos <= self.vec_size(vec_num)?);
        let p = self.toc.select(vec_num)?;
        let j = p - vec_num;
        self.toc.insert(p + 1, false);
        self.bits.insert(j + vec_pos, val);
        Ok(())
    }

    pub fn update(&mut self, vec_num: u64, vec_pos: u64, val: bool) -> Result<()> {
        debug_assert!(vec_pos < self.vec_size(vec_num)?);
        let j = self.offset(vec_num)?;
        self.bits.update(j + vec_pos, val);
        Ok(())
    }

    /// Remove the (empty) vector `vec_num`.
    pub fn erase_vec(&mut self, vec_num: u64) -> Result<()> {
        debug_assert_eq!(self.vec_size(vec_num)?, 0);
        let p = self.toc.select(vec_num)?;
        self.toc.erase(p);
        Ok(())
    }

    /// Remove the bit at `vec_pos` from vector `vec_num`.
    pub fn erase(&mut self, vec_num: u64, vec_pos: u64) -> Result<()> {
        debug_assert!(vec_num < self.size());
        debug_assert!(vec_pos <= self.vec_size(vec_num)?);
        let p = self.toc.select(vec_num)?;
        let j = p - vec_num;
        self.toc.erase(p + 1);
        self.bits.erase(j + vec_pos);
        Ok(())
    }

    pub fn clear(&mut self, vec_num: u64) -> Result<()> {
        let z = self.vec_size(vec_num)?;
        for _ in 0..z {
            self.erase(vec_num, 0)?;
        }
        Ok(())
    }

    pub fn save(&self, base_name: &str, factory: &dyn FileFactory) -> Result<()> {
        self.toc.save(&format!("{}.toc", base_name), factory)?;
        self.bits.save(&format!("{}.bits", base_name), factory)
    }
}

/// A sparse map from segment ranks to member sets.
pub struct EntrySets {
    set_ids: CompactDynamicBitVector,
    set_data: BitVecSet,
}

impl EntrySets {
    pub fn new(num_segments: u64) -> Result<Self> {
        Ok(EntrySets {
            set_ids: CompactDynamicBitVector::with_size(num_segments)?,
            set_data: BitVecSet::new(),
        })
    }

    pub fn exists(&self, seg_rank: u64) -> bool {
        self.set_ids.access(seg_rank)
    }

    fn vec_of(&self, seg_rank: u64) -> u64 {
        debug_assert!(self.exists(seg_rank));
        self.set_ids.rank(seg_rank)
    }

    pub fn size(&self, seg_rank: u64) -> Result<u64> {
        self.set_data.vec_size(self.vec_of(seg_rank))
    }

    pub fn count(&self, seg_rank: u64) -> Result<u64> {
        self.set_data.vec_count(self.vec_of(seg_rank))
    }

    pub fn access(&self, seg_rank: u64, pos: u64) -> Result<bool> {
        self.set_data.access(self.vec_of(seg_rank), pos)
    }

    /// Create the (empty) set for `seg_rank`.
    pub fn insert_set(&mut self, seg_rank: u64) -> Result<()> {
        debug_assert!(!self.exists(seg_rank));
        self.set_ids.update(seg_rank, true);
        let v = self.set_ids.rank(seg_rank);
        self.set_data.insert_vec(v)
    }

    /// Add `read_num` to the set for `seg_rank`, growing it as needed.
    pub fn insert(&mut self, seg_rank: u64, read_num: u64) -> Result<()> {
        if !self.exists(seg_rank) {
            self.insert_set(seg_rank)?;
        }
        let v = self.vec_of(seg_rank);
        let z = self.set_data.vec_size(v)?;
        for i in z..read_num {
            self.set_data.insert(v, i, false)?;
        }
        self.set_data.insert(v, read_num, true)
    }

    /// Drop the (empty) set for `seg_rank`.
    pub fn erase_set(&mut self, seg_rank: u64) -> Result<()> {
        debug_assert!(self.exists(seg_rank));
        let v = self.set_ids.rank(seg_rank);
        debug_assert_eq!(self.set_data.vec_size(v)?, 0);
        self.set_data.erase_vec(v)?;
        self.set_ids.update(seg_rank, false);
        Ok(())
    }

    pub fn erase(&mut self, seg_rank: u64, read_num: u64) -> Result<()> {
        let v = self.vec_of(seg_rank);
        self.set_data.erase(v, read_num)
    }

    pub fn save(&self, base_name: &str, factory: &dyn FileFactory) -> Result<()> {
        self.set_ids
            .save(&format!("{}-set-ids", base_name), factory)?;
        self.set_data.save(&format!("{}-set-data", base_name), factory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vectors_grow_independently() {
        let mut s = BitVecSet::new();
        s.insert_vec(0).unwrap();
        s.insert_vec(1).unwrap();
        assert_eq!(s.size(), 2);
        s.insert(0, 0, true).unwrap();
        s.insert(0, 1, false).unwrap();
        s.insert(1, 0, true).unwrap();
        assert_eq!(s.vec_size(0).unwrap(), 2);
        assert_eq!(s.vec_size(1).unwrap(), 1);
        assert_eq!(s.vec_count(0).unwrap(), 1);
        assert!(s.access(0, 0).unwrap());
        assert!(!s.access(0, 1).unwrap());
        assert!(s.access(1, 0).unwrap());

        s.update(0, 1, true).unwrap();
        assert_eq!(s.vec_count(0).unwrap(), 2);

        s.erase(0, 0).unwrap();
        assert_eq!(s.vec_size(0).unwrap(), 1);
        assert!(s.access(0, 0).unwrap());

        s.clear(0).unwrap();
        s.erase_vec(0).unwrap();
        assert_eq!(s.size(), 1);
        assert!(s.access(0, 0).unwrap());
    }

    #[test]
    fn random_ops_match_model() {
        let mut s = BitVecSet::new();
        let mut model: Vec<Vec<bool>> = Vec::new();
        let mut state = 0x13198A2E03707344u64;
        let mut rng = move || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state
        };
        for _ in 0..500 {
            match rng() % 4 {
                0 => {
                    let v = (rng() % (model.len() as u64 + 1)) as usize;
                    s.insert_vec(v as u64).unwrap();
                    model.insert(v, Vec::new());
                }
                1 | 2 if !model.is_empty() => {
                    let v = (rng() % model.len() as u64) as usize;
                    let p = (rng() % (model[v].len() as u64 + 1)) as usize;
                    let b = rng() % 2 == 0;
                    s.insert(v as u64, p as u64, b).unwrap();
                    model[v].insert(p, b);
                }
                3 if !model.is_empty() => {
                    let v = (rng() % model.len() as u64) as usize;
                    if !model[v].is_empty() {
                        let p = (rng() % model[v].len() as u64) as usize;
                        s.erase(v as u64, p as u64).unwrap();
                        model[v].remove(p);
                    }
                }
                _ => {}
            }
        }
        assert_eq!(s.size(), model.len() as u64);
        for (v, vec) in model.iter().enumerate() {
            assert_eq!(s.vec_size(v as u64).unwrap(), vec.len() as u64);
            for (p, &b) in vec.iter().enumerate() {
                assert_eq!(s.access(v as u64, p as u64).unwrap(), b);
            }
        }
    }

    #[test]
    fn entry_sets_membership() {
        let mut es = EntrySets::new(100).unwrap();
        assert!(!es.exists(42));
        es.insert(42, 3).unwrap();
        es.insert(42, 7).unwrap();
        es.insert(10, 0).unwrap();
        assert!(es.exists(42));
        assert!(es.exists(10));
        assert!(!es.exists(41));
        assert_eq!(es.count(42).unwrap(), 2);
        assert!(es.access(42, 3).unwrap());
        assert!(es.access(42, 7).unwrap());
        assert!(!es.access(42, 4).unwrap());
        assert_eq!(es.count(10).unwrap(), 1);
    }
}
