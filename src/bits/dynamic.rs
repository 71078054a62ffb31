/*
 * SPDX-FileCopyrightText: 2026 The filigree authors
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! A mutable, compressed bit vector: a height-balanced binary tree whose
//! leaves are single run-length-coded words.
//!
//! Nodes live in an index arena; the tree has no cycles, so indices
//! replace reference counting. Internal nodes cache height, bit count, and
//! one count; a leaf whose mutation overflows its word splits into two
//! under a fresh internal node, and the usual single/double rotations keep
//! the height balance within one. Not thread-safe; meant for small,
//! transient indexes.

use anyhow::{bail, Result};

use crate::arrays::MappedArray;
use crate::codes::{rle_word, DeltaCodec};
use crate::error::Error;
use crate::utils::FileFactory;

type C = DeltaCodec;

const NIL: u32 = u32::MAX;

#[derive(Clone, Copy)]
enum Node {
    Leaf(u64),
    Internal {
        height: i64,
        size: u64,
        count: u64,
        lhs: u32,
        rhs: u32,
    },
}

pub struct CompactDynamicBitVector {
    nodes: Vec<Node>,
    free: Vec<u32>,
    root: u32,
}

impl Default for CompactDynamicBitVector {
    fn default() -> Self {
        Self::new()
    }
}

impl CompactDynamicBitVector {
    pub fn new() -> Self {
        CompactDynamicBitVector {
            nodes: vec![Node::Leaf(0)],
            free: Vec::new(),
            root: 0,
        }
    }

    /// A vector of `size` zero bits.
    pub fn with_size(size: u64) -> Result<Self> {
        let mut w = 0;
        let l = rle_word::init::<C>(&mut w, size, false);
        if l > 64 {
            bail!(Error::General(format!(
                "cannot encode a run of {} bits in a single word",
                size
            )));
        }
        Ok(CompactDynamicBitVector {
            nodes: vec![Node::Leaf(w)],
            free: Vec::new(),
            root: 0,
        })
    }

    pub fn size(&self) -> u64 {
        self.size_of(self.root)
    }

    pub fn count(&self) -> u64 {
        self.count_of(self.root)
    }

    pub fn access(&self, pos: u64) -> bool {
        let mut idx = self.root;
        let mut pos = pos;
        loop {
            match self.nodes[idx as usize] {
                Node::Leaf(w) => return rle_word::access::<C>(w, pos),
                Node::Internal { lhs, rhs, .. } => {
                    let z = self.size_of(lhs);
                    if pos < z {
                        idx = lhs;
                    } else {
                        pos -= z;
                        idx = rhs;
                    }
                }
            }
        }
    }

    pub fn rank(&self, pos: u64) -> u64 {
        let mut idx = self.root;
        let mut pos = pos;
        let mut acc = 0;
        loop {
            match self.nodes[idx as usize] {
                Node::Leaf(w) => return acc + rle_word::rank::<C>(w, pos),
                Node::Internal { lhs, rhs, .. } => {
                    let z = self.size_of(lhs);
                    if pos < z {
                        idx = lhs;
                    } else {
                        acc += self.count_of(lhs);
                        pos -= z;
                        idx = rhs;
                    }
                }
            }
        }
    }

    pub fn select(&self, rank: u64) -> Result<u64> {
        let mut idx = self.root;
        let mut rank = rank;
        let mut acc = 0;
        loop {
            match self.nodes[idx as usize] {
                Node::Leaf(w) => return Ok(acc + rle_word::select::<C>(w, rank)?),
                Node::Internal { lhs, rhs, .. } => {
                    let c = self.count_of(lhs);
                    if rank < c {
                        idx = lhs;
                    } else {
                        acc += self.size_of(lhs);
                        rank -= c;
                        idx = rhs;
                    }
                }
            }
        }
    }

    pub fn insert(&mut self, pos: u64, bit: bool) {
        debug_assert!(pos <= self.size());
        self.root = self.insert_at(self.root, pos, bit);
    }

    pub fn erase(&mut self, pos: u64) {
        debug_assert!(pos < self.size());
        self.root = self.erase_at(self.root, pos);
    }

    pub fn update(&mut self, pos: u64, bit: bool) {
        debug_assert!(pos < self.size());
        self.erase(pos);
        self.insert(pos, bit);
    }

    /// Write the leaf words, in order, to a [`MappedArray`] file.
    pub fn save(&self, base_name: &str, factory: &dyn FileFactory) -> Result<()> {
        let mut builder = MappedArray::<u64>::builder(base_name, factory)?;
        let mut stack = vec![self.root];
        while let Some(idx) = stack.pop() {
            match self.nodes[idx as usize] {
                Node::Leaf(w) => builder.push_back(w)?,
                Node::Internal { lhs, rhs, .. } => {
                    stack.push(rhs);
                    stack.push(lhs);
                }
            }
        }
        builder.end()
    }

    pub fn height(&self) -> i64 {
        self.height_of(self.root)
    }

    fn size_of(&self, idx: u32) -> u64 {
        match self.nodes[idx as usize] {
            Node::Leaf(w) => rle_word::size::<C>(w),
            Node::Internal { size, .. } => size,
        }
    }

    fn count_of(&self, idx: u32) -> u64 {
        match self.nodes[idx as usize] {
            Node::Leaf(w) => rle_word::count::<C>(w),
            Node::Internal { count, .. } => count,
        }
    }

    fn height_of(&self, idx: u32) -> i64 {
        match self.nodes[idx as usize] {
            Node::Leaf(_) => 0,
            Node::Internal { height, .. } => height,
        }
    }

    fn alloc(&mut self, node: Node) -> u32 {
        if let Some(idx) = self.free.pop() {
            self.nodes[idx as usize] = node;
            idx
        } else {
            self.nodes.push(node);
            (self.nodes.len() - 1) as u32
        }
    }

    fn free_node(&mut self, idx: u32) {
        self.free.push(idx);
    }

    fn recompute(&mut self, idx: u32) {
        if let Node::Internal { lhs, rhs, .. } = self.nodes[idx as usize] {
            let height = 1 + self.height_of(lhs).max(self.height_of(rhs));
            let size = self.size_of(lhs) + self.size_of(rhs);
            let count = self.count_of(lhs) + self.count_of(rhs);
            if let Node::Internal {
                height: h,
                size: s,
                count: c,
                ..
            } = &mut self.nodes[idx as usize]
            {
                *h = height;
                *s = size;
                *c = count;
            }
        }
    }

    fn children(&self, idx: u32) -> (u32, u32) {
        match self.nodes[idx as usize] {
            Node::Internal { lhs, rhs, .. } => (lhs, rhs),
            Node::Leaf(_) => (NIL, NIL),
        }
    }

    fn set_children(&mut self, idx: u32, new_lhs: u32, new_rhs: u32) {
        if let Node::Internal { lhs, rhs, .. } = &mut self.nodes[idx as usize] {
            *lhs = new_lhs;
            *rhs = new_rhs;
        }
        self.recompute(idx);
    }

    fn insert_at(&mut self, idx: u32, pos: u64, bit: bool) -> u32 {
        match self.nodes[idx as usize] {
            Node::Leaf(w) => {
                let mut word = w;
                let carry = rle_word::insert::<C>(&mut word, pos, bit);
                self.nodes[idx as usize] = Node::Leaf(word);
                if carry != 0 {
                    let c = self.alloc(Node::Leaf(carry));
                    let internal = self.alloc(Node::Internal {
                        height: 0,
                        size: 0,
                        count: 0,
                        lhs: idx,
                        rhs: c,
                    });
                    self.recompute(internal);
                    internal
                } else {
                    idx
                }
            }
            Node::Internal { lhs, rhs, .. } => {
                let z = self.size_of(lhs);
                if pos < z {
                    let new_lhs = self.insert_at(lhs, pos, bit);
                    self.set_children(idx, new_lhs, rhs);
                } else {
                    let new_rhs = self.insert_at(rhs, pos - z, bit);
                    self.set_children(idx, lhs, new_rhs);
                }
                self.rebalance(idx)
            }
        }
    }

    fn erase_at(&mut self, idx: u32, pos: u64) -> u32 {
        match self.nodes[idx as usize] {
            Node::Leaf(w) => {
                let mut word = w;
                let carry = rle_word::erase::<C>(&mut word, pos);
                self.nodes[idx as usize] = Node::Leaf(word);
                if carry != 0 {
                    let c = self.alloc(Node::Leaf(carry));
                    let internal = self.alloc(Node::Internal {
                        height: 0,
                        size: 0,
                        count: 0,
                        lhs: idx,
                        rhs: c,
                    });
                    self.recompute(internal);
                    internal
                } else {
                    idx
                }
            }
            Node::Internal { lhs, rhs, .. } => {
                let z = self.size_of(lhs);
                if pos < z {
                    let new_lhs = self.erase_at(lhs, pos);
                    if self.size_of(new_lhs) == 0 {
                        self.free_node(new_lhs);
                        self.free_node(idx);
                        return rhs;
                    }
                    self.set_children(idx, new_lhs, rhs);
                } else {
                    let new_rhs = self.erase_at(rhs, pos - z);
                    if self.size_of(new_rhs) == 0 {
                        self.free_node(new_rhs);
                        self.free_node(idx);
                        return lhs;
                    }
                    self.set_children(idx, lhs, new_rhs);
                }
                self.rebalance(idx)
            }
        }
    }

    fn balance_of(&self, idx: u32) -> i64 {
        let (lhs, rhs) = self.children(idx);
        self.height_of(lhs) - self.height_of(rhs)
    }

    fn rebalance(&mut self, idx: u32) -> u32 {
        let b = self.balance_of(idx);
        if (-1..=1).contains(&b) {
            self.recompute(idx);
            return idx;
        }

        let (lhs, rhs) = self.children(idx);
        if b < -1 {
            if self.balance_of(rhs) <= 0 {
                self.rotate_left(idx)
            } else {
                let new_rhs = self.rotate_right(rhs);
                self.set_children(idx, lhs, new_rhs);
                self.rotate_left(idx)
            }
        } else {
            if self.balance_of(lhs) >= 0 {
                self.rotate_right(idx)
            } else {
                let new_lhs = self.rotate_left(lhs);
                self.set_children(idx, new_lhs, rhs);
                self.rotate_right(idx)
            }
        }
    }

    fn rotate_left(&mut self, p: u32) -> u32 {
        let (a, q) = self.children(p);
        let (b, c) = self.children(q);
        self.set_children(p, a, b);
        self.set_children(q, p, c);
        q
    }

    fn rotate_right(&mut self, q: u32) -> u32 {
        let (p, c) = self.children(q);
        let (a, b) = self.children(p);
        self.set_children(q, b, c);
        self.set_children(p, a, q);
        p
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::MemFileFactory;

    /// Reference model.
    struct Model(Vec<bool>);

    impl Model {
        fn check(&self, v: &CompactDynamicBitVector) {
            assert_eq!(v.size(), self.0.len() as u64);
            let count = self.0.iter().filter(|&&b| b).count() as u64;
            assert_eq!(v.count(), count);
            let mut rank = 0;
            for (i, &b) in self.0.iter().enumerate() {
                assert_eq!(v.access(i as u64), b, "access({})", i);
                assert_eq!(v.rank(i as u64), rank, "rank({})", i);
                if b {
                    assert_eq!(v.select(rank).unwrap(), i as u64);
                    rank += 1;
                }
            }
        }
    }

    #[test]
    fn single_bit() {
        let mut v = CompactDynamicBitVector::new();
        v.insert(0, true);
        assert_eq!(v.size(), 1);
        assert_eq!(v.count(), 1);
        assert!(v.access(0));
        let mut v = CompactDynamicBitVector::new();
        v.insert(0, false);
        assert_eq!(v.size(), 1);
        assert_eq!(v.count(), 0);
    }

    #[test]
    fn with_size_is_zeroed() {
        let v = CompactDynamicBitVector::with_size(1000).unwrap();
        assert_eq!(v.size(), 1000);
        assert_eq!(v.count(), 0);
        assert!(!v.access(999));
    }

    #[test]
    fn random_inserts_and_erases_match_model() {
        let mut v = CompactDynamicBitVector::new();
        let mut model = Model(Vec::new());
        let mut state = 0x243F6A8885A308D3u64;
        let mut rng = move || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state
        };
        for step in 0..2000 {
            let erase = model.0.len() > 100 && rng() % 4 == 0;
            if erase {
                let pos = (rng() % model.0.len() as u64) as usize;
                v.erase(pos as u64);
                model.0.remove(pos);
            } else {
                let pos = (rng() % (model.0.len() as u64 + 1)) as usize;
                let bit = rng() % 3 == 0;
                v.insert(pos as u64, bit);
                model.0.insert(pos, bit);
            }
            if step % 100 == 99 {
                model.check(&v);
            }
        }
        model.check(&v);
        // AVL balance: height is logarithmic in the bit count.
        let max = (1.44 * ((v.size() + 2) as f64).log2()).ceil() as i64;
        assert!(v.height() <= max, "height {} > {}", v.height(), max);
    }

    #[test]
    fn update_flips_in_place() {
        let mut v = CompactDynamicBitVector::with_size(64).unwrap();
        v.update(10, true);
        v.update(20, true);
        assert_eq!(v.size(), 64);
        assert_eq!(v.count(), 2);
        v.update(10, false);
        assert_eq!(v.count(), 1);
        assert!(!v.access(10));
        assert!(v.access(20));
    }

    #[test]
    fn save_writes_leaf_words() {
        let mut v = CompactDynamicBitVector::new();
        for i in 0..300 {
            v.insert(i, i % 3 == 0);
        }
        let fac = MemFileFactory::new();
        v.save("cdbv", &fac).unwrap();
        let words = MappedArray::<u64>::new("cdbv", &fac).unwrap();
        let mut total_size = 0;
        let mut total_count = 0;
        for w in words.iter() {
            let (s, c) = rle_word::size_and_count::<C>(w);
            total_size += s;
            total_count += c;
        }
        assert_eq!(total_size, v.size());
        assert_eq!(total_count, v.count());
    }
}
