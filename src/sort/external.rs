/*
 * SPDX-FileCopyrightText: 2026 The filigree authors
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! External sorting of fixed-size records.
//!
//! Run generation fills a memory budget, sorts indirectly through a
//! permutation vector (in parallel), and spills a scratch run; runs merge
//! through a binary tree of buffered two-way mergers so refills stay
//! coarse-grained. The sorted stream is pushed to a destination and never
//! materialized.

use anyhow::Result;
use log::debug;
use rayon::prelude::*;
use std::io::{Read, Write};
use std::marker::PhantomData;

use crate::utils::{FileFactory, InFile, TmpFileHolder};

/// Fixed-size records that can frame themselves on a byte stream.
pub trait Record: Sized + Copy + Ord + Send + Sync {
    const BYTES: usize;

    fn write(&self, out: &mut dyn Write) -> Result<()>;

    /// `Ok(None)` at a clean end of stream.
    fn read(input: &mut dyn InFile) -> Result<Option<Self>>;
}

macro_rules! impl_record {
    ($($t:ty),*) => {$(
        impl Record for $t {
            const BYTES: usize = std::mem::size_of::<$t>();

            fn write(&self, out: &mut dyn Write) -> Result<()> {
                out.write_all(&self.to_le_bytes())?;
                Ok(())
            }

            fn read(input: &mut dyn InFile) -> Result<Option<Self>> {
                let mut buf = [0u8; std::mem::size_of::<$t>()];
                match input.read_exact(&mut buf) {
                    Ok(()) => Ok(Some(<$t>::from_le_bytes(buf))),
                    Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
                    Err(e) => Err(e.into()),
                }
            }
        }
    )*};
}

impl_record!(u32, u64, u128);

/// Where a sort delivers its output.
pub trait SortDest<T> {
    fn push_back(&mut self, item: T) -> Result<()>;
    fn end(&mut self) -> Result<()>;
}

/// Collects into a vector; mostly for tests and small intermediates.
impl<T> SortDest<T> for Vec<T> {
    fn push_back(&mut self, item: T) -> Result<()> {
        self.push(item);
        Ok(())
    }

    fn end(&mut self) -> Result<()> {
        Ok(())
    }
}

/// A stream cursor positioned on its current record.
pub trait Cursor<T>: Send {
    fn valid(&self) -> bool;
    fn current(&self) -> &T;
    fn advance(&mut self) -> Result<()>;
}

struct RunReader<T: Record> {
    input: Box<dyn InFile>,
    curr: Option<T>,
}

impl<T: Record> RunReader<T> {
    fn new(mut input: Box<dyn InFile>) -> Result<Self> {
        let curr = T::read(input.as_mut())?;
        Ok(RunReader { input, curr })
    }
}

impl<T: Record> Cursor<T> for RunReader<T> {
    fn valid(&self) -> bool {
        self.curr.is_some()
    }

    fn current(&self) -> &T {
        self.curr.as_ref().unwrap()
    }

    fn advance(&mut self) -> Result<()> {
        self.curr = T::read(self.input.as_mut())?;
        Ok(())
    }
}

/// Buffered two-way merge node.
pub struct Merger<T: Send> {
    buf_items: usize,
    lhs: Box<dyn Cursor<T>>,
    rhs: Box<dyn Cursor<T>>,
    buffer: Vec<T>,
    idx: usize,
}

impl<T: Ord + Copy + Send> Merger<T> {
    pub fn new(buf_items: usize, lhs: Box<dyn Cursor<T>>, rhs: Box<dyn Cursor<T>>) -> Result<Self> {
        let mut merger = Merger {
            buf_items,
            lhs,
            rhs,
            buffer: Vec::with_capacity(buf_items),
            idx: 0,
        };
        merger.refill()?;
        Ok(merger)
    }

    fn refill(&mut self) -> Result<()> {
        self.buffer.clear();
        self.idx = 0;
        while self.lhs.valid() && self.rhs.valid() && self.buffer.len() < self.buf_items {
            if self.lhs.current() < self.rhs.current() {
                self.buffer.push(*self.lhs.current());
                self.lhs.advance()?;
            } else {
                self.buffer.push(*self.rhs.current());
                self.rhs.advance()?;
            }
        }
        while self.lhs.valid() && self.buffer.len() < self.buf_items {
            self.buffer.push(*self.lhs.current());
            self.lhs.advance()?;
        }
        while self.rhs.valid() && self.buffer.len() < self.buf_items {
            self.buffer.push(*self.rhs.current());
            self.rhs.advance()?;
        }
        Ok(())
    }
}

impl<T: Ord + Copy + Send> Cursor<T> for Merger<T> {
    fn valid(&self) -> bool {
        self.idx < self.buffer.len()
    }

    fn current(&self) -> &T {
        &self.buffer[self.idx]
    }

    fn advance(&mut self) -> Result<()> {
        self.idx += 1;
        if self.idx < self.buffer.len() {
            return Ok(());
        }
        self.refill()
    }
}

/// Fold cursors pairwise into a binary merge tree.
pub fn merge_tree<T: Ord + Copy + Send + 'static>(
    mut cursors: Vec<Box<dyn Cursor<T>>>,
    buf_items: usize,
) -> Result<Box<dyn Cursor<T>>> {
    if cursors.is_empty() {
        return Ok(Box::new(EmptyCursor(PhantomData)));
    }
    while cursors.len() > 1 {
        let mut next: Vec<Box<dyn Cursor<T>>> = Vec::with_capacity(cursors.len().div_ceil(2));
        let mut it = cursors.into_iter();
        while let Some(lhs) = it.next() {
            match it.next() {
                Some(rhs) => next.push(Box::new(Merger::new(buf_items, lhs, rhs)?)),
                None => next.push(lhs),
            }
        }
        cursors = next;
    }
    Ok(cursors.pop().unwrap())
}

struct EmptyCursor<T>(PhantomData<T>);

impl<T: Send> Cursor<T> for EmptyCursor<T> {
    fn valid(&self) -> bool {
        false
    }

    fn current(&self) -> &T {
        unreachable!("empty cursor dereferenced")
    }

    fn advance(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Push-mode external sorter for fixed-size records.
pub struct ExternalVarPushSorter<'a, T: Record> {
    factory: &'a dyn FileFactory,
    max_buf_items: usize,
    files: Vec<TmpFileHolder<'a>>,
    buf: Vec<T>,
}

impl<'a, T: Record + 'static> ExternalVarPushSorter<'a, T> {
    pub fn new(factory: &'a dyn FileFactory, max_buf_items: usize) -> Self {
        ExternalVarPushSorter {
            factory,
            max_buf_items: max_buf_items.max(1),
            files: Vec::new(),
            buf: Vec::with_capacity(max_buf_items.max(1)),
        }
    }

    pub fn push_back(&mut self, item: T) -> Result<()> {
        self.buf.push(item);
        if self.buf.len() >= self.max_buf_items {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        // Sort a permutation rather than the payload.
        let mut perm: Vec<u32> = (0..self.buf.len() as u32).collect();
        let buf = &self.buf;
        perm.par_sort_unstable_by(|&a, &b| buf[a as usize].cmp(&buf[b as usize]));

        let name = self.factory.tmp_name();
        {
            let mut out = self.factory.open_out(&name)?;
            for &i in &perm {
                self.buf[i as usize].write(out.as_mut())?;
            }
            out.flush()?;
        }
        debug!("spilled a run of {} records to {}", self.buf.len(), name);
        self.files.push(TmpFileHolder::new(name, self.factory));
        self.buf.clear();
        Ok(())
    }

    /// Merge all runs and drive them into `dest`.
    pub fn sort<D: SortDest<T>>(mut self, dest: &mut D) -> Result<()> {
        self.flush()?;
        let mut cursors: Vec<Box<dyn Cursor<T>>> = Vec::with_capacity(self.files.len());
        for holder in &self.files {
            cursors.push(Box::new(RunReader::<T>::new(
                self.factory.open_in(holder.name())?,
            )?));
        }
        let mut merged = merge_tree(cursors, self.max_buf_items.clamp(16, 1 << 16))?;
        while merged.valid() {
            dest.push_back(*merged.current())?;
            merged.advance()?;
        }
        dest.end()
    }
}

/// Iterator-mode external sort under a byte budget.
pub struct ExternalSort;

impl ExternalSort {
    pub fn sort<T, I, D>(
        src: I,
        dest: &mut D,
        factory: &dyn FileFactory,
        buf_space_bytes: u64,
    ) -> Result<()>
    where
        T: Record + 'static,
        I: IntoIterator<Item = T>,
        D: SortDest<T>,
    {
        let max_items = ((buf_space_bytes as usize) / T::BYTES).max(1);
        let mut sorter = ExternalVarPushSorter::new(factory, max_items);
        for item in src {
            sorter.push_back(item)?;
        }
        sorter.sort(dest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::MemFileFactory;
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn sorts_across_many_runs() {
        let fac = MemFileFactory::new();
        let mut rng = SmallRng::seed_from_u64(17);
        let values: Vec<u64> = (0..10_000).map(|_| rng.random()).collect();

        let mut out: Vec<u64> = Vec::new();
        // A tiny budget forces dozens of runs.
        ExternalSort::sort(values.iter().copied(), &mut out, &fac, 4096).unwrap();

        let mut expected = values;
        expected.sort_unstable();
        assert_eq!(out, expected);
    }

    #[test]
    fn u128_records() {
        let fac = MemFileFactory::new();
        let mut rng = SmallRng::seed_from_u64(18);
        let values: Vec<u128> =
            (0..3000).map(|_| (rng.random::<u64>() as u128) << 64 | rng.random::<u64>() as u128).collect();
        let mut out: Vec<u128> = Vec::new();
        ExternalSort::sort(values.iter().copied(), &mut out, &fac, 1 << 14).unwrap();
        let mut expected = values;
        expected.sort_unstable();
        assert_eq!(out, expected);
    }

    #[test]
    fn empty_input() {
        let fac = MemFileFactory::new();
        let mut out: Vec<u64> = Vec::new();
        ExternalSort::sort(std::iter::empty(), &mut out, &fac, 1024).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn runs_are_cleaned_up() {
        let fac = MemFileFactory::new();
        let mut out: Vec<u64> = Vec::new();
        ExternalSort::sort((0..1000u64).rev(), &mut out, &fac, 512).unwrap();
        assert_eq!(out.len(), 1000);
        // All scratch runs removed on drop.
        assert!(fac.contents("nonexistent").is_none());
    }
}
