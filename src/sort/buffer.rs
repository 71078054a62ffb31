/*
 * SPDX-FileCopyrightText: 2026 The filigree authors
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! External sorting of variable-length byte records.
//!
//! Records are framed with a vbyte length prefix in a single buffered
//! file. When a file outgrows the buffer it is partitioned into 256 child
//! files by the next payload byte and the recursion continues; a file
//! that fits is sorted in memory through an offset permutation. Records
//! exhausted at the current depth sort before every longer record and are
//! emitted as they are met.

use anyhow::Result;
use std::io::Write;

use super::external::SortDest;
use crate::codes::VByteCodec;
use crate::utils::FileFactory;

const RADIX: usize = 256;

struct BufferedFile<'a> {
    buffer_size: usize,
    file_name: String,
    factory: &'a dyn FileFactory,
    buffer: Vec<u8>,
}

impl<'a> BufferedFile<'a> {
    fn new(buffer_size: usize, file_name: String, factory: &'a dyn FileFactory) -> Self {
        BufferedFile {
            buffer_size,
            file_name,
            factory,
            buffer: Vec::new(),
        }
    }

    fn push_back(&mut self, item: &[u8]) -> Result<()> {
        let mut tmp = Vec::with_capacity(10);
        VByteCodec::encode(item.len() as u64, &mut tmp);
        let z = tmp.len() + item.len();
        if self.buffer.len() + z > self.buffer_size {
            self.flush()?;
        }
        self.buffer.extend_from_slice(&tmp);
        self.buffer.extend_from_slice(item);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let mut out = self.factory.append(&self.file_name)?;
        out.write_all(&self.buffer)?;
        out.flush()?;
        self.buffer.clear();
        Ok(())
    }
}

pub struct ExternalBufferSort<'a> {
    factory: &'a dyn FileFactory,
    buffer_size: usize,
    file_name: String,
    root: BufferedFile<'a>,
}

impl<'a> ExternalBufferSort<'a> {
    pub fn new(buffer_size: usize, factory: &'a dyn FileFactory) -> Self {
        let file_name = factory.tmp_name();
        ExternalBufferSort {
            factory,
            buffer_size,
            file_name: file_name.clone(),
            root: BufferedFile::new(buffer_size, file_name, factory),
        }
    }

    pub fn push_back(&mut self, item: &[u8]) -> Result<()> {
        self.root.push_back(item)
    }

    pub fn sort<D: SortDest<Vec<u8>>>(mut self, dest: &mut D) -> Result<()> {
        self.root.flush()?;
        let file_name = self.file_name.clone();
        self.sort_file(&file_name, 0, dest)?;
        dest.end()
    }

    fn sort_file<D: SortDest<Vec<u8>>>(
        &self,
        file_name: &str,
        depth: usize,
        dest: &mut D,
    ) -> Result<()> {
        if !self.factory.exists(file_name) {
            return Ok(());
        }

        if self.factory.size_of(file_name)? as usize <= self.buffer_size {
            self.sort_in_memory(file_name, dest)?;
            self.factory.remove(file_name)?;
            return Ok(());
        }

        let mut kids: Vec<BufferedFile> = (0..RADIX)
            .map(|i| {
                BufferedFile::new(
                    self.buffer_size / RADIX,
                    format!("{}-{}", file_name, i),
                    self.factory,
                )
            })
            .collect();
        let mut used = [false; RADIX];

        {
            let bytes = self.factory.map(file_name)?;
            let bytes = bytes.as_bytes();
            let mut pos = 0;
            while pos < bytes.len() {
                let z = VByteCodec::decode(bytes, &mut pos)? as usize;
                let item = &bytes[pos..pos + z];
                pos += z;
                if item.len() == depth {
                    dest.push_back(item.to_vec())?;
                } else {
                    kids[item[depth] as usize].push_back(item)?;
                    used[item[depth] as usize] = true;
                }
            }
        }

        for kid in &mut kids {
            kid.flush()?;
        }
        drop(kids);

        self.factory.remove(file_name)?;

        for (i, &u) in used.iter().enumerate() {
            if u {
                self.sort_file(&format!("{}-{}", file_name, i), depth + 1, dest)?;
            }
        }
        Ok(())
    }

    fn sort_in_memory<D: SortDest<Vec<u8>>>(&self, file_name: &str, dest: &mut D) -> Result<()> {
        let region = self.factory.map(file_name)?;
        let bytes = region.as_bytes();
        let mut items: Vec<(usize, usize)> = Vec::new();
        let mut pos = 0;
        while pos < bytes.len() {
            let z = VByteCodec::decode(bytes, &mut pos)? as usize;
            items.push((pos, z));
            pos += z;
        }
        items.sort_unstable_by(|&(a, alen), &(b, blen)| {
            bytes[a..a + alen].cmp(&bytes[b..b + blen])
        });
        for (off, len) in items {
            dest.push_back(bytes[off..off + len].to_vec())?;
        }
        Ok(())
    }
}

/// Byte-packet sorting, the main consumer of the radix sorter.
pub struct PacketSorter<'a> {
    sorter: ExternalBufferSort<'a>,
}

impl<'a> PacketSorter<'a> {
    pub fn new(buffer_size: usize, factory: &'a dyn FileFactory) -> Self {
        PacketSorter {
            sorter: ExternalBufferSort::new(buffer_size, factory),
        }
    }

    pub fn push_back(&mut self, packet: &[u8]) -> Result<()> {
        self.sorter.push_back(packet)
    }

    pub fn sort<D: SortDest<Vec<u8>>>(self, dest: &mut D) -> Result<()> {
        self.sorter.sort(dest)
    }
}
