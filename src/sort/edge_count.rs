/*
 * SPDX-FileCopyrightText: 2026 The filigree authors
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! The (edge, count) record and its delta wire format.
//!
//! Sorted runs store each edge as the difference from its predecessor,
//! both 64-bit words vbyte-coded low word first, followed by the vbyte
//! count. Streams are therefore strictly order-dependent: a reader must
//! track the previous edge exactly as the writer did.

use anyhow::Result;
use std::io::Write;

use crate::codes::VByteCodec;
use crate::utils::InFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeAndCount {
    pub edge: u128,
    pub count: u64,
}

impl EdgeAndCount {
    pub fn new(edge: u128, count: u64) -> Self {
        EdgeAndCount { edge, count }
    }
}

/// Append `item` to `out`, delta-coded against `prev_edge`.
pub fn encode<W: Write + ?Sized>(
    out: &mut W,
    prev_edge: u128,
    item: &EdgeAndCount,
) -> Result<()> {
    debug_assert!(prev_edge <= item.edge);
    let d = item.edge.wrapping_sub(prev_edge);
    let mut buf = Vec::with_capacity(27);
    VByteCodec::encode(d as u64, &mut buf);
    VByteCodec::encode((d >> 64) as u64, &mut buf);
    VByteCodec::encode(item.count, &mut buf);
    out.write_all(&buf)?;
    Ok(())
}

/// Read the next record, resolving the delta against `prev_edge`;
/// `Ok(None)` at a clean end of stream.
pub fn decode<R: InFile + ?Sized>(input: &mut R, prev_edge: u128) -> Result<Option<EdgeAndCount>> {
    let lo = match VByteCodec::read(input)? {
        None => return Ok(None),
        Some(lo) => lo,
    };
    let hi = VByteCodec::read(input)?.unwrap_or(0);
    let count = VByteCodec::read(input)?.unwrap_or(0);
    let d = ((hi as u128) << 64) | lo as u128;
    Ok(Some(EdgeAndCount {
        edge: prev_edge.wrapping_add(d),
        count,
    }))
}

/// Streaming reader over a whole run file.
pub struct EdgeAndCountReader {
    input: Box<dyn InFile>,
    prev_edge: u128,
    remaining: u64,
    curr: EdgeAndCount,
    valid: bool,
}

impl EdgeAndCountReader {
    /// `len` is the record count written to the file.
    pub fn new(input: Box<dyn InFile>, len: u64) -> Result<Self> {
        let mut reader = EdgeAndCountReader {
            input,
            prev_edge: 0,
            remaining: len,
            curr: EdgeAndCount::new(0, 0),
            valid: false,
        };
        reader.advance()?;
        Ok(reader)
    }

    pub fn valid(&self) -> bool {
        self.valid
    }

    pub fn current(&self) -> EdgeAndCount {
        debug_assert!(self.valid);
        self.curr
    }

    pub fn advance(&mut self) -> Result<()> {
        if self.remaining == 0 {
            self.valid = false;
            return Ok(());
        }
        match decode(self.input.as_mut(), self.prev_edge)? {
            None => self.valid = false,
            Some(item) => {
                self.prev_edge = item.edge;
                self.curr = item;
                self.remaining -= 1;
                self.valid = true;
            }
        }
        Ok(())
    }
}

/// Streaming writer producing a run file.
pub struct EdgeAndCountWriter<W: Write> {
    out: W,
    prev_edge: u128,
    len: u64,
}

impl<W: Write> EdgeAndCountWriter<W> {
    pub fn new(out: W) -> Self {
        EdgeAndCountWriter {
            out,
            prev_edge: 0,
            len: 0,
        }
    }

    pub fn push_back(&mut self, item: &EdgeAndCount) -> Result<()> {
        encode(&mut self.out, self.prev_edge, item)?;
        self.prev_edge = item.edge;
        self.len += 1;
        Ok(())
    }

    /// Record count written so far.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn end(mut self) -> Result<u64> {
        self.out.flush()?;
        Ok(self.len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{FileFactory, MemFileFactory};

    #[test]
    fn stream_round_trip() {
        let fac = MemFileFactory::new();
        let items: Vec<EdgeAndCount> = (0..1000u128)
            .map(|i| EdgeAndCount::new(i * i * 7919 + (i << 80), (i as u64 % 13) + 1))
            .collect();
        let len = {
            let mut w = EdgeAndCountWriter::new(fac.open_out("run").unwrap());
            for item in &items {
                w.push_back(item).unwrap();
            }
            w.end().unwrap()
        };
        assert_eq!(len, 1000);

        let mut r = EdgeAndCountReader::new(fac.open_in("run").unwrap(), len).unwrap();
        for item in &items {
            assert!(r.valid());
            assert_eq!(r.current(), *item);
            r.advance().unwrap();
        }
        assert!(!r.valid());
    }

    #[test]
    fn small_deltas_encode_small() {
        let fac = MemFileFactory::new();
        {
            let mut w = EdgeAndCountWriter::new(fac.open_out("run").unwrap());
            for i in 0..100u128 {
                w.push_back(&EdgeAndCount::new(i, 1)).unwrap();
            }
            w.end().unwrap();
        }
        // Delta 1, high word 0, count 1: three bytes a record.
        assert_eq!(fac.size_of("run").unwrap(), 300);
    }
}
