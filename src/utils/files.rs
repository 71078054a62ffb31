/*
 * SPDX-FileCopyrightText: 2026 The filigree authors
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Filesystem indirection.
//!
//! Every persistent structure takes a [`FileFactory`] instead of touching
//! the filesystem directly, so the whole stack can run against real files
//! (memory mapped on the read side) or against an in-memory store. The
//! tests and the deletion-overlay mask use the in-memory store exclusively.

use anyhow::{bail, Context, Result};
use mmap_rs::{Mmap, MmapFlags, MmapOptions};
use std::collections::HashMap;
use std::io::{BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::Error;

/// A buffered, seekable output file.
pub trait OutFile: Write + Seek + Send {}
impl<T: Write + Seek + Send> OutFile for T {}

/// A buffered input file.
pub trait InFile: BufRead + Send {}
impl<T: BufRead + Send> InFile for T {}

/// A read-only region of file contents, aligned to at least eight bytes.
#[derive(Debug)]
pub struct MappedRegion {
    storage: RegionStorage,
    len: usize,
}

#[derive(Debug)]
enum RegionStorage {
    Mapped(Mmap),
    Owned(Box<[u64]>),
}

impl MappedRegion {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let words = bytes.len().div_ceil(8);
        let mut buf = vec![0u64; words].into_boxed_slice();
        if !bytes.is_empty() {
            // Safe: the destination is at least bytes.len() bytes long.
            unsafe {
                std::ptr::copy_nonoverlapping(
                    bytes.as_ptr(),
                    buf.as_mut_ptr() as *mut u8,
                    bytes.len(),
                );
            }
        }
        MappedRegion {
            storage: RegionStorage::Owned(buf),
            len: bytes.len(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match &self.storage {
            RegionStorage::Mapped(m) => unsafe {
                std::slice::from_raw_parts(m.as_ptr(), self.len)
            },
            RegionStorage::Owned(b) => unsafe {
                std::slice::from_raw_parts(b.as_ptr() as *const u8, self.len)
            },
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Filesystem capability interface used by every builder and reader.
pub trait FileFactory: Send + Sync {
    /// Open a file for buffered reading.
    fn open_in(&self, name: &str) -> Result<Box<dyn InFile>>;

    /// Create (truncating) a file for buffered, seekable writing.
    fn open_out(&self, name: &str) -> Result<Box<dyn OutFile>>;

    /// Open a file for appending, creating it if needed.
    fn append(&self, name: &str) -> Result<Box<dyn OutFile>>;

    /// Map the whole file read-only.
    fn map(&self, name: &str) -> Result<MappedRegion>;

    fn exists(&self, name: &str) -> bool;

    fn size_of(&self, name: &str) -> Result<u64>;

    fn remove(&self, name: &str) -> Result<()>;

    /// A fresh scratch-file name of the form `<dir>/<secs>-<micros>-<serial>`.
    fn tmp_name(&self) -> String;
}

/// Removes the named file when dropped.
pub struct TmpFileHolder<'a> {
    name: String,
    factory: &'a dyn FileFactory,
}

impl<'a> TmpFileHolder<'a> {
    pub fn new(name: String, factory: &'a dyn FileFactory) -> Self {
        TmpFileHolder { name, factory }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for TmpFileHolder<'_> {
    fn drop(&mut self) {
        // Removal failure on a scratch file is not worth propagating.
        let _ = self.factory.remove(&self.name);
    }
}

static TMP_SERIAL: AtomicU64 = AtomicU64::new(0);

fn tmp_name_in(dir: &str) -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    format!(
        "{}/{}-{}-{}",
        dir,
        now.as_secs(),
        now.subsec_micros(),
        TMP_SERIAL.fetch_add(1, Ordering::Relaxed)
    )
}

/// The real filesystem, with `mmap-rs` on the mapped read side.
pub struct PhysicalFileFactory {
    tmp_dir: String,
}

impl PhysicalFileFactory {
    pub fn new() -> Self {
        let tmp_dir = std::env::var("TMPDIR").unwrap_or_else(|_| {
            let d = std::env::temp_dir();
            if d.as_os_str().is_empty() {
                ".".to_owned()
            } else {
                d.to_string_lossy().into_owned()
            }
        });
        PhysicalFileFactory { tmp_dir }
    }

    pub fn with_tmp_dir<P: Into<PathBuf>>(tmp_dir: P) -> Self {
        PhysicalFileFactory {
            tmp_dir: tmp_dir.into().to_string_lossy().into_owned(),
        }
    }
}

impl Default for PhysicalFileFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl FileFactory for PhysicalFileFactory {
    fn open_in(&self, name: &str) -> Result<Box<dyn InFile>> {
        let file = std::fs::File::open(name).with_context(|| format!("Cannot open {}", name))?;
        Ok(Box::new(BufReader::with_capacity(1 << 16, file)))
    }

    fn open_out(&self, name: &str) -> Result<Box<dyn OutFile>> {
        let file =
            std::fs::File::create(name).with_context(|| format!("Cannot create {}", name))?;
        Ok(Box::new(BufWriter::with_capacity(1 << 16, file)))
    }

    fn append(&self, name: &str) -> Result<Box<dyn OutFile>> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(name)
            .with_context(|| format!("Cannot open {} for appending", name))?;
        Ok(Box::new(BufWriter::with_capacity(1 << 16, file)))
    }

    fn map(&self, name: &str) -> Result<MappedRegion> {
        let file_len = std::fs::metadata(name)
            .with_context(|| format!("Cannot stat {}", name))?
            .len() as usize;
        if file_len == 0 {
            return Ok(MappedRegion::from_bytes(&[]));
        }
        let file = std::fs::File::open(name).with_context(|| format!("Cannot open {}", name))?;
        let mmap = unsafe {
            MmapOptions::new(file_len)
                .with_context(|| format!("Cannot initialize mmap of size {}", file_len))?
                .with_flags(MmapFlags::TRANSPARENT_HUGE_PAGES)
                .with_file(&file, 0)
                .map()
                .with_context(|| format!("Cannot mmap {} (size {})", name, file_len))?
        };
        Ok(MappedRegion {
            storage: RegionStorage::Mapped(mmap),
            len: file_len,
        })
    }

    fn exists(&self, name: &str) -> bool {
        std::fs::metadata(name).is_ok()
    }

    fn size_of(&self, name: &str) -> Result<u64> {
        Ok(std::fs::metadata(name)
            .with_context(|| format!("Cannot stat {}", name))?
            .len())
    }

    fn remove(&self, name: &str) -> Result<()> {
        std::fs::remove_file(name).with_context(|| format!("Cannot remove {}", name))
    }

    fn tmp_name(&self) -> String {
        tmp_name_in(&self.tmp_dir)
    }
}

type MemFiles = Arc<Mutex<HashMap<String, Arc<Vec<u8>>>>>;

/// An in-memory file store keyed by name.
///
/// Used by the test suites and by the deletion-overlay mask, which is
/// transient.
#[derive(Debug, Clone, Default)]
pub struct MemFileFactory {
    files: MemFiles,
}

impl MemFileFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a file with the given contents, replacing any previous one.
    pub fn add_file(&self, name: &str, contents: impl Into<Vec<u8>>) {
        self.files
            .lock()
            .unwrap()
            .insert(name.to_owned(), Arc::new(contents.into()));
    }

    /// Snapshot of the current contents, mostly for assertions in tests.
    pub fn contents(&self, name: &str) -> Option<Arc<Vec<u8>>> {
        self.files.lock().unwrap().get(name).cloned()
    }
}

struct MemWriter {
    name: String,
    files: MemFiles,
    buf: Vec<u8>,
    pos: usize,
}

impl Write for MemWriter {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        let end = self.pos + data.len();
        if end > self.buf.len() {
            self.buf.resize(end, 0);
        }
        self.buf[self.pos..end].copy_from_slice(data);
        self.pos = end;
        Ok(data.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.files
            .lock()
            .unwrap()
            .insert(self.name.clone(), Arc::new(self.buf.clone()));
        Ok(())
    }
}

impl Seek for MemWriter {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        let new = match pos {
            SeekFrom::Start(p) => p as i64,
            SeekFrom::End(d) => self.buf.len() as i64 + d,
            SeekFrom::Current(d) => self.pos as i64 + d,
        };
        if new < 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "seek before start",
            ));
        }
        self.pos = new as usize;
        Ok(self.pos as u64)
    }
}

impl Drop for MemWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

impl FileFactory for MemFileFactory {
    fn open_in(&self, name: &str) -> Result<Box<dyn InFile>> {
        let files = self.files.lock().unwrap();
        let contents = files
            .get(name)
            .with_context(|| format!("Cannot open {}", name))?
            .clone();
        Ok(Box::new(ArcReader {
            contents,
            pos: 0,
        }))
    }

    fn open_out(&self, name: &str) -> Result<Box<dyn OutFile>> {
        Ok(Box::new(MemWriter {
            name: name.to_owned(),
            files: self.files.clone(),
            buf: Vec::new(),
            pos: 0,
        }))
    }

    fn append(&self, name: &str) -> Result<Box<dyn OutFile>> {
        let existing = self
            .files
            .lock()
            .unwrap()
            .get(name)
            .map(|c| c.as_ref().clone())
            .unwrap_or_default();
        let pos = existing.len();
        Ok(Box::new(MemWriter {
            name: name.to_owned(),
            files: self.files.clone(),
            buf: existing,
            pos,
        }))
    }

    fn map(&self, name: &str) -> Result<MappedRegion> {
        let files = self.files.lock().unwrap();
        let contents = files
            .get(name)
            .with_context(|| format!("Cannot map {}", name))?;
        Ok(MappedRegion::from_bytes(contents))
    }

    fn exists(&self, name: &str) -> bool {
        self.files.lock().unwrap().contains_key(name)
    }

    fn size_of(&self, name: &str) -> Result<u64> {
        let files = self.files.lock().unwrap();
        match files.get(name) {
            Some(c) => Ok(c.len() as u64),
            None => bail!(Error::General(format!("no such file: {}", name))),
        }
    }

    fn remove(&self, name: &str) -> Result<()> {
        match self.files.lock().unwrap().remove(name) {
            Some(_) => Ok(()),
            None => bail!(Error::General(format!("no such file: {}", name))),
        }
    }

    fn tmp_name(&self) -> String {
        tmp_name_in("tmp")
    }
}

struct ArcReader {
    contents: Arc<Vec<u8>>,
    pos: usize,
}

impl Read for ArcReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let rest = &self.contents[self.pos.min(self.contents.len())..];
        let n = rest.len().min(buf.len());
        buf[..n].copy_from_slice(&rest[..n]);
        self.pos += n;
        Ok(n)
    }
}

impl BufRead for ArcReader {
    fn fill_buf(&mut self) -> std::io::Result<&[u8]> {
        Ok(&self.contents[self.pos.min(self.contents.len())..])
    }

    fn consume(&mut self, amt: usize) {
        self.pos += amt;
    }
}

/// Little-endian read helpers for mapped index regions.
pub fn read_u16_le(bytes: &[u8], off: usize) -> u16 {
    u16::from_le_bytes(bytes[off..off + 2].try_into().unwrap())
}

pub fn read_u32_le(bytes: &[u8], off: usize) -> u32 {
    u32::from_le_bytes(bytes[off..off + 4].try_into().unwrap())
}

pub fn read_u64_le(bytes: &[u8], off: usize) -> u64 {
    u64::from_le_bytes(bytes[off..off + 8].try_into().unwrap())
}

pub fn read_u128_le(bytes: &[u8], off: usize) -> u128 {
    u128::from_le_bytes(bytes[off..off + 16].try_into().unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mem_factory_round_trip() {
        let fac = MemFileFactory::new();
        {
            let mut out = fac.open_out("a").unwrap();
            out.write_all(b"hello, world").unwrap();
            out.seek(SeekFrom::Start(0)).unwrap();
            out.write_all(b"H").unwrap();
            out.flush().unwrap();
        }
        let mut content = String::new();
        fac.open_in("a").unwrap().read_to_string(&mut content).unwrap();
        assert_eq!(content, "Hello, world");
        assert_eq!(fac.size_of("a").unwrap(), 12);

        let map = fac.map("a").unwrap();
        assert_eq!(map.as_bytes(), b"Hello, world");

        fac.remove("a").unwrap();
        assert!(!fac.exists("a"));
    }

    #[test]
    fn mem_factory_append() {
        let fac = MemFileFactory::new();
        fac.open_out("a").unwrap().write_all(b"one").unwrap();
        fac.append("a").unwrap().write_all(b",two").unwrap();
        assert_eq!(fac.contents("a").unwrap().as_slice(), b"one,two");
    }

    #[test]
    fn tmp_names_are_distinct() {
        let fac = MemFileFactory::new();
        assert_ne!(fac.tmp_name(), fac.tmp_name());
    }
}
