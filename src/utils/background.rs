/*
 * SPDX-FileCopyrightText: 2026 The filigree authors
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Single-producer background consumers over bounded channels.
//!
//! A producer pushes items (or blocks of items) which a dedicated thread
//! drains into a sink; the bounded channel provides backpressure when the
//! consumer falls behind. Calling [`BackgroundConsumer::end`] flushes the
//! queue, joins the thread, and hands the sink back to the caller.

use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, Sender};
use std::thread::JoinHandle;

/// Items per block handed to the consumer thread.
pub const DEFAULT_BLOCK_ITEMS: usize = 4096;
/// Maximum number of blocks in flight.
pub const DEFAULT_MAX_BLOCKS: usize = 1024;

/// Anything that can absorb a stream of items.
pub trait Sink<T>: Send {
    fn push_back(&mut self, item: T) -> Result<()>;
}

/// Adapter turning a closure into a [`Sink`].
pub struct FnSink<F>(pub F);

impl<T, F: FnMut(T) -> Result<()> + Send> Sink<T> for FnSink<F> {
    fn push_back(&mut self, item: T) -> Result<()> {
        (self.0)(item)
    }
}

/// A background consumer batching items into blocks internally.
pub struct BackgroundConsumer<T: Send + 'static, S: Sink<T> + 'static> {
    tx: Option<Sender<Vec<T>>>,
    handle: Option<JoinHandle<Result<S>>>,
    block: Vec<T>,
    block_items: usize,
}

impl<T: Send + 'static, S: Sink<T> + 'static> BackgroundConsumer<T, S> {
    pub fn new(sink: S) -> Self {
        Self::with_bounds(sink, DEFAULT_BLOCK_ITEMS, DEFAULT_MAX_BLOCKS)
    }

    pub fn with_bounds(mut sink: S, block_items: usize, max_blocks: usize) -> Self {
        let (tx, rx) = bounded::<Vec<T>>(max_blocks);
        let handle = std::thread::spawn(move || -> Result<S> {
            for block in rx {
                for item in block {
                    sink.push_back(item)?;
                }
            }
            Ok(sink)
        });
        BackgroundConsumer {
            tx: Some(tx),
            handle: Some(handle),
            block: Vec::with_capacity(block_items),
            block_items,
        }
    }

    pub fn push_back(&mut self, item: T) -> Result<()> {
        self.block.push(item);
        if self.block.len() >= self.block_items {
            self.flush_block()?;
        }
        Ok(())
    }

    fn flush_block(&mut self) -> Result<()> {
        if self.block.is_empty() {
            return Ok(());
        }
        let block = std::mem::replace(&mut self.block, Vec::with_capacity(self.block_items));
        self.tx
            .as_ref()
            .expect("consumer already ended")
            .send(block)
            .map_err(|_| anyhow!("background consumer died"))?;
        Ok(())
    }

    /// Flush outstanding items, join the worker, and recover the sink.
    pub fn end(mut self) -> Result<S> {
        self.flush_block()?;
        drop(self.tx.take());
        let handle = self.handle.take().expect("consumer already ended");
        match handle.join() {
            Ok(res) => res,
            Err(_) => Err(anyhow!("background consumer panicked")),
        }
    }
}

impl<T: Send + 'static, S: Sink<T> + 'static> Drop for BackgroundConsumer<T, S> {
    fn drop(&mut self) {
        drop(self.tx.take());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Block-granular variant: the producer hands over whole blocks.
pub struct BackgroundBlockConsumer<T: Send + 'static, S: Sink<T> + 'static> {
    tx: Option<Sender<Vec<T>>>,
    handle: Option<JoinHandle<Result<S>>>,
}

impl<T: Send + 'static, S: Sink<T> + 'static> BackgroundBlockConsumer<T, S> {
    pub fn new(sink: S, max_blocks: usize) -> Self {
        let (tx, rx) = bounded::<Vec<T>>(max_blocks);
        let handle = std::thread::spawn(move || -> Result<S> {
            let mut sink = sink;
            for block in rx {
                for item in block {
                    sink.push_back(item)?;
                }
            }
            Ok(sink)
        });
        BackgroundBlockConsumer {
            tx: Some(tx),
            handle: Some(handle),
        }
    }

    pub fn push_block(&self, block: Vec<T>) -> Result<()> {
        self.tx
            .as_ref()
            .expect("consumer already ended")
            .send(block)
            .map_err(|_| anyhow!("background consumer died"))?;
        Ok(())
    }

    pub fn end(mut self) -> Result<S> {
        drop(self.tx.take());
        let handle = self.handle.take().expect("consumer already ended");
        match handle.join() {
            Ok(res) => res,
            Err(_) => Err(anyhow!("background consumer panicked")),
        }
    }
}

impl<T: Send + 'static, S: Sink<T> + 'static> Drop for BackgroundBlockConsumer<T, S> {
    fn drop(&mut self) {
        drop(self.tx.take());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct VecSink(Vec<u64>);

    impl Sink<u64> for VecSink {
        fn push_back(&mut self, item: u64) -> Result<()> {
            self.0.push(item);
            Ok(())
        }
    }

    #[test]
    fn drains_in_order() {
        let mut consumer = BackgroundConsumer::with_bounds(VecSink(Vec::new()), 16, 4);
        for i in 0..1000u64 {
            consumer.push_back(i).unwrap();
        }
        let sink = consumer.end().unwrap();
        assert_eq!(sink.0, (0..1000).collect::<Vec<_>>());
    }

    #[test]
    fn block_consumer_preserves_block_order() {
        let consumer = BackgroundBlockConsumer::new(VecSink(Vec::new()), 8);
        for base in (0..1000u64).step_by(100) {
            consumer.push_block((base..base + 100).collect()).unwrap();
        }
        let sink = consumer.end().unwrap();
        assert_eq!(sink.0, (0..1000).collect::<Vec<_>>());
    }

    #[test]
    fn sink_error_reaches_producer() {
        let failing = FnSink(|_item: u64| -> Result<()> { Err(anyhow!("nope")) });
        let mut consumer = BackgroundConsumer::with_bounds(failing, 1, 1);
        // The failure surfaces either while pushing (backpressure) or at end().
        let mut failed = false;
        for i in 0..100 {
            if consumer.push_back(i).is_err() {
                failed = true;
                break;
            }
        }
        if !failed {
            failed = consumer.end().is_err();
        }
        assert!(failed);
    }
}
