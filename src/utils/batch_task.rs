/*
 * SPDX-FileCopyrightText: 2026 The filigree authors
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! A harness for running a batch of cooperating worker threads.
//!
//! Each worker receives a [`WorkerToken`]; it must call
//! [`WorkerToken::report_work_done`] from its inner loop and exit promptly
//! when that returns `false`. The first worker error cancels the rest and
//! is re-raised from the coordinator after every worker has exited.

use anyhow::{anyhow, Result};
use dsi_progress_logger::prelude::*;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

struct Shared {
    cancelled: AtomicBool,
    work_done: AtomicU64,
    first_error: Mutex<Option<anyhow::Error>>,
}

/// Progress and cancellation token handed to each worker.
pub struct WorkerToken<'a> {
    shared: &'a Shared,
}

impl WorkerToken<'_> {
    /// Record `units` of progress. Returns `false` once the task has been
    /// cancelled; the worker must then return without error.
    pub fn report_work_done(&self, units: u64) -> bool {
        self.shared.work_done.fetch_add(units, Ordering::Relaxed);
        !self.shared.cancelled.load(Ordering::Relaxed)
    }

    pub fn cancelled(&self) -> bool {
        self.shared.cancelled.load(Ordering::Relaxed)
    }
}

/// Run the given workers to completion on scoped threads.
///
/// `item_name` labels the progress log; pass `None` to run quietly.
pub fn run_batch_task<F>(workers: Vec<F>, item_name: Option<&str>) -> Result<()>
where
    F: FnOnce(&WorkerToken) -> Result<()> + Send,
{
    let shared = Shared {
        cancelled: AtomicBool::new(false),
        work_done: AtomicU64::new(0),
        first_error: Mutex::new(None),
    };

    std::thread::scope(|scope| {
        let mut handles = Vec::with_capacity(workers.len());
        for worker in workers {
            let shared = &shared;
            handles.push(scope.spawn(move || {
                let token = WorkerToken { shared };
                if let Err(e) = worker(&token) {
                    let mut slot = shared.first_error.lock().unwrap();
                    if slot.is_none() {
                        *slot = Some(e);
                    }
                    shared.cancelled.store(true, Ordering::Relaxed);
                }
            }));
        }

        if let Some(name) = item_name {
            let mut pl = progress_logger!(item_name = name);
            pl.start(format!("Running {} workers...", handles.len()));
            let mut last = 0;
            while handles.iter().any(|h| !h.is_finished()) {
                std::thread::sleep(std::time::Duration::from_millis(100));
                let done = shared.work_done.load(Ordering::Relaxed);
                pl.update_with_count((done - last) as usize);
                last = done;
            }
            pl.done();
        }

        for handle in handles {
            if handle.join().is_err() {
                let mut slot = shared.first_error.lock().unwrap();
                if slot.is_none() {
                    *slot = Some(anyhow!("worker thread panicked"));
                }
                shared.cancelled.store(true, Ordering::Relaxed);
            }
        }
    });

    match shared.first_error.into_inner().unwrap() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn all_workers_run() {
        let sum = AtomicU64::new(0);
        let workers: Vec<_> = (0..8u64)
            .map(|i| {
                let sum = &sum;
                move |token: &WorkerToken| -> Result<()> {
                    sum.fetch_add(i, Ordering::Relaxed);
                    token.report_work_done(1);
                    Ok(())
                }
            })
            .collect();
        run_batch_task(workers, None).unwrap();
        assert_eq!(sum.load(Ordering::Relaxed), 28);
    }

    #[test]
    fn error_cancels_and_reraises() {
        let exited_clean = AtomicU64::new(0);
        let workers: Vec<_> = (0..4u64)
            .map(|i| {
                let exited_clean = &exited_clean;
                move |token: &WorkerToken| -> Result<()> {
                    if i == 0 {
                        return Err(anyhow!("worker zero failed"));
                    }
                    loop {
                        if !token.report_work_done(1) {
                            exited_clean.fetch_add(1, Ordering::Relaxed);
                            return Ok(());
                        }
                    }
                }
            })
            .collect();
        let err = run_batch_task(workers, None).unwrap_err();
        assert!(err.to_string().contains("worker zero failed"));
        assert_eq!(exited_clean.load(Ordering::Relaxed), 3);
    }
}
