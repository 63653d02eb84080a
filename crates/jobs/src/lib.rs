#![deny(clippy::all, clippy::pedantic)]
//! # Job System
//!
//! Work scheduling for the physics pipeline. A [`JobSystem`] runs a batch of
//! independent, index-addressed jobs and returns only once every job of the
//! batch has finished, so no job can outlive the data it borrows.
//!
//! Two implementations are provided:
//!
//! -   [`SingleThreaded`] runs jobs inline on the calling thread.
//! -   [`ThreadPool`] (feature `parallel`) fans jobs out over a rayon pool.

use std::sync::Arc;
use thiserror::Error;

mod single_threaded;
#[cfg(feature = "parallel")]
mod thread_pool;

pub use single_threaded::SingleThreaded;
#[cfg(feature = "parallel")]
pub use thread_pool::ThreadPool;

#[derive(Error, Debug)]
pub enum JobError {
    #[error("failed to build worker pool: {0}")]
    PoolBuild(String),
    #[error("requested zero worker threads")]
    NoWorkers,
}

pub trait JobSystem: Send + Sync + 'static {
    /// Number of jobs that may execute at the same time.
    fn max_concurrency(&self) -> usize;

    /// Runs `job(i)` for every `i` in `0..count` and blocks until all of them
    /// have completed.
    ///
    /// # Arguments
    /// * `name`: Label used for tracing spans.
    /// * `count`: Number of jobs in the batch.
    /// * `job`: The job body. Jobs of one batch may run concurrently, so any
    ///          shared state they touch must be synchronised by the caller.
    fn for_each(&self, name: &'static str, count: usize, job: &(dyn Fn(usize) + Sync));
}

/// Maps `f` over `0..count` using the job system and returns the results in
/// index order, independent of how the jobs were scheduled.
///
/// Work is split into contiguous batches (a few per worker) so the per-job
/// overhead stays small for cheap closures.
pub fn map_batched<T, F>(jobs: &dyn JobSystem, name: &'static str, count: usize, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(usize) -> T + Sync,
{
    if count == 0 {
        return Vec::new();
    }
    let num_batches = (jobs.max_concurrency() * 4).clamp(1, count);
    if num_batches == 1 {
        return (0..count).map(f).collect();
    }
    let batch_size = count.div_ceil(num_batches);
    let slots: Vec<parking_lot::Mutex<Vec<T>>> =
        (0..num_batches).map(|_| parking_lot::Mutex::new(Vec::new())).collect();

    jobs.for_each(name, num_batches, &|batch| {
        let start = batch * batch_size;
        let end = (start + batch_size).min(count);
        let results: Vec<T> = (start..end).map(&f).collect();
        *slots[batch].lock() = results;
    });

    slots.into_iter().flat_map(parking_lot::Mutex::into_inner).collect()
}

/// Returns the preferred job system for this build: a thread pool sized to the
/// machine when the `parallel` feature is on, inline execution otherwise.
#[must_use]
pub fn default_job_system() -> Arc<dyn JobSystem> {
    #[cfg(feature = "parallel")]
    {
        let threads = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
        match ThreadPool::new(threads) {
            Ok(pool) => {
                tracing::info!("Using ThreadPool job system with {threads} workers.");
                return Arc::new(pool);
            }
            Err(e) => tracing::warn!("Thread pool initialization failed ({e}), falling back..."),
        }
    }

    tracing::info!("Using SingleThreaded job system.");
    Arc::new(SingleThreaded::new())
}
