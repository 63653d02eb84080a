use crate::{JobError, JobSystem};
use rayon::prelude::*;

/// Worker pool backed by a dedicated rayon pool.
///
/// `for_each` runs inside [`rayon::ThreadPool::install`], which only returns
/// after every job has finished; dropping the pool therefore never leaves
/// jobs in flight.
pub struct ThreadPool {
    pool: rayon::ThreadPool,
    threads: usize,
}

impl ThreadPool {
    /// Builds a pool with `threads` workers.
    ///
    /// # Errors
    /// Returns [`JobError::NoWorkers`] for `threads == 0` and
    /// [`JobError::PoolBuild`] if rayon cannot spawn the workers.
    pub fn new(threads: usize) -> Result<Self, JobError> {
        if threads == 0 {
            return Err(JobError::NoWorkers);
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("physics-worker-{i}"))
            .build()
            .map_err(|e| JobError::PoolBuild(e.to_string()))?;
        Ok(Self { pool, threads })
    }
}

impl JobSystem for ThreadPool {
    fn max_concurrency(&self) -> usize {
        self.threads
    }

    fn for_each(&self, name: &'static str, count: usize, job: &(dyn Fn(usize) + Sync)) {
        let _span = tracing::trace_span!("jobs", name, count).entered();
        self.pool.install(|| (0..count).into_par_iter().for_each(job));
    }
}
