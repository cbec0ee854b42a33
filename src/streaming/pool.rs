//! Worker pool for multithreaded block decoding.
//!
//! With the `parallel` feature, [`WorkerPool`] owns a dedicated rayon thread
//! pool so decoding never competes with the caller's own use of the global
//! pool. Without the feature, tasks run one after another on the calling
//! thread and produce identical results.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::Result;

/// Runs batches of independent tasks and returns their results in order.
#[derive(Debug)]
pub struct WorkerPool {
    #[cfg(feature = "parallel")]
    pool: rayon::ThreadPool,
    workers: usize,
}

impl WorkerPool {
    /// Creates a pool with `workers` threads.
    #[cfg(feature = "parallel")]
    pub fn new(workers: usize) -> Result<Self> {
        let workers = workers.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("flzma2-dec-{}", i))
            .build()
            .map_err(|e| crate::Error::Io(std::io::Error::other(e)))?;
        log::debug!("started worker pool with {} threads", workers);
        Ok(Self { pool, workers })
    }

    /// Creates a sequential pool that reports `workers` as its width.
    #[cfg(not(feature = "parallel"))]
    pub fn new(workers: usize) -> Result<Self> {
        Ok(Self {
            workers: workers.max(1),
        })
    }

    /// Returns the number of workers.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Applies `f` to every task, returning the results in task order.
    #[cfg(feature = "parallel")]
    pub fn run_ordered<T, R, F>(&self, tasks: Vec<T>, f: F) -> Vec<R>
    where
        T: Send,
        R: Send,
        F: Fn(T) -> R + Sync + Send,
    {
        if tasks.len() <= 1 {
            return tasks.into_iter().map(f).collect();
        }
        self.pool.install(|| tasks.into_par_iter().map(f).collect())
    }

    /// Applies `f` to every task, returning the results in task order.
    #[cfg(not(feature = "parallel"))]
    pub fn run_ordered<T, R, F>(&self, tasks: Vec<T>, f: F) -> Vec<R>
    where
        F: Fn(T) -> R,
    {
        tasks.into_iter().map(f).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_results_in_task_order() {
        let pool = WorkerPool::new(4).unwrap();
        assert_eq!(pool.workers(), 4);
        let tasks: Vec<u64> = (0..100).collect();
        let out = pool.run_ordered(tasks, |n| n * n);
        let expected: Vec<u64> = (0..100).map(|n| n * n).collect();
        assert_eq!(out, expected);
    }

    #[test]
    fn test_mutable_borrows_as_tasks() {
        let pool = WorkerPool::new(2).unwrap();
        let mut bufs = vec![vec![0u8; 8]; 5];
        let tasks: Vec<(usize, &mut Vec<u8>)> = bufs.iter_mut().enumerate().collect();
        let lens = pool.run_ordered(tasks, |(i, buf)| {
            buf.fill(i as u8);
            buf.len()
        });
        assert_eq!(lens, vec![8; 5]);
        for (i, buf) in bufs.iter().enumerate() {
            assert!(buf.iter().all(|&b| b == i as u8));
        }
    }

    #[test]
    fn test_zero_workers_becomes_one() {
        let pool = WorkerPool::new(0).unwrap();
        assert_eq!(pool.workers(), 1);
        assert_eq!(pool.run_ordered(Vec::<u8>::new(), |b| b), Vec::<u8>::new());
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_thread_names() {
        let pool = WorkerPool::new(2).unwrap();
        let names = pool.run_ordered(vec![(), ()], |_| {
            std::thread::current().name().map(str::to_owned)
        });
        for name in names {
            assert!(name.unwrap().starts_with("flzma2-dec-"));
        }
    }
}
