//! Background worker pool for asynchronous loader phases.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use async_executor::{Executor, Task};

/// Delay between executor polls when no job is ready.
const IDLE_WAIT: Duration = Duration::from_millis(1);

/// A small fixed-size thread pool driving worker-phase jobs.
///
/// Jobs are spawned as futures; the returned [`Task`] handle supports
/// non-blocking completion checks, which is what the scheduler polls on
/// successive `update` calls. Dropping a handle cancels its job.
pub struct WorkerPool {
    executor: Arc<Executor<'static>>,
    workers: Vec<thread::JoinHandle<()>>,
    stop: Arc<AtomicBool>,
}

impl WorkerPool {
    /// Create a pool with the given number of threads.
    ///
    /// # Panics
    ///
    /// Panics if `worker_count` is 0.
    pub fn new(worker_count: usize) -> Self {
        assert!(worker_count > 0, "worker pool needs at least one thread");

        let executor = Arc::new(Executor::new());
        let stop = Arc::new(AtomicBool::new(false));
        let workers = (0..worker_count)
            .map(|index| {
                let executor = executor.clone();
                let stop = stop.clone();
                thread::Builder::new()
                    .name(format!("lodestone-loader-{index}"))
                    .spawn(move || drive_executor(&executor, &stop))
                    .expect("failed to spawn loader thread")
            })
            .collect();

        tracing::debug!(worker_count, "worker pool started");
        Self {
            executor,
            workers,
            stop,
        }
    }

    /// Create a pool sized for background loading, leaving one core for
    /// the owner thread: max(1, cores - 1).
    pub fn default_threads() -> Self {
        Self::new(num_cpus::get().saturating_sub(1).max(1))
    }

    /// Spawn a job on the pool.
    pub fn spawn<T>(&self, future: impl Future<Output = T> + Send + 'static) -> Task<T>
    where
        T: Send + 'static,
    {
        self.executor.spawn(future)
    }

    /// Number of threads in this pool.
    pub fn thread_count(&self) -> usize {
        self.workers.len()
    }
}

fn drive_executor(executor: &Executor<'static>, stop: &AtomicBool) {
    while !stop.load(Ordering::Relaxed) {
        if !executor.try_tick() {
            thread::sleep(IDLE_WAIT);
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                tracing::error!("loader thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_and_collect() {
        let pool = WorkerPool::new(2);
        assert_eq!(pool.thread_count(), 2);

        let job = pool.spawn(async { 21 * 2 });
        let result = futures_lite::future::block_on(job);
        assert_eq!(result, 42);
    }

    #[test]
    fn test_is_finished_polling() {
        let pool = WorkerPool::new(1);
        let job = pool.spawn(async { "done" });

        while !job.is_finished() {
            std::thread::yield_now();
        }
        assert_eq!(futures_lite::future::block_on(job), "done");
    }

    #[test]
    #[should_panic(expected = "worker pool needs at least one thread")]
    fn test_zero_threads_panics() {
        WorkerPool::new(0);
    }
}
