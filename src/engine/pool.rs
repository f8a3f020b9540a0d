//! Bounded work-stealing worker pool.
//!
//! Trials are grouped into contiguous index chunks and pushed onto a global
//! injector. A fixed number of scoped worker threads pull batches from the
//! injector into their local deque and steal from each other when idle, so
//! long-running chunks do not leave threads waiting on a straggler.
//!
//! Results are returned in task-index order regardless of which worker ran
//! which chunk.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use crossbeam_deque::{Injector, Steal, Stealer, Worker};

/// Default number of consecutive trials handed to a worker at once.
pub const DEFAULT_CHUNK_SIZE: usize = 256;

/// A contiguous range of task indices `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskChunk {
    /// First index in the chunk.
    pub start: usize,
    /// One past the last index.
    pub end: usize,
}

/// Outcome of a pool execution.
#[derive(Debug)]
pub struct PoolRun<R> {
    /// One slot per task index; `None` when the task never ran.
    pub results: Vec<Option<R>>,
    /// Whether the deadline stopped execution early.
    pub deadline_hit: bool,
}

impl<R> PoolRun<R> {
    /// Number of tasks that actually ran.
    #[must_use]
    pub fn executed(&self) -> usize {
        self.results.iter().filter(|r| r.is_some()).count()
    }
}

/// Work-stealing pool with a fixed worker count.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    num_workers: usize,
    chunk_size: usize,
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerPool {
    /// Create with default number of workers (number of CPUs).
    #[must_use]
    pub fn new() -> Self {
        Self::with_workers(
            std::thread::available_parallelism()
                .map(std::num::NonZeroUsize::get)
                .unwrap_or(4),
        )
    }

    /// Create with specified number of workers (at least one).
    #[must_use]
    pub fn with_workers(num_workers: usize) -> Self {
        Self {
            num_workers: num_workers.max(1),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Set the chunk size (at least one).
    #[must_use]
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Get number of workers.
    #[must_use]
    pub const fn num_workers(&self) -> usize {
        self.num_workers
    }

    /// Get the chunk size.
    #[must_use]
    pub const fn get_chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Split `n_tasks` indices into chunks.
    #[must_use]
    pub fn chunks(&self, n_tasks: usize) -> Vec<TaskChunk> {
        (0..n_tasks)
            .step_by(self.chunk_size)
            .map(|start| TaskChunk {
                start,
                end: (start + self.chunk_size).min(n_tasks),
            })
            .collect()
    }

    /// Run `task(i)` for every `i` in `0..n_tasks`.
    ///
    /// The deadline is checked before every task. Once it passes, workers
    /// stop picking up work and the remaining slots stay `None`.
    pub fn execute<F, R>(&self, n_tasks: usize, deadline: Option<Instant>, task: F) -> PoolRun<R>
    where
        F: Fn(usize) -> R + Sync,
        R: Send,
    {
        let chunks = self.chunks(n_tasks);
        let n_workers = self.num_workers.min(chunks.len()).max(1);

        let injector: Injector<TaskChunk> = Injector::new();
        for chunk in chunks {
            injector.push(chunk);
        }

        let workers: Vec<Worker<TaskChunk>> = (0..n_workers).map(|_| Worker::new_fifo()).collect();
        let stealers: Vec<Stealer<TaskChunk>> = workers.iter().map(Worker::stealer).collect();

        let cancelled = AtomicBool::new(false);
        let collected: Mutex<Vec<(usize, R)>> = Mutex::new(Vec::with_capacity(n_tasks));

        std::thread::scope(|s| {
            for (worker_id, worker) in workers.into_iter().enumerate() {
                let injector = &injector;
                let stealers = &stealers;
                let cancelled = &cancelled;
                let collected = &collected;
                let task = &task;

                s.spawn(move || {
                    while let Some(chunk) = find_chunk(worker_id, &worker, injector, stealers) {
                        let mut local = Vec::with_capacity(chunk.end - chunk.start);
                        for index in chunk.start..chunk.end {
                            if cancelled.load(Ordering::Relaxed) {
                                break;
                            }
                            if deadline.is_some_and(|d| Instant::now() >= d) {
                                cancelled.store(true, Ordering::Relaxed);
                                break;
                            }
                            local.push((index, task(index)));
                        }
                        if let Ok(mut guard) = collected.lock() {
                            guard.extend(local);
                        }
                        if cancelled.load(Ordering::Relaxed) {
                            break;
                        }
                    }
                });
            }
        });

        let mut results: Vec<Option<R>> = (0..n_tasks).map(|_| None).collect();
        let collected = collected
            .into_inner()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        for (index, result) in collected {
            results[index] = Some(result);
        }

        PoolRun {
            results,
            deadline_hit: cancelled.into_inner(),
        }
    }
}

/// Pop local work, then refill from the injector, then steal round-robin.
fn find_chunk(
    worker_id: usize,
    local: &Worker<TaskChunk>,
    injector: &Injector<TaskChunk>,
    stealers: &[Stealer<TaskChunk>],
) -> Option<TaskChunk> {
    if let Some(chunk) = local.pop() {
        return Some(chunk);
    }

    loop {
        match injector.steal_batch_and_pop(local) {
            Steal::Success(chunk) => return Some(chunk),
            Steal::Empty => break,
            Steal::Retry => {}
        }
    }

    for i in 0..stealers.len() {
        let victim = (worker_id + i + 1) % stealers.len();
        if victim == worker_id {
            continue;
        }
        loop {
            match stealers[victim].steal() {
                Steal::Success(chunk) => return Some(chunk),
                Steal::Empty => break,
                Steal::Retry => {}
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_pool_basic_ordering() {
        let pool = WorkerPool::with_workers(4).chunk_size(7);

        let run = pool.execute(100, None, |i| i * 2);

        assert!(!run.deadline_hit);
        assert_eq!(run.results.len(), 100);
        assert_eq!(run.executed(), 100);
        for (i, r) in run.results.iter().enumerate() {
            assert_eq!(*r, Some(i * 2));
        }
    }

    #[test]
    fn test_pool_zero_tasks() {
        let pool = WorkerPool::with_workers(4);
        let run: PoolRun<usize> = pool.execute(0, None, |i| i);
        assert!(run.results.is_empty());
        assert!(!run.deadline_hit);
    }

    #[test]
    fn test_pool_variable_duration() {
        let pool = WorkerPool::with_workers(4).chunk_size(1);

        let run = pool.execute(50, None, |index| {
            let iterations = if index % 10 == 0 { 10_000u64 } else { 100 };
            (0..iterations).fold(0u64, u64::wrapping_add)
        });

        assert_eq!(run.executed(), 50);
    }

    #[test]
    fn test_pool_deadline_already_passed() {
        let pool = WorkerPool::with_workers(2);
        let deadline = Instant::now();

        let run = pool.execute(1000, Some(deadline), |i| i);

        assert!(run.deadline_hit);
        assert_eq!(run.executed(), 0);
        assert_eq!(run.results.len(), 1000);
    }

    #[test]
    fn test_pool_deadline_stops_midway() {
        let pool = WorkerPool::with_workers(1).chunk_size(10);
        let deadline = Instant::now() + Duration::from_millis(30);

        let run = pool.execute(200, Some(deadline), |i| {
            std::thread::sleep(Duration::from_millis(1));
            i
        });

        assert!(run.deadline_hit);
        assert!(run.executed() > 0);
        assert!(run.executed() < 200);
    }

    #[test]
    fn test_chunks_cover_range() {
        let pool = WorkerPool::with_workers(3).chunk_size(4);
        let chunks = pool.chunks(10);
        assert_eq!(
            chunks,
            vec![
                TaskChunk { start: 0, end: 4 },
                TaskChunk { start: 4, end: 8 },
                TaskChunk { start: 8, end: 10 },
            ]
        );
    }

    #[test]
    fn test_num_workers_floor() {
        assert!(WorkerPool::new().num_workers() > 0);
        assert_eq!(WorkerPool::with_workers(0).num_workers(), 1);
        assert_eq!(WorkerPool::with_workers(8).num_workers(), 8);
        assert_eq!(WorkerPool::with_workers(2).chunk_size(0).get_chunk_size(), 1);
    }
}
