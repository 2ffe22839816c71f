//! Fixed-size worker pool (spec §4.4) used only to free large unlinked
//! subgraphs off the request-handling thread. Workers never touch the live
//! keyspace: by the time a job is queued, the data it frees has already been
//! fully detached from every index, so there is nothing left to synchronize
//! with the single-threaded event loop.
//!
//! Grounded in the Mutex-guarded shared-state pattern used by the test
//! client's connection pool, adapted from an object pool to a FIFO job
//! queue with a condvar instead of busy-polling.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

type Job = Box<dyn FnOnce() + Send + 'static>;

struct Shared {
    queue: Mutex<VecDeque<Job>>,
    queue_not_empty: Condvar,
    shutting_down: Mutex<bool>,
}

/// A pool of worker threads draining a shared FIFO job queue.
pub struct ThreadPool {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl ThreadPool {
    /// Spawns `worker_count` threads (minimum 1).
    pub fn new(worker_count: usize) -> Self {
        let worker_count = worker_count.max(1);
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            queue_not_empty: Condvar::new(),
            shutting_down: Mutex::new(false),
        });

        let workers = (0..worker_count)
            .map(|_| {
                let shared = shared.clone();
                thread::spawn(move || worker_loop(shared))
            })
            .collect();

        ThreadPool { shared, workers }
    }

    /// Queues `job` to run on a worker thread.
    pub fn submit(&self, job: impl FnOnce() + Send + 'static) {
        let mut queue = self.shared.queue.lock().expect("thread pool queue poisoned");
        queue.push_back(Box::new(job));
        self.shared.queue_not_empty.notify_one();
    }

    /// Number of worker threads.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        *self.shared.shutting_down.lock().expect("thread pool flag poisoned") = true;
        self.shared.queue_not_empty.notify_all();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

fn worker_loop(shared: Arc<Shared>) {
    loop {
        let job = {
            let mut queue = shared.queue.lock().expect("thread pool queue poisoned");
            loop {
                if let Some(job) = queue.pop_front() {
                    break Some(job);
                }
                if *shared.shutting_down.lock().expect("thread pool flag poisoned") {
                    break None;
                }
                queue = shared
                    .queue_not_empty
                    .wait(queue)
                    .expect("thread pool condvar poisoned");
            }
        };

        match job {
            Some(job) => job(),
            None => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn runs_submitted_jobs() {
        let pool = ThreadPool::new(4);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..100 {
            let counter = counter.clone();
            pool.submit(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        drop(pool); // joins workers, draining the queue first.
        assert_eq!(counter.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn jobs_run_off_the_submitting_thread() {
        let pool = ThreadPool::new(2);
        let (tx, rx) = mpsc::channel();
        let submitter = thread::current().id();
        pool.submit(move || {
            tx.send(thread::current().id()).unwrap();
        });
        let worker_id = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_ne!(worker_id, submitter);
    }

    #[test]
    fn worker_count_matches_request() {
        let pool = ThreadPool::new(3);
        assert_eq!(pool.worker_count(), 3);
    }

    #[test]
    fn zero_requested_workers_clamps_to_one() {
        let pool = ThreadPool::new(0);
        assert_eq!(pool.worker_count(), 1);
    }
}
