//! Fixed-size worker pool over a FIFO task queue.
//!
//! `execute` wakes exactly one worker per task; `stop` broadcasts so every
//! worker observes the flag, drains what is left in the queue, and exits.
//! Tasks run outside the queue lock, and a panicking task is caught and
//! logged rather than taking its worker down.

use crate::errors::PoolError;

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

type Task = Box<dyn FnOnce() + Send + 'static>;

struct PoolState {
    queue: VecDeque<Task>,
    stopped: bool,
}

struct PoolShared {
    state: Mutex<PoolState>,
    not_empty: Condvar,
}

/// Bounded pool of worker threads consuming a shared FIFO queue.
pub struct WorkerPool {
    shared: Arc<PoolShared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Spawns `n_threads` workers, all parked on the empty queue.
    pub fn new(n_threads: usize) -> Self {
        let shared = Arc::new(PoolShared {
            state: Mutex::new(PoolState {
                queue: VecDeque::new(),
                stopped: false,
            }),
            not_empty: Condvar::new(),
        });

        let mut workers = Vec::with_capacity(n_threads);
        for worker_id in 0..n_threads {
            let shared = Arc::clone(&shared);
            workers.push(thread::spawn(move || worker_loop(worker_id, shared)));
        }

        log::info!("Worker pool started with {} threads", n_threads);
        WorkerPool {
            shared,
            workers: Mutex::new(workers),
        }
    }

    /// Enqueues a task and wakes one worker.
    pub fn execute<F>(&self, task: F) -> Result<(), PoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self
            .shared
            .state
            .lock()
            .map_err(|_| PoolError::LockPoisoned)?;
        if state.stopped {
            return Err(PoolError::Stopped);
        }
        state.queue.push_back(Box::new(task));
        // One task, one worker: waking everyone would just stampede the
        // queue lock.
        self.shared.not_empty.notify_one();
        Ok(())
    }

    /// Stops the pool: workers finish the queued tasks, then exit and are
    /// joined. Idempotent.
    pub fn stop(&self) {
        {
            let mut state = match self.shared.state.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if state.stopped {
                return;
            }
            state.stopped = true;
            // Every worker must see the flag, so broadcast.
            self.shared.not_empty.notify_all();
        }

        let handles: Vec<_> = match self.workers.lock() {
            Ok(mut guard) => guard.drain(..).collect(),
            Err(poisoned) => poisoned.into_inner().drain(..).collect(),
        };
        for handle in handles {
            let _ = handle.join();
        }
        log::info!("Worker pool stopped");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop(worker_id: usize, shared: Arc<PoolShared>) {
    log::debug!("Worker {} started", worker_id);
    loop {
        let task = {
            let mut state = match shared.state.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };

            while state.queue.is_empty() && !state.stopped {
                state = match shared.not_empty.wait(state) {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
            }

            match state.queue.pop_front() {
                Some(task) => task,
                // Queue drained and the pool is stopped: done.
                None => break,
            }
        };

        // Run outside the lock so other workers keep dequeuing.
        if catch_unwind(AssertUnwindSafe(move || task())).is_err() {
            log::error!("Worker {}: task panicked", worker_id);
        }
    }
    log::debug!("Worker {} exiting", worker_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_executes_tasks() {
        let pool = WorkerPool::new(4);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..100 {
            let counter = Arc::clone(&counter);
            pool.execute(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }

        pool.stop();
        assert_eq!(counter.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn test_stop_drains_queue() {
        // One worker so tasks pile up behind a slow first task.
        let pool = WorkerPool::new(1);
        let counter = Arc::new(AtomicUsize::new(0));

        {
            let counter = Arc::clone(&counter);
            pool.execute(move || {
                thread::sleep(Duration::from_millis(50));
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }
        for _ in 0..10 {
            let counter = Arc::clone(&counter);
            pool.execute(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }

        pool.stop();
        assert_eq!(counter.load(Ordering::SeqCst), 11);
    }

    #[test]
    fn test_execute_after_stop_fails() {
        let pool = WorkerPool::new(2);
        pool.stop();
        let result = pool.execute(|| {});
        assert!(matches!(result, Err(PoolError::Stopped)));
    }

    #[test]
    fn test_panicking_task_does_not_kill_worker() {
        let pool = WorkerPool::new(1);
        let counter = Arc::new(AtomicUsize::new(0));

        pool.execute(|| panic!("boom")).unwrap();
        {
            let counter = Arc::clone(&counter);
            pool.execute(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }

        pool.stop();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_tasks_run_in_submission_order_single_worker() {
        let pool = WorkerPool::new(1);
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..10 {
            let order = Arc::clone(&order);
            pool.execute(move || {
                order.lock().unwrap().push(i);
            })
            .unwrap();
        }

        pool.stop();
        assert_eq!(*order.lock().unwrap(), (0..10).collect::<Vec<_>>());
    }
}
