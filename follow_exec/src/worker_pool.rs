//! # Worker pool
//!
//! A fixed set of worker threads that execute jobs posted from anywhere in the executable. Control
//! ticks, sensor arrivals and the deferred handlers of the service and action clients all run
//! here, so none of them may assume they run alone.

// -----------------------------------------------------------------------------------------------
// INCLUDES
// -----------------------------------------------------------------------------------------------

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use log::{debug, error};
use std::{
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

// -----------------------------------------------------------------------------------------------
// CONSTANTS
// -----------------------------------------------------------------------------------------------

/// How often an idle worker checks whether the pool is stopping.
const IDLE_POLL_PERIOD: Duration = Duration::from_millis(20);

// -----------------------------------------------------------------------------------------------
// STRUCTS
// -----------------------------------------------------------------------------------------------

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Owner of the worker threads.
pub struct WorkerPool {
    handle: PoolHandle,
    workers: Vec<JoinHandle<()>>,
}

/// Cloneable handle used to post jobs to a [`WorkerPool`].
#[derive(Clone)]
pub struct PoolHandle {
    sender: Sender<Job>,
    run: Arc<AtomicBool>,
}

// -----------------------------------------------------------------------------------------------
// ENUMS
// -----------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum WorkerPoolError {
    #[error("A worker pool needs at least one worker")]
    NoWorkers,

    #[error("Could not spawn worker thread: {0}")]
    SpawnError(std::io::Error),

    #[error("The worker pool has been stopped")]
    Stopped,
}

// -----------------------------------------------------------------------------------------------
// IMPLS
// -----------------------------------------------------------------------------------------------

impl WorkerPool {
    /// Start a pool with the given number of workers.
    pub fn new(num_workers: usize) -> Result<Self, WorkerPoolError> {
        if num_workers == 0 {
            return Err(WorkerPoolError::NoWorkers);
        }

        let (sender, receiver) = crossbeam_channel::unbounded::<Job>();
        let run = Arc::new(AtomicBool::new(true));

        let mut workers = Vec::with_capacity(num_workers);
        for i in 0..num_workers {
            let receiver = receiver.clone();
            let run = run.clone();

            let jh = thread::Builder::new()
                .name(format!("worker_{}", i))
                .spawn(move || worker_thread(receiver, run))
                .map_err(WorkerPoolError::SpawnError)?;

            workers.push(jh);
        }

        debug!("WorkerPool started with {} workers", num_workers);

        Ok(Self {
            handle: PoolHandle { sender, run },
            workers,
        })
    }

    /// Start a pool with one worker per hardware thread.
    pub fn with_hardware_parallelism() -> Result<Self, WorkerPoolError> {
        Self::new(hardware_parallelism())
    }

    /// Get a handle which can post jobs to this pool.
    pub fn handle(&self) -> PoolHandle {
        self.handle.clone()
    }

    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    /// Stop accepting jobs, finish the queued ones and join the workers.
    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        self.handle.run.store(false, Ordering::Relaxed);

        for jh in self.workers.drain(..) {
            if jh.join().is_err() {
                error!("A worker thread panicked");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

impl PoolHandle {
    /// Post a job to the pool. It will run on the first free worker.
    pub fn spawn<F>(&self, job: F) -> Result<(), WorkerPoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        if !self.run.load(Ordering::Relaxed) {
            return Err(WorkerPoolError::Stopped);
        }

        self.sender
            .send(Box::new(job))
            .map_err(|_| WorkerPoolError::Stopped)
    }
}

// -----------------------------------------------------------------------------------------------
// FUNCTIONS
// -----------------------------------------------------------------------------------------------

/// Number of hardware threads available to the process, at least 1.
pub fn hardware_parallelism() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn worker_thread(receiver: Receiver<Job>, run: Arc<AtomicBool>) {
    loop {
        match receiver.recv_timeout(IDLE_POLL_PERIOD) {
            Ok(job) => {
                // A panicking job must not take the worker down with it
                if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                    error!("Job panicked on {:?}", thread::current().name());
                }
            }
            // Only leave once the queue is empty
            Err(RecvTimeoutError::Timeout) => {
                if !run.load(Ordering::Relaxed) {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_jobs_run_and_drain_on_shutdown() {
        let pool = WorkerPool::new(3).unwrap();
        let handle = pool.handle();
        let count = Arc::new(AtomicUsize::new(0));

        for _ in 0..100 {
            let count = count.clone();
            handle
                .spawn(move || {
                    count.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }

        pool.shutdown();

        assert_eq!(count.load(Ordering::SeqCst), 100);
        assert!(matches!(
            handle.spawn(|| ()),
            Err(WorkerPoolError::Stopped)
        ));
    }

    #[test]
    fn test_jobs_run_concurrently() {
        let pool = WorkerPool::new(2).unwrap();
        let handle = pool.handle();
        let (tx, rx) = crossbeam_channel::bounded(0);

        // The first job blocks until the second one has run, which can only
        // happen on another worker
        let rx_clone = rx.clone();
        handle
            .spawn(move || {
                rx_clone.recv_timeout(Duration::from_secs(5)).unwrap();
            })
            .unwrap();
        handle
            .spawn(move || {
                tx.send(()).unwrap();
            })
            .unwrap();

        pool.shutdown();
    }

    #[test]
    fn test_panicking_job_keeps_worker() {
        let pool = WorkerPool::new(1).unwrap();
        let handle = pool.handle();
        let count = Arc::new(AtomicUsize::new(0));

        handle.spawn(|| panic!("job failure")).unwrap();
        let count_clone = count.clone();
        handle
            .spawn(move || {
                count_clone.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        pool.shutdown();

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_no_workers() {
        assert!(matches!(WorkerPool::new(0), Err(WorkerPoolError::NoWorkers)));
        assert!(hardware_parallelism() >= 1);
    }
}
