//! Fixed-size worker pool
//!
//! `size` named threads pull jobs from one unbounded run queue, so at most
//! `size` jobs execute at once and the rest wait their turn. A panicking job
//! is caught and logged; its worker keeps serving the queue.

use crossbeam_channel::{unbounded, Receiver, Sender};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::Error;

/// Unit of work run by the pool
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// How often shutdown checks whether workers have exited
const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Default)]
struct PoolCounters {
    queued: AtomicUsize,
    running: AtomicUsize,
    panicked: AtomicUsize,
}

/// Bounded-parallelism executor with an unbounded run queue
pub struct WorkerPool {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    counters: Arc<PoolCounters>,
}

impl WorkerPool {
    /// Spawn `size` workers named `{name}-{index}`
    pub fn new(size: usize, name: &str) -> Result<Self, Error> {
        let (sender, receiver) = unbounded::<Job>();
        let counters = Arc::new(PoolCounters::default());

        let workers = (0..size.max(1))
            .map(|index| {
                let receiver = receiver.clone();
                let counters = counters.clone();
                thread::Builder::new()
                    .name(format!("{}-{}", name, index))
                    .spawn(move || worker_loop(receiver, counters))
                    .map_err(Error::Io)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            sender: Some(sender),
            workers,
            counters,
        })
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Queue a job; hands it back if the pool has been shut down
    pub fn submit(&self, job: Job) -> Result<(), Job> {
        let Some(sender) = self.sender.as_ref() else {
            return Err(job);
        };
        self.counters.queued.fetch_add(1, Ordering::SeqCst);
        sender.send(job).map_err(|e| {
            self.counters.queued.fetch_sub(1, Ordering::SeqCst);
            e.into_inner()
        })
    }

    /// Jobs waiting for a worker
    pub fn queued(&self) -> usize {
        self.counters.queued.load(Ordering::SeqCst)
    }

    /// Jobs currently executing
    pub fn running(&self) -> usize {
        self.counters.running.load(Ordering::SeqCst)
    }

    /// Jobs that panicked so far
    pub fn panicked(&self) -> usize {
        self.counters.panicked.load(Ordering::SeqCst)
    }

    /// Close the run queue and wait up to `grace` for workers to drain it.
    ///
    /// Returns the number of workers still busy at the deadline; those are
    /// detached and finish in the background.
    pub fn shutdown(&mut self, grace: Duration) -> usize {
        self.sender.take();
        let deadline = Instant::now() + grace;

        loop {
            let (finished, busy): (Vec<_>, Vec<_>) =
                self.workers.drain(..).partition(|w| w.is_finished());
            for worker in finished {
                let _ = worker.join();
            }
            self.workers = busy;

            if self.workers.is_empty() || Instant::now() >= deadline {
                break;
            }
            thread::sleep(JOIN_POLL_INTERVAL);
        }

        let unjoined = self.workers.len();
        self.workers.clear();
        unjoined
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Fire and forget: close the queue without waiting on workers
        self.sender.take();
    }
}

fn worker_loop(receiver: Receiver<Job>, counters: Arc<PoolCounters>) {
    for job in receiver.iter() {
        counters.queued.fetch_sub(1, Ordering::SeqCst);
        counters.running.fetch_add(1, Ordering::SeqCst);

        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
            counters.panicked.fetch_add(1, Ordering::SeqCst);
            tracing::error!(
                "Task panicked on {}",
                thread::current().name().unwrap_or("worker")
            );
        }

        counters.running.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;

    #[test]
    fn test_parallelism_is_bounded() {
        let mut pool = WorkerPool::new(3, "test-pool").unwrap();
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (done_tx, done_rx) = bounded::<()>(20);

        for _ in 0..20 {
            let active = active.clone();
            let peak = peak.clone();
            let done_tx = done_tx.clone();
            pool.submit(Box::new(move || {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(5));
                active.fetch_sub(1, Ordering::SeqCst);
                done_tx.send(()).unwrap();
            }))
            .unwrap_or_else(|_| panic!("pool closed"));
        }

        for _ in 0..20 {
            done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(pool.shutdown(Duration::from_secs(5)), 0);
    }

    #[test]
    fn test_excess_jobs_wait_in_queue() {
        let mut pool = WorkerPool::new(1, "queue-pool").unwrap();
        let (release_tx, release_rx) = bounded::<()>(0);
        let (started_tx, started_rx) = bounded::<()>(1);

        pool.submit(Box::new(move || {
            started_tx.send(()).unwrap();
            let _ = release_rx.recv();
        }))
        .unwrap_or_else(|_| panic!("pool closed"));
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        for _ in 0..4 {
            pool.submit(Box::new(|| {}))
                .unwrap_or_else(|_| panic!("pool closed"));
        }
        assert_eq!(pool.running(), 1);
        assert_eq!(pool.queued(), 4);

        drop(release_tx);
        assert_eq!(pool.shutdown(Duration::from_secs(5)), 0);
        assert_eq!(pool.queued(), 0);
    }

    #[test]
    fn test_panicking_job_does_not_kill_worker() {
        let mut pool = WorkerPool::new(1, "panic-pool").unwrap();
        let (done_tx, done_rx) = bounded::<()>(1);

        pool.submit(Box::new(|| panic!("bad tone")))
            .unwrap_or_else(|_| panic!("pool closed"));
        pool.submit(Box::new(move || done_tx.send(()).unwrap()))
            .unwrap_or_else(|_| panic!("pool closed"));

        done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(pool.panicked(), 1);
        assert_eq!(pool.shutdown(Duration::from_secs(5)), 0);
    }

    #[test]
    fn test_submit_after_shutdown_is_rejected() {
        let mut pool = WorkerPool::new(2, "closed-pool").unwrap();
        pool.shutdown(Duration::from_secs(1));
        assert!(pool.submit(Box::new(|| {})).is_err());
    }

    #[test]
    fn test_shutdown_reports_busy_workers() {
        let mut pool = WorkerPool::new(1, "busy-pool").unwrap();
        let (release_tx, release_rx) = bounded::<()>(0);
        let (started_tx, started_rx) = bounded::<()>(1);
        pool.submit(Box::new(move || {
            started_tx.send(()).unwrap();
            let _ = release_rx.recv();
        }))
        .unwrap_or_else(|_| panic!("pool closed"));
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        assert_eq!(pool.shutdown(Duration::from_millis(20)), 1);
        drop(release_tx);
    }
}
