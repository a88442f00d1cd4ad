//! A small fixed pool that runs generator calls off the simulation thread.
//!
//! The simulation thread submits a future and gets a [`JobHandle`] back
//! immediately. Each tick it calls [`JobHandle::poll`], which never blocks.
//! Concurrency is bounded by a semaphore sized to the worker count, so the
//! number of conversations has no effect on how many calls run at once.

use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::io;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::runtime::{Builder, Runtime};
use tokio::sync::{oneshot, Semaphore};
use tracing::{debug, error};

/// Result of a non-blocking check on a job.
#[derive(Debug)]
pub enum JobPoll<T> {
    Pending,
    Ready(T),
    /// The job panicked, or the pool shut down before it ran.
    Failed(String),
}

impl<T> JobPoll<T> {
    pub fn is_pending(&self) -> bool {
        matches!(self, JobPoll::Pending)
    }
}

/// Receiving end of a submitted job.
#[derive(Debug)]
pub struct JobHandle<T> {
    rx: oneshot::Receiver<Result<T, String>>,
}

impl<T> JobHandle<T> {
    pub fn poll(&mut self) -> JobPoll<T> {
        match self.rx.try_recv() {
            Ok(Ok(value)) => JobPoll::Ready(value),
            Ok(Err(message)) => JobPoll::Failed(message),
            Err(oneshot::error::TryRecvError::Empty) => JobPoll::Pending,
            Err(oneshot::error::TryRecvError::Closed) => {
                JobPoll::Failed("job dropped before completing".to_string())
            }
        }
    }
}

pub struct WorkerPool {
    runtime: Option<Runtime>,
    permits: Arc<Semaphore>,
    workers: usize,
}

impl WorkerPool {
    pub fn new(workers: usize) -> io::Result<Self> {
        let workers = workers.max(1);
        let runtime = Builder::new_multi_thread()
            .worker_threads(workers)
            .thread_name("townsfolk-worker")
            .enable_all()
            .build()?;
        debug!(workers, "worker pool started");
        Ok(Self {
            runtime: Some(runtime),
            permits: Arc::new(Semaphore::new(workers)),
            workers,
        })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Queue `job` and return at once.
    ///
    /// After [`shutdown`](Self::shutdown) the handle reports `Failed`.
    pub fn submit<F, T>(&self, job: F) -> JobHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let Some(runtime) = &self.runtime else {
            return JobHandle { rx };
        };

        let permits = self.permits.clone();
        runtime.spawn(async move {
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    let _ = tx.send(Err("worker pool closed".to_string()));
                    return;
                }
            };
            let result = AssertUnwindSafe(job)
                .catch_unwind()
                .await
                .map_err(|panic| {
                    let message = panic_message(panic.as_ref());
                    error!(%message, "job panicked");
                    message
                });
            // The receiver may be gone if its conversation already ended.
            let _ = tx.send(result);
        });
        JobHandle { rx }
    }

    /// Stop accepting work. Jobs still running are abandoned.
    pub fn shutdown(&mut self) {
        self.permits.close();
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
            debug!("worker pool stopped");
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "job panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    fn wait<T>(handle: &mut JobHandle<T>) -> JobPoll<T> {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let poll = handle.poll();
            if !poll.is_pending() || Instant::now() > deadline {
                return poll;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_submit_returns_before_completion() {
        let pool = WorkerPool::new(2).unwrap();
        let mut handle = pool.submit(async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            7
        });
        assert!(handle.poll().is_pending());
        assert!(matches!(wait(&mut handle), JobPoll::Ready(7)));
    }

    #[test]
    fn test_panic_becomes_failed() {
        let pool = WorkerPool::new(1).unwrap();
        let mut handle = pool.submit(async {
            if true {
                panic!("boom");
            }
            0
        });
        match wait(&mut handle) {
            JobPoll::Failed(message) => assert!(message.contains("boom")),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn test_concurrency_bounded_by_workers() {
        let pool = WorkerPool::new(2).unwrap();
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles: Vec<_> = (0..8)
            .map(|_| {
                let running = running.clone();
                let peak = peak.clone();
                pool.submit(async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for handle in &mut handles {
            assert!(matches!(wait(handle), JobPoll::Ready(())));
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn test_submit_after_shutdown_fails() {
        let mut pool = WorkerPool::new(1).unwrap();
        pool.shutdown();
        let mut handle = pool.submit(async { 1 });
        assert!(matches!(handle.poll(), JobPoll::Failed(_)));
    }
}
