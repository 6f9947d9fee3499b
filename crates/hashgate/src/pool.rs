//! Bounded worker pool for protected tasks.
//!
//! A fixed-size rayon pool runs the jobs, so at most `workers` tasks execute
//! at once no matter how many are submitted. Excess submissions wait in
//! rayon's queue. Tasks never run on the async runtime.

use std::any::Any;
use std::future::Future;
use std::num::NonZeroUsize;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::task::{ProtectedTask, TaskFailure};

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("Failed to build worker pool: {0}")]
    Build(#[from] rayon::ThreadPoolBuildError),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    #[error("Task failed: {0}")]
    Failed(String),
    #[error("Task panicked: {0}")]
    Panicked(String),
    /// The pool shut down before the task ran.
    #[error("Worker pool shut down before the task completed")]
    Interrupted,
}

/// Handle to a submitted task. Resolves once a worker has run it.
#[must_use = "a TaskHandle does nothing unless awaited"]
pub struct TaskHandle<O> {
    rx: oneshot::Receiver<Result<O, TaskError>>,
}

impl<O> Future for TaskHandle<O> {
    type Output = Result<O, TaskError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // A dropped sender means the job was discarded without running.
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(TaskError::Interrupted)))
    }
}

#[derive(Default)]
struct PoolStats {
    queued: AtomicUsize,
    running: AtomicUsize,
    stopping: AtomicBool,
}

/// Executes a [`ProtectedTask`] on a fixed number of worker threads.
///
/// Dropping the pool does not wait for running tasks: rayon lets its threads
/// finish the job in hand and exit on their own.
pub struct WorkerPool<T: ProtectedTask> {
    task: Arc<T>,
    threads: rayon::ThreadPool,
    stats: Arc<PoolStats>,
}

impl<T: ProtectedTask> WorkerPool<T> {
    /// Start `workers` threads running `task`.
    pub fn new(task: T, workers: NonZeroUsize) -> Result<Self, PoolError> {
        let threads = rayon::ThreadPoolBuilder::new()
            .num_threads(workers.get())
            .thread_name(|i| format!("hashgate-worker-{}", i))
            .build()?;

        tracing::debug!(workers = workers.get(), task = task.name(), "Worker pool started");

        Ok(Self {
            task: Arc::new(task),
            threads,
            stats: Arc::new(PoolStats::default()),
        })
    }

    pub fn task(&self) -> &T {
        &self.task
    }

    /// Queue `task.run(input)`. Returns immediately.
    pub fn submit(&self, input: T::Input) -> TaskHandle<T::Output> {
        let task = Arc::clone(&self.task);
        self.execute(move || task.run(&input))
    }

    /// Queue `task.verify(output, input)`.
    pub fn verify(&self, output: T::Output, input: T::Input) -> TaskHandle<bool> {
        let task = Arc::clone(&self.task);
        self.execute(move || task.verify(&output, &input))
    }

    fn execute<R, F>(&self, f: F) -> TaskHandle<R>
    where
        R: Send + 'static,
        F: FnOnce() -> Result<R, TaskFailure> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let handle = TaskHandle { rx };

        if self.stats.stopping.load(Ordering::Acquire) {
            tracing::warn!("Worker pool shutting down, discarding task");
            return handle;
        }

        let stats = Arc::clone(&self.stats);
        stats.queued.fetch_add(1, Ordering::AcqRel);
        self.threads.spawn_fifo(move || {
            stats.queued.fetch_sub(1, Ordering::AcqRel);
            if stats.stopping.load(Ordering::Acquire) {
                // Dropping `tx` resolves the handle as interrupted.
                return;
            }

            stats.running.fetch_add(1, Ordering::AcqRel);
            let result = match catch_unwind(AssertUnwindSafe(f)) {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(failure)) => Err(TaskError::Failed(failure.to_string())),
                Err(panic) => Err(TaskError::Panicked(panic_message(panic.as_ref()))),
            };
            stats.running.fetch_sub(1, Ordering::AcqRel);
            // Receiver gone means the submitter stopped waiting; nothing to do.
            let _ = tx.send(result);
        });

        handle
    }

    /// Stop accepting work. Queued jobs are discarded (their handles resolve
    /// with [`TaskError::Interrupted`]); running jobs finish normally.
    pub fn shutdown(&self) {
        if !self.stats.stopping.swap(true, Ordering::AcqRel) {
            tracing::debug!(queued = self.queued(), "Worker pool shutting down");
        }
    }

    pub fn workers(&self) -> usize {
        self.threads.current_num_threads()
    }

    /// Tasks executing right now.
    pub fn running(&self) -> usize {
        self.stats.running.load(Ordering::Acquire)
    }

    /// Tasks submitted but not yet picked up by a worker.
    pub fn queued(&self) -> usize {
        self.stats.queued.load(Ordering::Acquire)
    }
}

impl<T: ProtectedTask> Drop for WorkerPool<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Condvar, Mutex};
    use std::time::Duration;

    /// Doubles its input; fails on 13; panics on 99.
    #[derive(Default)]
    struct Doubler {
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    impl ProtectedTask for Doubler {
        type Input = u32;
        type Output = u32;

        fn name(&self) -> &'static str {
            "doubler"
        }

        fn run(&self, input: &u32) -> Result<u32, TaskFailure> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(5));
            self.running.fetch_sub(1, Ordering::SeqCst);
            match *input {
                13 => Err(TaskFailure::new("unlucky")),
                99 => panic!("boom"),
                n => Ok(n * 2),
            }
        }

        fn verify(&self, output: &u32, input: &u32) -> Result<bool, TaskFailure> {
            Ok(*output == input * 2)
        }
    }

    #[derive(Default)]
    struct Gate {
        open: Mutex<bool>,
        opened: Condvar,
    }

    impl Gate {
        fn open(&self) {
            *self.open.lock().unwrap() = true;
            self.opened.notify_all();
        }
    }

    /// Blocks every run until the gate opens.
    #[derive(Default)]
    struct Gated {
        gate: Arc<Gate>,
    }

    impl ProtectedTask for Gated {
        type Input = u32;
        type Output = u32;

        fn name(&self) -> &'static str {
            "gated"
        }

        fn run(&self, input: &u32) -> Result<u32, TaskFailure> {
            let mut open = self.gate.open.lock().unwrap();
            while !*open {
                open = self.gate.opened.wait(open).unwrap();
            }
            Ok(*input)
        }

        fn verify(&self, _output: &u32, _input: &u32) -> Result<bool, TaskFailure> {
            Ok(true)
        }
    }

    fn pool<T: ProtectedTask>(task: T, workers: usize) -> WorkerPool<T> {
        WorkerPool::new(task, NonZeroUsize::new(workers).unwrap()).unwrap()
    }

    async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {what}"));
    }

    #[tokio::test]
    async fn submit_returns_result() {
        let pool = pool(Doubler::default(), 2);
        assert_eq!(pool.workers(), 2);
        assert_eq!(pool.submit(21).await, Ok(42));
        assert_eq!(pool.verify(42, 21).await, Ok(true));
        assert_eq!(pool.verify(41, 21).await, Ok(false));
    }

    #[tokio::test]
    async fn task_failure_propagates_through_handle() {
        let pool = pool(Doubler::default(), 1);
        assert_eq!(
            pool.submit(13).await,
            Err(TaskError::Failed("unlucky".to_string()))
        );
        // Pool keeps working.
        assert_eq!(pool.submit(1).await, Ok(2));
    }

    #[tokio::test]
    async fn panicking_task_does_not_kill_worker() {
        let pool = pool(Doubler::default(), 1);
        assert_eq!(
            pool.submit(99).await,
            Err(TaskError::Panicked("boom".to_string()))
        );
        assert_eq!(pool.submit(2).await, Ok(4));
        assert_eq!(pool.running(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn executions_never_exceed_worker_count() {
        let pool = pool(Doubler::default(), 3);

        let handles: Vec<_> = (0..30).map(|n| pool.submit(n + 100)).collect();
        for (n, handle) in (0u32..).zip(handles) {
            assert_eq!(handle.await, Ok((n + 100) * 2));
        }

        assert!(pool.task().peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(pool.queued(), 0);
        assert_eq!(pool.running(), 0);
    }

    #[tokio::test]
    async fn excess_submissions_queue() {
        let pool = pool(Gated::default(), 1);

        let first = pool.submit(1);
        let second = pool.submit(2);

        wait_until("first task to start", || pool.running() == 1).await;
        assert_eq!(pool.queued(), 1);

        pool.task().gate.open();
        assert_eq!(first.await, Ok(1));
        assert_eq!(second.await, Ok(2));
    }

    #[tokio::test]
    async fn shutdown_interrupts_queued_tasks() {
        let pool = pool(Gated::default(), 1);

        let running = pool.submit(1);
        let queued = pool.submit(2);
        wait_until("first task to start", || pool.running() == 1).await;

        pool.shutdown();
        assert_eq!(pool.submit(3).await, Err(TaskError::Interrupted));

        pool.task().gate.open();
        assert_eq!(running.await, Ok(1));
        assert_eq!(queued.await, Err(TaskError::Interrupted));
        wait_until("queue to drain", || pool.queued() == 0).await;
    }

    #[tokio::test]
    async fn drop_does_not_wait_for_running_tasks() {
        let pool = pool(Gated::default(), 1);
        let gate = Arc::clone(&pool.task().gate);

        let running = pool.submit(1);
        let queued = pool.submit(2);
        wait_until("first task to start", || pool.running() == 1).await;

        let dropper = std::thread::spawn(move || drop(pool));
        wait_until("pool drop to return", || dropper.is_finished()).await;

        gate.open();
        assert_eq!(running.await, Ok(1));
        assert_eq!(queued.await, Err(TaskError::Interrupted));
    }

    #[test]
    fn worker_threads_are_named() {
        let pool = pool(Doubler::default(), 1);
        let name = pool
            .threads
            .install(|| std::thread::current().name().map(str::to_string));
        assert_eq!(name.as_deref(), Some("hashgate-worker-0"));
    }
}
