use super::panic_handler::PanicHandler;
use super::task::Task;
use super::worker::Worker;
use super::{ExecutionContext, Executor};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::memory::Allocator;
use crate::telemetry::{Metrics, MetricsSnapshot};
use crossbeam_deque::{Injector, Stealer};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle};

/// State shared between the pool, its executors and its workers.
pub(crate) struct PoolShared {
    pub(crate) injector: Injector<Task>,
    pub(crate) stealers: Vec<Stealer<Task>>,
    pub(crate) shutdown: AtomicBool,
    pub(crate) metrics: Metrics,
    panic_handler: PanicHandler,
    // queued tasks, bounded by `capacity`
    queued: AtomicUsize,
    capacity: Option<usize>,
    // queued tasks plus live work guards
    outstanding: AtomicUsize,
    idle_lock: Mutex<()>,
    idle_cv: Condvar,
    threads: OnceLock<Vec<thread::Thread>>,
    next_wake: AtomicUsize,
}

impl PoolShared {
    fn submit(&self, task: Task) -> Result<()> {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(Error::Shutdown);
        }

        let queued = self.queued.fetch_add(1, Ordering::AcqRel);
        if let Some(capacity) = self.capacity {
            if queued >= capacity {
                self.queued.fetch_sub(1, Ordering::AcqRel);
                self.metrics.record_task_rejected();
                tracing::warn!(task = ?task.id, capacity, "thread pool queue full, rejecting task");
                return Err(Error::QueueFull { capacity });
            }
        }

        self.outstanding.fetch_add(1, Ordering::AcqRel);
        self.metrics.record_task_deferred();
        self.injector.push(task);
        self.wake_one();

        Ok(())
    }

    fn wake_one(&self) {
        if let Some(threads) = self.threads.get() {
            let idx = self.next_wake.fetch_add(1, Ordering::Relaxed) % threads.len();
            threads[idx].unpark();
        }
    }

    fn wake_all(&self) {
        if let Some(threads) = self.threads.get() {
            for t in threads {
                t.unpark();
            }
        }
    }

    pub(crate) fn run_task(&self, task: Task) {
        let latency_ns = task.spawn_time.elapsed().as_nanos() as u64;
        if self.panic_handler.run(task).is_err() {
            self.metrics.record_task_panic();
        }

        self.metrics.record_task_execution(latency_ns);
        self.queued.fetch_sub(1, Ordering::AcqRel);
        self.work_finished();
    }

    fn work_started(&self) {
        self.outstanding.fetch_add(1, Ordering::AcqRel);
    }

    fn work_finished(&self) {
        if self.outstanding.fetch_sub(1, Ordering::AcqRel) == 1 {
            let _guard = self.idle_lock.lock();
            self.idle_cv.notify_all();
        }
    }
}

/// Fixed-size pool of work-stealing worker threads.
///
/// Dropping the pool stops it without running queued work; call
/// [`ThreadPool::join`] first to wait for outstanding work.
pub struct ThreadPool {
    shared: Arc<PoolShared>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    num_threads: usize,
}

impl ThreadPool {
    pub fn new(config: &Config) -> Result<Self> {
        config.validate()?;
        let num_threads = config.worker_threads();

        let workers: Vec<Worker> = (0..num_threads).map(Worker::new).collect();
        let stealers = workers.iter().map(|w| w.local_queue.stealer()).collect();

        let shared = Arc::new(PoolShared {
            injector: Injector::new(),
            stealers,
            shutdown: AtomicBool::new(false),
            metrics: Metrics::new(),
            panic_handler: PanicHandler::new(config.panic_strategy),
            queued: AtomicUsize::new(0),
            capacity: config.max_queue_size,
            outstanding: AtomicUsize::new(0),
            idle_lock: Mutex::new(()),
            idle_cv: Condvar::new(),
            threads: OnceLock::new(),
            next_wake: AtomicUsize::new(0),
        });

        let pool = Self {
            shared: shared.clone(),
            handles: Mutex::new(Vec::with_capacity(num_threads)),
            num_threads,
        };

        let mut threads = Vec::with_capacity(num_threads);
        for worker in workers {
            let name = format!("{}-{}", config.thread_name_prefix, worker.id);
            let mut builder = thread::Builder::new().name(name);

            if let Some(stack_size) = config.stack_size {
                builder = builder.stack_size(stack_size);
            }

            let shared = shared.clone();
            // on error `pool` drops here and stops the workers already spawned
            let handle = builder
                .spawn(move || worker.run(&shared))
                .map_err(|e| Error::executor(format!("spawn failed: {}", e)))?;

            threads.push(handle.thread().clone());
            pool.handles.lock().push(handle);
        }

        let _ = shared.threads.set(threads);
        tracing::debug!(num_threads, "thread pool started");

        Ok(pool)
    }

    pub fn with_threads(num_threads: usize) -> Result<Self> {
        let config = Config::builder().num_threads(num_threads).build()?;
        Self::new(&config)
    }

    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    /// Tasks submitted but not yet finished.
    pub fn pending_tasks(&self) -> usize {
        self.shared.queued.load(Ordering::Acquire)
    }

    /// Queued tasks plus live work guards.
    pub fn outstanding_work(&self) -> usize {
        self.shared.outstanding.load(Ordering::Acquire)
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.shutdown.load(Ordering::Acquire)
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    /// Wait until the pool runs out of work, then stop the workers.
    ///
    /// Must not be called from one of the pool's own workers.
    pub fn join(&self) {
        {
            let mut guard = self.shared.idle_lock.lock();
            while self.shared.outstanding.load(Ordering::Acquire) > 0
                && !self.shared.shutdown.load(Ordering::Acquire)
            {
                self.shared.idle_cv.wait(&mut guard);
            }
        }
        self.shutdown();
    }

    /// Stop the workers now. Queued tasks are dropped without running.
    pub fn shutdown(&self) {
        if self.shared.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }

        self.shared.wake_all();

        let current = thread::current().id();
        for handle in self.handles.lock().drain(..) {
            if handle.thread().id() == current {
                continue;
            }
            let _ = handle.join();
        }

        let _guard = self.shared.idle_lock.lock();
        self.shared.idle_cv.notify_all();
        tracing::debug!(num_threads = self.num_threads, "thread pool stopped");
    }
}

impl ExecutionContext for ThreadPool {
    type Executor = PoolExecutor;

    fn executor(&self) -> PoolExecutor {
        PoolExecutor {
            shared: self.shared.clone(),
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPool")
            .field("num_threads", &self.num_threads)
            .field("outstanding_work", &self.outstanding_work())
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

/// Handle to a [`ThreadPool`]. Two handles are equal when they refer to the
/// same pool.
#[derive(Clone)]
pub struct PoolExecutor {
    shared: Arc<PoolShared>,
}

impl PartialEq for PoolExecutor {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl Eq for PoolExecutor {}

impl Executor for PoolExecutor {
    fn defer<F, A>(&self, f: F, alloc: &A) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
        A: Allocator,
    {
        if self.shared.shutdown.load(Ordering::Acquire) {
            return Err(Error::Shutdown);
        }
        let task = Task::new(f, alloc)?;
        self.shared.submit(task)
    }

    fn on_work_started(&self) {
        self.shared.work_started();
    }

    fn on_work_finished(&self) {
        self.shared.work_finished();
    }
}

impl std::fmt::Debug for PoolExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolExecutor")
            .field("pool", &Arc::as_ptr(&self.shared))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::SystemAllocator;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn test_pool_runs_deferred_work() {
        let pool = ThreadPool::with_threads(2).unwrap();
        let ex = pool.executor();
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..100 {
            let counter = counter.clone();
            ex.defer(
                move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                },
                &SystemAllocator,
            )
            .unwrap();
        }

        pool.join();
        assert_eq!(counter.load(Ordering::SeqCst), 100);
        assert_eq!(pool.pending_tasks(), 0);
    }

    #[test]
    fn test_executors_of_same_pool_are_equal() {
        let a = ThreadPool::with_threads(1).unwrap();
        let b = ThreadPool::with_threads(1).unwrap();

        assert_eq!(a.executor(), a.executor());
        assert_ne!(a.executor(), b.executor());
    }

    #[test]
    fn test_defer_after_shutdown_fails() {
        let pool = ThreadPool::with_threads(1).unwrap();
        let ex = pool.executor();
        pool.shutdown();

        let result = ex.defer(|| {}, &SystemAllocator);
        assert_eq!(result, Err(Error::Shutdown));
    }

    #[test]
    fn test_bounded_queue_rejects() {
        let config = Config::builder()
            .num_threads(1)
            .max_queue_size(1)
            .build()
            .unwrap();
        let pool = ThreadPool::new(&config).unwrap();
        let ex = pool.executor();

        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        ex.defer(
            move || {
                started_tx.send(()).unwrap();
                let _ = release_rx.recv();
            },
            &SystemAllocator,
        )
        .unwrap();
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        // the running task still counts against the bound
        let result = ex.defer(|| {}, &SystemAllocator);
        assert_eq!(result, Err(Error::QueueFull { capacity: 1 }));

        release_tx.send(()).unwrap();
        pool.join();
    }

    #[test]
    fn test_join_waits_for_work_guard() {
        let pool = Arc::new(ThreadPool::with_threads(1).unwrap());
        let ex = pool.executor();
        ex.on_work_started();
        assert_eq!(pool.outstanding_work(), 1);

        let joiner = {
            let pool = pool.clone();
            thread::spawn(move || pool.join())
        };

        thread::sleep(Duration::from_millis(20));
        assert!(!pool.is_shutdown());

        ex.on_work_finished();
        joiner.join().unwrap();
        assert!(pool.is_shutdown());
    }

    #[test]
    fn test_panicking_task_does_not_kill_worker() {
        let config = Config::builder()
            .num_threads(1)
            .panic_strategy(crate::executor::PanicStrategy::Isolate)
            .build()
            .unwrap();
        let pool = ThreadPool::new(&config).unwrap();
        let ex = pool.executor();
        let (tx, rx) = mpsc::channel();

        ex.defer(|| panic!("boom"), &SystemAllocator).unwrap();
        ex.defer(move || tx.send(42).unwrap(), &SystemAllocator).unwrap();

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 42);
        pool.join();
    }
}
