//! Run-queue execution context driven by the threads that call `run`.

use super::task::Task;
use super::{ExecutionContext, Executor};
use crate::error::{Error, Result};
use crate::memory::Allocator;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

struct LoopState {
    queue: Mutex<VecDeque<Task>>,
    ready: Condvar,
    // queued tasks plus live work guards
    outstanding: AtomicUsize,
    stopped: AtomicBool,
    closed: AtomicBool,
}

impl LoopState {
    fn work_finished(&self) {
        if self.outstanding.fetch_sub(1, Ordering::AcqRel) == 1 {
            let _queue = self.queue.lock();
            self.ready.notify_all();
        }
    }
}

/// Decrements outstanding work once the task is done, even if it unwinds.
struct FinishOnDrop<'a>(&'a LoopState);

impl Drop for FinishOnDrop<'_> {
    fn drop(&mut self) {
        self.0.work_finished();
    }
}

/// A FIFO queue of deferred handlers, executed by whichever threads call
/// [`EventLoop::run`], [`EventLoop::run_one`] or [`EventLoop::poll`].
///
/// Handler panics propagate out of the running call.
pub struct EventLoop {
    state: Arc<LoopState>,
}

impl EventLoop {
    pub fn new() -> Self {
        Self {
            state: Arc::new(LoopState {
                queue: Mutex::new(VecDeque::new()),
                ready: Condvar::new(),
                outstanding: AtomicUsize::new(0),
                stopped: AtomicBool::new(false),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Run handlers until the loop runs out of work or is stopped.
    ///
    /// Blocks while work guards are outstanding but nothing is queued.
    /// Returns the number of handlers executed.
    pub fn run(&self) -> usize {
        let mut executed = 0;
        while let Some(task) = self.next_task(true) {
            self.execute(task);
            executed += 1;
        }
        executed
    }

    /// Run at most one handler, blocking like [`EventLoop::run`].
    pub fn run_one(&self) -> usize {
        match self.next_task(true) {
            Some(task) => {
                self.execute(task);
                1
            }
            None => 0,
        }
    }

    /// Run handlers that are ready without blocking.
    pub fn poll(&self) -> usize {
        let mut executed = 0;
        while let Some(task) = self.next_task(false) {
            self.execute(task);
            executed += 1;
        }
        executed
    }

    /// Make running calls return as soon as possible.
    pub fn stop(&self) {
        self.state.stopped.store(true, Ordering::Release);
        let _queue = self.state.queue.lock();
        self.state.ready.notify_all();
    }

    pub fn stopped(&self) -> bool {
        self.state.stopped.load(Ordering::Acquire)
    }

    /// Clear the stopped flag so the loop can run again.
    pub fn restart(&self) {
        self.state.stopped.store(false, Ordering::Release);
    }

    /// Queued handlers plus live work guards.
    pub fn outstanding_work(&self) -> usize {
        self.state.outstanding.load(Ordering::Acquire)
    }

    /// Handlers queued and not yet started.
    pub fn pending(&self) -> usize {
        self.state.queue.lock().len()
    }

    fn next_task(&self, block: bool) -> Option<Task> {
        let state = &*self.state;
        let mut queue = state.queue.lock();
        loop {
            if state.stopped.load(Ordering::Acquire) {
                return None;
            }
            if let Some(task) = queue.pop_front() {
                return Some(task);
            }
            if !block || state.outstanding.load(Ordering::Acquire) == 0 {
                return None;
            }
            state.ready.wait(&mut queue);
        }
    }

    fn execute(&self, task: Task) {
        let _finish = FinishOnDrop(&self.state);
        task.execute();
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionContext for EventLoop {
    type Executor = LoopExecutor;

    fn executor(&self) -> LoopExecutor {
        LoopExecutor {
            state: self.state.clone(),
        }
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        self.state.closed.store(true, Ordering::Release);
        // dropping tasks may re-enter the state (work guards), so not under the lock
        let abandoned = std::mem::take(&mut *self.state.queue.lock());
        if !abandoned.is_empty() {
            tracing::debug!(count = abandoned.len(), "event loop dropped with queued handlers");
        }
        drop(abandoned);
    }
}

impl std::fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLoop")
            .field("outstanding_work", &self.outstanding_work())
            .field("stopped", &self.stopped())
            .finish()
    }
}

/// Handle to an [`EventLoop`]. Two handles are equal when they refer to the
/// same loop.
#[derive(Clone)]
pub struct LoopExecutor {
    state: Arc<LoopState>,
}

impl PartialEq for LoopExecutor {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

impl Eq for LoopExecutor {}

impl Executor for LoopExecutor {
    fn defer<F, A>(&self, f: F, alloc: &A) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
        A: Allocator,
    {
        if self.state.closed.load(Ordering::Acquire) {
            return Err(Error::Shutdown);
        }
        let task = Task::new(f, alloc)?;

        let mut queue = self.state.queue.lock();
        self.state.outstanding.fetch_add(1, Ordering::AcqRel);
        queue.push_back(task);
        self.state.ready.notify_one();
        Ok(())
    }

    fn on_work_started(&self) {
        self.state.outstanding.fetch_add(1, Ordering::AcqRel);
    }

    fn on_work_finished(&self) {
        self.state.work_finished();
    }
}

impl std::fmt::Debug for LoopExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopExecutor")
            .field("loop", &Arc::as_ptr(&self.state))
            .finish()
    }
}
