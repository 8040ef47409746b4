//! Serialized execution on top of another executor.

use super::panic_handler::PanicInfo;
use super::task::{Task, TaskId};
use super::Executor;
use crate::error::Result;
use crate::memory::{Allocator, SystemAllocator};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

#[derive(Default)]
struct StrandQueue {
    tasks: VecDeque<Task>,
    // a drain is scheduled on, or running on, the inner executor
    scheduled: bool,
}

#[derive(Default)]
struct StrandState {
    queue: Mutex<StrandQueue>,
}

impl StrandState {
    /// Run queued handlers one at a time until the queue is empty.
    fn drain(&self) {
        loop {
            let task = {
                let mut queue = self.queue.lock();
                match queue.tasks.pop_front() {
                    Some(task) => task,
                    None => {
                        queue.scheduled = false;
                        return;
                    }
                }
            };

            if let Err(info) = PanicInfo::capture(task) {
                tracing::error!(task = ?info.task, message = %info.message, "strand handler panicked");
            }
        }
    }
}

/// Executor adapter that runs its handlers one at a time, in the order they
/// were deferred, on the inner executor.
///
/// Clones share the same queue. Two strands are equal when they share the
/// queue; strands created separately over the same inner executor are
/// distinct.
pub struct Strand<E: Executor> {
    inner: E,
    state: Arc<StrandState>,
}

impl<E: Executor> Strand<E> {
    pub fn new(inner: E) -> Self {
        Self {
            inner,
            state: Arc::new(StrandState::default()),
        }
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }

    /// Handlers waiting in the strand queue.
    pub fn pending(&self) -> usize {
        self.state.queue.lock().tasks.len()
    }

    /// Defer `f` using the default allocator.
    pub fn post<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.defer(f, &SystemAllocator)
    }
}

impl<E: Executor> Strand<E> {
    fn schedule_drain<A: Allocator>(&self, alloc: &A) -> Result<()> {
        let state = self.state.clone();
        self.inner.defer(move || state.drain(), alloc)
    }

    /// Undo a submission whose drain could not be scheduled.
    ///
    /// Only the failed task is returned to its caller. Tasks queued by
    /// others while the drain looked scheduled were already accepted, so
    /// they get one more drain attempt; if that fails too they are dropped
    /// and the strand is left idle.
    fn roll_back<A: Allocator>(&self, id: TaskId, alloc: &A) {
        let (own, waiting) = {
            let mut queue = self.state.queue.lock();
            let own = match queue.tasks.iter().position(|t| t.id == id) {
                Some(pos) => queue.tasks.remove(pos),
                None => None,
            };
            let waiting = !queue.tasks.is_empty();
            if !waiting {
                queue.scheduled = false;
            }
            (own, waiting)
        };
        // dropping tasks may re-enter the strand, so not under the lock
        drop(own);

        if !waiting {
            return;
        }
        if let Err(e) = self.schedule_drain(alloc) {
            let orphans = {
                let mut queue = self.state.queue.lock();
                queue.scheduled = false;
                std::mem::take(&mut queue.tasks)
            };
            tracing::error!(
                error = %e,
                count = orphans.len(),
                "strand could not reschedule its queue, dropping handlers"
            );
            drop(orphans);
        }
    }
}

impl<E: Executor> Clone for Strand<E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            state: self.state.clone(),
        }
    }
}

impl<E: Executor> PartialEq for Strand<E> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.state, &other.state) && self.inner == other.inner
    }
}

impl<E: Executor> Executor for Strand<E> {
    fn defer<F, A>(&self, f: F, alloc: &A) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
        A: Allocator,
    {
        let task = Task::new(f, alloc)?;
        let id = task.id;

        let schedule = {
            let mut queue = self.state.queue.lock();
            queue.tasks.push_back(task);
            !std::mem::replace(&mut queue.scheduled, true)
        };

        if schedule {
            if let Err(e) = self.schedule_drain(alloc) {
                self.roll_back(id, alloc);
                return Err(e);
            }
        }

        Ok(())
    }

    fn on_work_started(&self) {
        self.inner.on_work_started();
    }

    fn on_work_finished(&self) {
        self.inner.on_work_finished();
    }
}

impl<E: Executor + std::fmt::Debug> std::fmt::Debug for Strand<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Strand")
            .field("inner", &self.inner)
            .field("state", &Arc::as_ptr(&self.state))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{EventLoop, ExecutionContext, ThreadPool};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_strand_preserves_order() {
        let event_loop = EventLoop::new();
        let strand = Strand::new(event_loop.executor());
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..10 {
            let order = order.clone();
            strand.post(move || order.lock().push(i)).unwrap();
        }
        assert_eq!(strand.pending(), 10);

        // one drain task on the loop runs all ten handlers
        assert_eq!(event_loop.run(), 1);
        assert_eq!(*order.lock(), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_strand_never_overlaps_on_pool() {
        let pool = ThreadPool::with_threads(4).unwrap();
        let strand = Strand::new(pool.executor());
        let busy = Arc::new(AtomicBool::new(false));
        let overlaps = Arc::new(AtomicUsize::new(0));
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..200 {
            let busy = busy.clone();
            let overlaps = overlaps.clone();
            let done = done.clone();
            strand
                .post(move || {
                    if busy.swap(true, Ordering::SeqCst) {
                        overlaps.fetch_add(1, Ordering::SeqCst);
                    }
                    std::thread::sleep(Duration::from_micros(10));
                    busy.store(false, Ordering::SeqCst);
                    done.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }

        pool.join();
        assert_eq!(done.load(Ordering::SeqCst), 200);
        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_strand_equality() {
        let event_loop = EventLoop::new();
        let a = Strand::new(event_loop.executor());
        let b = Strand::new(event_loop.executor());

        assert!(a == a.clone());
        assert!(a != b);
    }

    #[test]
    fn test_panicking_handler_does_not_wedge_strand() {
        let event_loop = EventLoop::new();
        let strand = Strand::new(event_loop.executor());
        let ran = Arc::new(AtomicBool::new(false));

        strand.post(|| panic!("strand boom")).unwrap();
        let r = ran.clone();
        strand.post(move || r.store(true, Ordering::SeqCst)).unwrap();

        event_loop.run();
        assert!(ran.load(Ordering::SeqCst));
    }

    type Job = Box<dyn FnOnce() + Send>;

    /// Inner executor that rejects its next `failures` deferrals and runs
    /// `hook` at the start of the first one.
    #[derive(Clone, Default)]
    struct Flaky {
        failures: Arc<AtomicUsize>,
        hook: Arc<Mutex<Option<Job>>>,
        queue: Arc<Mutex<VecDeque<Job>>>,
    }

    impl Flaky {
        fn run_all(&self) -> usize {
            let mut count = 0;
            loop {
                let job = self.queue.lock().pop_front();
                match job {
                    Some(job) => {
                        job();
                        count += 1;
                    }
                    None => return count,
                }
            }
        }
    }

    impl PartialEq for Flaky {
        fn eq(&self, other: &Self) -> bool {
            Arc::ptr_eq(&self.queue, &other.queue)
        }
    }

    impl Executor for Flaky {
        fn defer<F, A>(&self, f: F, _alloc: &A) -> Result<()>
        where
            F: FnOnce() + Send + 'static,
            A: Allocator,
        {
            let hook = self.hook.lock().take();
            if let Some(hook) = hook {
                hook();
            }
            let failing = self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(crate::error::Error::Shutdown);
            }
            self.queue.lock().push_back(Box::new(f));
            Ok(())
        }
    }

    /// A second handler is posted while the first post's drain is being
    /// scheduled; returns the second post's result and its run flag.
    fn post_during_failed_schedule(
        inner: &Flaky,
        strand: &Strand<Flaky>,
    ) -> (Arc<Mutex<Option<Result<()>>>>, Arc<AtomicBool>) {
        let second = Arc::new(Mutex::new(None));
        let ran = Arc::new(AtomicBool::new(false));

        let (s, r, slot) = (strand.clone(), ran.clone(), second.clone());
        *inner.hook.lock() = Some(Box::new(move || {
            let result = s.post(move || r.store(true, Ordering::SeqCst));
            *slot.lock() = Some(result);
        }));

        assert!(strand.post(|| {}).unwrap_err().is_shutdown());
        (second, ran)
    }

    #[test]
    fn test_accepted_handler_survives_failed_schedule() {
        let inner = Flaky::default();
        inner.failures.store(1, Ordering::SeqCst);
        let strand = Strand::new(inner.clone());

        let (second, ran) = post_during_failed_schedule(&inner, &strand);
        assert_eq!(*second.lock(), Some(Ok(())));

        // the rejected handler is gone, the accepted one got a new drain
        assert_eq!(strand.pending(), 1);
        assert_eq!(inner.run_all(), 1);
        assert!(ran.load(Ordering::SeqCst));
        assert_eq!(strand.pending(), 0);
    }

    #[test]
    fn test_strand_stays_usable_when_reschedule_fails() {
        let inner = Flaky::default();
        inner.failures.store(2, Ordering::SeqCst);
        let strand = Strand::new(inner.clone());

        let (_second, ran) = post_during_failed_schedule(&inner, &strand);
        assert_eq!(strand.pending(), 0);
        assert!(!ran.load(Ordering::SeqCst));

        let later = Arc::new(AtomicBool::new(false));
        let l = later.clone();
        strand.post(move || l.store(true, Ordering::SeqCst)).unwrap();
        assert_eq!(inner.run_all(), 1);
        assert!(later.load(Ordering::SeqCst));
    }

    #[test]
    fn test_inner_failure_is_returned() {
        let strand = Strand::new(EventLoop::new().executor());
        assert!(strand.post(|| {}).unwrap_err().is_shutdown());
        assert_eq!(strand.pending(), 0);
    }
}
