//! Type-erased storage for deferred work.

use crate::error::Result;
use crate::memory::Allocator;
use std::alloc::Layout;
use std::mem::ManuallyDrop;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Global task ID counter
static TASK_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

impl TaskId {
    fn next() -> Self {
        TaskId(TASK_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Heap cell holding the callable together with the allocator that owns
/// the cell's memory.
struct Cell<F, A> {
    alloc: A,
    func: F,
}

/// A queued callable.
///
/// The callable lives in a single allocation obtained from the allocator
/// passed to [`Task::new`]. Executing or dropping the task moves the
/// callable out and returns the memory to that allocator.
pub(crate) struct Task {
    pub(crate) id: TaskId,
    pub(crate) spawn_time: Instant,
    ptr: NonNull<u8>,
    run: unsafe fn(NonNull<u8>),
    discard: unsafe fn(NonNull<u8>),
}

// Only constructed from `F: Send` and `A: Send`.
unsafe impl Send for Task {}

impl Task {
    pub fn new<F, A>(f: F, alloc: &A) -> Result<Self>
    where
        F: FnOnce() + Send + 'static,
        A: Allocator,
    {
        let layout = Layout::new::<Cell<F, A>>();
        let ptr = if layout.size() == 0 {
            NonNull::<Cell<F, A>>::dangling().cast::<u8>()
        } else {
            alloc.allocate(layout)?
        };

        unsafe {
            ptr.cast::<Cell<F, A>>().as_ptr().write(Cell {
                alloc: alloc.clone(),
                func: f,
            });
        }

        Ok(Task {
            id: TaskId::next(),
            spawn_time: Instant::now(),
            ptr,
            run: run_cell::<F, A>,
            discard: discard_cell::<F, A>,
        })
    }

    /// Execute the task
    pub fn execute(self) {
        let this = ManuallyDrop::new(self);
        unsafe { (this.run)(this.ptr) }
    }
}

impl Drop for Task {
    fn drop(&mut self) {
        unsafe { (self.discard)(self.ptr) }
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("spawn_time", &self.spawn_time)
            .finish()
    }
}

/// Moves the callable out of its cell and frees the cell.
///
/// # Safety
///
/// `ptr` must point to an initialized `Cell<F, A>` that is not read again.
unsafe fn take_cell<F, A: Allocator>(ptr: NonNull<u8>) -> F {
    let Cell { alloc, func } = ptr.cast::<Cell<F, A>>().as_ptr().read();
    let layout = Layout::new::<Cell<F, A>>();
    if layout.size() != 0 {
        alloc.deallocate(ptr, layout);
    }
    func
}

unsafe fn run_cell<F: FnOnce(), A: Allocator>(ptr: NonNull<u8>) {
    // storage is released before the callable runs
    let func = take_cell::<F, A>(ptr);
    func();
}

unsafe fn discard_cell<F, A: Allocator>(ptr: NonNull<u8>) {
    drop(take_cell::<F, A>(ptr));
}
