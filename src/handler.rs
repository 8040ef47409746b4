//! Completion handlers and the binders that attach associations to them.

use crate::executor::Executor;
use crate::memory::Allocator;

/// The continuation of an asynchronous operation.
///
/// Consumed by [`Handler::invoke`], so it runs at most once. Every
/// `FnOnce() + Send + 'static` closure is a handler; other types implement
/// this together with [`AssociatedExecutor`](crate::AssociatedExecutor) and
/// [`AssociatedAllocator`](crate::AssociatedAllocator).
pub trait Handler: Send + 'static {
    fn invoke(self);
}

impl<F> Handler for F
where
    F: FnOnce() + Send + 'static,
{
    fn invoke(self) {
        self()
    }
}

/// A handler paired with the executor it must run on.
#[derive(Debug, Clone)]
pub struct ExecutorBinder<E, H> {
    executor: E,
    handler: H,
}

impl<E: Executor, H> ExecutorBinder<E, H> {
    pub fn new(executor: E, handler: H) -> Self {
        Self { executor, handler }
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn get_ref(&self) -> &H {
        &self.handler
    }

    pub fn into_inner(self) -> H {
        self.handler
    }
}

impl<E: Executor, H: Handler> Handler for ExecutorBinder<E, H> {
    fn invoke(self) {
        self.handler.invoke()
    }
}

/// A handler paired with the allocator used for its queued storage.
#[derive(Debug, Clone)]
pub struct AllocatorBinder<A, H> {
    allocator: A,
    handler: H,
}

impl<A: Allocator, H> AllocatorBinder<A, H> {
    pub fn new(allocator: A, handler: H) -> Self {
        Self { allocator, handler }
    }

    pub fn allocator(&self) -> &A {
        &self.allocator
    }

    pub fn get_ref(&self) -> &H {
        &self.handler
    }

    pub fn into_inner(self) -> H {
        self.handler
    }
}

impl<A: Allocator, H: Handler> Handler for AllocatorBinder<A, H> {
    fn invoke(self) {
        self.handler.invoke()
    }
}

/// Associate `executor` with `handler`.
pub fn bind_executor<E: Executor, H>(executor: E, handler: H) -> ExecutorBinder<E, H> {
    ExecutorBinder::new(executor, handler)
}

/// Associate `allocator` with `handler`.
pub fn bind_allocator<A: Allocator, H>(allocator: A, handler: H) -> AllocatorBinder<A, H> {
    AllocatorBinder::new(allocator, handler)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{EventLoop, ExecutionContext};
    use crate::memory::TrackingAllocator;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_binders_invoke_inner_handler() {
        let event_loop = EventLoop::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();

        let bound = bind_allocator(
            TrackingAllocator::new(),
            bind_executor(event_loop.executor(), move || {
                h.fetch_add(1, Ordering::SeqCst);
            }),
        );
        assert_eq!(*bound.get_ref().executor(), event_loop.executor());

        bound.invoke();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
