//! Resolution of a handler's associated executor and allocator.
//!
//! Plain closures declare neither, so they resolve to the caller's fallback
//! executor and to [`SystemAllocator`]. Binders supply their own value and
//! forward the other association to the wrapped handler.

use crate::executor::Executor;
use crate::handler::{AllocatorBinder, ExecutorBinder};
use crate::memory::{Allocator, SystemAllocator};

/// Executor a handler prefers to run on, given a fallback of type `E`.
pub trait AssociatedExecutor<E: Executor> {
    type Executor: Executor;

    fn associated_executor(&self, fallback: &E) -> Self::Executor;
}

/// Allocator a handler prefers for storage created on its behalf.
pub trait AssociatedAllocator {
    type Allocator: Allocator;

    fn associated_allocator(&self) -> Self::Allocator;
}

impl<F, E> AssociatedExecutor<E> for F
where
    F: FnOnce() + Send + 'static,
    E: Executor,
{
    type Executor = E;

    fn associated_executor(&self, fallback: &E) -> E {
        fallback.clone()
    }
}

impl<F> AssociatedAllocator for F
where
    F: FnOnce() + Send + 'static,
{
    type Allocator = SystemAllocator;

    fn associated_allocator(&self) -> SystemAllocator {
        SystemAllocator
    }
}

impl<X, H, E> AssociatedExecutor<E> for ExecutorBinder<X, H>
where
    X: Executor,
    E: Executor,
{
    type Executor = X;

    fn associated_executor(&self, _fallback: &E) -> X {
        self.executor().clone()
    }
}

impl<X, H> AssociatedAllocator for ExecutorBinder<X, H>
where
    X: Executor,
    H: AssociatedAllocator,
{
    type Allocator = H::Allocator;

    fn associated_allocator(&self) -> H::Allocator {
        self.get_ref().associated_allocator()
    }
}

impl<A, H, E> AssociatedExecutor<E> for AllocatorBinder<A, H>
where
    A: Allocator,
    H: AssociatedExecutor<E>,
    E: Executor,
{
    type Executor = H::Executor;

    fn associated_executor(&self, fallback: &E) -> H::Executor {
        self.get_ref().associated_executor(fallback)
    }
}

impl<A, H> AssociatedAllocator for AllocatorBinder<A, H>
where
    A: Allocator,
{
    type Allocator = A;

    fn associated_allocator(&self) -> A {
        self.allocator().clone()
    }
}

pub fn get_associated_executor<H, E>(handler: &H, fallback: &E) -> H::Executor
where
    H: AssociatedExecutor<E>,
    E: Executor,
{
    handler.associated_executor(fallback)
}

pub fn get_associated_allocator<H: AssociatedAllocator>(handler: &H) -> H::Allocator {
    handler.associated_allocator()
}
