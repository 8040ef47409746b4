//! Deferred dispatch of completion handlers.
//!
//! [`defer_on`] queues a handler for later execution through a target
//! executor while honoring the handler's own associations:
//!
//! - if the handler's associated executor is the target, the handler is
//!   deferred on the target directly;
//! - otherwise the target receives a [`WorkRedirector`], which later defers
//!   the handler onto its own executor.
//!
//! [`defer`] uses the handler's executor (or the [`SystemExecutor`]) as the
//! target, and [`defer_in`] uses an execution context's executor.

mod redirect;

pub use redirect::WorkRedirector;

use crate::associated::{
    get_associated_allocator, get_associated_executor, AssociatedAllocator, AssociatedExecutor,
};
use crate::error::Result;
use crate::executor::{same_executor, ExecutionContext, Executor, SystemExecutor};
use crate::handler::Handler;
use crate::token::{CompletionToken, Initiation};

/// Initiation used by [`defer`].
#[derive(Debug, Clone, Copy, Default)]
pub struct InitiateDefer;

impl<H> Initiation<H> for InitiateDefer
where
    H: Handler + AssociatedExecutor<SystemExecutor> + AssociatedAllocator,
{
    fn initiate(self, handler: H) -> Result<()> {
        let executor = get_associated_executor(&handler, &SystemExecutor);
        let alloc = get_associated_allocator(&handler);

        tracing::trace!("deferring handler onto its associated executor");
        executor.defer(move || handler.invoke(), &alloc)
    }
}

/// Initiation used by [`defer_on`] and [`defer_in`].
#[derive(Debug, Clone)]
pub struct InitiateDeferWithExecutor<E> {
    executor: E,
}

impl<E: Executor> InitiateDeferWithExecutor<E> {
    pub fn new(executor: E) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }
}

impl<E, H> Initiation<H> for InitiateDeferWithExecutor<E>
where
    E: Executor,
    H: Handler + AssociatedExecutor<E> + AssociatedAllocator,
{
    fn initiate(self, handler: H) -> Result<()> {
        let handler_ex = get_associated_executor(&handler, &self.executor);
        let alloc = get_associated_allocator(&handler);

        if same_executor(&self.executor, &handler_ex) {
            tracing::trace!(path = "direct", "deferring handler");
            self.executor.defer(move || handler.invoke(), &alloc)
        } else {
            tracing::debug!(
                path = "redirect",
                outer = std::any::type_name::<E>(),
                home = std::any::type_name::<<H as AssociatedExecutor<E>>::Executor>(),
                "deferring handler through its home executor"
            );
            let redirector = WorkRedirector::new(handler, handler_ex);
            self.executor.defer(move || redirector.redirect(), &alloc)
        }
    }
}

/// Defer a handler onto its own associated executor, or the
/// [`SystemExecutor`] if it has none.
///
/// The handler never runs before this call returns.
pub fn defer<T>(token: T) -> T::Output
where
    T: CompletionToken,
    InitiateDefer: Initiation<T::Handler>,
{
    token.async_initiate(InitiateDefer)
}

/// Defer a handler through `executor`.
///
/// The handler never runs before this call returns, and it always ends up
/// running on its associated executor: when that differs from `executor`
/// the handler makes one extra hop.
pub fn defer_on<E, T>(executor: &E, token: T) -> T::Output
where
    E: Executor,
    T: CompletionToken,
    InitiateDeferWithExecutor<E>: Initiation<T::Handler>,
{
    token.async_initiate(InitiateDeferWithExecutor::new(executor.clone()))
}

/// Defer a handler through the executor of `context`.
pub fn defer_in<C, T>(context: &C, token: T) -> T::Output
where
    C: ExecutionContext,
    T: CompletionToken,
    InitiateDeferWithExecutor<C::Executor>: Initiation<T::Handler>,
{
    defer_on(&context.executor(), token)
}
