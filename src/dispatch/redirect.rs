use crate::associated::{get_associated_allocator, AssociatedAllocator};
use crate::executor::{Executor, WorkGuard};
use crate::handler::Handler;

/// One-shot wrapper that moves a handler from the executor it was deferred
/// to onto the executor it belongs to.
///
/// While the redirector is queued elsewhere it holds outstanding work on
/// the handler's executor. It never invokes the handler itself.
pub struct WorkRedirector<H, E: Executor> {
    handler: H,
    executor: E,
    work: WorkGuard<E>,
}

impl<H, E> WorkRedirector<H, E>
where
    H: Handler + AssociatedAllocator,
    E: Executor,
{
    pub fn new(handler: H, executor: E) -> Self {
        let work = WorkGuard::new(executor.clone());
        Self {
            handler,
            executor,
            work,
        }
    }

    /// The executor the handler will be re-submitted to.
    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Defer the handler onto its own executor.
    ///
    /// Runs on the outer executor, so a rejection cannot reach the original
    /// caller; it is logged and the handler is dropped.
    pub fn redirect(self) {
        let Self {
            handler,
            executor,
            work,
        } = self;

        let alloc = get_associated_allocator(&handler);
        if let Err(e) = executor.defer(move || handler.invoke(), &alloc) {
            tracing::error!(error = %e, "home executor rejected redirected handler, dropping it");
        }

        // released after the re-submission so the home executor never looks idle
        drop(work);
    }
}

impl<H, E: Executor + std::fmt::Debug> std::fmt::Debug for WorkRedirector<H, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkRedirector")
            .field("executor", &self.executor)
            .finish_non_exhaustive()
    }
}
