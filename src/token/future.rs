//! Future-returning completion token.

use super::{CompletionToken, Initiation};
use crate::associated::{AssociatedAllocator, AssociatedExecutor};
use crate::error::{Error, Result};
use crate::executor::Executor;
use crate::handler::{ExecutorBinder, Handler};
use crate::memory::SystemAllocator;
use async_channel::{bounded, Receiver, Sender};
use futures::future::BoxFuture;

/// Token that makes a deferral return a future.
///
/// The future resolves to `Ok(())` once the deferred handler has run, to
/// the submission error if the deferral was rejected, and to
/// [`Error::Cancelled`] if the handler was dropped without running.
#[derive(Debug, Clone, Copy, Default)]
pub struct UseFuture;

impl UseFuture {
    /// Make the completion run on `executor`.
    pub fn bind_executor<E: Executor>(self, executor: E) -> UseFutureOn<E> {
        UseFutureOn { executor }
    }
}

/// [`UseFuture`] with an associated executor.
#[derive(Debug, Clone)]
pub struct UseFutureOn<E> {
    executor: E,
}

/// Handler produced by [`UseFuture`]; completes the returned future.
#[derive(Debug)]
pub struct FutureHandler {
    done: Sender<()>,
}

impl FutureHandler {
    fn channel() -> (Self, Receiver<()>) {
        let (done, receiver) = bounded(1);
        (Self { done }, receiver)
    }
}

impl Handler for FutureHandler {
    fn invoke(self) {
        let _ = self.done.try_send(());
    }
}

impl<E: Executor> AssociatedExecutor<E> for FutureHandler {
    type Executor = E;

    fn associated_executor(&self, fallback: &E) -> E {
        fallback.clone()
    }
}

impl AssociatedAllocator for FutureHandler {
    type Allocator = SystemAllocator;

    fn associated_allocator(&self) -> SystemAllocator {
        SystemAllocator
    }
}

fn completion(submitted: Result<()>, receiver: Receiver<()>) -> BoxFuture<'static, Result<()>> {
    Box::pin(async move {
        submitted?;
        receiver.recv().await.map_err(|_| Error::Cancelled)
    })
}

impl CompletionToken for UseFuture {
    type Handler = FutureHandler;
    type Output = BoxFuture<'static, Result<()>>;

    fn async_initiate<I>(self, initiation: I) -> Self::Output
    where
        I: Initiation<FutureHandler>,
    {
        let (handler, receiver) = FutureHandler::channel();
        completion(initiation.initiate(handler), receiver)
    }
}

impl<E: Executor> CompletionToken for UseFutureOn<E> {
    type Handler = ExecutorBinder<E, FutureHandler>;
    type Output = BoxFuture<'static, Result<()>>;

    fn async_initiate<I>(self, initiation: I) -> Self::Output
    where
        I: Initiation<Self::Handler>,
    {
        let (handler, receiver) = FutureHandler::channel();
        let handler = ExecutorBinder::new(self.executor, handler);
        completion(initiation.initiate(handler), receiver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{EventLoop, ExecutionContext};

    struct RunNow;

    impl<H: Handler> Initiation<H> for RunNow {
        fn initiate(self, handler: H) -> Result<()> {
            handler.invoke();
            Ok(())
        }
    }

    struct DropHandler;

    impl<H: Handler> Initiation<H> for DropHandler {
        fn initiate(self, handler: H) -> Result<()> {
            drop(handler);
            Ok(())
        }
    }

    struct Reject;

    impl<H: Handler> Initiation<H> for Reject {
        fn initiate(self, _handler: H) -> Result<()> {
            Err(Error::QueueFull { capacity: 4 })
        }
    }

    #[test]
    fn test_future_resolves_after_handler() {
        let fut = UseFuture.async_initiate(RunNow);
        assert_eq!(futures::executor::block_on(fut), Ok(()));
    }

    #[test]
    fn test_future_reports_dropped_handler() {
        let fut = UseFuture.async_initiate(DropHandler);
        assert_eq!(futures::executor::block_on(fut), Err(Error::Cancelled));
    }

    #[test]
    fn test_future_reports_submission_error() {
        let fut = UseFuture.async_initiate(Reject);
        assert_eq!(
            futures::executor::block_on(fut),
            Err(Error::QueueFull { capacity: 4 })
        );
    }

    #[test]
    fn test_bound_future_handler_carries_executor() {
        let event_loop = EventLoop::new();
        let token = UseFuture.bind_executor(event_loop.executor());

        struct Inspect(crate::executor::LoopExecutor);

        impl Initiation<ExecutorBinder<crate::executor::LoopExecutor, FutureHandler>> for Inspect {
            fn initiate(
                self,
                handler: ExecutorBinder<crate::executor::LoopExecutor, FutureHandler>,
            ) -> Result<()> {
                assert_eq!(*handler.executor(), self.0);
                handler.invoke();
                Ok(())
            }
        }

        let fut = token.async_initiate(Inspect(event_loop.executor()));
        assert_eq!(futures::executor::block_on(fut), Ok(()));
    }
}
