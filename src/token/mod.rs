//! Completion tokens.
//!
//! A token decides how the caller learns that deferred work has happened.
//! Every [`Handler`] is its own token and yields the submission result
//! directly; [`UseFuture`] yields a future instead.

#[cfg(feature = "async")]
pub mod future;

#[cfg(feature = "async")]
pub use future::{FutureHandler, UseFuture, UseFutureOn};

use crate::error::Result;
use crate::handler::Handler;

/// Start an operation with a handler. Consumed, so it runs once.
pub trait Initiation<H> {
    fn initiate(self, handler: H) -> Result<()>;
}

/// Adapts a caller's token to a uniform handler and back to the caller's
/// return type.
pub trait CompletionToken: Sized {
    type Handler: Handler;
    type Output;

    fn async_initiate<I>(self, initiation: I) -> Self::Output
    where
        I: Initiation<Self::Handler>;
}

impl<H: Handler> CompletionToken for H {
    type Handler = H;
    type Output = Result<()>;

    fn async_initiate<I>(self, initiation: I) -> Result<()>
    where
        I: Initiation<H>,
    {
        initiation.initiate(self)
    }
}
