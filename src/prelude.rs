pub use crate::associated::{
    get_associated_allocator, get_associated_executor, AssociatedAllocator, AssociatedExecutor,
};
pub use crate::config::{Config, ConfigBuilder};
pub use crate::dispatch::{defer, defer_in, defer_on};
pub use crate::error::{Error, Result};
pub use crate::executor::{
    same_executor, EventLoop, ExecutionContext, Executor, PanicStrategy, Strand, SystemExecutor,
    ThreadPool, WorkGuard,
};
pub use crate::handler::{bind_allocator, bind_executor, Handler};
pub use crate::memory::{Allocator, SystemAllocator};
pub use crate::token::CompletionToken;

#[cfg(feature = "telemetry")]
pub use crate::telemetry::{Metrics, MetricsSnapshot};

#[cfg(feature = "async")]
pub use crate::token::UseFuture;
