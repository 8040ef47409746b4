//! VEDA dispatch - deferred completion handlers over pluggable executors
//!
//! Queue a completion handler for later execution without ever running it
//! inside the call that queued it, while honoring the executor and
//! allocator the handler is associated with.
//!
//! # Quick Start
//!
//! ```no_run
//! use veda_dispatch::prelude::*;
//!
//! let event_loop = EventLoop::new();
//! let pool = ThreadPool::with_threads(2).unwrap();
//!
//! // Deferred through the loop, but the handler belongs to the pool:
//! // the loop forwards it and the pool runs it.
//! defer_on(
//!     &event_loop.executor(),
//!     bind_executor(pool.executor(), || println!("hello from the pool")),
//! )
//! .unwrap();
//!
//! event_loop.run();
//! pool.join();
//! ```
//!
//! # Features
//!
//! - **Non-reentrant dispatch**: handlers never run inside `defer*`
//! - **Associated executors**: a handler always ends up on its own executor
//! - **Custom allocators**: handler storage comes from the handler's allocator
//! - **Bundled executors**: work-stealing pool, event loop, strand, system pool
//! - **Completion tokens**: callbacks, or futures with the `async` feature
//! - **Telemetry**: queue latency and task counters (optional)

#![warn(missing_debug_implementations)]

pub mod associated;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod executor;
pub mod handler;
pub mod memory;
pub mod prelude;
pub mod telemetry;
pub mod token;

pub use associated::{
    get_associated_allocator, get_associated_executor, AssociatedAllocator, AssociatedExecutor,
};
pub use config::{Config, ConfigBuilder};
pub use dispatch::{defer, defer_in, defer_on, WorkRedirector};
pub use error::{Error, Result};
pub use executor::{same_executor, ExecutionContext, Executor};
pub use handler::{bind_allocator, bind_executor, Handler};
pub use token::{CompletionToken, Initiation};

#[cfg(feature = "async")]
pub use token::UseFuture;
