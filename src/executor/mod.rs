//! Executors and execution contexts.
//!
//! An [`Executor`] is a cheap, clonable handle that accepts callables for
//! later, non-reentrant execution. An [`ExecutionContext`] is the longer
//! lived object (thread pool, event loop) that hands out executors.
//!
//! Bundled implementations:
//! - [`ThreadPool`] / [`PoolExecutor`]: work-stealing worker threads,
//! - [`EventLoop`] / [`LoopExecutor`]: a run queue drained by the caller,
//! - [`Strand`]: serialized execution on top of another executor,
//! - [`SystemExecutor`]: the process-wide default pool.

pub mod event_loop;
pub mod panic_handler;
pub mod strand;
pub mod system;
pub mod task;
pub mod thread_pool;
pub mod work;
mod worker;

pub use event_loop::{EventLoop, LoopExecutor};
pub use panic_handler::{PanicHandler, PanicInfo, PanicStrategy};
pub use strand::Strand;
pub use system::{init_system, shutdown_system, SystemContext, SystemExecutor};
pub use task::TaskId;
pub use thread_pool::{PoolExecutor, ThreadPool};
pub use work::WorkGuard;

pub(crate) use task::Task;

use crate::error::Result;
use crate::memory::Allocator;
use std::any::{Any, TypeId};

/// Capability set of an execution target.
///
/// `PartialEq` is only ever evaluated between two handles of the same
/// concrete type; use [`same_executor`] to compare handles whose types may
/// differ.
pub trait Executor: Clone + PartialEq + Send + Sync + 'static {
    /// Queue `f` to run later on this executor.
    ///
    /// `f` must never run before this call returns. Any storage needed for
    /// `f` is obtained from `alloc`.
    fn defer<F, A>(&self, f: F, alloc: &A) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
        A: Allocator;

    /// Record that work which will eventually be deferred here is pending.
    fn on_work_started(&self) {}

    /// Balance a previous [`Executor::on_work_started`].
    fn on_work_finished(&self) {}
}

/// Object that can produce an executor on demand.
pub trait ExecutionContext {
    type Executor: Executor;

    fn executor(&self) -> Self::Executor;
}

/// Compare two executors that may have different concrete types.
///
/// Handles of different types are never the same executor. The types are
/// compared by `TypeId`, which is a constant for each monomorphized pair, so
/// the optimizer folds the check away; `PartialEq` only ever runs on
/// same-typed operands.
pub fn same_executor<A: Executor, B: Executor>(a: &A, b: &B) -> bool {
    if TypeId::of::<A>() != TypeId::of::<B>() {
        return false;
    }
    (b as &dyn Any).downcast_ref::<A>().map_or(false, |b| a == b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Left(u32);

    #[derive(Debug, Clone, PartialEq)]
    struct Right(u32);

    impl Executor for Left {
        fn defer<F, A>(&self, _f: F, _alloc: &A) -> Result<()>
        where
            F: FnOnce() + Send + 'static,
            A: Allocator,
        {
            Ok(())
        }
    }

    impl Executor for Right {
        fn defer<F, A>(&self, _f: F, _alloc: &A) -> Result<()>
        where
            F: FnOnce() + Send + 'static,
            A: Allocator,
        {
            Ok(())
        }
    }

    #[test]
    fn test_same_type_uses_equality() {
        assert!(same_executor(&Left(1), &Left(1)));
        assert!(!same_executor(&Left(1), &Left(2)));
    }

    #[test]
    fn test_different_types_never_equal() {
        assert!(!same_executor(&Left(1), &Right(1)));
        assert!(!same_executor(&Right(7), &Left(7)));
    }

    #[derive(Debug, Clone)]
    struct Untouchable;

    impl PartialEq for Untouchable {
        fn eq(&self, _other: &Self) -> bool {
            panic!("compared against a different executor type");
        }
    }

    impl Executor for Untouchable {
        fn defer<F, A>(&self, _f: F, _alloc: &A) -> Result<()>
        where
            F: FnOnce() + Send + 'static,
            A: Allocator,
        {
            Ok(())
        }
    }

    #[test]
    fn test_mismatched_types_skip_equality() {
        assert_ne!(TypeId::of::<Untouchable>(), TypeId::of::<Left>());
        assert!(!same_executor(&Untouchable, &Left(0)));
        assert!(!same_executor(&Left(0), &Untouchable));
    }
}
