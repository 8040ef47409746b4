//! Process-wide default executor.

use super::thread_pool::{PoolExecutor, ThreadPool};
use super::{ExecutionContext, Executor};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::memory::Allocator;
use parking_lot::RwLock;
use std::sync::Arc;

// Global pool behind every SystemExecutor
static SYSTEM_POOL: RwLock<Option<Arc<ThreadPool>>> = RwLock::new(None);

fn system_config() -> Config {
    Config {
        thread_name_prefix: "veda-system".to_string(),
        ..Config::default()
    }
}

/// Create the system pool with an explicit configuration.
///
/// Fails with [`Error::AlreadyInitialized`] if the pool exists, including
/// when it was created lazily by an earlier deferral.
pub fn init_system(config: Config) -> Result<()> {
    let mut pool = SYSTEM_POOL.write();
    if pool.is_some() {
        return Err(Error::AlreadyInitialized);
    }
    *pool = Some(Arc::new(ThreadPool::new(&config)?));
    Ok(())
}

/// Wait for the system pool's outstanding work, then stop it.
///
/// A later deferral onto the system executor starts a fresh pool. Must not
/// be called from a handler running on the system pool.
pub fn shutdown_system() {
    let pool = SYSTEM_POOL.write().take();
    if let Some(pool) = pool {
        pool.join();
    }
}

fn system_pool() -> Result<PoolExecutor> {
    if let Some(pool) = SYSTEM_POOL.read().as_ref() {
        return Ok(pool.executor());
    }

    let mut pool = SYSTEM_POOL.write();
    if let Some(pool) = pool.as_ref() {
        return Ok(pool.executor());
    }

    let created = Arc::new(ThreadPool::new(&system_config())?);
    tracing::debug!(num_threads = created.num_threads(), "system pool created");
    let executor = created.executor();
    *pool = Some(created);
    Ok(executor)
}

fn existing_pool() -> Option<PoolExecutor> {
    SYSTEM_POOL.read().as_ref().map(|pool| pool.executor())
}

/// Handle to the process-wide thread pool. All instances are equal.
///
/// The pool is created on first use with the default configuration unless
/// [`init_system`] ran first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SystemExecutor;

impl Executor for SystemExecutor {
    fn defer<F, A>(&self, f: F, alloc: &A) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
        A: Allocator,
    {
        system_pool()?.defer(f, alloc)
    }

    fn on_work_started(&self) {
        match system_pool() {
            Ok(ex) => ex.on_work_started(),
            Err(e) => tracing::warn!(error = %e, "system pool unavailable, work not tracked"),
        }
    }

    fn on_work_finished(&self) {
        if let Some(ex) = existing_pool() {
            ex.on_work_finished();
        }
    }
}

/// Execution context view of the system pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemContext;

impl ExecutionContext for SystemContext {
    type Executor = SystemExecutor;

    fn executor(&self) -> SystemExecutor {
        SystemExecutor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::SystemAllocator;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn test_system_executor_runs_on_other_thread() {
        let (tx, rx) = mpsc::channel();
        let caller = std::thread::current().id();

        SystemExecutor
            .defer(move || tx.send(std::thread::current().id()).unwrap(), &SystemAllocator)
            .unwrap();

        let ran_on = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_ne!(ran_on, caller);
    }

    #[test]
    fn test_system_executors_are_equal() {
        assert_eq!(SystemExecutor, SystemExecutor);
        assert_eq!(SystemContext.executor(), SystemExecutor::default());
    }
}
