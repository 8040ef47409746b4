use super::task::{Task, TaskId};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};

/// What a pool worker does when a deferred handler panics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PanicStrategy {
    /// Abort the process.
    Abort,
    /// Drop the panic silently; the worker keeps running.
    Isolate,
    /// Log the panic; the worker keeps running.
    #[default]
    LogAndContinue,
}

/// Applies a [`PanicStrategy`] to tasks run by a pool's workers.
#[derive(Debug)]
pub struct PanicHandler {
    strategy: PanicStrategy,
    panics: AtomicUsize,
}

impl PanicHandler {
    pub fn new(strategy: PanicStrategy) -> Self {
        Self {
            strategy,
            panics: AtomicUsize::new(0),
        }
    }

    pub(crate) fn run(&self, task: Task) -> Result<(), PanicInfo> {
        let info = match PanicInfo::capture(task) {
            Ok(()) => return Ok(()),
            Err(info) => info,
        };
        self.panics.fetch_add(1, Ordering::Relaxed);

        match self.strategy {
            PanicStrategy::Abort => {
                tracing::error!(task = ?info.task, message = %info.message, "handler panicked, aborting");
                std::process::abort();
            }
            PanicStrategy::Isolate => {}
            PanicStrategy::LogAndContinue => {
                tracing::error!(task = ?info.task, message = %info.message, "handler panicked");
            }
        }

        Err(info)
    }

    /// Panics observed since creation or the last reset.
    pub fn panic_count(&self) -> usize {
        self.panics.load(Ordering::Relaxed)
    }

    pub fn reset_count(&self) {
        self.panics.store(0, Ordering::Relaxed);
    }

    pub fn strategy(&self) -> PanicStrategy {
        self.strategy
    }
}

impl Default for PanicHandler {
    fn default() -> Self {
        Self::new(PanicStrategy::default())
    }
}

/// A handler panic, attributed to the task that carried it.
#[derive(Debug, Clone)]
pub struct PanicInfo {
    pub task: TaskId,
    pub message: String,
}

impl PanicInfo {
    /// Execute `task`, turning an unwind into a `PanicInfo`.
    pub(crate) fn capture(task: Task) -> Result<(), PanicInfo> {
        let id = task.id;
        catch_unwind(AssertUnwindSafe(move || task.execute()))
            .map_err(|payload| Self::from_payload(id, payload))
    }

    fn from_payload(task: TaskId, payload: Box<dyn Any + Send>) -> Self {
        let message = match payload.downcast::<String>() {
            Ok(s) => *s,
            Err(payload) => match payload.downcast_ref::<&str>() {
                Some(s) => s.to_string(),
                None => "non-string panic payload".to_string(),
            },
        };

        Self { task, message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::SystemAllocator;

    fn task(f: impl FnOnce() + Send + 'static) -> Task {
        Task::new(f, &SystemAllocator).unwrap()
    }

    #[test]
    fn test_isolated_panic_is_reported() {
        let handler = PanicHandler::new(PanicStrategy::Isolate);
        let t = task(|| panic!("boom"));
        let id = t.id;

        let info = handler.run(t).unwrap_err();
        assert_eq!(info.message, "boom");
        assert_eq!(info.task, id);
        assert_eq!(handler.panic_count(), 1);
    }

    #[test]
    fn test_clean_task_is_not_counted() {
        let handler = PanicHandler::default();
        assert!(handler.run(task(|| {})).is_ok());
        assert_eq!(handler.panic_count(), 0);
        assert_eq!(handler.strategy(), PanicStrategy::LogAndContinue);
    }

    #[test]
    fn test_formatted_message_and_reset() {
        let handler = PanicHandler::new(PanicStrategy::LogAndContinue);

        let info = handler.run(task(|| panic!("code {}", 7))).unwrap_err();
        assert_eq!(info.message, "code 7");

        handler.reset_count();
        assert_eq!(handler.panic_count(), 0);
    }
}
