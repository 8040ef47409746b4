use super::Executor;

/// Keeps an executor's outstanding-work count raised while alive.
///
/// Contexts that run until they are out of work (see
/// [`EventLoop::run`](super::EventLoop::run) and
/// [`ThreadPool::join`](super::ThreadPool::join)) stay alive as long as a
/// guard on one of their executors exists.
#[derive(Debug)]
pub struct WorkGuard<E: Executor> {
    executor: Option<E>,
}

impl<E: Executor> WorkGuard<E> {
    pub fn new(executor: E) -> Self {
        executor.on_work_started();
        Self {
            executor: Some(executor),
        }
    }

    /// The guarded executor, `None` after [`WorkGuard::reset`].
    pub fn executor(&self) -> Option<&E> {
        self.executor.as_ref()
    }

    pub fn owns_work(&self) -> bool {
        self.executor.is_some()
    }

    /// Release the work early.
    pub fn reset(&mut self) {
        if let Some(executor) = self.executor.take() {
            executor.on_work_finished();
        }
    }
}

impl<E: Executor> Drop for WorkGuard<E> {
    fn drop(&mut self) {
        self.reset();
    }
}
