pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("executor error: {0}")]
    Executor(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("execution context has been shut down")]
    Shutdown,

    #[error("queue full (capacity {capacity})")]
    QueueFull { capacity: usize },

    #[error("allocation of {size} bytes (align {align}) failed")]
    AllocationFailed { size: usize, align: usize },

    #[error("handler was dropped before it ran")]
    Cancelled,

    #[error("system executor not initialized")]
    NotInitialized,

    #[error("already initialized")]
    AlreadyInitialized,
}

impl Error {
    pub fn executor<S: Into<String>>(msg: S) -> Self {
        Error::Executor(msg.into())
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    pub(crate) fn allocation(layout: std::alloc::Layout) -> Self {
        Error::AllocationFailed {
            size: layout.size(),
            align: layout.align(),
        }
    }

    /// Whether the error means the target will never accept work again.
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Error::Shutdown)
    }
}
