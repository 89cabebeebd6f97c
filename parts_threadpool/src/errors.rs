use thiserror::Error;
use tokio::task::JoinError;
use tracing::error;

/// Define an error time for spawning external threads.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MultithreadedRuntimeError {
    #[error("Error Initializing Multithreaded Runtime: {0:?}")]
    RuntimeInitializationError(std::io::Error),

    #[error("Task Panic: {0:?}.")]
    TaskPanic(JoinError),

    #[error("Task cancelled; possible runtime shutdown in progress ({0}).")]
    TaskCanceled(String),

    #[error("Unknown task runtime error: {0}")]
    Other(String),
}

impl From<JoinError> for MultithreadedRuntimeError {
    fn from(err: JoinError) -> Self {
        if err.is_panic() {
            // The task panic'd.  Pass this exception on.
            error!("Panic reported on worker task: {err:?}");
            MultithreadedRuntimeError::TaskPanic(err)
        } else if err.is_cancelled() {
            // Likely caused by the runtime shutting down.
            MultithreadedRuntimeError::TaskCanceled(format!("{err}"))
        } else {
            MultithreadedRuntimeError::Other(format!("{err}"))
        }
    }
}

pub type Result<T> = std::result::Result<T, MultithreadedRuntimeError>;
