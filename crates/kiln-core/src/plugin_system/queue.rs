//! Bounded worker pool used by the concurrent batch operations.
use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::constants::DEFAULT_WORKERS;
use crate::error::{Error, ErrorList, Result};
use crate::plugin_system::loader::panic_message;

/// Runs at most `workers` jobs at a time on the tokio runtime.
///
/// Cloning a queue shares its permits, so several batches submitted to the
/// same queue compete for the same workers.
#[derive(Debug, Clone)]
pub struct TaskQueue {
    permits: Arc<Semaphore>,
    workers: usize,
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new(DEFAULT_WORKERS)
    }
}

impl TaskQueue {
    /// A queue with `workers` workers. Zero is treated as one.
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            permits: Arc::new(Semaphore::new(workers)),
            workers,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Workers not currently running a job.
    pub fn idle(&self) -> usize {
        self.permits.available_permits()
    }

    /// Submit a job. It starts once a worker is free.
    pub fn spawn<F, T>(&self, job: F) -> JoinHandle<Result<T>>
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        tokio::spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|_| Error::Internal("task queue closed".to_string()))?;
            job.await
        })
    }

    /// Wait for every handle and collect the failures.
    ///
    /// Returns the successful outputs in submission order alongside the
    /// errors, so callers can apply partial results.
    pub async fn join<T>(handles: Vec<JoinHandle<Result<T>>>) -> (Vec<T>, ErrorList) {
        let errors = ErrorList::new();
        let mut outputs = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(Ok(output)) => outputs.push(output),
                Ok(Err(e)) => errors.push_error(e),
                Err(join_error) => errors.push_error(match join_error.try_into_panic() {
                    Ok(payload) => Error::Panicked {
                        operation: "task",
                        message: panic_message(payload.as_ref()),
                    },
                    Err(join_error) => Error::Internal(join_error.to_string()),
                }),
            }
        }
        (outputs, errors)
    }
}
