//! Detached background tasks (store-after-return, tile revalidation).
//!
//! Tasks are spawned onto the current tokio runtime and never observed by the
//! request that triggered them: their errors are logged inside the task and
//! swallowed. Handles are kept only so tests and shutdown can wait for the
//! queue to drain via [`BackgroundTasks::settle`].

use std::future::Future;
use std::sync::{Mutex, PoisonError};

use tokio::task::JoinHandle;

#[derive(Debug, Default)]
pub(crate) struct BackgroundTasks {
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl BackgroundTasks {
    pub(crate) fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(task);
        let mut handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
    }

    /// Number of tasks that have not finished yet.
    pub(crate) fn pending(&self) -> usize {
        let handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        handles.iter().filter(|h| !h.is_finished()).count()
    }

    /// Wait until every spawned task, including ones spawned meanwhile, is done.
    pub(crate) async fn settle(&self) {
        loop {
            let drained = std::mem::take(&mut *self.handles.lock().unwrap_or_else(PoisonError::into_inner));
            if drained.is_empty() {
                return;
            }
            for handle in drained {
                if let Err(e) = handle.await {
                    tracing::warn!(error = %e, "background task panicked");
                }
            }
        }
    }
}
