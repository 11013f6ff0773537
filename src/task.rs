//! Background processing tasks
//!
//! Long-running work (patch inference, inpainting) runs on tokio's blocking
//! pool. The owner keeps a [`ProcessingTask`] handle and either polls it from
//! its own loop or joins it; the result always carries the session identity
//! it was started for and the elapsed wall-clock time.

use crate::error::{DustRemovalError, Result};
use futures::FutureExt;
use instant::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::task::{JoinError, JoinHandle};
use uuid::Uuid;

/// Kind of background operation; one of each may be in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Detection,
    Removal,
}

impl TaskKind {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Detection => "Detection",
            Self::Removal => "Removal",
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Successful task result
#[derive(Debug, Clone)]
pub struct TaskOutput<T> {
    /// Session the task was started for
    pub session_id: Uuid,
    pub value: T,
    /// Time spent inside the task body
    pub elapsed: Duration,
}

/// Handle to work running on the blocking pool
#[derive(Debug)]
pub struct ProcessingTask<T> {
    kind: TaskKind,
    session_id: Uuid,
    handle: JoinHandle<(Result<T>, Duration)>,
}

impl<T: Send + 'static> ProcessingTask<T> {
    /// Run `work` on the blocking pool of `runtime`
    pub fn spawn<F>(runtime: &Handle, kind: TaskKind, session_id: Uuid, work: F) -> Self
    where
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        log::debug!("Starting {kind} task for session {session_id}");
        let handle = runtime.spawn_blocking(move || {
            let start = Instant::now();
            let result = work();
            (result, start.elapsed())
        });
        Self {
            kind,
            session_id,
            handle,
        }
    }

    #[must_use]
    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    #[must_use]
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Take the result if the task has finished, without blocking
    pub fn try_take(&mut self) -> Option<Result<TaskOutput<T>>> {
        if !self.handle.is_finished() {
            return None;
        }
        (&mut self.handle)
            .now_or_never()
            .map(|joined| Self::finish(self.kind, self.session_id, joined))
    }

    /// Block the calling thread until the task finishes
    ///
    /// # Errors
    /// - The task body failed
    /// - The task panicked or was cancelled
    pub fn join(self) -> Result<TaskOutput<T>> {
        let Self {
            kind,
            session_id,
            handle,
            ..
        } = self;
        Self::finish(kind, session_id, futures::executor::block_on(handle))
    }

    /// Wait for the task from async code
    ///
    /// # Errors
    /// - The task body failed
    /// - The task panicked or was cancelled
    pub async fn wait(self) -> Result<TaskOutput<T>> {
        let joined = self.handle.await;
        Self::finish(self.kind, self.session_id, joined)
    }

    fn finish(
        kind: TaskKind,
        session_id: Uuid,
        joined: std::result::Result<(Result<T>, Duration), JoinError>,
    ) -> Result<TaskOutput<T>> {
        let (result, elapsed) = joined.map_err(|e| {
            DustRemovalError::internal(format!("{kind} task did not complete: {e}"))
        })?;
        match result {
            Ok(value) => {
                log::debug!(
                    "{kind} task finished in {:.0}ms",
                    elapsed.as_secs_f64() * 1000.0
                );
                Ok(TaskOutput {
                    session_id,
                    value,
                    elapsed,
                })
            },
            Err(e) => {
                log::debug!("{kind} task failed: {e}");
                Err(e)
            },
        }
    }
}
