//! Tracked background jobs.
//!
//! Each job is keyed by a caller-chosen uuid, can be cancelled on its own,
//! reports progress through a callback, and records exactly one terminal
//! state that stays readable after the task is gone until the caller
//! forgets the job.

use crate::error::{ClientError, Result};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::AbortHandle;
use tracing::{debug, info};
use uuid::Uuid;

pub type JobId = Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Running,
    /// Finished with a short description of the result
    Succeeded(String),
    Failed(String),
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobState::Running)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobProgress {
    Started,
    Finished(JobState),
}

pub type ProgressCallback = Arc<dyn Fn(JobId, JobProgress) + Send + Sync>;

struct JobEntry {
    state: JobState,
    abort: Option<AbortHandle>,
    on_progress: ProgressCallback,
}

/// Registry of background jobs.
#[derive(Clone, Default)]
pub struct JobRegistry {
    jobs: Arc<Mutex<HashMap<JobId, JobEntry>>>,
}

/// New random job id.
pub fn new_job_id() -> JobId {
    Uuid::new_v4()
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` in the background under `id`.
    ///
    /// Fails when `id` is already registered.
    pub async fn spawn<F>(&self, id: JobId, task: F, on_progress: ProgressCallback) -> Result<()>
    where
        F: Future<Output = Result<String>> + Send + 'static,
    {
        let mut jobs = self.jobs.lock().await;
        if jobs.contains_key(&id) {
            return Err(ClientError::Internal(format!("job {} already exists", id)));
        }

        on_progress(id, JobProgress::Started);
        let registry = self.clone();
        // The entry is inserted before the lock is released, so the task
        // always finds it when it finishes.
        let handle = tokio::spawn(async move {
            let state = match task.await {
                Ok(summary) => JobState::Succeeded(summary),
                Err(e) => JobState::Failed(e.to_string()),
            };
            registry.finish(id, state).await;
        });
        jobs.insert(
            id,
            JobEntry {
                state: JobState::Running,
                abort: Some(handle.abort_handle()),
                on_progress,
            },
        );
        debug!("Job {} started", id);
        Ok(())
    }

    /// Store the terminal state unless one is already stored.
    async fn finish(&self, id: JobId, state: JobState) -> bool {
        let callback = {
            let mut jobs = self.jobs.lock().await;
            let Some(entry) = jobs.get_mut(&id) else {
                return false;
            };
            if entry.state.is_terminal() {
                return false;
            }
            entry.state = state.clone();
            entry.abort = None;
            Arc::clone(&entry.on_progress)
        };

        info!("Job {} finished: {:?}", id, state);
        callback(id, JobProgress::Finished(state));
        true
    }

    /// Abort a running job. Returns false when it already finished or is unknown.
    pub async fn cancel(&self, id: JobId) -> bool {
        let abort = {
            let jobs = self.jobs.lock().await;
            match jobs.get(&id) {
                Some(entry) if !entry.state.is_terminal() => entry.abort.clone(),
                _ => return false,
            }
        };

        let cancelled = self.finish(id, JobState::Cancelled).await;
        if cancelled && let Some(abort) = abort {
            abort.abort();
        }
        cancelled
    }

    pub async fn state(&self, id: JobId) -> Option<JobState> {
        self.jobs.lock().await.get(&id).map(|entry| entry.state.clone())
    }

    /// Drop a finished job and return its terminal state.
    ///
    /// Running jobs are kept and yield `None`, as do unknown ids.
    pub async fn forget(&self, id: JobId) -> Option<JobState> {
        let mut jobs = self.jobs.lock().await;
        if !jobs.get(&id)?.state.is_terminal() {
            return None;
        }
        let entry = jobs.remove(&id)?;
        debug!("Job {} forgotten", id);
        Some(entry.state)
    }

    /// Number of jobs still held, running or finished.
    pub async fn len(&self) -> usize {
        self.jobs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
