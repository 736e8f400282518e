//! Background scan jobs. At most one scan runs per collection; the caller
//! gets a handle to await and can poll the status while it runs.

use crate::error::AppError;
use crate::store::NoteStore;
use crate::sync::{self, ProgressSnapshot, ScanProgress, SyncOutcome, SyncPlan};
use crate::tagger::TagPolicy;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobStatus {
    Idle,
    Running {
        query: String,
        progress: ProgressSnapshot,
    },
    Finished {
        query: String,
        outcome: SyncOutcome,
        summary: String,
    },
    Failed {
        query: String,
        error: String,
    },
}

enum JobState {
    Idle,
    Running {
        query: String,
        progress: Arc<ScanProgress>,
    },
    Done(JobStatus),
}

pub struct ScanHandle {
    pub policy: TagPolicy,
    completion: oneshot::Receiver<Result<SyncOutcome, AppError>>,
}

impl ScanHandle {
    pub async fn wait(self) -> Result<SyncOutcome, AppError> {
        self.completion
            .await
            .map_err(|_| AppError::Generic("scan ended without reporting".to_string()))?
    }
}

#[derive(Clone)]
pub struct ScanJobs {
    store: Arc<dyn NoteStore>,
    progress_interval: usize,
    state: Arc<Mutex<JobState>>,
}

impl ScanJobs {
    pub fn new(store: Arc<dyn NoteStore>, progress_interval: usize) -> Self {
        Self {
            store,
            progress_interval,
            state: Arc::new(Mutex::new(JobState::Idle)),
        }
    }

    pub fn store(&self) -> Arc<dyn NoteStore> {
        self.store.clone()
    }

    pub fn status(&self) -> Result<JobStatus, AppError> {
        let state = self.lock()?;
        Ok(match &*state {
            JobState::Idle => JobStatus::Idle,
            JobState::Running { query, progress } => JobStatus::Running {
                query: query.clone(),
                progress: progress.snapshot(),
            },
            JobState::Done(status) => status.clone(),
        })
    }

    pub fn start(&self, plan: SyncPlan) -> Result<ScanHandle, AppError> {
        self.start_with(plan, |_| {})
    }

    /// Starts a scan in the background. `on_complete` runs once the scan
    /// has finished, with the final status, before the handle resolves.
    pub fn start_with<F>(&self, plan: SyncPlan, on_complete: F) -> Result<ScanHandle, AppError>
    where
        F: FnOnce(&JobStatus) + Send + 'static,
    {
        let progress = Arc::new(ScanProgress::new(self.progress_interval));
        {
            let mut state = self.lock()?;
            if matches!(*state, JobState::Running { .. }) {
                log::warn!("Scan requested while another is running");
                return Err(AppError::Busy);
            }
            *state = JobState::Running {
                query: plan.query.clone(),
                progress: progress.clone(),
            };
        }

        let (tx, rx) = oneshot::channel();
        let policy = plan.policy.clone();
        let store = self.store.clone();
        let state = self.state.clone();
        let query = plan.query.clone();
        let policy_for_summary = plan.policy.clone();

        log::info!("{} (query: {:?})", sync::PROGRESS_LABEL, query);
        tokio::spawn(async move {
            let result = sync::synchronize(store, plan, progress).await;

            let status = match &result {
                Ok(outcome) => JobStatus::Finished {
                    query,
                    outcome: outcome.clone(),
                    summary: outcome.summary(&policy_for_summary),
                },
                Err(e) => {
                    log::error!("Scan failed: {}", e);
                    JobStatus::Failed {
                        query,
                        error: e.to_string(),
                    }
                }
            };

            match state.lock() {
                Ok(mut guard) => *guard = JobState::Done(status.clone()),
                Err(poisoned) => *poisoned.into_inner() = JobState::Done(status.clone()),
            }
            on_complete(&status);

            if tx.send(result).is_err() {
                log::debug!("Scan finished after its handle was dropped");
            }
        });

        Ok(ScanHandle {
            policy,
            completion: rx,
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, JobState>, AppError> {
        self.state
            .lock()
            .map_err(|_| AppError::Generic("scan job state lock poisoned".to_string()))
    }
}
