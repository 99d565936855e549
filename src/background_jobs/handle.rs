use super::job::{BackgroundJob, JobSchedule};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Lifecycle of one registered job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    /// Registered but the scheduler has not been started.
    Idle,
    /// Waiting for the next run.
    Armed { next_fire_in: Duration },
    Running,
    /// Stopped by a shutdown request.
    Cancelled,
    /// Stopped because the next run could not be scheduled.
    Failed { reason: String },
}

impl JobState {
    pub fn is_armed(&self) -> bool {
        matches!(self, JobState::Armed { .. })
    }

    /// Whether the job will never run again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Cancelled | JobState::Failed { .. })
    }
}

/// In-memory run bookkeeping for one job. Nothing here survives a restart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobStatus {
    pub state: JobState,
    pub executions: u64,
    pub failures: u64,
    pub last_finished_at: Option<DateTime<Utc>>,
}

impl Default for JobStatus {
    fn default() -> Self {
        Self {
            state: JobState::Idle,
            executions: 0,
            failures: 0,
            last_finished_at: None,
        }
    }
}

/// Information about a registered job.
#[derive(Debug, Clone)]
pub struct JobInfo {
    pub id: String,
    pub name: String,
    pub description: String,
    pub schedule: JobSchedule,
    pub status: JobStatus,
}

pub(super) struct RegisteredJob {
    pub job: Arc<dyn BackgroundJob>,
    pub status: JobStatus,
}

/// Shared state between scheduler, job drivers and handles.
#[derive(Default)]
pub struct SharedJobState {
    pub(super) jobs: HashMap<String, RegisteredJob>,
}

impl SharedJobState {
    pub(super) fn status_mut(&mut self, job_id: &str) -> Option<&mut JobStatus> {
        self.jobs.get_mut(job_id).map(|entry| &mut entry.status)
    }
}

/// Read-only view of the scheduler's job table.
#[derive(Clone)]
pub struct SchedulerHandle {
    shared_state: Arc<RwLock<SharedJobState>>,
}

impl SchedulerHandle {
    pub(super) fn new(shared_state: Arc<RwLock<SharedJobState>>) -> Self {
        Self { shared_state }
    }

    /// Get information about all registered jobs, ordered by id.
    pub async fn list_jobs(&self) -> Vec<JobInfo> {
        let state = self.shared_state.read().await;
        let mut jobs: Vec<JobInfo> = state
            .jobs
            .iter()
            .map(|(id, entry)| JobInfo {
                id: id.clone(),
                name: entry.job.name().to_string(),
                description: entry.job.description().to_string(),
                schedule: entry.job.schedule(),
                status: entry.status.clone(),
            })
            .collect();
        jobs.sort_by(|a, b| a.id.cmp(&b.id));
        jobs
    }

    pub async fn job_status(&self, job_id: &str) -> Option<JobStatus> {
        let state = self.shared_state.read().await;
        state.jobs.get(job_id).map(|entry| entry.status.clone())
    }

    /// Check if a specific job is currently running.
    pub async fn is_job_running(&self, job_id: &str) -> bool {
        self.job_status(job_id)
            .await
            .map(|status| status.state == JobState::Running)
            .unwrap_or(false)
    }
}
