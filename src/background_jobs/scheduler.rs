use super::context::JobContext;
use super::handle::{JobState, RegisteredJob, SchedulerHandle, SharedJobState};
use super::job::{BackgroundJob, JobError};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{RwLock, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Manages background job scheduling and execution.
///
/// Every registered job gets its own driver task that sleeps until the next
/// fire time, takes one of the shared execution slots and runs the job on the
/// blocking pool.
pub struct JobScheduler {
    /// Shared state accessible by SchedulerHandle
    shared_state: Arc<RwLock<SharedJobState>>,

    /// Driver task of each started job.
    running_handles: HashMap<String, JoinHandle<()>>,

    /// Bounds how many job runs execute at the same time.
    slots: Arc<Semaphore>,

    /// Shared context provided to jobs during execution. Its token doubles as
    /// the scheduler's shutdown signal.
    job_context: JobContext,
}

impl JobScheduler {
    pub fn new(job_context: JobContext, worker_slots: usize) -> Self {
        Self {
            shared_state: Arc::new(RwLock::new(SharedJobState::default())),
            running_handles: HashMap::new(),
            slots: Arc::new(Semaphore::new(worker_slots.max(1))),
            job_context,
        }
    }

    /// Register a job with the scheduler.
    pub async fn register_job(&mut self, job: Arc<dyn BackgroundJob>) {
        let job_id = job.id().to_string();
        info!(
            "Registering job: {} - {} ({})",
            job_id,
            job.description(),
            job.schedule()
        );
        let mut state = self.shared_state.write().await;
        state.jobs.insert(
            job_id,
            RegisteredJob {
                job,
                status: Default::default(),
            },
        );
    }

    /// Get the number of registered jobs.
    pub async fn job_count(&self) -> usize {
        self.shared_state.read().await.jobs.len()
    }

    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle::new(Arc::clone(&self.shared_state))
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.job_context.cancellation_token.clone()
    }

    /// Arms every registered job and returns without waiting for any run.
    /// Jobs that are already started are left alone.
    pub async fn start(&mut self) {
        let jobs: Vec<Arc<dyn BackgroundJob>> = {
            let state = self.shared_state.read().await;
            state
                .jobs
                .values()
                .map(|entry| Arc::clone(&entry.job))
                .collect()
        };
        info!("Starting job scheduler with {} registered jobs", jobs.len());

        for job in jobs {
            let job_id = job.id().to_string();
            if self.running_handles.contains_key(&job_id) {
                warn!("Job {} is already started", job_id);
                continue;
            }
            let driver = JobDriver {
                job,
                ctx: self.job_context.clone(),
                slots: Arc::clone(&self.slots),
                shared_state: Arc::clone(&self.shared_state),
            };
            self.running_handles
                .insert(job_id, tokio::spawn(driver.run()));
        }
    }

    /// Waits for all job drivers to stop, up to `timeout`. Returns whether
    /// they all did.
    ///
    /// Drivers only stop on cancellation or on a scheduling failure; a driver
    /// whose job is in the middle of a run stops once that run returns.
    pub async fn wait_for_jobs(&mut self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut all_stopped = true;
        for (job_id, handle) in self.running_handles.drain() {
            match tokio::time::timeout_at(deadline, handle).await {
                Ok(Ok(())) => debug!("Driver of job {} stopped", job_id),
                Ok(Err(e)) => error!("Driver of job {} panicked: {}", job_id, e),
                Err(_) => {
                    warn!("Driver of job {} did not stop in time", job_id);
                    all_stopped = false;
                }
            }
        }
        all_stopped
    }
}

/// Runs one job on its schedule until cancelled or until its schedule fails.
struct JobDriver {
    job: Arc<dyn BackgroundJob>,
    ctx: JobContext,
    slots: Arc<Semaphore>,
    shared_state: Arc<RwLock<SharedJobState>>,
}

impl JobDriver {
    async fn run(self) {
        let job_id = self.job.id();
        let schedule = self.job.schedule();
        let mut rng = StdRng::from_os_rng();

        let mut fire_at = match schedule.initial_fire(Instant::now(), &mut rng) {
            Ok(at) => at,
            Err(e) => {
                error!("Job {} could not be scheduled: {}", job_id, e);
                self.set_state(JobState::Failed {
                    reason: e.to_string(),
                })
                .await;
                return;
            }
        };
        let next_fire_in = fire_at.saturating_duration_since(Instant::now());
        info!("Job {} armed, first run in {:?}", job_id, next_fire_in);
        self.set_state(JobState::Armed { next_fire_in }).await;

        loop {
            let token = &self.ctx.cancellation_token;
            tokio::select! {
                _ = tokio::time::sleep_until(fire_at.into()) => {}
                _ = token.cancelled() => {
                    info!("Job {} cancelled while armed", job_id);
                    self.set_state(JobState::Cancelled).await;
                    return;
                }
            }

            let permit = tokio::select! {
                permit = Arc::clone(&self.slots).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => {
                        self.set_state(JobState::Cancelled).await;
                        return;
                    }
                },
                _ = token.cancelled() => {
                    info!("Job {} cancelled while waiting for a slot", job_id);
                    self.set_state(JobState::Cancelled).await;
                    return;
                }
            };

            self.set_state(JobState::Running).await;
            debug!("Starting job: {}", job_id);

            let job = Arc::clone(&self.job);
            let ctx = self.ctx.clone();
            let start_time = Instant::now();
            let result = tokio::task::spawn_blocking(move || job.execute(&ctx)).await;
            drop(permit);
            let finished_at = Instant::now();
            let elapsed = finished_at - start_time;

            let failed = match result {
                Ok(Ok(())) => {
                    debug!("Job {} completed successfully in {:?}", job_id, elapsed);
                    false
                }
                Ok(Err(JobError::Cancelled)) => {
                    info!("Job {} was cancelled after {:?}", job_id, elapsed);
                    false
                }
                Ok(Err(e)) => {
                    error!("Job {} failed after {:?}: {}", job_id, elapsed, e);
                    true
                }
                Err(e) => {
                    error!("Job {} panicked after {:?}: {}", job_id, elapsed, e);
                    true
                }
            };

            if self.ctx.is_cancelled() {
                info!("Job {} stopped after its last run", job_id);
                self.record_run(failed, JobState::Cancelled).await;
                return;
            }

            match schedule.next_fire(fire_at, finished_at, &mut rng) {
                Ok(next) => {
                    fire_at = next;
                    let next_fire_in = fire_at.saturating_duration_since(Instant::now());
                    info!("Job {} re-armed, next run in {:?}", job_id, next_fire_in);
                    self.record_run(failed, JobState::Armed { next_fire_in })
                        .await;
                }
                Err(e) => {
                    error!("Job {} could not be re-armed and stops: {}", job_id, e);
                    self.record_run(
                        failed,
                        JobState::Failed {
                            reason: e.to_string(),
                        },
                    )
                    .await;
                    return;
                }
            }
        }
    }

    async fn set_state(&self, new_state: JobState) {
        let mut state = self.shared_state.write().await;
        if let Some(status) = state.status_mut(self.job.id()) {
            status.state = new_state;
        }
    }

    /// Counts a finished run and moves to `new_state` in one step, so readers
    /// never see the count without the state that follows it.
    async fn record_run(&self, failed: bool, new_state: JobState) {
        let mut state = self.shared_state.write().await;
        if let Some(status) = state.status_mut(self.job.id()) {
            status.executions += 1;
            if failed {
                status.failures += 1;
            }
            status.last_finished_at = Some(chrono::Utc::now());
            status.state = new_state;
        }
    }
}
