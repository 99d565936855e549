//! Start and stop of all recurring jobs.
//!
//! The [`Coordinator`] owns the scheduler; the cloneable [`ShutdownHandle`]
//! runs the teardown sequence exactly once, whoever asks first: the dump job
//! or a host signal.

use crate::background_jobs::jobs::{ContactsDumpJob, PhoneUpdaterJob};
use crate::background_jobs::{JobContext, JobScheduler, SchedulerHandle};
use crate::config::SchedulingSettings;
use crate::contact_store::ContactStore;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Who asked for the shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownTrigger {
    /// Host termination signal.
    External,
    /// The dump job finished its report.
    ReportCompleted,
    /// The dump job could not read the contacts.
    ReportFailed,
}

impl fmt::Display for ShutdownTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownTrigger::External => write!(f, "external signal"),
            ShutdownTrigger::ReportCompleted => write!(f, "report completed"),
            ShutdownTrigger::ReportFailed => write!(f, "report failed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownStep {
    UninstallRetention,
}

impl fmt::Display for ShutdownStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownStep::UninstallRetention => write!(f, "uninstall retention"),
        }
    }
}

/// One teardown step that did not complete. The remaining steps still run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Shutdown step '{step}' failed: {message}")]
pub struct ShutdownStepFailure {
    pub step: ShutdownStep,
    pub message: String,
}

/// Result of the one shutdown sequence that ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    pub trigger: ShutdownTrigger,
    pub failures: Vec<ShutdownStepFailure>,
    pub exit_code: i32,
}

struct ShutdownState {
    started: AtomicBool,
    token: CancellationToken,
    store: Arc<dyn ContactStore>,
    exit_tx: watch::Sender<Option<i32>>,
}

/// Idempotent entry point of the shutdown sequence.
#[derive(Clone)]
pub struct ShutdownHandle {
    inner: Arc<ShutdownState>,
}

impl ShutdownHandle {
    pub fn new(token: CancellationToken, store: Arc<dyn ContactStore>) -> Self {
        let (exit_tx, _) = watch::channel(None);
        Self {
            inner: Arc::new(ShutdownState {
                started: AtomicBool::new(false),
                token,
                store,
                exit_tx,
            }),
        }
    }

    /// Runs the shutdown sequence if no one has started it yet.
    ///
    /// Cancels every scheduled run without waiting for a run in progress,
    /// then removes the retention mechanism, then publishes the exit code:
    /// 0 when every step succeeded and the trigger was not a failure, 1
    /// otherwise. Returns `None` for every call but the first.
    ///
    /// Blocking: the uninstall step is a store call.
    pub fn shutdown(&self, trigger: ShutdownTrigger) -> Option<ShutdownReport> {
        if self
            .inner
            .started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            info!("Shutdown already in progress, ignoring {}", trigger);
            return None;
        }

        info!("Shutting down ({})...", trigger);
        let mut failures = Vec::new();

        self.inner.token.cancel();
        info!("Cancelled all scheduled jobs");

        match self.inner.store.uninstall_retention() {
            Ok(()) => info!("Phone retention mechanism removed"),
            Err(e) => {
                let failure = ShutdownStepFailure {
                    step: ShutdownStep::UninstallRetention,
                    message: e.to_string(),
                };
                error!("{}", failure);
                failures.push(failure);
            }
        }

        let exit_code = if failures.is_empty() && trigger != ShutdownTrigger::ReportFailed {
            0
        } else {
            1
        };
        info!("Shutdown complete, exit code {}", exit_code);
        self.inner.exit_tx.send_replace(Some(exit_code));

        Some(ShutdownReport {
            trigger,
            failures,
            exit_code,
        })
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.started.load(Ordering::SeqCst)
    }

    /// The exit code, once the shutdown sequence has finished.
    pub fn exit_code(&self) -> Option<i32> {
        *self.inner.exit_tx.borrow()
    }

    /// Waits until the shutdown sequence has finished and returns its exit code.
    pub async fn wait_for_exit(&self) -> i32 {
        let mut exit_rx = self.inner.exit_tx.subscribe();
        let code = match exit_rx.wait_for(|code| code.is_some()).await {
            Ok(code) => (*code).unwrap_or(1),
            Err(_) => 1,
        };
        code
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.inner.token.clone()
    }
}

/// Owns both recurring jobs and their scheduler.
pub struct Coordinator {
    scheduler: JobScheduler,
    shutdown: ShutdownHandle,
}

impl Coordinator {
    /// Builds the scheduler with the phone updater and the contacts dump
    /// registered. Nothing runs until [`Coordinator::start_all`].
    pub async fn new(store: Arc<dyn ContactStore>, settings: &SchedulingSettings) -> Self {
        let token = CancellationToken::new();
        let shutdown = ShutdownHandle::new(token.clone(), Arc::clone(&store));
        let mut scheduler =
            JobScheduler::new(JobContext::new(token, store), settings.worker_slots);

        scheduler
            .register_job(Arc::new(PhoneUpdaterJob::new(
                Duration::from_millis(settings.phone_update_min_ms),
                Duration::from_millis(settings.phone_update_max_ms),
                settings.max_contacts_to_update,
            )))
            .await;
        scheduler
            .register_job(Arc::new(ContactsDumpJob::new(
                settings.dump_period,
                settings.retention_window,
                shutdown.clone(),
            )))
            .await;

        Self {
            scheduler,
            shutdown,
        }
    }

    /// Arms both jobs and returns immediately.
    ///
    /// The retention mechanism is expected to be installed already, as part of
    /// database preparation.
    pub async fn start_all(&mut self) {
        if self.shutdown.is_shutting_down() {
            warn!("Not starting jobs: shutdown already requested");
            return;
        }
        self.scheduler.start().await;
        info!("All jobs started");
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    pub fn scheduler_handle(&self) -> SchedulerHandle {
        self.scheduler.handle()
    }

    /// Waits for the shutdown sequence to finish and returns the exit code.
    pub async fn wait_for_exit(&self) -> i32 {
        self.shutdown.wait_for_exit().await
    }

    /// Waits up to `timeout` for the job drivers to stop after shutdown.
    pub async fn wait_for_jobs(&mut self, timeout: Duration) -> bool {
        self.scheduler.wait_for_jobs(timeout).await
    }
}
