//! Background job scheduling and execution system.
//!
//! This module provides the infrastructure for the recurring jobs: schedules,
//! the per-job drivers, execution slots and in-memory run status.

mod context;
mod handle;
mod job;
pub mod jobs;
mod scheduler;

pub use context::JobContext;
pub use handle::{JobInfo, JobState, JobStatus, SchedulerHandle};
pub use job::{BackgroundJob, JobError, JobSchedule};
pub use scheduler::JobScheduler;
