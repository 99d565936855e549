//! Phone updater background job.
//!
//! Every run rewrites the phone of a small random set of contacts. The delay
//! until the next run is redrawn after each run.

use crate::background_jobs::{
    context::JobContext,
    job::{BackgroundJob, JobError, JobSchedule},
};
use crate::contact_store::{ContactStore, StoreError};
use crate::generator::random_phone;
use rand::Rng;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Outcome of one batch of phone updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchReport {
    /// Number of contacts requested from the store.
    pub requested: usize,
    /// Ids actually returned by the store.
    pub selected: usize,
    pub updated: usize,
    pub failed: usize,
}

pub struct PhoneUpdaterJob {
    min_delay: Duration,
    max_delay: Duration,
    max_contacts_to_update: usize,
}

impl PhoneUpdaterJob {
    pub fn new(min_delay: Duration, max_delay: Duration, max_contacts_to_update: usize) -> Self {
        Self {
            min_delay,
            max_delay,
            max_contacts_to_update,
        }
    }

    /// Updates `1 + uniform(0, max_contacts_to_update)` random contacts.
    ///
    /// Each update is its own unit of work: a failing id is logged and skipped.
    /// Only a failure to select ids fails the whole batch.
    pub fn update_batch<R: Rng + ?Sized>(
        &self,
        store: &dyn ContactStore,
        rng: &mut R,
    ) -> Result<BatchReport, StoreError> {
        let requested = 1 + rng.random_range(0..self.max_contacts_to_update.max(1));
        info!("Updating phone numbers of {} contacts", requested);

        let ids = store.random_ids(requested)?;
        let mut report = BatchReport {
            requested,
            selected: ids.len(),
            updated: 0,
            failed: 0,
        };

        for id in ids {
            let phone = random_phone(rng);
            match store.update_phone(id, &phone) {
                Ok(()) => {
                    debug!("Updated contact {} with phone {}", id, phone);
                    report.updated += 1;
                }
                Err(e) => {
                    warn!("Failed to update phone of contact {}: {}", id, e);
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }
}

impl BackgroundJob for PhoneUpdaterJob {
    fn id(&self) -> &'static str {
        "phone_updater"
    }

    fn name(&self) -> &'static str {
        "Phone Updater"
    }

    fn description(&self) -> &'static str {
        "Rewrite the phone number of a few random contacts"
    }

    fn schedule(&self) -> JobSchedule {
        JobSchedule::Jittered {
            min: self.min_delay,
            max: self.max_delay,
        }
    }

    fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        // A run that has not started yet is skipped; one that has is finished
        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        let report = self
            .update_batch(ctx.contact_store.as_ref(), &mut rand::rng())
            .map_err(|e| JobError::ExecutionFailed(format!("Failed to select contacts: {}", e)))?;

        info!(
            "Phone update finished: {} updated, {} failed",
            report.updated, report.failed
        );
        Ok(())
    }
}
