//! Contacts dump background job.
//!
//! Logs every contact next to its latest phone change inside the retention
//! window, then asks the coordinator to shut down.

use crate::background_jobs::{
    context::JobContext,
    job::{BackgroundJob, JobError, JobSchedule},
};
use crate::contact_store::{ContactWithHistory, RetentionWindow};
use crate::coordinator::{ShutdownHandle, ShutdownTrigger};
use std::time::Duration;
use tracing::{error, info};

const CHANGED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Totals printed under the report table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportSummary {
    pub total: usize,
    pub with_history: usize,
    pub without_history: usize,
}

impl ReportSummary {
    pub fn of(rows: &[ContactWithHistory]) -> Self {
        let with_history = rows.iter().filter(|r| r.previous.is_some()).count();
        Self {
            total: rows.len(),
            with_history,
            without_history: rows.len() - with_history,
        }
    }
}

/// Renders the fixed-width report, one line per entry: a header, one row per
/// contact and the summary.
pub fn format_report(rows: &[ContactWithHistory]) -> Vec<String> {
    let mut lines = Vec::with_capacity(rows.len() + 3);
    lines.push(format!(
        "{:<6} | {:<15} | {:<13} | {:<14} | {:<20}",
        "ID", "Name", "Current phone", "Previous phone", "Changed at"
    ));
    for row in rows {
        let (previous, changed_at) = match &row.previous {
            Some(change) => (
                change.old_phone.clone(),
                change.changed_at.format(CHANGED_AT_FORMAT).to_string(),
            ),
            None => ("N/A".to_string(), "N/A".to_string()),
        };
        lines.push(format!(
            "{:<6} | {:<15} | {:<13} | {:<14} | {:<20}",
            row.contact.id, row.contact.name, row.contact.phone, previous, changed_at
        ));
    }
    let summary = ReportSummary::of(rows);
    lines.push(format!(
        "Total contacts: {} (with history: {}, without history: {})",
        summary.total, summary.with_history, summary.without_history
    ));
    lines
}

/// Reports the contacts on a fixed period and requests shutdown after each
/// report.
///
/// Since the first shutdown request stops the scheduler, only the first
/// period ever produces a report.
pub struct ContactsDumpJob {
    period: Duration,
    retention_window: RetentionWindow,
    shutdown: ShutdownHandle,
}

impl ContactsDumpJob {
    pub fn new(period: Duration, retention_window: RetentionWindow, shutdown: ShutdownHandle) -> Self {
        Self {
            period,
            retention_window,
            shutdown,
        }
    }
}

impl BackgroundJob for ContactsDumpJob {
    fn id(&self) -> &'static str {
        "contacts_dump"
    }

    fn name(&self) -> &'static str {
        "Contacts Dump"
    }

    fn description(&self) -> &'static str {
        "Log contacts with their latest phone change, then shut down"
    }

    fn schedule(&self) -> JobSchedule {
        JobSchedule::FixedRate(self.period)
    }

    fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        let rows = match ctx
            .contact_store
            .contacts_with_history(self.retention_window)
        {
            Ok(rows) => rows,
            Err(e) => {
                error!("Failed to read contacts for the dump: {}", e);
                self.shutdown.shutdown(ShutdownTrigger::ReportFailed);
                return Err(JobError::ExecutionFailed(e.to_string()));
            }
        };

        info!(
            "=== Contacts with phone history (retention window {}) ===",
            self.retention_window
        );
        for line in format_report(&rows) {
            info!("{}", line);
        }

        self.shutdown.shutdown(ShutdownTrigger::ReportCompleted);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contact_store::mock::MockContactStore;
    use crate::contact_store::{Contact, ContactStore, PhoneChange};
    use chrono::DateTime;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    fn row(id: i64, phone: &str, previous: Option<&str>) -> ContactWithHistory {
        ContactWithHistory {
            contact: Contact {
                id,
                name: "Alice".to_string(),
                phone: phone.to_string(),
            },
            previous: previous.map(|old| PhoneChange {
                old_phone: old.to_string(),
                changed_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            }),
        }
    }

    fn job_with_store(
        store: Arc<MockContactStore>,
    ) -> (ContactsDumpJob, JobContext, ShutdownHandle) {
        let token = CancellationToken::new();
        let shutdown = ShutdownHandle::new(token.clone(), store.clone());
        let job = ContactsDumpJob::new(
            Duration::from_secs(1),
            RetentionWindow::from_secs(5),
            shutdown.clone(),
        );
        (job, JobContext::new(token, store), shutdown)
    }

    #[test]
    fn summary_counts() {
        let rows = vec![
            row(1, "100-00001", None),
            row(2, "100-00002", Some("200-00000")),
            row(3, "100-00003", None),
        ];
        assert_eq!(
            ReportSummary::of(&rows),
            ReportSummary {
                total: 3,
                with_history: 1,
                without_history: 2,
            }
        );
        assert_eq!(
            ReportSummary::of(&[]),
            ReportSummary {
                total: 0,
                with_history: 0,
                without_history: 0,
            }
        );
    }

    #[test]
    fn report_lines() {
        let lines = format_report(&[row(1, "100-00001", None), row(2, "100-00002", Some("200-00000"))]);

        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("ID "));
        assert!(lines[0].contains("Previous phone"));
        assert!(lines[1].contains("100-00001"));
        assert_eq!(lines[1].matches("N/A").count(), 2);
        assert!(lines[2].contains("200-00000"));
        assert!(lines[2].contains("2023-11-14 22:13:20"));
        assert_eq!(
            lines[3],
            "Total contacts: 2 (with history: 1, without history: 1)"
        );
        // Columns line up
        assert_eq!(lines[0].find('|'), lines[1].find('|'));
        assert_eq!(lines[1].rfind('|'), lines[2].rfind('|'));
    }

    #[test]
    fn test_job_metadata() {
        let (job, _ctx, _shutdown) = job_with_store(Arc::new(MockContactStore::default()));
        assert_eq!(job.id(), "contacts_dump");
        assert_eq!(job.schedule(), JobSchedule::FixedRate(Duration::from_secs(1)));
    }

    #[test]
    fn successful_dump_requests_clean_shutdown() {
        let store = Arc::new(MockContactStore::with_contacts(3));
        let (job, ctx, shutdown) = job_with_store(store.clone());

        job.execute(&ctx).unwrap();

        assert!(shutdown.is_shutting_down());
        assert!(ctx.is_cancelled());
        assert_eq!(shutdown.exit_code(), Some(0));
        assert_eq!(store.uninstall_calls.load(Ordering::SeqCst), 1);
        assert!(!store.retention_installed().unwrap());
    }

    #[test]
    fn failed_read_requests_failing_shutdown() {
        let store = Arc::new(MockContactStore::with_contacts(3));
        store.fail_reads.store(true, Ordering::SeqCst);
        let (job, ctx, shutdown) = job_with_store(store.clone());

        let result = job.execute(&ctx);

        assert!(matches!(result, Err(JobError::ExecutionFailed(_))));
        assert_eq!(shutdown.exit_code(), Some(1));
        // Teardown still ran
        assert_eq!(store.uninstall_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn second_tick_does_not_repeat_teardown() {
        let store = Arc::new(MockContactStore::with_contacts(1));
        let (job, _ctx, shutdown) = job_with_store(store.clone());
        // A context that is not cancelled yet, as if the tick raced the shutdown
        let fresh_ctx = JobContext::new(CancellationToken::new(), store.clone());

        job.execute(&fresh_ctx).unwrap();
        job.execute(&fresh_ctx).unwrap();

        assert_eq!(store.uninstall_calls.load(Ordering::SeqCst), 1);
        assert_eq!(shutdown.exit_code(), Some(0));
    }
}
