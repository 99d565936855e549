//! Synthetic contact generation and startup database preparation.

use crate::config::{AppConfig, RegeneratePolicy};
use crate::contact_store::{ContactStore, ContactTable, NewContact};
use anyhow::{Context, Result};
use rand::seq::IndexedRandom;
use rand::Rng;
use std::time::Instant;
use tracing::info;

/// A random phone number: three digits in `[100, 999]`, a dash, then five
/// zero-padded digits.
pub fn random_phone<R: Rng + ?Sized>(rng: &mut R) -> String {
    format!(
        "{:03}-{:05}",
        rng.random_range(100..1000),
        rng.random_range(0..100_000)
    )
}

/// A contact with a name picked uniformly from `names` and a random phone.
pub fn random_contact<R: Rng + ?Sized>(names: &[String], rng: &mut R) -> NewContact {
    let name = names.choose(rng).cloned().unwrap_or_default();
    NewContact {
        name,
        phone: random_phone(rng),
    }
}

/// What [`prepare_database`] did with the contacts table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrepareOutcome {
    /// The table was empty and has been filled.
    Seeded(usize),
    /// Existing contacts were deleted and the table refilled.
    Regenerated(usize),
    /// Existing contacts were kept.
    Kept(i64),
}

/// Inserts `config.records_count` random contacts, one transaction per batch.
pub fn seed_contacts(store: &dyn ContactStore, config: &AppConfig) -> Result<usize> {
    let total = config.records_count;
    let batch_size = config.insert_batch_size.max(1);
    info!(
        "Generating {} contacts (batches of {})...",
        total, batch_size
    );

    let start = Instant::now();
    let mut rng = rand::rng();
    let mut processed = 0usize;
    while processed < total {
        let len = batch_size.min(total - processed);
        let batch: Vec<NewContact> = (0..len)
            .map(|_| random_contact(&config.names, &mut rng))
            .collect();
        processed += store
            .insert_batch(&batch)
            .context("Failed to insert contact batch")?;
        info!(
            "Processed: {}/{} ({:.1}%)",
            processed,
            total,
            processed as f64 * 100.0 / total as f64
        );
    }

    let elapsed = start.elapsed().as_secs_f64();
    let rate = if elapsed > 0.0 {
        processed as f64 / elapsed
    } else {
        processed as f64
    };
    info!(
        "Generation completed in {:.2}s ({:.1} records/sec)",
        elapsed, rate
    );
    Ok(processed)
}

/// Brings the database into its running state: seeds or regenerates the
/// contacts according to `config.regenerate`, then installs the retention
/// mechanism.
///
/// `confirm` is only called for [`RegeneratePolicy::Ask`], with the number of
/// existing contacts, and returns whether to regenerate.
///
/// A failure to install the retention mechanism is returned as an error: the
/// process must not start without it.
pub fn prepare_database<F>(
    store: &dyn ContactStore,
    config: &AppConfig,
    confirm: F,
) -> Result<PrepareOutcome>
where
    F: FnOnce(i64) -> Result<bool>,
{
    let existing = store.count().context("Failed to count existing contacts")?;

    let outcome = if existing > 0 {
        info!("Found {} existing contacts", existing);
        let regenerate = match config.regenerate {
            RegeneratePolicy::Always => true,
            RegeneratePolicy::Never => false,
            RegeneratePolicy::Ask => confirm(existing)?,
        };
        if regenerate {
            info!("Regenerating contacts...");
            store
                .delete_all(ContactTable::Contacts)
                .context("Failed to delete existing contacts")?;
            PrepareOutcome::Regenerated(seed_contacts(store, config)?)
        } else {
            info!("Keeping existing contacts");
            PrepareOutcome::Kept(existing)
        }
    } else {
        PrepareOutcome::Seeded(seed_contacts(store, config)?)
    };

    info!("Installing phone audit trigger...");
    store
        .install_retention(config.scheduling.retention_window)
        .context("Failed to install phone retention mechanism")?;

    Ok(outcome)
}
