//! Contact storage: the contacts table, the phone audit table and the
//! database-side retention mechanism that links them.

#[cfg(test)]
pub(crate) mod mock;
mod models;
mod schema;
mod store;

pub use models::*;
pub use schema::{
    CONTACT_VERSIONED_SCHEMAS, CONTACTS_TABLE_NAME, PHONE_AUDIT_TRIGGER_NAME,
    PHONE_LOG_TABLE_NAME,
};
pub use store::SqliteContactStore;

use std::collections::HashMap;
use thiserror::Error;

/// Errors returned by a [`ContactStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// The retention mechanism or the schema could not be set up.
    #[error("Schema failure: {0}")]
    Schema(String),

    /// The target contact does not exist (anymore).
    #[error("Contact {0} not found")]
    NotFound(i64),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Database connection lock poisoned")]
    Poisoned,
}

/// Storage capability shared by the background jobs and the coordinator.
///
/// Every method is its own unit of work; implementations must not keep a
/// transaction open across calls.
pub trait ContactStore: Send + Sync {
    /// Inserts all contacts in one transaction. Returns the number inserted.
    fn insert_batch(&self, contacts: &[NewContact]) -> Result<usize, StoreError>;

    fn count(&self) -> Result<i64, StoreError>;

    /// Up to `limit` distinct contact ids, chosen uniformly at random.
    fn random_ids(&self, limit: usize) -> Result<Vec<i64>, StoreError>;

    /// Sets a contact's phone. When the retention mechanism is installed the
    /// audit insert and eviction happen atomically with this update.
    fn update_phone(&self, id: i64, new_phone: &str) -> Result<(), StoreError>;

    /// Deletes every row of `table`. Returns the number of deleted rows.
    fn delete_all(&self, table: ContactTable) -> Result<usize, StoreError>;

    /// Installs (or reinstalls) the audit trigger for `window` and clears any
    /// audit entries left over from a previous run.
    fn install_retention(&self, window: RetentionWindow) -> Result<(), StoreError>;

    /// Removes the audit trigger. A no-op when it is not installed.
    fn uninstall_retention(&self) -> Result<(), StoreError>;

    fn retention_installed(&self) -> Result<bool, StoreError>;

    /// All contacts ordered by id.
    fn all_contacts(&self) -> Result<Vec<Contact>, StoreError>;

    /// For every contact with at least one audit entry newer than `window`,
    /// the most recent such entry.
    fn latest_phone_changes(
        &self,
        window: RetentionWindow,
    ) -> Result<HashMap<i64, PhoneChange>, StoreError>;

    /// All audit entries of one contact, oldest first.
    fn phone_history(&self, contact_id: i64) -> Result<Vec<AuditEntry>, StoreError>;

    /// Current contacts left-joined with their latest phone change.
    ///
    /// The two reads are separate statements; an update landing in between
    /// may make the joined view slightly stale.
    fn contacts_with_history(
        &self,
        window: RetentionWindow,
    ) -> Result<Vec<ContactWithHistory>, StoreError> {
        let contacts = self.all_contacts()?;
        let latest = self.latest_phone_changes(window)?;
        Ok(reconcile(contacts, latest))
    }
}
