//! In-memory [`ContactStore`] for job and coordinator tests.

use super::models::*;
use super::{ContactStore, StoreError};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Default)]
pub struct MockContactStore {
    pub contacts: Mutex<Vec<Contact>>,
    pub history: Mutex<HashMap<i64, PhoneChange>>,
    /// Returned by `random_ids` instead of the stored ids when set.
    pub fixed_ids: Mutex<Option<Vec<i64>>>,
    /// Ids whose `update_phone` fails with an I/O error.
    pub failing_ids: Mutex<HashSet<i64>>,
    pub updates: Mutex<Vec<(i64, String)>>,
    pub random_ids_requests: Mutex<Vec<usize>>,
    pub fail_random_ids: AtomicBool,
    pub fail_reads: AtomicBool,
    pub fail_uninstall: AtomicBool,
    pub installed: AtomicBool,
    pub uninstall_calls: AtomicUsize,
}

impl MockContactStore {
    pub fn with_contacts(count: i64) -> Self {
        let store = Self::default();
        *store.contacts.lock().unwrap() = (1..=count)
            .map(|id| Contact {
                id,
                name: format!("Contact {}", id),
                phone: format!("100-{:05}", id),
            })
            .collect();
        store.installed.store(true, Ordering::SeqCst);
        store
    }

    pub fn update_count(&self) -> usize {
        self.updates.lock().unwrap().len()
    }

    fn io_error() -> StoreError {
        StoreError::Sqlite(rusqlite::Error::InvalidQuery)
    }
}

impl ContactStore for MockContactStore {
    fn insert_batch(&self, contacts: &[NewContact]) -> Result<usize, StoreError> {
        let mut stored = self.contacts.lock().unwrap();
        for contact in contacts {
            let id = stored.last().map(|c| c.id + 1).unwrap_or(1);
            stored.push(Contact {
                id,
                name: contact.name.clone(),
                phone: contact.phone.clone(),
            });
        }
        Ok(contacts.len())
    }

    fn count(&self) -> Result<i64, StoreError> {
        Ok(self.contacts.lock().unwrap().len() as i64)
    }

    fn random_ids(&self, limit: usize) -> Result<Vec<i64>, StoreError> {
        self.random_ids_requests.lock().unwrap().push(limit);
        if self.fail_random_ids.load(Ordering::SeqCst) {
            return Err(Self::io_error());
        }
        if let Some(ids) = self.fixed_ids.lock().unwrap().clone() {
            return Ok(ids);
        }
        Ok(self
            .contacts
            .lock()
            .unwrap()
            .iter()
            .take(limit)
            .map(|c| c.id)
            .collect())
    }

    fn update_phone(&self, id: i64, new_phone: &str) -> Result<(), StoreError> {
        if self.failing_ids.lock().unwrap().contains(&id) {
            return Err(Self::io_error());
        }
        let mut contacts = self.contacts.lock().unwrap();
        let contact = contacts
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(StoreError::NotFound(id))?;
        contact.phone = new_phone.to_string();
        self.updates
            .lock()
            .unwrap()
            .push((id, new_phone.to_string()));
        Ok(())
    }

    fn delete_all(&self, table: ContactTable) -> Result<usize, StoreError> {
        let mut history = self.history.lock().unwrap();
        let deleted = match table {
            ContactTable::Contacts => {
                history.clear();
                std::mem::take(&mut *self.contacts.lock().unwrap()).len()
            }
            ContactTable::PhoneLog => std::mem::take(&mut *history).len(),
        };
        Ok(deleted)
    }

    fn install_retention(&self, _window: RetentionWindow) -> Result<(), StoreError> {
        self.installed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn uninstall_retention(&self) -> Result<(), StoreError> {
        self.uninstall_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_uninstall.load(Ordering::SeqCst) {
            return Err(Self::io_error());
        }
        self.installed.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn retention_installed(&self) -> Result<bool, StoreError> {
        Ok(self.installed.load(Ordering::SeqCst))
    }

    fn all_contacts(&self) -> Result<Vec<Contact>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Self::io_error());
        }
        Ok(self.contacts.lock().unwrap().clone())
    }

    fn latest_phone_changes(
        &self,
        _window: RetentionWindow,
    ) -> Result<HashMap<i64, PhoneChange>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Self::io_error());
        }
        Ok(self.history.lock().unwrap().clone())
    }

    fn phone_history(&self, contact_id: i64) -> Result<Vec<AuditEntry>, StoreError> {
        Ok(self
            .history
            .lock()
            .unwrap()
            .get(&contact_id)
            .map(|change| AuditEntry {
                log_id: 1,
                contact_id,
                old_phone: change.old_phone.clone(),
                changed_at: change.changed_at,
            })
            .into_iter()
            .collect())
    }
}
