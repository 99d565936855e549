use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;

/// A contact row as stored in the contacts table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    pub id: i64,
    pub name: String,
    pub phone: String,
}

/// A contact that has not been inserted yet; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewContact {
    pub name: String,
    pub phone: String,
}

/// One row of the phone audit table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    pub log_id: i64,
    pub contact_id: i64,
    /// The phone value the contact had before the update.
    pub old_phone: String,
    pub changed_at: DateTime<Utc>,
}

/// The most recent superseded phone of a contact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhoneChange {
    pub old_phone: String,
    pub changed_at: DateTime<Utc>,
}

/// A contact joined with its latest phone change inside the retention window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactWithHistory {
    pub contact: Contact,
    pub previous: Option<PhoneChange>,
}

/// Tables owned by the contact store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactTable {
    Contacts,
    PhoneLog,
}

impl ContactTable {
    pub fn table_name(&self) -> &'static str {
        match self {
            ContactTable::Contacts => super::schema::CONTACTS_TABLE_NAME,
            ContactTable::PhoneLog => super::schema::PHONE_LOG_TABLE_NAME,
        }
    }
}

impl fmt::Display for ContactTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.table_name())
    }
}

/// How long audit entries stay visible, in whole seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RetentionWindow(u32);

impl RetentionWindow {
    pub fn from_secs(secs: u32) -> Self {
        Self(secs)
    }

    pub fn secs(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for RetentionWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0)
    }
}

/// Left-joins `contacts` with the per-contact latest changes.
///
/// Every contact appears exactly once, in input order; contacts with no entry
/// in `latest` get `previous: None`.
pub fn reconcile(
    contacts: Vec<Contact>,
    mut latest: HashMap<i64, PhoneChange>,
) -> Vec<ContactWithHistory> {
    contacts
        .into_iter()
        .map(|contact| {
            let previous = latest.remove(&contact.id);
            ContactWithHistory { contact, previous }
        })
        .collect()
}
