//! SQLite schema definitions for the contacts database.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema, DEFAULT_TIMESTAMP};

pub const CONTACTS_TABLE_NAME: &str = "contacts";
pub const PHONE_LOG_TABLE_NAME: &str = "contact_phone_log";

/// Name of the trigger that writes phone audit entries.
pub const PHONE_AUDIT_TRIGGER_NAME: &str = "contact_phone_audit";

// =============================================================================
// Version 1 - Contacts and phone audit log
// =============================================================================

pub const CONTACTS_TABLE_V1: Table = Table {
    name: CONTACTS_TABLE_NAME,
    columns: &[
        sqlite_column!(
            "id",
            &SqlType::Integer,
            is_primary_key = true,
            autoincrement = true
        ),
        sqlite_column!("name", &SqlType::Text),
        sqlite_column!("phone", &SqlType::Text),
    ],
    indices: &[],
};

/// Audit trail of superseded phone numbers. Rows are only ever written by the
/// retention trigger.
pub const PHONE_LOG_TABLE_V1: Table = Table {
    name: PHONE_LOG_TABLE_NAME,
    columns: &[
        sqlite_column!(
            "log_id",
            &SqlType::Integer,
            is_primary_key = true,
            autoincrement = true
        ),
        sqlite_column!(
            "contact_id",
            &SqlType::Integer,
            non_null = true,
            references = Some((CONTACTS_TABLE_NAME, "id"))
        ),
        sqlite_column!("old_phone", &SqlType::Text, non_null = true),
        sqlite_column!(
            "change_time",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[(
        "idx_contact_phone_log_contact_time",
        "contact_id, change_time",
    )],
};

/// All versioned schemas for the contacts database.
///
/// Version 1: contacts and contact_phone_log tables
pub const CONTACT_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    tables: &[CONTACTS_TABLE_V1, PHONE_LOG_TABLE_V1],
    migration: None,
}];

/// SQL creating the audit trigger for the given window.
///
/// Inside the same statement as the phone update it records the old phone and
/// evicts entries of the same contact older than `window_secs`. Entries of
/// other contacts are left alone, even when expired.
pub fn create_phone_audit_trigger_sql(window_secs: u32) -> String {
    format!(
        "CREATE TRIGGER {trigger} \
         AFTER UPDATE OF phone ON {contacts} \
         FOR EACH ROW \
         BEGIN \
           INSERT INTO {log} (contact_id, old_phone) VALUES (OLD.id, OLD.phone); \
           DELETE FROM {log} \
           WHERE contact_id = OLD.id \
             AND change_time < {now} - {window}; \
         END",
        trigger = PHONE_AUDIT_TRIGGER_NAME,
        contacts = CONTACTS_TABLE_NAME,
        log = PHONE_LOG_TABLE_NAME,
        now = DEFAULT_TIMESTAMP,
        window = window_secs,
    )
}

pub fn drop_phone_audit_trigger_sql() -> String {
    format!("DROP TRIGGER IF EXISTS {}", PHONE_AUDIT_TRIGGER_NAME)
}
