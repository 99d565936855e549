//! SQLite-backed contact store.

use super::models::*;
use super::schema::{
    create_phone_audit_trigger_sql, drop_phone_audit_trigger_sql, CONTACT_VERSIONED_SCHEMAS,
    PHONE_AUDIT_TRIGGER_NAME, PHONE_LOG_TABLE_V1,
};
use super::{ContactStore, StoreError};
use crate::sqlite_persistence::open_versioned;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite contact store with one write connection and a small pool of read
/// connections, handed out round-robin.
#[derive(Clone)]
pub struct SqliteContactStore {
    write_conn: Arc<Mutex<Connection>>,
    read_pool: Vec<Arc<Mutex<Connection>>>,
    read_index: Arc<AtomicUsize>,
}

impl SqliteContactStore {
    /// Opens (creating if needed) the contacts database at `db_path`.
    ///
    /// # Arguments
    /// * `db_path` - Path to the SQLite database file
    /// * `read_pool_size` - Number of read-only connections (at least 1)
    pub fn new<P: AsRef<Path>>(db_path: P, read_pool_size: usize) -> Result<Self> {
        let path = db_path.as_ref();

        let mut write_conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("Failed to open contacts database at {:?}", path))?;
        write_conn.busy_timeout(BUSY_TIMEOUT)?;
        write_conn.pragma_update(None, "journal_mode", "WAL")?;
        write_conn.execute("PRAGMA foreign_keys = ON;", [])?;

        let version = open_versioned(&mut write_conn, CONTACT_VERSIONED_SCHEMAS)
            .context("Failed to prepare contacts database schema")?;
        info!(
            "Opened contacts database at {:?} (schema version {})",
            path, version
        );

        let mut read_pool = Vec::with_capacity(read_pool_size.max(1));
        for _ in 0..read_pool_size.max(1) {
            let read_conn = Connection::open_with_flags(
                path,
                OpenFlags::SQLITE_OPEN_READ_ONLY
                    | OpenFlags::SQLITE_OPEN_URI
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )
            .context("Failed to open read connection")?;
            read_conn.busy_timeout(BUSY_TIMEOUT)?;
            read_pool.push(Arc::new(Mutex::new(read_conn)));
        }

        Ok(Self {
            write_conn: Arc::new(Mutex::new(write_conn)),
            read_pool,
            read_index: Arc::new(AtomicUsize::new(0)),
        })
    }

    fn writer(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.write_conn.lock().map_err(|_| StoreError::Poisoned)
    }

    fn with_reader<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let index = self.read_index.fetch_add(1, Ordering::SeqCst) % self.read_pool.len();
        let conn = self.read_pool[index]
            .lock()
            .map_err(|_| StoreError::Poisoned)?;
        f(&conn)
    }

    fn timestamp_to_datetime(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap_or_default()
    }
}

impl ContactStore for SqliteContactStore {
    fn insert_batch(&self, contacts: &[NewContact]) -> Result<usize, StoreError> {
        let mut conn = self.writer()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached("INSERT INTO contacts (name, phone) VALUES (?1, ?2)")?;
            for contact in contacts {
                stmt.execute(params![contact.name, contact.phone])?;
            }
        }
        tx.commit()?;
        Ok(contacts.len())
    }

    fn count(&self) -> Result<i64, StoreError> {
        self.with_reader(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM contacts", [], |r| r.get(0))?)
        })
    }

    fn random_ids(&self, limit: usize) -> Result<Vec<i64>, StoreError> {
        debug!("Selecting {} random contact ids", limit);
        self.with_reader(|conn| {
            let mut stmt =
                conn.prepare_cached("SELECT id FROM contacts ORDER BY RANDOM() LIMIT ?1")?;
            let ids = stmt
                .query_map(params![limit as i64], |r| r.get(0))?
                .collect::<rusqlite::Result<Vec<i64>>>()?;
            Ok(ids)
        })
    }

    fn update_phone(&self, id: i64, new_phone: &str) -> Result<(), StoreError> {
        let conn = self.writer()?;
        let updated = conn.execute(
            "UPDATE contacts SET phone = ?1 WHERE id = ?2",
            params![new_phone, id],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    fn delete_all(&self, table: ContactTable) -> Result<usize, StoreError> {
        let mut conn = self.writer()?;
        let tx = conn.transaction()?;
        let deleted = match table {
            ContactTable::Contacts => {
                // Audit rows reference contacts, so they go first
                tx.execute(&format!("DELETE FROM {}", ContactTable::PhoneLog), [])?;
                tx.execute(&format!("DELETE FROM {}", ContactTable::Contacts), [])?
            }
            ContactTable::PhoneLog => {
                tx.execute(&format!("DELETE FROM {}", ContactTable::PhoneLog), [])?
            }
        };
        tx.commit()?;
        info!("Deleted {} rows from {}", deleted, table);
        Ok(deleted)
    }

    fn install_retention(&self, window: RetentionWindow) -> Result<(), StoreError> {
        let schema_err = |e: anyhow::Error| StoreError::Schema(format!("{:#}", e));

        let mut conn = self.writer()?;
        let tx = conn.transaction()?;
        PHONE_LOG_TABLE_V1.create(&tx).map_err(schema_err)?;
        tx.execute(&format!("DELETE FROM {}", ContactTable::PhoneLog), [])
            .map_err(|e| StoreError::Schema(e.to_string()))?;
        tx.execute(&drop_phone_audit_trigger_sql(), [])
            .map_err(|e| StoreError::Schema(e.to_string()))?;
        tx.execute(&create_phone_audit_trigger_sql(window.secs()), [])
            .map_err(|e| StoreError::Schema(e.to_string()))?;
        tx.commit()
            .map_err(|e| StoreError::Schema(e.to_string()))?;

        info!(
            "Installed phone audit trigger with retention window {}",
            window
        );
        Ok(())
    }

    fn uninstall_retention(&self) -> Result<(), StoreError> {
        let conn = self.writer()?;
        conn.execute(&drop_phone_audit_trigger_sql(), [])?;
        info!("Removed phone audit trigger");
        Ok(())
    }

    fn retention_installed(&self) -> Result<bool, StoreError> {
        self.with_reader(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='trigger' AND name=?1",
                params![PHONE_AUDIT_TRIGGER_NAME],
                |r| r.get(0),
            )?;
            Ok(count > 0)
        })
    }

    fn all_contacts(&self) -> Result<Vec<Contact>, StoreError> {
        self.with_reader(|conn| {
            let mut stmt = conn.prepare_cached("SELECT id, name, phone FROM contacts ORDER BY id")?;
            let contacts = stmt
                .query_map([], |row| {
                    Ok(Contact {
                        id: row.get(0)?,
                        name: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                        phone: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(contacts)
        })
    }

    fn latest_phone_changes(
        &self,
        window: RetentionWindow,
    ) -> Result<HashMap<i64, PhoneChange>, StoreError> {
        self.with_reader(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT contact_id, old_phone, change_time FROM (
                    SELECT contact_id, old_phone, change_time,
                           ROW_NUMBER() OVER (
                               PARTITION BY contact_id
                               ORDER BY change_time DESC, log_id DESC
                           ) AS rn
                    FROM contact_phone_log
                    WHERE change_time >= cast(strftime('%s','now') as int) - ?1
                 )
                 WHERE rn = 1",
            )?;
            let rows = stmt
                .query_map(params![window.secs()], |row| {
                    let contact_id: i64 = row.get(0)?;
                    let change = PhoneChange {
                        old_phone: row.get(1)?,
                        changed_at: Self::timestamp_to_datetime(row.get(2)?),
                    };
                    Ok((contact_id, change))
                })?
                .collect::<rusqlite::Result<HashMap<_, _>>>()?;
            Ok(rows)
        })
    }

    fn phone_history(&self, contact_id: i64) -> Result<Vec<AuditEntry>, StoreError> {
        self.with_reader(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT log_id, contact_id, old_phone, change_time
                 FROM contact_phone_log
                 WHERE contact_id = ?1
                 ORDER BY change_time, log_id",
            )?;
            let entries = stmt
                .query_map(params![contact_id], |row| {
                    Ok(AuditEntry {
                        log_id: row.get(0)?,
                        contact_id: row.get(1)?,
                        old_phone: row.get(2)?,
                        changed_at: Self::timestamp_to_datetime(row.get(3)?),
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(entries)
        })
    }
}
