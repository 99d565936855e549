//! Test fixture creation for the contacts database

use super::constants::*;
use contact_churn::config::{AppConfig, CliConfig, FileConfig, RegeneratePolicy, SchedulingConfig};
use contact_churn::contact_store::SqliteContactStore;
use contact_churn::generator::prepare_database;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// Config for a small database at `db_path` with fast jobs.
pub fn test_config(db_path: PathBuf, dump_period_secs: u64) -> AppConfig {
    let cli = CliConfig {
        db_path,
        records_count: SEEDED_CONTACTS,
        regenerate: RegeneratePolicy::Always,
    };
    let file = FileConfig {
        insert_batch_size: Some(16),
        scheduling: Some(SchedulingConfig {
            phone_update_min_ms: Some(20),
            phone_update_max_ms: Some(60),
            max_contacts_to_update: Some(5),
            max_log_retention_secs: Some(RETENTION_WINDOW_SECS + 1),
            retention_window_secs: Some(RETENTION_WINDOW_SECS),
            dump_period_secs: Some(dump_period_secs),
            ..Default::default()
        }),
        ..Default::default()
    };
    AppConfig::resolve(&cli, Some(file), &mut StdRng::seed_from_u64(99))
        .expect("Failed to resolve test config")
}

/// A contacts database in a temporary directory.
pub struct TestDatabase {
    pub store: Arc<SqliteContactStore>,
    pub config: AppConfig,
    pub db_path: PathBuf,
    _temp_dir: TempDir, // Keep temp dir alive
}

impl TestDatabase {
    /// Seeded with [`SEEDED_CONTACTS`] contacts and the retention mechanism
    /// installed.
    pub fn prepared() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("contacts.db");
        let config = test_config(db_path.clone(), 1);
        let store = Arc::new(
            SqliteContactStore::new(&db_path, config.read_pool_size)
                .expect("Failed to open contacts store"),
        );
        prepare_database(store.as_ref(), &config, |_| Ok(true))
            .expect("Failed to prepare database");
        Self {
            store,
            config,
            db_path,
            _temp_dir: temp_dir,
        }
    }
}
