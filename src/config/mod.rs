mod file_config;

pub use file_config::{FileConfig, SchedulingConfig};

use crate::contact_store::RetentionWindow;
use anyhow::{anyhow, bail, Result};
use clap::ValueEnum;
use rand::Rng;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_DB_PATH: &str = "random_data.db";
pub const DEFAULT_RECORDS_COUNT: usize = 100_000;
pub const DEFAULT_NAMES: &[&str] = &["Alice", "Bob", "Charlie"];

/// What to do when the database already holds contacts at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum RegeneratePolicy {
    /// Ask on the terminal.
    #[default]
    Ask,
    /// Always wipe and regenerate.
    Always,
    /// Keep existing data.
    Never,
}

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub db_path: PathBuf,
    pub records_count: usize,
    pub regenerate: RegeneratePolicy,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            records_count: DEFAULT_RECORDS_COUNT,
            regenerate: RegeneratePolicy::Ask,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub records_count: usize,
    pub regenerate: RegeneratePolicy,
    pub names: Vec<String>,
    pub insert_batch_size: usize,
    pub read_pool_size: usize,

    pub scheduling: SchedulingSettings,
}

/// Settings consumed by the background jobs and the coordinator.
///
/// Randomized values are drawn once in [`AppConfig::resolve`] and never change
/// afterwards; only the phone updater's per-run delay is redrawn, by the job
/// itself.
#[derive(Debug, Clone)]
pub struct SchedulingSettings {
    pub phone_update_min_ms: u64,
    pub phone_update_max_ms: u64,
    pub dump_period: Duration,
    pub retention_window: RetentionWindow,
    pub max_contacts_to_update: usize,
    pub worker_slots: usize,
}

impl Default for SchedulingSettings {
    fn default() -> Self {
        Self {
            phone_update_min_ms: 500,
            phone_update_max_ms: 5000,
            dump_period: Duration::from_secs(60),
            retention_window: RetentionWindow::from_secs(29),
            max_contacts_to_update: 10,
            worker_slots: 2,
        }
    }
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    ///
    /// `rng` draws the dump period and retention window when they are not
    /// pinned in the file.
    pub fn resolve<R: Rng + ?Sized>(
        cli: &CliConfig,
        file_config: Option<FileConfig>,
        rng: &mut R,
    ) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_path = file
            .db_path
            .map(PathBuf::from)
            .unwrap_or_else(|| cli.db_path.clone());
        if db_path.is_dir() {
            bail!("db_path is a directory: {:?}", db_path);
        }

        let records_count = file.records_count.unwrap_or(cli.records_count);

        let regenerate = match file.regenerate {
            Some(s) => parse_regenerate_policy(&s)
                .ok_or_else(|| anyhow!("Invalid regenerate policy in config file: {}", s))?,
            None => cli.regenerate,
        };

        let names = file
            .names
            .unwrap_or_else(|| DEFAULT_NAMES.iter().map(|s| s.to_string()).collect());
        if names.is_empty() {
            bail!("names must not be empty");
        }

        let insert_batch_size = file.insert_batch_size.unwrap_or(1000);
        if insert_batch_size == 0 {
            bail!("insert_batch_size must be at least 1");
        }
        let read_pool_size = file.read_pool_size.unwrap_or(2);
        if read_pool_size == 0 {
            bail!("read_pool_size must be at least 1");
        }

        let scheduling = SchedulingSettings::resolve(file.scheduling.unwrap_or_default(), rng)?;

        Ok(Self {
            db_path,
            records_count,
            regenerate,
            names,
            insert_batch_size,
            read_pool_size,
            scheduling,
        })
    }
}

impl SchedulingSettings {
    fn resolve<R: Rng + ?Sized>(file: SchedulingConfig, rng: &mut R) -> Result<Self> {
        let phone_update_min_ms = file.phone_update_min_ms.unwrap_or(500);
        let phone_update_max_ms = file.phone_update_max_ms.unwrap_or(5000);
        if phone_update_min_ms >= phone_update_max_ms {
            bail!(
                "phone_update_min_ms ({}) must be lower than phone_update_max_ms ({})",
                phone_update_min_ms,
                phone_update_max_ms
            );
        }

        let dump_period_secs = match file.dump_period_secs {
            Some(0) => bail!("dump_period_secs must be at least 1"),
            Some(secs) => secs,
            None => {
                let dump_min = file.dump_min_secs.unwrap_or(60);
                let dump_max = file.dump_max_secs.unwrap_or(300);
                if dump_min >= dump_max {
                    bail!(
                        "dump_min_secs ({}) must be lower than dump_max_secs ({})",
                        dump_min,
                        dump_max
                    );
                }
                rng.random_range(dump_min..dump_max).max(1)
            }
        };

        let max_retention = file.max_log_retention_secs.unwrap_or(30);
        if max_retention < 2 {
            bail!("max_log_retention_secs must be at least 2");
        }
        let retention_secs = match file.retention_window_secs {
            Some(secs) if secs >= 1 && secs < max_retention => secs,
            Some(secs) => bail!(
                "retention_window_secs ({}) must be in [1, {})",
                secs,
                max_retention
            ),
            None => rng.random_range(1..max_retention),
        };

        let max_contacts_to_update = file.max_contacts_to_update.unwrap_or(10);
        if max_contacts_to_update == 0 {
            bail!("max_contacts_to_update must be at least 1");
        }

        let worker_slots = file.worker_slots.unwrap_or(2);
        if worker_slots < 2 {
            bail!("worker_slots must be at least 2, one per recurring job");
        }

        Ok(Self {
            phone_update_min_ms,
            phone_update_max_ms,
            dump_period: Duration::from_secs(dump_period_secs),
            retention_window: RetentionWindow::from_secs(retention_secs),
            max_contacts_to_update,
            worker_slots,
        })
    }
}

/// Parses a regenerate policy string, case insensitive.
/// Uses clap's ValueEnum trait for parsing.
fn parse_regenerate_policy(s: &str) -> Option<RegeneratePolicy> {
    RegeneratePolicy::from_str(s, true).ok()
}
