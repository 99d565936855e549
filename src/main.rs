use anyhow::{Context, Result};
use clap::Parser;
use contact_churn::config::{
    AppConfig, CliConfig, FileConfig, RegeneratePolicy, DEFAULT_DB_PATH, DEFAULT_RECORDS_COUNT,
};
use contact_churn::contact_store::{ContactStore, SqliteContactStore};
use contact_churn::coordinator::{Coordinator, ShutdownTrigger};
use contact_churn::generator::prepare_database;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    if path_buf.is_absolute() {
        return Ok(path_buf);
    }
    let cwd = std::env::current_dir().context("Error resolving current directory")?;
    Ok(cwd.join(path_buf))
}

#[derive(Parser, Debug)]
#[clap(version = concat!(env!("CARGO_PKG_VERSION"), "-", env!("GIT_HASH")))]
struct CliArgs {
    /// Path to a TOML config file. Its values override the CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Path to the SQLite contacts database file.
    #[clap(long, value_parser = parse_path, default_value = DEFAULT_DB_PATH)]
    pub db_path: PathBuf,

    /// Number of contacts to generate.
    #[clap(long, default_value_t = DEFAULT_RECORDS_COUNT)]
    pub records: usize,

    /// What to do when the database already holds contacts.
    #[clap(long, value_enum, default_value_t = RegeneratePolicy::Ask)]
    pub regenerate: RegeneratePolicy,
}

/// Asks on the terminal whether to wipe the existing contacts.
fn confirm_regenerate(existing: i64) -> Result<bool> {
    let mut rl = DefaultEditor::new().context("Failed to open terminal prompt")?;
    let prompt = format!(
        "The contacts table already holds {} rows. Regenerate? (y/n): ",
        existing
    );
    match rl.readline(&prompt) {
        Ok(line) => Ok(line.trim().eq_ignore_ascii_case("y")),
        Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => Ok(false),
        Err(e) => Err(e).context("Failed to read answer"),
    }
}

/// Resolves when the host asks the process to stop.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

fn log_config(config: &AppConfig) {
    let scheduling = &config.scheduling;
    info!("Database: {:?}", config.db_path);
    info!(
        "Records: {} (batches of {}, regenerate: {:?})",
        config.records_count, config.insert_batch_size, config.regenerate
    );
    info!(
        "Phone update interval: {}-{}ms, up to {} contacts per run",
        scheduling.phone_update_min_ms,
        scheduling.phone_update_max_ms,
        scheduling.max_contacts_to_update
    );
    info!("Dump period: {:?}", scheduling.dump_period);
    info!("Phone history retention window: {}", scheduling.retention_window);
}

async fn run(cli_args: CliArgs) -> Result<i32> {
    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config file {:?}", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let cli = CliConfig {
        db_path: cli_args.db_path,
        records_count: cli_args.records,
        regenerate: cli_args.regenerate,
    };
    let config = AppConfig::resolve(&cli, file_config, &mut rand::rng())?;
    log_config(&config);

    info!("Opening SQLite contacts database at {:?}...", config.db_path);
    let store = Arc::new(SqliteContactStore::new(
        &config.db_path,
        config.read_pool_size,
    )?);

    let outcome = {
        let store = Arc::clone(&store);
        let config = config.clone();
        tokio::task::spawn_blocking(move || {
            prepare_database(store.as_ref(), &config, confirm_regenerate)
        })
        .await
        .context("Database preparation task failed")??
    };
    info!("Database ready: {:?}", outcome);

    let store: Arc<dyn ContactStore> = store;
    let mut coordinator = Coordinator::new(store, &config.scheduling).await;
    coordinator.start_all().await;

    let shutdown = coordinator.shutdown_handle();
    let code = tokio::select! {
        code = coordinator.wait_for_exit() => code,
        _ = shutdown_signal() => {
            info!("Termination signal received");
            tokio::task::spawn_blocking(move || shutdown.shutdown(ShutdownTrigger::External))
                .await
                .context("Shutdown task failed")?;
            coordinator.wait_for_exit().await
        }
    };
    Ok(code)
}

#[tokio::main]
async fn main() {
    let cli_args = CliArgs::parse();

    if let Err(e) = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
    {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let code = match run(cli_args).await {
        Ok(code) => code,
        Err(e) => {
            error!("Fatal error: {:#}", e);
            1
        }
    };

    // Exit without waiting for a job run that may still be in progress
    std::process::exit(code);
}
