//! storage-lock: drive a SQL-based lock table from the command line

mod config;
mod logging;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use storage_lock_common::{ConnectionManager, LockInformation, Storage, StorageError, Version};
use storage_lock_sql::{DatabaseConnectionManager, Dialect, SqlBasedStorage, SqlBasedStorageOptions};

use crate::config::{Configuration, Overrides};
use crate::logging::{LoggingConfig, init_logging};

type Engine = SqlBasedStorage<DatabaseConnectionManager>;

#[derive(Debug, Parser)]
#[command(name = "storage-lock", version, about)]
struct Cli {
    /// Configuration file (default: conf/storage-lock.yml)
    #[arg(short = 'c', long = "config")]
    config_file: Option<PathBuf>,
    #[arg(long = "db-url", env = "DATABASE_URL")]
    database_url: Option<String>,
    /// Lock table name, optionally schema-qualified
    #[arg(long = "table")]
    table: Option<String>,
    /// sql92, sql97/mysql, sqlite or postgres; derived from the URL when unset
    #[arg(long = "dialect")]
    dialect: Option<String>,
    #[arg(long = "log-level")]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create the lock table if it does not exist
    Init,
    /// Insert a new lock record
    Create {
        lock_id: String,
        #[arg(long)]
        owner: String,
        #[arg(long, default_value_t = 1)]
        version: i64,
        /// Lease length in seconds
        #[arg(long, default_value_t = 30)]
        lease: i64,
    },
    /// Print the stored payload of one lock
    Get { lock_id: String },
    /// Move a lock from one version to the next
    Update {
        lock_id: String,
        #[arg(long)]
        owner: String,
        #[arg(long)]
        expected: i64,
        /// Defaults to expected + 1
        #[arg(long)]
        new: Option<i64>,
        #[arg(long, default_value_t = 30)]
        lease: i64,
    },
    /// Delete a lock at its current version
    Delete {
        lock_id: String,
        #[arg(long)]
        owner: String,
        #[arg(long)]
        expected: i64,
    },
    /// Print every stored lock record
    List,
    /// Print the storage server's clock
    Time,
    /// Run a create/update/delete round trip on a scratch lock
    Demo,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let configuration = Configuration::load(&Overrides {
        config_file: cli.config_file.clone(),
        database_url: cli.database_url.clone(),
        table: cli.table.clone(),
        dialect: cli.dialect.clone(),
        log_level: cli.log_level.clone(),
    })?;

    let _logging_guard = init_logging(&LoggingConfig::from_configuration(&configuration))?;

    let manager = Arc::new(
        DatabaseConnectionManager::connect(&configuration.database_options()?)
            .await
            .context("failed to connect to the lock database")?,
    );
    let dialect = match configuration.dialect()? {
        Some(dialect) => dialect,
        None => Dialect::for_backend(manager.database_backend()),
    };
    tracing::info!(
        dialect = %dialect,
        table = %configuration.table_full_name(),
        "Lock storage configured"
    );

    let storage = SqlBasedStorage::new(
        SqlBasedStorageOptions::new()
            .with_connection_manager(Arc::clone(&manager))
            .with_dialect(dialect)
            .with_table_full_name(configuration.table_full_name()),
    )?;

    let outcome = run(&storage, cli.command).await;

    storage.close().await?;
    manager.shutdown().await?;
    outcome
}

async fn run(storage: &Engine, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Init => {
            storage.init().await?;
            println!("table {} ready", storage.table_full_name());
        }
        Command::Create {
            lock_id,
            owner,
            version,
            lease,
        } => {
            let version = Version::new(version);
            let info = lease_for(storage, &owner, version, lease).await?;
            storage.create_with_version(&lock_id, version, &info).await?;
            println!("created {lock_id} at version {version}");
        }
        Command::Get { lock_id } => {
            println!("{}", storage.get(&lock_id).await?);
        }
        Command::Update {
            lock_id,
            owner,
            expected,
            new,
            lease,
        } => {
            let expected = Version::new(expected);
            let new = target_version(expected, new)?;
            let info = lease_for(storage, &owner, new, lease).await?;
            storage
                .update_with_version(&lock_id, expected, new, &info)
                .await?;
            println!("updated {lock_id} from version {expected} to {new}");
        }
        Command::Delete {
            lock_id,
            owner,
            expected,
        } => {
            let expected = Version::new(expected);
            let info = lease_for(storage, &owner, expected, 0).await?;
            storage
                .delete_with_version(&lock_id, expected, &info)
                .await?;
            println!("deleted {lock_id} at version {expected}");
        }
        Command::List => {
            let mut records = storage.list().await?;
            let mut count = 0usize;
            while let Some(info) = records.next().await {
                println!("{}", info?);
                count += 1;
            }
            println!("{count} lock record(s)");
        }
        Command::Time => {
            println!("{}", storage.get_time().await?.to_rfc3339());
        }
        Command::Demo => demo(storage).await?,
    }
    Ok(())
}

/// The version an update moves to: the explicit one, else the successor
fn target_version(expected: Version, new: Option<i64>) -> anyhow::Result<Version> {
    match new {
        Some(new) => Ok(Version::new(new)),
        None => expected
            .next()
            .ok_or_else(|| anyhow::anyhow!("version {expected} has no successor; pass --new")),
    }
}

/// Build a record whose lease starts at the storage server's clock
async fn lease_for(
    storage: &Engine,
    owner: &str,
    version: Version,
    lease_seconds: i64,
) -> anyhow::Result<LockInformation> {
    let now = match storage.get_time().await {
        Ok(now) => now,
        Err(err @ StorageError::Unimplemented { .. }) => {
            tracing::warn!(error = %err, "Falling back to local clock");
            Utc::now()
        }
        Err(err) => return Err(err.into()),
    };
    Ok(LockInformation::new(
        owner,
        version,
        now,
        now + Duration::seconds(lease_seconds),
    ))
}

async fn demo(storage: &Engine) -> anyhow::Result<()> {
    storage.init().await?;

    let lock_id = format!("demo-{}", uuid::Uuid::new_v4());
    let owner = format!("owner-{}", uuid::Uuid::new_v4());
    let v1 = Version::new(1);
    let v2 = Version::new(2);

    let first = lease_for(storage, &owner, v1, 30).await?;
    storage.create_with_version(&lock_id, v1, &first).await?;
    println!("created   {lock_id}: {}", storage.get(&lock_id).await?);

    let renewed = lease_for(storage, &owner, v2, 30).await?;
    storage
        .update_with_version(&lock_id, v1, v2, &renewed)
        .await?;
    println!("renewed   {lock_id}: {}", storage.get(&lock_id).await?);

    match storage.update_with_version(&lock_id, v1, v2, &renewed).await {
        Err(err) if err.is_conflict() => println!("stale     {lock_id}: {err}"),
        Err(err) => return Err(err.into()),
        Ok(()) => anyhow::bail!("stale update of {lock_id} was accepted"),
    }

    storage.delete_with_version(&lock_id, v2, &renewed).await?;
    match storage.get(&lock_id).await {
        Err(err) if err.is_not_found() => println!("released  {lock_id}"),
        Err(err) => return Err(err.into()),
        Ok(payload) => anyhow::bail!("{lock_id} still stored after delete: {payload}"),
    }
    Ok(())
}
