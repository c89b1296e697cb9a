//! suns binary entry point.

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use suns::lifecycle::RecordFilter;
use suns::{
    telemetry, AttestRequest, AttestationEngine, ChangeEvent, ClaimResolver, ClaimServer, Config,
    FileSnapshotStore, FileStore, LifecycleManager, RecordStore, SunsError, ViewSync,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Attest and maintain DNS domain symmetry groups.
#[derive(Parser, Debug)]
#[command(name = "suns")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML). Missing files fall back to defaults.
    #[arg(short, long, default_value = "suns.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Attest a group and store its records if valid.
    Attest {
        /// Owner the group identifier is derived from.
        #[arg(long)]
        owner: String,

        /// Symmetry type, by name (e.g. Palindrome) or code (e.g. a).
        #[arg(long = "type")]
        symmetry: String,

        /// Member domains.
        #[arg(required = true)]
        domains: Vec<String>,
    },

    /// Re-attest every stored group against DNS.
    Reattest {
        /// Delete the records of groups that no longer attest.
        #[arg(long, conflicts_with = "update")]
        drop: bool,

        /// Refresh valid groups and delete invalid ones past the grace period.
        #[arg(long)]
        update: bool,
    },

    /// Revalidate stored groups without querying DNS.
    FindInvalid {
        /// Only groups with a record owned by this owner.
        #[arg(long)]
        owner: Option<String>,

        /// Only groups with a record for this hostname.
        #[arg(long)]
        hostname: Option<String>,

        /// Only this group.
        #[arg(long)]
        group_id: Option<String>,

        /// Delete the invalid records found.
        #[arg(long)]
        drop: bool,
    },

    /// Apply change events to the materialized view snapshot.
    Sync {
        /// File with one JSON array of change events (a batch) per line.
        #[arg(long)]
        events: PathBuf,
    },

    /// Publish stored claims over DNS.
    Serve,
}

fn load_config(path: &Path) -> Result<Config, config::ConfigError> {
    config::Config::builder()
        .add_source(config::File::from(path).required(false))
        .add_source(
            config::Environment::with_prefix("SUNS")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()
}

fn print_json<T: Serialize>(value: &T) -> Result<(), SunsError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn shutdown_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    let signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            signal.cancel();
        }
    });
    cancel
}

fn read_batches(path: &Path) -> Result<Vec<Vec<ChangeEvent>>, SunsError> {
    let contents = std::fs::read_to_string(path)?;
    let mut batches = Vec::new();
    for (line, text) in contents.lines().enumerate() {
        if text.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Vec<ChangeEvent>>(text) {
            Ok(batch) => batches.push(batch),
            Err(e) => warn!(line = line + 1, error = %e, "skipping unreadable batch"),
        }
    }
    Ok(batches)
}

async fn run(config: Config, command: Command) -> Result<ExitCode, SunsError> {
    let cancel = shutdown_token();
    let store: Arc<dyn RecordStore> = Arc::new(FileStore::new(&config.storage.records_path));
    let engine = || -> Result<AttestationEngine, SunsError> {
        let resolver = ClaimResolver::from_settings(&config.resolver)?;
        Ok(AttestationEngine::new(resolver).with_store(store.clone()))
    };
    let manager = || -> Result<LifecycleManager, SunsError> {
        Ok(LifecycleManager::new(engine()?, store.clone())
            .with_grace_period_hours(config.lifecycle.grace_period_hours))
    };

    match command {
        Command::Attest {
            owner,
            symmetry,
            domains,
        } => {
            let request = AttestRequest {
                owner,
                symmetry,
                domains,
            };
            let response = engine()?.handle_request(&request, &cancel).await?;
            print_json(&response)?;
            if !response.is_valid {
                return Ok(ExitCode::from(2));
            }
        }
        Command::Reattest { drop, update } => {
            let manager = manager()?;
            if drop {
                print_json(&manager.reattest_all_and_drop(&cancel).await?)?;
            } else if update {
                print_json(&manager.reattest_all_and_update(&cancel).await?)?;
            } else {
                let mut invalid = 0;
                for outcome in manager.reattest_all(&cancel).await? {
                    let verdict = match &outcome.result {
                        Ok(result) => result.verdict.label().to_string(),
                        Err(e) => format!("error: {e}"),
                    };
                    if !matches!(&outcome.result, Ok(r) if r.is_valid()) {
                        invalid += 1;
                    }
                    println!("{}\t{}", outcome.group_id, verdict);
                }
                if invalid > 0 {
                    return Ok(ExitCode::from(2));
                }
            }
        }
        Command::FindInvalid {
            owner,
            hostname,
            group_id,
            drop,
        } => {
            let filter = RecordFilter {
                owner,
                hostname,
                group_id,
            };
            let manager = manager()?;
            if drop {
                print_json(&manager.find_invalid_and_drop(&filter, &cancel).await?)?;
            } else {
                let invalid = manager.find_invalid(&filter).await?;
                print_json(&invalid)?;
                if !invalid.is_empty() {
                    return Ok(ExitCode::from(2));
                }
            }
        }
        Command::Sync { events } => {
            let batches = read_batches(&events)?;
            info!(batches = batches.len(), "applying change events");
            let mut sync = ViewSync::new(Arc::new(FileSnapshotStore::new(&config.view.snapshot_path)));
            sync.run(futures::stream::iter(batches), cancel).await?;
        }
        Command::Serve => {
            let publisher = config
                .publisher
                .clone()
                .ok_or_else(|| SunsError::Config("serve requires a [publisher] section".into()))?;
            ClaimServer::new(publisher)
                .with_store(store.clone())
                .run(cancel)
                .await?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = load_config(&args.config)?;

    let guard = telemetry::init(&config.telemetry).map_err(|e| e as Box<dyn std::error::Error>)?;

    info!(config_file = %args.config.display(), command = ?args.command, "Starting suns");

    let result = run(config, args.command).await;

    drop(guard);

    match result {
        Ok(code) => Ok(code),
        Err(e) => {
            error!("suns failed: {}", e);
            Err(e.into())
        }
    }
}
