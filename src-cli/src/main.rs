use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use dw_core::clock::SystemClock;
use dw_core::config::DownwatchConfig;
use dw_core::directory::{InMemoryPrincipalDirectory, InMemoryTargetDirectory};
use dw_core::error::{codes, AppError};
use dw_core::notify::NotificationDispatcher;
use dw_core::report::render_monthly_markdown;
use dw_core::service::IncidentService;
use dw_core::store::IncidentStore;
use dw_core::validate;
use dw_push::fcm::provider_from_config;

#[derive(Debug, Parser)]
#[command(name = "downwatch", version, about = "Track downtime incidents for monitored targets")]
struct Cli {
    /// SQLite database file.
    #[arg(long, env = "DOWNWATCH_DB_PATH", global = true)]
    db: Option<PathBuf>,

    /// JSON array of targets: [{"id", "name", "address"}].
    #[arg(long, env = "DOWNWATCH_TARGETS_PATH", global = true)]
    targets: Option<PathBuf>,

    /// JSON object mapping principal id to display name.
    #[arg(long, env = "DOWNWATCH_PRINCIPALS_PATH", global = true)]
    principals: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create or migrate the database.
    Init,
    /// Report a status (UP, DOWN, UNKNOWN) for a target.
    Report {
        target_id: String,
        status: String,
        #[arg(long = "by")]
        reported_by: String,
    },
    /// Resolve an open incident with a note.
    Resolve {
        incident_id: String,
        #[arg(long = "by")]
        resolved_by: String,
        #[arg(long)]
        note: String,
    },
    /// List incidents, most recent first.
    List {
        #[arg(long = "target")]
        target_id: Option<String>,
        #[arg(long)]
        limit: Option<i64>,
    },
    /// Downtime statistics for a calendar month.
    Monthly {
        #[arg(allow_negative_numbers = true)]
        year: i64,
        #[arg(allow_negative_numbers = true)]
        month: i64,
        #[arg(long)]
        markdown: bool,
    },
}

#[derive(Debug, Serialize)]
struct InitResponse {
    db_path: String,
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn ensure_parent_dir(db_path: &Path) -> Result<(), AppError> {
    match db_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => fs::create_dir_all(dir).map_err(|e| {
            AppError::new(codes::DB_OPEN_FAILED, "Failed to create database directory")
                .with_details(format!("path={}; err={}", dir.display(), e))
        }),
        _ => Ok(()),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    let out = serde_json::to_string_pretty(value).map_err(|e| {
        AppError::new("OUTPUT_ENCODE_FAILED", "Failed to encode output")
            .with_details(e.to_string())
    })?;
    println!("{out}");
    Ok(())
}

fn build_service(config: &DownwatchConfig) -> Result<IncidentService, AppError> {
    let store = Arc::new(IncidentStore::open(&config.db_path, Arc::new(SystemClock))?);

    let targets = match &config.targets_path {
        Some(path) => InMemoryTargetDirectory::from_json_file(path)?,
        None => {
            tracing::warn!("no target directory configured; every report will be NOT_FOUND");
            InMemoryTargetDirectory::default()
        }
    };

    let dispatcher = NotificationDispatcher::from_provider(provider_from_config(&config.push))
        .with_topic(config.push.topic.clone());

    Ok(
        IncidentService::new(store, Arc::new(targets), Arc::new(dispatcher))
            .with_background_notifications(config.notify_in_background),
    )
}

fn run(cli: Cli) -> Result<(), AppError> {
    let mut config = DownwatchConfig::from_env()?;
    if let Some(db) = cli.db {
        config.db_path = db;
    }
    if let Some(targets) = cli.targets {
        config.targets_path = Some(targets);
    }
    if let Some(principals) = cli.principals {
        config.principals_path = Some(principals);
    }
    ensure_parent_dir(&config.db_path)?;

    match cli.command {
        Command::Init => {
            let _store = IncidentStore::open(&config.db_path, Arc::new(SystemClock))?;
            print_json(&InitResponse {
                db_path: config.db_path.to_string_lossy().to_string(),
            })
        }
        Command::Report {
            target_id,
            status,
            reported_by,
        } => {
            let service = build_service(&config)?;
            let outcome = service.report_status(&target_id, &status, &reported_by);
            // Background dispatch threads must finish before the process exits.
            service.wait_for_pending_notifications();
            print_json(&outcome?)
        }
        Command::Resolve {
            incident_id,
            resolved_by,
            note,
        } => {
            let service = build_service(&config)?;
            let incident = service.resolve_incident(&incident_id, &resolved_by, &note)?;
            print_json(&incident)
        }
        Command::List { target_id, limit } => {
            let service = build_service(&config)?;
            match &config.principals_path {
                Some(path) => {
                    let principals = InMemoryPrincipalDirectory::from_json_file(path)?;
                    let views =
                        service.list_incident_views(target_id.as_deref(), limit, &principals)?;
                    print_json(&views)
                }
                None => print_json(&service.list_incidents(target_id.as_deref(), limit)?),
            }
        }
        Command::Monthly {
            year,
            month,
            markdown,
        } => {
            let (year, month) = validate::parse_report_period(year, month)?;
            let service = build_service(&config)?;
            let rows = service.monthly_report(year, month)?;
            if markdown {
                print!("{}", render_monthly_markdown(year, month, &rows));
                Ok(())
            } else {
                print_json(&rows)
            }
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(code = %e.code, error = %e, "command failed");
            match serde_json::to_string_pretty(&e) {
                Ok(json) => println!("{json}"),
                Err(_) => println!("{e}"),
            }
            ExitCode::FAILURE
        }
    }
}
