//! notefs-sync: keeps note files on disk in step with a notefs server.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use notefs_sync::editor::forward_saves;
use notefs_sync::remote::forward_events;
use notefs_sync::{DiskNotes, Dispatcher, EventReader, NinepRemote, SyncConfig};

#[derive(Parser)]
#[command(name = "notefs-sync")]
#[command(author, version, about = "Synchronize note files with a notefs server")]
#[command(propagate_version = true)]
struct Cli {
    /// Server address (overrides NOTEFS_ADDR)
    #[arg(short, long, global = true)]
    addr: Option<String>,

    /// Notes directory (overrides NOTEFS_DIR)
    #[arg(short, long, global = true)]
    dir: Option<PathBuf>,

    /// Extension for new note files (overrides NOTEFS_EXT)
    #[arg(short, long, global = true)]
    ext: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply server events to disk until the server goes away
    Watch {
        /// Editor log to follow for saves ("-" for stdin)
        #[arg(long)]
        editor_log: Option<PathBuf>,
    },

    /// Push every note file on disk to the server once
    Reconcile,
}

/// Daily-rotated file output when `LOG_FILE` is set, JSON when
/// `LOG_FORMAT=json`, filtered by `RUST_LOG`.
fn init_logging() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let json = std::env::var("LOG_FORMAT").map(|v| v == "json").unwrap_or(false);
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "notefs_sync=info".into());
    let registry = tracing_subscriber::registry().with(env_filter);

    match std::env::var("LOG_FILE").ok() {
        Some(path) => {
            let path = std::path::Path::new(&path);
            let dir = path.parent().unwrap_or(std::path::Path::new("."));
            let name = path
                .file_name()
                .and_then(|f| f.to_str())
                .unwrap_or("notefs-sync.log");
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, name));
            if json {
                registry
                    .with(tracing_subscriber::fmt::layer().json().with_writer(writer))
                    .init();
            } else {
                registry
                    .with(
                        tracing_subscriber::fmt::layer()
                            .with_writer(writer)
                            .with_ansi(false),
                    )
                    .init();
            }
            Some(guard)
        }
        None => {
            if json {
                registry.with(tracing_subscriber::fmt::layer().json()).init();
            } else {
                registry.with(tracing_subscriber::fmt::layer()).init();
            }
            None
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let _log_guard = init_logging();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "notefs-sync failed");
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = SyncConfig::from_env();
    if let Some(addr) = cli.addr {
        config = config.with_addr(addr);
    }
    if let Some(dir) = cli.dir {
        config = config.with_notes_dir(dir);
    }
    if let Some(ext) = cli.ext {
        config = config.with_extension(&ext);
    }

    let disk = DiskNotes::new(&config.notes_dir, config.extension.clone())?;
    let remote = NinepRemote::connect(&config).await?;
    let mut dispatcher = Dispatcher::new(remote, disk);

    match cli.command {
        Commands::Reconcile => {
            let report = dispatcher.reconcile().await?;
            println!(
                "scanned {} synced {} failed {}",
                report.scanned, report.synced, report.failed
            );
        }
        Commands::Watch { editor_log } => {
            let (tx, rx) = mpsc::channel(notefs_core::defaults::EVENT_QUEUE_CAPACITY);

            let events = EventReader::connect(&config).await?;
            let events_tx = tx.clone();
            tokio::spawn(async move {
                if let Err(e) = forward_events(events, events_tx).await {
                    error!(subsystem = "sync", component = "events", error = %e, "Event stream failed");
                }
            });

            if let Some(log) = editor_log {
                let saves_tx = tx.clone();
                tokio::spawn(async move {
                    let result = if log.as_os_str() == "-" {
                        forward_saves(BufReader::new(tokio::io::stdin()), saves_tx).await
                    } else {
                        match tokio::fs::File::open(&log).await {
                            Ok(file) => forward_saves(BufReader::new(file), saves_tx).await,
                            Err(e) => Err(e.into()),
                        }
                    };
                    if let Err(e) = result {
                        error!(subsystem = "sync", component = "editor", error = %e, "Editor log failed");
                    }
                });
            }
            drop(tx);

            info!(
                subsystem = "sync",
                addr = %config.addr,
                notes_dir = %dispatcher.disk().base().display(),
                "Watching"
            );
            tokio::select! {
                _ = dispatcher.run(rx) => {}
                _ = tokio::signal::ctrl_c() => {
                    info!(subsystem = "sync", "Interrupted");
                }
            }
        }
    }

    Ok(())
}
