use clap::Parser;
use localbkup::backup::backup_config::{default_config_path, BackupConfig};
use localbkup::backup::result_error::result::Result;
use localbkup::backup::result_error::WithMsg;
use localbkup::backup::runner::run_backup;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;
use tracing::level_filters::LevelFilter;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

/// Makes a local backup of a list of files into a destination folder.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file. Defaults to ~/.config/localbkup.json
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Also write verbose logs to this file
    #[arg(short, long)]
    log_file: Option<PathBuf>,
}

fn open_log_file(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

fn init_tracing(log_file: Option<&Path>) {
    let log_file = log_file.and_then(|path| match open_log_file(path) {
        Ok(f) => Some(f),
        Err(e) => {
            eprintln!("Cannot open log file {:?}: {e}", path);
            None
        }
    });

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(LevelFilter::INFO),
        )
        .with(log_file.map(|f| {
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(f))
                .with_filter(LevelFilter::DEBUG)
        }))
        .init();
}

fn run(args: &Args) -> Result<()> {
    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => default_config_path()?,
    };
    info!("Loading configuration from {:?}", config_path);
    let config = BackupConfig::load(&config_path)
        .with_msg(format!("Loading config failed: {:?}", config_path))?;

    let report = run_backup(&config, chrono::Local::now())?;
    info!("Created backup file: {:?}", report.archive());
    for removed in report.removed() {
        info!("Removed old backup: {:?}", removed);
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.log_file.as_deref());

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::from(e.exit_status())
        }
    }
}
