//! # localbkup
//!
//! A personal backup tool meant to be triggered by an OS scheduler (cron,
//! systemd timers, ...). Each run archives the configured files with `tar`,
//! encrypts the stream with `gpg` and writes a timestamped archive into the
//! destination folder.
//!
//! ## Features
//!
//! - **Config**: JSON or YAML, validated before anything runs
//! - **Pipeline**: `tar -zcf -` piped into `gpg --symmetric`, passphrase never on the command line
//! - **Safe output**: written to a temp file and renamed only when both tools succeed
//! - **Retention**: optional `keep_count` of newest backups
//!
//! ## Quick Start
//!
//! ```no_run
//! use localbkup::backup::backup_config::BackupConfig;
//! use localbkup::backup::runner::run_backup;
//!
//! let config = BackupConfig::load("/home/me/.config/localbkup.json")?;
//! let report = run_backup(&config, chrono::Local::now())?;
//! println!("{:?}", report.archive());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod backup;
