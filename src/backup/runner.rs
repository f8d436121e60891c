//! Turns a [`BackupConfig`] into `tar | gpg` invocations and a timestamped
//! archive in the destination folder.
//!
//! The pipeline writes into a hidden temporary file next to the final archive.
//! Only after both tools exit successfully is that file synced and renamed into
//! place, so a failed run never leaves a partial archive behind.

use crate::backup::backup_config::BackupConfig;
use crate::backup::encrypt::Encryptor;
use crate::backup::file_ext::FileExtProvider;
use crate::backup::file_name::BackupFileNamer;
use crate::backup::result_error::error::{Error, RunError};
use crate::backup::result_error::result::{convert_error_vec, Result};
use crate::backup::result_error::WithDebugObjectAndFnName;
use crate::backup::retention;
use crate::backup::tool::Invocation;
use crate::backup::validate::validate_writable_dir;
use chrono::{DateTime, TimeZone};
use getset::Getters;
use itertools::Itertools;
use std::fmt::Display;
use std::fs::File;
use std::io;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Child, Stdio};
use tracing::{debug, info, warn};

#[derive(Debug, Getters)]
#[getset(get = "pub")]
pub struct BackupReport {
    archive: PathBuf,
    /// Older backups deleted by retention
    removed: Vec<PathBuf>,
}

pub fn run_backup<Tz: TimeZone>(config: &BackupConfig, now: DateTime<Tz>) -> Result<BackupReport> {
    let dest = config.destination_folder();
    validate_writable_dir(dest).map_err(|e| not_writable(dest, e))?;

    let file_ext = config.file_ext().unwrap_or_else(|| "".into());
    let namer = BackupFileNamer::new(config.archive_base_name(), &file_ext);
    let archive = namer.file_path(dest, &now);
    if archive.exists() {
        return Err(RunError::AlreadyExists(archive).into());
    }

    let tmp = tempfile::Builder::new()
        .prefix(&format!(".{}_", config.archive_base_name()))
        .suffix(".tmp")
        .tempfile_in(dest)
        .map_err(|e| not_writable(dest, e))?;
    debug!("Writing archive stream to {:?}", tmp.path());

    write_archive(config, tmp.as_file())
        .with_debug_object_and_fn_name(config.clone(), "write_archive")?;

    tmp.as_file().sync_all()?;
    tmp.persist_noclobber(&archive).map_err(|e| match e.error.kind() {
        ErrorKind::AlreadyExists => RunError::AlreadyExists(archive.clone()),
        _ => RunError::Io(e.error),
    })?;
    info!("Wrote final file {:?}", archive);

    let removed = match config.keep_count() {
        Some(keep_count) => match retention::prune(dest, &namer, *keep_count) {
            Ok((removed, non_fatal_error)) => {
                if let Some(e) = non_fatal_error {
                    warn!("Received non fatal error: {e}");
                }
                removed
            }
            Err(e) => {
                warn!("Skipping retention cleanup: {e}");
                Vec::new()
            }
        },
        None => Vec::new(),
    };

    Ok(BackupReport { archive, removed })
}

fn not_writable<E: Display>(dest: &Path, e: E) -> RunError {
    RunError::DestinationNotWritable {
        path: dest.to_path_buf(),
        reason: e.to_string(),
    }
}

fn write_archive(config: &BackupConfig, out: &File) -> Result<()> {
    let archiver = config.archiver().invocation();
    let encryptor = config.encryptor();
    let out = out.try_clone()?;

    match encryptor.invocation() {
        None => {
            warn!("No password configured, backup will not be encrypted");
            info!("Running shell command: {archiver}");
            let status = archiver
                .command()
                .stdin(Stdio::null())
                .stdout(out)
                .status()
                .map_err(|e| archiver.spawn_error(e))?;
            Ok(archiver.check_status(status)?)
        }
        Some(encryption) => pipe_archive(&archiver, &encryption, &encryptor, out),
    }
}

fn pipe_archive(
    archiver: &Invocation,
    encryption: &Invocation,
    encryptor: &Encryptor,
    out: File,
) -> Result<()> {
    info!("Running shell command: {archiver} | {encryption}");
    let mut archiver_child = archiver
        .command()
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .spawn()
        .map_err(|e| archiver.spawn_error(e))?;

    let mut encryption_child = match encryption
        .command()
        .stdin(Stdio::piped())
        .stdout(out)
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            let _ = archiver_child.kill();
            let _ = archiver_child.wait();
            return Err(encryption.spawn_error(e).into());
        }
    };

    let streamed = stream(&mut archiver_child, &mut encryption_child, encryptor);
    let archiver_status = archiver_child.wait()?;
    let encryption_status = encryption_child.wait()?;

    convert_error_vec(
        [
            archiver.check_status(archiver_status).err(),
            encryption.check_status(encryption_status).err(),
        ]
        .into_iter()
        .flatten()
        .map(Error::from)
        .collect_vec(),
    )?;

    let bytes = streamed?;
    debug!(
        "Streamed {bytes} bytes from {} to {}",
        archiver.program_name(),
        encryption.program_name()
    );
    Ok(())
}

/// Copies the archiver's stdout into the encryptor's stdin. Both pipe ends are
/// closed on return so each child sees EOF or a broken pipe.
fn stream(archiver: &mut Child, encryption: &mut Child, encryptor: &Encryptor) -> io::Result<u64> {
    let mut archive_out = archiver
        .stdout
        .take()
        .ok_or_else(|| io::Error::other("archiver stdout is not piped"))?;
    let mut encryption_in = encryption
        .stdin
        .take()
        .ok_or_else(|| io::Error::other("encryptor stdin is not piped"))?;

    encryptor.write_preamble(&mut encryption_in)?;
    io::copy(&mut archive_out, &mut encryption_in)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::backup::redacted::RedactedString;
    use crate::backup::tool::ToolConfig;
    use chrono::Utc;
    use tempfile::TempDir;

    /// Prints its arguments, one `[arg]` each, in place of a real archive.
    const FAKE_TAR: &str = "printf 'ARCHIVE'\nfor a in \"$@\"; do printf ' [%s]' \"$a\"; done\nprintf '\\n'\n";
    /// Reads the passphrase line, then echoes the remaining stream.
    const FAKE_GPG: &str = "IFS= read -r pw\nprintf 'ENC(%s)\\n' \"$pw\"\ncat\n";

    struct Fixture {
        dir: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                dir: TempDir::new().unwrap(),
            }
        }

        fn dest(&self) -> PathBuf {
            self.dir.path().join("dest")
        }

        /// Tools are run through `sh` so the scripts never need exec permission.
        fn script_tool(&self, name: &str, body: &str) -> ToolConfig {
            let path = self.dir.path().join(name);
            std::fs::write(&path, body).unwrap();
            ToolConfig::builder()
                .program("sh")
                .extra_args(vec![path.to_string_lossy().into_owned()])
                .build()
        }

        fn dest_entries(&self) -> Vec<String> {
            std::fs::read_dir(self.dest())
                .unwrap()
                .map(|e| e.unwrap().file_name().into_string().unwrap())
                .sorted()
                .collect()
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 10, 12, 4, 5, 6).unwrap()
    }

    #[test]
    fn test_pipeline_writes_encrypted_archive() {
        let fx = Fixture::new();
        let config = BackupConfig::builder()
            .files(vec![PathBuf::from("/a"), PathBuf::from("/b c")])
            .exclude(vec!["*.o".to_string(), "/a/tmp".to_string()])
            .password(RedactedString::builder().inner("pw 1").build())
            .destination_folder(fx.dest())
            .tar(fx.script_tool("tar.sh", FAKE_TAR))
            .gpg(fx.script_tool("gpg.sh", FAKE_GPG))
            .build();

        let report = run_backup(&config, now()).unwrap();

        assert_eq!(
            report.archive(),
            &fx.dest().join("localbkup_20201012T040506.tar.gz.gpg")
        );
        assert!(report.removed().is_empty());
        assert_eq!(
            std::fs::read_to_string(report.archive()).unwrap(),
            "ENC(pw 1)\nARCHIVE [-zcf] [-] [--exclude] [*.o] [--exclude] [/a/tmp] [/a] [/b c]\n"
        );
        assert_eq!(fx.dest_entries(), vec!["localbkup_20201012T040506.tar.gz.gpg"]);
    }

    #[test]
    fn test_without_password_skips_encryption() {
        let fx = Fixture::new();
        let config = BackupConfig::builder()
            .files(vec![PathBuf::from("/a")])
            .destination_folder(fx.dest())
            .tar(fx.script_tool("tar.sh", FAKE_TAR))
            .gpg(fx.script_tool("gpg.sh", "exit 9\n"))
            .build();

        let report = run_backup(&config, now()).unwrap();

        assert_eq!(
            report.archive(),
            &fx.dest().join("localbkup_20201012T040506.tar.gz")
        );
        assert_eq!(
            std::fs::read_to_string(report.archive()).unwrap(),
            "ARCHIVE [-zcf] [-] [/a]\n"
        );
    }

    #[test]
    fn test_failing_archiver_is_run_error_and_leaves_nothing() {
        let fx = Fixture::new();
        let config = BackupConfig::builder()
            .files(vec![PathBuf::from("/a")])
            .password(RedactedString::builder().inner("pw").build())
            .destination_folder(fx.dest())
            .tar(fx.script_tool("tar.sh", "printf 'partial'\nexit 2\n"))
            .gpg(fx.script_tool("gpg.sh", FAKE_GPG))
            .build();

        let err = run_backup(&config, now()).unwrap_err();

        assert!(err.is_run());
        assert!(!err.is_config());
        assert!(err.to_string().contains("exited unsuccessfully"));
        assert!(fx.dest_entries().is_empty());
    }

    #[test]
    fn test_failing_encryptor_is_run_error_and_leaves_nothing() {
        let fx = Fixture::new();
        let config = BackupConfig::builder()
            .files(vec![PathBuf::from("/a")])
            .password(RedactedString::builder().inner("pw").build())
            .destination_folder(fx.dest())
            .tar(fx.script_tool("tar.sh", FAKE_TAR))
            .gpg(fx.script_tool("gpg.sh", "cat > /dev/null\nprintf 'junk'\nexit 3\n"))
            .build();

        let err = run_backup(&config, now()).unwrap_err();

        assert!(err.is_run());
        assert!(fx.dest_entries().is_empty());
    }

    #[test]
    fn test_failing_archiver_without_encryption_leaves_nothing() {
        let fx = Fixture::new();
        let config = BackupConfig::builder()
            .files(vec![PathBuf::from("/a")])
            .destination_folder(fx.dest())
            .tar(fx.script_tool("tar.sh", "printf 'partial'\nexit 1\n"))
            .build();

        assert!(run_backup(&config, now()).unwrap_err().is_run());
        assert!(fx.dest_entries().is_empty());
    }

    #[test]
    fn test_missing_tool_is_run_error() {
        let fx = Fixture::new();
        let config = BackupConfig::builder()
            .files(vec![PathBuf::from("/a")])
            .password(RedactedString::builder().inner("pw").build())
            .destination_folder(fx.dest())
            .tar(fx.script_tool("tar.sh", FAKE_TAR))
            .gpg(ToolConfig::builder().program("no-such-gpg-binary-xyz").build())
            .build();

        let err = run_backup(&config, now()).unwrap_err();

        assert!(err.is_run());
        assert!(err.to_string().contains("no-such-gpg-binary-xyz"));
        assert!(fx.dest_entries().is_empty());
    }

    #[test]
    fn test_unwritable_destination_is_run_error() {
        let fx = Fixture::new();
        let blocker = fx.dir.path().join("blocker");
        std::fs::write(&blocker, "a file, not a directory").unwrap();
        let config = BackupConfig::builder()
            .files(vec![PathBuf::from("/a")])
            .destination_folder(blocker.join("sub"))
            .tar(fx.script_tool("tar.sh", FAKE_TAR))
            .build();

        let err = run_backup(&config, now()).unwrap_err();

        assert!(matches!(
            err,
            Error::Run(RunError::DestinationNotWritable { .. })
        ));
    }

    #[test]
    fn test_existing_archive_is_not_overwritten() {
        let fx = Fixture::new();
        std::fs::create_dir_all(fx.dest()).unwrap();
        let existing = fx.dest().join("localbkup_20201012T040506.tar.gz");
        std::fs::write(&existing, "older run").unwrap();
        let config = BackupConfig::builder()
            .files(vec![PathBuf::from("/a")])
            .destination_folder(fx.dest())
            .tar(fx.script_tool("tar.sh", FAKE_TAR))
            .build();

        let err = run_backup(&config, now()).unwrap_err();

        assert!(matches!(err, Error::Run(RunError::AlreadyExists(_))));
        assert_eq!(std::fs::read_to_string(&existing).unwrap(), "older run");
        assert_eq!(fx.dest_entries(), vec!["localbkup_20201012T040506.tar.gz"]);
    }

    #[test]
    fn test_successive_runs_sort_chronologically_and_prune() {
        let fx = Fixture::new();
        let config = BackupConfig::builder()
            .files(vec![PathBuf::from("/a")])
            .destination_folder(fx.dest())
            .keep_count(2)
            .tar(fx.script_tool("tar.sh", FAKE_TAR))
            .build();

        let times = [
            Utc.with_ymd_and_hms(2020, 9, 30, 23, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2020, 10, 1, 1, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2020, 10, 1, 13, 0, 0).unwrap(),
        ];
        let reports: Vec<_> = times
            .iter()
            .map(|t| run_backup(&config, *t).unwrap())
            .collect();

        for pair in reports.windows(2) {
            assert!(pair[0].archive() < pair[1].archive());
            assert!(pair[1].archive().starts_with(fx.dest()));
        }
        assert!(reports[0].removed().is_empty());
        assert!(reports[1].removed().is_empty());
        assert_eq!(reports[2].removed(), &vec![reports[0].archive().clone()]);
        assert_eq!(
            fx.dest_entries(),
            vec![
                "localbkup_20201001T010000.tar.gz",
                "localbkup_20201001T130000.tar.gz",
            ]
        );
    }

    #[test]
    fn test_retention_keeps_checksum_files() {
        let fx = Fixture::new();
        std::fs::create_dir_all(fx.dest()).unwrap();
        let checksum = fx.dest().join("localbkup_20200101T000000.tar.gz.sha256");
        let older = fx.dest().join("localbkup_20200102T000000.tar.gz");
        std::fs::write(&checksum, "abc  localbkup_20200101T000000.tar.gz").unwrap();
        std::fs::write(&older, "older run").unwrap();
        let config = BackupConfig::builder()
            .files(vec![PathBuf::from("/a")])
            .destination_folder(fx.dest())
            .keep_count(1)
            .tar(fx.script_tool("tar.sh", FAKE_TAR))
            .build();

        let report = run_backup(&config, now()).unwrap();

        assert_eq!(report.removed(), &vec![older]);
        assert_eq!(
            fx.dest_entries(),
            vec![
                "localbkup_20200101T000000.tar.gz.sha256",
                "localbkup_20201012T040506.tar.gz",
            ]
        );
    }

    #[test]
    fn test_real_tar_produces_gzip_stream() {
        let installed = |program: &str| {
            std::process::Command::new(program)
                .arg("--version")
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .is_ok_and(|s| s.success())
        };
        if !installed("tar") || !installed("gzip") {
            return;
        }

        let fx = Fixture::new();
        let src = fx.dir.path().join("src");
        std::fs::create_dir_all(src.join("skip")).unwrap();
        std::fs::write(src.join("keep.txt"), "keep me").unwrap();
        std::fs::write(src.join("skip/ignored.txt"), "ignore me").unwrap();
        let config = BackupConfig::builder()
            .files(vec![src])
            .exclude(vec!["skip".to_string()])
            .destination_folder(fx.dest())
            .build();

        let report = run_backup(&config, now()).unwrap();

        let bytes = std::fs::read(report.archive()).unwrap();
        assert_eq!(&bytes[..2], &[0x1f_u8, 0x8b]);
    }
}
