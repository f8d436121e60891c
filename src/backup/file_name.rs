use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use std::path::{Path, PathBuf};

/// Fixed width, so names sort in chronological order.
pub static TIME_FORMAT: &str = "%Y%m%dT%H%M%S";

/// Extensions of plain and encrypted backups. Anything else next to them,
/// `.tar.gz.sha256` or `.tar.gz.part` included, is not a backup.
pub static BACKUP_FILE_EXTS: [&str; 2] = ["tar.gz", "tar.gz.gpg"];

/// Builds and parses `<base>_<timestamp>.<ext>` backup file names.
#[derive(Clone, Debug)]
pub struct BackupFileNamer<'a> {
    base_name: &'a str,
    file_ext: &'a str,
}

impl<'a> BackupFileNamer<'a> {
    pub fn new(base_name: &'a str, file_ext: &'a str) -> Self {
        Self {
            base_name,
            file_ext,
        }
    }

    /// The timestamp is always written in UTC so that wall clock changes
    /// never make a later backup sort first.
    pub fn file_name<Tz: TimeZone>(&self, dt: &DateTime<Tz>) -> String {
        format!(
            "{}_{}.{}",
            self.base_name,
            dt.with_timezone(&Utc).format(TIME_FORMAT),
            self.file_ext
        )
    }

    pub fn file_path<Tz: TimeZone, P: AsRef<Path>>(&self, dir: P, dt: &DateTime<Tz>) -> PathBuf {
        dir.as_ref().join(self.file_name(dt))
    }

    /// Timestamp of a previously written backup, plain or encrypted.
    pub fn date_time_of<P: AsRef<Path>>(&self, file_path: P) -> Option<NaiveDateTime> {
        let file_name = file_path.as_ref().file_name()?.to_str()?;
        let rest = file_name
            .strip_prefix(self.base_name)?
            .strip_prefix('_')?;
        let (time_string, ext) = rest.split_once('.')?;
        if ext != self.file_ext && !BACKUP_FILE_EXTS.contains(&ext) {
            return None;
        }
        if time_string.len() != "YYYYmmddTHHMMSS".len() {
            return None;
        }

        NaiveDateTime::parse_from_str(time_string, TIME_FORMAT).ok()
    }
}
