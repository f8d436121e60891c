use crate::backup::file_name::BackupFileNamer;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::{convert_error_vec, Result};
use crate::backup::result_error::WithMsg;
use chrono::NaiveDateTime;
use itertools::Itertools;
use std::fs::read_dir;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct ItemWithDateTime<R> {
    pub item: R,
    pub date_time: NaiveDateTime,
}

impl<R> From<(R, NaiveDateTime)> for ItemWithDateTime<R> {
    fn from(value: (R, NaiveDateTime)) -> Self {
        Self {
            item: value.0,
            date_time: value.1,
        }
    }
}

/// Items beyond the newest `keep_count`, newest first. Ties on the timestamp
/// are broken by the item so the result does not depend on input order.
pub fn get_delete<R, I>(items: I, keep_count: usize) -> Vec<R>
where
    R: Ord,
    I: IntoIterator<Item = ItemWithDateTime<R>>,
{
    items
        .into_iter()
        .sorted_unstable_by(|a, b| {
            b.date_time
                .cmp(&a.date_time)
                .then_with(|| b.item.cmp(&a.item))
        })
        .skip(keep_count)
        .map(|i| i.item)
        .collect()
}

/// Backups in `dir` that `namer` recognises, with their timestamps.
pub fn list_backups<P: AsRef<Path>>(
    dir: P,
    namer: &BackupFileNamer,
) -> Result<Vec<ItemWithDateTime<PathBuf>>> {
    Ok(read_dir(dir.as_ref())?
        .filter_map(|r| r.ok())
        .filter(|r| r.file_type().is_ok_and(|t| t.is_file()))
        .filter_map(|r| {
            let path = r.path();
            namer
                .date_time_of(&path)
                .map(|dt| ItemWithDateTime::from((path, dt)))
        })
        .collect())
}

/// Deletes all but the newest `keep_count` backups in `dir`.
///
/// Returns the removed paths; failures to remove individual files are
/// collected into the second element instead of aborting.
pub fn prune<P: AsRef<Path>>(
    dir: P,
    namer: &BackupFileNamer,
    keep_count: usize,
) -> Result<(Vec<PathBuf>, Option<Error>)> {
    let backups = list_backups(dir.as_ref(), namer)
        .with_msg(format!("Listing backups in {:?} failed", dir.as_ref()))?;
    info!(
        "Found {} backups in {:?}, keeping {}",
        backups.len(),
        dir.as_ref(),
        keep_count
    );

    let mut removed = Vec::new();
    let mut errors = Vec::new();
    for to_delete in get_delete(backups, keep_count) {
        info!("Removing out of retention file {:?}", &to_delete);
        match std::fs::remove_file(&to_delete) {
            Ok(()) => removed.push(to_delete),
            Err(e) => {
                errors.push(Error::from(e).with_msg(format!("Removing {:?} failed", to_delete)))
            }
        }
    }

    Ok((removed, convert_error_vec(errors).err()))
}
