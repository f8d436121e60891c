use crate::backup::file_ext::FileExtProvider;
use crate::backup::tool::{Invocation, ToolConfig};
use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

static TAR_GZ_FILE_EXT: OnceLock<Arc<str>> = OnceLock::new();

/// Archival stage: gzip-compressed tar written to stdout.
#[derive(Debug)]
pub struct Archiver<'a> {
    pub tool: &'a ToolConfig,
    pub files: &'a [PathBuf],
    pub exclude: &'a [String],
}

impl Archiver<'_> {
    /// `-zcf -`, then one `--exclude` per pattern in order, then the files in order.
    pub fn args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-zcf".into(), "-".into()];
        for pattern in self.exclude {
            args.push("--exclude".into());
            args.push(pattern.into());
        }
        args.extend(self.files.iter().map(OsString::from));
        args
    }

    pub fn invocation(&self) -> Invocation {
        self.tool.invocation(self.args())
    }
}

impl FileExtProvider for Archiver<'_> {
    fn file_ext(&self) -> Option<Arc<str>> {
        Some(TAR_GZ_FILE_EXT.get_or_init(|| "tar.gz".into()).clone())
    }
}
