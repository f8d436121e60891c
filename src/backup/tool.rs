//! External tool configuration and invocation.

use crate::backup::result_error::error::RunError;
use bon::Builder;
use getset::Getters;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::process::{Command, ExitStatus};

/// Executable used for one stage of the pipeline.
///
/// `extra_args` are placed before the arguments built by the runner, so users
/// can pass things like `--cipher-algo AES256` to gpg.
#[derive(Clone, Debug, Serialize, Deserialize, Builder, PartialEq, Eq, Getters)]
#[serde(deny_unknown_fields)]
#[getset(get = "pub")]
pub struct ToolConfig {
    #[builder(into)]
    program: PathBuf,
    #[serde(default)]
    #[builder(default, into)]
    extra_args: Vec<String>,
}

impl ToolConfig {
    pub fn tar() -> Self {
        Self::builder().program("tar").build()
    }

    pub fn gpg() -> Self {
        Self::builder().program("gpg").build()
    }

    pub fn invocation<I, S>(&self, args: I) -> Invocation
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Invocation {
            program: self.program.clone(),
            args: self
                .extra_args
                .iter()
                .map(OsString::from)
                .chain(args.into_iter().map(Into::into))
                .collect(),
        }
    }
}

/// A fully built command line.
#[derive(Clone, Debug, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct Invocation {
    program: PathBuf,
    args: Vec<OsString>,
}

impl Invocation {
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }

    pub fn program_name(&self) -> String {
        self.program.display().to_string()
    }

    pub fn spawn_error(&self, source: std::io::Error) -> RunError {
        RunError::Spawn {
            program: self.program_name(),
            source,
        }
    }

    pub fn check_status(&self, status: ExitStatus) -> Result<(), RunError> {
        if status.success() {
            Ok(())
        } else {
            Err(RunError::ToolFailed {
                program: self.program_name(),
                status,
            })
        }
    }
}

impl Display for Invocation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {}",
            self.program.display(),
            self.args.iter().map(|a| a.to_string_lossy()).join(" ")
        )
    }
}
