use crate::backup::result_error::{WithDebugObjectAndFnName, WithMsg};
use itertools::Itertools;
use std::fmt::Debug;
use std::path::PathBuf;
use std::process::ExitStatus;
use thiserror::Error;

/// Failures while locating, reading, parsing or validating the configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot determine home directory for the default config path")]
    NoHomeDir,
    #[error("cannot read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Yaml(#[from] serde_yml::Error),
    #[error(transparent)]
    Validation(#[from] validator::ValidationErrors),
}

/// Failures while producing the backup archive.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("destination folder {path:?} is not writable: {reason}")]
    DestinationNotWritable { path: PathBuf, reason: String },
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("{program} exited unsuccessfully ({status})")]
    ToolFailed { program: String, status: ExitStatus },
    #[error("backup file {0:?} already exists")]
    AlreadyExists(PathBuf),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Run(#[from] RunError),
    #[error("{}:\n{}", msg, indent::indent_all_with("  ", error.to_string()))]
    WithMsg { msg: String, error: Box<Error> },
    #[error("{:?} {} failed:\n{}", obj_debug, fn_name, indent::indent_all_with("  ", error.to_string()))]
    WithDebugObjAndFnName {
        error: Box<Error>,
        obj_debug: Box<dyn Debug + Send>,
        fn_name: String,
    },
    #[error("{}", itertools::join(.0, "\n\n"))]
    LotsOfError(Vec<Error>),
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Run(RunError::Io(value))
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self::Config(value.into())
    }
}

impl From<serde_yml::Error> for Error {
    fn from(value: serde_yml::Error) -> Self {
        Self::Config(value.into())
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(value: validator::ValidationErrors) -> Self {
        Self::Config(value.into())
    }
}

impl<S: Into<String>, O: Debug + Send + 'static> WithDebugObjectAndFnName<S, O> for Error {
    fn with_debug_object_and_fn_name(self, obj: O, fn_name: S) -> Self {
        Error::WithDebugObjAndFnName {
            error: Box::new(self),
            obj_debug: Box::new(obj),
            fn_name: fn_name.into(),
        }
    }
}

impl<S: Into<String>> WithMsg<S> for Error {
    fn with_msg(self, msg: S) -> Self {
        Self::WithMsg {
            msg: msg.into(),
            error: Box::new(self),
        }
    }
}

impl From<Vec<Error>> for Error {
    fn from(errors: Vec<Error>) -> Self {
        if errors.is_empty() {
            panic!("Should not create lots of errors when error is empty")
        }
        Self::LotsOfError(errors.into_iter().flat_map(Error::into_iter).collect_vec())
    }
}

impl Error {
    pub fn into_iter(self) -> Box<dyn Iterator<Item = Error>> {
        match self {
            Error::LotsOfError(v) => Box::new(v.into_iter().flat_map(Error::into_iter)),
            e => Box::new(std::iter::once(e)),
        }
    }

    /// Process exit status: 2 when the configuration is at fault, 1 otherwise.
    pub fn exit_status(&self) -> u8 {
        if self.is_config() {
            2
        } else {
            1
        }
    }

    /// True when any underlying error is a [`ConfigError`].
    pub fn is_config(&self) -> bool {
        self.any(&|e| matches!(e, Error::Config(_)))
    }

    /// True when any underlying error is a [`RunError`].
    pub fn is_run(&self) -> bool {
        self.any(&|e| matches!(e, Error::Run(_)))
    }

    fn any(&self, pred: &dyn Fn(&Error) -> bool) -> bool {
        match self {
            Error::WithMsg { error, .. } | Error::WithDebugObjAndFnName { error, .. } => {
                error.any(pred)
            }
            Error::LotsOfError(v) => v.iter().any(|e| e.any(pred)),
            e => pred(e),
        }
    }
}
