use crate::backup::encrypt::Encryptor;
use crate::backup::file_ext::FileExtProvider;
use crate::backup::redacted::RedactedString;
use crate::backup::result_error::error::{ConfigError, Error};
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use crate::backup::tar::Archiver;
use crate::backup::tool::ToolConfig;
use crate::backup::validate::{validate_non_empty_path, validate_valid_archive_base_name};
use bon::Builder;
use directories::BaseDirs;
use getset::Getters;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use validator::Validate;

pub static DEFAULT_CONFIG_FILE_NAME: &str = "localbkup.json";
pub static DEFAULT_ARCHIVE_BASE_NAME: &str = "localbkup";

#[skip_serializing_none]
#[derive(Clone, Serialize, Deserialize, Debug, Validate, Builder, Getters)]
#[serde(deny_unknown_fields)]
#[getset(get = "pub")]
pub struct BackupConfig {
    #[validate(length(min = 1, message = "files must list at least one path"))]
    #[builder(into)]
    files: Vec<PathBuf>,
    #[serde(default)]
    #[builder(default, into)]
    exclude: Vec<String>,
    #[validate(nested)]
    #[builder(into)]
    password: Option<RedactedString>,
    #[validate(custom(function = validate_non_empty_path))]
    #[builder(into)]
    destination_folder: PathBuf,
    #[validate(range(min = 1))]
    keep_count: Option<usize>,
    #[serde(default = "default_archive_base_name")]
    #[validate(custom(function = validate_valid_archive_base_name))]
    #[builder(default = default_archive_base_name(), into)]
    archive_base_name: String,
    #[serde(default = "ToolConfig::tar")]
    #[builder(default = ToolConfig::tar())]
    tar: ToolConfig,
    #[serde(default = "ToolConfig::gpg")]
    #[builder(default = ToolConfig::gpg())]
    gpg: ToolConfig,
}

fn default_archive_base_name() -> String {
    DEFAULT_ARCHIVE_BASE_NAME.to_string()
}

/// `~/.config/localbkup.json`
pub fn default_config_path() -> Result<PathBuf> {
    let base_dirs = BaseDirs::new().ok_or(ConfigError::NoHomeDir)?;
    Ok(base_dirs
        .home_dir()
        .join(".config")
        .join(DEFAULT_CONFIG_FILE_NAME))
}

impl BackupConfig {
    /// Reads, parses and validates a config file. `.json` files are parsed as
    /// JSON, anything else as YAML.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let config: Self = if is_json {
            serde_json::from_str(&content)?
        } else {
            serde_yml::from_str(&content)?
        };

        config
            .validate()
            .map_err(Error::from)
            .with_msg(format!("Config validation failed: {:?}", path))?;

        Ok(config)
    }

    /// Passphrase to encrypt with; an empty password counts as none.
    pub fn passphrase(&self) -> Option<&RedactedString> {
        self.password.as_ref().filter(|p| !p.is_empty())
    }

    pub fn archiver(&self) -> Archiver<'_> {
        Archiver {
            tool: &self.tar,
            files: &self.files,
            exclude: &self.exclude,
        }
    }

    pub fn encryptor(&self) -> Encryptor<'_> {
        match self.passphrase() {
            Some(passphrase) => Encryptor::Gpg {
                tool: &self.gpg,
                passphrase,
            },
            None => Encryptor::None,
        }
    }
}

impl FileExtProvider for BackupConfig {
    fn file_ext(&self) -> Option<Arc<str>> {
        Some(
            self.archiver()
                .file_ext()
                .into_iter()
                .chain(self.encryptor().file_ext())
                .join(".")
                .into(),
        )
    }
}
