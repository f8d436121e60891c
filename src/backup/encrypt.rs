use crate::backup::file_ext::FileExtProvider;
use crate::backup::redacted::RedactedString;
use crate::backup::tool::{Invocation, ToolConfig};
use std::io::Write;
use std::sync::{Arc, OnceLock};

static GPG_FILE_EXT: OnceLock<Arc<str>> = OnceLock::new();

/// gpg reads the passphrase as the first line of stdin, the data to encrypt follows.
const GPG_ARGS: [&str; 9] = [
    "--batch",
    "--yes",
    "--pinentry-mode",
    "loopback",
    "--passphrase-fd",
    "0",
    "--symmetric",
    "-o",
    "-",
];

/// Encryption stage of the pipeline.
#[derive(Debug)]
pub enum Encryptor<'a> {
    None,
    Gpg {
        tool: &'a ToolConfig,
        passphrase: &'a RedactedString,
    },
}

impl Encryptor<'_> {
    pub fn invocation(&self) -> Option<Invocation> {
        match self {
            Encryptor::None => None,
            Encryptor::Gpg { tool, .. } => Some(tool.invocation(GPG_ARGS)),
        }
    }

    /// Writes the stdin preamble the encryptor expects before the data stream.
    pub fn write_preamble<W: Write>(&self, stdin: &mut W) -> std::io::Result<()> {
        match self {
            Encryptor::None => Ok(()),
            Encryptor::Gpg { passphrase, .. } => {
                stdin.write_all(passphrase.inner().as_bytes())?;
                stdin.write_all(b"\n")
            }
        }
    }
}

impl FileExtProvider for Encryptor<'_> {
    fn file_ext(&self) -> Option<Arc<str>> {
        match self {
            Encryptor::None => None,
            Encryptor::Gpg { .. } => Some(GPG_FILE_EXT.get_or_init(|| "gpg".into()).clone()),
        }
    }
}
