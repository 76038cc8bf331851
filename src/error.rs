//! Error Types
//!
//! Every failure the issuer can report. Process-related variants carry the combined
//! stdout/stderr of the external CA tool, since that output is usually the only
//! diagnostic the tool provides.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Combined stdout/stderr bytes captured from an external process
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput(Vec<u8>);

impl CapturedOutput {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Lossy UTF-8 rendering of the captured bytes
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.0).into_owned()
    }
}

impl From<Vec<u8>> for CapturedOutput {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for CapturedOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("<no output>")
        } else {
            f.write_str(String::from_utf8_lossy(&self.0).trim_end())
        }
    }
}

impl fmt::Debug for CapturedOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CapturedOutput({:?})", String::from_utf8_lossy(&self.0))
    }
}

/// Main issuer error type
#[derive(Debug, Error)]
pub enum PkiError {
    /// The external tool could not be started
    #[error("failed to spawn `{command}`: {source}\n{output}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
        output: CapturedOutput,
    },

    /// The external tool ran and reported failure. `exit_code` is `None` when the
    /// process was terminated by a signal.
    #[error("`{command}` exited with code {}:\n{output}", display_code(.exit_code))]
    NonZeroExit {
        command: String,
        exit_code: Option<i32>,
        output: CapturedOutput,
    },

    /// The external tool exceeded the configured bound and was killed
    #[error("`{command}` timed out after {after:?} and was killed:\n{output}")]
    Timeout {
        command: String,
        after: Duration,
        output: CapturedOutput,
    },

    /// Draining output or reaping the child failed
    #[error("failed waiting for `{command}`: {source}\n{output}")]
    Wait {
        command: String,
        #[source]
        source: io::Error,
        output: CapturedOutput,
    },

    #[error("failed to read ledger {}: {source}", .path.display())]
    LedgerRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed ledger line {line_number}: {reason}")]
    LedgerFormat { line_number: usize, reason: String },

    #[error("no CN attribute in subject `{subject}` on ledger line {line_number}")]
    SubjectParse { line_number: usize, subject: String },

    #[error("unknown endpoint `{name}`")]
    UnknownEndpoint { name: String },

    #[error("configuration error: {reason}")]
    Config { reason: String },

    #[error("failed to acquire issuance lock {}: {source}", .path.display())]
    Lock {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("verification failed: {reason}")]
    Verification { reason: String },
}

fn display_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "<signal>".to_string(),
    }
}

impl PkiError {
    /// Captured process output, for the variants that have one
    pub fn output(&self) -> Option<&CapturedOutput> {
        match self {
            PkiError::Spawn { output, .. }
            | PkiError::NonZeroExit { output, .. }
            | PkiError::Timeout { output, .. }
            | PkiError::Wait { output, .. } => Some(output),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, PkiError>;
