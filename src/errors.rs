//src/errors.rs

use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can stop a classification or index-build run.
#[derive(Debug, Error)]
pub enum Error {
    /// A configuration value is unusable (bad number, missing input, not a directory, ...).
    #[error("configuration error: {0}")]
    Config(String),

    /// A file could not be opened, read or written.
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The external tool could not be started at all.
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// The external tool ran but exited unsuccessfully.
    #[error("{program} exited with {}", describe_exit(.exit_code))]
    ToolFailed {
        program: String,
        exit_code: Option<i32>,
    },

    /// An alignment line carried a tag we could not interpret.
    #[error("malformed alignment output ({reason}): {line}")]
    Format { line: String, reason: String },
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// Process exit code for this error class.
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::Config(_) => 2,
            Error::Io { .. } => 3,
            Error::Spawn { .. } | Error::ToolFailed { .. } => 4,
            Error::Format { .. } => 5,
        }
    }
}

fn describe_exit(code: &Option<i32>) -> String {
    match *code {
        Some(c) => format!("non-zero exit code ({c})"),
        None => "termination by signal".to_string(),
    }
}
