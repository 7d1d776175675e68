// ABOUTME: Error taxonomy shared by the extraction and assembly stages
// ABOUTME: Maps each failure kind to the process exit code reported to the scheduler

use std::path::PathBuf;

/// Every failure the core can report. None of them is retried internally;
/// the caller decides whether to re-run the tool.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing or malformed configuration.
    #[error("Config error: {0}")]
    Config(String),

    /// Malformed LSN text or an unexpected log line shape.
    #[error("Format error: {0}")]
    Format(String),

    /// A filesystem step failed (create, write, sync, link or rename, directory sync).
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Another instance of the same tool holds the PID file.
    #[error("pid file '{}' exists. Is another {tool} process running?", path.display())]
    LockHeld { path: PathBuf, tool: String },

    /// The database disagrees with the log or with itself, e.g. a row count
    /// other than one.
    #[error("Data integrity error: {0}")]
    DataIntegrity(String),

    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    #[error("TLS setup failed: {0}")]
    Tls(#[from] native_tls::Error),
}

impl Error {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Error::Io {
            context: context.into(),
            source,
        }
    }

    /// Exit code used by tools that distinguish configuration problems (3)
    /// from runtime failures (2).
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::Config(_) => 3,
            _ => 2,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
