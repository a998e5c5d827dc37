use std::path::PathBuf;
use thiserror::Error;

use crate::core::JobState;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Working directory does not exist or is not readable: {0}")]
    WorkingDirMissing(PathBuf),

    #[error("Failed to create build log at {path}: {source}")]
    LogCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("A build is already running for target '{0}'")]
    AlreadyRunning(String),

    #[error("Invalid job transition from {from:?} to {to:?}")]
    InvalidTransition { from: JobState, to: JobState },

    #[error("Build worker terminated unexpectedly: {0}")]
    WorkerLost(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read override document {path}: {source}")]
    OverrideRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Forced build file does not exist: {0}")]
    BuildFileMissing(PathBuf),

    #[error("Cannot infer a toolchain from build file: {0}")]
    UnknownBuildFile(PathBuf),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Store document is corrupt: {0}")]
    Json(#[from] serde_json::Error),
}
