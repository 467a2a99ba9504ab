use std::path::PathBuf;

use thiserror::Error;

use crate::directive::Artifact;

/// Failure to build an isolation boundary for a plan
#[derive(Debug, Error)]
pub enum BoundaryError {
    #[error("Classpath entry does not exist: {0}")]
    MissingEntry(PathBuf),

    #[error("Failed to download {artifact}: {reason}")]
    Download { artifact: Artifact, reason: String },

    #[error("Artifact {0} not found in any repository")]
    ArtifactNotFound(Artifact),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Boundary cache lock poisoned")]
    LockPoisoned,
}

/// The scanner reported that the instrumentation does not match the subject,
/// or could not be run at all
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ScanError {
    pub message: String,
    pub detail: String,
}

impl ScanError {
    pub fn new(message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            detail: detail.into(),
        }
    }
}

/// Errors that abort a whole engine run
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Scanner command is empty")]
    EmptyScannerCommand,

    #[error("Failed to write result file {path}: {source}")]
    ResultFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Boundary(#[from] BoundaryError),

    #[error(transparent)]
    Report(#[from] crate::report::ReportError),

    #[error(transparent)]
    Registry(#[from] crate::version::error::RegistryError),

    #[error(transparent)]
    Cache(#[from] crate::version::error::CacheError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
