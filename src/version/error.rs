use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Cache lock poisoned")]
    LockPoisoned,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Registry request timed out after {0} ms")]
    Timeout(u64),

    #[error("Module not found: {0}")]
    NotFound(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RangeError {
    #[error("Empty version range")]
    Empty,

    #[error("Malformed version range '{range}': {reason}")]
    Malformed { range: String, reason: String },
}

impl RangeError {
    pub(crate) fn malformed(range: &str, reason: impl Into<String>) -> Self {
        RangeError::Malformed {
            range: range.to_string(),
            reason: reason.into(),
        }
    }
}

/// Why a directive could not be turned into concrete versions
#[derive(Debug, Error)]
pub enum ResolutionCause {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Range(#[from] RangeError),

    #[error("no usable versions left after filtering {available} published versions")]
    NoVersions { available: usize },

    #[error("runtime-only directives have no artifacts to resolve")]
    RuntimeOnly,
}

/// Resolution failure for one directive
///
/// Fatal for that directive only; sibling directives keep resolving.
#[derive(Debug, Error)]
#[error("Failed to resolve {directive}: {cause}")]
pub struct ResolutionError {
    pub directive: String,
    #[source]
    pub cause: ResolutionCause,
}

impl ResolutionError {
    pub fn new(directive: impl Into<String>, cause: impl Into<ResolutionCause>) -> Self {
        Self {
            directive: directive.into(),
            cause: cause.into(),
        }
    }
}
