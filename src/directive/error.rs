use thiserror::Error;

use crate::version::error::RangeError;

#[derive(Debug, Error)]
pub enum DirectiveError {
    #[error("Missing required field '{0}'")]
    MissingField(&'static str),

    #[error("Runtime-only directives cannot assert the inverse range")]
    RuntimeOnlyInverse,

    #[error("Runtime-only directives cannot declare group, module or versions")]
    RuntimeOnlyWithArtifact,

    #[error("Invalid dependency coordinate '{0}', expected group:module:version[:classifier]")]
    InvalidCoordinate(String),

    #[error("Invalid excluded dependency '{0}', expected group:module")]
    InvalidExclusion(String),

    #[error(transparent)]
    Range(#[from] RangeError),

    #[error("Failed to read directives: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse directives: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Directive #{index}: {source}")]
    AtIndex {
        index: usize,
        #[source]
        source: Box<DirectiveError>,
    },
}
