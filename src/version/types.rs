//! Common types for the version layer

/// Versions published for one module, ordered from oldest to newest
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageVersions {
    pub versions: Vec<String>,
}

impl PackageVersions {
    pub fn new(versions: Vec<String>) -> Self {
        Self { versions }
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }
}
