//! Registry trait for fetching published versions of a module

#[cfg(test)]
use mockall::automock;

use crate::directive::ModuleId;
use crate::version::error::RegistryError;
use crate::version::types::PackageVersions;

/// Trait for fetching module versions from an artifact registry
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait Registry: Send + Sync {
    /// Fetches all versions published for a module
    ///
    /// # Arguments
    /// * `module` - The `group:module` to look up
    /// * `extra_repositories` - Repositories consulted in addition to the defaults
    ///
    /// # Returns
    /// * `Ok(PackageVersions)` - Versions ordered from oldest to newest, without duplicates
    /// * `Err(RegistryError)` - If no repository knows the module or every fetch failed
    async fn fetch_all_versions(
        &self,
        module: &ModuleId,
        extra_repositories: &[String],
    ) -> Result<PackageVersions, RegistryError>;
}
