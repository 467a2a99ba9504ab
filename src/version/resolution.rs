//! Resolution of directives into concrete artifacts
//!
//! Bridges the directive layer and the registry: fetches what is published,
//! keeps what the directive's range admits, and runs the result through
//! [`VersionFilter`] so that planning never sees unstable or skipped builds.

use indexmap::IndexSet;
#[cfg(test)]
use mockall::automock;
use tracing::{debug, info};

use crate::directive::{Artifact, Directive};
use crate::version::error::{ResolutionCause, ResolutionError};
use crate::version::filter::VersionFilter;
use crate::version::range::VersionRange;
use crate::version::registry::Registry;
use crate::version::semver::{ResolvedVersion, VersionSet};

/// Turns directives into artifacts, and assert-inverse directives into their inverses
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait ResolutionService: Send + Sync {
    /// Concrete artifacts a directive should be verified against, lowest version first
    async fn resolve(&self, directive: &Directive) -> Result<IndexSet<Artifact>, ResolutionError>;

    /// Directives covering the published versions the directive's range leaves out
    ///
    /// Each returned directive asserts the opposite outcome and never asserts inverse itself.
    async fn inverse_of(
        &self,
        directive: &Directive,
    ) -> Result<IndexSet<Directive>, ResolutionError>;
}

/// [`ResolutionService`] backed by a [`Registry`]
pub struct RegistryResolutionService<R> {
    registry: R,
}

impl<R: Registry> RegistryResolutionService<R> {
    pub fn new(registry: R) -> Self {
        Self { registry }
    }

    async fn published_versions(&self, directive: &Directive) -> Result<Vec<String>, ResolutionError> {
        let fetched = self
            .registry
            .fetch_all_versions(&directive.module_id(), directive.additional_repositories())
            .await
            .map_err(|e| ResolutionError::new(directive.to_string(), e))?;
        debug!("{} published versions for {}", fetched.len(), directive.module_id());
        Ok(fetched.versions)
    }

    fn parse_range(directive: &Directive) -> Result<VersionRange, ResolutionError> {
        VersionRange::parse(directive.version_range())
            .map_err(|e| ResolutionError::new(directive.to_string(), e))
    }

    fn filter_for(directive: &Directive) -> VersionFilter {
        VersionFilter::new(directive.skip_versions(), directive.include_snapshots())
    }
}

#[async_trait::async_trait]
impl<R: Registry> ResolutionService for RegistryResolutionService<R> {
    async fn resolve(&self, directive: &Directive) -> Result<IndexSet<Artifact>, ResolutionError> {
        if directive.is_runtime_only() {
            return Err(ResolutionError::new(
                directive.to_string(),
                ResolutionCause::RuntimeOnly,
            ));
        }

        let range = Self::parse_range(directive)?;
        let published = self.published_versions(directive).await?;
        let available = published.len();

        let in_range: Vec<&String> = published
            .iter()
            .filter(|v| range.contains(&ResolvedVersion::parse(v)))
            .collect();

        let selected = Self::filter_for(directive).apply(&in_range);
        if selected.is_empty() {
            return Err(ResolutionError::new(
                directive.to_string(),
                ResolutionCause::NoVersions { available },
            ));
        }

        info!(
            "Resolved {} to {} of {} published versions",
            directive,
            selected.len(),
            available
        );

        Ok(selected
            .iter()
            .map(|version| {
                Artifact::new(directive.group(), directive.module(), version.as_str())
                    .with_classifier(directive.classifier().map(str::to_string))
            })
            .collect())
    }

    async fn inverse_of(
        &self,
        directive: &Directive,
    ) -> Result<IndexSet<Directive>, ResolutionError> {
        if directive.is_runtime_only() {
            return Err(ResolutionError::new(
                directive.to_string(),
                ResolutionCause::RuntimeOnly,
            ));
        }

        let range = Self::parse_range(directive)?;
        let published = self.published_versions(directive).await?;

        let stable = VersionSet::new(Self::filter_for(directive).filter(&published));
        let (Some(floor), Some(ceiling)) = (stable.lowest(), stable.highest()) else {
            return Err(ResolutionError::new(
                directive.to_string(),
                ResolutionCause::NoVersions {
                    available: published.len(),
                },
            ));
        };

        let inverses: IndexSet<Directive> = range
            .complement_within(floor, ceiling)
            .into_iter()
            .filter(|gap| stable.iter().any(|v| gap.contains(v)))
            .map(|gap| directive.inverse_with_range(gap.to_string()))
            .collect();

        debug!("{} has {} inverse directives", directive, inverses.len());
        Ok(inverses)
    }
}
