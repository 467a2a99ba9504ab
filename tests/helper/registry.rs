//! Registry and resolution test utilities

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use indexmap::IndexSet;

use compat_verify::directive::{Artifact, Directive, ModuleId};
use compat_verify::version::error::{RegistryError, ResolutionCause, ResolutionError};
use compat_verify::version::registry::Registry;
use compat_verify::version::resolution::ResolutionService;
use compat_verify::version::types::PackageVersions;

/// Registry answering from a fixed table, counting fetches
#[derive(Default)]
pub struct FakeRegistry {
    versions: HashMap<ModuleId, Vec<String>>,
    fetches: AtomicUsize,
}

impl FakeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_versions(mut self, module: &str, versions: Vec<&str>) -> Self {
        let module: ModuleId = module.parse().unwrap();
        self.versions
            .insert(module, versions.into_iter().map(|v| v.to_string()).collect());
        self
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Registry for FakeRegistry {
    async fn fetch_all_versions(
        &self,
        module: &ModuleId,
        _extra_repositories: &[String],
    ) -> Result<PackageVersions, RegistryError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        match self.versions.get(module) {
            Some(versions) => Ok(PackageVersions::new(versions.clone())),
            None => Err(RegistryError::NotFound(module.to_string())),
        }
    }
}

/// Resolution service answering from fixed tables, counting calls
#[derive(Default)]
pub struct FakeResolutionService {
    artifacts: HashMap<Directive, IndexSet<Artifact>>,
    inverses: HashMap<Directive, IndexSet<Directive>>,
    resolve_calls: AtomicUsize,
    inverse_calls: AtomicUsize,
}

impl FakeResolutionService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_artifacts(mut self, directive: &Directive, versions: &[&str]) -> Self {
        self.artifacts.insert(
            directive.clone(),
            versions
                .iter()
                .map(|v| artifact(directive.group(), directive.module(), v))
                .collect(),
        );
        self
    }

    pub fn with_inverses(mut self, directive: &Directive, inverses: Vec<Directive>) -> Self {
        self.inverses
            .insert(directive.clone(), inverses.into_iter().collect());
        self
    }

    pub fn resolve_calls(&self) -> usize {
        self.resolve_calls.load(Ordering::SeqCst)
    }

    pub fn inverse_calls(&self) -> usize {
        self.inverse_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResolutionService for FakeResolutionService {
    async fn resolve(&self, directive: &Directive) -> Result<IndexSet<Artifact>, ResolutionError> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        self.artifacts
            .get(directive)
            .filter(|artifacts| !artifacts.is_empty())
            .cloned()
            .ok_or_else(|| {
                ResolutionError::new(
                    directive.to_string(),
                    ResolutionCause::NoVersions { available: 0 },
                )
            })
    }

    async fn inverse_of(
        &self,
        directive: &Directive,
    ) -> Result<IndexSet<Directive>, ResolutionError> {
        self.inverse_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.inverses.get(directive).cloned().unwrap_or_default())
    }
}

pub fn artifact(group: &str, module: &str, version: &str) -> Artifact {
    Artifact::new(group, module, version)
}

/// Directive over `com.example:<module>` asserting pass
pub fn pass_directive(module: &str, range: &str) -> Directive {
    Directive::pass()
        .group("com.example")
        .module(module)
        .versions(range)
        .build()
        .unwrap()
}

/// Directive over `com.example:<module>` asserting failure
pub fn fail_directive(module: &str, range: &str) -> Directive {
    Directive::fail()
        .group("com.example")
        .module(module)
        .versions(range)
        .build()
        .unwrap()
}
