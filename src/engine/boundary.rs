//! Layered isolation boundaries
//!
//! Every plan is checked inside two boundaries: the instrumentation
//! boundary (host-runtime → tooling → instrumentation) which is shared by
//! all plans of one engine run, and a subject boundary holding the
//! dependency under test, rooted at the host-runtime layer so that nothing
//! from tooling or instrumentation leaks into it.
//!
//! The shared layers are cached and tagged with the generation stamp of
//! the run that built them. A later run with a newer stamp rebuilds them
//! exactly once, however many plans ask concurrently.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};

use tracing::{debug, info};

use crate::config::ExecutionConfig;
use crate::directive::{Artifact, ModuleId, TaskPlan};
use crate::engine::classpath::{ClasspathEntry, ClasspathResolver};
use crate::engine::error::BoundaryError;

/// Modules that are never placed on a subject classpath
pub const ALWAYS_EXCLUDED: &[(&str, &str)] =
    &[("com.sun.jdmk", "jmxtools"), ("com.sun.jmx", "jmxri")];

/// One isolation layer: its own entries, delegating to a parent first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layer {
    name: String,
    parent: Option<Arc<Layer>>,
    entries: Vec<PathBuf>,
}

impl Layer {
    pub fn root(name: impl Into<String>, entries: Vec<PathBuf>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            entries,
        }
    }

    pub fn child(name: impl Into<String>, parent: Arc<Layer>, entries: Vec<PathBuf>) -> Self {
        Self {
            name: name.into(),
            parent: Some(parent),
            entries,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&Arc<Layer>> {
        self.parent.as_ref()
    }

    pub fn entries(&self) -> &[PathBuf] {
        &self.entries
    }

    /// Full classpath, outermost parent first
    pub fn classpath(&self) -> Vec<PathBuf> {
        let mut classpath = self
            .parent
            .as_ref()
            .map(|parent| parent.classpath())
            .unwrap_or_default();
        classpath.extend(self.entries.iter().cloned());
        classpath
    }

    /// Layer names from the root down to this layer
    pub fn lineage(&self) -> Vec<&str> {
        let mut names = self
            .parent
            .as_ref()
            .map(|parent| parent.lineage())
            .unwrap_or_default();
        names.push(&self.name);
        names
    }
}

/// Layers shared by every plan of one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedBoundaries {
    pub host_runtime: Arc<Layer>,
    pub tooling: Arc<Layer>,
    pub instrumentation: Arc<Layer>,
}

impl SharedBoundaries {
    /// Build the three shared layers from configured classpath entries
    ///
    /// Every configured entry must exist.
    pub fn from_config(config: &ExecutionConfig) -> Result<Self, BoundaryError> {
        for path in config
            .host_runtime
            .iter()
            .chain(&config.tooling)
            .chain(&config.instrumentation)
        {
            if !path.exists() {
                return Err(BoundaryError::MissingEntry(path.clone()));
            }
        }

        let host_runtime = Arc::new(Layer::root("host-runtime", config.host_runtime.clone()));
        let tooling = Arc::new(Layer::child(
            "tooling",
            Arc::clone(&host_runtime),
            config.tooling.clone(),
        ));
        let instrumentation = Arc::new(Layer::child(
            "instrumentation",
            Arc::clone(&tooling),
            config.instrumentation.clone(),
        ));

        Ok(Self {
            host_runtime,
            tooling,
            instrumentation,
        })
    }

    /// Subject layer for a plan
    ///
    /// Runtime-only plans check against the host runtime itself. Otherwise
    /// the artifact and the directive's additional dependencies are
    /// resolved with their dependencies, excluded modules are dropped
    /// wherever they appear, and the rest becomes a child of the
    /// host-runtime layer.
    pub async fn subject_for(
        &self,
        plan: &TaskPlan,
        resolver: &dyn ClasspathResolver,
    ) -> Result<Arc<Layer>, BoundaryError> {
        let Some(artifact) = &plan.artifact else {
            return Ok(Arc::clone(&self.host_runtime));
        };

        let directive = &plan.directive;
        let mut artifacts: Vec<Artifact> = vec![artifact.clone()];
        artifacts.extend(directive.additional_dependencies().iter().cloned());

        let mut exclusions = directive.excluded_dependencies().to_vec();
        exclusions.extend(
            ALWAYS_EXCLUDED
                .iter()
                .map(|(group, module)| ModuleId::new(*group, *module)),
        );

        let resolved = resolver
            .resolve(&artifacts, &exclusions, directive.additional_repositories())
            .await?;

        let entries: Vec<PathBuf> = resolved
            .into_iter()
            .filter(|entry| !is_excluded(entry, directive.excluded_dependencies()))
            .map(|entry| entry.path)
            .collect();

        debug!("Subject boundary for {} has {} entries", artifact, entries.len());
        Ok(Arc::new(Layer::child(
            format!("subject:{}", artifact),
            Arc::clone(&self.host_runtime),
            entries,
        )))
    }
}

fn is_excluded(entry: &ClasspathEntry, excluded: &[ModuleId]) -> bool {
    let Some(module) = &entry.module else {
        return false;
    };
    excluded.contains(module)
        || ALWAYS_EXCLUDED
            .iter()
            .any(|(group, name)| module.group == *group && module.module == *name)
}

/// The two boundaries a scanner compares
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundaryPair {
    pub instrumentation: Arc<Layer>,
    pub subject: Arc<Layer>,
}

/// Generation-stamped cache of [`SharedBoundaries`]
///
/// Readers take the read lock and compare stamps. On a miss, callers
/// serialize on `rebuild`, re-check the stamp, and only the first one builds.
/// Stamps only move forward: a caller from an older generation is served
/// the newer boundaries instead of rebuilding its own.
#[derive(Debug, Default)]
pub struct BoundaryCache {
    current: RwLock<Option<(u64, Arc<SharedBoundaries>)>>,
    rebuild: Mutex<()>,
}

impl BoundaryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn cached(&self, generation: u64) -> Result<Option<Arc<SharedBoundaries>>, BoundaryError> {
        let current = self.current.read().map_err(|_| BoundaryError::LockPoisoned)?;
        Ok(current
            .as_ref()
            .filter(|(stamp, _)| *stamp >= generation)
            .map(|(_, boundaries)| Arc::clone(boundaries)))
    }

    /// Boundaries for `generation`, building them with `build` if the cached
    /// ones belong to an older generation
    pub fn get_or_build<F>(
        &self,
        generation: u64,
        build: F,
    ) -> Result<Arc<SharedBoundaries>, BoundaryError>
    where
        F: FnOnce() -> Result<SharedBoundaries, BoundaryError>,
    {
        if let Some(boundaries) = self.cached(generation)? {
            return Ok(boundaries);
        }

        let _guard = self.rebuild.lock().map_err(|_| BoundaryError::LockPoisoned)?;
        if let Some(boundaries) = self.cached(generation)? {
            return Ok(boundaries);
        }

        info!("Building shared boundaries for generation {}", generation);
        let boundaries = Arc::new(build()?);
        let mut current = self.current.write().map_err(|_| BoundaryError::LockPoisoned)?;
        *current = Some((generation, Arc::clone(&boundaries)));
        Ok(boundaries)
    }

    /// Generation of the cached boundaries, if any
    pub fn generation(&self) -> Option<u64> {
        self.current
            .read()
            .ok()
            .and_then(|current| current.as_ref().map(|(stamp, _)| *stamp))
    }
}
