//! One engine invocation: plan, execute, aggregate

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{info, warn};

use crate::config::{self, EngineConfig};
use crate::directive::Directive;
use crate::engine::boundary::BoundaryCache;
use crate::engine::classpath::{ClasspathResolver, MavenClasspathResolver};
use crate::engine::error::EngineError;
use crate::engine::executor::{IsolatedExecutor, PlanState, VerificationResult};
use crate::engine::planner::{Planning, TaskPlanner};
use crate::engine::scanner::{CompatibilityScanner, ProcessScanner};
use crate::report::{RangeReport, SummaryReport};
use crate::version::cache::{Cache, CachedRegistry};
use crate::version::registries::MavenRegistry;
use crate::version::resolution::{RegistryResolutionService, ResolutionService};

/// Where a run leaves its outputs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/results/<subject>/`, one file per plan
    pub fn results_dir(&self, subject: &str) -> PathBuf {
        self.root.join("results").join(file_stem(subject))
    }

    /// `<root>/ranges/`, one range store per subject
    pub fn ranges_dir(&self) -> PathBuf {
        self.root.join("ranges")
    }

    pub fn ranges_path(&self, subject: &str) -> PathBuf {
        self.ranges_dir().join(format!("{}.csv", file_stem(subject)))
    }

    /// Store merged across subjects by `merge-reports`
    pub fn merged_ranges_path(&self) -> PathBuf {
        self.root.join("compat-ranges.csv")
    }

    pub fn junit_path(&self, subject: &str) -> PathBuf {
        self.root
            .join("junit")
            .join(format!("TEST-{}.xml", file_stem(subject)))
    }
}

/// Subject name made safe for use as a file name
pub fn file_stem(subject: &str) -> String {
    let stem: String = subject
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect();
    let stem = stem.trim_matches('-');
    if stem.is_empty() {
        "subject".to_string()
    } else {
        stem.to_string()
    }
}

/// Everything a run produced
#[derive(Debug)]
pub struct EngineReport {
    pub generation: u64,
    pub planning: Planning,
    pub results: Vec<VerificationResult>,
    /// Final state of every plan by task name, in plan order
    pub states: Vec<(String, PlanState)>,
    pub summary: SummaryReport,
    /// Range store after merging this run into it
    pub ranges: RangeReport,
    pub junit_path: PathBuf,
    pub ranges_path: PathBuf,
    pub results_dir: PathBuf,
}

impl EngineReport {
    pub fn is_success(&self) -> bool {
        self.summary.is_success()
    }
}

/// Verification engine
///
/// Every call to [`Engine::run`] advances the generation stamp, so shared
/// boundaries are rebuilt once per run and reused by all of its plans.
pub struct Engine {
    config: EngineConfig,
    resolution: Arc<dyn ResolutionService>,
    resolver: Arc<dyn ClasspathResolver>,
    scanner: Arc<dyn CompatibilityScanner>,
    boundaries: Arc<BoundaryCache>,
    generation: AtomicU64,
    layout: OutputLayout,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        resolution: Arc<dyn ResolutionService>,
        resolver: Arc<dyn ClasspathResolver>,
        scanner: Arc<dyn CompatibilityScanner>,
    ) -> Self {
        let layout = OutputLayout::new(config.report.output_dir());
        Self {
            config,
            resolution,
            resolver,
            scanner,
            boundaries: Arc::new(BoundaryCache::new()),
            generation: AtomicU64::new(0),
            layout,
        }
    }

    /// Engine wired to Maven repositories, the version cache and a process scanner
    pub fn from_config(config: EngineConfig) -> Result<Self, EngineError> {
        let registry = MavenRegistry::from_config(&config.registry)?;
        let resolution: Arc<dyn ResolutionService> = if config.cache.enabled {
            let db_path = config::db_path();
            if let Some(parent) = db_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let cache = Cache::new(&db_path, config.cache.refresh_interval)?;
            Arc::new(RegistryResolutionService::new(CachedRegistry::new(
                registry, cache,
            )))
        } else {
            Arc::new(RegistryResolutionService::new(registry))
        };

        let resolver = Arc::new(MavenClasspathResolver::from_config(
            &config.registry,
            config::artifact_dir(),
        )?);
        let scanner = Arc::new(ProcessScanner::from_config(&config.execution)?);

        Ok(Self::new(config, resolution, resolver, scanner))
    }

    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    /// Stamp of the latest run, 0 before the first
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub async fn run(
        &self,
        subject: &str,
        directives: &[Directive],
    ) -> Result<EngineReport, EngineError> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!(
            "Verifying {} with {} directives (generation {})",
            subject,
            directives.len(),
            generation
        );

        let planning = TaskPlanner::new(self.resolution.as_ref())
            .plan(directives)
            .await;

        let results_dir = self.layout.results_dir(subject);
        match tokio::fs::remove_dir_all(&results_dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let executor = IsolatedExecutor::new(
            self.config.execution.clone(),
            Arc::clone(&self.boundaries),
            Arc::clone(&self.resolver),
            Arc::clone(&self.scanner),
            &results_dir,
        );
        let results = executor.execute(&planning.plans, generation).await?;
        let states = executor.tracker().snapshot();

        let summary = SummaryReport::from_results(subject, directives, &results, &planning.failures);
        let junit_path = self.layout.junit_path(subject);
        summary.write_junit(&junit_path)?;

        let ranges_path = self.layout.ranges_path(subject);
        let ranges = RangeReport::from_results(subject, &results).write(&ranges_path)?;

        if summary.is_success() {
            info!(
                "{}: {} checks passed ({} skipped)",
                subject,
                summary.tests(),
                summary.skipped()
            );
        } else {
            warn!(
                "{}: {} failures, {} errors out of {} checks",
                subject,
                summary.failures(),
                summary.errors(),
                summary.tests()
            );
        }

        Ok(EngineReport {
            generation,
            planning,
            results,
            states,
            summary,
            ranges,
            junit_path,
            ranges_path,
            results_dir,
        })
    }
}
