//! Scanner and classpath test utilities

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tempfile::TempDir;

use compat_verify::config::EngineConfig;
use compat_verify::directive::{Artifact, ModuleId};
use compat_verify::engine::Engine;
use compat_verify::engine::boundary::BoundaryPair;
use compat_verify::engine::classpath::{ClasspathEntry, ClasspathResolver};
use compat_verify::engine::error::{BoundaryError, ScanError};
use compat_verify::engine::scanner::CompatibilityScanner;
use compat_verify::version::resolution::ResolutionService;

/// Scanner that matches every subject except the listed artifacts
///
/// Subjects are identified by the name of their boundary layer, so
/// `com.example:demo:1.0.0` or `host-runtime`.
#[derive(Default)]
pub struct ScriptedScanner {
    mismatches: HashSet<String>,
    calls: Mutex<Vec<String>>,
    runtime_versions: Mutex<Vec<(String, Option<String>)>>,
}

impl ScriptedScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mismatching(mut self, subject: &str) -> Self {
        self.mismatches.insert(subject.to_string());
        self
    }

    /// Subjects checked so far, sorted
    pub fn calls(&self) -> Vec<String> {
        let mut calls = self.calls.lock().unwrap().clone();
        calls.sort();
        calls
    }

    /// Runtime version each subject was checked under, sorted by subject
    pub fn runtime_versions(&self) -> Vec<(String, Option<String>)> {
        let mut versions = self.runtime_versions.lock().unwrap().clone();
        versions.sort();
        versions
    }
}

fn subject_name(pair: &BoundaryPair) -> String {
    let name = pair.subject.name();
    name.strip_prefix("subject:").unwrap_or(name).to_string()
}

#[async_trait]
impl CompatibilityScanner for ScriptedScanner {
    async fn check(
        &self,
        boundaries: &BoundaryPair,
        _assert_pass: bool,
        label: &str,
        runtime_version: Option<&str>,
    ) -> Result<(), ScanError> {
        let subject = subject_name(boundaries);
        self.calls.lock().unwrap().push(subject.clone());
        self.runtime_versions
            .lock()
            .unwrap()
            .push((subject.clone(), runtime_version.map(str::to_string)));
        if self.mismatches.contains(&subject) {
            Err(ScanError::new(
                format!("{} does not match {}", label, subject),
                format!("matcher mismatch against {}", subject),
            ))
        } else {
            Ok(())
        }
    }
}

/// Resolver mapping every artifact to a fake jar path, counting calls
#[derive(Default)]
pub struct FakeClasspathResolver {
    unavailable: HashSet<String>,
    calls: AtomicUsize,
}

impl FakeClasspathResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unavailable(mut self, artifact: &str) -> Self {
        self.unavailable.insert(artifact.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClasspathResolver for FakeClasspathResolver {
    async fn resolve(
        &self,
        artifacts: &[Artifact],
        _exclusions: &[ModuleId],
        _extra_repositories: &[String],
    ) -> Result<Vec<ClasspathEntry>, BoundaryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        artifacts
            .iter()
            .map(|artifact| {
                if self.unavailable.contains(&artifact.to_string()) {
                    return Err(BoundaryError::ArtifactNotFound(artifact.clone()));
                }
                Ok(ClasspathEntry::new(
                    Some(artifact.module_id()),
                    PathBuf::from(format!(
                        "/fake/{}-{}.jar",
                        artifact.module, artifact.version
                    )),
                ))
            })
            .collect()
    }
}

/// Engine writing into a fresh temporary directory
pub struct TestEngine {
    pub engine: Engine,
    pub scanner: Arc<ScriptedScanner>,
    pub resolver: Arc<FakeClasspathResolver>,
    pub output: TempDir,
}

impl TestEngine {
    pub fn new(
        resolution: Arc<dyn ResolutionService>,
        scanner: ScriptedScanner,
        resolver: FakeClasspathResolver,
        configure: impl FnOnce(&mut EngineConfig),
    ) -> Self {
        let output = TempDir::new().unwrap();
        let mut config = EngineConfig::default();
        config.cache.enabled = false;
        config.execution.max_concurrency = Some(2);
        config.report.output_dir = Some(output.path().to_path_buf());
        configure(&mut config);

        let scanner = Arc::new(scanner);
        let resolver = Arc::new(resolver);
        let engine = Engine::new(
            config,
            resolution,
            Arc::clone(&resolver) as Arc<dyn ClasspathResolver>,
            Arc::clone(&scanner) as Arc<dyn CompatibilityScanner>,
        );
        Self {
            engine,
            scanner,
            resolver,
            output,
        }
    }
}
