//! Isolated execution of task plans
//!
//! Plans run concurrently under a semaphore. Each plan gets the shared
//! instrumentation boundary of the current generation and its own subject
//! boundary, is handed to the scanner, and ends in exactly one
//! [`VerificationResult`], which is also persisted as a result file named
//! after the plan's task.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures::future::join_all;
use indexmap::IndexMap;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::config::ExecutionConfig;
use crate::directive::TaskPlan;
use crate::engine::boundary::{BoundaryCache, BoundaryPair, SharedBoundaries};
use crate::engine::classpath::ClasspathResolver;
use crate::engine::error::{BoundaryError, EngineError, ScanError};
use crate::engine::scanner::CompatibilityScanner;

/// Content of the result file of a passing plan
pub const PASSING: &str = "PASSING";

const FAILED_PREFIX: &str = "FAILED";
const SKIPPED_PREFIX: &str = "SKIPPED";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The directive asserted a pass and the scanner reported a mismatch
    ScannerFailure,
    /// The directive asserted a failure and the scanner found none
    UnexpectedScannerSuccess,
    /// The isolation boundaries could not be built
    BoundaryConstruction,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::ScannerFailure => "scanner-failure",
            FailureKind::UnexpectedScannerSuccess => "unexpected-success",
            FailureKind::BoundaryConstruction => "boundary-construction",
        }
    }

    /// Whether the failure is an infrastructure error rather than a verdict
    pub fn is_error(&self) -> bool {
        matches!(self, FailureKind::BoundaryConstruction)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailureKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scanner-failure" => Ok(FailureKind::ScannerFailure),
            "unexpected-success" => Ok(FailureKind::UnexpectedScannerSuccess),
            "boundary-construction" => Ok(FailureKind::BoundaryConstruction),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Pass,
    Fail(FailureKind),
    /// Not started because the failure threshold was reached
    Skipped,
}

/// Final result of one plan
#[derive(Debug, Clone, PartialEq)]
pub struct VerificationResult {
    pub plan: TaskPlan,
    pub outcome: Outcome,
    pub message: Option<String>,
    pub detail: Option<String>,
    pub duration: Duration,
}

impl VerificationResult {
    pub fn task_name(&self) -> String {
        self.plan.task_name()
    }

    pub fn is_pass(&self) -> bool {
        self.outcome == Outcome::Pass
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, Outcome::Fail(_))
    }

    /// Result file content: `PASSING`, or a status line followed by the detail
    pub fn file_content(&self) -> String {
        match self.outcome {
            Outcome::Pass => PASSING.to_string(),
            Outcome::Skipped => format!(
                "{}: {}",
                SKIPPED_PREFIX,
                self.message.as_deref().unwrap_or_default()
            ),
            Outcome::Fail(kind) => {
                let mut content = format!(
                    "{} ({}): {}",
                    FAILED_PREFIX,
                    kind,
                    self.message.as_deref().unwrap_or_default()
                );
                if let Some(detail) = self.detail.as_deref().filter(|d| !d.is_empty()) {
                    content.push('\n');
                    content.push_str(detail);
                }
                content
            }
        }
    }
}

/// What a persisted result file says
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredOutcome {
    pub outcome: Outcome,
    pub message: Option<String>,
    pub detail: Option<String>,
}

impl StoredOutcome {
    /// Parse a result file written by [`VerificationResult::file_content`]
    ///
    /// Content in any other shape is treated as a scanner failure whose
    /// message is the first line.
    pub fn parse(content: &str) -> Self {
        let content = content.trim_end();
        if content == PASSING {
            return Self {
                outcome: Outcome::Pass,
                message: None,
                detail: None,
            };
        }

        let (first, rest) = content.split_once('\n').unwrap_or((content, ""));
        let detail = Some(rest.to_string()).filter(|d| !d.is_empty());

        if let Some(message) = first.strip_prefix(SKIPPED_PREFIX) {
            return Self {
                outcome: Outcome::Skipped,
                message: Some(message.trim_start_matches(':').trim().to_string()),
                detail,
            };
        }

        if let Some(status) = first.strip_prefix(FAILED_PREFIX)
            && let Some((kind, message)) = status
                .trim_start()
                .strip_prefix('(')
                .and_then(|s| s.split_once("):"))
            && let Ok(kind) = kind.parse::<FailureKind>()
        {
            return Self {
                outcome: Outcome::Fail(kind),
                message: Some(message.trim().to_string()),
                detail,
            };
        }

        Self {
            outcome: Outcome::Fail(FailureKind::ScannerFailure),
            message: Some(first.to_string()),
            detail,
        }
    }
}

/// Interpret a scanner verdict against the directive's expectation
pub fn classify(
    assert_pass: bool,
    verdict: Result<(), ScanError>,
) -> (Outcome, Option<String>, Option<String>) {
    match (assert_pass, verdict) {
        (true, Ok(())) => (Outcome::Pass, None, None),
        (true, Err(e)) => (
            Outcome::Fail(FailureKind::ScannerFailure),
            Some(e.message),
            Some(e.detail),
        ),
        (false, Err(e)) => {
            debug!("Expected mismatch: {}", e.message);
            (Outcome::Pass, None, None)
        }
        (false, Ok(())) => (
            Outcome::Fail(FailureKind::UnexpectedScannerSuccess),
            Some("Instrumentation unexpectedly passed verification".to_string()),
            None,
        ),
    }
}

/// Lifecycle of a plan within one execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanState {
    Pending,
    Running,
    Passed,
    Failed,
    Skipped,
}

impl From<Outcome> for PlanState {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Pass => PlanState::Passed,
            Outcome::Fail(_) => PlanState::Failed,
            Outcome::Skipped => PlanState::Skipped,
        }
    }
}

/// Plan states keyed by task name, in submission order
#[derive(Debug, Default)]
pub struct PlanTracker {
    states: Mutex<IndexMap<String, PlanState>>,
}

impl PlanTracker {
    fn set(&self, task_name: &str, state: PlanState) {
        match self.states.lock() {
            Ok(mut states) => {
                states.insert(task_name.to_string(), state);
            }
            Err(_) => warn!("Plan tracker lock poisoned; dropping state of {}", task_name),
        }
    }

    pub fn state(&self, task_name: &str) -> Option<PlanState> {
        self.states
            .lock()
            .ok()
            .and_then(|states| states.get(task_name).copied())
    }

    pub fn snapshot(&self) -> Vec<(String, PlanState)> {
        self.states
            .lock()
            .map(|states| states.iter().map(|(k, v)| (k.clone(), *v)).collect())
            .unwrap_or_default()
    }
}

/// Runs task plans inside isolation boundaries
pub struct IsolatedExecutor {
    config: ExecutionConfig,
    boundaries: Arc<BoundaryCache>,
    resolver: Arc<dyn ClasspathResolver>,
    scanner: Arc<dyn CompatibilityScanner>,
    results_dir: PathBuf,
    tracker: PlanTracker,
}

impl IsolatedExecutor {
    pub fn new(
        config: ExecutionConfig,
        boundaries: Arc<BoundaryCache>,
        resolver: Arc<dyn ClasspathResolver>,
        scanner: Arc<dyn CompatibilityScanner>,
        results_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            config,
            boundaries,
            resolver,
            scanner,
            results_dir: results_dir.into(),
            tracker: PlanTracker::default(),
        }
    }

    pub fn tracker(&self) -> &PlanTracker {
        &self.tracker
    }

    pub fn results_dir(&self) -> &Path {
        &self.results_dir
    }

    /// Execute every plan, returning results in plan order
    ///
    /// Only a results directory that cannot be created fails the whole
    /// execution. A result file that cannot be written is logged and the
    /// plan's result is still returned.
    pub async fn execute(
        &self,
        plans: &[TaskPlan],
        generation: u64,
    ) -> Result<Vec<VerificationResult>, EngineError> {
        tokio::fs::create_dir_all(&self.results_dir).await?;

        for plan in plans {
            self.tracker.set(&plan.task_name(), PlanState::Pending);
        }

        let concurrency = self.config.concurrency();
        info!(
            "Executing {} plans with concurrency {} (generation {})",
            plans.len(),
            concurrency,
            generation
        );

        let semaphore = Arc::new(Semaphore::new(concurrency));
        let failures = AtomicUsize::new(0);

        let runs = plans.iter().map(|plan| {
            let semaphore = Arc::clone(&semaphore);
            let failures = &failures;
            async move {
                let _permit = semaphore.acquire().await.ok();
                let result = self.run_plan(plan, generation, failures).await;
                if result.is_failure() {
                    failures.fetch_add(1, Ordering::SeqCst);
                }
                self.tracker.set(&result.task_name(), result.outcome.into());
                if let Err(e) = self.write_result(&result).await {
                    error!("{}", e);
                }
                result
            }
        });

        Ok(join_all(runs).await)
    }

    async fn run_plan(
        &self,
        plan: &TaskPlan,
        generation: u64,
        failures: &AtomicUsize,
    ) -> VerificationResult {
        if let Some(max) = self.config.max_failures
            && failures.load(Ordering::SeqCst) >= max
        {
            debug!("Skipping {}: failure threshold {} reached", plan, max);
            return VerificationResult {
                plan: plan.clone(),
                outcome: Outcome::Skipped,
                message: Some(format!("failure threshold of {} reached", max)),
                detail: None,
                duration: Duration::ZERO,
            };
        }

        self.tracker.set(&plan.task_name(), PlanState::Running);
        let start = Instant::now();

        let (outcome, message, detail) = match self.boundaries_for(plan, generation).await {
            Ok(pair) => {
                let verdict = self
                    .scanner
                    .check(
                        &pair,
                        plan.directive.assert_pass(),
                        plan.directive.label(),
                        plan.directive.runtime_version_constraint(),
                    )
                    .await;
                classify(plan.directive.assert_pass(), verdict)
            }
            Err(e) => {
                error!("Failed to build boundaries for {}: {}", plan, e);
                (
                    Outcome::Fail(FailureKind::BoundaryConstruction),
                    Some(e.to_string()),
                    None,
                )
            }
        };

        let duration = start.elapsed();
        match outcome {
            Outcome::Pass => info!("{} passed in {} ms", plan, duration.as_millis()),
            _ => warn!(
                "{} failed: {}",
                plan,
                message.as_deref().unwrap_or_default()
            ),
        }

        VerificationResult {
            plan: plan.clone(),
            outcome,
            message,
            detail,
            duration,
        }
    }

    async fn boundaries_for(
        &self,
        plan: &TaskPlan,
        generation: u64,
    ) -> Result<BoundaryPair, BoundaryError> {
        let shared = self
            .boundaries
            .get_or_build(generation, || SharedBoundaries::from_config(&self.config))?;
        let subject = shared.subject_for(plan, self.resolver.as_ref()).await?;
        Ok(BoundaryPair {
            instrumentation: Arc::clone(&shared.instrumentation),
            subject,
        })
    }

    async fn write_result(&self, result: &VerificationResult) -> Result<(), EngineError> {
        let path = self.results_dir.join(result.task_name());
        tokio::fs::write(&path, result.file_content())
            .await
            .map_err(|source| EngineError::ResultFile { path, source })
    }
}
