//! Compatibility scanner boundary
//!
//! The scanner itself lives outside this crate. [`ProcessScanner`] runs it
//! as a child process per check so that a crash or hang only affects the
//! plan being checked.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::ExecutionConfig;
use crate::engine::boundary::BoundaryPair;
use crate::engine::error::{EngineError, ScanError};

/// Classpath of the instrumentation boundary, path-separator joined
pub const INSTRUMENTATION_CLASSPATH_ENV: &str = "COMPAT_INSTRUMENTATION_CLASSPATH";

/// Classpath of the subject boundary, path-separator joined
pub const SUBJECT_CLASSPATH_ENV: &str = "COMPAT_SUBJECT_CLASSPATH";

/// Runtime version the check is pinned to, unset when any runtime will do
pub const RUNTIME_VERSION_ENV: &str = "COMPAT_RUNTIME_VERSION";

/// Checks whether an instrumentation matches a subject
///
/// `Ok(())` means every matcher of the instrumentation applied cleanly to
/// the subject; `Err` carries why it did not. Interpreting that against the
/// directive's expectation is the executor's job. `runtime_version` is the
/// directive's pinned runtime version, if it names one.
#[async_trait::async_trait]
pub trait CompatibilityScanner: Send + Sync {
    async fn check(
        &self,
        boundaries: &BoundaryPair,
        assert_pass: bool,
        label: &str,
        runtime_version: Option<&str>,
    ) -> Result<(), ScanError>;
}

/// Runs an external scanner command
pub struct ProcessScanner {
    command: Vec<String>,
    timeout: Duration,
}

impl ProcessScanner {
    pub fn new(command: Vec<String>, timeout: Duration) -> Result<Self, EngineError> {
        if command.is_empty() {
            return Err(EngineError::EmptyScannerCommand);
        }
        Ok(Self { command, timeout })
    }

    pub fn from_config(config: &ExecutionConfig) -> Result<Self, EngineError> {
        Self::new(
            config.scanner_command.clone(),
            Duration::from_millis(config.scan_timeout_ms),
        )
    }

    fn join_classpath(entries: Vec<PathBuf>) -> String {
        std::env::join_paths(&entries)
            .map(|joined| joined.to_string_lossy().into_owned())
            .unwrap_or_else(|_| {
                entries
                    .iter()
                    .map(|p| p.to_string_lossy())
                    .collect::<Vec<_>>()
                    .join(":")
            })
    }
}

#[async_trait::async_trait]
impl CompatibilityScanner for ProcessScanner {
    async fn check(
        &self,
        boundaries: &BoundaryPair,
        assert_pass: bool,
        label: &str,
        runtime_version: Option<&str>,
    ) -> Result<(), ScanError> {
        let start = Instant::now();
        let exe = &self.command[0];
        let args = &self.command[1..];

        let mut command = Command::new(exe);
        command
            .args(args)
            .arg("--assert-pass")
            .arg(assert_pass.to_string())
            .arg("--label")
            .arg(label);
        match runtime_version {
            Some(version) => {
                command
                    .arg("--runtime-version")
                    .arg(version)
                    .env(RUNTIME_VERSION_ENV, version);
            }
            None => {
                command.env_remove(RUNTIME_VERSION_ENV);
            }
        }

        let child = command
            .env(
                INSTRUMENTATION_CLASSPATH_ENV,
                Self::join_classpath(boundaries.instrumentation.classpath()),
            )
            .env(
                SUBJECT_CLASSPATH_ENV,
                Self::join_classpath(boundaries.subject.classpath()),
            )
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ScanError::new(format!("Failed to start scanner {}", exe), e.to_string()))?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                warn!("Scanner timed out after {:?} for {}", self.timeout, label);
                ScanError::new(
                    format!("Scanner timed out after {} ms", self.timeout.as_millis()),
                    String::new(),
                )
            })?
            .map_err(|e| ScanError::new("Failed to wait for scanner", e.to_string()))?;

        debug!(
            "Scanner for {} exited with {:?} after {} ms",
            label,
            output.status.code(),
            start.elapsed().as_millis()
        );

        if output.status.success() {
            return Ok(());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let message = stderr
            .lines()
            .chain(stdout.lines())
            .find(|line| !line.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| {
                format!(
                    "Scanner exited with status {}",
                    output.status.code().unwrap_or(-1)
                )
            });
        let detail = [stdout.trim(), stderr.trim()]
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n");

        Err(ScanError::new(message, detail))
    }
}
