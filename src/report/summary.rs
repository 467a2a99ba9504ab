//! Pass/fail summary of a run
//!
//! One suite per directive group, one case per plan, plus one error case per
//! directive that could not be resolved. Rendered as JUnit XML so CI systems
//! can display it.

use std::fmt::Write as _;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use tracing::debug;

use crate::directive::Directive;
use crate::engine::executor::{Outcome, StoredOutcome, VerificationResult};
use crate::engine::planner::ResolutionFailure;
use crate::report::error::ReportError;

/// Name of the case reported when there was nothing to verify
pub const DEFAULT_CASE_NAME: &str = "verify";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaseStatus {
    Passed,
    Failed { message: String, detail: String },
    Error { message: String, detail: String },
    Skipped { message: String },
}

impl CaseStatus {
    fn from_outcome(outcome: Outcome, message: Option<&str>, detail: Option<&str>) -> Self {
        let message = message.unwrap_or_default().to_string();
        let detail = detail.unwrap_or_default().to_string();
        match outcome {
            Outcome::Pass => CaseStatus::Passed,
            Outcome::Skipped => CaseStatus::Skipped { message },
            Outcome::Fail(kind) if kind.is_error() => CaseStatus::Error { message, detail },
            Outcome::Fail(_) => CaseStatus::Failed { message, detail },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseRecord {
    pub name: String,
    pub status: CaseStatus,
    pub duration: Duration,
}

impl CaseRecord {
    pub fn from_result(result: &VerificationResult) -> Self {
        Self {
            name: result.task_name(),
            status: CaseStatus::from_outcome(
                result.outcome,
                result.message.as_deref(),
                result.detail.as_deref(),
            ),
            duration: result.duration,
        }
    }

    pub fn from_resolution_failure(failure: &ResolutionFailure) -> Self {
        Self {
            name: format!("resolve {}", failure.directive),
            status: CaseStatus::Error {
                message: failure.error.to_string(),
                detail: failure.error.cause.to_string(),
            },
            duration: Duration::ZERO,
        }
    }

    fn passed(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CaseStatus::Passed,
            duration: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuiteSummary {
    pub name: String,
    pub cases: Vec<CaseRecord>,
}

impl SuiteSummary {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cases: Vec::new(),
        }
    }

    pub fn tests(&self) -> usize {
        self.cases.len()
    }

    pub fn failures(&self) -> usize {
        self.count(|s| matches!(s, CaseStatus::Failed { .. }))
    }

    pub fn errors(&self) -> usize {
        self.count(|s| matches!(s, CaseStatus::Error { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, CaseStatus::Skipped { .. }))
    }

    pub fn elapsed(&self) -> Duration {
        self.cases.iter().map(|c| c.duration).sum()
    }

    fn count(&self, predicate: impl Fn(&CaseStatus) -> bool) -> usize {
        self.cases.iter().filter(|c| predicate(&c.status)).count()
    }
}

/// Summary of one subject's run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryReport {
    pub subject: String,
    pub suites: IndexMap<String, SuiteSummary>,
    pub timestamp: DateTime<Utc>,
}

impl SummaryReport {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            suites: IndexMap::new(),
            timestamp: Utc::now(),
        }
    }

    fn push(&mut self, suite: &str, case: CaseRecord) {
        self.suites
            .entry(suite.to_string())
            .or_insert_with(|| SuiteSummary::new(suite))
            .cases
            .push(case);
    }

    /// Build the summary of a run
    ///
    /// When nothing was planned or failed to resolve and no directive
    /// asserts a pass, a single passing default case stands in.
    pub fn from_results(
        subject: &str,
        directives: &[Directive],
        results: &[VerificationResult],
        failures: &[ResolutionFailure],
    ) -> Self {
        let mut report = Self::new(subject);

        for result in results {
            report.push(&result.plan.directive.group_key(), CaseRecord::from_result(result));
        }
        for failure in failures {
            report.push(
                &failure.directive.group_key(),
                CaseRecord::from_resolution_failure(failure),
            );
        }

        if results.is_empty() && failures.is_empty() && !directives.iter().any(|d| d.assert_pass())
        {
            report.push(subject, CaseRecord::passed(DEFAULT_CASE_NAME));
        }

        report
    }

    /// Rebuild a summary from the result files in `dir`, one case per file
    ///
    /// The files carry no directive grouping, so every case lands in a single
    /// suite named after the subject.
    pub fn from_result_files(subject: &str, dir: &Path) -> Result<Self, ReportError> {
        let mut files: Vec<_> = std::fs::read_dir(dir)
            .map_err(ReportError::io(dir))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file())
            .collect();
        files.sort();

        let mut report = Self::new(subject);
        for path in files {
            let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                continue;
            };
            let content = std::fs::read_to_string(&path).map_err(ReportError::io(&path))?;
            let stored = StoredOutcome::parse(&content);
            report.push(
                subject,
                CaseRecord {
                    name,
                    status: CaseStatus::from_outcome(
                        stored.outcome,
                        stored.message.as_deref(),
                        stored.detail.as_deref(),
                    ),
                    duration: Duration::ZERO,
                },
            );
        }

        debug!("Rebuilt summary of {} from {}", subject, dir.display());
        Ok(report)
    }

    pub fn tests(&self) -> usize {
        self.suites.values().map(SuiteSummary::tests).sum()
    }

    pub fn failures(&self) -> usize {
        self.suites.values().map(SuiteSummary::failures).sum()
    }

    pub fn errors(&self) -> usize {
        self.suites.values().map(SuiteSummary::errors).sum()
    }

    pub fn skipped(&self) -> usize {
        self.suites.values().map(SuiteSummary::skipped).sum()
    }

    pub fn is_success(&self) -> bool {
        self.failures() == 0 && self.errors() == 0
    }

    pub fn to_junit_xml(&self) -> String {
        let timestamp = self.timestamp.format("%Y-%m-%dT%H:%M:%S");
        let total: Duration = self.suites.values().map(SuiteSummary::elapsed).sum();

        let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        let _ = writeln!(
            xml,
            "<testsuites name=\"{}\" tests=\"{}\" failures=\"{}\" errors=\"{}\" skipped=\"{}\" time=\"{:.3}\">",
            escape(&self.subject),
            self.tests(),
            self.failures(),
            self.errors(),
            self.skipped(),
            total.as_secs_f64()
        );

        for suite in self.suites.values() {
            let _ = writeln!(
                xml,
                "  <testsuite name=\"{}\" tests=\"{}\" failures=\"{}\" errors=\"{}\" skipped=\"{}\" time=\"{:.3}\" timestamp=\"{}\">",
                escape(&suite.name),
                suite.tests(),
                suite.failures(),
                suite.errors(),
                suite.skipped(),
                suite.elapsed().as_secs_f64(),
                timestamp
            );
            for case in &suite.cases {
                let open = format!(
                    "    <testcase classname=\"{}\" name=\"{}\" time=\"{:.3}\"",
                    escape(&self.subject),
                    escape(&case.name),
                    case.duration.as_secs_f64()
                );
                match &case.status {
                    CaseStatus::Passed => {
                        let _ = writeln!(xml, "{}/>", open);
                    }
                    CaseStatus::Failed { message, detail } => {
                        let _ = writeln!(
                            xml,
                            "{}>\n      <failure message=\"{}\">{}</failure>\n    </testcase>",
                            open,
                            escape(message),
                            escape(detail)
                        );
                    }
                    CaseStatus::Error { message, detail } => {
                        let _ = writeln!(
                            xml,
                            "{}>\n      <error message=\"{}\">{}</error>\n    </testcase>",
                            open,
                            escape(message),
                            escape(detail)
                        );
                    }
                    CaseStatus::Skipped { message } => {
                        let _ = writeln!(
                            xml,
                            "{}>\n      <skipped message=\"{}\"/>\n    </testcase>",
                            open,
                            escape(message)
                        );
                    }
                }
            }
            xml.push_str("  </testsuite>\n");
        }

        xml.push_str("</testsuites>\n");
        xml
    }

    pub fn write_junit(&self, path: &Path) -> Result<(), ReportError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(ReportError::io(parent))?;
        }
        std::fs::write(path, self.to_junit_xml()).map_err(ReportError::io(path))
    }
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            c if c.is_control() && !matches!(c, '\n' | '\r' | '\t') => {}
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directive::{Artifact, TaskPlan};
    use crate::engine::executor::FailureKind;
    use crate::version::error::{ResolutionCause, ResolutionError};
    use rstest::rstest;
    use tempfile::TempDir;

    fn directive(name: Option<&str>, assert_pass: bool) -> Directive {
        let mut builder = if assert_pass {
            Directive::pass()
        } else {
            Directive::fail()
        };
        if let Some(name) = name {
            builder = builder.name(name);
        }
        builder
            .group("com.example")
            .module("demo")
            .versions("[1.0,)")
            .build()
            .unwrap()
    }

    fn result(directive: &Directive, version: &str, outcome: Outcome) -> VerificationResult {
        VerificationResult {
            plan: TaskPlan::new(
                directive.clone(),
                Some(Artifact::new("com.example", "demo", version)),
            ),
            outcome,
            message: match outcome {
                Outcome::Pass => None,
                _ => Some("Missing <class> & method".to_string()),
            },
            detail: None,
            duration: Duration::from_millis(250),
        }
    }

    #[test]
    fn from_results_groups_cases_by_directive() {
        let unnamed = directive(None, true);
        let named = directive(Some("legacy"), false);
        let results = vec![
            result(&unnamed, "1.0.0", Outcome::Pass),
            result(&named, "0.9.0", Outcome::Pass),
            result(&unnamed, "1.1.0", Outcome::Fail(FailureKind::ScannerFailure)),
        ];

        let report = SummaryReport::from_results("demo", &[unnamed, named], &results, &[]);

        let names: Vec<_> = report.suites.keys().cloned().collect();
        assert_eq!(names, vec!["com.example:demo", "legacy"]);
        assert_eq!(report.suites["com.example:demo"].tests(), 2);
        assert_eq!(report.suites["com.example:demo"].failures(), 1);
        assert_eq!(report.suites["legacy"].failures(), 0);
        assert!(!report.is_success());
    }

    #[rstest]
    #[case(Outcome::Fail(FailureKind::ScannerFailure), 1, 0, 0)]
    #[case(Outcome::Fail(FailureKind::UnexpectedScannerSuccess), 1, 0, 0)]
    #[case(Outcome::Fail(FailureKind::BoundaryConstruction), 0, 1, 0)]
    #[case(Outcome::Skipped, 0, 0, 1)]
    fn outcome_counts_toward_expected_column(
        #[case] outcome: Outcome,
        #[case] failures: usize,
        #[case] errors: usize,
        #[case] skipped: usize,
    ) {
        let d = directive(None, true);
        let report =
            SummaryReport::from_results("demo", &[d.clone()], &[result(&d, "1.0.0", outcome)], &[]);

        assert_eq!(report.failures(), failures);
        assert_eq!(report.errors(), errors);
        assert_eq!(report.skipped(), skipped);
    }

    #[test]
    fn resolution_failures_become_error_cases() {
        let d = directive(None, true);
        let failure = ResolutionFailure {
            directive: d.clone(),
            error: ResolutionError::new(d.to_string(), ResolutionCause::NoVersions { available: 3 }),
        };

        let report = SummaryReport::from_results("demo", &[d], &[], &[failure]);

        assert_eq!(report.tests(), 1);
        assert_eq!(report.errors(), 1);
    }

    #[test]
    fn default_case_when_nothing_to_verify() {
        let report = SummaryReport::from_results("demo", &[directive(None, false)], &[], &[]);

        assert_eq!(report.tests(), 1);
        assert!(report.is_success());
        assert_eq!(report.suites["demo"].cases[0].name, DEFAULT_CASE_NAME);
    }

    #[test]
    fn no_default_case_when_a_directive_asserts_pass() {
        let report = SummaryReport::from_results("demo", &[directive(None, true)], &[], &[]);

        assert_eq!(report.tests(), 0);
    }

    #[test]
    fn to_junit_xml_renders_counts_and_escapes_messages() {
        let d = directive(None, true);
        let results = vec![
            result(&d, "1.0.0", Outcome::Pass),
            result(&d, "1.1.0", Outcome::Fail(FailureKind::ScannerFailure)),
        ];
        let report = SummaryReport::from_results("demo", &[d], &results, &[]);

        let xml = report.to_junit_xml();

        assert!(xml.contains(
            r#"<testsuite name="com.example:demo" tests="2" failures="1" errors="0" skipped="0" time="0.500""#
        ));
        assert!(xml.contains(
            r#"<testcase classname="demo" name="verify-AssertPass-com.example-demo-1.0.0" time="0.250"/>"#
        ));
        assert!(xml.contains(r#"<failure message="Missing &lt;class&gt; &amp; method">"#));
        assert!(xml.ends_with("</testsuites>\n"));
    }

    #[test]
    fn from_result_files_rebuilds_summary() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("verify-AssertPass-a"), "PASSING").unwrap();
        std::fs::write(
            temp_dir.path().join("verify-AssertPass-b"),
            "FAILED (scanner-failure): Missing class\nstack",
        )
        .unwrap();
        std::fs::write(
            temp_dir.path().join("verify-AssertFail-c"),
            "FAILED (boundary-construction): jar missing",
        )
        .unwrap();

        let report = SummaryReport::from_result_files("demo", temp_dir.path()).unwrap();

        assert_eq!(report.tests(), 3);
        assert_eq!(report.failures(), 1);
        assert_eq!(report.errors(), 1);
        let case = report.suites["demo"]
            .cases
            .iter()
            .find(|c| c.name == "verify-AssertPass-b")
            .unwrap();
        assert_eq!(
            case.status,
            CaseStatus::Failed {
                message: "Missing class".to_string(),
                detail: "stack".to_string()
            }
        );
    }

    #[rstest]
    #[case("a&b", "a&amp;b")]
    #[case("<x y=\"1\">", "&lt;x y=&quot;1&quot;&gt;")]
    #[case("it's", "it&apos;s")]
    #[case("bell\u{7}", "bell")]
    fn escape_returns_expected(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(escape(input), expected);
    }
}
