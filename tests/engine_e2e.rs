mod helper;

use std::sync::Arc;

use compat_verify::directive::Directive;
use compat_verify::engine::{FailureKind, Outcome, PlanState};
use compat_verify::report::CaseStatus;
use compat_verify::report::tested_range::CSV_HEADER;
use compat_verify::version::resolution::RegistryResolutionService;
use helper::*;

fn registry() -> Arc<RegistryResolutionService<FakeRegistry>> {
    Arc::new(RegistryResolutionService::new(
        FakeRegistry::new().with_versions(
            "com.example:demo",
            vec!["0.9", "1.0", "1.5", "1.6-rc1", "2.0"],
        ),
    ))
}

#[tokio::test]
async fn passing_range_writes_results_summary_and_tested_range() {
    let test = TestEngine::new(
        registry(),
        ScriptedScanner::new(),
        FakeClasspathResolver::new(),
        |_| {},
    );

    let report = test
        .engine
        .run("demo", &[pass_directive("demo", "[1.0,2.0)")])
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(report.summary.tests(), 2);
    assert_eq!(report.summary.failures(), 0);
    assert_eq!(
        test.scanner.calls(),
        vec!["com.example:demo:1.0", "com.example:demo:1.5"]
    );
    for name in [
        "verify-AssertPass-com.example-demo-1.0",
        "verify-AssertPass-com.example-demo-1.5",
    ] {
        assert_eq!(
            std::fs::read_to_string(report.results_dir.join(name)).unwrap(),
            "PASSING"
        );
    }
    assert_eq!(
        std::fs::read_to_string(&report.ranges_path).unwrap(),
        format!("{}\ndemo,com.example,demo,1.0,1.5\n", CSV_HEADER)
    );

    let junit = std::fs::read_to_string(&report.junit_path).unwrap();
    assert!(junit.contains("<testsuite name=\"com.example:demo\" tests=\"2\" failures=\"0\""));
    assert!(junit.contains(
        "<testcase classname=\"demo\" name=\"verify-AssertPass-com.example-demo-1.0\""
    ));
}

#[tokio::test]
async fn scanner_mismatch_fails_asserted_pass() {
    let test = TestEngine::new(
        registry(),
        ScriptedScanner::new().mismatching("com.example:demo:1.5"),
        FakeClasspathResolver::new(),
        |_| {},
    );

    let report = test
        .engine
        .run("demo", &[pass_directive("demo", "[1.0,2.0)")])
        .await
        .unwrap();

    assert!(!report.is_success());
    assert_eq!(report.summary.failures(), 1);
    let failed = report.results.iter().find(|r| r.is_failure()).unwrap();
    assert_eq!(failed.outcome, Outcome::Fail(FailureKind::ScannerFailure));
    let content =
        std::fs::read_to_string(report.results_dir.join(failed.task_name())).unwrap();
    assert!(content.starts_with("FAILED (scanner-failure): demo does not match"));
    assert!(content.ends_with("matcher mismatch against com.example:demo:1.5"));
    assert_eq!(
        report.ranges.iter().next().map(|r| (r.low.as_str(), r.high.as_str())),
        Some(("1.0", "1.0"))
    );
}

#[tokio::test]
async fn unexpected_success_fails_asserted_failure() {
    let test = TestEngine::new(
        registry(),
        ScriptedScanner::new(),
        FakeClasspathResolver::new(),
        |_| {},
    );

    let report = test
        .engine
        .run("demo", &[fail_directive("demo", "[,1.0)")])
        .await
        .unwrap();

    assert_eq!(report.results.len(), 1);
    assert_eq!(
        report.results[0].outcome,
        Outcome::Fail(FailureKind::UnexpectedScannerSuccess)
    );
    assert_eq!(report.summary.failures(), 1);
    assert!(report.ranges.is_empty());
}

#[tokio::test]
async fn expected_mismatch_passes_asserted_failure() {
    let test = TestEngine::new(
        registry(),
        ScriptedScanner::new().mismatching("com.example:demo:0.9"),
        FakeClasspathResolver::new(),
        |_| {},
    );

    let report = test
        .engine
        .run("demo", &[fail_directive("demo", "[,1.0)")])
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(report.results[0].outcome, Outcome::Pass);
    // asserted failures prove no range
    assert!(report.ranges.is_empty());
}

#[tokio::test]
async fn runtime_only_directive_checks_host_runtime() {
    let test = TestEngine::new(
        registry(),
        ScriptedScanner::new(),
        FakeClasspathResolver::new(),
        |_| {},
    );

    let report = test
        .engine
        .run("demo", &[Directive::pass().runtime_only().build().unwrap()])
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(test.scanner.calls(), vec!["host-runtime"]);
    assert_eq!(test.resolver.calls(), 0);
    assert!(report.results_dir.join("verify-AssertPass-host-runtime").exists());
}

#[tokio::test]
async fn unresolvable_directive_becomes_error_case() {
    let test = TestEngine::new(
        registry(),
        ScriptedScanner::new(),
        FakeClasspathResolver::new(),
        |_| {},
    );
    let missing = Directive::pass()
        .group("com.example")
        .module("missing")
        .versions("[1.0,)")
        .build()
        .unwrap();

    let report = test
        .engine
        .run("demo", &[pass_directive("demo", "[1.0,2.0)"), missing])
        .await
        .unwrap();

    assert_eq!(report.planning.failures.len(), 1);
    assert_eq!(report.summary.tests(), 3);
    assert_eq!(report.summary.errors(), 1);
    let suite = &report.summary.suites["com.example:missing"];
    assert_eq!(suite.cases[0].name, "resolve pass {com.example:missing:[1.0,)}");
    assert!(matches!(suite.cases[0].status, CaseStatus::Error { .. }));
}

#[tokio::test]
async fn unavailable_artifact_is_boundary_error() {
    let test = TestEngine::new(
        registry(),
        ScriptedScanner::new(),
        FakeClasspathResolver::new().unavailable("com.example:demo:1.5"),
        |_| {},
    );

    let report = test
        .engine
        .run("demo", &[pass_directive("demo", "[1.0,2.0)")])
        .await
        .unwrap();

    assert_eq!(report.summary.errors(), 1);
    assert_eq!(report.summary.failures(), 0);
    assert_eq!(test.scanner.calls(), vec!["com.example:demo:1.0"]);
    let failed = report.results.iter().find(|r| r.is_failure()).unwrap();
    assert_eq!(failed.outcome, Outcome::Fail(FailureKind::BoundaryConstruction));
}

#[tokio::test]
async fn failure_threshold_skips_remaining_plans() {
    let test = TestEngine::new(
        registry(),
        ScriptedScanner::new()
            .mismatching("com.example:demo:1.0")
            .mismatching("com.example:demo:1.5"),
        FakeClasspathResolver::new(),
        |config| {
            config.execution.max_concurrency = Some(1);
            config.execution.max_failures = Some(1);
        },
    );

    let report = test
        .engine
        .run("demo", &[pass_directive("demo", "[1.0,2.0)")])
        .await
        .unwrap();

    let outcomes: Vec<Outcome> = report.results.iter().map(|r| r.outcome).collect();
    assert_eq!(
        outcomes,
        vec![Outcome::Fail(FailureKind::ScannerFailure), Outcome::Skipped]
    );
    assert_eq!(report.summary.skipped(), 1);
    assert_eq!(test.scanner.calls(), vec!["com.example:demo:1.0"]);
    let skipped = std::fs::read_to_string(
        report
            .results_dir
            .join("verify-AssertPass-com.example-demo-1.5"),
    )
    .unwrap();
    assert!(skipped.starts_with("SKIPPED: "));
}

#[tokio::test]
async fn nothing_to_verify_reports_default_case() {
    let test = TestEngine::new(
        registry(),
        ScriptedScanner::new(),
        FakeClasspathResolver::new(),
        |_| {},
    );

    let report = test.engine.run("demo", &[]).await.unwrap();

    assert!(report.is_success());
    assert_eq!(report.summary.tests(), 1);
    assert_eq!(report.summary.suites["demo"].cases[0].name, "verify");
}

#[tokio::test]
async fn each_run_advances_generation_and_clears_results() {
    let test = TestEngine::new(
        registry(),
        ScriptedScanner::new(),
        FakeClasspathResolver::new(),
        |_| {},
    );
    assert_eq!(test.engine.generation(), 0);

    let first = test
        .engine
        .run("demo", &[pass_directive("demo", "[1.0,2.0)")])
        .await
        .unwrap();
    let second = test
        .engine
        .run("demo", &[Directive::pass().runtime_only().build().unwrap()])
        .await
        .unwrap();

    assert_eq!((first.generation, second.generation), (1, 2));
    assert_eq!(test.engine.generation(), 2);
    let files: Vec<String> = std::fs::read_dir(&second.results_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(files, vec!["verify-AssertPass-host-runtime"]);
    // ranges accumulate across runs
    assert_eq!(second.ranges.len(), 1);
}

#[tokio::test]
async fn long_directive_name_keeps_every_output() {
    let test = TestEngine::new(
        registry(),
        ScriptedScanner::new(),
        FakeClasspathResolver::new(),
        |_| {},
    );
    let long = Directive::pass()
        .name("x".repeat(260))
        .group("com.example")
        .module("demo")
        .versions("[2.0,)")
        .build()
        .unwrap();

    let report = test
        .engine
        .run("demo", &[pass_directive("demo", "[1.0,2.0)"), long])
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(report.results.len(), 3);
    for result in &report.results {
        assert_eq!(
            std::fs::read_to_string(report.results_dir.join(result.task_name())).unwrap(),
            "PASSING"
        );
    }
    assert!(report.junit_path.exists());
    assert!(report.ranges_path.exists());
}

#[tokio::test]
async fn runtime_version_reaches_scanner() {
    let test = TestEngine::new(
        registry(),
        ScriptedScanner::new(),
        FakeClasspathResolver::new(),
        |_| {},
    );
    let pinned = Directive::pass()
        .group("com.example")
        .module("demo")
        .versions("[2.0,)")
        .runtime_version("11")
        .build()
        .unwrap();

    test.engine
        .run("demo", &[pass_directive("demo", "[,1.0)"), pinned])
        .await
        .unwrap();

    assert_eq!(
        test.scanner.runtime_versions(),
        vec![
            ("com.example:demo:0.9".to_string(), None),
            ("com.example:demo:2.0".to_string(), Some("11".to_string())),
        ]
    );
}

#[tokio::test]
async fn report_carries_final_plan_states() {
    let test = TestEngine::new(
        registry(),
        ScriptedScanner::new().mismatching("com.example:demo:1.5"),
        FakeClasspathResolver::new(),
        |_| {},
    );

    let report = test
        .engine
        .run("demo", &[pass_directive("demo", "[1.0,2.0)")])
        .await
        .unwrap();

    assert_eq!(
        report.states,
        vec![
            ("verify-AssertPass-com.example-demo-1.0".to_string(), PlanState::Passed),
            ("verify-AssertPass-com.example-demo-1.5".to_string(), PlanState::Failed),
        ]
    );
}
