use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use compat_verify::config::{self, EngineConfig};
use compat_verify::directive::DirectiveFile;
use compat_verify::engine::{Engine, OutputLayout};
use compat_verify::logging::init_logging;
use compat_verify::report::{RangeReport, SummaryReport};
use tracing::{Level, info};

#[derive(Parser)]
#[command(name = "compat-verify")]
#[command(version, about = "Verify instrumentation compatibility across dependency versions")]
struct Cli {
    /// Emit logs as newline-delimited JSON
    #[arg(long, global = true)]
    json: bool,

    /// Engine configuration file (JSON)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Output directory; overrides the configured one
    #[arg(long, short, global = true)]
    output: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Plan and run the checks declared in a directive file
    Run {
        /// Directive declaration file (JSON)
        #[arg(long, short)]
        directives: PathBuf,

        /// Stop starting new checks after this many failures
        #[arg(long)]
        max_failures: Option<usize>,
    },
    /// Merge every per-subject range store into one
    MergeReports,
    /// Rebuild a subject's JUnit summary from its result files
    Summarize {
        /// Subject whose results to summarize
        subject: String,
    },
}

fn load_config(cli: &Cli) -> anyhow::Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(output) = &cli.output {
        config.report.output_dir = Some(output.clone());
    }
    Ok(config)
}

async fn run(config: EngineConfig, directives: &Path) -> anyhow::Result<ExitCode> {
    let file = DirectiveFile::load(directives)
        .with_context(|| format!("loading directives {}", directives.display()))?;
    let subject = file.subject.clone();
    let directives = file.into_directives()?;

    let engine = Engine::from_config(config)?;
    let report = engine.run(&subject, &directives).await?;

    info!("JUnit report written to {}", report.junit_path.display());
    info!("Tested ranges written to {}", report.ranges_path.display());

    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn merge_reports(layout: &OutputLayout) -> anyhow::Result<ExitCode> {
    let merged = RangeReport::merge_dir(&layout.ranges_dir(), &layout.merged_ranges_path())?;
    info!(
        "Merged {} tested ranges into {}",
        merged.len(),
        layout.merged_ranges_path().display()
    );
    Ok(ExitCode::SUCCESS)
}

fn summarize(layout: &OutputLayout, subject: &str) -> anyhow::Result<ExitCode> {
    let summary = SummaryReport::from_result_files(subject, &layout.results_dir(subject))?;
    let path = layout.junit_path(subject);
    summary.write_junit(&path)?;
    info!(
        "{} checks, {} failures, {} errors; written to {}",
        summary.tests(),
        summary.failures(),
        summary.errors(),
        path.display()
    );
    Ok(if summary.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let _guard = init_logging(cli.json, Level::INFO, Some(&config::log_path()));

    let mut config = load_config(&cli)?;
    let layout = OutputLayout::new(config.report.output_dir());

    match cli.command {
        Command::Run {
            directives,
            max_failures,
        } => {
            if max_failures.is_some() {
                config.execution.max_failures = max_failures;
            }
            tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?
                .block_on(run(config, &directives))
        }
        Command::MergeReports => merge_reports(&layout),
        Command::Summarize { subject } => summarize(&layout, &subject),
    }
}
