//! Planning and isolated execution
//! - planner.rs: directives to task plans
//! - boundary.rs: layered isolation boundaries and their generation-stamped cache
//! - classpath.rs: coordinates to local files, with their runtime dependencies
//! - pom.rs: POM reading for the dependency walk
//! - scanner.rs: compatibility scanner boundary and the process scanner
//! - executor.rs: worker pool, outcome classification, result files
//! - run.rs: one engine invocation end to end
//! - error.rs: BoundaryError, ScanError, EngineError

pub mod boundary;
pub mod classpath;
pub mod error;
pub mod executor;
pub mod planner;
pub mod pom;
pub mod run;
pub mod scanner;

pub use error::{BoundaryError, EngineError, ScanError};
pub use executor::{FailureKind, IsolatedExecutor, Outcome, PlanState, VerificationResult};
pub use planner::{Planning, TaskPlanner};
pub use run::{Engine, EngineReport, OutputLayout};
