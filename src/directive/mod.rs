//! Directive layer
//! - types.rs: Directive (with builder), Artifact, ModuleId, TaskPlan
//! - decl.rs: JSON declaration format
//! - error.rs: DirectiveError

pub mod decl;
pub mod error;
pub mod types;

pub use decl::{DirectiveDecl, DirectiveFile};
pub use error::DirectiveError;
pub use types::{Artifact, Directive, DirectiveBuilder, ModuleId, TaskPlan};
