//! Version layer: from published versions to the versions worth verifying
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Registry   │────▶│    Cache    │────▶│ Resolution  │
//! │  (fetch)    │     │  (storage)  │     │  (resolve)  │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!        │                                       │
//!        ▼                                       ▼
//! ┌─────────────┐                         ┌─────────────┐
//! │ Registries  │                         │Range/Filter │
//! │  (maven)    │                         │  (select)   │
//! └─────────────┘                         └─────────────┘
//! ```
//!
//! # Modules
//!
//! - [`cache`]: SQLite-based version cache and the read-through [`cache::CachedRegistry`]
//! - [`filter`]: Pre-release filtering and deterministic sampling
//! - [`range`]: Maven-style version range expressions
//! - [`registry`]: Registry trait for fetching versions from remote sources
//! - [`registries`]: Concrete registry implementations
//! - [`resolution`]: Directive to artifact resolution, inverse derivation
//! - [`error`]: Error types for the version layer
//! - [`semver`]: Version parsing and major.minor bucketing
//! - [`types`]: Common types like `PackageVersions`

pub mod cache;
pub mod error;
pub mod filter;
pub mod range;
pub mod registries;
pub mod registry;
pub mod resolution;
pub mod semver;
pub mod types;
