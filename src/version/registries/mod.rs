//! Registry implementations for fetching module versions

pub mod maven;

pub use maven::MavenRegistry;
