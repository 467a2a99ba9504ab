//! Pre-release filtering and range sampling
//!
//! Turns the raw list of published versions into the set that is worth
//! verifying: unstable builds and explicitly skipped versions are dropped,
//! each major.minor bucket is reduced to its extremes, and whatever is left
//! is sampled down to a fixed cap.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::config::MAX_VERSIONS_PER_RANGE;
use crate::version::semver::{ResolvedVersion, VersionSet};

/// Substrings that mark a version as pre-release or vendor-specific
const PRE_RELEASE_MARKERS: &[&str] = &[
    "rc",
    ".cr",
    "-cr",
    "alpha",
    "beta",
    "-b",
    ".m",
    "-m",
    "-dev",
    "-ea",
    "-atlassian-",
    "public_draft",
    "-preview",
    "redhat",
    "snapshot",
];

/// Trailing milestone build such as `1.0.0.2m1`
static END_NMN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^.*\.[0-9]+[mM][0-9]+$").expect("valid regex"));

/// Trailing VCS short hash such as `1.2.0-3f2a9c1`
static GIT_SHA_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^.*-[0-9a-f]{7,}$").expect("valid regex"));

/// Returns true when the version looks like a stable release
pub fn is_stable_release(version: &str) -> bool {
    let lower = version.to_lowercase();
    !(PRE_RELEASE_MARKERS.iter().any(|marker| lower.contains(marker))
        || END_NMN_PATTERN.is_match(&lower)
        || GIT_SHA_PATTERN.is_match(&lower))
}

/// Filters raw registry versions down to the versions a directive should test
#[derive(Debug, Clone, Default)]
pub struct VersionFilter {
    /// Lowercased versions to skip
    skip_versions: BTreeSet<String>,
    include_snapshots: bool,
}

impl VersionFilter {
    pub fn new<I, S>(skip_versions: I, include_snapshots: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            skip_versions: skip_versions
                .into_iter()
                .map(|v| v.as_ref().to_lowercase())
                .collect(),
            include_snapshots,
        }
    }

    fn is_skipped(&self, version: &str) -> bool {
        self.skip_versions.contains(&version.to_lowercase())
    }

    /// Drop unstable and skipped versions
    pub fn filter<S: AsRef<str>>(&self, versions: &[S]) -> Vec<String> {
        versions
            .iter()
            .map(AsRef::as_ref)
            .filter(|v| {
                if self.is_skipped(v) {
                    debug!("Skipping {}: listed in skip versions", v);
                    return false;
                }
                self.include_snapshots || is_stable_release(v)
            })
            .map(str::to_string)
            .collect()
    }

    /// Reduce a filtered version list to at most one low and one high
    /// representative per major.minor bucket, then sample down below the cap.
    ///
    /// The lowest and highest versions always survive.
    pub fn limit(&self, versions: Vec<String>) -> Vec<ResolvedVersion> {
        if versions.len() <= 1 {
            return versions.iter().map(|v| ResolvedVersion::parse(v)).collect();
        }

        let set = VersionSet::new(versions.iter().filter(|v| !self.is_skipped(v)));
        let (Some(lowest), Some(highest)) = (set.lowest().cloned(), set.highest().cloned()) else {
            return Vec::new();
        };

        let mut kept = set.low_and_high_for_major_minor();
        if kept.len() < MAX_VERSIONS_PER_RANGE {
            return kept;
        }

        let mut candidates: Vec<ResolvedVersion> = kept
            .iter()
            .filter(|v| **v != lowest && **v != highest)
            .cloned()
            .collect();
        candidates.sort_by_cached_key(|v| Sha256::digest(v.as_str().as_bytes()));

        let before = kept.len();
        let excess = kept.len() + 1 - MAX_VERSIONS_PER_RANGE;
        let dropped: BTreeSet<ResolvedVersion> = candidates.into_iter().take(excess).collect();
        kept.retain(|v| !dropped.contains(v));

        info!(
            "Sampled version range from {} to {} versions (dropped {})",
            before,
            kept.len(),
            before - kept.len()
        );
        kept
    }

    /// Filter then limit
    pub fn apply<S: AsRef<str>>(&self, versions: &[S]) -> Vec<ResolvedVersion> {
        self.limit(self.filter(versions))
    }
}
