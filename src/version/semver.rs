//! Version parsing and major.minor bucketing
//!
//! Versions are packed into a comparable numeric key: the first three numeric
//! groups each take a 12-bit field of a `u64`, most significant first.
//! Anything that does not fit the numeric part is kept as a qualifier.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

/// Width of one packed version field
const FIELD_BITS: u32 = 12;

/// Largest value a packed field can hold
const FIELD_MAX: u64 = (1 << FIELD_BITS) - 1;

/// Number of numeric groups packed into the ordinal
const PACKED_FIELDS: usize = 3;

/// A version string with its parsed bucketing key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedVersion {
    raw: String,
    ordinal: u64,
    qualifier: String,
}

impl ResolvedVersion {
    /// Parse a raw version string.
    ///
    /// Parsing never fails: missing numeric groups count as zero and any
    /// trailing text becomes the qualifier.
    ///
    /// Examples:
    /// - "1.2.3" -> ordinal(1, 2, 3), qualifier ""
    /// - "2.0-SNAPSHOT" -> ordinal(2, 0, 0), qualifier "SNAPSHOT"
    /// - "1.2.3.Final" -> ordinal(1, 2, 3), qualifier "Final"
    /// - "4.1.0.1-beta" -> ordinal(4, 1, 0), qualifier "beta-1"
    pub fn parse(version: &str) -> Self {
        let (numeric, mut qualifier) = match version.split_once('-') {
            Some((numeric, qualifier)) => (numeric, qualifier.to_string()),
            None => (version, String::new()),
        };

        let mut groups = numeric.split('.').peekable();
        let mut ordinal = 0u64;
        for _ in 0..PACKED_FIELDS {
            let field = match groups.peek().and_then(|g| g.parse::<u64>().ok()) {
                Some(value) => {
                    groups.next();
                    value.min(FIELD_MAX)
                }
                None => 0,
            };
            ordinal = (ordinal << FIELD_BITS) | field;
        }

        let leftover: Vec<&str> = groups.filter(|g| !g.is_empty()).collect();
        if !leftover.is_empty() {
            let leftover = leftover.join(".");
            qualifier = if qualifier.is_empty() {
                leftover
            } else {
                format!("{}-{}", qualifier, leftover)
            };
        }

        Self {
            raw: version.to_string(),
            ordinal,
            qualifier,
        }
    }

    /// The version string as published
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Packed (major, minor, micro) key
    pub fn ordinal(&self) -> u64 {
        self.ordinal
    }

    /// Packed (major, minor) key identifying the bucket
    pub fn major_minor(&self) -> u32 {
        (self.ordinal >> FIELD_BITS) as u32
    }

    pub fn major(&self) -> u64 {
        self.ordinal >> (FIELD_BITS * 2)
    }

    pub fn minor(&self) -> u64 {
        (self.ordinal >> FIELD_BITS) & FIELD_MAX
    }

    pub fn micro(&self) -> u64 {
        self.ordinal & FIELD_MAX
    }

    pub fn qualifier(&self) -> &str {
        &self.qualifier
    }

    /// Compare by key only, so "2.0" and "2.0.0" are equal
    pub fn cmp_key(&self, other: &Self) -> Ordering {
        self.ordinal
            .cmp(&other.ordinal)
            .then_with(|| self.qualifier.cmp(&other.qualifier))
    }
}

impl Ord for ResolvedVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cmp_key(other)
            // "1.0" and "1.0.0" share a key but must stay distinct set members
            .then_with(|| self.raw.cmp(&other.raw))
    }
}

impl PartialOrd for ResolvedVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ResolvedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Sorted set of parsed versions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionSet {
    versions: BTreeSet<ResolvedVersion>,
}

impl VersionSet {
    pub fn new<I, S>(versions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            versions: versions
                .into_iter()
                .map(|v| ResolvedVersion::parse(v.as_ref()))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResolvedVersion> {
        self.versions.iter()
    }

    pub fn lowest(&self) -> Option<&ResolvedVersion> {
        self.versions.first()
    }

    pub fn highest(&self) -> Option<&ResolvedVersion> {
        self.versions.last()
    }

    /// Keep at most the lowest and highest version of every major.minor bucket.
    ///
    /// Dense patch releases collapse to their bucket extremes, so the global
    /// minimum and maximum are always part of the result.
    pub fn low_and_high_for_major_minor(&self) -> Vec<ResolvedVersion> {
        let mut result = Vec::new();
        let mut bucket_first: Option<&ResolvedVersion> = None;
        let mut previous: Option<&ResolvedVersion> = None;

        for version in &self.versions {
            match previous {
                None => {
                    result.push(version.clone());
                    bucket_first = Some(version);
                }
                Some(prev) if prev.major_minor() != version.major_minor() => {
                    if bucket_first != Some(prev) {
                        result.push(prev.clone());
                    }
                    result.push(version.clone());
                    bucket_first = Some(version);
                }
                Some(_) => {}
            }
            previous = Some(version);
        }

        if let Some(last) = previous
            && bucket_first != Some(last)
        {
            result.push(last.clone());
        }

        result
    }
}

impl FromIterator<ResolvedVersion> for VersionSet {
    fn from_iter<T: IntoIterator<Item = ResolvedVersion>>(iter: T) -> Self {
        Self {
            versions: iter.into_iter().collect(),
        }
    }
}
