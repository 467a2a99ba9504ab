//! Version range expressions
//!
//! Supports Maven-style range specifications:
//! - `[1.0,2.0)` - inclusive lower, exclusive upper
//! - `[3.0,)`, `(,2.0]` - open-ended on one side
//! - `[1.5]` - exactly 1.5
//! - `1.5` - bare version, treated as exactly 1.5
//! - `[1.0,2.0),[3.0,)` - union of intervals

use std::cmp::Ordering;
use std::fmt;

use crate::version::error::RangeError;
use crate::version::semver::ResolvedVersion;

/// One end of an interval
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Bound {
    pub version: ResolvedVersion,
    pub inclusive: bool,
}

impl Bound {
    pub fn inclusive(version: ResolvedVersion) -> Self {
        Self {
            version,
            inclusive: true,
        }
    }

    pub fn exclusive(version: ResolvedVersion) -> Self {
        Self {
            version,
            inclusive: false,
        }
    }

    /// The bound that starts right where this one stops (or vice versa)
    fn flipped(&self) -> Self {
        Self {
            version: self.version.clone(),
            inclusive: !self.inclusive,
        }
    }
}

/// Order two lower bounds; `None` is negative infinity
fn cmp_lower(a: Option<&Bound>, b: Option<&Bound>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => a
            .version
            .cmp_key(&b.version)
            // an exclusive lower bound starts later
            .then_with(|| b.inclusive.cmp(&a.inclusive)),
    }
}

/// Order two upper bounds; `None` is positive infinity
fn cmp_upper(a: Option<&Bound>, b: Option<&Bound>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => a
            .version
            .cmp_key(&b.version)
            // an exclusive upper bound stops earlier
            .then_with(|| a.inclusive.cmp(&b.inclusive)),
    }
}

/// A contiguous set of versions
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Interval {
    pub lower: Option<Bound>,
    pub upper: Option<Bound>,
}

impl Interval {
    pub fn exact(version: ResolvedVersion) -> Self {
        Self {
            lower: Some(Bound::inclusive(version.clone())),
            upper: Some(Bound::inclusive(version)),
        }
    }

    pub fn contains(&self, version: &ResolvedVersion) -> bool {
        let above_lower = match &self.lower {
            None => true,
            Some(bound) => match version.cmp_key(&bound.version) {
                Ordering::Greater => true,
                Ordering::Equal => bound.inclusive,
                Ordering::Less => false,
            },
        };
        let below_upper = match &self.upper {
            None => true,
            Some(bound) => match version.cmp_key(&bound.version) {
                Ordering::Less => true,
                Ordering::Equal => bound.inclusive,
                Ordering::Greater => false,
            },
        };
        above_lower && below_upper
    }

    pub fn is_empty(&self) -> bool {
        match (&self.lower, &self.upper) {
            (Some(lower), Some(upper)) => match lower.version.cmp_key(&upper.version) {
                Ordering::Greater => true,
                Ordering::Equal => !(lower.inclusive && upper.inclusive),
                Ordering::Less => false,
            },
            _ => false,
        }
    }

    fn is_exact(&self) -> bool {
        matches!(
            (&self.lower, &self.upper),
            (Some(l), Some(u)) if l.inclusive && u.inclusive && l.version == u.version
        )
    }

    /// Clamp this interval to `[floor, ceiling]`
    fn clamp(&self, floor: &ResolvedVersion, ceiling: &ResolvedVersion) -> Interval {
        let floor = Bound::inclusive(floor.clone());
        let ceiling = Bound::inclusive(ceiling.clone());

        let lower = match cmp_lower(self.lower.as_ref(), Some(&floor)) {
            Ordering::Less => floor,
            _ => self.lower.clone().unwrap_or(floor),
        };
        let upper = match cmp_upper(self.upper.as_ref(), Some(&ceiling)) {
            Ordering::Greater => ceiling,
            _ => self.upper.clone().unwrap_or(ceiling),
        };

        Interval {
            lower: Some(lower),
            upper: Some(upper),
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_exact()
            && let Some(bound) = &self.lower
        {
            return write!(f, "[{}]", bound.version);
        }

        match &self.lower {
            Some(bound) if bound.inclusive => write!(f, "[{}", bound.version)?,
            Some(bound) => write!(f, "({}", bound.version)?,
            None => f.write_str("(")?,
        }
        f.write_str(",")?;
        match &self.upper {
            Some(bound) if bound.inclusive => write!(f, "{}]", bound.version),
            Some(bound) => write!(f, "{})", bound.version),
            None => f.write_str(")"),
        }
    }
}

/// Union of intervals, kept sorted by lower bound
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionRange {
    intervals: Vec<Interval>,
}

impl VersionRange {
    /// Range matching every version
    pub fn all() -> Self {
        Self {
            intervals: vec![Interval {
                lower: None,
                upper: None,
            }],
        }
    }

    pub fn from_intervals(mut intervals: Vec<Interval>) -> Self {
        intervals.sort_by(|a, b| cmp_lower(a.lower.as_ref(), b.lower.as_ref()));
        Self { intervals }
    }

    pub fn parse(expr: &str) -> Result<Self, RangeError> {
        let expr = expr.trim();
        if expr.is_empty() {
            return Err(RangeError::Empty);
        }

        if !expr.starts_with(['[', '(']) {
            if expr.contains([',', '[', ']', '(', ')']) {
                return Err(RangeError::malformed(expr, "unexpected range delimiter"));
            }
            return Ok(Self::from_intervals(vec![Interval::exact(
                ResolvedVersion::parse(expr),
            )]));
        }

        let mut intervals = Vec::new();
        let mut rest = expr;
        while !rest.is_empty() {
            let open = rest.chars().next().unwrap_or_default();
            if open != '[' && open != '(' {
                return Err(RangeError::malformed(expr, "expected '[' or '('"));
            }
            let close_at = rest
                .find([']', ')'])
                .ok_or_else(|| RangeError::malformed(expr, "missing closing bracket"))?;
            let close = rest[close_at..].chars().next().unwrap_or_default();
            let body = &rest[1..close_at];

            intervals.push(Self::parse_interval(expr, open, body, close)?);

            rest = rest[close_at + 1..].trim_start();
            if let Some(after_comma) = rest.strip_prefix(',') {
                rest = after_comma.trim_start();
                if rest.is_empty() {
                    return Err(RangeError::malformed(expr, "trailing ','"));
                }
            }
        }

        Ok(Self::from_intervals(intervals))
    }

    fn parse_interval(expr: &str, open: char, body: &str, close: char) -> Result<Interval, RangeError> {
        let Some((lower, upper)) = body.split_once(',') else {
            let version = body.trim();
            if open != '[' || close != ']' || version.is_empty() {
                return Err(RangeError::malformed(expr, "exact version must be written as [v]"));
            }
            return Ok(Interval::exact(ResolvedVersion::parse(version)));
        };

        if upper.contains(',') {
            return Err(RangeError::malformed(expr, "interval has more than two bounds"));
        }

        let bound = |text: &str, inclusive: bool| {
            let text = text.trim();
            (!text.is_empty()).then(|| Bound {
                version: ResolvedVersion::parse(text),
                inclusive,
            })
        };

        let interval = Interval {
            lower: bound(lower, open == '['),
            upper: bound(upper, close == ']'),
        };

        if interval.is_empty() {
            return Err(RangeError::malformed(expr, "lower bound is above upper bound"));
        }
        Ok(interval)
    }

    pub fn intervals(&self) -> &[Interval] {
        &self.intervals
    }

    pub fn contains(&self, version: &ResolvedVersion) -> bool {
        self.intervals.iter().any(|i| i.contains(version))
    }

    /// Every version in `[floor, ceiling]` that this range does not cover,
    /// as a list of disjoint non-empty intervals
    pub fn complement_within(
        &self,
        floor: &ResolvedVersion,
        ceiling: &ResolvedVersion,
    ) -> Vec<Interval> {
        let mut gaps = Vec::new();
        // start of the next gap; None means negative infinity
        let mut cursor: Option<Bound> = None;
        let mut open_ended = false;

        for interval in &self.intervals {
            if let Some(lower) = &interval.lower {
                gaps.push(Interval {
                    lower: cursor.clone(),
                    upper: Some(lower.flipped()),
                });
            }

            match &interval.upper {
                None => {
                    open_ended = true;
                    break;
                }
                Some(upper) => {
                    let next = upper.flipped();
                    if cmp_lower(Some(&next), cursor.as_ref()) == Ordering::Greater {
                        cursor = Some(next);
                    }
                }
            }
        }

        if !open_ended {
            gaps.push(Interval {
                lower: cursor,
                upper: None,
            });
        }

        gaps.iter()
            .filter(|gap| !gap.is_empty())
            .map(|gap| gap.clamp(floor, ceiling))
            .filter(|gap| !gap.is_empty())
            .collect()
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, interval) in self.intervals.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", interval)?;
        }
        Ok(())
    }
}
