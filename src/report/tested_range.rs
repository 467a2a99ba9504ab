//! Tested version ranges
//!
//! For every `(subject, group, module)` the lowest and highest version that
//! passed verification. Ranges only ever widen, so merging runs in any order
//! gives the same store.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::path::Path;

use tracing::{debug, info};

use crate::directive::TaskPlan;
use crate::engine::executor::VerificationResult;
use crate::report::error::ReportError;
use crate::version::semver::ResolvedVersion;

/// CSV header of the range store
pub const CSV_HEADER: &str = "instrumentation,jarGroupId,jarArtifactId,lowestVersion,highestVersion";

/// `(subject, group, module)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RangeKey {
    pub subject: String,
    pub group: String,
    pub module: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestedRange {
    pub key: RangeKey,
    pub low: ResolvedVersion,
    pub high: ResolvedVersion,
}

impl TestedRange {
    pub fn new(key: RangeKey, version: ResolvedVersion) -> Self {
        Self {
            key,
            low: version.clone(),
            high: version,
        }
    }

    /// Range covering a passing plan, if the plan was an artifact plan that asserted a pass
    pub fn from_plan(subject: &str, plan: &TaskPlan) -> Option<Self> {
        let artifact = plan.artifact.as_ref()?;
        if !plan.directive.assert_pass() {
            return None;
        }
        Some(Self::new(
            RangeKey {
                subject: subject.to_string(),
                group: artifact.group.clone(),
                module: artifact.module.clone(),
            },
            ResolvedVersion::parse(&artifact.version),
        ))
    }

    /// Widen to cover `other`; keys must match
    pub fn merge(&mut self, other: &TestedRange) {
        debug_assert_eq!(self.key, other.key);
        if other.low < self.low {
            self.low = other.low.clone();
        }
        if other.high > self.high {
            self.high = other.high.clone();
        }
    }

    fn to_csv_row(&self) -> String {
        [
            csv_field(&self.key.subject),
            csv_field(&self.key.group),
            csv_field(&self.key.module),
            csv_field(self.low.as_str()),
            csv_field(self.high.as_str()),
        ]
        .join(",")
    }

    fn from_csv_row(line_no: usize, fields: &[String]) -> Result<Self, ReportError> {
        let [subject, group, module, low, high] = fields else {
            return Err(ReportError::MalformedCsv {
                line: line_no,
                reason: format!("expected 5 fields, found {}", fields.len()),
            });
        };
        if [subject, group, module, low, high].iter().any(|f| f.is_empty()) {
            return Err(ReportError::MalformedCsv {
                line: line_no,
                reason: "empty field".to_string(),
            });
        }

        let (low, high) = (ResolvedVersion::parse(low), ResolvedVersion::parse(high));
        let (low, high) = if high < low { (high, low) } else { (low, high) };
        Ok(Self {
            key: RangeKey {
                subject: subject.clone(),
                group: group.clone(),
                module: module.clone(),
            },
            low,
            high,
        })
    }
}

/// Quote a field holding a separator, quote or line break
fn csv_field(value: &str) -> Cow<'_, str> {
    if value.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}

/// Split CSV content into records, each with the line it starts on
///
/// Quoted fields may span lines; `""` inside quotes is a literal quote.
/// Unquoted fields are trimmed and blank lines are skipped.
fn csv_records(content: &str) -> Result<Vec<(usize, Vec<String>)>, ReportError> {
    let mut records = Vec::new();
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut was_quoted = false;
    let mut line = 1;
    let mut record_line = 1;

    let finish = |field: &mut String, was_quoted: &mut bool| {
        let value = if *was_quoted {
            std::mem::take(field)
        } else {
            let trimmed = field.trim().to_string();
            field.clear();
            trimmed
        };
        *was_quoted = false;
        value
    };

    let mut chars = content.chars().peekable();
    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                '\n' => {
                    line += 1;
                    field.push(c);
                }
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' if !was_quoted && field.trim().is_empty() => {
                field.clear();
                in_quotes = true;
                was_quoted = true;
            }
            ',' => fields.push(finish(&mut field, &mut was_quoted)),
            '\n' => {
                fields.push(finish(&mut field, &mut was_quoted));
                let record = std::mem::take(&mut fields);
                if !(record.len() == 1 && record[0].is_empty()) {
                    records.push((record_line, record));
                }
                line += 1;
                record_line = line;
            }
            '\r' => {}
            c if was_quoted && c.is_whitespace() => {}
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err(ReportError::MalformedCsv {
            line: record_line,
            reason: "unterminated quoted field".to_string(),
        });
    }
    if !field.trim().is_empty() || was_quoted || !fields.is_empty() {
        fields.push(finish(&mut field, &mut was_quoted));
        records.push((record_line, fields));
    }
    Ok(records)
}

/// Keyed collection of tested ranges
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeReport {
    ranges: BTreeMap<RangeKey, TestedRange>,
}

impl RangeReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ranges proven by the passing results of one run
    pub fn from_results(subject: &str, results: &[VerificationResult]) -> Self {
        let mut report = Self::new();
        for result in results.iter().filter(|r| r.is_pass()) {
            if let Some(range) = TestedRange::from_plan(subject, &result.plan) {
                report.add(range);
            }
        }
        report
    }

    pub fn add(&mut self, range: TestedRange) {
        match self.ranges.get_mut(&range.key) {
            Some(existing) => existing.merge(&range),
            None => {
                self.ranges.insert(range.key.clone(), range);
            }
        }
    }

    pub fn merge(&mut self, other: &RangeReport) {
        for range in other.ranges.values() {
            self.add(range.clone());
        }
    }

    pub fn get(&self, key: &RangeKey) -> Option<&TestedRange> {
        self.ranges.get(key)
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TestedRange> {
        self.ranges.values()
    }

    /// CSV with header, rows sorted by key
    pub fn to_csv(&self) -> String {
        let mut csv = String::from(CSV_HEADER);
        csv.push('\n');
        for range in self.ranges.values() {
            csv.push_str(&range.to_csv_row());
            csv.push('\n');
        }
        csv
    }

    pub fn from_csv(content: &str) -> Result<Self, ReportError> {
        let mut report = Self::new();
        for (line, fields) in csv_records(content)? {
            if line == 1 && fields.join(",") == CSV_HEADER {
                continue;
            }
            report.add(TestedRange::from_csv_row(line, &fields)?);
        }
        Ok(report)
    }

    /// Read a store; a missing file is an empty store
    pub fn read(path: &Path) -> Result<Self, ReportError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_csv(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::new()),
            Err(e) => Err(ReportError::io(path)(e)),
        }
    }

    /// Merge into the store at `path` and replace it atomically
    ///
    /// Returns the merged store.
    pub fn write(&self, path: &Path) -> Result<RangeReport, ReportError> {
        let mut merged = Self::read(path)?;
        merged.merge(self);

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(ReportError::io(parent))?;
        }

        let temp = path.with_extension("csv.tmp");
        std::fs::write(&temp, merged.to_csv()).map_err(ReportError::io(&temp))?;
        std::fs::rename(&temp, path).map_err(ReportError::io(path))?;

        debug!("Wrote {} tested ranges to {}", merged.len(), path.display());
        Ok(merged)
    }

    /// Merge every `.csv` store in `dir` (other than `output`) into `output`
    pub fn merge_dir(dir: &Path, output: &Path) -> Result<RangeReport, ReportError> {
        let mut paths: Vec<_> = std::fs::read_dir(dir)
            .map_err(ReportError::io(dir))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "csv") && p != output)
            .collect();
        paths.sort();

        let mut combined = Self::new();
        for path in &paths {
            combined.merge(&Self::read(path)?);
        }

        info!(
            "Merged {} range reports from {} into {}",
            paths.len(),
            dir.display(),
            output.display()
        );
        combined.write(output)
    }
}
