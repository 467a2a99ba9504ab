//! Directive, artifact and task plan value types

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use sha2::{Digest, Sha256};

use crate::directive::error::DirectiveError;
use crate::version::range::VersionRange;

/// Label used for runtime-only directives
pub const HOST_RUNTIME_LABEL: &str = "host-runtime";

/// Longest task name, in bytes; task names double as file names
pub const MAX_TASK_NAME_LEN: usize = 200;

/// A `group:module` pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId {
    pub group: String,
    pub module: String,
}

impl ModuleId {
    pub fn new(group: impl Into<String>, module: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            module: module.into(),
        }
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.group, self.module)
    }
}

impl FromStr for ModuleId {
    type Err = DirectiveError;

    /// Parse `group:module`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split(':').collect::<Vec<_>>().as_slice() {
            [group, module] if !group.is_empty() && !module.is_empty() => {
                Ok(ModuleId::new(*group, *module))
            }
            _ => Err(DirectiveError::InvalidExclusion(s.to_string())),
        }
    }
}

/// Concrete artifact coordinates
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Artifact {
    pub group: String,
    pub module: String,
    pub classifier: Option<String>,
    pub version: String,
}

impl Artifact {
    pub fn new(group: impl Into<String>, module: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            module: module.into(),
            classifier: None,
            version: version.into(),
        }
    }

    pub fn with_classifier(mut self, classifier: Option<String>) -> Self {
        self.classifier = classifier.filter(|c| !c.is_empty());
        self
    }

    pub fn module_id(&self) -> ModuleId {
        ModuleId::new(&self.group, &self.module)
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group, self.module, self.version)?;
        if let Some(classifier) = &self.classifier {
            write!(f, ":{}", classifier)?;
        }
        Ok(())
    }
}

impl FromStr for Artifact {
    type Err = DirectiveError;

    /// Parse `group:module:version[:classifier]`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() < 3 || parts.len() > 4 || parts.iter().any(|p| p.is_empty()) {
            return Err(DirectiveError::InvalidCoordinate(s.to_string()));
        }
        Ok(Artifact::new(parts[0], parts[1], parts[2])
            .with_classifier(parts.get(3).map(|c| c.to_string())))
    }
}

/// A declared compatibility claim
///
/// Built through [`DirectiveBuilder`], which validates that runtime-only
/// directives carry no artifact fields and that artifact directives carry
/// a parseable range.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Directive {
    name: Option<String>,
    group: String,
    module: String,
    classifier: Option<String>,
    version_range: String,
    skip_versions: BTreeSet<String>,
    additional_dependencies: Vec<Artifact>,
    excluded_dependencies: Vec<ModuleId>,
    additional_repositories: Vec<String>,
    assert_pass: bool,
    assert_inverse: bool,
    is_runtime_only: bool,
    include_snapshots: bool,
    runtime_version_constraint: Option<String>,
}

impl Directive {
    /// Start a directive expecting the scanner to succeed
    pub fn pass() -> DirectiveBuilder {
        DirectiveBuilder::new(true)
    }

    /// Start a directive expecting the scanner to fail
    pub fn fail() -> DirectiveBuilder {
        DirectiveBuilder::new(false)
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn module_id(&self) -> ModuleId {
        ModuleId::new(&self.group, &self.module)
    }

    pub fn classifier(&self) -> Option<&str> {
        self.classifier.as_deref()
    }

    pub fn version_range(&self) -> &str {
        &self.version_range
    }

    pub fn skip_versions(&self) -> &BTreeSet<String> {
        &self.skip_versions
    }

    pub fn additional_dependencies(&self) -> &[Artifact] {
        &self.additional_dependencies
    }

    pub fn excluded_dependencies(&self) -> &[ModuleId] {
        &self.excluded_dependencies
    }

    pub fn additional_repositories(&self) -> &[String] {
        &self.additional_repositories
    }

    pub fn assert_pass(&self) -> bool {
        self.assert_pass
    }

    pub fn assert_inverse(&self) -> bool {
        self.assert_inverse
    }

    pub fn is_runtime_only(&self) -> bool {
        self.is_runtime_only
    }

    pub fn include_snapshots(&self) -> bool {
        self.include_snapshots
    }

    pub fn runtime_version_constraint(&self) -> Option<&str> {
        self.runtime_version_constraint.as_deref()
    }

    /// Free-form label handed to the scanner: the name, else the module
    pub fn label(&self) -> &str {
        match (&self.name, self.is_runtime_only) {
            (Some(name), _) => name,
            (None, true) => HOST_RUNTIME_LABEL,
            (None, false) => &self.module,
        }
    }

    /// Name lowercased with every non-alphanumeric run replaced by `-`
    pub fn name_slug(&self) -> Option<String> {
        let name = self.name.as_deref()?;
        let mut slug = String::with_capacity(name.len());
        for c in name.chars() {
            if c.is_ascii_alphanumeric() {
                slug.push(c.to_ascii_lowercase());
            } else if !slug.ends_with('-') {
                slug.push('-');
            }
        }
        Some(slug.trim_matches('-').to_string())
    }

    /// Key grouping directives in the summary report
    pub fn group_key(&self) -> String {
        match (&self.name, self.is_runtime_only) {
            (Some(name), _) => name.clone(),
            (None, true) => HOST_RUNTIME_LABEL.to_string(),
            (None, false) => self.module_id().to_string(),
        }
    }

    /// Stable task name for this directive checked against `artifact`
    ///
    /// Names over [`MAX_TASK_NAME_LEN`] bytes are cut short and end in a
    /// hash of the full name, so distinct long names stay distinct.
    pub fn task_name(&self, artifact: Option<&Artifact>) -> String {
        let mut name = String::from("verify-Assert");
        name.push_str(if self.assert_pass { "Pass" } else { "Fail" });
        match artifact {
            Some(artifact) => {
                name.push_str(&format!(
                    "-{}-{}-{}",
                    artifact.group, artifact.module, artifact.version
                ));
                if let Some(classifier) = &artifact.classifier {
                    name.push_str(&format!("-{}", classifier));
                }
            }
            None => {
                name.push('-');
                name.push_str(HOST_RUNTIME_LABEL);
            }
        }
        if let Some(slug) = self.name_slug() {
            name.push('-');
            name.push_str(&slug);
        }
        bound_task_name(name)
    }

    /// Derive a directive checking `range` with the opposite expectation
    pub fn inverse_with_range(&self, range: impl Into<String>) -> Directive {
        Directive {
            version_range: range.into(),
            assert_pass: !self.assert_pass,
            assert_inverse: false,
            runtime_version_constraint: None,
            ..self.clone()
        }
    }
}

fn bound_task_name(name: String) -> String {
    if name.len() <= MAX_TASK_NAME_LEN {
        return name;
    }
    let hash: String = Sha256::digest(name.as_bytes())
        .iter()
        .take(8)
        .map(|b| format!("{:02x}", b))
        .collect();
    let mut end = MAX_TASK_NAME_LEN - hash.len() - 1;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}-{}", &name[..end], hash)
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.assert_pass { "pass" } else { "fail" };
        if self.is_runtime_only {
            write!(f, "{} {{{}}}", kind, HOST_RUNTIME_LABEL)?;
        } else {
            write!(
                f,
                "{} {{{}:{}:{}}}",
                kind, self.group, self.module, self.version_range
            )?;
        }
        if let Some(name) = &self.name {
            write!(f, " ({})", name)?;
        }
        Ok(())
    }
}

/// Builder for [`Directive`]
#[derive(Debug, Clone, Default)]
pub struct DirectiveBuilder {
    name: Option<String>,
    group: Option<String>,
    module: Option<String>,
    classifier: Option<String>,
    version_range: Option<String>,
    skip_versions: BTreeSet<String>,
    additional_dependencies: Vec<String>,
    excluded_dependencies: Vec<String>,
    additional_repositories: Vec<String>,
    assert_pass: bool,
    assert_inverse: bool,
    is_runtime_only: bool,
    include_snapshots: bool,
    runtime_version_constraint: Option<String>,
}

impl DirectiveBuilder {
    pub fn new(assert_pass: bool) -> Self {
        Self {
            assert_pass,
            ..Default::default()
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    pub fn classifier(mut self, classifier: impl Into<String>) -> Self {
        self.classifier = Some(classifier.into());
        self
    }

    pub fn versions(mut self, range: impl Into<String>) -> Self {
        self.version_range = Some(range.into());
        self
    }

    pub fn skip_version(mut self, version: impl AsRef<str>) -> Self {
        self.skip_versions.insert(version.as_ref().to_lowercase());
        self
    }

    pub fn extra_dependency(mut self, coordinate: impl Into<String>) -> Self {
        self.additional_dependencies.push(coordinate.into());
        self
    }

    pub fn exclude_dependency(mut self, module_id: impl Into<String>) -> Self {
        self.excluded_dependencies.push(module_id.into());
        self
    }

    pub fn extra_repository(mut self, url: impl Into<String>) -> Self {
        self.additional_repositories.push(url.into());
        self
    }

    pub fn assert_inverse(mut self, assert_inverse: bool) -> Self {
        self.assert_inverse = assert_inverse;
        self
    }

    /// Check against the host runtime instead of a resolved artifact
    pub fn runtime_only(mut self) -> Self {
        self.is_runtime_only = true;
        self
    }

    pub fn include_snapshots(mut self, include_snapshots: bool) -> Self {
        self.include_snapshots = include_snapshots;
        self
    }

    pub fn runtime_version(mut self, constraint: impl Into<String>) -> Self {
        self.runtime_version_constraint = Some(constraint.into());
        self
    }

    pub fn build(self) -> Result<Directive, DirectiveError> {
        let non_empty = |value: Option<String>| value.filter(|v| !v.trim().is_empty());
        let group = non_empty(self.group);
        let module = non_empty(self.module);
        let version_range = non_empty(self.version_range);

        if self.is_runtime_only {
            if self.assert_inverse {
                return Err(DirectiveError::RuntimeOnlyInverse);
            }
            if group.is_some() || module.is_some() || version_range.is_some() {
                return Err(DirectiveError::RuntimeOnlyWithArtifact);
            }
        }

        let (group, module, version_range) = if self.is_runtime_only {
            (String::new(), String::new(), String::new())
        } else {
            let group = group.ok_or(DirectiveError::MissingField("group"))?;
            let module = module.ok_or(DirectiveError::MissingField("module"))?;
            let range = version_range.ok_or(DirectiveError::MissingField("versions"))?;
            VersionRange::parse(&range)?;
            (group, module, range)
        };

        let additional_dependencies = self
            .additional_dependencies
            .iter()
            .map(|c| c.parse::<Artifact>())
            .collect::<Result<Vec<_>, _>>()?;
        let excluded_dependencies = self
            .excluded_dependencies
            .iter()
            .map(|c| c.parse::<ModuleId>())
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Directive {
            name: non_empty(self.name),
            group,
            module,
            classifier: non_empty(self.classifier),
            version_range,
            skip_versions: self.skip_versions,
            additional_dependencies,
            excluded_dependencies,
            additional_repositories: self.additional_repositories,
            assert_pass: self.assert_pass,
            assert_inverse: self.assert_inverse,
            is_runtime_only: self.is_runtime_only,
            include_snapshots: self.include_snapshots,
            runtime_version_constraint: non_empty(self.runtime_version_constraint),
        })
    }
}

/// One unit of verification work: a directive checked against zero or one artifact
///
/// `artifact` is `None` exactly when the directive is runtime-only.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskPlan {
    pub directive: Directive,
    pub artifact: Option<Artifact>,
}

impl TaskPlan {
    pub fn new(directive: Directive, artifact: Option<Artifact>) -> Self {
        Self {
            directive,
            artifact,
        }
    }

    pub fn task_name(&self) -> String {
        self.directive.task_name(self.artifact.as_ref())
    }
}

impl fmt::Display for TaskPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.artifact {
            Some(artifact) => write!(f, "{} @ {}", self.directive, artifact),
            None => write!(f, "{}", self.directive),
        }
    }
}
