//! JSON directive declarations
//!
//! ```json
//! {
//!   "subject": "netty-4.1",
//!   "directives": [
//!     { "group": "io.netty", "module": "netty-codec-http", "versions": "[4.1.0,)", "assertInverse": true },
//!     { "name": "jdk", "runtimeOnly": true }
//!   ]
//! }
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::directive::error::DirectiveError;
use crate::directive::types::{Directive, DirectiveBuilder};

/// One directive as written in the declaration file
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct DirectiveDecl {
    pub name: Option<String>,
    pub group: Option<String>,
    pub module: Option<String>,
    pub classifier: Option<String>,
    pub versions: Option<String>,
    pub skip_versions: Vec<String>,
    pub additional_dependencies: Vec<String>,
    pub excluded_dependencies: Vec<String>,
    pub additional_repositories: Vec<String>,
    pub assert_pass: bool,
    pub assert_inverse: bool,
    pub runtime_only: bool,
    pub include_snapshots: bool,
    pub runtime_version: Option<String>,
}

impl Default for DirectiveDecl {
    fn default() -> Self {
        Self {
            name: None,
            group: None,
            module: None,
            classifier: None,
            versions: None,
            skip_versions: Vec::new(),
            additional_dependencies: Vec::new(),
            excluded_dependencies: Vec::new(),
            additional_repositories: Vec::new(),
            assert_pass: true,
            assert_inverse: false,
            runtime_only: false,
            include_snapshots: false,
            runtime_version: None,
        }
    }
}

impl DirectiveDecl {
    pub fn into_directive(self) -> Result<Directive, DirectiveError> {
        let mut builder = DirectiveBuilder::new(self.assert_pass)
            .assert_inverse(self.assert_inverse)
            .include_snapshots(self.include_snapshots);

        if let Some(name) = self.name {
            builder = builder.name(name);
        }
        if let Some(group) = self.group {
            builder = builder.group(group);
        }
        if let Some(module) = self.module {
            builder = builder.module(module);
        }
        if let Some(classifier) = self.classifier {
            builder = builder.classifier(classifier);
        }
        if let Some(versions) = self.versions {
            builder = builder.versions(versions);
        }
        if let Some(runtime_version) = self.runtime_version {
            builder = builder.runtime_version(runtime_version);
        }
        if self.runtime_only {
            builder = builder.runtime_only();
        }
        for version in self.skip_versions {
            builder = builder.skip_version(version);
        }
        for dependency in self.additional_dependencies {
            builder = builder.extra_dependency(dependency);
        }
        for excluded in self.excluded_dependencies {
            builder = builder.exclude_dependency(excluded);
        }
        for repository in self.additional_repositories {
            builder = builder.extra_repository(repository);
        }

        builder.build()
    }
}

/// A declaration file: the subject under test and its directives
#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct DirectiveFile {
    pub subject: String,
    pub directives: Vec<DirectiveDecl>,
}

impl DirectiveFile {
    pub fn from_json(json: &str) -> Result<Self, DirectiveError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self, DirectiveError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Validate every declaration, reporting the first invalid one by position
    pub fn into_directives(self) -> Result<Vec<Directive>, DirectiveError> {
        self.directives
            .into_iter()
            .enumerate()
            .map(|(index, decl)| {
                decl.into_directive().map_err(|e| DirectiveError::AtIndex {
                    index,
                    source: Box::new(e),
                })
            })
            .collect()
    }
}
