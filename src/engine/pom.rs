//! Maven POM reading for transitive classpath resolution
//!
//! Only what dependency walking needs is extracted: coordinates, packaging,
//! parent, properties, managed versions and direct dependencies with their
//! exclusions. Profiles, build plugins and reporting are ignored.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::directive::{Artifact, ModuleId};

static COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid regex"));

static PROPERTY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<([A-Za-z0-9_.\-]+)>\s*([^<]*?)\s*</([A-Za-z0-9_.\-]+)>").expect("valid regex")
});

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("valid regex"));

/// Sections whose nested `<dependencies>` or coordinates are not the project's own
const FOREIGN_SECTIONS: &[&str] = &[
    "profiles",
    "build",
    "reporting",
    "distributionManagement",
    "pluginRepositories",
];

/// One `<dependency>` entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PomDependency {
    pub group: String,
    pub module: String,
    pub version: Option<String>,
    pub scope: Option<String>,
    pub classifier: Option<String>,
    pub kind: Option<String>,
    pub optional: bool,
    pub exclusions: Vec<ModuleId>,
}

impl PomDependency {
    pub fn module_id(&self) -> ModuleId {
        ModuleId::new(&self.group, &self.module)
    }

    /// Compile and runtime scoped, non-optional jar dependencies reach the classpath
    pub fn is_runtime_jar(&self) -> bool {
        let scoped = matches!(self.scope.as_deref(), None | Some("compile") | Some("runtime"));
        let jar = matches!(self.kind.as_deref(), None | Some("jar") | Some("bundle"));
        scoped && jar && !self.optional
    }

    /// A managed `pom`-typed entry in `import` scope
    pub fn is_bom_import(&self) -> bool {
        self.scope.as_deref() == Some("import") && self.kind.as_deref() == Some("pom")
    }

    fn interpolate(&mut self, properties: &HashMap<String, String>) {
        self.group = interpolate(&self.group, properties);
        self.module = interpolate(&self.module, properties);
        self.version = self.version.as_deref().map(|v| interpolate(v, properties));
        self.scope = self.scope.as_deref().map(|v| interpolate(v, properties));
        self.classifier = self.classifier.as_deref().map(|v| interpolate(v, properties));
    }
}

/// A single POM file as written, before inheritance
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pom {
    pub group: Option<String>,
    pub module: Option<String>,
    pub version: Option<String>,
    pub packaging: Option<String>,
    pub parent: Option<Artifact>,
    pub properties: HashMap<String, String>,
    pub managed: Vec<PomDependency>,
    pub dependencies: Vec<PomDependency>,
}

impl Pom {
    pub fn parse(xml: &str) -> Self {
        let mut xml = COMMENT.replace_all(xml, "").into_owned();
        for section in FOREIGN_SECTIONS {
            xml = remove_blocks(&xml, section);
        }

        let parent = block(&xml, "parent").and_then(|parent| {
            Some(Artifact::new(
                text(parent, "groupId")?,
                text(parent, "artifactId")?,
                text(parent, "version")?,
            ))
        });
        let properties = block(&xml, "properties")
            .map(parse_properties)
            .unwrap_or_default();
        let managed = block(&xml, "dependencyManagement")
            .and_then(|section| block(section, "dependencies"))
            .map(parse_dependencies)
            .unwrap_or_default();

        let mut own = xml;
        for section in ["parent", "properties", "dependencyManagement"] {
            own = remove_blocks(&own, section);
        }
        let dependencies = block(&own, "dependencies")
            .map(parse_dependencies)
            .unwrap_or_default();
        let own = remove_blocks(&own, "dependencies");

        Self {
            group: text(&own, "groupId"),
            module: text(&own, "artifactId"),
            version: text(&own, "version"),
            packaging: text(&own, "packaging"),
            parent,
            properties,
            managed,
            dependencies,
        }
    }
}

/// A POM with its parent chain folded in and placeholders substituted
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EffectivePom {
    pub packaging: String,
    pub properties: HashMap<String, String>,
    /// Managed versions, nearest declaration first
    pub managed: HashMap<ModuleId, String>,
    /// Imported BOMs still to be merged into `managed`
    pub imports: Vec<Artifact>,
    pub dependencies: Vec<PomDependency>,
}

impl EffectivePom {
    /// Fold `chain` (the project first, then its parent, grandparent, ...)
    pub fn from_chain(chain: &[Pom]) -> Self {
        let mut properties = HashMap::new();
        for pom in chain.iter().rev() {
            properties.extend(pom.properties.clone());
        }

        let project = chain.first();
        let group = chain.iter().find_map(|pom| {
            pom.group
                .clone()
                .or_else(|| pom.parent.as_ref().map(|a| a.group.clone()))
        });
        let version = chain.iter().find_map(|pom| {
            pom.version
                .clone()
                .or_else(|| pom.parent.as_ref().map(|a| a.version.clone()))
        });
        let module = project.and_then(|p| p.module.clone());

        let mut builtins = Vec::new();
        if let Some(group) = &group {
            builtins.extend(["project.groupId", "pom.groupId", "groupId"].map(|k| (k, group.clone())));
        }
        if let Some(version) = &version {
            builtins.extend(["project.version", "pom.version", "version"].map(|k| (k, version.clone())));
        }
        if let Some(module) = &module {
            builtins.extend(["project.artifactId", "pom.artifactId", "artifactId"].map(|k| (k, module.clone())));
        }
        if let Some(parent_version) = project.and_then(|p| p.parent.as_ref()).map(|a| a.version.clone())
        {
            builtins.push(("project.parent.version", parent_version));
        }
        for (key, value) in builtins {
            properties.insert(key.to_string(), value);
        }

        let mut managed = HashMap::new();
        let mut imports = Vec::new();
        for pom in chain {
            for entry in &pom.managed {
                let mut entry = entry.clone();
                entry.interpolate(&properties);
                let Some(version) = entry.version.clone() else {
                    continue;
                };
                if entry.is_bom_import() {
                    imports.push(Artifact::new(&entry.group, &entry.module, version));
                    continue;
                }
                managed.entry(entry.module_id()).or_insert(version);
            }
        }

        let mut dependencies = Vec::new();
        for pom in chain {
            for dependency in &pom.dependencies {
                let mut dependency = dependency.clone();
                dependency.interpolate(&properties);
                if !dependencies
                    .iter()
                    .any(|d: &PomDependency| d.module_id() == dependency.module_id())
                {
                    dependencies.push(dependency);
                }
            }
        }

        let packaging = project
            .and_then(|p| p.packaging.as_deref())
            .map(|p| interpolate(p, &properties))
            .unwrap_or_else(|| "jar".to_string());

        Self {
            packaging,
            properties,
            managed,
            imports,
            dependencies,
        }
    }

    /// Add managed versions from an imported BOM without overriding our own
    pub fn import(&mut self, bom: &EffectivePom) {
        for (module, version) in &bom.managed {
            self.managed
                .entry(module.clone())
                .or_insert_with(|| version.clone());
        }
    }

    /// Version for `dependency`, falling back to the managed one
    pub fn version_of(&self, dependency: &PomDependency) -> Option<String> {
        dependency
            .version
            .clone()
            .or_else(|| self.managed.get(&dependency.module_id()).cloned())
            .filter(|v| is_concrete(v))
    }
}

/// Plain versions only; ranges and unresolved placeholders are not walked
pub fn is_concrete(version: &str) -> bool {
    !version.is_empty() && !version.starts_with(['[', '(']) && !version.contains("${")
}

/// Whether `module` matches an exclusion, `*` matching anything
pub fn is_excluded(module: &ModuleId, exclusions: &[ModuleId]) -> bool {
    exclusions.iter().any(|exclusion| {
        (exclusion.group == "*" || exclusion.group == module.group)
            && (exclusion.module == "*" || exclusion.module == module.module)
    })
}

fn interpolate(value: &str, properties: &HashMap<String, String>) -> String {
    let mut current = value.to_string();
    for _ in 0..8 {
        if !current.contains("${") {
            break;
        }
        let next = PLACEHOLDER
            .replace_all(&current, |caps: &regex::Captures<'_>| {
                properties
                    .get(&caps[1])
                    .cloned()
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned();
        if next == current {
            break;
        }
        current = next;
    }
    current
}

/// Content of the first `<tag>...</tag>`
fn block<'a>(xml: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = xml.find(&open)? + open.len();
    let end = start + xml[start..].find(&close)?;
    Some(&xml[start..end])
}

/// Every `<tag>...</tag>` content, in order
fn blocks<'a>(xml: &'a str, tag: &str) -> Vec<&'a str> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let mut found = Vec::new();
    let mut rest = xml;
    while let Some(start) = rest.find(&open) {
        let body = &rest[start + open.len()..];
        let Some(end) = body.find(&close) else {
            break;
        };
        found.push(&body[..end]);
        rest = &body[end + close.len()..];
    }
    found
}

fn remove_blocks(xml: &str, tag: &str) -> String {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let mut kept = String::with_capacity(xml.len());
    let mut rest = xml;
    while let Some(start) = rest.find(&open) {
        kept.push_str(&rest[..start]);
        match rest[start..].find(&close) {
            Some(end) => rest = &rest[start + end + close.len()..],
            None => {
                rest = "";
            }
        }
    }
    kept.push_str(rest);
    kept
}

fn text(xml: &str, tag: &str) -> Option<String> {
    block(xml, tag)
        .map(str::trim)
        .filter(|value| !value.is_empty() && !value.contains('<'))
        .map(str::to_string)
}

fn parse_properties(section: &str) -> HashMap<String, String> {
    PROPERTY
        .captures_iter(section)
        .filter(|caps| caps[1] == caps[3])
        .map(|caps| (caps[1].to_string(), caps[2].to_string()))
        .collect()
}

fn parse_dependencies(section: &str) -> Vec<PomDependency> {
    blocks(section, "dependency")
        .into_iter()
        .filter_map(|entry| {
            let exclusions = block(entry, "exclusions")
                .map(|list| {
                    blocks(list, "exclusion")
                        .into_iter()
                        .filter_map(|e| Some(ModuleId::new(text(e, "groupId")?, text(e, "artifactId")?)))
                        .collect()
                })
                .unwrap_or_default();
            let entry = remove_blocks(entry, "exclusions");
            Some(PomDependency {
                group: text(&entry, "groupId")?,
                module: text(&entry, "artifactId")?,
                version: text(&entry, "version"),
                scope: text(&entry, "scope"),
                classifier: text(&entry, "classifier"),
                kind: text(&entry, "type"),
                optional: text(&entry, "optional").is_some_and(|o| o == "true"),
                exclusions,
            })
        })
        .collect()
}
