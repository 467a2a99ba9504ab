//! Materializing artifact coordinates as local files

use std::collections::{HashSet, VecDeque};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
#[cfg(test)]
use mockall::automock;
use tracing::{debug, info, warn};

use crate::config::RegistryConfig;
use crate::directive::{Artifact, ModuleId};
use crate::engine::error::BoundaryError;
use crate::engine::pom::{self, EffectivePom, Pom};

/// Parent and BOM import depth followed when reading POMs
const MAX_POM_DEPTH: usize = 10;

/// One file on a boundary's classpath
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClasspathEntry {
    /// Module the file belongs to, when known; exclusions match on it
    pub module: Option<ModuleId>,
    pub path: PathBuf,
}

impl ClasspathEntry {
    pub fn new(module: Option<ModuleId>, path: impl Into<PathBuf>) -> Self {
        Self {
            module,
            path: path.into(),
        }
    }
}

/// Turns coordinates into local classpath entries
///
/// Implementations may add transitive dependencies; those matching
/// `exclusions` (`*` matching any group or module) are not followed.
/// Every returned entry that belongs to a known module should say so.
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait ClasspathResolver: Send + Sync {
    async fn resolve(
        &self,
        artifacts: &[Artifact],
        exclusions: &[ModuleId],
        extra_repositories: &[String],
    ) -> Result<Vec<ClasspathEntry>, BoundaryError>;
}

/// Node of the dependency walk
struct Pending {
    artifact: Artifact,
    /// Exclusions declared along the path to this node
    exclusions: Vec<ModuleId>,
    requested: bool,
}

/// Downloads jars and their runtime dependencies from Maven-layout
/// repositories into a local directory
///
/// Dependencies are walked breadth first from the requested artifacts; the
/// nearest declaration of a module wins. Files already present locally are
/// reused without network access.
pub struct MavenClasspathResolver {
    client: reqwest::Client,
    repositories: Vec<String>,
    local_dir: PathBuf,
}

impl MavenClasspathResolver {
    pub fn new(
        repositories: Vec<String>,
        local_dir: impl Into<PathBuf>,
        timeout_ms: u64,
    ) -> Result<Self, BoundaryError> {
        let client = reqwest::Client::builder()
            .user_agent("compat-verify")
            .timeout(Duration::from_millis(timeout_ms))
            .build()?;
        Ok(Self {
            client,
            repositories: repositories
                .into_iter()
                .map(|r| r.trim_end_matches('/').to_string())
                .collect(),
            local_dir: local_dir.into(),
        })
    }

    pub fn from_config(
        config: &RegistryConfig,
        local_dir: impl Into<PathBuf>,
    ) -> Result<Self, BoundaryError> {
        let mut repositories = vec![config.repository_url()];
        repositories.extend(config.additional_repositories.iter().cloned());
        Self::new(repositories, local_dir, config.timeout_ms)
    }

    /// `{group/path}/{module}/{version}/{module}-{version}[-{classifier}].jar`
    pub fn relative_path(artifact: &Artifact) -> PathBuf {
        let mut file_name = format!("{}-{}", artifact.module, artifact.version);
        if let Some(classifier) = &artifact.classifier {
            file_name.push('-');
            file_name.push_str(classifier);
        }
        file_name.push_str(".jar");
        Self::module_dir(artifact).join(file_name)
    }

    /// `{group/path}/{module}/{version}/{module}-{version}.pom`
    pub fn pom_path(artifact: &Artifact) -> PathBuf {
        Self::module_dir(artifact).join(format!("{}-{}.pom", artifact.module, artifact.version))
    }

    fn module_dir(artifact: &Artifact) -> PathBuf {
        let mut path: PathBuf = artifact.group.split('.').collect();
        path.push(&artifact.module);
        path.push(&artifact.version);
        path
    }

    fn url_for(repository: &str, relative: &Path) -> String {
        let segments: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        format!("{}/{}", repository, segments.join("/"))
    }

    /// Local copy of `relative`, downloading it on first use
    ///
    /// `Ok(None)` when no repository has the file.
    async fn fetch(
        &self,
        artifact: &Artifact,
        relative: &Path,
        extra_repositories: &[String],
    ) -> Result<Option<PathBuf>, BoundaryError> {
        let target = self.local_dir.join(relative);
        if tokio::fs::try_exists(&target).await? {
            debug!("Reusing {}", target.display());
            return Ok(Some(target));
        }

        let repositories = self
            .repositories
            .iter()
            .map(String::as_str)
            .chain(extra_repositories.iter().map(|r| r.trim_end_matches('/')));

        for repository in repositories {
            let url = Self::url_for(repository, relative);
            debug!("Downloading {}", url);

            let response = match self.client.get(&url).send().await {
                Ok(response) => response,
                Err(e) => {
                    warn!("Failed to download {} from {}: {}", artifact, repository, e);
                    continue;
                }
            };
            if response.status() == reqwest::StatusCode::NOT_FOUND {
                continue;
            }
            if !response.status().is_success() {
                return Err(BoundaryError::Download {
                    artifact: artifact.clone(),
                    reason: format!("Unexpected status {} for {}", response.status(), url),
                });
            }

            let bytes = response.bytes().await?;
            let size = bytes.len();
            let stored = target.clone();
            tokio::task::spawn_blocking(move || store(&stored, &bytes))
                .await
                .map_err(std::io::Error::other)??;

            info!("Downloaded {} ({} bytes)", url, size);
            return Ok(Some(target));
        }

        Ok(None)
    }

    /// POM of `artifact` with its parents and imported BOMs folded in
    ///
    /// `None` when the POM is missing or unreadable; the artifact is then
    /// treated as having no dependencies.
    fn effective_pom<'a>(
        &'a self,
        artifact: &'a Artifact,
        extra_repositories: &'a [String],
        depth: usize,
    ) -> BoxFuture<'a, Option<EffectivePom>> {
        async move {
            let mut chain = Vec::new();
            let mut next = Some(artifact.clone());
            while let Some(current) = next.take() {
                if chain.len() >= MAX_POM_DEPTH {
                    warn!("Parent chain of {} is deeper than {}", artifact, MAX_POM_DEPTH);
                    break;
                }
                let Some(pom) = self.read_pom(&current, extra_repositories).await else {
                    break;
                };
                next = pom.parent.clone();
                chain.push(pom);
            }
            if chain.is_empty() {
                return None;
            }

            let mut effective = EffectivePom::from_chain(&chain);
            if depth < MAX_POM_DEPTH {
                for bom in effective.imports.clone() {
                    if let Some(imported) =
                        self.effective_pom(&bom, extra_repositories, depth + 1).await
                    {
                        effective.import(&imported);
                    }
                }
            }
            Some(effective)
        }
        .boxed()
    }

    async fn read_pom(&self, artifact: &Artifact, extra_repositories: &[String]) -> Option<Pom> {
        let path = match self
            .fetch(artifact, &Self::pom_path(artifact), extra_repositories)
            .await
        {
            Ok(Some(path)) => path,
            Ok(None) => {
                debug!("No POM for {}", artifact);
                return None;
            }
            Err(e) => {
                warn!("Failed to fetch POM of {}: {}", artifact, e);
                return None;
            }
        };
        match tokio::fs::read_to_string(&path).await {
            Ok(xml) => Some(Pom::parse(&xml)),
            Err(e) => {
                warn!("Failed to read {}: {}", path.display(), e);
                None
            }
        }
    }
}

/// Write `bytes` to `target` through a uniquely named sibling
///
/// Concurrent downloads of the same file each persist their own complete
/// copy; losing the race to a finished copy is not an error.
fn store(target: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let parent = target
        .parent()
        .ok_or_else(|| std::io::Error::other(format!("{} has no parent", target.display())))?;
    std::fs::create_dir_all(parent)?;
    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(bytes)?;
    match temp.persist(target) {
        Ok(_) => Ok(()),
        Err(_) if target.exists() => Ok(()),
        Err(e) => Err(e.error),
    }
}

#[async_trait::async_trait]
impl ClasspathResolver for MavenClasspathResolver {
    async fn resolve(
        &self,
        artifacts: &[Artifact],
        exclusions: &[ModuleId],
        extra_repositories: &[String],
    ) -> Result<Vec<ClasspathEntry>, BoundaryError> {
        let mut seen: HashSet<ModuleId> = artifacts.iter().map(Artifact::module_id).collect();
        let mut queue: VecDeque<Pending> = artifacts
            .iter()
            .map(|artifact| Pending {
                artifact: artifact.clone(),
                exclusions: Vec::new(),
                requested: true,
            })
            .collect();
        let mut entries = Vec::new();

        while let Some(node) = queue.pop_front() {
            let artifact = &node.artifact;
            let effective = self.effective_pom(artifact, extra_repositories, 0).await;

            let pom_only = effective.as_ref().is_some_and(|p| p.packaging == "pom");
            if node.requested || !pom_only {
                match self
                    .fetch(artifact, &Self::relative_path(artifact), extra_repositories)
                    .await?
                {
                    Some(path) => entries.push(ClasspathEntry::new(Some(artifact.module_id()), path)),
                    None if node.requested => {
                        return Err(BoundaryError::ArtifactNotFound(artifact.clone()));
                    }
                    None => warn!("Dependency {} has no jar in any repository", artifact),
                }
            }

            let Some(effective) = effective else {
                continue;
            };
            for dependency in effective.dependencies.iter().filter(|d| d.is_runtime_jar()) {
                let module = dependency.module_id();
                if seen.contains(&module)
                    || pom::is_excluded(&module, exclusions)
                    || pom::is_excluded(&module, &node.exclusions)
                {
                    continue;
                }
                let Some(version) = effective.version_of(dependency) else {
                    warn!("Skipping {} of {}: no concrete version", module, artifact);
                    continue;
                };
                seen.insert(module);

                let mut inherited = node.exclusions.clone();
                inherited.extend(dependency.exclusions.iter().cloned());
                queue.push_back(Pending {
                    artifact: Artifact::new(&dependency.group, &dependency.module, version)
                        .with_classifier(dependency.classifier.clone()),
                    exclusions: inherited,
                    requested: false,
                });
            }
        }

        debug!(
            "Resolved {} requested artifacts to {} classpath entries",
            artifacts.len(),
            entries.len()
        );
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Server, ServerGuard};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn pom(module: &str, dependencies: &str) -> String {
        format!(
            "<project><groupId>com.example</groupId><artifactId>{}</artifactId>\
             <version>1.0.0</version><dependencies>{}</dependencies></project>",
            module, dependencies
        )
    }

    fn dependency(module: &str, extra: &str) -> String {
        format!(
            "<dependency><groupId>com.example</groupId><artifactId>{}</artifactId>\
             <version>1.0.0</version>{}</dependency>",
            module, extra
        )
    }

    async fn publish(server: &mut ServerGuard, module: &str, pom: &str) {
        server
            .mock("GET", format!("/com/example/{0}/1.0.0/{0}-1.0.0.pom", module).as_str())
            .with_status(200)
            .with_body(pom)
            .create_async()
            .await;
        server
            .mock("GET", format!("/com/example/{0}/1.0.0/{0}-1.0.0.jar", module).as_str())
            .with_status(200)
            .with_body(format!("{}-jar", module))
            .create_async()
            .await;
    }

    fn modules(entries: &[ClasspathEntry]) -> Vec<String> {
        entries
            .iter()
            .map(|e| e.module.as_ref().map(|m| m.module.clone()).unwrap_or_default())
            .collect()
    }

    #[test]
    fn relative_path_follows_repository_layout() {
        let artifact = Artifact::new("io.netty", "netty-codec", "4.1.0.Final")
            .with_classifier(Some("linux-x86_64".to_string()));

        assert_eq!(
            MavenClasspathResolver::relative_path(&artifact),
            PathBuf::from("io/netty/netty-codec/4.1.0.Final/netty-codec-4.1.0.Final-linux-x86_64.jar")
        );
    }

    #[tokio::test]
    async fn resolve_downloads_missing_jar() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/com/example/demo/1.0.0/demo-1.0.0.jar")
            .with_status(200)
            .with_body("jar-bytes")
            .create_async()
            .await;
        let temp_dir = TempDir::new().unwrap();
        let resolver =
            MavenClasspathResolver::new(vec![server.url()], temp_dir.path(), 5_000).unwrap();

        let entries = resolver
            .resolve(&[Artifact::new("com.example", "demo", "1.0.0")], &[], &[])
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(
            entries[0].module,
            Some(ModuleId::new("com.example", "demo"))
        );
        assert_eq!(std::fs::read_to_string(&entries[0].path).unwrap(), "jar-bytes");
    }

    #[tokio::test]
    async fn resolve_reuses_local_files() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", mockito::Matcher::Any)
            .expect(0)
            .create_async()
            .await;
        let temp_dir = TempDir::new().unwrap();
        let artifact = Artifact::new("com.example", "demo", "1.0.0");
        let local = temp_dir
            .path()
            .join(MavenClasspathResolver::relative_path(&artifact));
        std::fs::create_dir_all(local.parent().unwrap()).unwrap();
        std::fs::write(&local, "cached").unwrap();
        std::fs::write(
            temp_dir.path().join(MavenClasspathResolver::pom_path(&artifact)),
            "<project><artifactId>demo</artifactId></project>",
        )
        .unwrap();
        let resolver =
            MavenClasspathResolver::new(vec![server.url()], temp_dir.path(), 5_000).unwrap();

        let entries = resolver.resolve(&[artifact], &[], &[]).await.unwrap();

        mock.assert_async().await;
        assert_eq!(entries[0].path, local);
    }

    #[tokio::test]
    async fn resolve_reports_artifact_missing_everywhere() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", mockito::Matcher::Any)
            .with_status(404)
            .create_async()
            .await;
        let temp_dir = TempDir::new().unwrap();
        let resolver =
            MavenClasspathResolver::new(vec![server.url()], temp_dir.path(), 5_000).unwrap();

        let result = resolver
            .resolve(&[Artifact::new("com.example", "gone", "1.0.0")], &[], &[])
            .await;

        assert!(matches!(result, Err(BoundaryError::ArtifactNotFound(_))));
    }

    #[tokio::test]
    async fn resolve_falls_back_to_extra_repositories() {
        let mut primary = Server::new_async().await;
        let mut extra = Server::new_async().await;
        primary
            .mock("GET", mockito::Matcher::Any)
            .with_status(404)
            .create_async()
            .await;
        extra
            .mock("GET", "/com/example/demo/2.0.0/demo-2.0.0.jar")
            .with_status(200)
            .with_body("from-extra")
            .create_async()
            .await;
        let temp_dir = TempDir::new().unwrap();
        let resolver =
            MavenClasspathResolver::new(vec![primary.url()], temp_dir.path(), 5_000).unwrap();

        let entries = resolver
            .resolve(&[Artifact::new("com.example", "demo", "2.0.0")], &[], &[extra.url()])
            .await
            .unwrap();

        assert_eq!(std::fs::read_to_string(&entries[0].path).unwrap(), "from-extra");
    }

    #[test]
    fn pom_path_ignores_classifier() {
        let artifact = Artifact::new("io.netty", "netty-codec", "4.1.0.Final")
            .with_classifier(Some("linux-x86_64".to_string()));

        assert_eq!(
            MavenClasspathResolver::pom_path(&artifact),
            PathBuf::from("io/netty/netty-codec/4.1.0.Final/netty-codec-4.1.0.Final.pom")
        );
    }

    #[tokio::test]
    async fn resolve_walks_runtime_dependencies_breadth_first() {
        let mut server = Server::new_async().await;
        let root_deps = [
            dependency("codec", ""),
            dependency("testing", "<scope>test</scope>"),
            dependency("extras", "<optional>true</optional>"),
            dependency("logging", "<scope>runtime</scope>"),
        ]
        .concat();
        publish(&mut server, "demo", &pom("demo", &root_deps)).await;
        publish(&mut server, "codec", &pom("codec", &dependency("buffer", ""))).await;
        publish(&mut server, "logging", &pom("logging", &dependency("codec", ""))).await;
        publish(&mut server, "buffer", &pom("buffer", "")).await;
        let temp_dir = TempDir::new().unwrap();
        let resolver =
            MavenClasspathResolver::new(vec![server.url()], temp_dir.path(), 5_000).unwrap();

        let entries = resolver
            .resolve(&[Artifact::new("com.example", "demo", "1.0.0")], &[], &[])
            .await
            .unwrap();

        assert_eq!(modules(&entries), vec!["demo", "codec", "logging", "buffer"]);
        assert_eq!(std::fs::read_to_string(&entries[3].path).unwrap(), "buffer-jar");
    }

    #[tokio::test]
    async fn resolve_applies_exclusions_during_walk() {
        let mut server = Server::new_async().await;
        let root_deps = [
            dependency(
                "codec",
                "<exclusions><exclusion><groupId>com.example</groupId>\
                 <artifactId>buffer</artifactId></exclusion></exclusions>",
            ),
            dependency("banned", ""),
        ]
        .concat();
        publish(&mut server, "demo", &pom("demo", &root_deps)).await;
        publish(&mut server, "codec", &pom("codec", &dependency("buffer", ""))).await;
        let untouched = server
            .mock("GET", mockito::Matcher::Regex("/(buffer|banned)/".to_string()))
            .expect(0)
            .create_async()
            .await;
        let temp_dir = TempDir::new().unwrap();
        let resolver =
            MavenClasspathResolver::new(vec![server.url()], temp_dir.path(), 5_000).unwrap();

        let entries = resolver
            .resolve(
                &[Artifact::new("com.example", "demo", "1.0.0")],
                &[ModuleId::new("com.example", "banned")],
                &[],
            )
            .await
            .unwrap();

        untouched.assert_async().await;
        assert_eq!(modules(&entries), vec!["demo", "codec"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn resolve_survives_concurrent_downloads_of_one_jar() {
        let mut server = Server::new_async().await;
        let body = vec![b'x'; 1 << 20];
        server
            .mock("GET", "/com/example/shared/1.0.0/shared-1.0.0.jar")
            .with_status(200)
            .with_body(&body)
            .expect_at_least(1)
            .create_async()
            .await;
        server
            .mock("GET", "/com/example/shared/1.0.0/shared-1.0.0.pom")
            .with_status(404)
            .create_async()
            .await;
        let temp_dir = TempDir::new().unwrap();
        let resolver = Arc::new(
            MavenClasspathResolver::new(vec![server.url()], temp_dir.path(), 5_000).unwrap(),
        );

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let resolver = Arc::clone(&resolver);
                tokio::spawn(async move {
                    resolver
                        .resolve(&[Artifact::new("com.example", "shared", "1.0.0")], &[], &[])
                        .await
                })
            })
            .collect();

        for task in tasks {
            let entries = task.await.unwrap().unwrap();
            assert_eq!(std::fs::read(&entries[0].path).unwrap().len(), body.len());
        }
        let leftovers: Vec<_> = std::fs::read_dir(temp_dir.path().join("com/example/shared/1.0.0"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("shared-1.0.0.jar")]);
    }

    #[test]
    fn store_tolerates_existing_target() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("nested/lib.jar");

        store(&target, b"first").unwrap();
        store(&target, b"second").unwrap();

        assert_eq!(std::fs::read_to_string(&target).unwrap(), "second");
    }
}
