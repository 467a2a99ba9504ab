//! Maven repository layout implementation

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, warn};

use crate::config::RegistryConfig;
use crate::directive::ModuleId;
use crate::version::error::RegistryError;
use crate::version::registry::Registry;
use crate::version::semver::ResolvedVersion;
use crate::version::types::PackageVersions;

static VERSIONS_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<versions>(.*?)</versions>").expect("valid regex"));

static VERSION_ELEMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<version>\s*([^<\s]+)\s*</version>").expect("valid regex"));

/// Registry implementation reading `maven-metadata.xml` from Maven-layout repositories
pub struct MavenRegistry {
    client: reqwest::Client,
    repositories: Vec<String>,
    timeout_ms: u64,
}

impl MavenRegistry {
    /// Creates a new MavenRegistry over the given repositories, tried in order
    pub fn new(repositories: Vec<String>, timeout_ms: u64) -> Result<Self, RegistryError> {
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
            timeout_ms,
        })
    }

    /// Creates a registry from configuration (proxy override + additional repositories)
    pub fn from_config(config: &RegistryConfig) -> Result<Self, RegistryError> {
        let mut repositories = vec![config.repository_url()];
        repositories.extend(config.additional_repositories.iter().cloned());
        Self::new(repositories, config.timeout_ms)
    }

    /// `group.id` -> `group/id`
    pub fn module_path(module: &ModuleId) -> String {
        format!("{}/{}", module.group.replace('.', "/"), module.module)
    }

    async fn fetch_from(
        &self,
        repository: &str,
        module: &ModuleId,
    ) -> Result<Vec<String>, RegistryError> {
        let url = format!(
            "{}/{}/maven-metadata.xml",
            repository.trim_end_matches('/'),
            Self::module_path(module)
        );
        debug!("Fetching {}", url);

        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                RegistryError::Timeout(self.timeout_ms)
            } else {
                RegistryError::Network(e)
            }
        })?;

        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(RegistryError::NotFound(module.to_string()));
        }

        if !status.is_success() {
            warn!("Maven repository returned status {}: {}", status, url);
            return Err(RegistryError::InvalidResponse(format!(
                "Unexpected status: {}",
                status
            )));
        }

        let body = response.text().await.map_err(|e| {
            warn!("Failed to read Maven metadata: {}", e);
            RegistryError::InvalidResponse(e.to_string())
        })?;

        Ok(parse_metadata_versions(&body))
    }
}

/// Extract the `<versions>` list of a `maven-metadata.xml` document
pub fn parse_metadata_versions(xml: &str) -> Vec<String> {
    let Some(block) = VERSIONS_BLOCK.captures(xml).and_then(|c| c.get(1)) else {
        return Vec::new();
    };
    VERSION_ELEMENT
        .captures_iter(block.as_str())
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

#[async_trait::async_trait]
impl Registry for MavenRegistry {
    async fn fetch_all_versions(
        &self,
        module: &ModuleId,
        extra_repositories: &[String],
    ) -> Result<PackageVersions, RegistryError> {
        let mut found: Vec<ResolvedVersion> = Vec::new();
        let mut any_success = false;
        let mut first_error: Option<RegistryError> = None;

        let repositories = self.repositories.iter().chain(extra_repositories.iter());
        for repository in repositories {
            match self.fetch_from(repository, module).await {
                Ok(versions) => {
                    any_success = true;
                    found.extend(versions.iter().map(|v| ResolvedVersion::parse(v)));
                }
                Err(RegistryError::NotFound(_)) => {
                    debug!("{} not found in {}", module, repository);
                }
                Err(e) => {
                    warn!("Failed to fetch {} from {}: {}", module, repository, e);
                    first_error.get_or_insert(e);
                }
            }
        }

        if !any_success {
            return Err(first_error.unwrap_or_else(|| RegistryError::NotFound(module.to_string())));
        }

        // Sort versions (lowest first, highest last) and drop repeats across repositories
        found.sort();
        found.dedup_by(|a, b| a.as_str() == b.as_str());

        Ok(PackageVersions::new(
            found.into_iter().map(|v| v.as_str().to_string()).collect(),
        ))
    }
}
