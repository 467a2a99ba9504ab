use serde::Deserialize;
use std::path::{Path, PathBuf};

// =============================================================================
// Version selection constants
// =============================================================================

/// Sampled ranges are kept strictly below this many versions
pub const MAX_VERSIONS_PER_RANGE: usize = 25;

// =============================================================================
// Time-related constants
// =============================================================================

/// Default cache refresh interval in milliseconds (24 hours)
pub const DEFAULT_REFRESH_INTERVAL_MS: i64 = 24 * 60 * 60 * 1000;

/// Timeout for registry requests in milliseconds (30 seconds)
pub const FETCH_TIMEOUT_MS: u64 = 30_000;

/// Timeout for one scanner invocation in milliseconds (10 minutes)
pub const SCAN_TIMEOUT_MS: u64 = 10 * 60 * 1000;

// =============================================================================
// Execution constants
// =============================================================================

/// Upper bound on concurrently running scanner processes
pub const MAX_CONCURRENT_SCANS: usize = 4;

/// Default Maven repository
pub const DEFAULT_REPOSITORY_URL: &str = "https://repo1.maven.org/maven2";

/// Environment variable overriding the default repository
pub const REPOSITORY_PROXY_ENV: &str = "MAVEN_REPOSITORY_PROXY";

/// Engine configuration structure
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    pub registry: RegistryConfig,
    pub cache: CacheConfig,
    pub execution: ExecutionConfig,
    pub report: ReportConfig,
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Json(#[from] serde_json::Error),
}

/// Artifact registry configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct RegistryConfig {
    /// Primary repository; `MAVEN_REPOSITORY_PROXY` wins when set
    pub url: Option<String>,
    /// Repositories consulted for every directive
    pub additional_repositories: Vec<String>,
    /// Request timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            url: None,
            additional_repositories: Vec::new(),
            timeout_ms: FETCH_TIMEOUT_MS,
        }
    }
}

impl RegistryConfig {
    /// Primary repository URL after applying the environment override
    pub fn repository_url(&self) -> String {
        repository_url_with_env(std::env::var(REPOSITORY_PROXY_ENV).ok(), self.url.as_deref())
    }
}

fn repository_url_with_env(proxy: Option<String>, configured: Option<&str>) -> String {
    proxy
        .filter(|p| !p.trim().is_empty())
        .or_else(|| configured.map(str::to_string))
        .unwrap_or_else(|| DEFAULT_REPOSITORY_URL.to_string())
        .trim_end_matches('/')
        .to_string()
}

/// Version cache configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheConfig {
    pub enabled: bool,
    /// Cache refresh interval in milliseconds
    pub refresh_interval: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            refresh_interval: DEFAULT_REFRESH_INTERVAL_MS,
        }
    }
}

/// Scanner execution configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ExecutionConfig {
    /// Scanner command line; the first element is the executable
    pub scanner_command: Vec<String>,
    /// Host-runtime support classpath entries
    pub host_runtime: Vec<PathBuf>,
    /// Tooling classpath entries
    pub tooling: Vec<PathBuf>,
    /// Instrumentation-under-test classpath entries
    pub instrumentation: Vec<PathBuf>,
    /// Concurrent scanner processes; derived from available parallelism when unset
    pub max_concurrency: Option<usize>,
    /// Scanner timeout in milliseconds
    pub scan_timeout_ms: u64,
    /// Stop scheduling new plans after this many failures
    pub max_failures: Option<usize>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            scanner_command: Vec::new(),
            host_runtime: Vec::new(),
            tooling: Vec::new(),
            instrumentation: Vec::new(),
            max_concurrency: None,
            scan_timeout_ms: SCAN_TIMEOUT_MS,
            max_failures: None,
        }
    }
}

impl ExecutionConfig {
    pub fn concurrency(&self) -> usize {
        concurrency_with(
            self.max_concurrency,
            std::thread::available_parallelism().map(|n| n.get()).ok(),
        )
    }
}

fn concurrency_with(configured: Option<usize>, available: Option<usize>) -> usize {
    configured
        .unwrap_or_else(|| available.unwrap_or(1).min(MAX_CONCURRENT_SCANS))
        .max(1)
}

/// Report output configuration
#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct ReportConfig {
    /// Output directory; defaults to `<data_dir>/reports`
    pub output_dir: Option<PathBuf>,
}

impl ReportConfig {
    pub fn output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| data_dir().join("reports"))
    }
}

/// Returns the path to the data directory for compat-verify.
/// Uses $XDG_DATA_HOME/compat-verify if XDG_DATA_HOME is set,
/// otherwise falls back to ~/.local/share/compat-verify,
/// or ./compat-verify if neither is available.
pub fn data_dir() -> PathBuf {
    data_dir_with_env(std::env::var("XDG_DATA_HOME").ok(), dirs::home_dir())
}

/// Returns the path to the version cache database.
pub fn db_path() -> PathBuf {
    data_dir().join("versions.db")
}

/// Returns the path to the log file.
pub fn log_path() -> PathBuf {
    data_dir().join("compat-verify.log")
}

/// Returns the local directory downloaded artifacts are stored in.
pub fn artifact_dir() -> PathBuf {
    data_dir().join("artifacts")
}

fn data_dir_with_env(xdg_data_home: Option<String>, home_dir: Option<PathBuf>) -> PathBuf {
    let data_dir = xdg_data_home
        .map(PathBuf::from)
        .or_else(|| home_dir.map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));

    data_dir.join("compat-verify")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;
    use serial_test::serial;

    #[test]
    fn engine_config_from_partial_object_uses_defaults_for_missing_fields() {
        let result = serde_json::from_value::<EngineConfig>(json!({
            "cache": {
                "refreshInterval": 1000
            }
        }))
        .unwrap();

        assert_eq!(result.cache.refresh_interval, 1000);
        assert!(result.cache.enabled);
        assert_eq!(result.registry, RegistryConfig::default());
        assert_eq!(result.execution, ExecutionConfig::default());
    }

    #[test]
    fn engine_config_from_full_object_parses_all_fields() {
        let result = serde_json::from_value::<EngineConfig>(json!({
            "registry": {
                "url": "https://repo.example.com/maven2",
                "additionalRepositories": ["https://mirror.example.com"],
                "timeoutMs": 500
            },
            "cache": { "enabled": false, "refreshInterval": 5000 },
            "execution": {
                "scannerCommand": ["java", "-jar", "scanner.jar"],
                "hostRuntime": ["/lib/bootstrap.jar"],
                "tooling": ["/lib/tooling.jar"],
                "instrumentation": ["/lib/netty.jar"],
                "maxConcurrency": 2,
                "scanTimeoutMs": 1000,
                "maxFailures": 3
            },
            "report": { "outputDir": "/tmp/reports" }
        }))
        .unwrap();

        assert_eq!(
            result,
            EngineConfig {
                registry: RegistryConfig {
                    url: Some("https://repo.example.com/maven2".to_string()),
                    additional_repositories: vec!["https://mirror.example.com".to_string()],
                    timeout_ms: 500,
                },
                cache: CacheConfig {
                    enabled: false,
                    refresh_interval: 5000
                },
                execution: ExecutionConfig {
                    scanner_command: vec![
                        "java".to_string(),
                        "-jar".to_string(),
                        "scanner.jar".to_string()
                    ],
                    host_runtime: vec![PathBuf::from("/lib/bootstrap.jar")],
                    tooling: vec![PathBuf::from("/lib/tooling.jar")],
                    instrumentation: vec![PathBuf::from("/lib/netty.jar")],
                    max_concurrency: Some(2),
                    scan_timeout_ms: 1000,
                    max_failures: Some(3),
                },
                report: ReportConfig {
                    output_dir: Some(PathBuf::from("/tmp/reports"))
                },
            }
        );
    }

    #[rstest]
    #[case(Some("https://proxy.example.com/"), Some("https://configured"), "https://proxy.example.com")]
    #[case(Some("  "), Some("https://configured/"), "https://configured")]
    #[case(None, None, DEFAULT_REPOSITORY_URL)]
    fn repository_url_prefers_proxy_then_configured(
        #[case] proxy: Option<&str>,
        #[case] configured: Option<&str>,
        #[case] expected: &str,
    ) {
        assert_eq!(
            repository_url_with_env(proxy.map(str::to_string), configured),
            expected
        );
    }

    #[test]
    #[serial]
    fn repository_url_reads_proxy_from_environment() {
        let config = RegistryConfig {
            url: Some("https://configured.example.com".to_string()),
            ..RegistryConfig::default()
        };

        unsafe { std::env::set_var(REPOSITORY_PROXY_ENV, "https://proxy.example.com/") };
        let proxied = config.repository_url();
        unsafe { std::env::remove_var(REPOSITORY_PROXY_ENV) };
        let direct = config.repository_url();

        assert_eq!(proxied, "https://proxy.example.com");
        assert_eq!(direct, "https://configured.example.com");
    }

    #[rstest]
    #[case(Some(8), Some(16), 8)]
    #[case(None, Some(16), MAX_CONCURRENT_SCANS)]
    #[case(None, Some(2), 2)]
    #[case(None, None, 1)]
    #[case(Some(0), Some(4), 1)]
    fn concurrency_is_capped_and_positive(
        #[case] configured: Option<usize>,
        #[case] available: Option<usize>,
        #[case] expected: usize,
    ) {
        assert_eq!(concurrency_with(configured, available), expected);
    }

    #[test]
    fn data_dir_with_env_uses_xdg_data_home_when_set() {
        let path = data_dir_with_env(
            Some("/tmp/test-data".to_string()),
            Some(PathBuf::from("/home/user")),
        );

        assert_eq!(path, PathBuf::from("/tmp/test-data/compat-verify"));
    }

    #[test]
    fn data_dir_with_env_falls_back_to_home_local_share() {
        let path = data_dir_with_env(None, Some(PathBuf::from("/home/user")));

        assert_eq!(path, PathBuf::from("/home/user/.local/share/compat-verify"));
    }

    #[test]
    fn data_dir_with_env_falls_back_to_current_dir_when_no_dirs_available() {
        let path = data_dir_with_env(None, None);
        assert_eq!(path, PathBuf::from("./compat-verify"));
    }
}
