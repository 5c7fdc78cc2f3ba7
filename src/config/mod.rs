//! Layered configuration: TOML file + environment overrides, resolved once
//! at startup into an immutable [`Configuration`] and handed to every
//! component by reference. No component consults a global/lazy-static
//! configuration singleton.

mod task_config;

pub use task_config::EffectiveTaskConfig;
pub use task_config::TaskConfigResolver;
pub use task_config::TaskDefaults;
pub use task_config::TaskOverrides;
pub use task_config::TaskSettings;

use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use getset::Getters;
use serde::Deserialize;

use crate::container::SupportedLanguage;
use crate::error::IndexerError;
use crate::error::Result;

/// Top-level, fully-resolved configuration for one process.
#[derive(Debug, Clone, Getters)]
pub struct Configuration {
    #[getset(get = "pub")]
    git: GitConfig,

    #[getset(get = "pub")]
    container: ContainerConfig,

    #[getset(get = "pub")]
    graph: GraphConfig,

    #[getset(get = "pub")]
    storage: StorageConfig,

    #[getset(get = "pub")]
    tasks: TaskDefaults,

    #[getset(get = "pub")]
    worker_pool: WorkerPoolConfig,

    #[getset(get = "pub")]
    database_url: String,
}

impl Configuration {
    /// Load the raw TOML document at `path`, overlay `CODEGRAPH_*`
    /// environment variables, and validate the result.
    pub fn load(path: &Path) -> Result<Self> {
        let raw: RawConfiguration = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(config::Environment::with_prefix("CODEGRAPH").separator("__"))
            .build()
            .map_err(|e| IndexerError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| IndexerError::Config(e.to_string()))?;

        raw.into_configuration()
    }

    /// Build a configuration from already-parsed parts, skipping file I/O.
    /// Used by tests and by `config check`.
    pub fn from_parts(
        git: GitConfig,
        container: ContainerConfig,
        graph: GraphConfig,
        storage: StorageConfig,
        tasks: TaskDefaults,
        worker_pool: WorkerPoolConfig,
        database_url: String,
    ) -> Result<Self> {
        let cfg = Configuration {
            git,
            container,
            graph,
            storage,
            tasks,
            worker_pool,
            database_url,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Validate cross-cutting invariants that cannot be expressed in the
    /// deserialize step alone (closed-enum language lookups, nonzero pool
    /// sizes, ...).
    pub fn validate(&self) -> Result<()> {
        if self.container.languages.is_empty() {
            return Err(IndexerError::Config(
                "no languages configured for the container parser driver".into(),
            ));
        }
        for lang in &self.container.languages {
            if lang.image.as_str().is_empty() {
                return Err(IndexerError::Config(format!(
                    "language {:?} has no image configured",
                    lang.language
                )));
            }
        }
        if self.graph.max_connections == 0 {
            return Err(IndexerError::Config(
                "graph.max_connections must be nonzero".into(),
            ));
        }
        if self.worker_pool.max_concurrent_jobs == 0 {
            return Err(IndexerError::Config(
                "worker_pool.max_concurrent_jobs must be nonzero".into(),
            ));
        }
        Ok(())
    }
}

/// Git client configuration (§4.3, §6 "Git transport").
#[derive(Debug, Clone, Getters, Deserialize)]
pub struct GitConfig {
    #[getset(get = "pub")]
    #[serde(default)]
    oauth_token: Option<String>,

    #[getset(get = "pub")]
    #[serde(default)]
    sparse_checkout_patterns: Vec<String>,

    #[getset(get = "pub", with_prefix = "get_")]
    #[serde(default = "default_git_timeout")]
    command_timeout: DurationSeconds,
}

impl GitConfig {
    /// Clones this configuration with a different OAuth token, for a
    /// single job whose codebase carries its own credential (§4.3
    /// "Authentication", [`crate::credentials::CredentialSource`]).
    pub fn with_oauth_token(&self, token: Option<String>) -> GitConfig {
        GitConfig {
            oauth_token: token,
            ..self.clone()
        }
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout.0)
    }
}

fn default_git_timeout() -> DurationSeconds {
    DurationSeconds(300)
}

/// One language's container-driver settings: image and runtime options.
#[derive(Debug, Clone, Deserialize)]
pub struct LanguageConfig {
    pub language: SupportedLanguage,
    pub image: crate::util::docker::ImageName,
    #[serde(default)]
    pub runtime_options: Vec<String>,
}

/// Container parser driver configuration (§4.5).
#[derive(Debug, Clone, Getters, Deserialize)]
pub struct ContainerConfig {
    #[getset(get = "pub")]
    #[serde(default)]
    languages: Vec<LanguageConfig>,

    #[getset(get = "pub")]
    #[serde(default = "default_image_pull_timeout")]
    image_pull_timeout: DurationSeconds,

    #[getset(get = "pub")]
    #[serde(default)]
    docker_host: Option<String>,
}

impl ContainerConfig {
    pub fn image_pull_timeout(&self) -> Duration {
        Duration::from_secs(self.image_pull_timeout.0)
    }

    pub fn image_for(&self, language: SupportedLanguage) -> Option<&LanguageConfig> {
        self.languages.iter().find(|l| l.language == language)
    }
}

fn default_image_pull_timeout() -> DurationSeconds {
    DurationSeconds(300)
}

/// Graph-database connection configuration (§4.7).
#[derive(Debug, Clone, Getters, Deserialize)]
pub struct GraphConfig {
    #[getset(get = "pub")]
    pub uri: String,

    #[getset(get = "pub")]
    pub user: String,

    #[getset(get = "pub")]
    pub password: String,

    #[getset(get = "pub")]
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    #[getset(get = "pub")]
    #[serde(default = "default_connection_lifetime")]
    connection_lifetime: DurationSeconds,

    #[getset(get = "pub")]
    #[serde(default = "default_acquisition_timeout")]
    acquisition_timeout: DurationSeconds,

    #[getset(get = "pub")]
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl GraphConfig {
    pub fn connection_lifetime(&self) -> Duration {
        Duration::from_secs(self.connection_lifetime.0)
    }

    pub fn acquisition_timeout(&self) -> Duration {
        Duration::from_secs(self.acquisition_timeout.0)
    }
}

fn default_max_connections() -> usize {
    50
}
fn default_connection_lifetime() -> DurationSeconds {
    DurationSeconds(30 * 60)
}
fn default_acquisition_timeout() -> DurationSeconds {
    DurationSeconds(60)
}
fn default_batch_size() -> usize {
    100
}

/// Storage facade configuration (§6 "Storage layout").
#[derive(Debug, Clone, Getters, Deserialize)]
pub struct StorageConfig {
    #[getset(get = "pub")]
    pub root: PathBuf,

    #[getset(get = "pub")]
    #[serde(default = "default_max_file_size")]
    pub max_file_size_bytes: u64,

    #[getset(get = "pub")]
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,

    #[getset(get = "pub")]
    #[serde(default = "default_quota")]
    pub quota_bytes_per_codebase: u64,
}

impl StorageConfig {
    pub fn codebases_dir(&self) -> PathBuf {
        self.root.join("codebases")
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.root.join("temp")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root.join("cache")
    }
}

fn default_max_file_size() -> u64 {
    100 * 1024 * 1024
}

fn default_allowed_extensions() -> Vec<String> {
    [
        "java", "kt", "scala", "ts", "tsx", "js", "jsx", "py", "go", "rs", "rb", "php", "c", "h",
        "cpp", "hpp", "cc", "cs", "md", "json", "yaml", "yml", "toml", "xml", "gradle",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_quota() -> u64 {
    20 * 1024 * 1024 * 1024
}

/// The orchestrator's worker pool (§5).
#[derive(Debug, Clone, Getters, Deserialize)]
pub struct WorkerPoolConfig {
    #[getset(get = "pub")]
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    #[getset(get = "pub")]
    #[serde(default = "default_max_parallel_languages")]
    pub max_parallel_languages: usize,
}

fn default_max_concurrent_jobs() -> usize {
    1
}

fn default_max_parallel_languages() -> usize {
    0 // 0 == "languages-count" per §5
}

/// `serde` helper: accept plain integer seconds in TOML, expose a
/// `Duration` through the typed getters above.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(transparent)]
pub struct DurationSeconds(u64);

#[derive(Debug, Deserialize)]
struct RawConfiguration {
    git: GitConfig,
    container: ContainerConfig,
    graph: GraphConfig,
    storage: StorageConfig,
    #[serde(default)]
    tasks: TaskDefaults,
    #[serde(default)]
    worker_pool: RawWorkerPoolOrDefault,
    database_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawWorkerPoolOrDefault {
    Set(WorkerPoolConfig),
    Unset,
}

impl Default for RawWorkerPoolOrDefault {
    fn default() -> Self {
        RawWorkerPoolOrDefault::Unset
    }
}

impl RawConfiguration {
    fn into_configuration(self) -> Result<Configuration> {
        let worker_pool = match self.worker_pool {
            RawWorkerPoolOrDefault::Set(w) => w,
            RawWorkerPoolOrDefault::Unset => WorkerPoolConfig {
                max_concurrent_jobs: default_max_concurrent_jobs(),
                max_parallel_languages: default_max_parallel_languages(),
            },
        };

        Configuration::from_parts(
            self.git,
            self.container,
            self.graph,
            self.storage,
            self.tasks,
            worker_pool,
            self.database_url,
        )
    }
}

/// Resolve the default config file location per XDG conventions, honoring
/// an explicit `--config` override first.
pub fn default_config_path(explicit: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(p) = explicit {
        return Ok(p);
    }

    xdg::BaseDirectories::with_prefix("codegraph-indexer")
        .map_err(|e| IndexerError::Config(e.to_string()))?
        .place_config_file("config.toml")
        .map_err(IndexerError::Io)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Configuration {
        Configuration::from_parts(
            GitConfig {
                oauth_token: None,
                sparse_checkout_patterns: vec![],
                command_timeout: DurationSeconds(300),
            },
            ContainerConfig {
                languages: vec![LanguageConfig {
                    language: SupportedLanguage::Java,
                    image: crate::util::docker::ImageName::from("parsers/java:latest".to_string()),
                    runtime_options: vec!["-Xmx512m".into()],
                }],
                image_pull_timeout: DurationSeconds(300),
                docker_host: None,
            },
            GraphConfig {
                uri: "bolt://localhost:7687".into(),
                user: "neo4j".into(),
                password: "test".into(),
                max_connections: 50,
                connection_lifetime: DurationSeconds(1800),
                acquisition_timeout: DurationSeconds(60),
                batch_size: 100,
            },
            StorageConfig {
                root: PathBuf::from("/tmp/codegraph"),
                max_file_size_bytes: default_max_file_size(),
                allowed_extensions: default_allowed_extensions(),
                quota_bytes_per_codebase: default_quota(),
            },
            TaskDefaults::default(),
            WorkerPoolConfig {
                max_concurrent_jobs: 1,
                max_parallel_languages: 0,
            },
            "postgres://localhost/codegraph".into(),
        )
        .expect("sample configuration is valid")
    }

    #[test]
    fn rejects_empty_language_list() {
        let mut cfg = sample();
        cfg.container.languages.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn accepts_well_formed_configuration() {
        assert!(sample().validate().is_ok());
    }
}
