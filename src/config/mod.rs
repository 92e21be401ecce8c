//! Cluster config loading and resolution

pub mod cache;
pub mod schema;

pub use schema::ClusterConfig;

use crate::error::{DroverError, DroverResult};
use crate::fingerprint;
use crate::provider;
use cache::ConfigCache;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Command-line overrides applied to a spec before resolution
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Replace the spec's cluster name
    pub cluster_name: Option<String>,
    /// Replace the spec's minimum worker count
    pub min_workers: Option<u32>,
    /// Replace the spec's maximum worker count
    pub max_workers: Option<u32>,
}

impl ConfigOverrides {
    fn apply(&self, config: &mut ClusterConfig) {
        if let Some(ref name) = self.cluster_name {
            debug!("Overriding cluster name: {}", name);
            config.cluster_name = name.clone();
        }
        if let Some(min) = self.min_workers {
            config.min_workers = min;
        }
        if let Some(max) = self.max_workers {
            config.max_workers = max;
        }
    }
}

/// Resolves raw cluster specs into fully bootstrapped configs
pub struct ConfigResolver {
    cache: ConfigCache,
    use_cache: bool,
}

impl ConfigResolver {
    /// Resolver with the default on-disk cache enabled
    pub fn new() -> Self {
        Self {
            cache: ConfigCache::new(),
            use_cache: true,
        }
    }

    /// Enable or disable the resolved-config cache
    pub fn with_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    /// Use a cache rooted at an explicit directory
    pub fn with_cache_dir(mut self, dir: PathBuf) -> Self {
        self.cache = ConfigCache::with_dir(dir);
        self
    }

    /// Load a spec file and resolve it through the provider bootstrap
    pub async fn resolve_file(
        &self,
        path: &Path,
        overrides: &ConfigOverrides,
    ) -> DroverResult<ClusterConfig> {
        let config = parse_file(path, overrides).await?;
        self.resolve(config).await
    }

    /// Resolve a parsed spec: prepare, check the cache, validate, run the
    /// provider bootstrap transform, and cache the result.
    ///
    /// A cache hit returns the stored config verbatim and skips both
    /// validation and bootstrap.
    pub async fn resolve(&self, mut config: ClusterConfig) -> DroverResult<ClusterConfig> {
        config.prepare();
        let digest = fingerprint::config_digest(&config)?;

        if self.use_cache {
            if let Some(cached) = self.cache.load(&digest) {
                info!("Resolved config from cache for cluster: {}", cached.cluster_name);
                return Ok(cached);
            }
        }

        config.validate()?;

        let factory = provider::factory_for(&config.provider.kind)?;
        let resolved = factory.bootstrap(config).await?;

        if self.use_cache {
            self.cache.store(&digest, &resolved);
        }

        Ok(resolved)
    }
}

impl Default for ConfigResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Load, prepare and validate a spec file without provider bootstrap.
///
/// Used by teardown and the read-only queries, which must not
/// side-effect external resources during resolution.
pub async fn load_file(path: &Path, overrides: &ConfigOverrides) -> DroverResult<ClusterConfig> {
    let mut config = parse_file(path, overrides).await?;
    config.prepare();
    config.validate()?;
    Ok(config)
}

async fn parse_file(path: &Path, overrides: &ConfigOverrides) -> DroverResult<ClusterConfig> {
    if !path.exists() {
        return Err(DroverError::ConfigNotFound(path.to_path_buf()));
    }

    let content = fs::read_to_string(path)
        .await
        .map_err(|e| DroverError::io(format!("reading cluster spec {}", path.display()), e))?;

    let mut config: ClusterConfig = serde_yaml::from_str(&content)
        .map_err(|e| DroverError::ConfigInvalid(format!("{}: {}", path.display(), e)))?;

    overrides.apply(&mut config);
    Ok(config)
}

/// Expand a leading `~` to the user's home directory
pub fn expand_user(path: &str) -> PathBuf {
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// State directory for drover's own files (event log)
pub fn state_dir() -> PathBuf {
    dirs::state_dir()
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("drover")
}
