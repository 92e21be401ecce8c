//! Resolved-config cache
//!
//! Fully resolved cluster configs are cached on disk keyed by the digest
//! of the prepared input spec, so repeated commands against an unchanged
//! spec skip provider bootstrap. Entries live under the OS temp dir as
//! `drover-config-<digest>`. The cache is advisory only: unreadable or
//! corrupt entries are treated as absent.

use crate::config::schema::ClusterConfig;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Disk cache of resolved cluster configs
pub struct ConfigCache {
    dir: PathBuf,
}

impl ConfigCache {
    /// Cache under the OS temp directory
    pub fn new() -> Self {
        Self {
            dir: std::env::temp_dir(),
        }
    }

    /// Cache under an explicit directory
    pub fn with_dir(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn entry_path(&self, digest: &str) -> PathBuf {
        self.dir.join(format!("drover-config-{}", digest))
    }

    /// Load a cached resolved config, or None if absent or unreadable
    pub fn load(&self, digest: &str) -> Option<ClusterConfig> {
        let path = self.entry_path(digest);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(_) => return None,
        };

        match serde_yaml::from_str(&contents) {
            Ok(config) => {
                debug!("Using cached resolved config: {}", path.display());
                Some(config)
            }
            Err(e) => {
                warn!("Ignoring corrupt config cache entry {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Store a resolved config; failures are logged and ignored
    pub fn store(&self, digest: &str, config: &ClusterConfig) {
        let path = self.entry_path(digest);
        let contents = match serde_yaml::to_string(config) {
            Ok(contents) => contents,
            Err(e) => {
                warn!("Failed to serialize config for cache: {}", e);
                return;
            }
        };

        if let Err(e) = fs::write(&path, contents) {
            warn!("Failed to write config cache {}: {}", path.display(), e);
        } else {
            debug!("Cached resolved config: {}", path.display());
        }
    }
}

impl Default for ConfigCache {
    fn default() -> Self {
        Self::new()
    }
}
