//! Launch and runtime fingerprints
//!
//! Content hashes that drive reconciliation decisions. The launch hash
//! covers a node's launch spec plus auth and is stamped on created nodes
//! as a tag; a mismatch later means the node no longer matches the spec
//! and must be replaced. The runtime hash covers the full config and the
//! contents of every file mount, and changes whenever anything that a
//! running node consumes has changed.
//!
//! Hashes are SHA-256 over canonical JSON. `serde_json` keeps object keys
//! sorted, so two specs that differ only in YAML key order produce the
//! same digest.

use crate::config::expand_user;
use crate::config::schema::{AuthConfig, ClusterConfig};
use crate::error::{DroverError, DroverResult};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Hash a node launch spec together with the auth descriptor
pub fn launch_hash(node_spec: &serde_json::Value, auth: &AuthConfig) -> DroverResult<String> {
    let canonical = serde_json::to_string(&(node_spec, auth))?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Digest of a prepared cluster config, used as the resolved-config cache key
pub fn config_digest(config: &ClusterConfig) -> DroverResult<String> {
    let canonical = serde_json::to_string(config)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Hash the resolved config plus the contents of every local file mount
pub fn runtime_hash(
    file_mounts: &BTreeMap<String, String>,
    config: &ClusterConfig,
) -> DroverResult<String> {
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_string(file_mounts)?.as_bytes());
    hasher.update(serde_json::to_string(config)?.as_bytes());

    // Mount table iteration is sorted by remote path, so the fold order
    // is stable across runs.
    for local in file_mounts.values() {
        hash_path(&mut hasher, &expand_user(local))?;
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Fold a file or directory tree into the hasher
///
/// Directories are walked in sorted order; file names are folded in
/// before contents so renames change the digest.
fn hash_path(hasher: &mut Sha256, path: &Path) -> DroverResult<()> {
    if path.is_dir() {
        let mut entries: Vec<_> = fs::read_dir(path)
            .map_err(|e| DroverError::io(format!("reading mount dir {}", path.display()), e))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| DroverError::io(format!("reading mount dir {}", path.display()), e))?
            .into_iter()
            .map(|entry| entry.path())
            .collect();
        entries.sort();

        for entry in entries {
            if let Some(name) = entry.file_name() {
                hasher.update(name.to_string_lossy().as_bytes());
            }
            hash_path(hasher, &entry)?;
        }
    } else {
        let contents = fs::read(path)
            .map_err(|e| DroverError::io(format!("reading file mount {}", path.display()), e))?;
        hasher.update(&contents);
    }

    Ok(())
}
