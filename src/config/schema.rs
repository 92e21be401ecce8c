//! Cluster spec schema
//!
//! Cluster specs are YAML documents describing the desired state of one
//! cluster: provider, auth, node launch specs, file mounts, and the
//! command lists run on nodes during setup and start.

use crate::error::{DroverError, DroverResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Provider type string for Kubernetes-style providers that do not use SSH
pub const KUBERNETES_PROVIDER: &str = "kubernetes";

/// Root cluster specification
///
/// Parsed from YAML with every field defaulted, so a minimal spec only
/// needs `cluster_name`, `provider.type` and a head node launch spec.
/// Treated as immutable once resolved by the config resolver.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Cluster name, used in node name tags and remote paths
    pub cluster_name: String,

    /// Minimum number of worker nodes
    pub min_workers: u32,

    /// Maximum number of worker nodes
    pub max_workers: u32,

    /// Provider descriptor (type + provider-specific fields)
    pub provider: ProviderConfig,

    /// SSH auth descriptor
    pub auth: AuthConfig,

    /// Launch spec for the head node (opaque to this crate, passed
    /// through to the provider and folded into the launch hash)
    pub head_node: serde_json::Value,

    /// Launch spec for worker nodes
    pub worker_nodes: serde_json::Value,

    /// File mounts: remote path -> local path
    pub file_mounts: BTreeMap<String, String>,

    /// Commands run once on first boot, before setup
    pub initialization_commands: Vec<String>,

    /// Commands that install and configure the runtime environment
    pub setup_commands: Vec<String>,

    /// Commands that start cluster services
    pub start_commands: Vec<String>,

    /// Commands that cleanly stop cluster services
    pub stop_commands: Vec<String>,

    /// Optional container wrapping for remote commands
    pub container: ContainerConfig,

    /// Set on the config shipped to the head node so that nested
    /// updates there do not restart running services
    pub no_restart: bool,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            cluster_name: "default".to_string(),
            min_workers: 0,
            max_workers: 0,
            provider: ProviderConfig::default(),
            auth: AuthConfig::default(),
            head_node: empty_spec(),
            worker_nodes: empty_spec(),
            file_mounts: BTreeMap::new(),
            initialization_commands: Vec::new(),
            setup_commands: Vec::new(),
            start_commands: Vec::new(),
            stop_commands: Vec::new(),
            container: ContainerConfig::default(),
            no_restart: false,
        }
    }
}

/// Node provider descriptor
///
/// Only `type` and `use_internal_ips` are interpreted here. Everything
/// else (region, credentials, subnets, ...) is provider-specific and
/// carried opaquely for the provider backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Provider type, resolved against the registered factories
    #[serde(rename = "type")]
    pub kind: String,

    /// Prefer internal IPs when reporting node addresses
    pub use_internal_ips: bool,

    /// Provider-specific fields, passed through untouched
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ProviderConfig {
    /// Whether this provider reaches nodes without SSH
    pub fn is_kubernetes(&self) -> bool {
        self.kind == KUBERNETES_PROVIDER
    }
}

/// SSH auth descriptor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Remote user for SSH sessions
    pub ssh_user: String,

    /// Path to the private key (may contain `~`)
    pub ssh_private_key: Option<String>,

    /// ProxyCommand for SSH, stripped from the config shipped to nodes
    pub ssh_proxy_command: Option<String>,
}

/// Container wrapping for remote commands
///
/// When a container name is set, node commands run inside that container
/// instead of directly on the host.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    /// Image pulled on the node
    pub image: Option<String>,

    /// Name of the long-running container commands execute in
    pub container_name: Option<String>,

    /// Extra arguments for the container run command
    pub run_options: Vec<String>,
}

impl ContainerConfig {
    /// Whether remote commands are wrapped in a container
    pub fn is_enabled(&self) -> bool {
        self.container_name.is_some()
    }
}

impl ClusterConfig {
    /// Normalize a freshly parsed spec before hashing or validation.
    ///
    /// Fills null launch specs with empty objects and trims the cluster
    /// name, so that equivalent specs produce identical digests.
    pub fn prepare(&mut self) {
        self.cluster_name = self.cluster_name.trim().to_string();
        if self.head_node.is_null() {
            self.head_node = empty_spec();
        }
        if self.worker_nodes.is_null() {
            self.worker_nodes = empty_spec();
        }
    }

    /// Validate the spec, returning the first problem found
    pub fn validate(&self) -> DroverResult<()> {
        if self.cluster_name.is_empty() {
            return Err(DroverError::ConfigInvalid(
                "cluster_name must not be empty".to_string(),
            ));
        }
        if self
            .cluster_name
            .chars()
            .any(|c| c.is_whitespace() || c == '/')
        {
            return Err(DroverError::ConfigInvalid(format!(
                "cluster_name '{}' must not contain whitespace or '/'",
                self.cluster_name
            )));
        }
        if self.provider.kind.is_empty() {
            return Err(DroverError::ConfigInvalid(
                "provider.type must be set".to_string(),
            ));
        }
        if self.max_workers < self.min_workers {
            return Err(DroverError::ConfigInvalid(format!(
                "max_workers ({}) must be >= min_workers ({})",
                self.max_workers, self.min_workers
            )));
        }
        if !self.head_node.is_object() {
            return Err(DroverError::ConfigInvalid(
                "head_node must be a mapping".to_string(),
            ));
        }
        if !self.worker_nodes.is_object() {
            return Err(DroverError::ConfigInvalid(
                "worker_nodes must be a mapping".to_string(),
            ));
        }
        if !self.provider.is_kubernetes() && self.auth.ssh_user.is_empty() {
            return Err(DroverError::ConfigInvalid(
                "auth.ssh_user must be set for SSH-based providers".to_string(),
            ));
        }
        Ok(())
    }

    /// Name tag value for this cluster's head node
    pub fn head_node_name(&self) -> String {
        format!("drover-{}-head", self.cluster_name)
    }
}

fn empty_spec() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}
