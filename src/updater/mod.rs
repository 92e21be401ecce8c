//! Node updater abstraction
//!
//! Updaters push configuration onto one node: they wait for it to accept
//! connections, sync file mounts, and run the configured command phases.
//! The reconciler and the remote orchestration commands only talk to this
//! trait; the shipped implementation drives ssh/rsync subprocesses.

pub mod ssh;

use crate::config::schema::{AuthConfig, ClusterConfig, ContainerConfig};
use crate::error::{DroverError, DroverResult};
use crate::provider::{NodeId, NodeProvider};
use async_trait::async_trait;
use clap::ValueEnum;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Where a remote command executes on the node
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RunEnv {
    /// Container when the cluster runs one, host otherwise
    Auto,
    /// Directly on the node
    Host,
    /// Inside the cluster container
    Container,
}

/// Direction for syncing the declared file mounts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDirection {
    /// Local machine to node
    Up,
    /// Node to local machine
    Down,
}

/// Local-to-remote port forward for SSH sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortForward {
    pub local: u16,
    pub remote: u16,
}

/// Options for a single remote command
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Treat a nonzero exit as an error
    pub exit_on_fail: bool,
    /// Capture and return stdout instead of inheriting the terminal
    pub with_output: bool,
    /// SSH port forwards for the session
    pub port_forward: Vec<PortForward>,
    /// Execution environment on the node
    pub run_env: RunEnv,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            exit_on_fail: false,
            with_output: false,
            port_forward: Vec::new(),
            run_env: RunEnv::Auto,
        }
    }
}

/// Everything needed to build an updater for one node
#[derive(Debug, Clone)]
pub struct UpdaterSpec {
    pub node_id: NodeId,
    pub cluster_name: String,
    pub auth: AuthConfig,
    /// Remote path -> local path
    pub file_mounts: BTreeMap<String, String>,
    pub initialization_commands: Vec<String>,
    pub setup_commands: Vec<String>,
    pub start_commands: Vec<String>,
    /// Runtime fingerprint of the config being applied, for logs
    pub runtime_hash: String,
    pub container: ContainerConfig,
    pub use_internal_ip: bool,
}

impl UpdaterSpec {
    /// Spec for ad-hoc operations on an existing node, with no update
    /// phases configured
    pub fn for_node(config: &ClusterConfig, node_id: NodeId) -> Self {
        Self {
            node_id,
            cluster_name: config.cluster_name.clone(),
            auth: config.auth.clone(),
            file_mounts: config.file_mounts.clone(),
            initialization_commands: Vec::new(),
            setup_commands: Vec::new(),
            start_commands: Vec::new(),
            runtime_hash: String::new(),
            container: config.container.clone(),
            use_internal_ip: config.provider.use_internal_ips,
        }
    }
}

/// Applies configuration to one node and runs commands on it
#[async_trait]
pub trait NodeUpdater: Send + Sync {
    /// Full update: wait for the node, sync file mounts, run the
    /// configured command phases. Returns the exit code of the update;
    /// failures are reported through the code, not as errors.
    async fn apply(&self) -> i32;

    /// Run one command on the node. Returns captured stdout when
    /// `with_output` is set.
    async fn run(&self, cmd: &str, options: &RunOptions) -> DroverResult<Option<String>>;

    /// Copy a local path to the node
    async fn rsync_up(&self, source: &str, target: &str) -> DroverResult<()>;

    /// Copy a remote path from the node
    async fn rsync_down(&self, source: &str, target: &str) -> DroverResult<()>;

    /// Sync every declared file mount in the given direction
    async fn sync_file_mounts(&self, direction: SyncDirection) -> DroverResult<()>;

    /// Shell invocation a human can paste to reach the node
    fn remote_shell_command(&self) -> String;

    /// Whether commands run inside a container on the node
    fn is_containerized(&self) -> bool;

    /// Arrange for the node to shut down after the next command
    fn schedule_remote_shutdown(&self);
}

/// Builds updaters; swapped out for scripted fakes in tests
#[async_trait]
pub trait UpdaterFactory: Send + Sync {
    async fn build(
        &self,
        spec: UpdaterSpec,
        provider: Arc<dyn NodeProvider>,
    ) -> DroverResult<Box<dyn NodeUpdater>>;
}

/// Quote a string for safe embedding in a POSIX shell command line
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// Handle to one spawned node update
pub struct UpdateTask {
    node_id: NodeId,
    handle: JoinHandle<i32>,
}

impl UpdateTask {
    /// Spawn the updater's apply() as a background task
    pub fn spawn(node_id: NodeId, updater: Box<dyn NodeUpdater>) -> Self {
        let handle = tokio::spawn(async move { updater.apply().await });
        Self { node_id, handle }
    }

    /// Node this update targets
    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// Wait for the update to finish and return its exit code
    pub async fn join(self) -> DroverResult<i32> {
        self.handle.await.map_err(|e| {
            DroverError::Internal(format!("update task for {} failed: {}", self.node_id, e))
        })
    }
}
