//! Head-node reconciliation
//!
//! The create-or-update algorithm for the singleton head node. Each
//! invocation re-derives cluster state from the provider, decides
//! between create, reuse and replace off the launch hash, waits for the
//! head to become visible, and hands the node payload to the updater as
//! one awaited task.

use crate::config::schema::{ClusterConfig, KUBERNETES_PROVIDER};
use crate::config::expand_user;
use crate::error::{DroverError, DroverResult};
use crate::fingerprint;
use crate::provider::{
    NodeId, NodeProvider, TagMap, TAG_LAUNCH_CONFIG, TAG_NODE_NAME,
};
use crate::cluster::selector::{head_filter, NodeSelector};
use crate::ui::{self, UiContext};
use crate::updater::{UpdateTask, UpdaterFactory, UpdaterSpec};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Interval between head visibility polls after a create or replace
const HEAD_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Ceiling on the head visibility wait
const HEAD_READY_TIMEOUT: Duration = Duration::from_secs(50);

/// Where the rewritten config lands on the head node
pub const REMOTE_CONFIG_PATH: &str = "~/drover_bootstrap_config.yaml";

/// Where the private key lands on non-kubernetes head nodes
pub const REMOTE_KEY_PATH: &str = "~/drover_bootstrap_key.pem";

/// Flags steering one reconciliation
#[derive(Debug, Clone, Copy, Default)]
pub struct ReconcileFlags {
    /// Sync files and run setup, but do not restart services
    pub no_restart: bool,
    /// Skip setup and only restart services
    pub restart_only: bool,
}

/// Result of one head reconciliation
#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    /// The head node the cluster converged on
    pub head_node: NodeId,
    /// Its address, internal or external per the provider flag
    pub head_ip: String,
    /// Shell invocation a human can paste to reach the head
    pub remote_shell_command: String,
    /// Exit code of the node update; nonzero means the update failed
    pub exit_code: i32,
}

/// Converge the head node to the configured spec.
///
/// Interactive confirmation points: creating a new cluster, restarting
/// services on an existing one, and replacing an out-of-date head. A
/// declined confirmation aborts cleanly with nothing touched.
pub async fn reconcile_head(
    config: &ClusterConfig,
    provider: Arc<dyn NodeProvider>,
    updaters: &dyn UpdaterFactory,
    flags: ReconcileFlags,
    ctx: &UiContext,
) -> DroverResult<ReconcileOutcome> {
    let selector = NodeSelector::new(provider.as_ref());
    let existing = selector.head_nodes().await?.into_iter().next();

    if existing.is_none() {
        ui::confirm_or_abort(
            ctx,
            &format!("This will create a new cluster '{}'", config.cluster_name),
        )
        .await?;
    } else if !flags.no_restart {
        ui::confirm_or_abort(
            ctx,
            &format!(
                "This will restart cluster services on '{}'",
                config.cluster_name
            ),
        )
        .await?;
    }

    let launch_hash = fingerprint::launch_hash(&config.head_node, &config.auth)?;

    let up_to_date = match existing {
        Some(ref head) => {
            let tags = provider.node_tags(head).await?;
            tags.get(TAG_LAUNCH_CONFIG) == Some(&launch_hash)
        }
        None => false,
    };

    if !up_to_date {
        if let Some(ref head) = existing {
            ui::confirm_or_abort(
                ctx,
                "Head node config is out-of-date. It will be terminated and replaced",
            )
            .await?;
            info!("Shutting down outdated head node {}", head);
            provider.terminate_node(head).await?;
        }

        info!("Launching new head node for cluster {}", config.cluster_name);
        let mut tags = head_filter();
        tags.insert(TAG_LAUNCH_CONFIG.to_string(), launch_hash.clone());
        tags.insert(TAG_NODE_NAME.to_string(), config.head_node_name());
        provider.create_node(&config.head_node, &tags, 1).await?;
    }

    let head_node = wait_for_single_head(
        provider.as_ref(),
        ctx,
        HEAD_POLL_INTERVAL,
        HEAD_READY_TIMEOUT,
    )
    .await?;

    // Reporting only; files are re-synced on every update regardless.
    let runtime_hash = fingerprint::runtime_hash(&config.file_mounts, config)?;
    info!(
        "Updating files on head node {} (runtime hash {})",
        head_node, runtime_hash
    );

    let file_mounts = build_head_mounts(config, flags.no_restart).await?;

    let (initialization_commands, setup_commands, start_commands) = if flags.restart_only {
        (Vec::new(), Vec::new(), config.start_commands.clone())
    } else if flags.no_restart {
        (
            config.initialization_commands.clone(),
            config.setup_commands.clone(),
            Vec::new(),
        )
    } else {
        (
            config.initialization_commands.clone(),
            config.setup_commands.clone(),
            config.start_commands.clone(),
        )
    };

    if !flags.no_restart {
        warn_about_bad_start_commands(&start_commands);
    }

    let spec = UpdaterSpec {
        node_id: head_node.clone(),
        cluster_name: config.cluster_name.clone(),
        auth: config.auth.clone(),
        file_mounts,
        initialization_commands,
        setup_commands,
        start_commands,
        runtime_hash,
        container: config.container.clone(),
        use_internal_ip: config.provider.use_internal_ips,
    };

    let updater = updaters.build(spec, provider.clone()).await?;
    let remote_shell_command = updater.remote_shell_command();
    let task = UpdateTask::spawn(head_node.clone(), updater);
    let exit_code = task.join().await?;

    // Refresh the provider's view before reading the IP; some backends
    // only report the external address after the node settles.
    provider.non_terminated_nodes(&head_filter()).await?;
    let head_ip = crate::provider::node_ip(
        provider.as_ref(),
        &head_node,
        config.provider.use_internal_ips,
    )
    .await?;

    Ok(ReconcileOutcome {
        head_node,
        head_ip,
        remote_shell_command,
        exit_code,
    })
}

/// Poll until the provider reports exactly one head node
pub(crate) async fn wait_for_single_head(
    provider: &dyn NodeProvider,
    ctx: &UiContext,
    interval: Duration,
    timeout: Duration,
) -> DroverResult<NodeId> {
    let mut spinner = ui::TaskSpinner::new(ctx);
    spinner.start("Waiting for head node...");

    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let heads = provider.non_terminated_nodes(&head_filter()).await?;
        if heads.len() == 1 {
            spinner.stop("Head node is up");
            return Ok(heads.into_iter().next().unwrap_or_else(|| unreachable!()));
        }

        if tokio::time::Instant::now() >= deadline {
            spinner.stop_error("Head node never became visible");
            return Err(DroverError::HeadNodeTimeout {
                timeout_secs: timeout.as_secs(),
            });
        }
        tokio::time::sleep(interval).await;
    }
}

/// File mounts for the head update: the user's mounts plus the rewritten
/// remote config and, for SSH providers, the private key.
async fn build_head_mounts(
    config: &ClusterConfig,
    no_restart: bool,
) -> DroverResult<BTreeMap<String, String>> {
    let remote_config = build_remote_config(config, no_restart);
    let serialized = serde_yaml::to_string(&remote_config)?;

    let staged = staged_config_path(&config.cluster_name);
    tokio::fs::write(&staged, serialized)
        .await
        .map_err(|e| DroverError::io(format!("staging remote config {}", staged.display()), e))?;

    let mut mounts = config.file_mounts.clone();
    mounts.insert(
        REMOTE_CONFIG_PATH.to_string(),
        staged.to_string_lossy().into_owned(),
    );

    if config.provider.kind != KUBERNETES_PROVIDER {
        if let Some(ref key) = config.auth.ssh_private_key {
            mounts.insert(
                REMOTE_KEY_PATH.to_string(),
                expand_user(key).to_string_lossy().into_owned(),
            );
        }
    }

    Ok(mounts)
}

/// The config variant shipped onto the head node.
///
/// The head acts as an SSH client toward workers, so the local-only
/// proxy command is stripped and the key path points at the injected
/// copy. Every remote mount path serves as its own local path, since
/// the head is the frame of reference after the sync.
fn build_remote_config(config: &ClusterConfig, no_restart: bool) -> ClusterConfig {
    let mut remote = config.clone();
    remote.auth.ssh_proxy_command = None;

    // Only rewrite the key path when a key was actually shipped; the
    // mount logic skips absent keys too.
    if config.provider.kind != KUBERNETES_PROVIDER && config.auth.ssh_private_key.is_some() {
        remote.auth.ssh_private_key = Some(REMOTE_KEY_PATH.to_string());
    }

    remote.file_mounts = config
        .file_mounts
        .keys()
        .map(|remote_path| (remote_path.clone(), remote_path.clone()))
        .collect();
    remote.no_restart = no_restart;
    remote
}

fn staged_config_path(cluster_name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("drover-bootstrap-{}.yaml", cluster_name))
}

/// A restart without a start command, or one that never reads the
/// injected config, leaves the head unable to manage workers.
fn warn_about_bad_start_commands(start_commands: &[String]) {
    if start_commands.is_empty() {
        warn!("No start commands configured; cluster services will not be restarted");
        return;
    }
    if !start_commands
        .iter()
        .any(|cmd| cmd.contains("drover_bootstrap_config"))
    {
        warn!(
            "No start command references {}; the head node will not manage workers",
            REMOTE_CONFIG_PATH
        );
    }
}
