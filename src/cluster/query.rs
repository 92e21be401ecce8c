//! Read-mostly cluster queries
//!
//! Head and worker IP lookup, head resolution with optional
//! create-if-needed, random worker kill, and monitor-log tailing.

use crate::config::schema::ClusterConfig;
use crate::cluster::orchestrate::{exec_cluster, ExecOptions};
use crate::cluster::reconcile::{reconcile_head, ReconcileFlags};
use crate::cluster::selector::NodeSelector;
use crate::error::{DroverError, DroverResult};
use crate::provider::{self, NodeId, NodeProvider};
use crate::ui::UiContext;
use crate::updater::{RunOptions, UpdaterFactory, UpdaterSpec};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Wait after a soft or hard kill before reading the node's IP
const KILL_SETTLE: Duration = Duration::from_secs(5);

/// Address of the cluster's head node
pub async fn head_node_ip(
    config: &ClusterConfig,
    provider: Arc<dyn NodeProvider>,
) -> DroverResult<String> {
    let head = NodeSelector::new(provider.as_ref())
        .head_nodes()
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| DroverError::HeadNodeNotFound(config.cluster_name.clone()))?;
    provider::node_ip(provider.as_ref(), &head, config.provider.use_internal_ips).await
}

/// Addresses of every worker node
pub async fn worker_node_ips(
    config: &ClusterConfig,
    provider: Arc<dyn NodeProvider>,
) -> DroverResult<Vec<String>> {
    let workers = NodeSelector::new(provider.as_ref()).worker_nodes().await?;
    let mut ips = Vec::with_capacity(workers.len());
    for worker in &workers {
        ips.push(
            provider::node_ip(provider.as_ref(), worker, config.provider.use_internal_ips)
                .await?,
        );
    }
    Ok(ips)
}

/// Resolve the cluster's head node.
///
/// With `create_if_needed`, a missing head triggers a full
/// reconciliation (auto-confirmed) before re-resolving. Without it, a
/// missing head is an error naming the cluster.
pub async fn head_node(
    config: &ClusterConfig,
    provider: Arc<dyn NodeProvider>,
    updaters: &dyn UpdaterFactory,
    create_if_needed: bool,
    ctx: &UiContext,
) -> DroverResult<NodeId> {
    let selector = NodeSelector::new(provider.as_ref());
    if let Some(head) = selector.head_nodes().await?.into_iter().next() {
        return Ok(head);
    }

    if !create_if_needed {
        return Err(DroverError::HeadNodeNotFound(config.cluster_name.clone()));
    }

    let outcome = reconcile_head(
        config,
        provider.clone(),
        updaters,
        ReconcileFlags::default(),
        &ctx.clone().with_auto_yes(true),
    )
    .await?;
    if outcome.exit_code != 0 {
        return Err(DroverError::UpdateFailed {
            node: outcome.head_node.to_string(),
            code: outcome.exit_code,
        });
    }

    NodeSelector::new(provider.as_ref())
        .head_nodes()
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| DroverError::HeadNodeNotFound(config.cluster_name.clone()))
}

/// Kill one uniformly random worker, returning its address.
///
/// Hard kills terminate through the provider; soft kills run the
/// configured stop commands on the node and leave the instance up.
pub async fn kill_node(
    config: &ClusterConfig,
    provider: Arc<dyn NodeProvider>,
    updaters: &dyn UpdaterFactory,
    hard: bool,
    ctx: &UiContext,
) -> DroverResult<String> {
    kill_node_with_settle(config, provider, updaters, hard, ctx, KILL_SETTLE).await
}

pub(crate) async fn kill_node_with_settle(
    config: &ClusterConfig,
    provider: Arc<dyn NodeProvider>,
    updaters: &dyn UpdaterFactory,
    hard: bool,
    ctx: &UiContext,
    settle: Duration,
) -> DroverResult<String> {
    crate::ui::confirm_or_abort(
        ctx,
        &format!("This will kill a node in cluster '{}'", config.cluster_name),
    )
    .await?;

    let worker = NodeSelector::new(provider.as_ref())
        .random_worker()
        .await?
        .ok_or_else(|| DroverError::NoWorkersFound(config.cluster_name.clone()))?;

    info!("Shutting down worker {}", worker);
    if hard {
        provider.terminate_node(&worker).await?;
    } else {
        let spec = UpdaterSpec::for_node(config, worker.clone());
        let updater = updaters.build(spec, provider.clone()).await?;
        let options = RunOptions {
            exit_on_fail: true,
            with_output: true,
            ..RunOptions::default()
        };
        for cmd in &config.stop_commands {
            updater.run(cmd, &options).await?;
        }
    }

    tokio::time::sleep(settle).await;
    provider::node_ip(provider.as_ref(), &worker, config.provider.use_internal_ips).await
}

/// Tail the autoscaler monitor logs on the head node
pub async fn monitor_cluster(
    config: &ClusterConfig,
    provider: Arc<dyn NodeProvider>,
    updaters: &dyn UpdaterFactory,
    num_lines: u32,
    ctx: &UiContext,
) -> DroverResult<()> {
    let cmd = format!(
        "tail -n {} -f /tmp/drover/session_*/logs/monitor*",
        num_lines
    );
    exec_cluster(
        config,
        provider,
        updaters,
        &cmd,
        &ExecOptions::default(),
        ctx,
    )
    .await?;
    Ok(())
}
