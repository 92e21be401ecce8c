//! Cluster teardown
//!
//! Best-effort clean stop followed by a terminate/re-query convergence
//! loop. The loop's only exit is the provider reporting zero matching
//! non-terminated nodes; there is no retry ceiling, only a periodic
//! warning while convergence is still in progress.

use crate::config::schema::ClusterConfig;
use crate::error::DroverResult;
use crate::provider::{NodeId, NodeProvider};
use crate::cluster::selector::{sample_for_termination, NodeSelector};
use crate::ui::{self, UiContext};
use crate::updater::{RunOptions, UpdaterFactory, UpdaterSpec};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Pause between terminate rounds
const CONVERGE_INTERVAL: Duration = Duration::from_secs(1);

/// Rounds between stuck-convergence warnings
const WARN_EVERY_ROUNDS: u32 = 30;

/// Flags steering one teardown
#[derive(Debug, Clone, Copy, Default)]
pub struct TeardownFlags {
    /// Leave the head node running
    pub workers_only: bool,
    /// Spare `min_workers` uniformly chosen workers
    pub keep_min_workers: bool,
}

/// Drive the cluster's node set to the configured target (usually zero).
pub async fn teardown(
    config: &ClusterConfig,
    provider: Arc<dyn NodeProvider>,
    updaters: &dyn UpdaterFactory,
    flags: TeardownFlags,
    ctx: &UiContext,
) -> DroverResult<()> {
    teardown_with_interval(config, provider, updaters, flags, ctx, CONVERGE_INTERVAL).await
}

pub(crate) async fn teardown_with_interval(
    config: &ClusterConfig,
    provider: Arc<dyn NodeProvider>,
    updaters: &dyn UpdaterFactory,
    flags: TeardownFlags,
    ctx: &UiContext,
    interval: Duration,
) -> DroverResult<()> {
    ui::confirm_or_abort(
        ctx,
        &format!("This will destroy cluster '{}'", config.cluster_name),
    )
    .await?;

    if !flags.workers_only {
        // The cluster may already be partially down; a failed clean stop
        // never blocks termination.
        if let Err(e) = clean_stop(config, provider.clone(), updaters).await {
            warn!("Ignoring error attempting a clean shutdown: {}", e);
        }
    }

    let mut round: u32 = 0;
    loop {
        let remaining = remaining_nodes(config, provider.as_ref(), flags).await?;
        if remaining.is_empty() {
            info!("Teardown of cluster {} complete", config.cluster_name);
            return Ok(());
        }

        round += 1;
        info!(
            "Shutting down {} node(s) of cluster {}",
            remaining.len(),
            config.cluster_name
        );
        if round % WARN_EVERY_ROUNDS == 0 {
            warn!(
                "Cluster {} still has {} node(s) after {} terminate rounds",
                config.cluster_name,
                remaining.len(),
                round
            );
        }

        // A transient terminate failure is fine; the re-query picks up
        // whatever the provider actually honored. Anything else aborts.
        match provider.terminate_nodes(&remaining).await {
            Ok(()) => {}
            Err(e) if e.is_retryable() => {
                warn!("Terminate request partially failed: {}", e);
            }
            Err(e) => return Err(e),
        }
        tokio::time::sleep(interval).await;
    }
}

/// Run the configured stop commands on the head node, if there is one
async fn clean_stop(
    config: &ClusterConfig,
    provider: Arc<dyn NodeProvider>,
    updaters: &dyn UpdaterFactory,
) -> DroverResult<()> {
    if config.stop_commands.is_empty() {
        return Ok(());
    }

    let selector = NodeSelector::new(provider.as_ref());
    let head = match selector.head_nodes().await?.into_iter().next() {
        Some(head) => head,
        None => {
            info!("No head node found, skipping clean shutdown");
            return Ok(());
        }
    };

    let spec = UpdaterSpec::for_node(config, head);
    let updater = updaters.build(spec, provider).await?;
    let options = RunOptions {
        exit_on_fail: true,
        with_output: true,
        ..RunOptions::default()
    };
    for cmd in &config.stop_commands {
        updater.run(cmd, &options).await?;
    }
    Ok(())
}

/// The nodes teardown still has to terminate
async fn remaining_nodes(
    config: &ClusterConfig,
    provider: &dyn NodeProvider,
    flags: TeardownFlags,
) -> DroverResult<Vec<NodeId>> {
    let selector = NodeSelector::new(provider);
    let mut workers = selector.worker_nodes().await?;

    if flags.keep_min_workers {
        info!("Keeping {} worker(s)", config.min_workers);
        workers = sample_for_termination(workers, config.min_workers as usize);
    }

    if flags.workers_only {
        return Ok(workers);
    }

    let mut targets = selector.head_nodes().await?;
    targets.append(&mut workers);
    Ok(targets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::selector::{head_filter, worker_filter};
    use crate::error::DroverError;
    use crate::provider::memory::MemoryProviderFactory;
    use crate::provider::ProviderFactory;
    use crate::testing::{RecordingUpdaterFactory, UpdaterCall};

    fn test_config(name: &str) -> ClusterConfig {
        let mut config = ClusterConfig::default();
        config.cluster_name = name.to_string();
        config.provider.kind = "mock".to_string();
        config.auth.ssh_user = "ubuntu".to_string();
        config.stop_commands.push("cluster-runtime stop".to_string());
        config
    }

    fn auto_yes() -> UiContext {
        UiContext::non_interactive().with_auto_yes(true)
    }

    async fn cluster_with(
        config: &ClusterConfig,
        heads: u32,
        workers: u32,
    ) -> Arc<dyn NodeProvider> {
        let provider = MemoryProviderFactory::new().build(config).await.unwrap();
        let spec = serde_json::json!({});
        if heads > 0 {
            provider
                .create_node(&spec, &head_filter(), heads)
                .await
                .unwrap();
        }
        if workers > 0 {
            provider
                .create_node(&spec, &worker_filter(), workers)
                .await
                .unwrap();
        }
        provider
    }

    async fn run_teardown(
        config: &ClusterConfig,
        provider: Arc<dyn NodeProvider>,
        updaters: &RecordingUpdaterFactory,
        flags: TeardownFlags,
    ) {
        teardown_with_interval(
            config,
            provider,
            updaters,
            flags,
            &auto_yes(),
            Duration::from_millis(5),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn full_teardown_reaches_empty() {
        let config = test_config("full-down");
        let provider = cluster_with(&config, 1, 3).await;
        let updaters = RecordingUpdaterFactory::new();

        run_teardown(&config, provider.clone(), &updaters, TeardownFlags::default()).await;

        assert!(provider
            .non_terminated_nodes(&Default::default())
            .await
            .unwrap()
            .is_empty());

        // Clean stop ran on the head first
        assert_eq!(updaters.run_commands(), vec!["cluster-runtime stop"]);
    }

    #[tokio::test]
    async fn converges_through_termination_lag() {
        let mut config = test_config("laggy-down");
        config.provider.extra.insert(
            "termination_lag".to_string(),
            serde_json::Value::from(3u64),
        );
        let provider = cluster_with(&config, 1, 2).await;
        let updaters = RecordingUpdaterFactory::new();

        run_teardown(&config, provider.clone(), &updaters, TeardownFlags::default()).await;

        assert!(provider
            .non_terminated_nodes(&Default::default())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn workers_only_spares_the_head() {
        let config = test_config("spare-head");
        let provider = cluster_with(&config, 1, 3).await;
        let updaters = RecordingUpdaterFactory::new();

        run_teardown(
            &config,
            provider.clone(),
            &updaters,
            TeardownFlags {
                workers_only: true,
                ..TeardownFlags::default()
            },
        )
        .await;

        assert_eq!(
            provider
                .non_terminated_nodes(&head_filter())
                .await
                .unwrap()
                .len(),
            1
        );
        assert!(provider
            .non_terminated_nodes(&worker_filter())
            .await
            .unwrap()
            .is_empty());

        // workers_only skips the clean stop entirely
        assert!(updaters.run_commands().is_empty());
    }

    #[tokio::test]
    async fn keep_min_workers_spares_the_minimum() {
        let mut config = test_config("keep-min");
        config.min_workers = 1;
        config.max_workers = 3;
        let provider = cluster_with(&config, 1, 3).await;
        let updaters = RecordingUpdaterFactory::new();

        run_teardown(
            &config,
            provider.clone(),
            &updaters,
            TeardownFlags {
                workers_only: true,
                keep_min_workers: true,
            },
        )
        .await;

        assert_eq!(
            provider
                .non_terminated_nodes(&worker_filter())
                .await
                .unwrap()
                .len(),
            1
        );
        assert_eq!(
            provider
                .non_terminated_nodes(&head_filter())
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn keep_min_never_goes_below_bound() {
        let mut config = test_config("already-min");
        config.min_workers = 2;
        config.max_workers = 4;
        let provider = cluster_with(&config, 0, 2).await;
        let updaters = RecordingUpdaterFactory::new();

        run_teardown(
            &config,
            provider.clone(),
            &updaters,
            TeardownFlags {
                workers_only: true,
                keep_min_workers: true,
            },
        )
        .await;

        assert_eq!(
            provider
                .non_terminated_nodes(&worker_filter())
                .await
                .unwrap()
                .len(),
            2
        );
    }

    #[tokio::test]
    async fn failed_clean_stop_is_swallowed() {
        let config = test_config("dirty-stop");
        let provider = cluster_with(&config, 1, 1).await;
        let updaters = RecordingUpdaterFactory::new();
        updaters.set_fail_runs(true);

        run_teardown(&config, provider.clone(), &updaters, TeardownFlags::default()).await;

        // Stop failed, termination still converged
        assert!(provider
            .non_terminated_nodes(&Default::default())
            .await
            .unwrap()
            .is_empty());
        assert!(updaters
            .calls()
            .iter()
            .any(|call| matches!(call, UpdaterCall::Run { .. })));
    }

    #[tokio::test]
    async fn headless_cluster_skips_clean_stop() {
        let config = test_config("headless");
        let provider = cluster_with(&config, 0, 2).await;
        let updaters = RecordingUpdaterFactory::new();

        run_teardown(&config, provider.clone(), &updaters, TeardownFlags::default()).await;

        assert!(updaters.run_commands().is_empty());
        assert!(provider
            .non_terminated_nodes(&Default::default())
            .await
            .unwrap()
            .is_empty());
    }

    /// Delegates to the memory provider, failing the first
    /// `terminate_nodes` calls with a scripted error
    struct FailingTerminate {
        inner: Arc<dyn NodeProvider>,
        failures: std::sync::atomic::AtomicU32,
        retryable: bool,
    }

    impl FailingTerminate {
        fn new(inner: Arc<dyn NodeProvider>, failures: u32, retryable: bool) -> Self {
            Self {
                inner,
                failures: std::sync::atomic::AtomicU32::new(failures),
                retryable,
            }
        }
    }

    #[async_trait::async_trait]
    impl NodeProvider for FailingTerminate {
        async fn non_terminated_nodes(
            &self,
            filter: &crate::provider::TagMap,
        ) -> DroverResult<Vec<NodeId>> {
            self.inner.non_terminated_nodes(filter).await
        }

        async fn node_tags(&self, node: &NodeId) -> DroverResult<crate::provider::TagMap> {
            self.inner.node_tags(node).await
        }

        async fn internal_ip(&self, node: &NodeId) -> DroverResult<String> {
            self.inner.internal_ip(node).await
        }

        async fn external_ip(&self, node: &NodeId) -> DroverResult<String> {
            self.inner.external_ip(node).await
        }

        async fn create_node(
            &self,
            node_spec: &serde_json::Value,
            tags: &crate::provider::TagMap,
            count: u32,
        ) -> DroverResult<()> {
            self.inner.create_node(node_spec, tags, count).await
        }

        async fn terminate_node(&self, node: &NodeId) -> DroverResult<()> {
            self.inner.terminate_node(node).await
        }

        async fn terminate_nodes(&self, nodes: &[NodeId]) -> DroverResult<()> {
            use std::sync::atomic::Ordering;
            if self.failures.load(Ordering::SeqCst) > 0 {
                self.failures.fetch_sub(1, Ordering::SeqCst);
                return if self.retryable {
                    Err(DroverError::Provider("rate limited".to_string()))
                } else {
                    Err(DroverError::Internal("backend gone".to_string()))
                };
            }
            self.inner.terminate_nodes(nodes).await
        }

        async fn cleanup(&self) {
            self.inner.cleanup().await;
        }
    }

    #[tokio::test]
    async fn transient_terminate_failure_still_converges() {
        let config = test_config("throttled-down");
        let inner = cluster_with(&config, 1, 2).await;
        let provider: Arc<dyn NodeProvider> =
            Arc::new(FailingTerminate::new(inner.clone(), 2, true));
        let updaters = RecordingUpdaterFactory::new();

        run_teardown(&config, provider, &updaters, TeardownFlags::default()).await;

        assert!(inner
            .non_terminated_nodes(&Default::default())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn fatal_terminate_failure_aborts() {
        let config = test_config("broken-down");
        let inner = cluster_with(&config, 1, 1).await;
        let provider: Arc<dyn NodeProvider> =
            Arc::new(FailingTerminate::new(inner.clone(), 1, false));
        let updaters = RecordingUpdaterFactory::new();

        let result = teardown_with_interval(
            &config,
            provider,
            &updaters,
            TeardownFlags::default(),
            &auto_yes(),
            Duration::from_millis(5),
        )
        .await;

        assert!(matches!(result, Err(DroverError::Internal(_))));
        assert_eq!(
            inner
                .non_terminated_nodes(&Default::default())
                .await
                .unwrap()
                .len(),
            2
        );
    }

    #[tokio::test]
    async fn declined_teardown_touches_nothing() {
        let config = test_config("keep-alive");
        let provider = cluster_with(&config, 1, 2).await;
        let updaters = RecordingUpdaterFactory::new();

        let result = teardown_with_interval(
            &config,
            provider.clone(),
            &updaters,
            TeardownFlags::default(),
            &UiContext::non_interactive(),
            Duration::from_millis(5),
        )
        .await;

        assert!(matches!(result, Err(DroverError::Aborted)));
        assert_eq!(
            provider
                .non_terminated_nodes(&Default::default())
                .await
                .unwrap()
                .len(),
            3
        );
    }
}
