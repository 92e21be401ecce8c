//! Remote orchestration
//!
//! Ad-hoc operations against running clusters: exec a command on the
//! head node (optionally detached in a multiplexer, optionally stopping
//! the cluster afterwards), attach an interactive session, and rsync
//! files across the head or every node.

use crate::config::schema::ClusterConfig;
use crate::cluster::query::head_node;
use crate::cluster::selector::NodeSelector;
use crate::error::{DroverError, DroverResult};
use crate::provider::NodeProvider;
use crate::ui::UiContext;
use crate::updater::{
    shell_quote, PortForward, RunEnv, RunOptions, SyncDirection, UpdaterFactory, UpdaterSpec,
};
use std::sync::Arc;
use tracing::info;

/// Options for `exec_cluster`
#[derive(Debug, Clone)]
pub struct ExecOptions {
    /// Execution environment on the node
    pub run_env: RunEnv,
    /// Run detached inside a screen session
    pub screen: bool,
    /// Run detached inside a tmux session
    pub tmux: bool,
    /// Stop the cluster after the command finishes
    pub stop: bool,
    /// Reconcile the head node first if the cluster is not up
    pub start: bool,
    /// SSH port forwards for the session
    pub port_forward: Vec<PortForward>,
    /// Capture and return stdout instead of inheriting the terminal
    pub with_output: bool,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            run_env: RunEnv::Auto,
            screen: false,
            tmux: false,
            stop: false,
            start: false,
            port_forward: Vec::new(),
            with_output: false,
        }
    }
}

/// Options for `attach_cluster`
#[derive(Debug, Clone, Copy, Default)]
pub struct AttachOptions {
    /// Attach through screen
    pub screen: bool,
    /// Attach through tmux
    pub tmux: bool,
    /// Force a fresh session instead of attaching to an existing one
    pub new: bool,
    /// Reconcile the head node first if the cluster is not up
    pub start: bool,
}

/// Run one command on the cluster's head node.
///
/// Returns captured stdout when `with_output` is set.
pub async fn exec_cluster(
    config: &ClusterConfig,
    provider: Arc<dyn NodeProvider>,
    updaters: &dyn UpdaterFactory,
    cmd: &str,
    opts: &ExecOptions,
    ctx: &UiContext,
) -> DroverResult<Option<String>> {
    if opts.screen && opts.tmux {
        return Err(DroverError::User(
            "Can specify only one of screen or tmux".to_string(),
        ));
    }

    let head = head_node(config, provider.clone(), updaters, opts.start, ctx).await?;
    let spec = UpdaterSpec::for_node(config, head);
    let updater = updaters.build(spec, provider).await?;

    let mut cmd = cmd.to_string();
    if opts.stop {
        // Stop the runtime, tear down the workers from the head's own
        // injected config, then power the node off.
        let mut sequence = config.stop_commands.clone();
        sequence.push(format!(
            "drover down {} --yes --workers-only",
            super::reconcile::REMOTE_CONFIG_PATH
        ));
        if !cmd.is_empty() {
            cmd.push_str("; ");
        }
        cmd.push_str(&sequence.join("; "));

        if updater.is_containerized() && opts.run_env == RunEnv::Container {
            updater.schedule_remote_shutdown();
        } else {
            cmd.push_str("; sudo shutdown -h now");
        }
    }

    let cmd = wrap_in_multiplexer(&cmd, opts.screen, opts.tmux);

    let options = RunOptions {
        exit_on_fail: true,
        with_output: opts.with_output,
        port_forward: opts.port_forward.clone(),
        run_env: opts.run_env,
    };
    let output = updater.run(&cmd, &options).await?;

    if opts.screen || opts.tmux {
        let flag = if opts.tmux { "--tmux" } else { "--screen" };
        info!(
            "Use `drover attach <cluster config> {}` to check on command status",
            flag
        );
    }
    Ok(output)
}

/// Open an interactive shell or multiplexer session on the head node
pub async fn attach_cluster(
    config: &ClusterConfig,
    provider: Arc<dyn NodeProvider>,
    updaters: &dyn UpdaterFactory,
    opts: &AttachOptions,
    ctx: &UiContext,
) -> DroverResult<()> {
    let cmd = if opts.tmux {
        if opts.new {
            "tmux new"
        } else {
            "tmux attach || tmux new"
        }
    } else if opts.screen {
        if opts.new {
            "screen -L"
        } else {
            "screen -L -xRR"
        }
    } else {
        if opts.new {
            return Err(DroverError::User(
                "--new only makes sense with --screen or --tmux".to_string(),
            ));
        }
        "$SHELL"
    };

    let exec_opts = ExecOptions {
        start: opts.start,
        ..ExecOptions::default()
    };
    exec_cluster(config, provider, updaters, cmd, &exec_opts, ctx).await?;
    Ok(())
}

/// Sync files between the local machine and the cluster.
///
/// With an explicit source/target pair, that one path is synced per
/// selected node; otherwise the whole declared mount set is. Nodes are
/// processed one at a time, head last.
pub async fn rsync_cluster(
    config: &ClusterConfig,
    provider: Arc<dyn NodeProvider>,
    updaters: &dyn UpdaterFactory,
    source: Option<&str>,
    target: Option<&str>,
    direction: SyncDirection,
    all_nodes: bool,
    ctx: &UiContext,
) -> DroverResult<()> {
    if source.is_some() != target.is_some() {
        return Err(DroverError::User(
            "Must provide both source and target, or neither".to_string(),
        ));
    }

    let mut nodes = if all_nodes {
        NodeSelector::new(provider.as_ref()).worker_nodes().await?
    } else {
        Vec::new()
    };
    nodes.push(head_node(config, provider.clone(), updaters, false, ctx).await?);

    for node in nodes {
        let spec = UpdaterSpec::for_node(config, node.clone());
        let updater = updaters.build(spec, provider.clone()).await?;

        match (source, target) {
            (Some(source), Some(target)) => match direction {
                SyncDirection::Up => updater.rsync_up(source, target).await?,
                SyncDirection::Down => updater.rsync_down(source, target).await?,
            },
            _ => updater.sync_file_mounts(direction).await?,
        }
        info!("Synced node {}", node);
    }
    Ok(())
}

/// Detached multiplexer wrapping for long-running commands
fn wrap_in_multiplexer(cmd: &str, screen: bool, tmux: bool) -> String {
    if screen {
        format!(
            "screen -L -dm bash -c {}",
            shell_quote(&format!("{}; exec bash", cmd))
        )
    } else if tmux {
        format!(
            "tmux new -d bash -c {}",
            shell_quote(&format!("{}; exec bash", cmd))
        )
    } else {
        cmd.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::selector::{head_filter, worker_filter};
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

    #[tokio::test]
    async fn exec_runs_on_head() {
        let config = test_config("exec");
        let provider = cluster_with(&config, 1, 0).await;
        let updaters = RecordingUpdaterFactory::new();

        exec_cluster(
            &config,
            provider,
            &updaters,
            "uptime",
            &ExecOptions::default(),
            &auto_yes(),
        )
        .await
        .unwrap();

        assert_eq!(updaters.run_commands(), vec!["uptime"]);
    }

    #[tokio::test]
    async fn exec_screen_and_tmux_conflict() {
        let config = test_config("conflict");
        let provider = cluster_with(&config, 1, 0).await;
        let updaters = RecordingUpdaterFactory::new();

        let result = exec_cluster(
            &config,
            provider,
            &updaters,
            "uptime",
            &ExecOptions {
                screen: true,
                tmux: true,
                ..ExecOptions::default()
            },
            &auto_yes(),
        )
        .await;

        assert!(matches!(result, Err(DroverError::User(_))));
        assert!(updaters.calls().is_empty());
    }

    #[tokio::test]
    async fn exec_stop_appends_host_shutdown() {
        let config = test_config("stop-host");
        let provider = cluster_with(&config, 1, 0).await;
        let updaters = RecordingUpdaterFactory::new();

        exec_cluster(
            &config,
            provider,
            &updaters,
            "collect-results",
            &ExecOptions {
                stop: true,
                ..ExecOptions::default()
            },
            &auto_yes(),
        )
        .await
        .unwrap();

        let cmd = &updaters.run_commands()[0];
        assert!(cmd.starts_with("collect-results; cluster-runtime stop; "));
        assert!(cmd.contains("drover down ~/drover_bootstrap_config.yaml --yes --workers-only"));
        assert!(cmd.ends_with("; sudo shutdown -h now"));
    }

    #[tokio::test]
    async fn exec_stop_in_container_schedules_shutdown() {
        let config = test_config("stop-container");
        let provider = cluster_with(&config, 1, 0).await;
        let updaters = RecordingUpdaterFactory::new();
        updaters.set_containerized(true);

        exec_cluster(
            &config,
            provider,
            &updaters,
            "collect-results",
            &ExecOptions {
                stop: true,
                run_env: RunEnv::Container,
                ..ExecOptions::default()
            },
            &auto_yes(),
        )
        .await
        .unwrap();

        let calls = updaters.calls();
        assert!(calls
            .iter()
            .any(|call| matches!(call, UpdaterCall::ScheduleShutdown { .. })));
        assert!(!updaters.run_commands()[0].contains("sudo shutdown"));
    }

    #[tokio::test]
    async fn exec_wraps_tmux_detached() {
        let config = test_config("tmux");
        let provider = cluster_with(&config, 1, 0).await;
        let updaters = RecordingUpdaterFactory::new();

        exec_cluster(
            &config,
            provider,
            &updaters,
            "long-job",
            &ExecOptions {
                tmux: true,
                ..ExecOptions::default()
            },
            &auto_yes(),
        )
        .await
        .unwrap();

        assert_eq!(
            updaters.run_commands()[0],
            "tmux new -d bash -c 'long-job; exec bash'"
        );
    }

    #[tokio::test]
    async fn exec_missing_head_without_start() {
        let config = test_config("no-head");
        let provider = cluster_with(&config, 0, 0).await;
        let updaters = RecordingUpdaterFactory::new();

        let result = exec_cluster(
            &config,
            provider,
            &updaters,
            "uptime",
            &ExecOptions::default(),
            &auto_yes(),
        )
        .await;

        assert!(matches!(result, Err(DroverError::HeadNodeNotFound(_))));
    }

    #[tokio::test]
    async fn exec_with_output_returns_stdout() {
        let config = test_config("capture");
        let provider = cluster_with(&config, 1, 0).await;
        let updaters = RecordingUpdaterFactory::new();
        updaters.set_run_output("14:03 up 2 days");

        let output = exec_cluster(
            &config,
            provider,
            &updaters,
            "uptime",
            &ExecOptions {
                with_output: true,
                ..ExecOptions::default()
            },
            &auto_yes(),
        )
        .await
        .unwrap();

        assert_eq!(output.as_deref(), Some("14:03 up 2 days"));
    }

    #[tokio::test]
    async fn attach_default_opens_shell() {
        let config = test_config("attach");
        let provider = cluster_with(&config, 1, 0).await;
        let updaters = RecordingUpdaterFactory::new();

        attach_cluster(
            &config,
            provider,
            &updaters,
            &AttachOptions::default(),
            &auto_yes(),
        )
        .await
        .unwrap();

        assert_eq!(updaters.run_commands(), vec!["$SHELL"]);
    }

    #[tokio::test]
    async fn attach_tmux_reuses_session() {
        let config = test_config("attach-tmux");
        let provider = cluster_with(&config, 1, 0).await;
        let updaters = RecordingUpdaterFactory::new();

        attach_cluster(
            &config,
            provider,
            &updaters,
            &AttachOptions {
                tmux: true,
                ..AttachOptions::default()
            },
            &auto_yes(),
        )
        .await
        .unwrap();

        assert_eq!(updaters.run_commands(), vec!["tmux attach || tmux new"]);
    }

    #[tokio::test]
    async fn attach_new_requires_multiplexer() {
        let config = test_config("attach-new");
        let provider = cluster_with(&config, 1, 0).await;
        let updaters = RecordingUpdaterFactory::new();

        let result = attach_cluster(
            &config,
            provider,
            &updaters,
            &AttachOptions {
                new: true,
                ..AttachOptions::default()
            },
            &auto_yes(),
        )
        .await;

        assert!(matches!(result, Err(DroverError::User(_))));
    }

    #[tokio::test]
    async fn rsync_full_mount_set_per_node() {
        let mut config = test_config("rsync-all");
        config
            .file_mounts
            .insert("/etc/app.conf".to_string(), "./app.conf".to_string());
        let provider = cluster_with(&config, 1, 2).await;
        let updaters = RecordingUpdaterFactory::new();

        rsync_cluster(
            &config,
            provider,
            &updaters,
            None,
            None,
            SyncDirection::Up,
            true,
            &auto_yes(),
        )
        .await
        .unwrap();

        // One mount-set sync per selected node: two workers plus the head
        let syncs: Vec<_> = updaters
            .calls()
            .into_iter()
            .filter(|call| matches!(call, UpdaterCall::SyncMounts { .. }))
            .collect();
        assert_eq!(syncs.len(), 3);
    }

    #[tokio::test]
    async fn rsync_explicit_pair_head_only() {
        let config = test_config("rsync-pair");
        let provider = cluster_with(&config, 1, 2).await;
        let updaters = RecordingUpdaterFactory::new();

        rsync_cluster(
            &config,
            provider,
            &updaters,
            Some("./results"),
            Some("/data/results"),
            SyncDirection::Down,
            false,
            &auto_yes(),
        )
        .await
        .unwrap();

        let calls = updaters.calls();
        assert_eq!(calls.len(), 1);
        assert!(matches!(
            &calls[0],
            UpdaterCall::RsyncDown { source, target, .. }
                if source == "./results" && target == "/data/results"
        ));
    }

    #[tokio::test]
    async fn rsync_requires_matched_pair() {
        let config = test_config("rsync-bad");
        let provider = cluster_with(&config, 1, 0).await;
        let updaters = RecordingUpdaterFactory::new();

        let result = rsync_cluster(
            &config,
            provider,
            &updaters,
            Some("./results"),
            None,
            SyncDirection::Up,
            false,
            &auto_yes(),
        )
        .await;

        assert!(matches!(result, Err(DroverError::User(_))));
    }

    #[test]
    fn multiplexer_wrapping() {
        assert_eq!(wrap_in_multiplexer("echo hi", false, false), "echo hi");
        assert_eq!(
            wrap_in_multiplexer("echo hi", true, false),
            "screen -L -dm bash -c 'echo hi; exec bash'"
        );
        assert_eq!(
            wrap_in_multiplexer("it's done", false, true),
            "tmux new -d bash -c 'it'\\''s done; exec bash'"
        );
    }
}
