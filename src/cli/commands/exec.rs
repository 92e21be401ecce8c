//! Exec command - run a command on the head node

use crate::cli::args::ExecArgs;
use crate::cluster::{self, ExecOptions};
use crate::config::{ConfigOverrides, ConfigResolver};
use crate::error::DroverResult;
use crate::provider;
use crate::ui::UiContext;
use crate::updater::ssh::SshUpdaterFactory;
use crate::updater::PortForward;

/// Execute the exec command
pub async fn execute(args: ExecArgs) -> DroverResult<()> {
    let ctx = UiContext::detect().with_auto_yes(args.yes);

    let overrides = ConfigOverrides {
        cluster_name: args.spec.cluster_name.clone(),
        ..ConfigOverrides::default()
    };
    let config = ConfigResolver::new()
        .resolve_file(&args.spec.config, &overrides)
        .await?;

    let opts = ExecOptions {
        run_env: args.run_env,
        screen: args.screen,
        tmux: args.tmux,
        stop: args.stop,
        start: args.start,
        port_forward: args
            .port_forward
            .iter()
            .map(|&port| PortForward {
                local: port,
                remote: port,
            })
            .collect(),
        with_output: false,
    };

    let provider = provider::build_provider(&config).await?;
    let result = cluster::exec_cluster(
        &config,
        provider.clone(),
        &SshUpdaterFactory,
        &args.cmd,
        &opts,
        &ctx,
    )
    .await;
    provider.cleanup().await;
    result?;
    Ok(())
}
