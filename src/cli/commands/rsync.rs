//! Rsync commands - sync files between the local machine and the cluster

use crate::cli::args::RsyncArgs;
use crate::cluster;
use crate::config::{ConfigOverrides, ConfigResolver};
use crate::error::DroverResult;
use crate::provider;
use crate::ui::UiContext;
use crate::updater::ssh::SshUpdaterFactory;
use crate::updater::SyncDirection;

/// Execute the rsync-up or rsync-down command
pub async fn execute(args: RsyncArgs, direction: SyncDirection) -> DroverResult<()> {
    let ctx = UiContext::detect();

    let overrides = ConfigOverrides {
        cluster_name: args.spec.cluster_name.clone(),
        ..ConfigOverrides::default()
    };
    let config = ConfigResolver::new()
        .resolve_file(&args.spec.config, &overrides)
        .await?;

    let provider = provider::build_provider(&config).await?;
    let result = cluster::rsync_cluster(
        &config,
        provider.clone(),
        &SshUpdaterFactory,
        args.source.as_deref(),
        args.target.as_deref(),
        direction,
        args.all_nodes,
        &ctx,
    )
    .await;
    provider.cleanup().await;
    result
}
