//! Monitor command - tail the autoscaler monitor logs

use crate::cli::args::MonitorArgs;
use crate::cluster;
use crate::config::{ConfigOverrides, ConfigResolver};
use crate::error::DroverResult;
use crate::provider;
use crate::ui::UiContext;
use crate::updater::ssh::SshUpdaterFactory;

/// Execute the monitor command
pub async fn execute(args: MonitorArgs) -> DroverResult<()> {
    let ctx = UiContext::detect();

    let overrides = ConfigOverrides {
        cluster_name: args.spec.cluster_name.clone(),
        ..ConfigOverrides::default()
    };
    let config = ConfigResolver::new()
        .resolve_file(&args.spec.config, &overrides)
        .await?;

    let provider = provider::build_provider(&config).await?;
    let result = cluster::monitor_cluster(
        &config,
        provider.clone(),
        &SshUpdaterFactory,
        args.lines,
        &ctx,
    )
    .await;
    provider.cleanup().await;
    result
}
