//! Attach command - open an interactive session on the head node

use crate::cli::args::AttachArgs;
use crate::cluster::{self, AttachOptions};
use crate::config::{ConfigOverrides, ConfigResolver};
use crate::error::DroverResult;
use crate::provider;
use crate::ui::UiContext;
use crate::updater::ssh::SshUpdaterFactory;

/// Execute the attach command
pub async fn execute(args: AttachArgs) -> DroverResult<()> {
    let ctx = UiContext::detect().with_auto_yes(args.yes);

    let overrides = ConfigOverrides {
        cluster_name: args.spec.cluster_name.clone(),
        ..ConfigOverrides::default()
    };
    let config = ConfigResolver::new()
        .resolve_file(&args.spec.config, &overrides)
        .await?;

    let opts = AttachOptions {
        screen: args.screen,
        tmux: args.tmux,
        new: args.new,
        start: args.start,
    };

    let provider = provider::build_provider(&config).await?;
    let result =
        cluster::attach_cluster(&config, provider.clone(), &SshUpdaterFactory, &opts, &ctx).await;
    provider.cleanup().await;
    result
}
