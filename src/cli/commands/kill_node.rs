//! Kill-node command - kill a random worker node

use crate::cli::args::KillNodeArgs;
use crate::cluster;
use crate::config::{ConfigOverrides, ConfigResolver};
use crate::error::DroverResult;
use crate::events::EventLog;
use crate::provider;
use crate::ui::{self, UiContext};
use crate::updater::ssh::SshUpdaterFactory;

/// Execute the kill-node command
pub async fn execute(args: KillNodeArgs) -> DroverResult<()> {
    let ctx = UiContext::detect().with_auto_yes(args.yes);

    let overrides = ConfigOverrides {
        cluster_name: args.spec.cluster_name.clone(),
        ..ConfigOverrides::default()
    };
    let config = ConfigResolver::new()
        .resolve_file(&args.spec.config, &overrides)
        .await?;

    let provider = provider::build_provider(&config).await?;
    let result =
        cluster::kill_node(&config, provider.clone(), &SshUpdaterFactory, args.hard, &ctx).await;
    provider.cleanup().await;
    let ip = result?;

    EventLog::new()
        .record(
            "cluster.kill_node",
            &serde_json::json!({
                "cluster": config.cluster_name,
                "ip": ip,
                "hard": args.hard,
            }),
        )
        .await;

    ui::key_value(&ctx, "Killed node", &ip);
    Ok(())
}
