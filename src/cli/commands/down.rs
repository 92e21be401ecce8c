//! Down command - tear a cluster down

use crate::cli::args::DownArgs;
use crate::cluster::{self, TeardownFlags};
use crate::config::{self, ConfigOverrides};
use crate::error::DroverResult;
use crate::events::EventLog;
use crate::provider;
use crate::ui::{self, UiContext};
use crate::updater::ssh::SshUpdaterFactory;

/// Execute the down command
pub async fn execute(args: DownArgs) -> DroverResult<()> {
    let ctx = UiContext::detect().with_auto_yes(args.yes);
    ui::intro(&ctx, "drover down");

    let overrides = ConfigOverrides {
        cluster_name: args.spec.cluster_name.clone(),
        ..ConfigOverrides::default()
    };
    // Teardown must not bootstrap: resolution here would side-effect
    // external resources for a cluster that is about to go away.
    let config = config::load_file(&args.spec.config, &overrides).await?;

    let flags = TeardownFlags {
        workers_only: args.workers_only,
        keep_min_workers: args.keep_min_workers,
    };

    let provider = provider::build_provider(&config).await?;
    let result =
        cluster::teardown(&config, provider.clone(), &SshUpdaterFactory, flags, &ctx).await;
    provider.cleanup().await;
    result?;

    EventLog::new()
        .record(
            "cluster.down",
            &serde_json::json!({
                "cluster": config.cluster_name,
                "workers_only": args.workers_only,
            }),
        )
        .await;

    ui::outro_success(&ctx, &format!("Cluster {} is down", config.cluster_name));
    Ok(())
}
