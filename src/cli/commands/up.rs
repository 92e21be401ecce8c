//! Up command - create or update a cluster

use crate::cli::args::UpArgs;
use crate::cluster::{self, ReconcileFlags};
use crate::config::{ConfigOverrides, ConfigResolver};
use crate::error::{DroverError, DroverResult};
use crate::events::EventLog;
use crate::provider;
use crate::ui::{self, UiContext};
use crate::updater::ssh::SshUpdaterFactory;

/// Execute the up command
pub async fn execute(args: UpArgs) -> DroverResult<()> {
    let ctx = UiContext::detect().with_auto_yes(args.yes);
    ui::intro(&ctx, "drover up");

    let overrides = ConfigOverrides {
        cluster_name: args.spec.cluster_name.clone(),
        min_workers: args.min_workers,
        max_workers: args.max_workers,
    };
    let resolver = ConfigResolver::new().with_cache(!args.no_config_cache);
    let config = resolver.resolve_file(&args.spec.config, &overrides).await?;

    ui::step_info(
        &ctx,
        &format!(
            "Cluster {} on provider {}",
            config.cluster_name, config.provider.kind
        ),
    );

    let flags = ReconcileFlags {
        no_restart: args.no_restart,
        restart_only: args.restart_only,
    };

    let provider = provider::build_provider(&config).await?;
    let result =
        cluster::reconcile_head(&config, provider.clone(), &SshUpdaterFactory, flags, &ctx).await;
    provider.cleanup().await;
    let outcome = result?;

    EventLog::new()
        .record(
            "cluster.up",
            &serde_json::json!({
                "cluster": config.cluster_name,
                "head_node": outcome.head_node.as_str(),
                "exit_code": outcome.exit_code,
            }),
        )
        .await;

    ui::key_value(&ctx, "Head node", outcome.head_node.as_str());
    ui::key_value(&ctx, "Head IP", &outcome.head_ip);

    if outcome.exit_code != 0 {
        return Err(DroverError::UpdateFailed {
            node: outcome.head_node.to_string(),
            code: outcome.exit_code,
        });
    }

    let spec_path = args.spec.config.display();
    ui::remark(&ctx, &format!("To open a shell: drover attach {}", spec_path));
    ui::remark(
        &ctx,
        &format!("To tail the autoscaler: drover monitor {}", spec_path),
    );
    ui::remark(
        &ctx,
        &format!("To connect by hand: {}", outcome.remote_shell_command),
    );
    ui::remark(&ctx, &format!("To tear down: drover down {}", spec_path));
    ui::outro_success(&ctx, "Cluster is up");
    Ok(())
}
