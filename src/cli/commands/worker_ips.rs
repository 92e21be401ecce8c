//! Worker-ips command - print every worker node's IP address

use crate::cli::args::SpecArgs;
use crate::cluster;
use crate::config::{self, ConfigOverrides};
use crate::error::DroverResult;
use crate::provider;

/// Execute the worker-ips command
pub async fn execute(args: SpecArgs) -> DroverResult<()> {
    let overrides = ConfigOverrides {
        cluster_name: args.cluster_name.clone(),
        ..ConfigOverrides::default()
    };
    let config = config::load_file(&args.config, &overrides).await?;

    let provider = provider::build_provider(&config).await?;
    let result = cluster::worker_node_ips(&config, provider.clone()).await;
    provider.cleanup().await;

    for ip in result? {
        println!("{}", ip);
    }
    Ok(())
}
