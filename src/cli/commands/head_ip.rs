//! Head-ip command - print the head node's IP address

use crate::cli::args::SpecArgs;
use crate::cluster;
use crate::config::{self, ConfigOverrides};
use crate::error::DroverResult;
use crate::provider;

/// Execute the head-ip command
pub async fn execute(args: SpecArgs) -> DroverResult<()> {
    let overrides = ConfigOverrides {
        cluster_name: args.cluster_name.clone(),
        ..ConfigOverrides::default()
    };
    let config = config::load_file(&args.config, &overrides).await?;

    let provider = provider::build_provider(&config).await?;
    let result = cluster::head_node_ip(&config, provider.clone()).await;
    provider.cleanup().await;

    // Bare IP on stdout, suitable for shell substitution
    println!("{}", result?);
    Ok(())
}
