//! Request-resources command - ask the autoscaler for resources

use crate::cli::args::RequestResourcesArgs;
use crate::error::{DroverError, DroverResult};
use crate::signal;

/// Execute the request-resources command
pub async fn execute(args: RequestResourcesArgs) -> DroverResult<()> {
    let bundles = args
        .bundle
        .iter()
        .map(|raw| {
            serde_json::from_str::<serde_json::Value>(raw)
                .map_err(|e| DroverError::User(format!("invalid bundle '{}': {}", raw, e)))
        })
        .collect::<DroverResult<Vec<_>>>()?;

    signal::autoscaler()
        .request_resources(args.cpus, &bundles)
        .await
}
