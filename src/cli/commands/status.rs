//! Status command - print the autoscaler's status report

use crate::error::DroverResult;
use crate::signal;

/// Execute the status command
pub async fn execute() -> DroverResult<()> {
    let status = signal::autoscaler().debug_status().await?;
    println!("{}", status);
    Ok(())
}
