//! Interactive prompts with CI/non-interactive fallback

use super::context::UiContext;
use crate::error::{DroverError, DroverResult};

/// Prompt for confirmation, returning the default when non-interactive.
///
/// Auto-yes mode approves without asking.
pub async fn confirm(ctx: &UiContext, message: &str, default: bool) -> DroverResult<bool> {
    if ctx.auto_yes() {
        println!("  {} (auto-approved)", message);
        return Ok(true);
    }

    if !ctx.is_interactive() {
        return Ok(default);
    }

    // cliclack prompts block; keep them off the runtime threads
    let message = message.to_string();
    let result = tokio::task::spawn_blocking(move || {
        cliclack::confirm(&message)
            .initial_value(default)
            .interact()
    })
    .await
    .map_err(|e| DroverError::Internal(format!("prompt task failed: {}", e)))?;

    result.map_err(|e| DroverError::Internal(format!("prompt failed: {}", e)))
}

/// Confirm a destructive action, aborting cleanly when declined.
///
/// Non-interactive runs without auto-yes always decline, so scripted
/// invocations must pass an explicit `--yes`.
pub async fn confirm_or_abort(ctx: &UiContext, message: &str) -> DroverResult<()> {
    if confirm(ctx, message, false).await? {
        Ok(())
    } else {
        Err(DroverError::Aborted)
    }
}
