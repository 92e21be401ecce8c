//! CLI user-interface layer
//!
//! Interactive confirmation prompts (cliclack) with automatic fallback
//! in CI/non-interactive environments, styled output lines (console),
//! and spinners around slow provider waits (indicatif).
//!
//! # Example
//!
//! ```rust,ignore
//! use drover::ui::{self, UiContext, TaskSpinner};
//!
//! let ctx = UiContext::detect().with_auto_yes(args.yes);
//!
//! ui::confirm_or_abort(&ctx, "This will create a new cluster 'demo'").await?;
//!
//! let mut spinner = TaskSpinner::new(&ctx);
//! spinner.start("Waiting for head node...");
//! // ... poll the provider ...
//! spinner.stop("Head node is up");
//!
//! ui::outro_success(&ctx, "Cluster is up");
//! ```

mod context;
mod output;
mod progress;
mod prompts;

pub use context::UiContext;
pub use output::{intro, key_value, outro_success, remark, step_info, step_ok, step_warn};
pub use progress::TaskSpinner;
pub use prompts::{confirm, confirm_or_abort};
