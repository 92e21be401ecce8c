//! Terminal environment detection
//!
//! Drover's destructive commands confirm before touching nodes. Whether
//! a prompt is possible at all, and whether it is pre-approved, is
//! decided once per invocation and carried through the call tree as a
//! `UiContext`. `DROVER_ASSUME_YES` pre-approves prompts the same way
//! `--yes` does, for CI jobs that cannot pass the flag.

use std::io::IsTerminal;

/// Env var that pre-approves confirmation prompts, like `--yes`
pub const ASSUME_YES_ENV: &str = "DROVER_ASSUME_YES";

/// Env vars marking a CI runner, where prompts and spinners are useless
const CI_ENV_VARS: &[&str] = &[
    "CI",
    "GITHUB_ACTIONS",
    "GITLAB_CI",
    "CIRCLECI",
    "JENKINS_URL",
    "BUILDKITE",
    "TEAMCITY_VERSION",
];

/// Interactivity and prompt pre-approval for one invocation
#[derive(Debug, Clone)]
pub struct UiContext {
    interactive: bool,
    auto_yes: bool,
}

impl UiContext {
    /// Context for the current terminal and environment
    pub fn detect() -> Self {
        Self {
            interactive: attached_to_terminal() && !running_in_ci(),
            auto_yes: std::env::var_os(ASSUME_YES_ENV).is_some(),
        }
    }

    /// Context that can never prompt; destructive operations decline
    pub fn non_interactive() -> Self {
        Self {
            interactive: false,
            auto_yes: false,
        }
    }

    /// Pre-approve confirmation prompts. Combines with the env knob;
    /// either one is enough.
    pub fn with_auto_yes(mut self, yes: bool) -> Self {
        self.auto_yes = self.auto_yes || yes;
        self
    }

    /// Whether prompts can be shown at all
    pub fn is_interactive(&self) -> bool {
        self.interactive
    }

    /// Whether confirmation prompts are pre-approved
    pub fn auto_yes(&self) -> bool {
        self.auto_yes
    }

    /// Spinners and styled output only make sense on a live terminal
    pub fn use_fancy_output(&self) -> bool {
        self.interactive
    }
}

fn attached_to_terminal() -> bool {
    std::io::stdout().is_terminal() && std::io::stdin().is_terminal()
}

fn running_in_ci() -> bool {
    CI_ENV_VARS.iter().any(|var| std::env::var_os(var).is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn non_interactive_declines_and_prompts_nothing() {
        let ctx = UiContext::non_interactive();
        assert!(!ctx.is_interactive());
        assert!(!ctx.auto_yes());
        assert!(!ctx.use_fancy_output());
    }

    #[test]
    fn yes_flag_preapproves() {
        let ctx = UiContext::non_interactive().with_auto_yes(true);
        assert!(ctx.auto_yes());
    }

    #[test]
    #[serial]
    fn assume_yes_env_preapproves() {
        std::env::set_var(ASSUME_YES_ENV, "1");
        let ctx = UiContext::detect();
        assert!(ctx.auto_yes());

        // Omitting --yes must not revoke the env approval
        assert!(ctx.with_auto_yes(false).auto_yes());
        std::env::remove_var(ASSUME_YES_ENV);
    }

    #[test]
    #[serial]
    fn detect_without_env_requires_the_flag() {
        std::env::remove_var(ASSUME_YES_ENV);
        let ctx = UiContext::detect();
        assert!(!ctx.auto_yes());
        assert!(ctx.with_auto_yes(true).auto_yes());
    }
}
